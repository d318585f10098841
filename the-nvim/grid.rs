//! In-memory model of the backend's line grids.
//!
//! Handlers here only mutate [`UiState`]. Turning that state into pixels (or,
//! for now, text) happens after a `flush`, outside of dispatch.

use std::collections::BTreeMap;

use the_msgpack::Value;
use the_redraw::{
  Args,
  HandlerError,
  HandlerRegistry,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
  pub text:  String,
  pub hl_id: u64,
}

impl Default for Cell {
  fn default() -> Self {
    Self {
      text:  " ".to_owned(),
      hl_id: 0,
    }
  }
}

/// Largest grid a resize may allocate.
pub const MAX_GRID_CELLS: usize = 1 << 20;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grid {
  width:  usize,
  height: usize,
  cells:  Vec<Cell>,
}

impl Grid {
  pub fn new(width: usize, height: usize) -> Result<Self, HandlerError> {
    let cells = width
      .checked_mul(height)
      .filter(|&cells| cells <= MAX_GRID_CELLS)
      .ok_or_else(|| {
        HandlerError::invalid(format!("{width}x{height} grid exceeds {MAX_GRID_CELLS} cells"))
      })?;
    Ok(Self {
      width,
      height,
      cells: vec![Cell::default(); cells],
    })
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
    self.index(row, col).ok().map(|index| &self.cells[index])
  }

  /// Keeps the overlapping top-left region. On error the grid is unchanged.
  fn resize(&mut self, width: usize, height: usize) -> Result<(), HandlerError> {
    let mut next = Self::new(width, height)?;
    for row in 0..height.min(self.height) {
      for col in 0..width.min(self.width) {
        next.cells[row * width + col] = self.cells[row * self.width + col].clone();
      }
    }
    *self = next;
    Ok(())
  }

  fn clear(&mut self) {
    self.cells.fill(Cell::default());
  }

  fn index(&self, row: usize, col: usize) -> Result<usize, HandlerError> {
    if row >= self.height || col >= self.width {
      return Err(HandlerError::invalid(format!(
        "cell ({row}, {col}) outside {}x{} grid",
        self.width, self.height
      )));
    }
    Ok(row * self.width + col)
  }

  fn set(&mut self, row: usize, col: usize, text: &str, hl_id: u64) -> Result<(), HandlerError> {
    let index = self.index(row, col)?;
    let cell = &mut self.cells[index];
    cell.text.clear();
    cell.text.push_str(text);
    cell.hl_id = hl_id;
    Ok(())
  }

  /// Moves the `top..bot` x `left..right` region by `rows`; positive
  /// scrolls content up.
  fn scroll(
    &mut self,
    (top, bot): (usize, usize),
    (left, right): (usize, usize),
    rows: i64,
  ) -> Result<(), HandlerError> {
    if top > bot || bot > self.height || left > right || right > self.width {
      return Err(HandlerError::invalid(format!(
        "scroll region rows {top}..{bot} cols {left}..{right} outside {}x{} grid",
        self.width, self.height
      )));
    }
    let shift = usize::try_from(rows.unsigned_abs()).unwrap_or(usize::MAX);
    if rows > 0 {
      for row in top..bot.saturating_sub(shift) {
        self.copy_row(row + shift, row, left, right);
      }
    } else if rows < 0 {
      for row in (top.saturating_add(shift)..bot).rev() {
        self.copy_row(row - shift, row, left, right);
      }
    }
    Ok(())
  }

  fn copy_row(&mut self, from: usize, to: usize, left: usize, right: usize) {
    let width = self.width;
    for col in left..right {
      self.cells[to * width + col] = self.cells[from * width + col].clone();
    }
  }

  pub fn lines(&self) -> Vec<String> {
    if self.width == 0 {
      return vec![String::new(); self.height];
    }
    self
      .cells
      .chunks(self.width)
      .map(|row| row.iter().map(|cell| cell.text.as_str()).collect())
      .collect()
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefaultColors {
  pub fg: Option<u32>,
  pub bg: Option<u32>,
  pub sp: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
  pub grid: u64,
  pub row:  usize,
  pub col:  usize,
}

/// Everything the redraw handlers know about the screen.
#[derive(Debug, Default)]
pub struct UiState {
  grids:   BTreeMap<u64, Grid>,
  cursor:  Option<Cursor>,
  title:   String,
  colors:  DefaultColors,
  dirty:   bool,
  flushes: u64,
}

impl UiState {
  pub fn grid(&self, id: u64) -> Option<&Grid> {
    self.grids.get(&id)
  }

  pub fn cursor(&self) -> Option<Cursor> {
    self.cursor
  }

  pub fn title(&self) -> &str {
    &self.title
  }

  pub fn colors(&self) -> DefaultColors {
    self.colors
  }

  pub fn flushes(&self) -> u64 {
    self.flushes
  }

  /// Whether a `flush` arrived since the last call.
  pub fn take_flush(&mut self) -> bool {
    std::mem::take(&mut self.dirty)
  }

  fn grid_mut(&mut self, id: u64) -> Result<&mut Grid, HandlerError> {
    self
      .grids
      .get_mut(&id)
      .ok_or_else(|| HandlerError::invalid(format!("unknown grid {id}")))
  }
}

/// Binds the line-grid sub-commands to [`UiState`] updates.
pub fn register_handlers(registry: &HandlerRegistry<UiState>) {
  registry.register_fn("grid_resize", |ui, args| {
    for_each_call(args, |call| {
      let (id, width, height) = (call.u64(0)?, call.usize(1)?, call.usize(2)?);
      match ui.grids.get_mut(&id) {
        Some(grid) => grid.resize(width, height)?,
        None => {
          ui.grids.insert(id, Grid::new(width, height)?);
        },
      }
      Ok(())
    })
  });

  registry.register_fn("grid_clear", |ui, args| {
    for_each_call(args, |call| {
      ui.grid_mut(call.u64(0)?)?.clear();
      Ok(())
    })
  });

  registry.register_fn("grid_destroy", |ui, args| {
    for_each_call(args, |call| {
      let id = call.u64(0)?;
      ui.grids.remove(&id);
      if ui.cursor.is_some_and(|cursor| cursor.grid == id) {
        ui.cursor = None;
      }
      Ok(())
    })
  });

  registry.register_fn("grid_cursor_goto", |ui, args| {
    for_each_call(args, |call| {
      let cursor = Cursor {
        grid: call.u64(0)?,
        row:  call.usize(1)?,
        col:  call.usize(2)?,
      };
      ui.grid_mut(cursor.grid)?.index(cursor.row, cursor.col)?;
      ui.cursor = Some(cursor);
      Ok(())
    })
  });

  registry.register_fn("grid_line", |ui, args| {
    for_each_call(args, |call| {
      let grid = ui.grid_mut(call.u64(0)?)?;
      let row = call.usize(1)?;
      let mut col = call.usize(2)?;
      // A cell without an hl_id reuses the previous one.
      let mut hl_id = 0;
      for (index, cell) in call.array(3)?.iter().enumerate() {
        let cell = Args::nested(cell, index)?;
        let text = cell.str(0)?;
        if cell.len() > 1 {
          hl_id = cell.u64(1)?;
        }
        let repeat = if cell.len() > 2 { cell.usize(2)? } else { 1 };
        for _ in 0..repeat {
          grid.set(row, col, text, hl_id)?;
          col += 1;
        }
      }
      Ok(())
    })
  });

  registry.register_fn("grid_scroll", |ui, args| {
    for_each_call(args, |call| {
      call.expect_len(7)?;
      let grid = ui.grid_mut(call.u64(0)?)?;
      let rows = (call.usize(1)?, call.usize(2)?);
      let cols = (call.usize(3)?, call.usize(4)?);
      grid.scroll(rows, cols, call.i64(5)?)
    })
  });

  registry.register_fn("default_colors_set", |ui, args| {
    for_each_call(args, |call| {
      ui.colors = DefaultColors {
        fg: rgb(call.i64(0)?),
        bg: rgb(call.i64(1)?),
        sp: rgb(call.i64(2)?),
      };
      Ok(())
    })
  });

  registry.register_fn("set_title", |ui, args| {
    for_each_call(args, |call| {
      ui.title = call.str(0)?.to_owned();
      Ok(())
    })
  });

  registry.register_fn("flush", |ui, _| {
    ui.dirty = true;
    ui.flushes += 1;
    Ok(())
  });
}

/// Sub-command arguments are one tuple per invocation.
fn for_each_call(
  args: &[Value],
  mut apply: impl FnMut(Args<'_>) -> Result<(), HandlerError>,
) -> Result<(), HandlerError> {
  for (index, call) in args.iter().enumerate() {
    apply(Args::nested(call, index)?)?;
  }
  Ok(())
}

/// `-1` means "use the terminal default".
fn rgb(value: i64) -> Option<u32> {
  u32::try_from(value).ok()
}
