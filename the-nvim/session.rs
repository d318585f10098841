use std::path::Path;

use anyhow::{
  Context,
  Result,
};
use the_msgpack::Value;
use the_redraw::{
  HandlerRegistry,
  NotificationReceiver,
};
use the_rpc::{
  Message,
  MessageHeader,
  RequestIds,
  StdioTransport,
  TransportEvent,
};
use tracing::{
  debug,
  info,
  warn,
};

use crate::{
  config::Config,
  grid::{
    self,
    UiState,
  },
};

/// Grid the backend draws the main screen into.
const DEFAULT_GRID: u64 = 1;

/// Routes raw frames from the backend: redraw notifications into the
/// dispatch engine, everything else into plain rpc handling.
pub struct FrameRouter {
  receiver: NotificationReceiver<UiState>,
  ui:       UiState,
}

impl FrameRouter {
  pub fn new(registry: HandlerRegistry<UiState>, config: &Config) -> Self {
    Self {
      receiver: NotificationReceiver::with_config(registry, config.ui.receiver_config()),
      ui:       UiState::default(),
    }
  }

  pub fn ui(&self) -> &UiState {
    &self.ui
  }

  pub fn ui_mut(&mut self) -> &mut UiState {
    &mut self.ui
  }

  /// Handles one frame, returning the reply the backend expects, if any.
  pub fn route(&mut self, frame: &[u8]) -> Option<Message> {
    let header = match MessageHeader::peek(frame) {
      Ok(header) => header,
      Err(err) => {
        warn!(error = %err, len = frame.len(), "dropping unreadable frame");
        return None;
      },
    };

    if header.is_notification(self.receiver.method()) {
      // Failures are already reported by the receiver.
      let _ = self.receiver.on_notification(&mut self.ui, frame);
      return None;
    }

    match Message::decode(frame) {
      Ok(Message::Request(request)) => {
        debug!(id = request.id, method = %request.method, "rejecting backend request");
        Some(Message::response_err(
          request.id,
          format!("{} is not supported by this UI", request.method),
        ))
      },
      Ok(Message::Response(response)) if response.is_error() => {
        warn!(id = response.id, error = %response.error, "backend returned an error");
        None
      },
      Ok(Message::Response(response)) => {
        debug!(id = response.id, "backend response");
        None
      },
      Ok(Message::Notification(notification)) => {
        debug!(method = %notification.method, "ignoring notification");
        None
      },
      Err(err) => {
        warn!(error = %err, "dropping malformed message");
        None
      },
    }
  }
}

pub struct Session {
  transport: StdioTransport,
  router:    FrameRouter,
  ids:       RequestIds,
  dump:      bool,
}

impl Session {
  pub fn start(config: &Config, working_dir: &Path, dump: bool) -> Result<Self> {
    let mut args = vec!["--embed".to_owned()];
    args.extend(config.nvim.args.iter().cloned());
    let transport = StdioTransport::spawn(&config.nvim.path, &args, &[], working_dir)
      .with_context(|| format!("failed to start {}", config.nvim.path))?;
    info!(command = %config.nvim.path, ?args, "backend started");

    let registry = HandlerRegistry::new();
    grid::register_handlers(&registry);

    let mut session = Self {
      transport,
      router: FrameRouter::new(registry, config),
      ids: RequestIds::default(),
      dump,
    };
    session.attach(config)?;
    Ok(session)
  }

  fn attach(&mut self, config: &Config) -> Result<()> {
    let options = Value::Map(vec![
      ("rgb".into(), config.ui.rgb.into()),
      ("ext_linegrid".into(), true.into()),
    ]);
    let request = Message::request(self.ids.next(), "nvim_ui_attach", vec![
      config.ui.width.into(),
      config.ui.height.into(),
      options,
    ]);
    self.transport.send(request).context("failed to attach ui")
  }

  /// Processes backend frames one at a time until the backend goes away.
  pub fn run(&mut self) -> Result<Option<i32>> {
    while let Some(event) = self.transport.recv_event() {
      match event {
        TransportEvent::Frame(frame) => {
          if let Some(reply) = self.router.route(&frame) {
            self.transport.send(reply).context("failed to reply to backend")?;
          }
          if self.router.ui_mut().take_flush() {
            self.present();
          }
        },
        TransportEvent::Stderr(line) => debug!(%line, "backend stderr"),
        TransportEvent::ReadError(err) => {
          warn!(error = %err, "backend stream failed");
          break;
        },
        TransportEvent::WriteError(err) => {
          warn!(error = %err, "failed to write to backend");
          break;
        },
        TransportEvent::Closed => {
          info!("backend closed its output");
          break;
        },
      }
    }
    self.transport.shutdown().context("failed to stop backend")
  }

  fn present(&self) {
    let ui = self.router.ui();
    let Some(grid) = ui.grid(DEFAULT_GRID) else {
      return;
    };
    debug!(
      flushes = ui.flushes(),
      width = grid.width(),
      height = grid.height(),
      "frame ready"
    );
    if self.dump {
      println!("--- {} ---", ui.title());
      for line in grid.lines() {
        println!("{}", line.trim_end());
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn router() -> FrameRouter {
    let registry = HandlerRegistry::new();
    grid::register_handlers(&registry);
    FrameRouter::new(registry, &Config::default())
  }

  fn call(items: Vec<Value>) -> Value {
    Value::Array(items)
  }

  #[test]
  fn redraw_frames_update_the_ui() {
    let mut router = router();
    let frame = Message::notification("redraw", vec![
      call(vec!["grid_resize".into(), call(vec![1.into(), 3.into(), 1.into()])]),
      call(vec![
        "grid_line".into(),
        call(vec![1.into(), 0.into(), 0.into(), call(vec![call(vec!["a".into(), 0.into(), 3.into()])])]),
      ]),
      call(vec!["flush".into()]),
    ])
    .encode()
    .unwrap();

    assert!(router.route(&frame).is_none());
    assert_eq!(router.ui().grid(1).map(|grid| grid.lines()), Some(vec!["aaa".to_owned()]));
    assert!(router.ui_mut().take_flush());
  }

  #[test]
  fn backend_requests_get_an_error_reply() {
    let mut router = router();
    let frame = Message::request(9, "nvim_get_clipboard", vec![]).encode().unwrap();
    let Some(Message::Response(reply)) = router.route(&frame) else {
      panic!("expected a response");
    };
    assert_eq!(reply.id, 9);
    assert!(reply.is_error());
  }

  #[test]
  fn junk_and_other_notifications_are_ignored() {
    let mut router = router();
    assert!(router.route(&[0xc1]).is_none());
    let frame = Message::notification("nvim_error_event", vec![0.into(), "E5108".into()]).encode().unwrap();
    assert!(router.route(&frame).is_none());
    assert!(!router.ui_mut().take_flush());
  }
}
