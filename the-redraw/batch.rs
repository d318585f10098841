use the_msgpack::Value;
use thiserror::Error;

/// One `[name, args...]` entry of a redraw batch.
///
/// The arguments are kept as-is; giving them meaning is the handler's job.
#[derive(Debug, Clone, PartialEq)]
pub struct SubCommand {
  pub name: String,
  pub args: Vec<Value>,
}

impl SubCommand {
  pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
    Self {
      name: name.into(),
      args,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MalformedReason {
  #[error("entry is {0}, not an array")]
  NotAnArray(&'static str),
  #[error("entry is empty")]
  Empty,
  #[error("name is {0}, not a string")]
  NameNotString(&'static str),
  #[error("name is empty")]
  EmptyName,
}

/// An entry that was dropped from its batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("malformed sub-command at index {index}: {reason}")]
pub struct MalformedSubCommand {
  pub index:  usize,
  pub reason: MalformedReason,
}

/// Sub-commands of one notification, in the order the backend sent them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
  pub commands: Vec<SubCommand>,
  pub warnings: Vec<MalformedSubCommand>,
}

impl Batch {
  pub fn from_commands(commands: Vec<SubCommand>) -> Self {
    Self {
      commands,
      warnings: Vec::new(),
    }
  }

  pub fn len(&self) -> usize {
    self.commands.len()
  }

  pub fn is_empty(&self) -> bool {
    self.commands.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, SubCommand> {
    self.commands.iter()
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.commands.iter().map(|command| command.name.as_str())
  }
}

impl<'a> IntoIterator for &'a Batch {
  type Item = &'a SubCommand;
  type IntoIter = std::slice::Iter<'a, SubCommand>;

  fn into_iter(self) -> Self::IntoIter {
    self.iter()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BatchError {
  #[error("batch must be an array, found {0}")]
  NotAnArray(&'static str),
}

/// Splits a notification's params into sub-commands.
///
/// Entries that are not a non-empty array starting with a non-empty string
/// are skipped and recorded in [`Batch::warnings`]; the others keep their
/// relative order.
pub fn extract_batch(value: Value) -> Result<Batch, BatchError> {
  let entries = value
    .into_array()
    .map_err(|other| BatchError::NotAnArray(other.kind()))?;

  let mut batch = Batch {
    commands: Vec::with_capacity(entries.len()),
    warnings: Vec::new(),
  };
  for (index, entry) in entries.into_iter().enumerate() {
    match sub_command(entry) {
      Ok(command) => batch.commands.push(command),
      Err(reason) => batch.warnings.push(MalformedSubCommand { index, reason }),
    }
  }
  Ok(batch)
}

fn sub_command(entry: Value) -> Result<SubCommand, MalformedReason> {
  let mut items = entry
    .into_array()
    .map_err(|other| MalformedReason::NotAnArray(other.kind()))?;
  if items.is_empty() {
    return Err(MalformedReason::Empty);
  }
  let args = items.split_off(1);
  let name = match items.pop() {
    Some(Value::Str(name)) if name.is_empty() => return Err(MalformedReason::EmptyName),
    Some(Value::Str(name)) => name,
    Some(other) => return Err(MalformedReason::NameNotString(other.kind())),
    None => return Err(MalformedReason::Empty),
  };
  Ok(SubCommand { name, args })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn entry(items: Vec<Value>) -> Value {
    Value::Array(items)
  }

  #[test]
  fn keeps_order_and_arguments() {
    let batch = extract_batch(entry(vec![
      entry(vec!["grid_resize".into(), entry(vec![1.into(), 80.into(), 24.into()])]),
      entry(vec!["flush".into()]),
    ]))
    .unwrap();

    assert_eq!(
      batch.commands,
      vec![
        SubCommand::new("grid_resize", vec![entry(vec![1.into(), 80.into(), 24.into()])]),
        SubCommand::new("flush", vec![]),
      ]
    );
    assert!(batch.warnings.is_empty());
  }

  #[test]
  fn invocation_tuples_stay_with_one_sub_command() {
    let first = entry(vec![1.into(), 0.into(), 0.into()]);
    let second = entry(vec![2.into(), 3.into(), 4.into()]);
    let batch = extract_batch(entry(vec![entry(vec![
      "grid_cursor_goto".into(),
      first.clone(),
      second.clone(),
    ])]))
    .unwrap();

    assert_eq!(batch.len(), 1);
    assert_eq!(batch.commands[0], SubCommand::new("grid_cursor_goto", vec![first, second]));
  }

  #[test]
  fn malformed_entries_are_skipped_with_a_warning() {
    let batch = extract_batch(entry(vec![
      entry(vec!["first".into()]),
      entry(vec![]),
      entry(vec![5.into(), "x".into()]),
      Value::from("loose"),
      entry(vec!["".into(), 1.into()]),
      entry(vec!["last".into(), 2.into()]),
    ]))
    .unwrap();

    assert_eq!(batch.names().collect::<Vec<_>>(), ["first", "last"]);
    assert_eq!(
      batch.warnings,
      vec![
        MalformedSubCommand {
          index:  1,
          reason: MalformedReason::Empty,
        },
        MalformedSubCommand {
          index:  2,
          reason: MalformedReason::NameNotString("int"),
        },
        MalformedSubCommand {
          index:  3,
          reason: MalformedReason::NotAnArray("str"),
        },
        MalformedSubCommand {
          index:  4,
          reason: MalformedReason::EmptyName,
        },
      ]
    );
  }

  #[test]
  fn top_level_must_be_an_array() {
    assert_eq!(
      extract_batch(Value::Map(vec![])),
      Err(BatchError::NotAnArray("map"))
    );
    assert!(extract_batch(entry(vec![])).unwrap().is_empty());
  }
}
