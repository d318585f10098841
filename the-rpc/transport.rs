use std::{
  io::{
    BufRead,
    BufReader,
    BufWriter,
    Read,
    Write,
  },
  path::Path,
  process::{
    Child,
    ChildStderr,
    ChildStdin,
    ChildStdout,
    Command,
    Stdio,
  },
  sync::mpsc::{
    Receiver,
    Sender,
    TryRecvError,
    channel,
  },
  thread::{
    self,
    JoinHandle,
  },
};

use the_msgpack::{
  DecodeError,
  EncodeError,
  FrameScanner,
};
use thiserror::Error;
use tracing::debug;

use crate::Message;

/// Upper bound on a single buffered frame. A backend that claims more than
/// this for one message is treated as a broken stream.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

const READ_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub enum TransportEvent {
  /// One complete encoded message, exactly as received.
  Frame(Vec<u8>),
  Stderr(String),
  ReadError(String),
  WriteError(String),
  Closed,
}

enum TransportOutbound {
  Message(Message),
  Shutdown,
}

/// A backend process speaking msgpack-rpc over its stdio.
///
/// Frames are delivered in arrival order through a single channel; the
/// consumer owns the only dispatch path.
pub struct StdioTransport {
  child:         Child,
  outbound_tx:   Option<Sender<TransportOutbound>>,
  event_rx:      Receiver<TransportEvent>,
  reader_thread: Option<JoinHandle<()>>,
  writer_thread: Option<JoinHandle<()>>,
  stderr_thread: Option<JoinHandle<()>>,
}

impl StdioTransport {
  pub fn spawn(
    command: &str,
    args: &[String],
    env: &[(String, String)],
    working_dir: &Path,
  ) -> Result<Self, TransportError> {
    let mut process = Command::new(command);
    process
      .args(args)
      .current_dir(working_dir)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped());
    for (key, value) in env {
      process.env(key, value);
    }

    let mut child = process.spawn().map_err(TransportError::Spawn)?;
    let stdin = child
      .stdin
      .take()
      .ok_or(TransportError::MissingPipe("stdin"))?;
    let stdout = child
      .stdout
      .take()
      .ok_or(TransportError::MissingPipe("stdout"))?;
    let stderr = child
      .stderr
      .take()
      .ok_or(TransportError::MissingPipe("stderr"))?;

    let (outbound_tx, outbound_rx) = channel();
    let (event_tx, event_rx) = channel();

    let writer_thread = Some(spawn_writer_thread(stdin, outbound_rx, event_tx.clone()));
    let reader_thread = Some(spawn_reader_thread(stdout, event_tx.clone()));
    let stderr_thread = Some(spawn_stderr_thread(stderr, event_tx));

    Ok(Self {
      child,
      outbound_tx: Some(outbound_tx),
      event_rx,
      reader_thread,
      writer_thread,
      stderr_thread,
    })
  }

  pub fn send(&self, message: Message) -> Result<(), TransportError> {
    let tx = self
      .outbound_tx
      .as_ref()
      .ok_or(TransportError::OutboundChannelClosed)?;
    tx.send(TransportOutbound::Message(message))
      .map_err(|_| TransportError::OutboundChannelClosed)
  }

  /// Blocks until the next event. `None` once every producer has gone away.
  pub fn recv_event(&self) -> Option<TransportEvent> {
    self.event_rx.recv().ok()
  }

  pub fn try_recv_event(&self) -> Option<TransportEvent> {
    match self.event_rx.try_recv() {
      Ok(event) => Some(event),
      Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
    }
  }

  pub fn poll_exit_code(&mut self) -> Result<Option<i32>, TransportError> {
    let status = self.child.try_wait().map_err(TransportError::Wait)?;
    Ok(status.and_then(|status| status.code()))
  }

  pub fn shutdown(&mut self) -> Result<Option<i32>, TransportError> {
    if let Some(tx) = self.outbound_tx.take() {
      let _ = tx.send(TransportOutbound::Shutdown);
    }

    let exit_code = match self.child.try_wait().map_err(TransportError::Wait)? {
      Some(status) => status.code(),
      None => {
        if let Err(err) = self.child.kill()
          && err.kind() != std::io::ErrorKind::InvalidInput
        {
          return Err(TransportError::Kill(err));
        }
        self.child.wait().map_err(TransportError::Wait)?.code()
      },
    };

    join_thread(&mut self.reader_thread)?;
    join_thread(&mut self.writer_thread)?;
    join_thread(&mut self.stderr_thread)?;

    Ok(exit_code)
  }
}

/// Splits a msgpack byte stream into one buffer per top-level value.
pub(crate) struct FrameReader<R> {
  inner:   R,
  pending: Vec<u8>,
  scanner: FrameScanner,
  chunk:   Box<[u8]>,
}

impl<R: Read> FrameReader<R> {
  pub(crate) fn new(inner: R) -> Self {
    Self {
      inner,
      pending: Vec::new(),
      scanner: FrameScanner::new(),
      chunk: vec![0; READ_CHUNK].into_boxed_slice(),
    }
  }

  /// Next complete frame, or `None` on a clean end of stream.
  pub(crate) fn next_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
    loop {
      if !self.pending.is_empty()
        && let Some(len) = self
          .scanner
          .scan(&self.pending)
          .map_err(TransportError::MalformedStream)?
      {
        let rest = self.pending.split_off(len);
        return Ok(Some(std::mem::replace(&mut self.pending, rest)));
      }

      if self.pending.len() > MAX_FRAME_BYTES {
        return Err(TransportError::FrameTooLarge(self.pending.len()));
      }

      let read = self
        .inner
        .read(&mut self.chunk)
        .map_err(TransportError::Read)?;
      if read == 0 {
        if self.pending.is_empty() {
          return Ok(None);
        }
        return Err(TransportError::TruncatedStream(self.pending.len()));
      }
      self.pending.extend_from_slice(&self.chunk[..read]);
    }
  }
}

fn spawn_reader_thread(stdout: ChildStdout, event_tx: Sender<TransportEvent>) -> JoinHandle<()> {
  thread::Builder::new()
    .name("the-rpc-stdout".into())
    .spawn(move || {
      let mut frames = FrameReader::new(stdout);
      loop {
        match frames.next_frame() {
          Ok(Some(frame)) => {
            if event_tx.send(TransportEvent::Frame(frame)).is_err() {
              break;
            }
          },
          Ok(None) => {
            let _ = event_tx.send(TransportEvent::Closed);
            break;
          },
          Err(err) => {
            let _ = event_tx.send(TransportEvent::ReadError(err.to_string()));
            break;
          },
        }
      }
    })
    .expect("failed to spawn rpc stdout thread")
}

fn spawn_writer_thread(
  stdin: ChildStdin,
  outbound_rx: Receiver<TransportOutbound>,
  event_tx: Sender<TransportEvent>,
) -> JoinHandle<()> {
  thread::Builder::new()
    .name("the-rpc-stdin".into())
    .spawn(move || {
      let mut writer = BufWriter::new(stdin);
      while let Ok(outbound) = outbound_rx.recv() {
        match outbound {
          TransportOutbound::Message(message) => {
            if let Err(err) = write_frame(&mut writer, message) {
              let _ = event_tx.send(TransportEvent::WriteError(err.to_string()));
              break;
            }
          },
          TransportOutbound::Shutdown => break,
        }
      }
    })
    .expect("failed to spawn rpc stdin thread")
}

fn spawn_stderr_thread(stderr: ChildStderr, event_tx: Sender<TransportEvent>) -> JoinHandle<()> {
  thread::Builder::new()
    .name("the-rpc-stderr".into())
    .spawn(move || {
      let mut reader = BufReader::new(stderr);
      let mut line = String::new();
      loop {
        line.clear();
        match reader.read_line(&mut line) {
          Ok(0) => break,
          Ok(_) => {
            let line = line.trim_end_matches(['\r', '\n']).to_string();
            if !line.is_empty() {
              let _ = event_tx.send(TransportEvent::Stderr(line));
            }
          },
          Err(err) => {
            debug!(error = %err, "backend stderr stream closed with error");
            break;
          },
        }
      }
    })
    .expect("failed to spawn rpc stderr thread")
}

fn write_frame<W: Write>(writer: &mut W, message: Message) -> Result<(), TransportError> {
  let bytes = message.encode().map_err(TransportError::Encode)?;
  writer.write_all(&bytes).map_err(TransportError::Write)?;
  writer.flush().map_err(TransportError::Flush)?;
  Ok(())
}

fn join_thread(handle: &mut Option<JoinHandle<()>>) -> Result<(), TransportError> {
  if let Some(handle) = handle.take() {
    handle.join().map_err(|_| TransportError::ThreadPanicked)?;
  }
  Ok(())
}

#[derive(Debug, Error)]
pub enum TransportError {
  #[error("failed to spawn backend process: {0}")]
  Spawn(std::io::Error),
  #[error("missing child {0} pipe")]
  MissingPipe(&'static str),
  #[error("transport outbound channel is closed")]
  OutboundChannelClosed,
  #[error("failed to read from backend: {0}")]
  Read(std::io::Error),
  #[error("backend stream is not valid msgpack: {0}")]
  MalformedStream(DecodeError),
  #[error("backend stream ended inside a frame ({0} bytes buffered)")]
  TruncatedStream(usize),
  #[error("frame exceeds {MAX_FRAME_BYTES} bytes ({0} bytes buffered)")]
  FrameTooLarge(usize),
  #[error("failed to encode frame: {0}")]
  Encode(EncodeError),
  #[error("failed to write frame: {0}")]
  Write(std::io::Error),
  #[error("failed to flush frame: {0}")]
  Flush(std::io::Error),
  #[error("failed to kill backend process: {0}")]
  Kill(std::io::Error),
  #[error("failed to wait for backend process: {0}")]
  Wait(std::io::Error),
  #[error("transport thread panicked")]
  ThreadPanicked,
}
