use std::fmt;
use std::io::{self, Write};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::console::stdin_pump;
use crate::{Input, InputPipe, LogSink, SharedBuffer};

/// One of the child's output pipes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => f.write_str("stdout"),
            StreamKind::Stderr => f.write_str("stderr"),
        }
    }
}

/// Rewrites `\r`, `\n` and `\r\n` to a single `\n` so echoed output never
/// moves the terminal cursor back over earlier text. Keeps state across
/// chunks, a `\r\n` split over two reads still yields one line break.
#[derive(Debug, Default)]
pub(crate) struct LineNormalizer {
    after_cr: bool,
}

impl LineNormalizer {
    pub(crate) fn normalize(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(chunk.len());
        for &byte in chunk {
            match byte {
                b'\r' => {
                    out.push(b'\n');
                    self.after_cr = true;
                }
                b'\n' => {
                    if !self.after_cr {
                        out.push(b'\n');
                    }
                    self.after_cr = false;
                }
                other => {
                    out.push(other);
                    self.after_cr = false;
                }
            }
        }
        out
    }
}

/// What an output relay ran into besides the bytes it moved.
#[derive(Debug, Default)]
pub(crate) struct RelayOutcome {
    pub(crate) read_error: Option<io::Error>,
    pub(crate) log_error: Option<io::Error>,
}

/// Moves one output pipe into its capture buffer, the log sink and the echo
/// console.
pub(crate) struct OutputRelay {
    kind: StreamKind,
    capture: SharedBuffer,
    log: Option<LogSink>,
    echo: Option<Box<dyn Write + Send>>,
    normalizer: Option<LineNormalizer>,
}

impl OutputRelay {
    pub(crate) fn new(kind: StreamKind, capture: SharedBuffer) -> Self {
        Self { kind, capture, log: None, echo: None, normalizer: None }
    }

    pub(crate) fn log(mut self, log: Option<LogSink>) -> Self {
        self.log = log;
        self
    }

    /// Mirrors output to `writer`. Stdout echo is line-normalized.
    pub(crate) fn echo(mut self, writer: Box<dyn Write + Send>) -> Self {
        if self.kind == StreamKind::Stdout {
            self.normalizer = Some(LineNormalizer::default());
        }
        self.echo = Some(writer);
        self
    }

    /// Reads until end-of-stream.
    pub(crate) async fn run<A: AsyncRead + Unpin>(mut self, mut io: A) -> RelayOutcome {
        let mut outcome = RelayOutcome::default();
        let mut buff = [0; 1024];
        loop {
            let n = match io.read(&mut buff).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => {
                    outcome.read_error = Some(error);
                    break;
                }
            };
            let chunk = &buff[..n];

            self.capture.append(chunk);

            if outcome.log_error.is_none() {
                if let Some(log) = &self.log {
                    if let Err(error) = log.write(chunk).await {
                        tracing::warn!(stream = %self.kind, %error, "Log destination write failed");
                        outcome.log_error = Some(error);
                    }
                }
            }

            self.write_echo(chunk);
        }
        outcome
    }

    fn write_echo(&mut self, chunk: &[u8]) {
        let Some(writer) = self.echo.as_mut() else {
            return;
        };
        let written = match self.normalizer.as_mut() {
            Some(normalizer) => writer.write_all(&normalizer.normalize(chunk)),
            None => writer.write_all(chunk),
        };
        // note: flush is necessary else we get the cursor could not be found error.
        if let Err(error) = written.and_then(|_| writer.flush()) {
            tracing::debug!(stream = %self.kind, %error, "Echo disabled after console write failed");
            self.echo = None;
        }
    }
}

/// Forwards `input` to the child's stdin. Closes the pipe when the input ends;
/// for [`Input::Stdin`] that usually never happens and the task is aborted
/// once the child exits.
pub(crate) async fn forward_input<W: AsyncWrite + Unpin>(input: Input, mut stdin: W) {
    match input {
        Input::Empty => {}
        Input::Bytes(bytes) => {
            forward_chunk(&mut stdin, &bytes).await;
        }
        Input::Stdin => forward_pipe(&stdin_pump(), &mut stdin).await,
        Input::Pipe(pipe) => forward_pipe(&pipe, &mut stdin).await,
    }

    if let Err(error) = stdin.shutdown().await {
        tracing::trace!(%error, "Closing child stdin failed");
    }
}

async fn forward_pipe<W: AsyncWrite + Unpin>(pipe: &InputPipe, stdin: &mut W) {
    let mut rx = pipe.lock().await;
    while let Some(chunk) = rx.recv().await {
        if !forward_chunk(stdin, &chunk).await {
            break;
        }
    }
}

async fn forward_chunk<W: AsyncWrite + Unpin>(stdin: &mut W, chunk: &[u8]) -> bool {
    let written = match stdin.write_all(chunk).await {
        Ok(()) => stdin.flush().await,
        Err(error) => Err(error),
    };
    match written {
        Ok(()) => true,
        Err(error) => {
            // Usually a broken pipe: the child stopped reading or already exited.
            tracing::debug!(%error, "Stopped forwarding input to the child");
            false
        }
    }
}
