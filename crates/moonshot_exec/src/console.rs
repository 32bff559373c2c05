use std::io::{self, Read, Write};
use std::pin::Pin;
use std::sync::{Arc, Mutex, OnceLock};
use std::task::{Context, Poll};

use bytes::Bytes;
use derive_setters::Setters;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;

const STDIN_CHUNK_SIZE: usize = 4096;
const STDIN_PUMP_CAPACITY: usize = 16;

/// Where the child's standard input comes from.
#[derive(Debug, Clone, Default)]
pub enum Input {
    /// The calling process's standard input, forwarded until the child exits.
    #[default]
    Stdin,
    /// Chunks sent through an [`InputPipe`], for callers that answer prompts
    /// programmatically. The child's stdin closes once every sender is gone.
    Pipe(InputPipe),
    /// A fixed payload; the child's stdin is closed once it has been written.
    Bytes(Bytes),
    /// Nothing; the child's stdin is closed immediately.
    Empty,
}

/// Where echoed output goes.
#[derive(Debug, Clone)]
pub enum Output {
    Stdout,
    Stderr,
    Buffer(SharedBuffer),
    Null,
}

impl Output {
    pub(crate) fn writer(&self) -> Box<dyn Write + Send> {
        match self {
            Output::Stdout => Box::new(io::stdout()),
            Output::Stderr => Box::new(io::stderr()),
            Output::Buffer(buffer) => Box::new(buffer.clone()),
            Output::Null => Box::new(io::sink()),
        }
    }
}

/// The caller side of an invocation: the input forwarded to the child and the
/// consoles its output is echoed to.
#[derive(Debug, Clone, Setters)]
pub struct Console {
    pub input: Input,
    pub stdout: Output,
    pub stderr: Output,
}

impl Default for Console {
    fn default() -> Self {
        Self::inherit()
    }
}

impl Console {
    /// The calling process's own stdin, stdout and stderr.
    pub fn inherit() -> Self {
        Self { input: Input::Stdin, stdout: Output::Stdout, stderr: Output::Stderr }
    }

    /// A console whose echo lands in memory, for embedding callers and tests.
    pub fn captured(input: Input) -> (Self, SharedBuffer, SharedBuffer) {
        let stdout = SharedBuffer::default();
        let stderr = SharedBuffer::default();
        let console = Self {
            input,
            stdout: Output::Buffer(stdout.clone()),
            stderr: Output::Buffer(stderr.clone()),
        };
        (console, stdout, stderr)
    }
}

/// A cloneable in-memory byte sink. All clones share the same bytes.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn contents(&self) -> Vec<u8> {
        self.bytes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }

    pub(crate) fn append(&self, buf: &[u8]) {
        self.bytes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(buf);
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl AsyncWrite for SharedBuffer {
    fn poll_write(
        self: Pin<&mut Self>,
        _: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.append(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// The receiving end of an input channel. Clones share the receiver, and
/// only one invocation forwards from it at a time.
#[derive(Debug, Clone)]
pub struct InputPipe {
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Bytes>>>,
}

impl InputPipe {
    pub fn channel(capacity: usize) -> (mpsc::Sender<Bytes>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::from_receiver(rx))
    }

    fn from_receiver(rx: mpsc::Receiver<Bytes>) -> Self {
        Self { rx: Arc::new(tokio::sync::Mutex::new(rx)) }
    }

    pub(crate) async fn lock(&self) -> tokio::sync::MutexGuard<'_, mpsc::Receiver<Bytes>> {
        self.rx.lock().await
    }

    #[cfg(test)]
    pub(crate) fn is_idle(&self) -> bool {
        self.rx.try_lock().is_ok()
    }
}

static STDIN_PUMP: OnceLock<InputPipe> = OnceLock::new();

/// Returns the receiving end of the process-wide stdin pump, starting it on
/// first use.
///
/// A blocking read on the real stdin cannot be interrupted, so a single
/// detached thread owns it for the lifetime of the process and hands chunks
/// over a channel. Invocations receive from that channel, which can be
/// cancelled at any point without losing a chunk or leaving a second reader
/// behind.
pub(crate) fn stdin_pump() -> InputPipe {
    STDIN_PUMP
        .get_or_init(|| {
            let (tx, rx) = mpsc::channel(STDIN_PUMP_CAPACITY);
            let spawned = std::thread::Builder::new()
                .name("moonshot-stdin".to_string())
                .spawn(move || pump(io::stdin(), tx));
            if let Err(error) = spawned {
                // The sender was dropped with the closure, so receivers see EOF.
                tracing::warn!(%error, "Failed to start the stdin pump");
            }
            InputPipe::from_receiver(rx)
        })
        .clone()
}

fn pump<R: Read>(mut reader: R, tx: mpsc::Sender<Bytes>) {
    let mut buff = [0; STDIN_CHUNK_SIZE];
    loop {
        match reader.read(&mut buff) {
            Ok(0) => break,
            Ok(n) => {
                if tx.blocking_send(Bytes::copy_from_slice(&buff[..n])).is_err() {
                    break;
                }
            }
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => {
                tracing::debug!(%error, "Stopped reading stdin");
                break;
            }
        }
    }
}
