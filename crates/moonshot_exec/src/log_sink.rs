use std::fmt;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::SharedBuffer;

type BoxWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// A byte sink that receives a verbatim copy of everything the child writes to
/// stdout and stderr. Clones share the same underlying writer.
#[derive(Clone)]
pub struct LogSink {
    writer: Arc<Mutex<BoxWriter>>,
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink").finish_non_exhaustive()
    }
}

impl LogSink {
    pub fn new<W: AsyncWrite + Send + 'static>(writer: W) -> Self {
        Self { writer: Arc::new(Mutex::new(Box::pin(writer))) }
    }

    /// Opens `path` for appending, creating it when missing.
    pub async fn file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .await?;
        Ok(Self::new(file))
    }

    /// An in-memory sink together with a handle to read it back.
    pub fn buffer() -> (Self, SharedBuffer) {
        let buffer = SharedBuffer::default();
        (Self::new(buffer.clone()), buffer)
    }

    pub(crate) async fn write(&self, bytes: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await
    }
}
