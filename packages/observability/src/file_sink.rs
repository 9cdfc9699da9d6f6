//! Append-only JSONL file sink.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

/// Shared handle to the central log file.
///
/// Every write is flushed immediately so concurrent processes appending to
/// the same file interleave on line boundaries.
#[derive(Clone)]
pub struct FileSink {
    inner: Arc<Mutex<BufWriter<File>>>,
}

impl FileSink {
    /// Open (or create) the log file in append mode, creating parent dirs.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            inner: Arc::new(Mutex::new(BufWriter::with_capacity(8192, file))),
        })
    }
}

impl Write for FileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.inner.lock();
        let written = guard.write(buf)?;
        guard.flush()?;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

/// `MakeWriter` adapter handing out clones of one [`FileSink`].
#[derive(Clone)]
pub struct SinkWriterFactory {
    sink: FileSink,
}

impl SinkWriterFactory {
    pub fn new(sink: FileSink) -> Self {
        Self { sink }
    }
}

impl<'a> MakeWriter<'a> for SinkWriterFactory {
    type Writer = FileSink;

    fn make_writer(&'a self) -> Self::Writer {
        self.sink.clone()
    }
}
