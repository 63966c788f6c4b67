use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};

/// A byte-accepting pipeline stage that can be ended independently.
///
/// Every stage of the output path (channel inputs, line framers, final
/// destinations) implements this trait so they compose uniformly.
pub trait ByteSink: Send {
    /// Accept one chunk.
    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()>;

    /// Signal that no more chunks will arrive.
    fn end(&mut self) -> io::Result<()>;

    /// Signal that the upstream source failed.
    ///
    /// The default does nothing; the upstream is expected to call
    /// [`end`](ByteSink::end) afterwards.
    fn abort(&mut self, _err: &io::Error) {}
}

impl<S: ByteSink + ?Sized> ByteSink for Box<S> {
    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        (**self).write_chunk(chunk)
    }

    fn end(&mut self) -> io::Result<()> {
        (**self).end()
    }

    fn abort(&mut self, err: &io::Error) {
        (**self).abort(err)
    }
}

/// Sink over any [`Write`] implementor.
///
/// Ending flushes and releases the writer; writes after end fail with
/// `BrokenPipe`.
pub struct WriterSink<W> {
    inner: Option<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner: Some(inner) }
    }

    /// Returns true once [`end`](ByteSink::end) has been called.
    pub fn is_ended(&self) -> bool {
        self.inner.is_none()
    }
}

impl WriterSink<io::Stdout> {
    /// Sink writing to the host's standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl WriterSink<io::Stderr> {
    /// Sink writing to the host's standard error.
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write + Send> ByteSink for WriterSink<W> {
    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        let writer = self.inner.as_mut().ok_or_else(write_after_end)?;
        writer.write_all(chunk)?;
        writer.flush()
    }

    fn end(&mut self) -> io::Result<()> {
        match self.inner.take() {
            Some(mut writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl<W> std::fmt::Debug for WriterSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterSink")
            .field("ended", &self.inner.is_none())
            .finish()
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    data: BytesMut,
    chunks: Vec<Bytes>,
    ended: bool,
}

/// In-memory sink. Clones share the same storage.
///
/// Useful for capturing child output and for tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, concatenated.
    pub fn contents(&self) -> Bytes {
        self.lock().data.clone().freeze()
    }

    /// Everything written so far, decoded lossily.
    pub fn contents_string(&self) -> String {
        String::from_utf8_lossy(&self.lock().data).into_owned()
    }

    /// Written chunks, one entry per `write_chunk` call.
    pub fn chunks(&self) -> Vec<Bytes> {
        self.lock().chunks.clone()
    }

    pub fn is_ended(&self) -> bool {
        self.lock().ended
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ByteSink for MemorySink {
    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        let mut state = self.lock();
        if state.ended {
            return Err(write_after_end());
        }
        state.data.extend_from_slice(chunk);
        state.chunks.push(Bytes::copy_from_slice(chunk));
        Ok(())
    }

    fn end(&mut self) -> io::Result<()> {
        self.lock().ended = true;
        Ok(())
    }
}

fn write_after_end() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "write after end")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_clones_share_storage() {
        let sink = MemorySink::new();
        let mut writer = sink.clone();

        writer.write_chunk(b"hello ").unwrap();
        writer.write_chunk(b"world").unwrap();

        assert_eq!(sink.contents().as_ref(), b"hello world");
        assert_eq!(sink.chunks().len(), 2);
        assert!(!sink.is_ended());
    }

    #[test]
    fn memory_sink_rejects_write_after_end() {
        let mut sink = MemorySink::new();
        sink.end().unwrap();

        let err = sink.write_chunk(b"late").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert!(sink.contents().is_empty());
    }

    #[test]
    fn writer_sink_writes_and_ends() {
        let mut sink = WriterSink::new(Vec::<u8>::new());
        sink.write_chunk(b"abc").unwrap();
        assert!(!sink.is_ended());

        sink.end().unwrap();
        assert!(sink.is_ended());
        assert!(sink.write_chunk(b"def").is_err());
        // Ending twice is harmless.
        sink.end().unwrap();
    }

    #[test]
    fn boxed_sink_forwards() {
        let memory = MemorySink::new();
        let mut boxed: Box<dyn ByteSink> = Box::new(memory.clone());

        boxed.write_chunk(b"x").unwrap();
        boxed.end().unwrap();

        assert_eq!(memory.contents_string(), "x");
        assert!(memory.is_ended());
    }
}
