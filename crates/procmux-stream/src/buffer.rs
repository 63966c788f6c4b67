use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use crate::channel::ChannelId;
use crate::error::{Result, StreamError};
use crate::sink::ByteSink;

/// One arrived byte sequence tagged with its source channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The channel this chunk arrived on.
    pub channel: ChannelId,
    /// The chunk bytes, never split or merged.
    pub payload: Bytes,
}

impl Chunk {
    pub fn new(channel: ChannelId, payload: impl Into<Bytes>) -> Self {
        Self {
            channel,
            payload: payload.into(),
        }
    }
}

/// Which buffered chunks a flush delivers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlushSelector {
    /// Deliver every buffered chunk to its own channel's sink.
    #[default]
    All,
    /// Deliver only this channel's chunks and discard the rest.
    Channel(ChannelId),
}

impl FlushSelector {
    fn matches(self, channel: ChannelId) -> bool {
        match self {
            FlushSelector::All => true,
            FlushSelector::Channel(selected) => selected == channel,
        }
    }
}

/// Configuration for a [`MultiplexBuffer`].
#[derive(Debug, Clone)]
pub struct BufferOptions {
    /// End a channel's output sink as soon as its input ends.
    ///
    /// When false the sink stays open until [`MultiplexBuffer::destroy`], so
    /// output can still be flushed after the source is gone. Default: true.
    pub end_sink_on_channel_end: bool,
}

impl Default for BufferOptions {
    fn default() -> Self {
        Self {
            end_sink_on_channel_end: true,
        }
    }
}

struct Shared {
    queue: VecDeque<Chunk>,
    sinks: Vec<Option<Box<dyn ByteSink>>>,
    options: BufferOptions,
    destroyed: bool,
}

impl Shared {
    fn end_sink(&mut self, channel: ChannelId) {
        if let Some(mut sink) = self.sinks.get_mut(channel.index()).and_then(Option::take) {
            if let Err(err) = sink.end() {
                tracing::warn!(channel = %channel, error = %err, "failed ending output sink");
            }
        }
    }
}

/// Holds chunks from N channels in one global arrival-ordered queue.
///
/// Nothing reaches an output sink until [`flush`](Self::flush) is called.
/// Clones share the same queue and sinks.
///
/// The queue is unbounded: a noisy source that is never flushed grows memory
/// without limit.
#[derive(Clone)]
pub struct MultiplexBuffer {
    shared: Arc<Mutex<Shared>>,
}

impl MultiplexBuffer {
    /// Create a buffer with one channel per sink.
    ///
    /// Returns the buffer and the channel inputs, in the same order as
    /// `sinks`. Input `i` feeds `sinks[i]`.
    pub fn new(
        sinks: Vec<Box<dyn ByteSink>>,
        options: BufferOptions,
    ) -> (Self, Vec<ChannelInput>) {
        let count = sinks.len();
        let buffer = Self {
            shared: Arc::new(Mutex::new(Shared {
                queue: VecDeque::new(),
                sinks: sinks.into_iter().map(Some).collect(),
                options,
                destroyed: false,
            })),
        };

        let inputs = (0..count)
            .map(|index| ChannelInput {
                channel: ChannelId(index),
                buffer: buffer.clone(),
                ended: false,
            })
            .collect();

        (buffer, inputs)
    }

    /// Deliver buffered chunks in arrival order.
    ///
    /// With [`FlushSelector::Channel`], chunks from every other channel are
    /// removed from the buffer and never delivered. After
    /// [`destroy`](Self::destroy) this does nothing.
    pub fn flush(&self, selector: FlushSelector) -> Result<()> {
        let mut shared = self.lock();
        if shared.destroyed {
            return Ok(());
        }

        if let FlushSelector::Channel(channel) = selector {
            if channel.index() >= shared.sinks.len() {
                return Err(StreamError::UnknownChannel {
                    channel,
                    count: shared.sinks.len(),
                });
            }
        }

        let mut delivered = 0usize;
        let mut discarded = 0usize;

        while let Some(chunk) = shared.queue.pop_front() {
            if !selector.matches(chunk.channel) {
                discarded += 1;
                continue;
            }

            let slot = match shared.sinks.get_mut(chunk.channel.index()) {
                Some(slot) => slot,
                None => continue,
            };
            let Some(sink) = slot.as_mut() else {
                continue;
            };

            match sink.write_chunk(&chunk.payload) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    tracing::warn!(
                        channel = %chunk.channel,
                        error = %err,
                        "output sink failed during flush; dropping it"
                    );
                    *slot = None;
                }
            }
        }

        tracing::debug!(?selector, delivered, discarded, "flushed output buffer");
        Ok(())
    }

    /// Drop every buffered chunk without delivering it.
    pub fn clear(&self) {
        let mut shared = self.lock();
        let dropped = shared.queue.len();
        shared.queue.clear();
        tracing::debug!(dropped, "cleared output buffer");
    }

    /// End every output sink. Later flushes have no effect.
    pub fn destroy(&self) {
        let mut shared = self.lock();
        if shared.destroyed {
            return;
        }
        shared.destroyed = true;
        shared.queue.clear();
        for index in 0..shared.sinks.len() {
            shared.end_sink(ChannelId(index));
        }
    }

    /// Number of buffered chunks.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    /// Total payload bytes currently buffered.
    pub fn buffered_bytes(&self) -> usize {
        self.lock().queue.iter().map(|c| c.payload.len()).sum()
    }

    pub fn channel_count(&self) -> usize {
        self.lock().sinks.len()
    }

    pub fn is_destroyed(&self) -> bool {
        self.lock().destroyed
    }

    fn push(&self, chunk: Chunk) {
        let mut shared = self.lock();
        if shared.destroyed {
            return;
        }
        shared.queue.push_back(chunk);
    }

    fn channel_ended(&self, channel: ChannelId) {
        let mut shared = self.lock();
        if shared.options.end_sink_on_channel_end {
            shared.end_sink(channel);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for MultiplexBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.lock();
        f.debug_struct("MultiplexBuffer")
            .field("channels", &shared.sinks.len())
            .field("buffered", &shared.queue.len())
            .field("destroyed", &shared.destroyed)
            .finish()
    }
}

/// Input endpoint of one buffered channel.
pub struct ChannelInput {
    channel: ChannelId,
    buffer: MultiplexBuffer,
    ended: bool,
}

impl ChannelInput {
    pub fn channel(&self) -> ChannelId {
        self.channel
    }
}

impl ByteSink for ChannelInput {
    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        if self.ended {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "write after channel end",
            ));
        }
        self.buffer
            .push(Chunk::new(self.channel, Bytes::copy_from_slice(chunk)));
        Ok(())
    }

    fn end(&mut self) -> io::Result<()> {
        if !self.ended {
            self.ended = true;
            self.buffer.channel_ended(self.channel);
        }
        Ok(())
    }
}

impl std::fmt::Debug for ChannelInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelInput")
            .field("channel", &self.channel)
            .field("ended", &self.ended)
            .finish()
    }
}
