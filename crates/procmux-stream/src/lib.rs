//! Order-preserving multi-channel output buffering and line prefixing.
//!
//! This is the data path of procmux. Bytes arriving from a child process are
//! pushed through a chain of [`ByteSink`] stages:
//! - [`MultiplexBuffer`] holds chunks from N channels in one arrival-ordered
//!   queue until they are flushed, cleared, or the buffer is destroyed
//! - [`LineFramer`] / [`FramedSink`] inject a prefix before every line,
//!   carrying line state across chunk boundaries
//!
//! Nothing here depends on an async runtime; every stage is a plain
//! synchronous sink.

pub mod buffer;
pub mod channel;
pub mod error;
pub mod framer;
pub mod sink;

pub use buffer::{BufferOptions, ChannelInput, Chunk, FlushSelector, MultiplexBuffer};
pub use channel::{channel_name, ChannelId, STDERR, STDOUT};
pub use error::{Result, StreamError};
pub use framer::{FramedSink, LineFramer, TextEncoding, NEWLINE};
pub use sink::{ByteSink, MemorySink, WriterSink};
