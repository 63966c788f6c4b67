use crate::channel::ChannelId;

/// Errors that can occur on the output data path.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// A flush named a channel that was never registered.
    #[error("unknown channel {channel} ({count} channels registered)")]
    UnknownChannel { channel: ChannelId, count: usize },
}

pub type Result<T> = std::result::Result<T, StreamError>;
