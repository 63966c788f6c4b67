use std::sync::Arc;

use procmux_stream::StreamError;

use crate::outcome::FailureResult;

/// Errors that can occur while launching or supervising a child.
///
/// Cloneable so a single error can be shared by every observer of an
/// outcome.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProcessError {
    /// An expected pipe handle was not available after spawn.
    #[error("child {0} handle is missing")]
    MissingPipe(&'static str),

    /// The platform could not start the child.
    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        source: Arc<std::io::Error>,
    },

    /// Waiting on the child failed.
    #[error("failed waiting on '{command}': {source}")]
    Wait {
        command: String,
        source: Arc<std::io::Error>,
    },

    /// The child ran and exited unsuccessfully.
    #[error(transparent)]
    Failed(Box<FailureResult>),

    /// Output flush was requested for a launch that never buffered.
    #[error("cannot flush output: buffering was not enabled for this launch")]
    BufferingDisabled,

    /// Delivering buffered output failed.
    #[error("output flush failed: {0}")]
    Output(#[source] Arc<StreamError>),

    /// The supervisor stopped without publishing an outcome.
    #[error("process supervisor exited before reporting an outcome")]
    Abandoned,
}

impl From<StreamError> for ProcessError {
    fn from(err: StreamError) -> Self {
        ProcessError::Output(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, ProcessError>;
