//! Run child processes with buffered, line-prefixed output.
//!
//! procmux launches a child and delivers its stdout/stderr either straight
//! through or held in one arrival-ordered buffer that can be replayed or
//! discarded once the child's outcome is known.
//!
//! # Crate Structure
//!
//! - [`stream`]: Sinks, line prefixing and the multi-channel output buffer
//! - [`process`]: Launching, signal forwarding and outcome classification (Unix)

/// Re-export output path types.
pub mod stream {
    pub use procmux_stream::*;
}

/// Re-export process types.
#[cfg(unix)]
pub mod process {
    pub use procmux_process::*;
}
