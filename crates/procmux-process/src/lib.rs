//! Child process launching with buffered or passthrough output delivery.
//!
//! [`launch`] starts a child, routes its stdout and stderr either straight
//! to caller sinks or through an order-preserving
//! [`MultiplexBuffer`](procmux_stream::MultiplexBuffer), optionally
//! prefixing every line, and resolves to a typed [`ProcessOutcome`].
//!
//! While a child runs, SIGINT and SIGTERM received by the host are forwarded
//! to it. Unix only.

#![cfg(unix)]

pub mod error;
pub mod launch;
pub mod options;
pub mod outcome;
mod pipeline;
pub mod signal;

pub use error::{ProcessError, Result};
pub use launch::{launch, run, LaunchHandle};
pub use options::{DeliveryPolicy, LaunchOptions, StdinMode};
pub use outcome::{FailureResult, OutputSelector, ProcessOutcome, SUCCESS_CODE};
pub use signal::{ParseSignalError, Signal};
