//! Output wiring between child pipes and caller sinks.

use std::io::ErrorKind;

use procmux_stream::{
    channel_name, BufferOptions, ByteSink, ChannelId, FramedSink, LineFramer, MultiplexBuffer,
    TextEncoding,
};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;

use crate::error::{ProcessError, Result};
use crate::options::DeliveryPolicy;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// The two entry stages for child stdout/stderr, plus the buffer behind
/// them when output is held.
pub(crate) struct Pipeline {
    pub(crate) stdout: Box<dyn ByteSink>,
    pub(crate) stderr: Box<dyn ByteSink>,
    pub(crate) buffer: Option<MultiplexBuffer>,
}

impl Pipeline {
    /// Immediate: pipe → [framer] → sink.
    /// Buffered: pipe → buffer channel → [framer] → sink, with sinks kept
    /// open past channel end so output can be flushed after exit.
    pub(crate) fn build(
        delivery: DeliveryPolicy,
        line_prefix: Option<&str>,
        encoding: TextEncoding,
        stdout_sink: Box<dyn ByteSink>,
        stderr_sink: Box<dyn ByteSink>,
    ) -> Result<Self> {
        let stdout = framed(stdout_sink, line_prefix, encoding);
        let stderr = framed(stderr_sink, line_prefix, encoding);

        match delivery {
            DeliveryPolicy::Immediate => Ok(Self {
                stdout,
                stderr,
                buffer: None,
            }),
            DeliveryPolicy::Buffered => {
                let (buffer, inputs) = MultiplexBuffer::new(
                    vec![stdout, stderr],
                    BufferOptions {
                        end_sink_on_channel_end: false,
                    },
                );
                let mut inputs = inputs.into_iter();
                let stdout = inputs.next().ok_or(ProcessError::MissingPipe("stdout buffer"))?;
                let stderr = inputs.next().ok_or(ProcessError::MissingPipe("stderr buffer"))?;
                Ok(Self {
                    stdout: Box::new(stdout),
                    stderr: Box::new(stderr),
                    buffer: Some(buffer),
                })
            }
        }
    }
}

fn framed(
    sink: Box<dyn ByteSink>,
    line_prefix: Option<&str>,
    encoding: TextEncoding,
) -> Box<dyn ByteSink> {
    match line_prefix {
        Some(prefix) => Box::new(FramedSink::new(
            LineFramer::with_encoding(prefix, encoding),
            sink,
        )),
        None => sink,
    }
}

/// Copy `source` into `stage` chunk by chunk until EOF, then end the stage.
///
/// A failing stage stops receiving data but the source is still drained so
/// the child never blocks on a full pipe. Once `detach` flips (or its sender
/// goes away) the pump stops reading, even if the pipe is still open, and
/// ends the stage with whatever it has already seen.
pub(crate) async fn pump<R>(
    mut source: R,
    mut stage: Box<dyn ByteSink>,
    channel: ChannelId,
    mut detach: watch::Receiver<bool>,
) where
    R: AsyncRead + Unpin,
{
    let name = channel_name(channel);
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    let mut stage_failed = false;

    loop {
        if *detach.borrow() {
            tracing::debug!(channel = name, "output detached before EOF");
            break;
        }

        let read = tokio::select! {
            biased;
            read = source.read(&mut chunk) => read,
            changed = detach.changed() => {
                if changed.is_ok() {
                    continue;
                }
                tracing::debug!(channel = name, "output detached before EOF");
                break;
            }
        };
        let read = match read {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                tracing::warn!(channel = name, error = %err, "reading child output failed");
                stage.abort(&err);
                break;
            }
        };

        if stage_failed {
            continue;
        }
        if let Err(err) = stage.write_chunk(&chunk[..read]) {
            tracing::warn!(channel = name, error = %err, "output stage rejected chunk; discarding the rest");
            stage_failed = true;
        }
    }

    if let Err(err) = stage.end() {
        tracing::warn!(channel = name, error = %err, "failed ending output stage");
    }
}
