//! Channel identities.
//!
//! A channel is identified by its registration index in a
//! [`MultiplexBuffer`](crate::MultiplexBuffer). Launched processes always
//! register stdout first and stderr second.

use std::fmt;

/// Registration index of an input channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub usize);

/// Child standard output.
pub const STDOUT: ChannelId = ChannelId(0);

/// Child standard error.
pub const STDERR: ChannelId = ChannelId(1);

impl ChannelId {
    /// Position of this channel in registration order.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Returns a human-readable name for a channel ID.
pub fn channel_name(id: ChannelId) -> &'static str {
    match id {
        STDOUT => "stdout",
        STDERR => "stderr",
        _ => "user",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names() {
        assert_eq!(channel_name(STDOUT), "stdout");
        assert_eq!(channel_name(STDERR), "stderr");
        assert_eq!(channel_name(ChannelId(7)), "user");
    }

    #[test]
    fn display_is_index() {
        assert_eq!(STDERR.to_string(), "1");
        assert_eq!(ChannelId(12).index(), 12);
    }
}
