//! Channel identities.
//!
//! The server advertises two fixed channels, one per payload kind. Each
//! channel is a Unix domain socket named after the channel inside the
//! configured socket directory:
//!
//! ```text
//! <socket_dir>/string-channel.sock
//! <socket_dir>/number-channel.sock
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Payload kind carried by a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Arbitrary text, answered in uppercase.
    String,
    /// Decimal integers, answered with their square.
    Number,
}

impl ChannelKind {
    /// Every channel the server listens on.
    pub const ALL: [ChannelKind; 2] = [ChannelKind::String, ChannelKind::Number];

    /// Channel name used to address the endpoint.
    pub fn name(self) -> &'static str {
        match self {
            ChannelKind::String => "string-channel",
            ChannelKind::Number => "number-channel",
        }
    }

    /// Socket path for this channel inside `dir`.
    pub fn socket_path(self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.sock", self.name()))
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a channel name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown channel '{0}' (expected S, N, string-channel or number-channel)")]
pub struct UnknownChannel(pub String);

impl FromStr for ChannelKind {
    type Err = UnknownChannel;

    /// Accepts the full channel name or the operator shorthand `S` / `N`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("s") || trimmed == ChannelKind::String.name() {
            Ok(ChannelKind::String)
        } else if trimmed.eq_ignore_ascii_case("n") || trimmed == ChannelKind::Number.name() {
            Ok(ChannelKind::Number)
        } else {
            Err(UnknownChannel(s.to_string()))
        }
    }
}
