//! Options shared by every stream binding of a run.

use flowline_core::codec::DecodePolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default capacity of the bounded record channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
/// Default time allowed to establish an outbound TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Stream binding options.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct StreamOptions {
    /// Capacity of each record channel. Senders wait when it is full.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Outbound TCP connect timeout (default: "5s").
    /// Accepts human-readable durations like "500ms", "2s".
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// What to do with input lines the parser rejects.
    #[serde(default)]
    pub decode: DecodePolicy,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            decode: DecodePolicy::default(),
        }
    }
}

impl StreamOptions {
    /// Channel capacity, never below one.
    pub fn capacity(&self) -> usize {
        self.channel_capacity.max(1)
    }
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stream_options_defaults() {
        let options: StreamOptions = serde_json::from_value(json!({})).unwrap();
        assert_eq!(options, StreamOptions::default());
        assert_eq!(options.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_stream_options_humantime() {
        let options: StreamOptions = serde_json::from_value(json!({
            "channel_capacity": 0,
            "connect_timeout": "250ms",
            "decode": "strict"
        }))
        .unwrap();
        assert_eq!(options.connect_timeout, Duration::from_millis(250));
        assert_eq!(options.decode, DecodePolicy::Strict);
        assert_eq!(options.capacity(), 1);
    }
}
