use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What happens to a queued send when the buffer is full while
/// `Connecting` (§4.7 "Send policy").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferOverflowStrategy {
    /// Evict the oldest queued payload to make room for the new one.
    DropOldest,
    /// Discard the new payload, keeping the queue as it was.
    DropLatest,
    /// Reject the send and transition the socket to `Closing`.
    Error,
}

impl Default for BufferOverflowStrategy {
    fn default() -> Self {
        BufferOverflowStrategy::Error
    }
}

/// §6 "Configuration options" / §10.3: durations round-trip over the wire
/// as plain millisecond integers, the same shape the original protocol's
/// options use, while the in-process type stays a real [`Duration`].
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// A send-buffer length cap while `Connecting`; `None` is unbounded
/// (§6 "bufferLimit: integer ≥ 0 | ∞ — Default ∞").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BufferLimit(pub Option<usize>);

impl BufferLimit {
    pub const UNBOUNDED: BufferLimit = BufferLimit(None);

    pub fn bounded(limit: usize) -> Self {
        BufferLimit(Some(limit))
    }
}

/// Tunables for one [`crate::Socket`] (§4.7, §6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketOptions {
    pub buffer_limit: BufferLimit,
    pub buffer_overflow_strategy: BufferOverflowStrategy,
    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,
    #[serde(with = "duration_ms")]
    pub disconnect_timeout: Duration,
    #[serde(with = "duration_ms")]
    pub heartbeat_interval: Duration,
    #[serde(with = "duration_ms")]
    pub heartbeat_timeout: Duration,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            buffer_limit: BufferLimit::UNBOUNDED,
            buffer_overflow_strategy: BufferOverflowStrategy::Error,
            connect_timeout: Duration::from_millis(2000),
            disconnect_timeout: Duration::from_millis(2000),
            heartbeat_interval: Duration::from_millis(1000),
            heartbeat_timeout: Duration::from_millis(2000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let opts = SocketOptions::default();
        assert_eq!(opts.buffer_limit, BufferLimit::UNBOUNDED);
        assert_eq!(opts.buffer_overflow_strategy, BufferOverflowStrategy::Error);
        assert_eq!(opts.connect_timeout, Duration::from_millis(2000));
        assert_eq!(opts.disconnect_timeout, Duration::from_millis(2000));
        assert_eq!(opts.heartbeat_interval, Duration::from_millis(1000));
        assert_eq!(opts.heartbeat_timeout, Duration::from_millis(2000));
    }

    #[test]
    fn durations_serialize_as_milliseconds() {
        let opts = SocketOptions::default();
        let json = serde_json::to_value(&opts).unwrap();
        assert_eq!(json["heartbeat_interval"], serde_json::json!(1000));
        assert_eq!(json["connect_timeout"], serde_json::json!(2000));
        let back: SocketOptions = serde_json::from_value(json).unwrap();
        assert_eq!(back, opts);
    }
}
