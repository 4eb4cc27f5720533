//! Resource quotas.
//!
//! All quotas are enforced at the moment a resource is created or a message
//! is enqueued; nothing here is periodic. Exceeding a queue quota either
//! bounces the request back to the sender (unicast) or disconnects the slow
//! receiver (broadcast and driver-originated traffic), see the dispatcher.

use serde::{Deserialize, Serialize};

/// Quota knobs, loadable from the broker configuration.
///
/// The defaults are sized for a session bus and deliberately generous;
/// the process controller ships tighter values for the system bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Total bytes a peer's outgoing queue may hold.
    pub max_outgoing_bytes: usize,
    /// Number of messages a peer's outgoing queue may hold.
    pub max_outgoing_messages: usize,
    /// Match rules one peer may own.
    pub max_matches_per_peer: usize,
    /// Well-known name ownerships (including queued) one peer may hold.
    pub max_names_per_peer: usize,
    /// Reply slots one peer may have outstanding.
    pub max_replies_per_peer: usize,
    /// Requests plus captured messages one activation may queue.
    pub max_activation_entries: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_outgoing_bytes: 4 * 1024 * 1024,
            max_outgoing_messages: 4096,
            max_matches_per_peer: 512,
            max_names_per_peer: 512,
            max_replies_per_peer: 1024,
            max_activation_entries: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let limits: Limits =
            serde_json::from_str(r#"{ "max_matches_per_peer": 8 }"#).expect("valid config");
        assert_eq!(limits.max_matches_per_peer, 8);
        assert_eq!(limits.max_outgoing_bytes, Limits::default().max_outgoing_bytes);
    }
}
