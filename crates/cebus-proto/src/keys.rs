//! Message keys for partitioning and compaction.
//!
//! Key format:
//! - point-to-point: `<origin>@<target>`
//! - broadcast: `<cluster>`
//!
//! All events between the same origin and target share a key, so the broker
//! keeps them ordered on one partition and compaction retains the latest.

use std::fmt;

/// Separator between origin and target in point-to-point keys.
pub const KEY_SEPARATOR: char = '@';

/// Partition/compaction key attached to an outbound event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageKey(String);

impl MessageKey {
    /// Key for an event from `origin` to `target`.
    #[must_use]
    pub fn point_to_point(origin: &str, target: &str) -> Self {
        Self(format!("{origin}{KEY_SEPARATOR}{target}"))
    }

    /// Key for a broadcast from `cluster`.
    #[must_use]
    pub fn broadcast(cluster: &str) -> Self {
        Self(cluster.to_string())
    }

    /// Rebuild a key received from the transport.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Split the key into origin and, for point-to-point keys, target.
    #[must_use]
    pub fn parts(&self) -> (&str, Option<&str>) {
        match self.0.split_once(KEY_SEPARATOR) {
            Some((origin, target)) => (origin, Some(target)),
            None => (&self.0, None),
        }
    }

    /// Whether this is a broadcast key.
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        !self.0.contains(KEY_SEPARATOR)
    }

    /// Borrow the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_to_point_key() {
        let key = MessageKey::point_to_point("hub", "cluster7");
        assert_eq!(key.as_str(), "hub@cluster7");
        assert_eq!(key.parts(), ("hub", Some("cluster7")));
        assert!(!key.is_broadcast());
    }

    #[test]
    fn broadcast_key_is_cluster() {
        let key = MessageKey::broadcast("cluster7");
        assert_eq!(key.as_str(), "cluster7");
        assert_eq!(key.parts(), ("cluster7", None));
        assert!(key.is_broadcast());
    }

    #[test]
    fn same_pair_same_key() {
        for (origin, target) in [("hub", "c1"), ("hub-2", "c1"), ("*", "c9")] {
            assert_eq!(
                MessageKey::point_to_point(origin, target),
                MessageKey::from_raw(format!("{origin}@{target}"))
            );
        }
    }
}
