//! Per-connection transport policy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Buffering behavior of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyKind {
    /// Keep only the most recent sample
    Data,
    /// Queue up to `size` samples, dropping the oldest on overflow
    Buffer { size: usize },
}

/// Transport policy attached to every connection in a data-flow graph.
///
/// Policy equality is the idempotence test for live connections: re-applying
/// an identical policy is a no-op, while any difference requires a full
/// disconnect-and-reconnect (there is no in-place policy mutation on a live
/// connection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionPolicy {
    pub kind: PolicyKind,
    #[serde(default)]
    pub reliable: bool,
}

impl ConnectionPolicy {
    pub fn data() -> Self {
        Self {
            kind: PolicyKind::Data,
            reliable: false,
        }
    }

    pub fn buffer(size: usize) -> Self {
        Self {
            kind: PolicyKind::Buffer { size },
            reliable: false,
        }
    }

    pub fn reliable(mut self) -> Self {
        self.reliable = true;
        self
    }
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        Self::data()
    }
}

impl fmt::Display for ConnectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            PolicyKind::Data => write!(f, "data")?,
            PolicyKind::Buffer { size } => write!(f, "buffer[{size}]")?,
        }
        if self.reliable {
            write!(f, ",reliable")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_equality_is_idempotence_test() {
        assert_eq!(ConnectionPolicy::data(), ConnectionPolicy::data());
        assert_ne!(ConnectionPolicy::data(), ConnectionPolicy::buffer(8));
        assert_ne!(
            ConnectionPolicy::buffer(8),
            ConnectionPolicy::buffer(8).reliable()
        );
    }

    #[test]
    fn test_policy_display() {
        assert_eq!(ConnectionPolicy::data().to_string(), "data");
        assert_eq!(
            ConnectionPolicy::buffer(16).reliable().to_string(),
            "buffer[16],reliable"
        );
    }
}
