//! Synchronization settings fixed for the lifetime of an inventory

use shared::DEFAULT_BATCH_WIDTH;
use std::time::Duration;

/// When a local mutation becomes visible relative to the server's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPolicy {
    /// Apply locally before sending; roll back on rejection.
    #[default]
    Optimistic,
    /// Apply only once the server confirms.
    WaitServerAck,
    /// Apply locally; the server stays silent on success and only answers failures.
    ServerOnlySendsOnFailure,
}

impl SyncPolicy {
    pub fn applies_locally(&self) -> bool {
        !matches!(self, SyncPolicy::WaitServerAck)
    }

    /// Whether silence from the server means the operation succeeded.
    pub fn silence_means_success(&self) -> bool {
        matches!(self, SyncPolicy::ServerOnlySendsOnFailure)
    }
}

/// How a new intent is treated when it touches a slot another pending operation touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlapPolicy {
    /// Issue anyway; whichever response is resolved last wins.
    #[default]
    Allow,
    /// Refuse the new intent until the earlier operation resolves.
    Refuse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub policy: SyncPolicy,
    pub batch_width: u32,
    /// Age after which an unanswered operation is settled locally. `None` keeps it forever.
    pub pending_timeout: Option<Duration>,
    pub overlap: OverlapPolicy,
}

impl SyncConfig {
    pub fn with_policy(policy: SyncPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Overlap handling actually applied to new intents.
    ///
    /// Operations confirmed by silence only leave the tracker through the
    /// timeout, so without one `Refuse` degrades to `Allow`.
    pub fn enforced_overlap(&self) -> OverlapPolicy {
        if self.policy.silence_means_success() && self.pending_timeout.is_none() {
            OverlapPolicy::Allow
        } else {
            self.overlap
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            policy: SyncPolicy::default(),
            batch_width: DEFAULT_BATCH_WIDTH,
            pending_timeout: None,
            overlap: OverlapPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_application_per_policy() {
        assert!(SyncPolicy::Optimistic.applies_locally());
        assert!(!SyncPolicy::WaitServerAck.applies_locally());
        assert!(SyncPolicy::ServerOnlySendsOnFailure.applies_locally());
        assert!(SyncPolicy::ServerOnlySendsOnFailure.silence_means_success());
        assert!(!SyncPolicy::Optimistic.silence_means_success());
    }

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.policy, SyncPolicy::Optimistic);
        assert_eq!(config.batch_width, 100);
        assert_eq!(config.pending_timeout, None);
        assert_eq!(config.overlap, OverlapPolicy::Allow);

        let config = SyncConfig::with_policy(SyncPolicy::WaitServerAck);
        assert_eq!(config.policy, SyncPolicy::WaitServerAck);
        assert_eq!(config.batch_width, 100);
    }

    #[test]
    fn test_enforced_overlap() {
        let refuse = SyncConfig {
            overlap: OverlapPolicy::Refuse,
            ..SyncConfig::default()
        };
        assert_eq!(refuse.enforced_overlap(), OverlapPolicy::Refuse);

        let silent = SyncConfig {
            policy: SyncPolicy::ServerOnlySendsOnFailure,
            ..refuse.clone()
        };
        assert_eq!(silent.enforced_overlap(), OverlapPolicy::Allow);

        let silent_with_timeout = SyncConfig {
            pending_timeout: Some(Duration::from_secs(2)),
            ..silent
        };
        assert_eq!(silent_with_timeout.enforced_overlap(), OverlapPolicy::Refuse);
    }
}
