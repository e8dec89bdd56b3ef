//! Credential definition and status snapshots

use std::time::Instant;

use common::Secret;
use serde::Serialize;
use tokio::task::JoinHandle;

/// One account/token pair usable against the aggregation service.
///
/// The label is an opaque identity used only for logging and selection
/// tie-breaks; the token is the secret injected into upstream requests.
/// Credentials are defined at construction and live for the process lifetime.
pub struct ApiKey {
    pub label: String,
    pub token: Secret<String>,
}

impl ApiKey {
    pub fn new(label: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            token: Secret::new(token.into()),
        }
    }
}

/// Runtime health state for one credential.
///
/// Owned exclusively by the pool; all mutation happens under the pool's
/// write lock. `reactivation` holds the single pending cooldown timer, if
/// any. At most one may exist per credential.
pub(crate) struct KeySlot {
    pub(crate) key: ApiKey,
    pub(crate) active: bool,
    pub(crate) error_count: u32,
    pub(crate) last_used: Option<Instant>,
    pub(crate) reactivation: Option<JoinHandle<()>>,
}

impl KeySlot {
    pub(crate) fn new(key: ApiKey) -> Self {
        Self {
            key,
            active: true,
            error_count: 0,
            last_used: None,
            reactivation: None,
        }
    }

    /// Selection order: fewest errors first, then least recently used.
    /// `None` sorts before any `Some`, so a never-used credential wins the
    /// tie against any used one.
    pub(crate) fn selection_rank(&self) -> (u32, Option<Instant>) {
        (self.error_count, self.last_used)
    }

    pub(crate) fn snapshot(&self) -> KeySnapshot {
        KeySnapshot {
            label: self.key.label.clone(),
            active: self.active,
            error_count: self.error_count,
            idle_secs: self.last_used.map(|t| t.elapsed().as_secs()),
        }
    }
}

/// Read-only view of one credential's health, for the status surface.
/// Never carries the token.
#[derive(Debug, Clone, Serialize)]
pub struct KeySnapshot {
    pub label: String,
    pub active: bool,
    pub error_count: u32,
    /// Seconds since the credential was last used; `None` means never used.
    pub idle_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn new_slot_starts_active_and_clean() {
        let slot = KeySlot::new(ApiKey::new("k1", "tok-1"));
        assert!(slot.active);
        assert_eq!(slot.error_count, 0);
        assert!(slot.last_used.is_none());
        assert!(slot.reactivation.is_none());
    }

    #[test]
    fn never_used_ranks_before_used() {
        let unused = KeySlot::new(ApiKey::new("a", "t"));
        let mut used = KeySlot::new(ApiKey::new("b", "t"));
        used.last_used = Some(Instant::now());
        assert!(unused.selection_rank() < used.selection_rank());
    }

    #[test]
    fn fewer_errors_rank_first_regardless_of_recency() {
        let mut clean = KeySlot::new(ApiKey::new("a", "t"));
        clean.last_used = Some(Instant::now());
        let mut dirty = KeySlot::new(ApiKey::new("b", "t"));
        dirty.error_count = 2;
        // dirty was never used, but its error count loses the comparison
        assert!(clean.selection_rank() < dirty.selection_rank());
    }

    #[test]
    fn older_use_ranks_before_newer_use() {
        let mut older = KeySlot::new(ApiKey::new("a", "t"));
        let mut newer = KeySlot::new(ApiKey::new("b", "t"));
        older.last_used = Some(Instant::now());
        std::thread::sleep(Duration::from_millis(2));
        newer.last_used = Some(Instant::now());
        assert!(older.selection_rank() < newer.selection_rank());
    }

    #[test]
    fn snapshot_reflects_slot_state() {
        let mut slot = KeySlot::new(ApiKey::new("k1", "tok-1"));
        slot.error_count = 2;
        slot.active = false;
        let snap = slot.snapshot();
        assert_eq!(snap.label, "k1");
        assert!(!snap.active);
        assert_eq!(snap.error_count, 2);
        assert!(snap.idle_secs.is_none());
    }

    #[test]
    fn snapshot_serializes_without_token() {
        let slot = KeySlot::new(ApiKey::new("k1", "tok-secret"));
        let json = serde_json::to_string(&slot.snapshot()).unwrap();
        assert!(json.contains("\"label\":\"k1\""), "got: {json}");
        assert!(!json.contains("tok-secret"), "token leaked: {json}");
    }
}
