//! Credential pool for the social-data aggregation API
//!
//! Manages multiple API tokens with health-based selection, transparent
//! failover, and time-based quarantine. Callers see a single logical
//! "fetch JSON from upstream" operation; the pool hides which credential
//! served it.
//!
//! Credential lifecycle:
//! 1. Credentials are fixed at construction, all active with zero errors
//! 2. Pool selects the active credential with the fewest errors, least
//!    recently used first
//! 3. Quota status (495/429) or repeated failures quarantine the credential
//!    for the configured cooldown
//! 4. Cooldown expiry runs a one-shot reactivation task that restores the
//!    credential and clears its error count
//! 5. `reset_all` force-restores every credential and cancels pending
//!    reactivations

pub mod classify;
pub mod credential;
pub mod error;
pub mod pool;

pub use classify::{FailureKind, classify_status};
pub use credential::{ApiKey, KeySnapshot};
pub use error::{Error, Result};
pub use pool::{FetchSuccess, KeyPool, PoolOptions, SelectedKey};
