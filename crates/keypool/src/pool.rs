//! Pool state machine, credential selection, and request execution
//!
//! Each credential moves through an explicit state machine:
//! Active → Quarantined (quota status or error threshold) → Active
//! (cooldown expired). The reactivation is a one-shot deferred task owned by
//! the pool, so `reset_all` can cancel it deterministically instead of racing
//! a fire-and-forget callback.
//!
//! Selection and bookkeeping are synchronous under a single `RwLock`; the
//! lock is never held across the upstream HTTP await. Two concurrent callers
//! may pick the same "best" credential before either outcome lands; that
//! race is accepted. Lost updates to error counts are not: every mutation
//! goes through the write lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::classify::{FailureKind, classify_status};
use crate::credential::{ApiKey, KeySlot, KeySnapshot};
use crate::error::{Error, Result};

/// Tuning knobs for quarantine behavior and per-attempt timeouts.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Error count at which a credential is quarantined even without a
    /// quota status.
    pub error_threshold: u32,
    /// How long a quarantined credential stays out of selection.
    pub cooldown: std::time::Duration,
    /// Per-attempt HTTP timeout; expiry counts as a transport failure.
    pub request_timeout: std::time::Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            error_threshold: 3,
            cooldown: std::time::Duration::from_secs(60 * 60),
            request_timeout: std::time::Duration::from_secs(30),
        }
    }
}

/// A selected credential, ready for one request attempt.
///
/// The token stays crate-private; callers outside the crate only ever see
/// which label served a request.
pub struct SelectedKey {
    pub label: String,
    pub(crate) token: String,
}

impl std::fmt::Debug for SelectedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectedKey")
            .field("label", &self.label)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Success payload from `fetch_json`: the parsed body plus the credential
/// that served it.
#[derive(Debug)]
pub struct FetchSuccess {
    pub data: Value,
    pub served_by: String,
}

/// Credential pool mediating all calls to the aggregation service.
///
/// Single authority for choosing which credential to use next, issuing the
/// upstream call, and updating credential health. No other component mutates
/// credential state.
pub struct KeyPool {
    slots: Arc<RwLock<Vec<KeySlot>>>,
    client: reqwest::Client,
    base_url: String,
    options: PoolOptions,
}

impl KeyPool {
    /// Create a pool over a fixed credential set. Every credential starts
    /// active with a zero error count.
    pub fn new(
        base_url: impl Into<String>,
        keys: Vec<ApiKey>,
        options: PoolOptions,
        client: reqwest::Client,
    ) -> Self {
        let slots: Vec<KeySlot> = keys.into_iter().map(KeySlot::new).collect();
        info!(keys = slots.len(), "credential pool initialized");
        Self {
            slots: Arc::new(RwLock::new(slots)),
            client,
            base_url: base_url.into(),
            options,
        }
    }

    /// Pick the best credential for the next attempt, or `None` when no
    /// active credential exists. Pure selection, no side effects.
    ///
    /// Order: ascending error count, then ascending last-used time with
    /// never-used credentials first; ties fall back to definition order.
    pub async fn select_key(&self) -> Option<SelectedKey> {
        let slots = self.slots.read().await;
        slots
            .iter()
            .filter(|s| s.active)
            .min_by_key(|s| s.selection_rank())
            .map(|s| SelectedKey {
                label: s.key.label.clone(),
                token: s.key.token.expose().clone(),
            })
    }

    /// Issue a GET against `{base_url}/{endpoint}` with the given query
    /// parameters, failing over across credentials.
    ///
    /// Attempts up to pool-size times so every credential gets at most one
    /// try per logical call. Transport failures and quota statuses move on
    /// to the next credential; any other error status aborts immediately
    /// (the request itself is assumed bad). The credential secret is
    /// injected as the `token` query parameter and never appears in logs.
    pub async fn fetch_json(
        &self,
        endpoint: &str,
        params: &HashMap<String, String>,
    ) -> Result<FetchSuccess> {
        let attempts = self.slots.read().await.len();
        if attempts == 0 {
            return Err(Error::PoolExhausted(self.exhausted_message().await));
        }

        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        );
        let mut last_error = String::new();

        for attempt in 0..attempts {
            let Some(selected) = self.select_key().await else {
                metrics::counter!("keypool_requests_total", "outcome" => "exhausted").increment(1);
                return Err(Error::PoolExhausted(self.exhausted_message().await));
            };
            debug!(attempt, key = %selected.label, endpoint, "issuing upstream request");

            let response = match self
                .client
                .get(&url)
                .query(params)
                .query(&[("token", selected.token.as_str())])
                .header(reqwest::header::ACCEPT, "application/json")
                .timeout(self.options.request_timeout)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!(key = %selected.label, error = %e, "transport failure, trying next credential");
                    last_error = e.to_string();
                    self.report_failure(&selected.label, FailureKind::Transport)
                        .await;
                    continue;
                }
            };

            let status = response.status().as_u16();
            if response.status().is_success() {
                let body = match response.text().await {
                    Ok(b) => b,
                    Err(e) => {
                        warn!(key = %selected.label, error = %e, "failed reading upstream body");
                        last_error = e.to_string();
                        self.report_failure(&selected.label, FailureKind::Transport)
                            .await;
                        continue;
                    }
                };
                match serde_json::from_str::<Value>(&body) {
                    Ok(data) => {
                        self.report_success(&selected.label).await;
                        debug!(key = %selected.label, endpoint, "upstream request served");
                        metrics::counter!("keypool_requests_total", "outcome" => "success")
                            .increment(1);
                        return Ok(FetchSuccess {
                            data,
                            served_by: selected.label,
                        });
                    }
                    Err(e) => {
                        // 2xx with an unparseable body still charges the
                        // credential that produced it
                        warn!(key = %selected.label, error = %e, "upstream returned invalid JSON");
                        last_error = format!("invalid JSON from upstream: {e}");
                        self.report_failure(&selected.label, FailureKind::Transport)
                            .await;
                        continue;
                    }
                }
            }

            // Non-2xx: body is diagnostics only
            let body = response.text().await.unwrap_or_default();
            let kind = classify_status(status);
            self.report_failure(&selected.label, kind).await;

            if kind.is_retryable() {
                info!(key = %selected.label, status, "credential hit its quota, trying next credential");
                last_error = format!("status {status}: {body}");
                continue;
            }

            warn!(key = %selected.label, status, "upstream rejected request, not retrying");
            metrics::counter!("keypool_requests_total", "outcome" => "request_error").increment(1);
            return Err(Error::Upstream {
                status,
                message: body,
            });
        }

        metrics::counter!("keypool_requests_total", "outcome" => "all_failed").increment(1);
        Err(Error::AllFailed(last_error))
    }

    /// Record a failed attempt against a credential.
    ///
    /// Increments the error count and stamps last-used. A quota failure, or
    /// any failure that pushes the count to the threshold, quarantines the
    /// credential and schedules its one-shot reactivation. Reporting another
    /// failure on an already-quarantined credential never stacks a second
    /// timer.
    pub async fn report_failure(&self, label: &str, kind: FailureKind) {
        let mut slots = self.slots.write().await;
        let Some(slot) = slots.iter_mut().find(|s| s.key.label == label) else {
            warn!(key = label, "failure reported for unknown credential");
            return;
        };

        slot.error_count += 1;
        slot.last_used = Some(Instant::now());
        debug!(key = %slot.key.label, errors = slot.error_count, kind = kind.label(), "failure recorded");

        let quarantine =
            kind == FailureKind::RateLimited || slot.error_count >= self.options.error_threshold;
        if quarantine && slot.active {
            slot.active = false;
            info!(
                key = %slot.key.label,
                errors = slot.error_count,
                kind = kind.label(),
                cooldown_secs = self.options.cooldown.as_secs(),
                "credential quarantined"
            );
            metrics::counter!("keypool_quarantines_total").increment(1);
            slot.reactivation = Some(self.spawn_reactivation(slot.key.label.clone()));
        }
    }

    /// Record a successful attempt: stamp last-used and decrement the error
    /// count, floored at zero. A success partially heals a credential; a
    /// borderline one stays slightly deprioritized until it earns more.
    pub async fn report_success(&self, label: &str) {
        let mut slots = self.slots.write().await;
        if let Some(slot) = slots.iter_mut().find(|s| s.key.label == label) {
            slot.last_used = Some(Instant::now());
            slot.error_count = slot.error_count.saturating_sub(1);
        }
    }

    /// Per-credential snapshots for the status surface. Pure read.
    pub async fn status(&self) -> Vec<KeySnapshot> {
        self.slots.read().await.iter().map(|s| s.snapshot()).collect()
    }

    /// Pool health summary for the health endpoint.
    ///
    /// Status mapping: all active → healthy, some active → degraded,
    /// none active → unhealthy.
    pub async fn health(&self) -> Value {
        let slots = self.slots.read().await;
        let total = slots.len();
        let active = slots.iter().filter(|s| s.active).count();

        let status = if active == total && total > 0 {
            "healthy"
        } else if active > 0 {
            "degraded"
        } else {
            "unhealthy"
        };

        let keys: Vec<Value> = slots
            .iter()
            .map(|s| serde_json::to_value(s.snapshot()).unwrap_or(Value::Null))
            .collect();

        serde_json::json!({
            "status": status,
            "keys_total": total,
            "keys_active": active,
            "keys_quarantined": total - active,
            "keys": keys,
        })
    }

    /// Force every credential back to active with a clean slate and cancel
    /// pending reactivations. Operator recovery and test harness surface,
    /// not part of the request path.
    pub async fn reset_all(&self) {
        let mut slots = self.slots.write().await;
        for slot in slots.iter_mut() {
            if let Some(handle) = slot.reactivation.take() {
                handle.abort();
            }
            slot.active = true;
            slot.error_count = 0;
            slot.last_used = None;
        }
        info!(keys = slots.len(), "all credentials reset");
    }

    /// Schedule the one-shot reactivation for a quarantined credential.
    /// After the cooldown the credential returns to active with a zero
    /// error count. Cancelable via the returned handle.
    fn spawn_reactivation(&self, label: String) -> tokio::task::JoinHandle<()> {
        let slots = Arc::clone(&self.slots);
        let cooldown = self.options.cooldown;
        tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            let mut slots = slots.write().await;
            if let Some(slot) = slots.iter_mut().find(|s| s.key.label == label) {
                slot.active = true;
                slot.error_count = 0;
                slot.reactivation = None;
                info!(key = %label, "credential reactivated after cooldown");
                metrics::counter!("keypool_reactivations_total").increment(1);
            }
        })
    }

    async fn exhausted_message(&self) -> String {
        let slots = self.slots.read().await;
        let total = slots.len();
        let active = slots.iter().filter(|s| s.active).count();
        format!("no active credential available ({active}/{total} active)")
    }
}
