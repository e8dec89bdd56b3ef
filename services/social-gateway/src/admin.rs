//! Ops surface: health, per-credential status, and manual reset
//!
//! Endpoints:
//! - GET  /health: overall service + pool health (200 unless unhealthy)
//! - GET  /status: per-credential snapshots, tokens never included
//! - POST /reset: force every credential active; operator recovery
//! - GET  /metrics: Prometheus text exposition

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use tracing::info;

use crate::relay::{AppState, json_response};

/// GET /health: pool health plus uptime and totals.
///
/// Unhealthy (no active credential) maps to 503 so load balancers stop
/// routing to an instance that cannot serve anything.
pub async fn health_handler(State(state): State<AppState>) -> Response {
    let pool = state.pool.health().await;
    let status_code = if pool["status"] == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    json_response(
        status_code,
        serde_json::json!({
            "status": pool["status"],
            "uptime_seconds": state.started_at.elapsed().as_secs(),
            "pool": pool,
        }),
    )
}

/// GET /status: read-only credential snapshots for dashboards and debugging.
pub async fn status_handler(State(state): State<AppState>) -> Response {
    let snapshots = state.pool.status().await;
    json_response(
        StatusCode::OK,
        serde_json::json!({ "credentials": snapshots }),
    )
}

/// POST /reset: restore every credential and cancel pending reactivations.
pub async fn reset_handler(State(state): State<AppState>) -> Response {
    state.pool.reset_all().await;
    info!("credential pool reset via admin endpoint");
    json_response(StatusCode::OK, serde_json::json!({ "reset": true }))
}

/// GET /metrics: Prometheus text exposition format.
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    use axum::response::IntoResponse;
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use keypool::{ApiKey, FailureKind, KeyPool, PoolOptions};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::Arc;
    use std::time::Instant;

    fn test_state(labels: &[&str]) -> AppState {
        let keys = labels
            .iter()
            .map(|l| ApiKey::new(*l, format!("tok-{l}")))
            .collect();
        let pool = KeyPool::new(
            "http://unreachable.invalid",
            keys,
            PoolOptions::default(),
            reqwest::Client::new(),
        );
        AppState {
            pool: Arc::new(pool),
            prometheus: PrometheusBuilder::new().build_recorder().handle(),
            started_at: Instant::now(),
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_200_while_any_credential_is_active() {
        let state = test_state(&["a", "b"]);
        state.pool.report_failure("a", FailureKind::RateLimited).await;

        let response = health_handler(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["pool"]["keys_quarantined"], 1);
    }

    #[tokio::test]
    async fn health_is_503_when_pool_is_unhealthy() {
        let state = test_state(&["a"]);
        state.pool.report_failure("a", FailureKind::RateLimited).await;

        let response = health_handler(State(state)).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn status_lists_every_credential_without_tokens() {
        let state = test_state(&["a", "b"]);
        let response = status_handler(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let creds = body["credentials"].as_array().unwrap();
        assert_eq!(creds.len(), 2);
        assert_eq!(creds[0]["label"], "a");
        assert_eq!(creds[0]["active"], true);
        assert!(
            !serde_json::to_string(&body).unwrap().contains("tok-"),
            "tokens must never appear in status output"
        );
    }

    #[tokio::test]
    async fn reset_restores_quarantined_credentials() {
        let state = test_state(&["a"]);
        state.pool.report_failure("a", FailureKind::RateLimited).await;

        let response = reset_handler(State(state.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);

        let snapshots = state.pool.status().await;
        assert!(snapshots[0].active);
        assert_eq!(snapshots[0].error_count, 0);
    }

    #[tokio::test]
    async fn metrics_renders_text_exposition() {
        let state = test_state(&["a"]);
        let response = metrics_handler(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .unwrap();
        assert!(content_type.to_str().unwrap().starts_with("text/plain"));
    }
}
