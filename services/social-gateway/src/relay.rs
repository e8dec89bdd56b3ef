//! Relay surface
//!
//! `GET /api/{*endpoint}` forwards the path suffix and all query parameters
//! through the credential pool. Callers never see which credential served
//! them beyond the `served_by` label in the response; failover, quarantine,
//! and retries all happen inside the pool.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::{info, warn};

use keypool::{Error as PoolError, KeyPool};

use crate::metrics;

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<KeyPool>,
    pub prometheus: PrometheusHandle,
    pub started_at: Instant,
}

/// JSON response helper used by all handlers.
pub fn json_response(status: StatusCode, body: serde_json::Value) -> Response {
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// GET /api/{*endpoint}: forward a query to the aggregation service.
pub async fn relay_handler(
    State(state): State<AppState>,
    Path(endpoint): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    let start = Instant::now();

    match state.pool.fetch_json(&endpoint, &params).await {
        Ok(success) => {
            let duration = start.elapsed();
            info!(
                request_id,
                endpoint,
                served_by = %success.served_by,
                duration_ms = duration.as_millis() as u64,
                "relay request served"
            );
            metrics::record_relay("success", duration.as_secs_f64());
            json_response(
                StatusCode::OK,
                serde_json::json!({
                    "data": success.data,
                    "served_by": success.served_by,
                }),
            )
        }
        Err(err) => {
            let duration = start.elapsed();
            let (status, kind) = match &err {
                PoolError::Upstream { status, .. } => (
                    StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
                    "upstream_error",
                ),
                PoolError::PoolExhausted(_) => (StatusCode::SERVICE_UNAVAILABLE, "pool_exhausted"),
                PoolError::AllFailed(_) => (StatusCode::SERVICE_UNAVAILABLE, "all_failed"),
            };
            warn!(
                request_id,
                endpoint,
                error = %err,
                duration_ms = duration.as_millis() as u64,
                "relay request failed"
            );
            metrics::record_relay(kind, duration.as_secs_f64());
            json_response(
                status,
                serde_json::json!({
                    "error": {
                        "type": kind,
                        "message": err.to_string(),
                        "request_id": request_id,
                    }
                }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;
    use keypool::{ApiKey, FailureKind, PoolOptions};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::time::Duration;

    fn test_state(pool: KeyPool) -> AppState {
        AppState {
            pool: Arc::new(pool),
            prometheus: PrometheusBuilder::new().build_recorder().handle(),
            started_at: Instant::now(),
        }
    }

    fn test_pool(base_url: &str, labels: &[&str]) -> KeyPool {
        let keys = labels
            .iter()
            .map(|l| ApiKey::new(*l, format!("tok-{l}")))
            .collect();
        let options = PoolOptions {
            request_timeout: Duration::from_secs(5),
            ..PoolOptions::default()
        };
        KeyPool::new(base_url, keys, options, reqwest::Client::new())
    }

    async fn spawn_upstream(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn relay_returns_payload_tagged_with_serving_credential() {
        let router = Router::new().route(
            "/{*rest}",
            get(|| async { (StatusCode::OK, r#"{"posts":[]}"#.to_string()) }),
        );
        let base = spawn_upstream(router).await;
        let state = test_state(test_pool(&base, &["primary"]));

        let response = relay_handler(
            State(state),
            Path("youtube/hashtag/search".into()),
            Query(HashMap::from([("name".to_string(), "rust".to_string())])),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["served_by"], "primary");
        assert_eq!(body["data"]["posts"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn relay_passes_through_terminal_upstream_status() {
        let router = Router::new().route(
            "/{*rest}",
            get(|| async { (StatusCode::NOT_FOUND, "no such endpoint".to_string()) }),
        );
        let base = spawn_upstream(router).await;
        let state = test_state(test_pool(&base, &["primary"]));

        let response =
            relay_handler(State(state), Path("bogus".into()), Query(HashMap::new())).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"]["type"], "upstream_error");
        assert!(
            body["error"]["request_id"]
                .as_str()
                .unwrap()
                .starts_with("req_")
        );
    }

    #[tokio::test]
    async fn relay_maps_exhausted_pool_to_503() {
        let pool = test_pool("http://unreachable.invalid", &["primary"]);
        pool.report_failure("primary", FailureKind::RateLimited).await;
        let state = test_state(pool);

        let response =
            relay_handler(State(state), Path("search".into()), Query(HashMap::new())).await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["error"]["type"], "pool_exhausted");
    }
}
