//! API server: HTTP reporting routes, the gRPC admin service and the
//! Prometheus exporter, each on its own port.

use crate::grpc::{MetricsServiceImpl, MetricsServiceServer};
use crate::rest::{self, AppState};
use axum::routing::get;
use axum::Router;
use gateway_core::config::AppConfig;
use gateway_limiter::AdaptiveLimitSetter;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Routes of the HTTP reporting surface.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/public/pub-rate/:period", get(rest::publish_rate))
        .route("/v1/public/read/:period", get(rest::read_status))
        .route("/v1/public/followers", get(rest::followers))
        .route("/v1/public/top-interests", get(rest::top_interests))
        .route("/v1/public/duration", get(rest::duration))
        .route("/v1/attr/types", get(rest::attribute_types))
        .route("/v1/attr/values/:name", get(rest::attribute_values))
        .route("/v1/src/feeds", get(rest::feed_sources))
        .route("/v1/src/socials", get(rest::social_sources))
        .route("/v1/src/realtime", get(rest::realtime_sources))
        // Operational endpoints
        .route("/health", get(rest::health_check))
        .route("/ready", get(rest::readiness))
        .route("/live", get(rest::liveness))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct ApiServer {
    config: AppConfig,
    state: AppState,
    setter: Arc<AdaptiveLimitSetter>,
}

impl ApiServer {
    pub fn new(config: AppConfig, state: AppState, setter: Arc<AdaptiveLimitSetter>) -> Self {
        Self {
            config,
            state,
            setter,
        }
    }

    fn addr(&self, port: u16) -> anyhow::Result<SocketAddr> {
        Ok(SocketAddr::new(self.config.api.host.parse()?, port))
    }

    /// Start the HTTP reporting server.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = router(self.state.clone());
        let addr = self.addr(self.config.api.http_port)?;

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the gRPC admin server.
    pub async fn start_grpc(&self) -> anyhow::Result<()> {
        let addr = self.addr(self.config.api.grpc_port)?;
        let service = MetricsServiceServer::new(MetricsServiceImpl::new(self.setter.clone()));

        info!(addr = %addr, "Starting gRPC server");

        tonic::transport::Server::builder()
            .add_service(service)
            .serve(addr)
            .await?;

        Ok(())
    }

    /// Install the metrics recorder and serve it on the metrics port.
    pub fn start_metrics(&self) -> anyhow::Result<()> {
        let addr = self.addr(self.config.metrics.port)?;
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use gateway_core::interests::StaticInterests;
    use gateway_core::query::StaticMetrics;
    use gateway_core::types::{NumberHistory, NumberPast, Window};
    use gateway_core::{InterestSummary, QueryError};
    use serde_json::Value;
    use std::collections::HashMap;
    use std::time::Instant;
    use tower::ServiceExt;

    fn state(metrics: StaticMetrics, interests: StaticInterests) -> AppState {
        AppState {
            metrics: Arc::new(metrics),
            interests: Arc::new(interests),
            default_group: "default".to_string(),
            fanout_limit: 2,
            start_time: Instant::now(),
        }
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, headers, json)
    }

    #[tokio::test]
    async fn test_publish_rate_is_cached_for_the_period() {
        let metrics =
            StaticMetrics::new().with_sum("awk_published_events_count", Window::Hour, Ok(2.5));
        let app = router(state(metrics, StaticInterests::new()));

        let (status, headers, body) = get_json(app, "/v1/public/pub-rate/1h").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["value"], 2.5);
        assert_eq!(
            headers["cache-control"],
            "must-revalidate, public, max-age=3600"
        );
        assert!(headers.contains_key("date"));
    }

    #[tokio::test]
    async fn test_publish_rate_rejects_query_injection() {
        let app = router(state(StaticMetrics::new(), StaticInterests::new()));
        let (status, _, body) = get_json(app, "/v1/public/pub-rate/1h%5D").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_request");
    }

    #[tokio::test]
    async fn test_read_status_reports_source_shares() {
        let metrics = StaticMetrics::new()
            .with_sum("awk_reader_read_count", Window::Day, Ok(100.0))
            .with_rates(
                "awk_reader_sources_read_count",
                Window::Day,
                Ok(HashMap::from([
                    ("feed:A".to_string(), 25.0),
                    ("feed:B".to_string(), 0.0),
                ])),
            );
        let app = router(state(metrics, StaticInterests::new()));

        let (status, _, body) = get_json(app, "/v1/public/read/1d").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["readRate"], 100.0);
        assert_eq!(body["sourcesMostRead"]["feed:A"], 0.25);
        assert!(body["sourcesMostRead"].get("feed:B").is_none());
    }

    #[tokio::test]
    async fn test_query_failure_is_internal_error() {
        let metrics = StaticMetrics::new().with_sum(
            "awk_published_events_count",
            Window::Day,
            Err(QueryError::Transport("refused".into())),
        );
        let app = router(state(metrics, StaticInterests::new()));

        let (status, headers, body) = get_json(app, "/v1/public/pub-rate/1d").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "publish_rate_failed");
        assert!(!headers.contains_key("cache-control"));
    }

    #[tokio::test]
    async fn test_followers_history() {
        let history = NumberHistory {
            current: 42.0,
            past: NumberPast {
                hour: 40.0,
                day: 30.0,
                month: 10.0,
            },
        };
        let metrics =
            StaticMetrics::new().with_history("awk_followers_active_distinct_count", history);
        let app = router(state(metrics, StaticInterests::new()));

        let (status, headers, body) = get_json(app, "/v1/public/followers").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["current"], 42.0);
        assert_eq!(body["past"]["month"], 10.0);
        assert_eq!(headers["cache-control"], "max-age=300, public");
    }

    #[tokio::test]
    async fn test_source_counts_use_their_metrics() {
        let metrics = Arc::new(StaticMetrics::new());
        let app = router(AppState {
            metrics: metrics.clone(),
            ..state(StaticMetrics::new(), StaticInterests::new())
        });
        for uri in ["/v1/src/feeds", "/v1/src/socials", "/v1/src/realtime"] {
            let (status, _, _) = get_json(app.clone(), uri).await;
            assert_eq!(status, StatusCode::OK);
        }
        assert_eq!(
            metrics.queries(),
            vec![
                "history:awk_source_feeds_count_pull",
                "history:awk_source_activitypub_count_total",
                "history:awk_source_feeds_count_push",
            ]
        );
    }

    #[tokio::test]
    async fn test_duration_quantiles() {
        let app = router(state(StaticMetrics::new(), StaticInterests::new()));

        let (status, _, body) = get_json(app, "/v1/public/duration").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["q0_5"], 0.5);
        assert_eq!(body["q0_99"], 0.99);
    }

    #[tokio::test]
    async fn test_top_interests_lists_public_only() {
        let interests = StaticInterests::new();
        for (id, followers, public) in [("a", 30, true), ("b", 20, false), ("c", 10, true)] {
            interests.insert(
                id,
                InterestSummary {
                    description: format!("interest {id}"),
                    followers,
                    public,
                },
            );
        }
        let app = router(state(StaticMetrics::new(), interests));

        let (status, _, body) = get_json(app, "/v1/public/top-interests").await;

        assert_eq!(status, StatusCode::OK);
        let top = body.as_object().unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(body["a"]["followers"], 30);
        assert_eq!(body["c"]["description"], "interest c");
        assert!(body["a"].get("public").is_none());
    }

    #[tokio::test]
    async fn test_attribute_types_merge_built_ins() {
        let app = router(state(StaticMetrics::new(), StaticInterests::new()));

        let (status, _, body) = get_json(app, "/v1/attr/types").await;

        assert_eq!(status, StatusCode::OK);
        let types = &body["typesByKey"];
        assert_eq!(types["latitude"], serde_json::json!(["int32"]));
        assert_eq!(types[""].as_array().unwrap().len(), 7);
        assert!(types.get("evtid").is_none());
    }

    #[tokio::test]
    async fn test_attribute_values_validate_name() {
        let metrics = Arc::new(StaticMetrics::new());
        let app = router(AppState {
            metrics: metrics.clone(),
            ..state(StaticMetrics::new(), StaticInterests::new())
        });

        let (ok, _, _) = get_json(app.clone(), "/v1/attr/values/language").await;
        let (bad, _, _) = get_json(app, "/v1/attr/values/a-b").await;

        assert_eq!(ok, StatusCode::OK);
        assert_eq!(bad, StatusCode::BAD_REQUEST);
        assert_eq!(metrics.queries(), vec!["attr_values:language"]);
    }

    #[tokio::test]
    async fn test_probes() {
        let app = router(state(StaticMetrics::new(), StaticInterests::new()));
        let (status, _, body) = get_json(app.clone(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        let (ready, _, _) = get_json(app.clone(), "/ready").await;
        let (live, _, _) = get_json(app, "/live").await;
        assert_eq!(ready, StatusCode::OK);
        assert_eq!(live, StatusCode::OK);
    }
}
