//! REST reporting endpoints and operational probes.

use axum::extract::{Path, State};
use axum::http::header::{CACHE_CONTROL, DATE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use gateway_core::types::{Attributes, DurationQuantiles, ReadStatus};
use gateway_core::{InterestSummary, InterestsDirectory, MetricsQuery, QueryError};
use gateway_query::promql::range_seconds;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, warn};

const PUBLISHED_EVENTS: &str = "awk_published_events_count";
const READ_EVENTS: &str = "awk_reader_read_count";
const SOURCE_READS: &str = "awk_reader_sources_read_count";
const ACTIVE_FOLLOWERS: &str = "awk_followers_active_distinct_count";
const DURATION_BUCKETS: &str = "awk_duration_bucket";
const OBSERVED_ATTRS: &str = "awk_published_attrs_observed_count";
const FEEDS_PULL: &str = "awk_source_feeds_count_pull";
const FEEDS_PUSH: &str = "awk_source_feeds_count_push";
const SOCIAL_SOURCES: &str = "awk_source_activitypub_count_total";

const TOP_INTERESTS_LIMIT: u32 = 10;

/// Seconds to cache answers over a period that cannot be parsed.
const MAX_PERIOD_SECS: u64 = 86_400;

/// Internal attributes never exposed to clients.
const ATTR_BLACKLIST: &[&str] = &["awakariuserid", "awkinternal", "evtid", "evtlink", "reason"];

/// Attributes every event may carry, with their possible types.
const ATTR_BUILT_IN: &[(&str, &[&str])] = &[
    (
        "",
        &["boolean", "bytes", "int32", "string", "uri", "uriref", "timestamp"],
    ),
    ("data", &["bytes", "string"]),
    ("latitude", &["int32"]),
    ("longitude", &["int32"]),
    ("source", &["string"]),
    ("type", &["string"]),
];

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<dyn MetricsQuery>,
    pub interests: Arc<dyn InterestsDirectory>,
    /// Group the gateway acts for when calling the interests service.
    pub default_group: String,
    pub fanout_limit: usize,
    pub start_time: Instant,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
}

#[derive(Serialize)]
pub struct ValueResponse {
    pub value: f64,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(message: impl Into<String>) -> ApiError {
    metrics::counter!("api.validation_errors").increment(1);
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: "invalid_request".to_string(),
            message: message.into(),
        }),
    )
}

fn upstream_failed(what: &str, err: impl std::fmt::Display) -> ApiError {
    error!(error = %err, what, "Reporting query failed");
    metrics::counter!("api.errors").increment(1);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: format!("{what}_failed"),
            message: err.to_string(),
        }),
    )
}

/// Range selectors are spliced into queries, so only `[0-9a-z]` is accepted.
fn validate_period(period: &str) -> Result<(), ApiError> {
    if period.is_empty() || period.len() > 16 {
        return Err(bad_request("period must be 1 to 16 characters"));
    }
    if !period.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()) {
        return Err(bad_request(format!("invalid period: {period}")));
    }
    Ok(())
}

fn validate_label_name(name: &str) -> Result<(), ApiError> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(bad_request(format!("invalid attribute name: {name}")))
    }
}

enum CachePolicy {
    /// Short lived snapshot.
    Snapshot,
    /// Answer over a period, valid for that long.
    Period(u64),
}

impl CachePolicy {
    fn for_period(period: &str) -> Self {
        CachePolicy::Period(range_seconds(period).unwrap_or(MAX_PERIOD_SECS))
    }

    fn header(&self) -> String {
        match self {
            CachePolicy::Snapshot => "max-age=300, public".to_string(),
            CachePolicy::Period(secs) => format!("must-revalidate, public, max-age={secs}"),
        }
    }
}

fn cached<T: Serialize>(policy: CachePolicy, body: T) -> Response {
    let mut response = Json(body).into_response();
    let headers = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&policy.header()) {
        headers.insert(CACHE_CONTROL, v);
    }
    let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
    if let Ok(v) = HeaderValue::from_str(&date) {
        headers.insert(DATE, v);
    }
    response
}

/// GET /v1/public/pub-rate/:period: publishing rate over the period.
pub async fn publish_rate(
    State(state): State<AppState>,
    Path(period): Path<String>,
) -> Result<Response, ApiError> {
    validate_period(&period)?;
    let value = state
        .metrics
        .rate_sum(PUBLISHED_EVENTS, "service", &period)
        .await
        .map_err(|e| upstream_failed("publish_rate", e))?;
    Ok(cached(
        CachePolicy::for_period(&period),
        ValueResponse { value },
    ))
}

/// GET /v1/public/read/:period: read rate and the most read sources.
pub async fn read_status(
    State(state): State<AppState>,
    Path(period): Path<String>,
) -> Result<Response, ApiError> {
    validate_period(&period)?;
    let read_rate = state
        .metrics
        .rate_sum(READ_EVENTS, "service", &period)
        .await
        .map_err(|e| upstream_failed("read_rate", e))?;
    let sources_most_read = state
        .metrics
        .relative_rate_by_label(read_rate, SOURCE_READS, "source", &period)
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "Most read sources query failed");
            Default::default()
        });
    Ok(cached(
        CachePolicy::for_period(&period),
        ReadStatus {
            read_rate,
            sources_most_read,
        },
    ))
}

async fn number_history(state: &AppState, metric: &str) -> Result<Response, ApiError> {
    let history = state
        .metrics
        .number_history(metric)
        .await
        .map_err(|e| upstream_failed("number_history", e))?;
    Ok(cached(CachePolicy::Snapshot, history))
}

/// GET /v1/public/followers
pub async fn followers(State(state): State<AppState>) -> Result<Response, ApiError> {
    number_history(&state, ACTIVE_FOLLOWERS).await
}

/// GET /v1/src/feeds
pub async fn feed_sources(State(state): State<AppState>) -> Result<Response, ApiError> {
    number_history(&state, FEEDS_PULL).await
}

/// GET /v1/src/socials
pub async fn social_sources(State(state): State<AppState>) -> Result<Response, ApiError> {
    number_history(&state, SOCIAL_SOURCES).await
}

/// GET /v1/src/realtime
pub async fn realtime_sources(State(state): State<AppState>) -> Result<Response, ApiError> {
    number_history(&state, FEEDS_PUSH).await
}

/// GET /v1/public/duration: event processing duration quantiles over 5m.
/// Failed quantiles are reported as zero.
pub async fn duration(State(state): State<AppState>) -> Response {
    let m = &state.metrics;
    let (q50, q75, q95, q99) = tokio::join!(
        m.duration_quantile(DURATION_BUCKETS, 0.5, "5m"),
        m.duration_quantile(DURATION_BUCKETS, 0.75, "5m"),
        m.duration_quantile(DURATION_BUCKETS, 0.95, "5m"),
        m.duration_quantile(DURATION_BUCKETS, 0.99, "5m"),
    );
    let or_zero = |r: Result<f64, QueryError>| {
        r.unwrap_or_else(|e| {
            warn!(error = %e, "Duration quantile query failed");
            0.0
        })
    };
    cached(
        CachePolicy::Snapshot,
        DurationQuantiles {
            q50: or_zero(q50),
            q75: or_zero(q75),
            q95: or_zero(q95),
            q99: or_zero(q99),
        },
    )
}

/// GET /v1/public/top-interests: the most followed public interests.
pub async fn top_interests(State(state): State<AppState>) -> Result<Response, ApiError> {
    let ids = state
        .interests
        .search_top(&state.default_group, TOP_INTERESTS_LIMIT)
        .await
        .map_err(|e| upstream_failed("interests_search", e))?;

    let permits = Arc::new(Semaphore::new(state.fanout_limit.max(1)));
    let mut reads = JoinSet::new();
    for id in ids {
        let interests = state.interests.clone();
        let group = state.default_group.clone();
        let permits = permits.clone();
        reads.spawn(async move {
            let _permit = permits.acquire_owned().await.ok()?;
            match interests.read(&group, &id).await {
                Ok(summary) if summary.public => Some((id, summary)),
                Ok(_) => None,
                Err(e) => {
                    warn!(interest = %id, error = %e, "Interest read failed");
                    None
                }
            }
        });
    }

    let mut top: BTreeMap<String, InterestSummary> = BTreeMap::new();
    while let Some(joined) = reads.join_next().await {
        if let Ok(Some((id, summary))) = joined {
            top.insert(id, summary);
        }
    }
    Ok(cached(CachePolicy::Snapshot, top))
}

/// GET /v1/attr/types: observed attribute types plus the built-in ones.
pub async fn attribute_types(State(state): State<AppState>) -> Result<Response, ApiError> {
    let mut attrs: Attributes = state
        .metrics
        .attribute_types(OBSERVED_ATTRS, "key, type", "1w")
        .await
        .map_err(|e| upstream_failed("attribute_types", e))?;
    for name in ATTR_BLACKLIST {
        attrs.types_by_key.remove(*name);
    }
    for (name, types) in ATTR_BUILT_IN {
        attrs.types_by_key.insert(
            name.to_string(),
            types.iter().map(|t| t.to_string()).collect(),
        );
    }
    Ok(cached(CachePolicy::Snapshot, attrs))
}

/// GET /v1/attr/values/:name
pub async fn attribute_values(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    validate_label_name(&name)?;
    let values = state
        .metrics
        .attribute_values(&name)
        .await
        .map_err(|e| upstream_failed("attribute_values", e))?;
    Ok(cached(CachePolicy::Snapshot, values))
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready
pub async fn readiness() -> StatusCode {
    StatusCode::OK
}

/// GET /live
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_validation() {
        assert!(validate_period("1h").is_ok());
        assert!(validate_period("30d").is_ok());
        assert!(validate_period("").is_err());
        assert!(validate_period("1h])").is_err());
        assert!(validate_period("1H").is_err());
    }

    #[test]
    fn test_label_name_validation() {
        assert!(validate_label_name("source").is_ok());
        assert!(validate_label_name("_x1").is_ok());
        assert!(validate_label_name("1x").is_err());
        assert!(validate_label_name("a-b").is_err());
        assert!(validate_label_name("").is_err());
    }

    #[test]
    fn test_cache_headers() {
        assert_eq!(
            CachePolicy::for_period("1h").header(),
            "must-revalidate, public, max-age=3600"
        );
        assert_eq!(
            CachePolicy::for_period("forever").header(),
            "must-revalidate, public, max-age=86400"
        );
        assert_eq!(CachePolicy::Snapshot.header(), "max-age=300, public");
    }
}
