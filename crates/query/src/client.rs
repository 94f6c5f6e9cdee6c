//! Prometheus HTTP API client implementing [`MetricsQuery`].

use crate::promql;
use crate::response::{parse_body, QueryValue};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use gateway_core::config::PrometheusConfig;
use gateway_core::types::{Attributes, NumberHistory, RateAverage, Window};
use gateway_core::{MetricsQuery, QueryError};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use url::Url;

/// Metric whose label values are listed by `attribute_values`.
const PUBLISHED_EVENTS_METRIC: &str = "awk_published_events_count";

pub struct PrometheusClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl PrometheusClient {
    pub fn new(config: &PrometheusConfig) -> Result<Self, QueryError> {
        let endpoint = query_endpoint(&config.uri)?;
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| QueryError::Transport(e.to_string()))?;

        info!(endpoint = %endpoint, "Prometheus query client configured");

        Ok(Self { http, endpoint })
    }

    /// Evaluate an instant query at `at`.
    pub async fn query(&self, query: &str, at: DateTime<Utc>) -> Result<QueryValue, QueryError> {
        debug!(query = query, at = %at, "Prometheus query");
        let result = self.send(query, at).await;
        if let Err(e) = &result {
            metrics::counter!("query.errors").increment(1);
            warn!(query = query, error = %e, "Prometheus query failed");
        }
        result
    }

    async fn send(&self, query: &str, at: DateTime<Utc>) -> Result<QueryValue, QueryError> {
        let time = at.timestamp().to_string();
        let response = self
            .http
            .get(self.endpoint.clone())
            .query(&[("query", query), ("time", time.as_str())])
            .send()
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;
        parse_body(status, &body)
    }
}

fn query_endpoint(uri: &str) -> Result<Url, QueryError> {
    let mut base = Url::parse(uri)
        .map_err(|e| QueryError::Transport(format!("invalid Prometheus uri {uri}: {e}")))?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join("api/v1/query")
        .map_err(|e| QueryError::Transport(e.to_string()))
}

#[async_trait]
impl MetricsQuery for PrometheusClient {
    async fn rate_sum(&self, metric: &str, sum_by: &str, range: &str) -> Result<f64, QueryError> {
        let value = self
            .query(&promql::sum_rate(sum_by, metric, range), Utc::now())
            .await?;
        Ok(value.first_value())
    }

    async fn rate_by_label(
        &self,
        metric: &str,
        label: &str,
        range: &str,
    ) -> Result<HashMap<String, f64>, QueryError> {
        let value = self
            .query(&promql::sum_rate(label, metric, range), Utc::now())
            .await?;
        Ok(value
            .samples()
            .iter()
            .filter_map(|s| s.labels.get(label).map(|v| (v.clone(), s.value)))
            .collect())
    }

    async fn rate_average(&self, metric: &str, sum_by: &str) -> Result<RateAverage, QueryError> {
        let (min5, hour, day, month) = tokio::join!(
            self.rate_sum(metric, sum_by, Window::Min5.range()),
            self.rate_sum(metric, sum_by, Window::Hour.range()),
            self.rate_sum(metric, sum_by, Window::Day.range()),
            self.rate_sum(metric, sum_by, Window::Month.range()),
        );
        let mut avg = RateAverage::default();
        let mut errors = Vec::new();
        for (window, result) in [
            (Window::Min5, min5),
            (Window::Hour, hour),
            (Window::Day, day),
            (Window::Month, month),
        ] {
            match result {
                Ok(v) => avg.set(window, v),
                Err(e) => errors.push(e),
            }
        }
        match QueryError::join(errors) {
            Some(e) => Err(e),
            None => Ok(avg),
        }
    }

    async fn number_history(&self, metric: &str) -> Result<NumberHistory, QueryError> {
        let now = Utc::now();
        let (current, hour, day, month) = tokio::join!(
            self.query(metric, now),
            self.query(metric, now - Duration::hours(1)),
            self.query(metric, now - Duration::hours(24)),
            self.query(metric, now - Duration::days(30)),
        );
        let mut history = NumberHistory::default();
        let mut errors = Vec::new();
        let slots: [(&mut f64, Result<QueryValue, QueryError>); 4] = [
            (&mut history.current, current),
            (&mut history.past.hour, hour),
            (&mut history.past.day, day),
            (&mut history.past.month, month),
        ];
        for (slot, result) in slots {
            match result {
                Ok(v) => *slot = v.first_value(),
                Err(e) => errors.push(e),
            }
        }
        match QueryError::join(errors) {
            Some(e) => Err(e),
            None => Ok(history),
        }
    }

    async fn attribute_types(
        &self,
        metric: &str,
        sum_by: &str,
        range: &str,
    ) -> Result<Attributes, QueryError> {
        let value = self
            .query(&promql::sum_rate(sum_by, metric, range), Utc::now())
            .await?;
        let mut attrs = Attributes::default();
        for sample in value.samples() {
            let key = sample.labels.get("key").filter(|k| !k.is_empty());
            let typ = sample.labels.get("type").filter(|t| !t.is_empty());
            if let (Some(key), Some(typ)) = (key, typ) {
                attrs
                    .types_by_key
                    .entry(key.clone())
                    .or_default()
                    .push(typ.clone());
            }
        }
        Ok(attrs)
    }

    async fn attribute_values(&self, name: &str) -> Result<Vec<String>, QueryError> {
        let value = self
            .query(
                &promql::sum_rate(name, PUBLISHED_EVENTS_METRIC, "1w"),
                Utc::now(),
            )
            .await?;
        Ok(value
            .samples()
            .iter()
            .flat_map(|s| s.labels.values().cloned())
            .collect())
    }

    async fn duration_quantile(&self, metric: &str, q: f64, range: &str) -> Result<f64, QueryError> {
        let value = self
            .query(&promql::histogram_quantile(q, metric, range), Utc::now())
            .await?;
        Ok(value.first_value())
    }
}
