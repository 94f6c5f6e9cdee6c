//! Time-series query abstraction used by the limit setter and the reports.

use crate::error::QueryError;
use crate::types::{Attributes, NumberHistory, RateAverage, Window};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[async_trait]
pub trait MetricsQuery: Send + Sync {
    /// `sum by (sum_by) (rate(metric[range]))`, first sample or 0.
    async fn rate_sum(&self, metric: &str, sum_by: &str, range: &str) -> Result<f64, QueryError>;

    /// `sum by (label) (rate(metric[range]))` keyed by label value.
    async fn rate_by_label(
        &self,
        metric: &str,
        label: &str,
        range: &str,
    ) -> Result<HashMap<String, f64>, QueryError>;

    /// Rates of `metric` over all standard windows.
    async fn rate_average(&self, metric: &str, sum_by: &str) -> Result<RateAverage, QueryError>;

    async fn number_history(&self, metric: &str) -> Result<NumberHistory, QueryError>;

    async fn attribute_types(
        &self,
        metric: &str,
        sum_by: &str,
        range: &str,
    ) -> Result<Attributes, QueryError>;

    async fn attribute_values(&self, name: &str) -> Result<Vec<String>, QueryError>;

    /// Quantile `q` of a histogram over `range`, in seconds.
    async fn duration_quantile(&self, metric: &str, q: f64, range: &str) -> Result<f64, QueryError>;

    /// Share of `total` contributed by each label value. Only positive shares
    /// are returned; nothing is queried when `total` is not positive.
    async fn relative_rate_by_label(
        &self,
        total: f64,
        metric: &str,
        label: &str,
        range: &str,
    ) -> Result<HashMap<String, f64>, QueryError> {
        if total <= 0.0 {
            return Ok(HashMap::new());
        }
        let rates = self.rate_by_label(metric, label, range).await?;
        Ok(rates
            .into_iter()
            .map(|(k, v)| (k, v / total))
            .filter(|(_, ratio)| *ratio > 0.0)
            .collect())
    }
}

/// Canned query results for tests, keyed by `(metric, range)`.
#[derive(Default)]
pub struct StaticMetrics {
    sums: Mutex<HashMap<(String, String), Result<f64, QueryError>>>,
    by_label: Mutex<HashMap<(String, String), Result<HashMap<String, f64>, QueryError>>>,
    histories: Mutex<HashMap<String, NumberHistory>>,
    queries: Mutex<Vec<String>>,
}

impl StaticMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sum(self, metric: &str, window: Window, value: Result<f64, QueryError>) -> Self {
        self.sums
            .lock()
            .expect("static metrics mutex poisoned")
            .insert((metric.to_string(), window.range().to_string()), value);
        self
    }

    pub fn with_rates(
        self,
        metric: &str,
        window: Window,
        rates: Result<HashMap<String, f64>, QueryError>,
    ) -> Self {
        self.by_label
            .lock()
            .expect("static metrics mutex poisoned")
            .insert((metric.to_string(), window.range().to_string()), rates);
        self
    }

    pub fn with_history(self, metric: &str, history: NumberHistory) -> Self {
        self.histories
            .lock()
            .expect("static metrics mutex poisoned")
            .insert(metric.to_string(), history);
        self
    }

    /// Queries received so far, as `{kind}:{metric}[{range}]`.
    pub fn queries(&self) -> Vec<String> {
        self.queries
            .lock()
            .expect("static metrics mutex poisoned")
            .clone()
    }

    fn record(&self, query: String) {
        self.queries
            .lock()
            .expect("static metrics mutex poisoned")
            .push(query);
    }
}

#[async_trait]
impl MetricsQuery for StaticMetrics {
    async fn rate_sum(&self, metric: &str, _sum_by: &str, range: &str) -> Result<f64, QueryError> {
        self.record(format!("sum:{metric}[{range}]"));
        self.sums
            .lock()
            .expect("static metrics mutex poisoned")
            .get(&(metric.to_string(), range.to_string()))
            .cloned()
            .unwrap_or(Ok(0.0))
    }

    async fn rate_by_label(
        &self,
        metric: &str,
        _label: &str,
        range: &str,
    ) -> Result<HashMap<String, f64>, QueryError> {
        self.record(format!("by_label:{metric}[{range}]"));
        self.by_label
            .lock()
            .expect("static metrics mutex poisoned")
            .get(&(metric.to_string(), range.to_string()))
            .cloned()
            .unwrap_or_else(|| Ok(HashMap::new()))
    }

    async fn rate_average(&self, metric: &str, sum_by: &str) -> Result<RateAverage, QueryError> {
        let mut avg = RateAverage::default();
        for window in Window::ALL {
            avg.set(window, self.rate_sum(metric, sum_by, window.range()).await?);
        }
        Ok(avg)
    }

    async fn number_history(&self, metric: &str) -> Result<NumberHistory, QueryError> {
        self.record(format!("history:{metric}"));
        Ok(self
            .histories
            .lock()
            .expect("static metrics mutex poisoned")
            .get(metric)
            .copied()
            .unwrap_or_default())
    }

    async fn attribute_types(
        &self,
        metric: &str,
        _sum_by: &str,
        range: &str,
    ) -> Result<Attributes, QueryError> {
        self.record(format!("attr_types:{metric}[{range}]"));
        Ok(Attributes::default())
    }

    async fn attribute_values(&self, name: &str) -> Result<Vec<String>, QueryError> {
        self.record(format!("attr_values:{name}"));
        Ok(Vec::new())
    }

    async fn duration_quantile(&self, metric: &str, q: f64, range: &str) -> Result<f64, QueryError> {
        self.record(format!("quantile:{metric}[{range}]@{q}"));
        Ok(q)
    }
}
