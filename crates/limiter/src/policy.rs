//! Quota formula and refresh rules, fixed at construction.

use crate::error::LimitError;
use chrono::{DateTime, Duration, Utc};
use gateway_core::config::LimitsConfig;
use gateway_core::types::{Limit, Subject, Window};

/// Bounds of the quota governed by one aggregation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    pub window: Window,
    pub subject: Subject,
    /// Quota every active source gets.
    pub min: i64,
    /// Quota added at a 100% share of the read traffic.
    pub max: i64,
}

impl WindowPolicy {
    /// `min + floor(max * rate)`.
    pub fn quota(&self, rate: f64) -> i64 {
        self.min.saturating_add((self.max as f64 * rate).floor() as i64)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LimitPolicy {
    /// Group owning auto-registered sources.
    pub default_group: String,
    pub windows: Vec<WindowPolicy>,
    pub ttl: Duration,
    pub refresh_threshold: Duration,
    pub read_metric: String,
    pub read_sum_by: String,
    pub source_metric: String,
    pub source_label: String,
}

impl LimitPolicy {
    pub fn from_config(config: &LimitsConfig) -> Result<Self, LimitError> {
        let default_group = config
            .default_group()
            .ok_or_else(|| LimitError::Config("no default group configured".into()))?
            .to_string();

        let windows = config
            .windows
            .iter()
            .map(|&window| {
                let subject = window.publish_subject().ok_or_else(|| {
                    LimitError::Config(format!("window {window} does not govern a publish quota"))
                })?;
                Ok(WindowPolicy {
                    window,
                    subject,
                    min: config.default_user.for_window(window).unwrap_or_default(),
                    max: config.max_user.for_window(window).unwrap_or_default(),
                })
            })
            .collect::<Result<Vec<_>, LimitError>>()?;

        Ok(Self {
            default_group,
            windows,
            ttl: seconds(config.ttl_secs)?,
            refresh_threshold: seconds(config.refresh_threshold_secs)?,
            read_metric: config.read_metric.clone(),
            read_sum_by: config.read_sum_by.clone(),
            source_metric: config.source_metric.clone(),
            source_label: config.source_label.clone(),
        })
    }

    /// A stored limit is refreshed only when it expires within the threshold.
    /// Limits without an expiry are never touched.
    pub fn needs_refresh(&self, limit: &Limit, now: DateTime<Utc>) -> bool {
        match limit.expires {
            Some(expires) => expires < now + self.refresh_threshold,
            None => false,
        }
    }

    pub fn expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.ttl
    }
}

fn seconds(secs: u64) -> Result<Duration, LimitError> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| LimitError::Config(format!("duration of {secs}s is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config() -> LimitsConfig {
        LimitsConfig {
            default_groups: vec!["default".into()],
            ..LimitsConfig::default()
        }
    }

    #[test]
    fn test_quota_formula() {
        let w = WindowPolicy {
            window: Window::Day,
            subject: Subject::PublishDaily,
            min: 10,
            max: 1000,
        };
        assert_eq!(w.quota(0.4), 410);
        assert_eq!(w.quota(0.0015), 11);
        assert_eq!(w.quota(1.0), 1010);
    }

    #[test]
    fn test_policy_from_default_config() {
        let policy = LimitPolicy::from_config(&config()).unwrap();
        assert_eq!(policy.default_group, "default");
        assert_eq!(policy.ttl, Duration::hours(1));
        assert_eq!(policy.refresh_threshold, Duration::minutes(15));
        assert_eq!(
            policy.windows,
            vec![
                WindowPolicy {
                    window: Window::Hour,
                    subject: Subject::PublishHourly,
                    min: 10,
                    max: 3600,
                },
                WindowPolicy {
                    window: Window::Day,
                    subject: Subject::PublishDaily,
                    min: 100,
                    max: 86400,
                },
            ]
        );
    }

    #[test]
    fn test_policy_requires_default_group() {
        let err = LimitPolicy::from_config(&LimitsConfig::default()).unwrap_err();
        assert!(matches!(err, LimitError::Config(_)));
    }

    #[test]
    fn test_policy_rejects_window_without_subject() {
        let cfg = LimitsConfig {
            windows: vec![Window::Min5],
            ..config()
        };
        assert!(LimitPolicy::from_config(&cfg).is_err());
    }

    #[test]
    fn test_refresh_threshold() {
        let policy = LimitPolicy::from_config(&config()).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let limit = |expires| Limit {
            count: 1,
            user_id: "u".into(),
            expires,
        };

        assert!(policy.needs_refresh(&limit(Some(now + Duration::minutes(5))), now));
        assert!(policy.needs_refresh(&limit(Some(now - Duration::minutes(5))), now));
        assert!(!policy.needs_refresh(&limit(Some(now + Duration::minutes(30))), now));
        // exactly at the threshold the limit is still valid
        assert!(!policy.needs_refresh(&limit(Some(now + Duration::minutes(15))), now));
        assert!(policy.needs_refresh(
            &limit(Some(now + Duration::minutes(15) - Duration::seconds(1))),
            now
        ));
        assert!(!policy.needs_refresh(&limit(None), now));
        assert_eq!(policy.expiry(now), now + Duration::hours(1));
    }
}
