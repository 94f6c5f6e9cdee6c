//! Adaptive publish limits: sources that are read more get a larger quota.
//!
//! For every governed window the setter measures each source's share of the
//! total read traffic and writes `min + floor(max * share)` as the source's
//! publish limit, unless a still valid limit is already stored.

use crate::error::LimitError;
use crate::policy::{LimitPolicy, WindowPolicy};
use crate::report::{LimitReport, Outcome, SkipReason};
use crate::resolve::OwnerResolver;
use chrono::{DateTime, Utc};
use gateway_core::config::ResolutionConfig;
use gateway_core::{LimitsError, LimitsStore, MetricsQuery, SourceDirectory};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct AdaptiveLimitSetter {
    metrics: Arc<dyn MetricsQuery>,
    limits: Arc<dyn LimitsStore>,
    resolver: OwnerResolver,
    policy: LimitPolicy,
}

impl AdaptiveLimitSetter {
    pub fn new(
        metrics: Arc<dyn MetricsQuery>,
        limits: Arc<dyn LimitsStore>,
        sources: SourceDirectory,
        resolution: &ResolutionConfig,
        policy: LimitPolicy,
    ) -> Self {
        let resolver = OwnerResolver::new(sources, resolution, &policy.default_group);
        Self {
            metrics,
            limits,
            resolver,
            policy,
        }
    }

    pub async fn set_most_read_limits(&self) -> Result<LimitReport, LimitError> {
        self.set_most_read_limits_at(Utc::now()).await
    }

    /// Run with `now` as the reference time for expiry checks.
    pub async fn set_most_read_limits_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<LimitReport, LimitError> {
        metrics::counter!("limits.runs").increment(1);
        let mut report = LimitReport::default();
        for window in &self.policy.windows {
            if let Err(e) = self.apply_window(window, now, &mut report).await {
                metrics::counter!("limits.run_failures").increment(1);
                error!(window = %window.window, error = %e, "Setting most read limits failed");
                return Err(e);
            }
        }
        info!(
            attempted = report.attempted,
            updated = report.updated_count(),
            untouched = report.untouched.len(),
            skipped = report.skipped.len(),
            "Most read limits set"
        );
        Ok(report)
    }

    async fn apply_window(
        &self,
        window: &WindowPolicy,
        now: DateTime<Utc>,
        report: &mut LimitReport,
    ) -> Result<(), LimitError> {
        let range = window.window.range();
        let total = self
            .metrics
            .rate_sum(&self.policy.read_metric, &self.policy.read_sum_by, range)
            .await?;
        report.open_window(window.window);
        if !is_actionable(total) {
            debug!(window = %window.window, total, "No read traffic, nothing to set");
            return Ok(());
        }

        let rates = self
            .metrics
            .rate_by_label(&self.policy.source_metric, &self.policy.source_label, range)
            .await?;
        let mut shares: Vec<(String, f64)> = rates
            .into_iter()
            .map(|(source, rate)| (source, rate / total))
            .collect();
        shares.sort_by(|a, b| a.0.cmp(&b.0));
        debug!(window = %window.window, total, sources = shares.len(), "Read shares computed");

        for (source_id, share) in shares {
            let result = self.apply_source(window, &source_id, share, now).await?;
            if let Err(reason) = &result {
                debug!(source = %source_id, window = %window.window, reason = %reason, "Source skipped");
            }
            report.record(window.window, source_id, result);
        }
        Ok(())
    }

    /// `Err` aborts the run; `Ok(Err(_))` skips only this source.
    async fn apply_source(
        &self,
        window: &WindowPolicy,
        source_id: &str,
        share: f64,
        now: DateTime<Utc>,
    ) -> Result<Result<Outcome, SkipReason>, LimitError> {
        if !is_actionable(share) {
            return Ok(Err(SkipReason::NonPositiveRate));
        }
        let resolved = match self.resolver.resolve(source_id).await {
            Ok(resolved) => resolved,
            Err(reason) => return Ok(Err(reason)),
        };
        let owner = &resolved.owner;
        if !owner.user_id.is_empty() && owner.user_id != resolved.limit_user {
            info!(
                source = source_id,
                owner = %owner.user_id,
                "Source shares the limit of another user, skipping"
            );
            return Ok(Err(SkipReason::SharedQuota {
                owner: owner.user_id.clone(),
            }));
        }

        let user = resolved.limit_user.as_str();
        match self
            .limits
            .get_raw(&owner.group_id, user, window.subject)
            .await
        {
            Err(e) if e.is_not_found() => {}
            Err(e) => return store_failure(source_id, e),
            Ok(limit) if self.policy.needs_refresh(&limit, now) => {}
            Ok(limit) => {
                debug!(source = source_id, expires = ?limit.expires, "Limit still valid");
                return Ok(Ok(Outcome::Untouched {
                    expires: limit.expires,
                }));
            }
        }

        let count = window.quota(share);
        let expires = self.policy.expiry(now);
        if let Err(e) = self
            .limits
            .set(&owner.group_id, user, window.subject, count, Some(expires))
            .await
        {
            return store_failure(source_id, e);
        }
        debug!(
            source = source_id,
            group_id = %owner.group_id,
            user_id = user,
            subject = %window.subject,
            count,
            "Limit set"
        );
        Ok(Ok(Outcome::Updated { count }))
    }
}

/// Only strictly positive, finite rates get a quota. NaN samples fail this.
fn is_actionable(rate: f64) -> bool {
    rate.is_finite() && rate > 0.0
}

/// Internal store failures abort the run; any other refusal skips the source.
fn store_failure(
    source_id: &str,
    err: LimitsError,
) -> Result<Result<Outcome, SkipReason>, LimitError> {
    if err.is_internal() {
        return Err(err.into());
    }
    warn!(source = source_id, error = %err, "Limits store rejected the source");
    Ok(Err(SkipReason::StoreRejected {
        message: err.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::SkippedSource;
    use chrono::{Duration, TimeZone};
    use gateway_core::config::LimitsConfig;
    use gateway_core::limits::{LimitWrite, MemoryLimitsStore};
    use gateway_core::query::StaticMetrics;
    use gateway_core::sources::StaticSources;
    use gateway_core::types::{Limit, Subject, Window};
    use gateway_core::{LimitsError, Owner, QueryError};
    use std::collections::HashMap;

    const READS: &str = "awk_reader_read_count";
    const SOURCE_READS: &str = "awk_reader_sources_read_count";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    /// Daily window only, bounds 10/1000.
    fn daily_policy() -> LimitPolicy {
        let config = LimitsConfig {
            default_groups: vec!["default".into()],
            windows: vec![Window::Day],
            ..LimitsConfig::default()
        };
        let mut policy = LimitPolicy::from_config(&config).unwrap();
        policy.windows[0].min = 10;
        policy.windows[0].max = 1000;
        policy
    }

    fn rates(entries: &[(&str, f64)]) -> HashMap<String, f64> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    struct Harness {
        feed: Arc<StaticSources>,
        site: Arc<StaticSources>,
        social: Arc<StaticSources>,
        chat: Arc<StaticSources>,
        store: Arc<MemoryLimitsStore>,
        setter: AdaptiveLimitSetter,
    }

    fn harness(metrics: StaticMetrics, policy: LimitPolicy) -> Harness {
        let feed = Arc::new(StaticSources::new());
        let site = Arc::new(StaticSources::new());
        let social = Arc::new(StaticSources::with_created_prefix("ap-"));
        let chat = Arc::new(StaticSources::new());
        let store = Arc::new(MemoryLimitsStore::new());
        let directory = SourceDirectory {
            feed: feed.clone(),
            site: site.clone(),
            social: social.clone(),
            chat: chat.clone(),
            registrar: social.clone(),
        };
        let setter = AdaptiveLimitSetter::new(
            Arc::new(metrics),
            store.clone(),
            directory,
            &ResolutionConfig::default(),
            policy,
        );
        Harness {
            feed,
            site,
            social,
            chat,
            store,
            setter,
        }
    }

    fn daily_metrics(total: f64, sources: &[(&str, f64)]) -> StaticMetrics {
        StaticMetrics::new()
            .with_sum(READS, Window::Day, Ok(total))
            .with_rates(SOURCE_READS, Window::Day, Ok(rates(sources)))
    }

    #[tokio::test]
    async fn test_quota_follows_read_share() {
        let h = harness(daily_metrics(100.0, &[("feed:A", 40.0)]), daily_policy());
        h.feed.insert("feed:A", Owner::new("g", "feed:A"));

        let report = h.setter.set_most_read_limits_at(now()).await.unwrap();

        assert_eq!(report.updated_in(Window::Day).unwrap()["feed:A"], 410);
        assert_eq!(
            h.store.writes(),
            vec![LimitWrite {
                group_id: "g".into(),
                user_id: "feed:A".into(),
                subject: Subject::PublishDaily,
                count: 410,
                expires: Some(now() + Duration::hours(1)),
            }]
        );
    }

    #[tokio::test]
    async fn test_site_prefix_is_stripped_for_lookup() {
        let h = harness(
            daily_metrics(100.0, &[("site:example.com", 10.0)]),
            daily_policy(),
        );
        h.site
            .insert("example.com", Owner::new("g", "site:example.com"));

        let report = h.setter.set_most_read_limits_at(now()).await.unwrap();

        assert_eq!(h.site.calls(), vec!["read:example.com"]);
        assert!(h.feed.calls().is_empty());
        assert_eq!(report.updated_in(Window::Day).unwrap()["site:example.com"], 110);
        let limit = h
            .store
            .get("g", "site:example.com", Subject::PublishDaily)
            .unwrap();
        assert_eq!(limit.expires, Some(now() + Duration::hours(1)));
    }

    #[tokio::test]
    async fn test_shared_quota_is_skipped() {
        let h = harness(daily_metrics(100.0, &[("feed:B", 20.0)]), daily_policy());
        h.feed.insert("feed:B", Owner::new("g", "other-user"));

        let report = h.setter.set_most_read_limits_at(now()).await.unwrap();

        assert!(report.updated_in(Window::Day).unwrap().is_empty());
        assert_eq!(
            report.skipped,
            vec![SkippedSource {
                window: Window::Day,
                source_id: "feed:B".into(),
                reason: SkipReason::SharedQuota {
                    owner: "other-user".into(),
                },
            }]
        );
        assert!(h.store.writes().is_empty());
        assert_eq!(h.store.read_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_source_is_registered_and_limited() {
        let h = harness(daily_metrics(100.0, &[("src-x", 25.0)]), daily_policy());

        let report = h.setter.set_most_read_limits_at(now()).await.unwrap();

        for resolver in [&h.feed, &h.social, &h.chat, &h.site] {
            assert!(resolver.calls().contains(&"read:src-x".to_string()));
        }
        assert!(h
            .social
            .calls()
            .contains(&"create:src-x:default:src-x".to_string()));
        assert_eq!(report.updated_in(Window::Day).unwrap()["src-x"], 260);
        let write = &h.store.writes()[0];
        assert_eq!(write.group_id, "default");
        assert_eq!(write.user_id, "ap-src-x");
    }

    #[tokio::test]
    async fn test_expiring_limit_is_refreshed_and_valid_one_kept() {
        let h = harness(
            daily_metrics(100.0, &[("feed:soon", 10.0), ("feed:later", 10.0)]),
            daily_policy(),
        );
        for id in ["feed:soon", "feed:later"] {
            h.feed.insert(id, Owner::new("g", id));
        }
        let stored = |user: &str, minutes| Limit {
            count: 1,
            user_id: user.into(),
            expires: Some(now() + Duration::minutes(minutes)),
        };
        h.store
            .insert("g", "feed:soon", Subject::PublishDaily, stored("feed:soon", 5));
        h.store.insert(
            "g",
            "feed:later",
            Subject::PublishDaily,
            stored("feed:later", 30),
        );

        let report = h.setter.set_most_read_limits_at(now()).await.unwrap();

        let updated = report.updated_in(Window::Day).unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated["feed:soon"], 110);
        assert_eq!(report.untouched, vec![(Window::Day, "feed:later".to_string())]);
        let kept = h.store.get("g", "feed:later", Subject::PublishDaily).unwrap();
        assert_eq!(kept.count, 1);
    }

    #[tokio::test]
    async fn test_limit_without_expiry_is_never_overwritten() {
        let h = harness(daily_metrics(100.0, &[("feed:A", 50.0)]), daily_policy());
        h.feed.insert("feed:A", Owner::new("g", "feed:A"));
        h.store.insert(
            "g",
            "feed:A",
            Subject::PublishDaily,
            Limit {
                count: 7,
                user_id: "feed:A".into(),
                expires: None,
            },
        );

        let report = h.setter.set_most_read_limits_at(now()).await.unwrap();

        assert!(h.store.writes().is_empty());
        assert_eq!(report.untouched.len(), 1);
    }

    #[tokio::test]
    async fn test_non_positive_share_makes_no_calls() {
        let h = harness(
            daily_metrics(
                100.0,
                &[
                    ("feed:zero", 0.0),
                    ("feed:neg", -3.0),
                    ("feed:nan", f64::NAN),
                    ("feed:inf", f64::INFINITY),
                ],
            ),
            daily_policy(),
        );
        h.feed.insert("feed:nan", Owner::new("g", "feed:nan"));

        let report = h.setter.set_most_read_limits_at(now()).await.unwrap();

        assert_eq!(report.attempted, 4);
        assert!(report
            .skipped
            .iter()
            .all(|s| s.reason == SkipReason::NonPositiveRate));
        assert!(h.feed.calls().is_empty());
        assert!(h.social.calls().is_empty());
        assert_eq!(h.store.read_count(), 0);
        assert!(h.store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_no_traffic_means_no_per_source_work() {
        for total in [0.0, f64::NAN] {
            let h = harness(daily_metrics(total, &[("feed:A", 5.0)]), daily_policy());

            let report = h.setter.set_most_read_limits_at(now()).await.unwrap();

            assert_eq!(report.attempted, 0);
            assert!(report.updated_in(Window::Day).unwrap().is_empty());
            assert!(h.feed.calls().is_empty());
        }
    }

    #[tokio::test]
    async fn test_aggregate_query_failure_aborts() {
        let metrics = StaticMetrics::new()
            .with_sum(READS, Window::Day, Err(QueryError::Transport("refused".into())))
            .with_rates(SOURCE_READS, Window::Day, Ok(rates(&[("feed:A", 5.0)])));
        let h = harness(metrics, daily_policy());

        let err = h.setter.set_most_read_limits_at(now()).await.unwrap_err();

        assert!(matches!(err, LimitError::Query(_)));
        assert!(h.feed.calls().is_empty());
        assert!(h.store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_per_source_query_failure_aborts() {
        let metrics = StaticMetrics::new()
            .with_sum(READS, Window::Day, Ok(10.0))
            .with_rates(
                SOURCE_READS,
                Window::Day,
                Err(QueryError::Malformed("no data".into())),
            );
        let h = harness(metrics, daily_policy());

        let err = h.setter.set_most_read_limits_at(now()).await.unwrap_err();
        assert_eq!(err, LimitError::Query(QueryError::Malformed("no data".into())));
    }

    #[tokio::test]
    async fn test_registration_failure_skips_only_that_source() {
        let h = harness(
            daily_metrics(100.0, &[("feed:known", 25.0), ("unknown", 25.0)]),
            daily_policy(),
        );
        h.feed.insert("feed:known", Owner::new("g", "feed:known"));
        h.social.reject_create();

        let report = h.setter.set_most_read_limits_at(now()).await.unwrap();

        assert_eq!(report.updated_in(Window::Day).unwrap()["feed:known"], 260);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].source_id, "unknown");
        assert!(matches!(
            report.skipped[0].reason,
            SkipReason::RegistrationFailed { .. }
        ));
    }

    #[tokio::test]
    async fn test_store_failure_aborts() {
        let h = harness(daily_metrics(100.0, &[("feed:A", 30.0)]), daily_policy());
        h.feed.insert("feed:A", Owner::new("g", "feed:A"));
        h.store.fail_with(LimitsError::Internal("db down".into()));

        let err = h.setter.set_most_read_limits_at(now()).await.unwrap_err();
        assert!(err.is_internal());
    }

    #[tokio::test]
    async fn test_store_rejection_skips_only_that_source() {
        let bad = "https://bücher.de/feed";
        let good = "https://zz.example/feed";
        let h = harness(daily_metrics(100.0, &[(bad, 10.0), (good, 10.0)]), daily_policy());
        for id in [bad, good] {
            h.feed.insert(id, Owner::new("g", id));
        }
        h.store.reject_user(bad, LimitsError::Invalid(format!("user id {bad:?}")));

        let report = h.setter.set_most_read_limits_at(now()).await.unwrap();

        let updated = report.updated_in(Window::Day).unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[good], 110);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].source_id, bad);
        assert_eq!(report.skipped[0].reason.label(), "store_rejected");
        assert_eq!(h.store.writes().len(), 1);
        assert_eq!(h.store.writes()[0].user_id, good);
    }

    #[tokio::test]
    async fn test_forbidden_write_skips_source() {
        let h = harness(
            daily_metrics(100.0, &[("feed:A", 10.0), ("feed:B", 10.0)]),
            daily_policy(),
        );
        for id in ["feed:A", "feed:B"] {
            h.feed.insert(id, Owner::new("g", id));
        }
        h.store
            .reject_writes("feed:A", LimitsError::Forbidden("feed:A".into()));

        let report = h.setter.set_most_read_limits_at(now()).await.unwrap();

        assert_eq!(report.updated_in(Window::Day).unwrap()["feed:B"], 110);
        assert_eq!(
            report.skipped,
            vec![SkippedSource {
                window: Window::Day,
                source_id: "feed:A".into(),
                reason: SkipReason::StoreRejected {
                    message: "forbidden: feed:A".into(),
                },
            }]
        );
    }

    #[tokio::test]
    async fn test_each_window_gets_its_own_subject_and_bounds() {
        let metrics = StaticMetrics::new()
            .with_sum(READS, Window::Hour, Ok(10.0))
            .with_rates(SOURCE_READS, Window::Hour, Ok(rates(&[("feed:A", 5.0)])))
            .with_sum(READS, Window::Day, Ok(100.0))
            .with_rates(SOURCE_READS, Window::Day, Ok(rates(&[("feed:A", 25.0)])));
        let config = LimitsConfig {
            default_groups: vec!["default".into()],
            ..LimitsConfig::default()
        };
        let h = harness(metrics, LimitPolicy::from_config(&config).unwrap());
        h.feed.insert("feed:A", Owner::new("g", "feed:A"));

        let report = h.setter.set_most_read_limits_at(now()).await.unwrap();

        // hourly: 10 + floor(3600 * 0.5), daily: 100 + floor(86400 * 0.25)
        assert_eq!(report.updated_in(Window::Hour).unwrap()["feed:A"], 1810);
        assert_eq!(report.updated_in(Window::Day).unwrap()["feed:A"], 21700);
        let subjects: Vec<Subject> = h.store.writes().iter().map(|w| w.subject).collect();
        assert_eq!(subjects, vec![Subject::PublishHourly, Subject::PublishDaily]);
    }
}
