//! Per-run account of what happened to every source.

use chrono::{DateTime, Utc};
use gateway_core::types::Window;
use std::collections::BTreeMap;
use std::fmt;

/// What happened to a source that was processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A fresh limit of `count` was written.
    Updated { count: i64 },
    /// The stored limit is still valid.
    Untouched { expires: Option<DateTime<Utc>> },
}

/// Why a source received no limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NonPositiveRate,
    RegistrationFailed { message: String },
    /// The source draws from the quota of another user.
    SharedQuota { owner: String },
    /// The limits store refused the limit of this source.
    StoreRejected { message: String },
}

impl SkipReason {
    /// Metric label value.
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::NonPositiveRate => "non_positive_rate",
            SkipReason::RegistrationFailed { .. } => "registration_failed",
            SkipReason::SharedQuota { .. } => "shared_quota",
            SkipReason::StoreRejected { .. } => "store_rejected",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NonPositiveRate => f.write_str("relative read rate is not positive"),
            SkipReason::RegistrationFailed { message } => {
                write!(f, "auto-registration failed: {message}")
            }
            SkipReason::SharedQuota { owner } => write!(f, "shares the limit of {owner}"),
            SkipReason::StoreRejected { message } => write!(f, "limits store rejected: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSource {
    pub window: Window,
    pub source_id: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LimitReport {
    /// Sources considered, summed over all windows.
    pub attempted: usize,
    /// New limit counts by source, per governed window. Every governed window
    /// whose aggregate query ran has an entry, possibly empty.
    pub updated: BTreeMap<Window, BTreeMap<String, i64>>,
    pub untouched: Vec<(Window, String)>,
    pub skipped: Vec<SkippedSource>,
}

impl LimitReport {
    pub(crate) fn open_window(&mut self, window: Window) {
        self.updated.entry(window).or_default();
    }

    pub(crate) fn record(
        &mut self,
        window: Window,
        source_id: String,
        result: Result<Outcome, SkipReason>,
    ) {
        self.attempted += 1;
        match result {
            Ok(Outcome::Updated { count }) => {
                metrics::counter!("limits.updated").increment(1);
                self.updated
                    .entry(window)
                    .or_default()
                    .insert(source_id, count);
            }
            Ok(Outcome::Untouched { .. }) => {
                metrics::counter!("limits.untouched").increment(1);
                self.untouched.push((window, source_id));
            }
            Err(reason) => {
                metrics::counter!("limits.skipped", "reason" => reason.label()).increment(1);
                self.skipped.push(SkippedSource {
                    window,
                    source_id,
                    reason,
                });
            }
        }
    }

    pub fn updated_in(&self, window: Window) -> Option<&BTreeMap<String, i64>> {
        self.updated.get(&window)
    }

    pub fn updated_count(&self) -> usize {
        self.updated.values().map(BTreeMap::len).sum()
    }
}
