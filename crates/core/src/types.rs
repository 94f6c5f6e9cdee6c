use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Aggregation window of a rate query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    Min5,
    Hour,
    Day,
    Month,
}

impl Window {
    pub const ALL: [Window; 4] = [Window::Min5, Window::Hour, Window::Day, Window::Month];

    /// Range selector as understood by the query backend.
    pub fn range(self) -> &'static str {
        match self {
            Window::Min5 => "5m",
            Window::Hour => "1h",
            Window::Day => "1d",
            Window::Month => "30d",
        }
    }

    /// The publish quota subject governed by this window, if any.
    pub fn publish_subject(self) -> Option<Subject> {
        match self {
            Window::Hour => Some(Subject::PublishHourly),
            Window::Day => Some(Subject::PublishDaily),
            Window::Min5 | Window::Month => None,
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.range())
    }
}

impl FromStr for Window {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "min5" | "5m" => Ok(Window::Min5),
            "hour" | "1h" => Ok(Window::Hour),
            "day" | "1d" => Ok(Window::Day),
            "month" | "30d" => Ok(Window::Month),
            other => Err(format!("unknown window: {other}")),
        }
    }
}

/// Quota subject as known to the limits store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Subject {
    #[default]
    Undefined,
    Interests,
    PublishHourly,
    PublishDaily,
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Subject::Undefined => "SubjectUndefined",
            Subject::Interests => "SubjectInterests",
            Subject::PublishHourly => "SubjectPublishHourly",
            Subject::PublishDaily => "SubjectPublishDaily",
        };
        f.write_str(name)
    }
}

/// A quota as stored by the limits service. `expires == None` never expires.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limit {
    pub count: i64,
    pub user_id: String,
    pub expires: Option<DateTime<Utc>>,
}

/// Rates of a metric over the standard windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RateAverage {
    pub min5: f64,
    pub hour: f64,
    pub day: f64,
    pub month: f64,
}

impl RateAverage {
    pub fn set(&mut self, window: Window, value: f64) {
        match window {
            Window::Min5 => self.min5 = value,
            Window::Hour => self.hour = value,
            Window::Day => self.day = value,
            Window::Month => self.month = value,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NumberHistory {
    pub current: f64,
    pub past: NumberPast,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NumberPast {
    pub hour: f64,
    pub day: f64,
    pub month: f64,
}

/// Event attribute types observed per attribute key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attributes {
    pub types_by_key: HashMap<String, Vec<String>>,
}

/// Processing duration quantiles, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DurationQuantiles {
    #[serde(rename = "q0_5")]
    pub q50: f64,
    #[serde(rename = "q0_75")]
    pub q75: f64,
    #[serde(rename = "q0_95")]
    pub q95: f64,
    #[serde(rename = "q0_99")]
    pub q99: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadStatus {
    pub read_rate: f64,
    pub sources_most_read: HashMap<String, f64>,
}
