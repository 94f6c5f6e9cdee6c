//! Decoding of `/api/v1/query` responses.

use gateway_core::QueryError;
use serde::Deserialize;
use std::collections::HashMap;

/// One labelled sample of an instant vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub labels: HashMap<String, String>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Vector(Vec<Sample>),
    Scalar(f64),
    /// Range vectors and strings; never produced by the queries issued here.
    Other,
}

impl QueryValue {
    /// Value of the first sample, or 0 when the result is empty.
    pub fn first_value(&self) -> f64 {
        match self {
            QueryValue::Vector(samples) => samples.first().map(|s| s.value).unwrap_or_default(),
            QueryValue::Scalar(v) => *v,
            QueryValue::Other => 0.0,
        }
    }

    pub fn samples(&self) -> &[Sample] {
        match self {
            QueryValue::Vector(samples) => samples,
            _ => &[],
        }
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Option<ApiData>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
enum ApiData {
    Vector(Vec<ApiSample>),
    Scalar((f64, String)),
    Matrix(serde_json::Value),
    String(serde_json::Value),
}

#[derive(Deserialize)]
struct ApiSample {
    #[serde(default)]
    metric: HashMap<String, String>,
    value: (f64, String),
}

fn parse_number(raw: &str) -> Result<f64, QueryError> {
    raw.parse::<f64>()
        .map_err(|_| QueryError::Malformed(format!("sample value {raw:?} is not a number")))
}

/// Decode a response body received with HTTP status `status`.
pub fn parse_body(status: u16, body: &str) -> Result<QueryValue, QueryError> {
    let parsed: Result<ApiResponse, _> = serde_json::from_str(body);
    let response = match parsed {
        Ok(r) => r,
        Err(e) if (200..300).contains(&status) => {
            return Err(QueryError::Malformed(e.to_string()));
        }
        Err(_) => {
            return Err(QueryError::Rejected {
                status,
                message: body.chars().take(256).collect(),
            });
        }
    };

    if response.status != "success" || !(200..300).contains(&status) {
        let message = match (response.error_type, response.error) {
            (Some(t), Some(e)) => format!("{t}: {e}"),
            (None, Some(e)) => e,
            (Some(t), None) => t,
            (None, None) => format!("status {}", response.status),
        };
        return Err(QueryError::Rejected { status, message });
    }

    match response.data {
        Some(ApiData::Vector(samples)) => {
            let samples = samples
                .into_iter()
                .map(|s| {
                    Ok(Sample {
                        labels: s.metric,
                        value: parse_number(&s.value.1)?,
                    })
                })
                .collect::<Result<Vec<_>, QueryError>>()?;
            Ok(QueryValue::Vector(samples))
        }
        Some(ApiData::Scalar((_, raw))) => Ok(QueryValue::Scalar(parse_number(&raw)?)),
        Some(ApiData::Matrix(_)) | Some(ApiData::String(_)) => Ok(QueryValue::Other),
        None => Err(QueryError::Malformed("response carries no data".into())),
    }
}
