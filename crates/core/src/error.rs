use thiserror::Error;

/// Settings or wiring the service cannot start with.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failures reported by the limits store. `NotFound` is not a failure for the
/// limit setter: it means the limit has never been set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LimitsError {
    #[error("invalid: {0}")]
    Invalid(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("internal failure: {0}")]
    Internal(String),
}

impl LimitsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, LimitsError::NotFound(_))
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, LimitsError::Internal(_))
    }
}

/// Failures of the time-series query backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("query transport error: {0}")]
    Transport(String),

    #[error("query rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed query response: {0}")]
    Malformed(String),

    #[error("{} queries failed: {}", .0.len(), join_messages(.0))]
    Multiple(Vec<QueryError>),
}

impl QueryError {
    /// Collapse the failures of several concurrent queries into one error.
    pub fn join(mut errors: Vec<QueryError>) -> Option<QueryError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(QueryError::Multiple(errors)),
        }
    }
}

fn join_messages(errors: &[QueryError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure talking to one of the upstream gRPC services (sources, interests).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{service} service error: {message}")]
pub struct ClientError {
    pub service: &'static str,
    pub message: String,
}

impl ClientError {
    pub fn new(service: &'static str, message: impl Into<String>) -> Self {
        Self {
            service,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_single_error_is_unwrapped() {
        let err = QueryError::join(vec![QueryError::Transport("refused".into())]).unwrap();
        assert_eq!(err, QueryError::Transport("refused".into()));
        assert!(QueryError::join(Vec::new()).is_none());
    }

    #[test]
    fn test_join_many_lists_each_failure() {
        let err = QueryError::join(vec![
            QueryError::Transport("refused".into()),
            QueryError::Malformed("no data".into()),
        ])
        .unwrap();
        let msg = err.to_string();
        assert!(msg.starts_with("2 queries failed"));
        assert!(msg.contains("refused"));
        assert!(msg.contains("no data"));
    }
}
