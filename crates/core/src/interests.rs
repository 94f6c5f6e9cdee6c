//! Interests (subscriptions) directory used by the top-interests report.

use crate::error::ClientError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestSummary {
    pub description: String,
    pub followers: i64,
    #[serde(skip)]
    pub public: bool,
}

#[async_trait]
pub trait InterestsDirectory: Send + Sync {
    /// Identifiers of the `limit` interests with the most followers, most
    /// followed first. Requests are made on behalf of `group_id`.
    async fn search_top(&self, group_id: &str, limit: u32) -> Result<Vec<String>, ClientError>;

    async fn read(&self, group_id: &str, id: &str) -> Result<InterestSummary, ClientError>;
}

/// In-memory interests directory for tests.
#[derive(Default)]
pub struct StaticInterests {
    items: Mutex<Vec<(String, InterestSummary)>>,
}

impl StaticInterests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: &str, summary: InterestSummary) {
        self.items
            .lock()
            .expect("static interests mutex poisoned")
            .push((id.to_string(), summary));
    }
}

#[async_trait]
impl InterestsDirectory for StaticInterests {
    async fn search_top(&self, _group_id: &str, limit: u32) -> Result<Vec<String>, ClientError> {
        let mut items = self
            .items
            .lock()
            .expect("static interests mutex poisoned")
            .clone();
        items.sort_by(|a, b| b.1.followers.cmp(&a.1.followers));
        Ok(items
            .into_iter()
            .take(limit as usize)
            .map(|(id, _)| id)
            .collect())
    }

    async fn read(&self, _group_id: &str, id: &str) -> Result<InterestSummary, ClientError> {
        let items: HashMap<String, InterestSummary> = self
            .items
            .lock()
            .expect("static interests mutex poisoned")
            .iter()
            .cloned()
            .collect();
        items
            .get(id)
            .cloned()
            .ok_or_else(|| ClientError::new("interests", format!("interest {id} not found")))
    }
}
