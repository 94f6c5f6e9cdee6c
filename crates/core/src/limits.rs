//! Quota storage abstraction.
//!
//! The limits (usage) service keeps one [`Limit`] per
//! `(group_id, user_id, subject)`. Expiry is enforced by that service.

use crate::error::LimitsError;
use crate::types::{Limit, Subject};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

#[async_trait]
pub trait LimitsStore: Send + Sync {
    /// Read the limit exactly as stored, without defaults applied.
    async fn get_raw(
        &self,
        group_id: &str,
        user_id: &str,
        subject: Subject,
    ) -> Result<Limit, LimitsError>;

    async fn set(
        &self,
        group_id: &str,
        user_id: &str,
        subject: Subject,
        count: i64,
        expires: Option<DateTime<Utc>>,
    ) -> Result<(), LimitsError>;
}

type LimitKey = (String, String, Subject);

/// A write received by [`MemoryLimitsStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitWrite {
    pub group_id: String,
    pub user_id: String,
    pub subject: Subject,
    pub count: i64,
    pub expires: Option<DateTime<Utc>>,
}

/// In-memory limits store for tests.
#[derive(Default)]
pub struct MemoryLimitsStore {
    limits: Mutex<HashMap<LimitKey, Limit>>,
    writes: Mutex<Vec<LimitWrite>>,
    reads: Mutex<Vec<LimitKey>>,
    fail_with: Mutex<Option<LimitsError>>,
    rejected_users: Mutex<HashMap<String, LimitsError>>,
    rejected_writes: Mutex<HashMap<String, LimitsError>>,
}

impl MemoryLimitsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, group_id: &str, user_id: &str, subject: Subject, limit: Limit) {
        self.limits
            .lock()
            .expect("limits mutex poisoned")
            .insert((group_id.to_string(), user_id.to_string(), subject), limit);
    }

    pub fn get(&self, group_id: &str, user_id: &str, subject: Subject) -> Option<Limit> {
        self.limits
            .lock()
            .expect("limits mutex poisoned")
            .get(&(group_id.to_string(), user_id.to_string(), subject))
            .cloned()
    }

    /// Fail every subsequent call with `err`.
    pub fn fail_with(&self, err: LimitsError) {
        *self.fail_with.lock().expect("limits mutex poisoned") = Some(err);
    }

    /// Fail every call for `user_id` with `err`.
    pub fn reject_user(&self, user_id: &str, err: LimitsError) {
        self.rejected_users
            .lock()
            .expect("limits mutex poisoned")
            .insert(user_id.to_string(), err);
    }

    /// Fail writes for `user_id` with `err`; reads still succeed.
    pub fn reject_writes(&self, user_id: &str, err: LimitsError) {
        self.rejected_writes
            .lock()
            .expect("limits mutex poisoned")
            .insert(user_id.to_string(), err);
    }

    pub fn writes(&self) -> Vec<LimitWrite> {
        self.writes.lock().expect("limits mutex poisoned").clone()
    }

    pub fn read_count(&self) -> usize {
        self.reads.lock().expect("limits mutex poisoned").len()
    }

    fn failure(&self, user_id: &str) -> Option<LimitsError> {
        if let Some(err) = self.fail_with.lock().expect("limits mutex poisoned").clone() {
            return Some(err);
        }
        self.rejected_users
            .lock()
            .expect("limits mutex poisoned")
            .get(user_id)
            .cloned()
    }

    fn write_failure(&self, user_id: &str) -> Option<LimitsError> {
        self.failure(user_id).or_else(|| {
            self.rejected_writes
                .lock()
                .expect("limits mutex poisoned")
                .get(user_id)
                .cloned()
        })
    }
}

#[async_trait]
impl LimitsStore for MemoryLimitsStore {
    async fn get_raw(
        &self,
        group_id: &str,
        user_id: &str,
        subject: Subject,
    ) -> Result<Limit, LimitsError> {
        let key = (group_id.to_string(), user_id.to_string(), subject);
        self.reads
            .lock()
            .expect("limits mutex poisoned")
            .push(key.clone());
        if let Some(err) = self.failure(user_id) {
            return Err(err);
        }
        self.limits
            .lock()
            .expect("limits mutex poisoned")
            .get(&key)
            .cloned()
            .ok_or_else(|| LimitsError::NotFound(format!("{group_id}/{user_id}/{subject}")))
    }

    async fn set(
        &self,
        group_id: &str,
        user_id: &str,
        subject: Subject,
        count: i64,
        expires: Option<DateTime<Utc>>,
    ) -> Result<(), LimitsError> {
        if let Some(err) = self.write_failure(user_id) {
            return Err(err);
        }
        self.writes
            .lock()
            .expect("limits mutex poisoned")
            .push(LimitWrite {
                group_id: group_id.to_string(),
                user_id: user_id.to_string(),
                subject,
                count,
                expires,
            });
        self.insert(
            group_id,
            user_id,
            subject,
            Limit {
                count,
                user_id: user_id.to_string(),
                expires,
            },
        );
        Ok(())
    }
}
