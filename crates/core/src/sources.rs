//! Content sources and the services that know who owns them.
//!
//! Each source type (feed, web site, social inbox, chat channel) lives in its
//! own upstream service. Callers hold a [`SourceDirectory`] with one
//! [`SourceResolver`] per [`SourceKind`] plus the [`SourceRegistrar`] used to
//! register sources nobody owns yet.

use crate::error::ClientError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Feed,
    Site,
    Social,
    Chat,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Feed => "feed",
            SourceKind::Site => "site",
            SourceKind::Social => "social",
            SourceKind::Chat => "chat",
        };
        f.write_str(name)
    }
}

/// Tenant group and user owning a source. An empty `user_id` means the source
/// is not bound to a particular user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub group_id: String,
    pub user_id: String,
}

impl Owner {
    pub fn new(group_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// Looks up the owner of a source. `Ok(None)` means the service does not
/// know the source.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<Owner>, ClientError>;
}

/// Registers a previously unknown source and returns its new identifier.
#[async_trait]
pub trait SourceRegistrar: Send + Sync {
    async fn create(&self, addr: &str, group_id: &str, name: &str) -> Result<String, ClientError>;
}

/// One resolver per source kind plus the registrar for unknown sources.
#[derive(Clone)]
pub struct SourceDirectory {
    pub feed: Arc<dyn SourceResolver>,
    pub site: Arc<dyn SourceResolver>,
    pub social: Arc<dyn SourceResolver>,
    pub chat: Arc<dyn SourceResolver>,
    pub registrar: Arc<dyn SourceRegistrar>,
}

impl SourceDirectory {
    pub fn resolver(&self, kind: SourceKind) -> &dyn SourceResolver {
        match kind {
            SourceKind::Feed => self.feed.as_ref(),
            SourceKind::Site => self.site.as_ref(),
            SourceKind::Social => self.social.as_ref(),
            SourceKind::Chat => self.chat.as_ref(),
        }
    }
}

/// In-memory source service for tests. Records every lookup and
/// registration it receives.
#[derive(Default)]
pub struct StaticSources {
    owners: Mutex<HashMap<String, Owner>>,
    failing: Mutex<Vec<String>>,
    reject_create: Mutex<bool>,
    created_prefix: String,
    calls: Mutex<Vec<String>>,
}

impl StaticSources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registrations return `{prefix}{addr}` as the new identifier.
    pub fn with_created_prefix(prefix: &str) -> Self {
        Self {
            created_prefix: prefix.to_string(),
            ..Self::default()
        }
    }

    pub fn insert(&self, key: &str, owner: Owner) {
        self.owners
            .lock()
            .expect("static sources mutex poisoned")
            .insert(key.to_string(), owner);
    }

    /// Make lookups of `key` fail with a service error.
    pub fn fail_on(&self, key: &str) {
        self.failing
            .lock()
            .expect("static sources mutex poisoned")
            .push(key.to_string());
    }

    pub fn reject_create(&self) {
        *self.reject_create.lock().expect("static sources mutex poisoned") = true;
    }

    /// Calls received so far, as `read:{key}` or `create:{addr}:{group}:{name}`.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .expect("static sources mutex poisoned")
            .clone()
    }

    fn record(&self, call: String) {
        self.calls
            .lock()
            .expect("static sources mutex poisoned")
            .push(call);
    }
}

#[async_trait]
impl SourceResolver for StaticSources {
    async fn read(&self, key: &str) -> Result<Option<Owner>, ClientError> {
        self.record(format!("read:{key}"));
        let failing = self
            .failing
            .lock()
            .expect("static sources mutex poisoned")
            .iter()
            .any(|k| k == key);
        if failing {
            return Err(ClientError::new("static", format!("lookup of {key} failed")));
        }
        Ok(self
            .owners
            .lock()
            .expect("static sources mutex poisoned")
            .get(key)
            .cloned())
    }
}

#[async_trait]
impl SourceRegistrar for StaticSources {
    async fn create(&self, addr: &str, group_id: &str, name: &str) -> Result<String, ClientError> {
        self.record(format!("create:{addr}:{group_id}:{name}"));
        if *self.reject_create.lock().expect("static sources mutex poisoned") {
            return Err(ClientError::new("static", format!("cannot register {addr}")));
        }
        let id = format!("{}{addr}", self.created_prefix);
        self.insert(&id, Owner::new(group_id, id.clone()));
        Ok(id)
    }
}
