//! Finding who owns a source.
//!
//! An identifier matching a prefix rule goes to that rule's resolver with the
//! prefix stripped. Anything else walks the fallback order until one
//! resolver knows it. Sources nobody knows are registered as social sources
//! of the default group.

use crate::report::SkipReason;
use gateway_core::config::{PrefixRule, ResolutionConfig};
use gateway_core::{Owner, SourceDirectory, SourceKind};
use tracing::{debug, info, warn};

/// Owner of a source plus the user id its limit is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub owner: Owner,
    /// The source id, or the identifier minted by auto-registration.
    pub limit_user: String,
}

pub struct OwnerResolver {
    directory: SourceDirectory,
    prefixes: Vec<PrefixRule>,
    fallback: Vec<SourceKind>,
    default_group: String,
}

impl OwnerResolver {
    pub fn new(directory: SourceDirectory, config: &ResolutionConfig, default_group: &str) -> Self {
        Self {
            directory,
            prefixes: config.prefixes.clone(),
            fallback: config.fallback.clone(),
            default_group: default_group.to_string(),
        }
    }

    /// Resolvers to try for `source_id`, in order, with the key each expects.
    pub fn route<'a>(&self, source_id: &'a str) -> Vec<(SourceKind, &'a str)> {
        for rule in &self.prefixes {
            if let Some(key) = source_id.strip_prefix(rule.prefix.as_str()) {
                return vec![(rule.kind, key)];
            }
        }
        self.fallback.iter().map(|&kind| (kind, source_id)).collect()
    }

    /// Look the source up, registering it when no resolver knows it.
    pub async fn resolve(&self, source_id: &str) -> Result<Resolved, SkipReason> {
        if let Some(owner) = self.lookup(source_id).await {
            return Ok(Resolved {
                owner,
                limit_user: source_id.to_string(),
            });
        }
        self.register(source_id).await
    }

    async fn lookup(&self, source_id: &str) -> Option<Owner> {
        for (kind, key) in self.route(source_id) {
            match self.directory.resolver(kind).read(key).await {
                Ok(Some(owner)) if !owner.group_id.is_empty() => {
                    debug!(source = source_id, kind = %kind, group_id = %owner.group_id, "Source resolved");
                    return Some(owner);
                }
                Ok(_) => {}
                // A miss is silent; only a failing resolver is worth a warning.
                Err(e) => {
                    warn!(source = source_id, kind = %kind, error = %e, "Source lookup failed");
                }
            }
        }
        None
    }

    async fn register(&self, source_id: &str) -> Result<Resolved, SkipReason> {
        let id = self
            .directory
            .registrar
            .create(source_id, &self.default_group, source_id)
            .await
            .map_err(|e| {
                warn!(source = source_id, error = %e, "Source auto-registration failed");
                SkipReason::RegistrationFailed {
                    message: e.to_string(),
                }
            })?;
        info!(source = source_id, id = %id, group_id = %self.default_group, "Source auto-registered");
        Ok(Resolved {
            owner: Owner::new(self.default_group.clone(), id.clone()),
            limit_user: id,
        })
    }
}
