//! gRPC clients of the source services.
//!
//! A `NOT_FOUND` status means the service does not know the source and is
//! reported as `Ok(None)`.

use crate::channel::{lazy_channel, unary};
use crate::proto::{activitypub, feeds, sites, telegram};
use async_trait::async_trait;
use gateway_core::config::{ServiceEndpoint, SourcesConfig};
use gateway_core::{
    ClientError, GatewayError, Owner, SourceDirectory, SourceRegistrar, SourceResolver,
};
use std::sync::Arc;
use tonic::transport::Channel;
use tonic::{Code, Request, Status};
use tracing::{debug, info};

fn owner_or_missing(
    service: &'static str,
    result: Result<Option<Owner>, Status>,
) -> Result<Option<Owner>, ClientError> {
    match result {
        Ok(owner) => Ok(owner),
        Err(status) if status.code() == Code::NotFound => Ok(None),
        Err(status) => Err(ClientError::new(
            service,
            format!("{:?}: {}", status.code(), status.message()),
        )),
    }
}

pub struct FeedsClient {
    channel: Channel,
}

impl FeedsClient {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl SourceResolver for FeedsClient {
    async fn read(&self, key: &str) -> Result<Option<Owner>, ClientError> {
        let request = Request::new(feeds::ReadRequest {
            url: key.to_string(),
        });
        let result = unary::<_, feeds::ReadResponse>(&self.channel, feeds::READ, request)
            .await
            .map(|r| r.feed.map(|f| Owner::new(f.group_id, f.user_id)));
        debug!(source = key, found = matches!(result, Ok(Some(_))), "Feed lookup");
        owner_or_missing("feeds", result)
    }
}

pub struct SitesClient {
    channel: Channel,
}

impl SitesClient {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl SourceResolver for SitesClient {
    async fn read(&self, key: &str) -> Result<Option<Owner>, ClientError> {
        let request = Request::new(sites::ReadRequest {
            addr: key.to_string(),
        });
        let result = unary::<_, sites::ReadResponse>(&self.channel, sites::READ, request)
            .await
            .map(|r| r.site.map(|s| Owner::new(s.group_id, s.user_id)));
        debug!(source = key, found = matches!(result, Ok(Some(_))), "Site lookup");
        owner_or_missing("sites", result)
    }
}

pub struct TelegramClient {
    channel: Channel,
}

impl TelegramClient {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl SourceResolver for TelegramClient {
    async fn read(&self, key: &str) -> Result<Option<Owner>, ClientError> {
        let request = Request::new(telegram::ReadRequest {
            link: key.to_string(),
        });
        let result = unary::<_, telegram::ReadResponse>(&self.channel, telegram::READ, request)
            .await
            .map(|r| r.channel.map(|c| Owner::new(c.group_id, c.user_id)));
        debug!(source = key, found = matches!(result, Ok(Some(_))), "Channel lookup");
        owner_or_missing("telegram", result)
    }
}

/// Social (ActivityPub) sources. Also registers sources nobody owns yet.
pub struct ActivityPubClient {
    channel: Channel,
}

impl ActivityPubClient {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl SourceResolver for ActivityPubClient {
    async fn read(&self, key: &str) -> Result<Option<Owner>, ClientError> {
        let request = Request::new(activitypub::ReadRequest {
            url: key.to_string(),
        });
        let result =
            unary::<_, activitypub::ReadResponse>(&self.channel, activitypub::READ, request)
                .await
                .map(|r| r.src.map(|s| Owner::new(s.group_id, s.user_id)));
        debug!(source = key, found = matches!(result, Ok(Some(_))), "Social lookup");
        owner_or_missing("activitypub", result)
    }
}

#[async_trait]
impl SourceRegistrar for ActivityPubClient {
    async fn create(&self, addr: &str, group_id: &str, name: &str) -> Result<String, ClientError> {
        let request = Request::new(activitypub::CreateRequest {
            addr: addr.to_string(),
            group_id: group_id.to_string(),
            user_id: name.to_string(),
        });
        let response: activitypub::CreateResponse =
            unary(&self.channel, activitypub::CREATE, request)
                .await
                .map_err(|s| {
                    ClientError::new("activitypub", format!("{:?}: {}", s.code(), s.message()))
                })?;
        if response.url.is_empty() {
            return Err(ClientError::new(
                "activitypub",
                format!("registration of {addr} returned no identifier"),
            ));
        }
        info!(addr, group_id, id = %response.url, "Registered source");
        Ok(response.url)
    }
}

/// Connect lazily to every source service.
pub fn directory(config: &SourcesConfig) -> Result<SourceDirectory, GatewayError> {
    let connect = |endpoint: &ServiceEndpoint| {
        lazy_channel(endpoint).map_err(|e| GatewayError::Config(format!("source channel: {e}")))
    };
    let social = Arc::new(ActivityPubClient::new(connect(&config.activitypub)?));
    Ok(SourceDirectory {
        feed: Arc::new(FeedsClient::new(connect(&config.feeds)?)),
        site: Arc::new(SitesClient::new(connect(&config.sites)?)),
        chat: Arc::new(TelegramClient::new(connect(&config.telegram)?)),
        social: social.clone(),
        registrar: social,
    })
}
