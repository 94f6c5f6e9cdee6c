//! gRPC client of the interests service.

use crate::auth::authenticated;
use crate::channel::unary;
use crate::proto::interests as pb;
use async_trait::async_trait;
use gateway_core::{ClientError, InterestSummary, InterestsDirectory};
use tonic::transport::Channel;
use tonic::Status;
use tracing::debug;

/// Sorts after every real interest id, so a descending search starts at the top.
const CURSOR_START_ID: &str = "zzzzzzzz-zzzz-zzzz-zzzz-zzzzzzzzzzzz";

/// User the gateway acts as towards the interests service.
const CALLER_USER_ID: &str = "metrics";

pub struct InterestsClient {
    channel: Channel,
}

impl InterestsClient {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }
}

fn status_error(status: Status) -> ClientError {
    ClientError::new(
        "interests",
        format!("{:?}: {}", status.code(), status.message()),
    )
}

fn top_followed_request(limit: u32) -> pb::SearchRequest {
    pb::SearchRequest {
        cursor: Some(pb::Cursor {
            id: CURSOR_START_ID.to_string(),
            followers: i64::MAX,
        }),
        limit,
        order: pb::Order::Desc as i32,
        sort: pb::Sort::Followers as i32,
    }
}

#[async_trait]
impl InterestsDirectory for InterestsClient {
    async fn search_top(&self, group_id: &str, limit: u32) -> Result<Vec<String>, ClientError> {
        let request = authenticated(top_followed_request(limit), group_id, CALLER_USER_ID)
            .map_err(|e| ClientError::new("interests", e))?;
        let response: pb::SearchResponse = unary(&self.channel, pb::SEARCH, request)
            .await
            .map_err(status_error)?;
        debug!(group_id, count = response.ids.len(), "Top interests search");
        Ok(response.ids)
    }

    async fn read(&self, group_id: &str, id: &str) -> Result<InterestSummary, ClientError> {
        let message = pb::ReadRequest { id: id.to_string() };
        let request = authenticated(message, group_id, CALLER_USER_ID)
            .map_err(|e| ClientError::new("interests", e))?;
        let response: pb::ReadResponse = unary(&self.channel, pb::READ, request)
            .await
            .map_err(status_error)?;
        Ok(InterestSummary {
            description: response.description,
            followers: response.followers,
            public: response.public,
        })
    }
}
