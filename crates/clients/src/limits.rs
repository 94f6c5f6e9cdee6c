//! gRPC client of the limits (usage) service.

use crate::auth::authenticated;
use crate::channel::unary;
use crate::proto::{self, limits as pb};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gateway_core::types::{Limit, Subject};
use gateway_core::{LimitsError, LimitsStore};
use tonic::transport::Channel;
use tonic::{Code, Status};
use tracing::debug;

pub struct GrpcLimitsStore {
    channel: Channel,
}

impl GrpcLimitsStore {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl LimitsStore for GrpcLimitsStore {
    async fn get_raw(
        &self,
        group_id: &str,
        user_id: &str,
        subject: Subject,
    ) -> Result<Limit, LimitsError> {
        let message = pb::GetRequest {
            subj: encode_subject(subject)? as i32,
            raw: true,
        };
        let request = authenticated(message, group_id, user_id).map_err(LimitsError::Invalid)?;
        let response: pb::GetResponse = unary(&self.channel, pb::GET, request)
            .await
            .map_err(decode_error)?;
        debug!(group_id, user_id, subject = %subject, count = response.count, "Read limit");
        Ok(Limit {
            count: response.count,
            user_id: response.user_id,
            expires: response.expires.and_then(decode_timestamp),
        })
    }

    async fn set(
        &self,
        group_id: &str,
        user_id: &str,
        subject: Subject,
        count: i64,
        expires: Option<DateTime<Utc>>,
    ) -> Result<(), LimitsError> {
        let message = pb::SetRequest {
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
            subj: encode_subject(subject)? as i32,
            count,
            expires: expires.map(encode_timestamp),
        };
        let request = authenticated(message, group_id, user_id).map_err(LimitsError::Invalid)?;
        let _: pb::SetResponse = unary(&self.channel, pb::SET, request)
            .await
            .map_err(decode_error)?;
        debug!(group_id, user_id, subject = %subject, count, "Set limit");
        Ok(())
    }
}

fn encode_subject(subject: Subject) -> Result<pb::Subject, LimitsError> {
    match subject {
        Subject::Interests => Ok(pb::Subject::Interests),
        Subject::PublishHourly => Ok(pb::Subject::PublishHourly),
        Subject::PublishDaily => Ok(pb::Subject::PublishDaily),
        Subject::Undefined => Err(LimitsError::Invalid(format!("invalid subject: {subject}"))),
    }
}

fn decode_error(status: Status) -> LimitsError {
    let message = status.message().to_string();
    match status.code() {
        Code::InvalidArgument => LimitsError::Invalid(message),
        Code::NotFound => LimitsError::NotFound(message),
        Code::Unauthenticated => LimitsError::Forbidden(message),
        _ => LimitsError::Internal(format!("{:?}: {message}", status.code())),
    }
}

pub(crate) fn encode_timestamp(t: DateTime<Utc>) -> proto::Timestamp {
    proto::Timestamp {
        seconds: t.timestamp(),
        nanos: t.timestamp_subsec_nanos() as i32,
    }
}

pub(crate) fn decode_timestamp(ts: proto::Timestamp) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts.seconds, u32::try_from(ts.nanos).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_codes_map_to_limit_errors() {
        assert_eq!(
            decode_error(Status::invalid_argument("bad subject")),
            LimitsError::Invalid("bad subject".into())
        );
        assert!(decode_error(Status::not_found("none")).is_not_found());
        assert_eq!(
            decode_error(Status::unauthenticated("who")),
            LimitsError::Forbidden("who".into())
        );
        assert!(decode_error(Status::unavailable("down")).is_internal());
        assert!(decode_error(Status::deadline_exceeded("slow")).is_internal());
    }

    #[test]
    fn test_undefined_subject_is_rejected() {
        assert!(matches!(
            encode_subject(Subject::Undefined),
            Err(LimitsError::Invalid(_))
        ));
        assert_eq!(
            encode_subject(Subject::PublishDaily).unwrap(),
            pb::Subject::PublishDaily
        );
        assert_eq!(pb::Subject::PublishHourly as i32, 2);
    }

    #[test]
    fn test_timestamp_conversion_keeps_instant() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let ts = encode_timestamp(t);
        assert_eq!(ts.seconds, t.timestamp());
        assert_eq!(decode_timestamp(ts), Some(t));
    }

    #[tokio::test]
    async fn test_undefined_subject_fails_before_any_call() {
        let channel = crate::channel::lazy_channel(&gateway_core::config::ServiceEndpoint::new(
            "127.0.0.1:1",
        ))
        .unwrap();
        let store = GrpcLimitsStore::new(channel);
        let err = store
            .get_raw("g", "u", Subject::Undefined)
            .await
            .unwrap_err();
        assert!(matches!(err, LimitsError::Invalid(_)));
    }
}
