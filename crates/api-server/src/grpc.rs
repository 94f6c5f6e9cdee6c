//! gRPC admin service: `awakari.metrics.Service/SetMostReadLimits`.

use gateway_core::types::Window;
use gateway_limiter::{AdaptiveLimitSetter, LimitError, LimitReport};
use std::sync::Arc;
use std::time::Instant;
use tonic::codegen::{empty_body, http, Body, BoxFuture, Context, Poll, Service, StdError};
use tonic::server::{Grpc, NamedService, UnaryService};
use tonic::{Request, Response, Status};
use tracing::{error, info};

pub const SERVICE_NAME: &str = "awakari.metrics.Service";
const SET_MOST_READ_LIMITS_PATH: &str = "/awakari.metrics.Service/SetMostReadLimits";

// Manual definitions matching metrics.proto.
pub mod metrics_proto {
    use std::collections::HashMap;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, prost::Enumeration)]
    #[repr(i32)]
    pub enum Subject {
        Undefined = 0,
        Interests = 1,
        PublishHourly = 2,
        PublishDaily = 3,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct SetMostReadLimitsRequest {}

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct SetMostReadLimitsResponse {
        #[prost(message, repeated, tag = "1")]
        pub limits: Vec<WindowLimits>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct WindowLimits {
        #[prost(enumeration = "Subject", tag = "1")]
        pub subj: i32,
        #[prost(map = "string, int64", tag = "2")]
        pub limit_by_source: HashMap<String, i64>,
    }
}

use metrics_proto::*;

/// Trait definition for the gRPC service (normally generated by tonic).
#[tonic::async_trait]
pub trait MetricsService: Send + Sync + 'static {
    async fn set_most_read_limits(
        &self,
        request: Request<SetMostReadLimitsRequest>,
    ) -> Result<Response<SetMostReadLimitsResponse>, Status>;
}

pub struct MetricsServiceImpl {
    setter: Arc<AdaptiveLimitSetter>,
}

impl MetricsServiceImpl {
    pub fn new(setter: Arc<AdaptiveLimitSetter>) -> Self {
        Self { setter }
    }
}

#[tonic::async_trait]
impl MetricsService for MetricsServiceImpl {
    async fn set_most_read_limits(
        &self,
        _request: Request<SetMostReadLimitsRequest>,
    ) -> Result<Response<SetMostReadLimitsResponse>, Status> {
        let start = Instant::now();
        let report = self.setter.set_most_read_limits().await.map_err(|e| {
            error!(error = %e, "SetMostReadLimits failed");
            encode_error(e)
        })?;
        info!(
            updated = report.updated_count(),
            skipped = report.skipped.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "SetMostReadLimits done"
        );
        Ok(Response::new(encode_report(&report)))
    }
}

fn encode_subject(window: Window) -> Subject {
    match window.publish_subject() {
        Some(gateway_core::Subject::PublishHourly) => Subject::PublishHourly,
        Some(gateway_core::Subject::PublishDaily) => Subject::PublishDaily,
        Some(gateway_core::Subject::Interests) => Subject::Interests,
        Some(gateway_core::Subject::Undefined) | None => Subject::Undefined,
    }
}

pub fn encode_report(report: &LimitReport) -> SetMostReadLimitsResponse {
    SetMostReadLimitsResponse {
        limits: report
            .updated
            .iter()
            .map(|(window, by_source)| WindowLimits {
                subj: encode_subject(*window) as i32,
                limit_by_source: by_source
                    .iter()
                    .map(|(source, count)| (source.clone(), *count))
                    .collect(),
            })
            .collect(),
    }
}

pub fn encode_error(err: LimitError) -> Status {
    if err.is_internal() {
        Status::internal(err.to_string())
    } else {
        Status::unknown(err.to_string())
    }
}

/// Tower adapter routing gRPC requests to a [`MetricsService`].
#[derive(Debug)]
pub struct MetricsServiceServer<T> {
    inner: Arc<T>,
}

impl<T: MetricsService> MetricsServiceServer<T> {
    pub fn new(inner: T) -> Self {
        Self::from_arc(Arc::new(inner))
    }

    pub fn from_arc(inner: Arc<T>) -> Self {
        Self { inner }
    }
}

impl<T> Clone for MetricsServiceServer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: MetricsService> NamedService for MetricsServiceServer<T> {
    const NAME: &'static str = SERVICE_NAME;
}

impl<T, B> Service<http::Request<B>> for MetricsServiceServer<T>
where
    T: MetricsService,
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<tonic::body::BoxBody>;
    type Error = std::convert::Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        match req.uri().path() {
            SET_MOST_READ_LIMITS_PATH => {
                struct SetMostReadLimitsSvc<T: MetricsService>(Arc<T>);

                impl<T: MetricsService> UnaryService<SetMostReadLimitsRequest> for SetMostReadLimitsSvc<T> {
                    type Response = SetMostReadLimitsResponse;
                    type Future = BoxFuture<Response<Self::Response>, Status>;

                    fn call(&mut self, request: Request<SetMostReadLimitsRequest>) -> Self::Future {
                        let inner = Arc::clone(&self.0);
                        Box::pin(async move { inner.set_most_read_limits(request).await })
                    }
                }

                let inner = self.inner.clone();
                Box::pin(async move {
                    let mut grpc = Grpc::new(tonic::codec::ProstCodec::default());
                    Ok(grpc.unary(SetMostReadLimitsSvc(inner), req).await)
                })
            }
            _ => Box::pin(async move { Ok(unimplemented_response()) }),
        }
    }
}

fn unimplemented_response() -> http::Response<tonic::body::BoxBody> {
    let mut response = http::Response::new(empty_body());
    let headers = response.headers_mut();
    headers.insert(
        http::header::HeaderName::from_static("grpc-status"),
        http::header::HeaderValue::from_static("12"),
    );
    headers.insert(
        http::header::CONTENT_TYPE,
        http::header::HeaderValue::from_static("application/grpc"),
    );
    response
}
