//! Channel setup and the unary call helper shared by every client.

use gateway_core::config::ServiceEndpoint;
use std::time::Duration;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Status};
use tracing::debug;

/// Build a channel that connects on first use, so the gateway can start
/// before its upstreams are reachable.
pub fn lazy_channel(endpoint: &ServiceEndpoint) -> Result<Channel, tonic::transport::Error> {
    let uri = with_scheme(&endpoint.uri);
    debug!(uri = %uri, "Configuring upstream channel");
    let channel = Endpoint::from_shared(uri)?
        .connect_timeout(Duration::from_millis(endpoint.connect_timeout_ms))
        .http2_keep_alive_interval(Duration::from_secs(endpoint.keep_alive_secs))
        .keep_alive_while_idle(true)
        .connect_lazy();
    Ok(channel)
}

/// Upstream addresses are often given as bare `host:port`.
fn with_scheme(uri: &str) -> String {
    if uri.contains("://") {
        uri.to_string()
    } else {
        format!("http://{uri}")
    }
}

pub(crate) async fn unary<Req, Resp>(
    channel: &Channel,
    path: &'static str,
    request: Request<Req>,
) -> Result<Resp, Status>
where
    Req: prost::Message + Send + Sync + 'static,
    Resp: prost::Message + Default + Send + Sync + 'static,
{
    let mut grpc = tonic::client::Grpc::new(channel.clone());
    grpc.ready()
        .await
        .map_err(|e| Status::unavailable(format!("service was not ready: {e}")))?;
    let codec: ProstCodec<Req, Resp> = ProstCodec::default();
    let response = grpc
        .unary(request, PathAndQuery::from_static(path), codec)
        .await?;
    Ok(response.into_inner())
}
