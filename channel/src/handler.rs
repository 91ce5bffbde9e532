use async_trait::async_trait;
use serde_json::Value;

/// Responder for inbound requests on the privileged side of the channel.
///
/// The returned value becomes the payload of the response envelope, which is
/// posted back to the window the request came from.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, payload: Value, origin: &str) -> Value;
}
