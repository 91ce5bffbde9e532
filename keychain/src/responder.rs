//! Keychain side of the RPC protocol.

use async_trait::async_trait;
use kc_channel::RequestHandler;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::rpc::{
    ConnectParams, ConnectResult, DeployContractParams, DeployResult, ExecuteParams,
    GetNonceParams, InvokeResult, ProbeResult, Request, RequestPayload, ResponsePayload,
    TypedDataParams, VerifyMessageHashParams, VerifyMessageParams,
};

/// The privileged account and session module, as seen by the channel.
///
/// `origin` is the requesting window's origin. Errors are plain strings and
/// reach the caller verbatim.
#[async_trait]
pub trait Keychain: Send + Sync + 'static {
    /// Non-interactive check for an existing session with `origin`.
    async fn probe(&self, origin: &str) -> Result<ProbeResult, String>;

    async fn connect(&self, origin: &str, params: ConnectParams) -> Result<ConnectResult, String>;

    async fn disconnect(&self, origin: &str) -> Result<(), String>;

    async fn execute(&self, origin: &str, params: ExecuteParams) -> Result<InvokeResult, String>;

    async fn sign_message(
        &self,
        origin: &str,
        params: TypedDataParams,
    ) -> Result<Vec<String>, String>;

    async fn hash_message(&self, origin: &str, params: TypedDataParams) -> Result<String, String>;

    async fn verify_message(
        &self,
        origin: &str,
        params: VerifyMessageParams,
    ) -> Result<bool, String>;

    async fn verify_message_hash(
        &self,
        origin: &str,
        params: VerifyMessageHashParams,
    ) -> Result<bool, String>;

    async fn get_nonce(&self, origin: &str, params: GetNonceParams) -> Result<String, String>;

    async fn deploy_contract(
        &self,
        origin: &str,
        params: DeployContractParams,
    ) -> Result<DeployResult, String>;
}

/// Route `request` to the matching [`Keychain`] method.
pub async fn dispatch<K: Keychain + ?Sized>(
    keychain: &K,
    origin: &str,
    request: Request,
) -> Result<Value, String> {
    match request {
        Request::Probe => encode(keychain.probe(origin).await?),
        Request::Connect(params) => encode(keychain.connect(origin, params).await?),
        Request::Disconnect => encode(keychain.disconnect(origin).await?),
        Request::Execute(params) => encode(keychain.execute(origin, params).await?),
        Request::SignMessage(params) => encode(keychain.sign_message(origin, params).await?),
        Request::HashMessage(params) => encode(keychain.hash_message(origin, params).await?),
        Request::VerifyMessage(params) => encode(keychain.verify_message(origin, params).await?),
        Request::VerifyMessageHash(params) => {
            encode(keychain.verify_message_hash(origin, params).await?)
        }
        Request::GetNonce(params) => encode(keychain.get_nonce(origin, params).await?),
        Request::DeployContract(params) => {
            encode(keychain.deploy_contract(origin, params).await?)
        }
    }
}

fn encode<T: Serialize>(value: T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| e.to_string())
}

/// Serves a [`Keychain`] over a message channel.
///
/// The origin handed to the keychain is the one recorded on the message
/// event, never the self-declared origin in the payload.
pub struct KeychainResponder<K: ?Sized> {
    keychain: Arc<K>,
    origin: String,
}

impl<K: Keychain + ?Sized> KeychainResponder<K> {
    /// `origin` is the keychain's own origin, stamped on every response.
    pub fn new(keychain: Arc<K>, origin: impl Into<String>) -> Self {
        Self {
            keychain,
            origin: origin.into(),
        }
    }

    async fn respond(&self, payload: Value, origin: &str) -> ResponsePayload {
        let request = match RequestPayload::from_value(payload) {
            Ok(request) => request,
            Err(e) => {
                warn!(%origin, "rejecting request: {}", e);
                return ResponsePayload::err(&self.origin, e.to_string());
            }
        };
        if request.origin != origin {
            warn!(
                claimed = %request.origin,
                actual = %origin,
                "request origin does not match sender"
            );
        }

        let method = request.method.clone();
        let request = match request.into_request() {
            Ok(request) => request,
            Err(e) => {
                warn!(%origin, %method, "rejecting request: {}", e);
                return ResponsePayload::err(&self.origin, e.to_string());
            }
        };

        debug!(%origin, %method, "dispatching keychain request");
        match dispatch(self.keychain.as_ref(), origin, request).await {
            Ok(result) => ResponsePayload::ok(&self.origin, result),
            Err(error) => {
                debug!(%origin, %method, %error, "keychain request failed");
                ResponsePayload::err(&self.origin, error)
            }
        }
    }
}

#[async_trait]
impl<K: Keychain + ?Sized> RequestHandler for KeychainResponder<K> {
    async fn handle(&self, payload: Value, origin: &str) -> Value {
        self.respond(payload, origin).await.to_value()
    }
}
