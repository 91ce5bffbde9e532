//! Host-side view of a connected keychain account.

use kc_channel::{ChannelError, MessageChannel};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::rpc::{
    Call, DeployContractParams, DeployResult, ExecuteParams, GetNonceParams, InvocationDetails,
    InvokeResult, Request, RequestPayload, ResponsePayload, TypedDataParams,
    VerifyMessageHashParams, VerifyMessageParams,
};

/// Errors returned by account operations.
#[derive(Debug, Error)]
pub enum AccountError {
    /// The keychain answered with an error string.
    #[error("{0}")]
    Remote(String),

    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// The response did not have the expected shape.
    #[error("invalid result: {0}")]
    InvalidResult(#[source] serde_json::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The authorization window could not be opened.
    #[error("popup error: {0}")]
    Popup(String),
}

/// Sends typed requests through a channel and decodes the responses.
#[derive(Clone)]
pub struct RpcCaller {
    channel: MessageChannel,
    origin: String,
    deadline: Option<Duration>,
}

impl RpcCaller {
    /// `origin` is this window's origin. `deadline` bounds every
    /// [`call`](Self::call); `None` waits forever.
    pub fn new(channel: MessageChannel, origin: impl Into<String>, deadline: Option<Duration>) -> Self {
        Self {
            channel,
            origin: origin.into(),
            deadline,
        }
    }

    pub fn channel(&self) -> &MessageChannel {
        &self.channel
    }

    pub async fn call<T: DeserializeOwned>(&self, request: Request) -> Result<T, AccountError> {
        self.call_with_deadline(request, self.deadline).await
    }

    /// One round trip with an explicit deadline, ignoring the default.
    pub async fn call_with_deadline<T: DeserializeOwned>(
        &self,
        request: Request,
        deadline: Option<Duration>,
    ) -> Result<T, AccountError> {
        let method = request.method();
        let payload = RequestPayload::new(&self.origin, &request)?.to_value()?;

        let pending = self.channel.send(payload)?;
        debug!(id = %pending.id(), method, "keychain request sent");
        let reply = match deadline {
            Some(deadline) => pending.with_deadline(deadline).await?,
            None => pending.await?,
        };

        let response = ResponsePayload::from_value(reply).map_err(AccountError::InvalidResult)?;
        if response.origin != self.channel.target().origin() {
            warn!(
                expected = self.channel.target().origin(),
                actual = %response.origin,
                method,
                "response origin does not match keychain"
            );
        }
        let result: Value = response.into_result().map_err(AccountError::Remote)?;
        serde_json::from_value(result).map_err(AccountError::InvalidResult)
    }
}

/// A connected account. Every method is exactly one round trip to the
/// keychain; nothing is cached and nothing is retried.
#[derive(Clone)]
pub struct RemoteAccount {
    address: String,
    caller: RpcCaller,
}

impl RemoteAccount {
    pub fn new(address: impl Into<String>, caller: RpcCaller) -> Self {
        Self {
            address: address.into(),
            caller,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Execute `calls` as one transaction.
    pub async fn execute(
        &self,
        calls: Vec<Call>,
        details: Option<InvocationDetails>,
    ) -> Result<InvokeResult, AccountError> {
        self.caller
            .call(Request::Execute(ExecuteParams { calls, details }))
            .await
    }

    /// Sign typed data, returning the signature felts.
    pub async fn sign_message(&self, typed_data: Value) -> Result<Vec<String>, AccountError> {
        self.caller
            .call(Request::SignMessage(TypedDataParams { typed_data }))
            .await
    }

    pub async fn hash_message(&self, typed_data: Value) -> Result<String, AccountError> {
        self.caller
            .call(Request::HashMessage(TypedDataParams { typed_data }))
            .await
    }

    pub async fn verify_message(
        &self,
        typed_data: Value,
        signature: Vec<String>,
    ) -> Result<bool, AccountError> {
        self.caller
            .call(Request::VerifyMessage(VerifyMessageParams {
                typed_data,
                signature,
            }))
            .await
    }

    pub async fn verify_message_hash(
        &self,
        hash: impl Into<String>,
        signature: Vec<String>,
    ) -> Result<bool, AccountError> {
        self.caller
            .call(Request::VerifyMessageHash(VerifyMessageHashParams {
                hash: hash.into(),
                signature,
            }))
            .await
    }

    pub async fn get_nonce(&self, block_identifier: Option<String>) -> Result<String, AccountError> {
        self.caller
            .call(Request::GetNonce(GetNonceParams { block_identifier }))
            .await
    }

    pub async fn deploy_contract(
        &self,
        params: DeployContractParams,
    ) -> Result<DeployResult, AccountError> {
        self.caller.call(Request::DeployContract(params)).await
    }
}

impl std::fmt::Debug for RemoteAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteAccount")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
