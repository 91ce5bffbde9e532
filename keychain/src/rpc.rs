//! Keychain RPC payloads.
//!
//! Every request travels inside a channel envelope as
//! `{ "origin", "method", "params"? }` and every response as
//! `{ "origin", "result"?, "error"? }`. On the Rust side a request is a
//! [`Request`] with one variant per method, so both ends match on it
//! exhaustively.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Errors decoding an inbound request payload.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("malformed request: {0}")]
    Malformed(serde_json::Error),

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("invalid params for {method}: {source}")]
    InvalidParams {
        method: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A permission requested at connect time.
///
/// Enforcement belongs to the keychain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

impl Scope {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            method: None,
        }
    }

    pub fn with_method(target: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            method: Some(method.into()),
        }
    }
}

/// A single contract call. Calldata is opaque felt strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    pub contract_address: String,
    pub entrypoint: String,
    #[serde(default)]
    pub calldata: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectParams {
    pub scopes: Vec<Scope>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteParams {
    pub calls: Vec<Call>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<InvocationDetails>,
}

/// Typed data is passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedDataParams {
    pub typed_data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyMessageParams {
    pub typed_data: Value,
    pub signature: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyMessageHashParams {
    pub hash: String,
    pub signature: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetNonceParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_identifier: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployContractParams {
    pub class_hash: String,
    #[serde(default)]
    pub constructor_calldata: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectResult {
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeResult {
    pub transaction_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployResult {
    pub transaction_hash: String,
    pub contract_address: String,
}

/// A keychain request, one variant per RPC method.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Probe,
    Connect(ConnectParams),
    Disconnect,
    Execute(ExecuteParams),
    SignMessage(TypedDataParams),
    HashMessage(TypedDataParams),
    VerifyMessage(VerifyMessageParams),
    VerifyMessageHash(VerifyMessageHashParams),
    GetNonce(GetNonceParams),
    DeployContract(DeployContractParams),
}

impl Request {
    /// Wire name of the method.
    pub fn method(&self) -> &'static str {
        match self {
            Self::Probe => "probe",
            Self::Connect(_) => "connect",
            Self::Disconnect => "disconnect",
            Self::Execute(_) => "execute",
            Self::SignMessage(_) => "signMessage",
            Self::HashMessage(_) => "hashMessage",
            Self::VerifyMessage(_) => "verifyMessage",
            Self::VerifyMessageHash(_) => "verifyMessageHash",
            Self::GetNonce(_) => "getNonce",
            Self::DeployContract(_) => "deployContract",
        }
    }

    /// Encoded params, `None` for methods without any.
    pub fn params(&self) -> Result<Option<Value>, serde_json::Error> {
        let params = match self {
            Self::Probe | Self::Disconnect => return Ok(None),
            Self::Connect(p) => serde_json::to_value(p)?,
            Self::Execute(p) => serde_json::to_value(p)?,
            Self::SignMessage(p) | Self::HashMessage(p) => serde_json::to_value(p)?,
            Self::VerifyMessage(p) => serde_json::to_value(p)?,
            Self::VerifyMessageHash(p) => serde_json::to_value(p)?,
            Self::GetNonce(p) => serde_json::to_value(p)?,
            Self::DeployContract(p) => serde_json::to_value(p)?,
        };
        Ok(Some(params))
    }

    /// Decode a request from its wire method name and params.
    ///
    /// Missing params decode as an empty object.
    pub fn from_parts(method: &str, params: Option<Value>) -> Result<Self, RpcError> {
        fn decode<T: serde::de::DeserializeOwned>(
            method: &str,
            params: Option<Value>,
        ) -> Result<T, RpcError> {
            serde_json::from_value(params.unwrap_or_else(|| json!({}))).map_err(|source| {
                RpcError::InvalidParams {
                    method: method.to_string(),
                    source,
                }
            })
        }

        Ok(match method {
            "probe" => Self::Probe,
            "connect" => Self::Connect(decode(method, params)?),
            "disconnect" => Self::Disconnect,
            "execute" => Self::Execute(decode(method, params)?),
            "signMessage" => Self::SignMessage(decode(method, params)?),
            "hashMessage" => Self::HashMessage(decode(method, params)?),
            "verifyMessage" => Self::VerifyMessage(decode(method, params)?),
            "verifyMessageHash" => Self::VerifyMessageHash(decode(method, params)?),
            "getNonce" => Self::GetNonce(decode(method, params)?),
            "deployContract" => Self::DeployContract(decode(method, params)?),
            other => return Err(RpcError::UnknownMethod(other.to_string())),
        })
    }
}

/// Request payload as carried on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestPayload {
    pub origin: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RequestPayload {
    pub fn new(origin: &str, request: &Request) -> Result<Self, serde_json::Error> {
        Ok(Self {
            origin: origin.to_string(),
            method: request.method().to_string(),
            params: request.params()?,
        })
    }

    /// Decode from a channel payload.
    pub fn from_value(value: Value) -> Result<Self, RpcError> {
        serde_json::from_value(value).map_err(RpcError::Malformed)
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn into_request(self) -> Result<Request, RpcError> {
        Request::from_parts(&self.method, self.params)
    }
}

/// Response payload as carried on the wire.
///
/// Exactly one of `result` and `error` is expected; an `error` always wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
    pub origin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponsePayload {
    pub fn ok(origin: &str, result: Value) -> Self {
        Self {
            origin: origin.to_string(),
            result: Some(result),
            error: None,
        }
    }

    pub fn err(origin: &str, error: impl Into<String>) -> Self {
        Self {
            origin: origin.to_string(),
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn to_value(&self) -> Value {
        let mut value = json!({ "origin": self.origin });
        if let Some(result) = &self.result {
            value["result"] = result.clone();
        }
        if let Some(error) = &self.error {
            value["error"] = json!(error);
        }
        value
    }

    /// The result, or the remote-reported error string verbatim.
    ///
    /// A response with neither field (including `"result": null`) yields
    /// `Value::Null`.
    pub fn into_result(self) -> Result<Value, String> {
        match (self.error, self.result) {
            (Some(error), _) => Err(error),
            (None, result) => Ok(result.unwrap_or(Value::Null)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn execute() -> Request {
        Request::Execute(ExecuteParams {
            calls: vec![Call {
                contract_address: "0x1".to_string(),
                entrypoint: "transfer".to_string(),
                calldata: vec!["0x2".to_string(), "100".to_string()],
            }],
            details: None,
        })
    }

    #[test]
    fn test_request_wire_shape() {
        let payload = RequestPayload::new("https://game.example", &execute()).unwrap();
        assert_eq!(
            payload.to_value().unwrap(),
            json!({
                "origin": "https://game.example",
                "method": "execute",
                "params": {
                    "calls": [{
                        "contractAddress": "0x1",
                        "entrypoint": "transfer",
                        "calldata": ["0x2", "100"]
                    }]
                }
            })
        );
    }

    #[test]
    fn test_paramless_methods_omit_params() {
        let payload = RequestPayload::new("o", &Request::Probe).unwrap();
        assert_eq!(
            payload.to_value().unwrap(),
            json!({ "origin": "o", "method": "probe" })
        );
        assert_eq!(payload.into_request().unwrap(), Request::Probe);
    }

    #[test]
    fn test_decode_every_method() {
        let requests = [
            Request::Probe,
            Request::Connect(ConnectParams {
                scopes: vec![Scope::with_method("0x1", "transfer"), Scope::new("0x2")],
            }),
            Request::Disconnect,
            execute(),
            Request::SignMessage(TypedDataParams {
                typed_data: json!({ "primaryType": "Mail" }),
            }),
            Request::HashMessage(TypedDataParams {
                typed_data: json!({ "primaryType": "Mail" }),
            }),
            Request::VerifyMessage(VerifyMessageParams {
                typed_data: json!({}),
                signature: vec!["0xa".to_string(), "0xb".to_string()],
            }),
            Request::VerifyMessageHash(VerifyMessageHashParams {
                hash: "0xabc".to_string(),
                signature: vec!["0xa".to_string()],
            }),
            Request::GetNonce(GetNonceParams {
                block_identifier: Some("pending".to_string()),
            }),
            Request::DeployContract(DeployContractParams {
                class_hash: "0xc1a55".to_string(),
                constructor_calldata: vec![],
                salt: None,
            }),
        ];

        for request in requests {
            let wire = RequestPayload::new("o", &request).unwrap().to_value().unwrap();
            let decoded = RequestPayload::from_value(wire)
                .unwrap()
                .into_request()
                .unwrap();
            assert_eq!(decoded, request, "method {}", request.method());
        }
    }

    #[test]
    fn test_missing_params_default_to_empty_object() {
        assert_eq!(
            Request::from_parts("getNonce", None).unwrap(),
            Request::GetNonce(GetNonceParams::default())
        );
        assert!(matches!(
            Request::from_parts("execute", None),
            Err(RpcError::InvalidParams { method, .. }) if method == "execute"
        ));
    }

    #[test]
    fn test_unknown_method_rejected() {
        assert!(matches!(
            Request::from_parts("dropTables", None),
            Err(RpcError::UnknownMethod(m)) if m == "dropTables"
        ));
    }

    #[test]
    fn test_malformed_payload_rejected() {
        assert!(matches!(
            RequestPayload::from_value(json!({ "method": 7 })),
            Err(RpcError::Malformed(_))
        ));
    }

    #[test]
    fn test_response_error_wins() {
        let response = ResponsePayload::from_value(json!({
            "origin": "https://x.cartridge.gg",
            "result": 1,
            "error": "boom"
        }))
        .unwrap();
        assert_eq!(response.into_result(), Err("boom".to_string()));
    }

    #[test]
    fn test_response_null_result() {
        let response = ResponsePayload::ok("k", Value::Null);
        let wire = response.to_value();
        assert_eq!(wire, json!({ "origin": "k", "result": null }));
        assert_eq!(
            ResponsePayload::from_value(wire).unwrap().into_result(),
            Ok(Value::Null)
        );
    }

    #[test]
    fn test_response_error_shape() {
        assert_eq!(
            ResponsePayload::err("k", "denied").to_value(),
            json!({ "origin": "k", "error": "denied" })
        );
    }
}
