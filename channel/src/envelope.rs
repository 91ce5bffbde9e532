//! Wire envelope exchanged between windows.

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ChannelError;

/// Tag placed in every envelope's `target` field. Messages carrying any other
/// tag belong to someone else on the page and are ignored.
pub const CHANNEL_TAG: &str = "keychain-channel";

/// Length of freshly generated correlation ids in bytes.
const CORRELATION_ID_LEN: usize = 16;

/// Token linking a request to its eventual response.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a new random correlation id.
    pub fn random<R: RngCore>(rng: &mut R) -> Self {
        let mut bytes = [0u8; CORRELATION_ID_LEN];
        rng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// The id as sent on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CorrelationId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl fmt::Debug for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CorrelationId({})", self.0)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Direction of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    Request,
    Response,
}

/// `{ id, type, target, payload }` as posted between windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: CorrelationId,
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    pub target: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// A request envelope tagged for this channel.
    pub fn request(id: CorrelationId, payload: Value) -> Self {
        Self {
            id,
            kind: EnvelopeKind::Request,
            target: CHANNEL_TAG.to_owned(),
            payload,
        }
    }

    /// A response envelope tagged for this channel.
    pub fn response(id: CorrelationId, payload: Value) -> Self {
        Self {
            id,
            kind: EnvelopeKind::Response,
            target: CHANNEL_TAG.to_owned(),
            payload,
        }
    }

    /// Parse an inbound message, returning `None` for anything that is not an
    /// envelope addressed to this channel.
    pub fn parse(data: &Value) -> Option<Self> {
        let envelope = Self::deserialize(data).ok()?;
        (envelope.target == CHANNEL_TAG).then_some(envelope)
    }

    pub fn to_value(&self) -> Result<Value, ChannelError> {
        Ok(serde_json::to_value(self)?)
    }
}
