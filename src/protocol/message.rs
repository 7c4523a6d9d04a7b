use crate::{CallId, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Discriminator carried in the `type` field of every call envelope.
pub const CALL_TYPE: &str = "rpc-call";

/// Outbound call envelope.
///
/// Serializes to `{"type":"rpc-call","function":..,"args":[..],"id":..}`
/// with the fields in that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: String,
    pub args: Vec<Value>,
    pub id: CallId,
}

impl CallEnvelope {
    // ---

    pub fn new(id: CallId, function: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            kind: CALL_TYPE.to_string(),
            function: function.into(),
            args,
            id,
        }
    }

    /// Serialize to the JSON text sent over the transport.
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a call envelope from text (the peer's side of the exchange).
    pub fn from_text(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// True when the `type` discriminator marks this as a call.
    pub fn is_call(&self) -> bool {
        self.kind == CALL_TYPE
    }
}

/// Convert caller-supplied arguments into the positional `args` array.
///
/// A JSON array (tuple, `Vec`, slice) is taken as-is, `()` / null means no
/// arguments, and any other value becomes the single positional argument.
pub(crate) fn positional_args<A>(args: &A) -> Result<Vec<Value>>
where
    A: Serialize + ?Sized,
{
    // ---
    Ok(match serde_json::to_value(args)? {
        Value::Array(values) => values,
        Value::Null => Vec::new(),
        other => vec![other],
    })
}

/// An inbound reply whose `id` could be extracted.
///
/// `body` is the whole parsed message, returned verbatim to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub id: CallId,
    pub body: Value,
}

/// Why an inbound frame could not be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Uncorrelated {
    Malformed,
    MissingId,
}

impl fmt::Display for Uncorrelated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Uncorrelated::Malformed => f.write_str("malformed frame"),
            Uncorrelated::MissingId => f.write_str("frame without usable id"),
        }
    }
}

impl Reply {
    // ---

    /// Parse inbound text and extract its call id.
    pub(crate) fn parse(text: &str) -> std::result::Result<Reply, Uncorrelated> {
        // ---
        let body: Value = serde_json::from_str(text).map_err(|_| Uncorrelated::Malformed)?;

        let id = body
            .get("id")
            .and_then(CallId::from_json)
            .ok_or(Uncorrelated::MissingId)?;

        Ok(Reply { id, body })
    }
}
