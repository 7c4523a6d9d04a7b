use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identifier used to match a reply to the call that produced it.
///
/// Call ids are carried *in-band* inside the call and reply envelopes and
/// are allocated from a per-connection counter, so they are unique among
/// in-flight calls without any reuse check. They are opaque to the
/// transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(u64);

impl CallId {
    // ---

    /// The first id handed out on a fresh connection.
    pub const FIRST: CallId = CallId(0);

    /// Numeric value of this id.
    pub fn get(self) -> u64 {
        self.0
    }

    /// Return this id and advance `self` to the next one.
    pub(crate) fn take_next(&mut self) -> CallId {
        // ---
        let current = *self;
        self.0 += 1;
        current
    }

    /// Interpret the `id` field of an inbound message.
    ///
    /// Accepts an unsigned integer or a string holding one, so a peer that
    /// echoes the id back as text still correlates. Anything else (missing,
    /// negative, fractional, non-numeric) yields `None`.
    pub fn from_json(value: &Value) -> Option<CallId> {
        // ---
        match value {
            Value::Number(n) => n.as_u64().map(CallId),
            Value::String(s) => s.trim().parse::<u64>().ok().map(CallId),
            _ => None,
        }
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for CallId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
