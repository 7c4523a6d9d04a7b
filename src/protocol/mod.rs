/// Wire format for call envelopes and inbound replies
///
/// Calls go out as JSON text tagged `"type": "rpc-call"`; replies are any JSON
/// object carrying the `id` of the call they answer.
mod message;

pub use message::{CallEnvelope, CALL_TYPE};

pub(crate) use message::{positional_args, Reply};
