//! Action Collector
//!
//! Accumulates a `DoAction` reply into one payload. Action replies are raw
//! byte fragments, not IPC streams, so they are concatenated without framing.

use bytes::BytesMut;
use futures_util::StreamExt;
use serde_json::Value;

use super::client::ByteStream;
use super::error::BridgeResult;

/// Decoded reply of a named action
#[derive(Debug, Clone, PartialEq)]
pub enum ActionReply {
    Json(Value),
    /// Reply was not JSON; carried through as (lossy) UTF-8
    Raw(String),
}

impl ActionReply {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match serde_json::from_slice(bytes) {
            Ok(value) => ActionReply::Json(value),
            Err(_) => ActionReply::Raw(String::from_utf8_lossy(bytes).into_owned()),
        }
    }

    /// HTTP body: the JSON as-is, or `{"success": true, "raw": ...}`.
    pub fn into_json(self) -> Value {
        match self {
            ActionReply::Json(value) => value,
            ActionReply::Raw(raw) => serde_json::json!({ "success": true, "raw": raw }),
        }
    }
}

/// Concatenate every reply body, then decode.
///
/// An error at any point discards whatever arrived before it.
pub async fn collect_action(mut replies: ByteStream) -> BridgeResult<ActionReply> {
    let mut buf = BytesMut::new();
    let mut fragments = 0usize;
    while let Some(chunk) = replies.next().await {
        buf.extend_from_slice(&chunk?);
        fragments += 1;
    }
    tracing::debug!(fragments, bytes = buf.len(), "action_reply_collected");
    Ok(ActionReply::from_bytes(&buf))
}

/// Wait for the first reply fragment or the end of the reply.
pub async fn await_first_reply(mut replies: ByteStream) -> BridgeResult<()> {
    match replies.next().await {
        Some(Err(e)) => Err(e),
        Some(Ok(_)) | None => Ok(()),
    }
}
