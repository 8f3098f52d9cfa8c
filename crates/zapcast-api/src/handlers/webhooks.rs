//! Gateway webhook handler
//!
//! The gateway posts `messages.update` events as delivery receipts and
//! `messages.upsert` events for messages the instance received. Receipt
//! correlation goes through the bounded tracker cache; unknown message
//! ids are acknowledged but ignored, since receipts can arrive for
//! traffic this service never sent.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use zapcast_common::types::MessageKind;
use zapcast_core::ReceiptKind;
use zapcast_storage::repository::MediaStatsRepository;

use crate::state::AppState;

/// Incoming webhook envelope
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub instance: Option<String>,
    #[serde(default)]
    pub data: Value,
}

/// Acknowledgement response
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub handled: bool,
}

/// POST /api/v1/webhooks/gateway
pub async fn gateway_webhook(
    State(state): State<Arc<AppState>>,
    Json(event): Json<WebhookEvent>,
) -> (StatusCode, Json<WebhookAck>) {
    let handled = match event.event.as_str() {
        "messages.update" => handle_message_update(&state, &event.data).await,
        "messages.upsert" => handle_message_upsert(&state, &event).await,
        other => {
            debug!(event = other, "unhandled webhook event");
            false
        }
    };

    (StatusCode::OK, Json(WebhookAck { handled }))
}

/// Delivery receipt: correlate by message id and advance the lead
async fn handle_message_update(state: &Arc<AppState>, data: &Value) -> bool {
    let Some(message_id) = extract_message_id(data) else {
        debug!("message update without a message id");
        return false;
    };
    let Some(status) = data
        .get("status")
        .or_else(|| data.pointer("/receipt/status"))
        .and_then(Value::as_str)
    else {
        debug!(message_id = %message_id, "message update without a status");
        return false;
    };

    let Some(kind) = ReceiptKind::parse(status) else {
        debug!(message_id = %message_id, status, "ignoring receipt status");
        return false;
    };

    let reason = data.get("error").and_then(Value::as_str);
    match state.receipts.apply(&message_id, kind, reason).await {
        Ok(handled) => handled,
        Err(e) => {
            warn!(message_id = %message_id, error = %e, "failed to apply receipt");
            false
        }
    }
}

/// Inbound message: count it toward the instance's received stats
async fn handle_message_upsert(state: &Arc<AppState>, event: &WebhookEvent) -> bool {
    // Our own sends come back through the webhook too; only count traffic
    // from the other side.
    let from_me = event
        .data
        .pointer("/key/fromMe")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if from_me {
        return false;
    }

    let Some(instance) = event.instance.as_deref() else {
        return false;
    };

    let kind = classify_message(&event.data);
    let repo = MediaStatsRepository::new(state.db_pool.pool().clone());
    match repo.record_receive(instance, kind, Utc::now()).await {
        Ok(_) => true,
        Err(e) => {
            warn!(instance = %instance, error = %e, "failed to record received message");
            false
        }
    }
}

fn extract_message_id(data: &Value) -> Option<String> {
    data.get("messageId")
        .or_else(|| data.pointer("/key/id"))
        .or_else(|| data.get("keyId"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Best-effort classification of an inbound message payload
fn classify_message(data: &Value) -> MessageKind {
    let message = data.pointer("/message").unwrap_or(&Value::Null);
    if message.get("imageMessage").is_some() {
        MessageKind::Image
    } else if message.get("videoMessage").is_some() {
        MessageKind::Video
    } else if message.get("audioMessage").is_some() {
        MessageKind::Audio
    } else if message.get("stickerMessage").is_some() {
        MessageKind::Sticker
    } else if message.get("reactionMessage").is_some() {
        MessageKind::Reaction
    } else {
        MessageKind::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_message_id_extraction_formats() {
        let flat = serde_json::json!({ "messageId": "A" });
        let keyed = serde_json::json!({ "key": { "id": "B" } });
        let legacy = serde_json::json!({ "keyId": "C" });

        assert_eq!(extract_message_id(&flat).as_deref(), Some("A"));
        assert_eq!(extract_message_id(&keyed).as_deref(), Some("B"));
        assert_eq!(extract_message_id(&legacy).as_deref(), Some("C"));
        assert_eq!(extract_message_id(&serde_json::json!({})), None);
    }

    #[test]
    fn test_inbound_classification() {
        let sticker = serde_json::json!({ "message": { "stickerMessage": {} } });
        let plain = serde_json::json!({ "message": { "conversation": "oi" } });

        assert_eq!(classify_message(&sticker), MessageKind::Sticker);
        assert_eq!(classify_message(&plain), MessageKind::Text);
    }
}
