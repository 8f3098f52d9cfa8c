//! HTTP client for the WhatsApp gateway
//!
//! The gateway exposes one endpoint per content kind, keyed by instance
//! name, with a shared `apikey` header. Every successful send returns a
//! provider message id; a 2xx response without one is treated as a
//! permanent failure, since receipts could never be correlated back.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};
use zapcast_common::config::GatewayConfig;
use zapcast_common::types::{normalize_jid, MessageKind};
use zapcast_common::{Error, Result};

/// Outcome of a single send attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Accepted by the gateway
    Sent { message_id: String },
    /// Worth retrying: timeouts, connection errors, 429 and 5xx
    TemporaryFailure { error: String },
    /// Not worth retrying: other 4xx, malformed responses
    PermanentFailure { error: String },
}

/// Media attachment for image/video/audio/sticker sends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaPayload {
    /// Raw base64 without a `data:` prefix
    pub base64: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub mimetype: Option<String>,
}

/// One outbound message
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub instance_name: String,
    pub phone: String,
    pub kind: MessageKind,
    pub text: Option<String>,
    pub media: Option<MediaPayload>,
    /// Gateway message id being reacted to, for reactions only
    pub reacted_message_id: Option<String>,
    /// Emoji for reactions
    pub reaction: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayResponse {
    key: Option<MessageKey>,
}

#[derive(Debug, Deserialize)]
struct MessageKey {
    id: Option<String>,
}

/// WhatsApp gateway client
#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    config: GatewayConfig,
}

impl GatewayClient {
    /// Create a new gateway client
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Gateway(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// The configured base URL
    pub fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    /// Digits-only phone with the country prefix guaranteed
    pub fn format_number(&self, phone: &str) -> String {
        let digits = normalize_jid(phone);
        let prefix = &self.config.default_country_prefix;
        if digits.starts_with(prefix.as_str()) {
            digits
        } else {
            format!("{}{}", prefix, digits)
        }
    }

    /// Send a message, retrying temporary failures up to the configured
    /// attempt count with a fixed pause between attempts. Returns the
    /// provider message id.
    pub async fn send(&self, request: &SendRequest) -> Result<String> {
        let mut last_error = String::new();

        for attempt in 1..=self.config.max_attempts {
            match self.send_once(request).await {
                SendOutcome::Sent { message_id } => {
                    debug!(
                        instance = %request.instance_name,
                        kind = %request.kind,
                        message_id = %message_id,
                        attempt,
                        "message accepted by gateway"
                    );
                    return Ok(message_id);
                }
                SendOutcome::TemporaryFailure { error } => {
                    warn!(
                        instance = %request.instance_name,
                        kind = %request.kind,
                        attempt,
                        max_attempts = self.config.max_attempts,
                        error = %error,
                        "temporary gateway failure"
                    );
                    last_error = error;
                    if attempt < self.config.max_attempts {
                        tokio::time::sleep(Duration::from_secs(self.config.retry_delay_secs))
                            .await;
                    }
                }
                SendOutcome::PermanentFailure { error } => {
                    return Err(Error::Gateway(error));
                }
            }
        }

        Err(Error::Gateway(format!(
            "Send failed after {} attempts: {}",
            self.config.max_attempts, last_error
        )))
    }

    /// One attempt, classified but not retried
    pub async fn send_once(&self, request: &SendRequest) -> SendOutcome {
        let (endpoint, payload) = match self.build_payload(request) {
            Ok(pair) => pair,
            Err(e) => {
                return SendOutcome::PermanentFailure {
                    error: e.to_string(),
                }
            }
        };

        let url = format!("{}{}", self.base_url(), endpoint);

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.config.api_key)
            .json(&payload)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                // reqwest errors here are timeouts or connection problems
                return SendOutcome::TemporaryFailure {
                    error: format!("Request error: {}", e),
                };
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = format!("Gateway returned {}: {}", status, body);
            return if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                SendOutcome::TemporaryFailure { error }
            } else {
                SendOutcome::PermanentFailure { error }
            };
        }

        match response.json::<GatewayResponse>().await {
            Ok(GatewayResponse {
                key: Some(MessageKey { id: Some(id) }),
            }) if !id.is_empty() => SendOutcome::Sent { message_id: id },
            Ok(_) => SendOutcome::PermanentFailure {
                error: "Gateway response carried no message id".to_string(),
            },
            Err(e) => SendOutcome::PermanentFailure {
                error: format!("Unparseable gateway response: {}", e),
            },
        }
    }

    fn build_payload(
        &self,
        request: &SendRequest,
    ) -> Result<(String, serde_json::Value)> {
        let instance = &request.instance_name;
        let number = self.format_number(&request.phone);

        match request.kind {
            MessageKind::Text => {
                let text = request
                    .text
                    .as_deref()
                    .ok_or_else(|| Error::Validation("Text message without text".into()))?;
                Ok((
                    format!("/message/sendText/{}", instance),
                    json!({
                        "number": number,
                        "text": text,
                        "options": {
                            "delay": 1000,
                            "presence": "composing",
                            "linkPreview": false,
                        },
                    }),
                ))
            }
            MessageKind::Image | MessageKind::Video => {
                let media = request
                    .media
                    .as_ref()
                    .ok_or_else(|| Error::Validation("Media message without media".into()))?;
                Ok((
                    format!("/message/sendMedia/{}", instance),
                    json!({
                        "number": number,
                        "mediatype": request.kind.as_str(),
                        "media": media.base64,
                        "caption": media.caption.as_deref().unwrap_or(""),
                        "fileName": media.file_name.clone().unwrap_or_else(|| {
                            default_file_name(request.kind)
                        }),
                        "mimetype": media
                            .mimetype
                            .as_deref()
                            .unwrap_or(request.kind.default_mimetype()),
                        "delay": 1000,
                    }),
                ))
            }
            MessageKind::Audio => {
                let media = request
                    .media
                    .as_ref()
                    .ok_or_else(|| Error::Validation("Audio message without media".into()))?;
                Ok((
                    format!("/message/sendWhatsAppAudio/{}", instance),
                    json!({
                        "number": number,
                        "audio": media.base64,
                        "encoding": true,
                        "delay": 1000,
                    }),
                ))
            }
            MessageKind::Sticker => {
                let media = request
                    .media
                    .as_ref()
                    .ok_or_else(|| Error::Validation("Sticker message without media".into()))?;
                validate_sticker(media)?;
                Ok((
                    format!("/message/sendSticker/{}", instance),
                    json!({
                        "number": number,
                        "sticker": media.base64,
                        "delay": 1000,
                    }),
                ))
            }
            MessageKind::Reaction => {
                let message_id = request.reacted_message_id.as_deref().ok_or_else(|| {
                    Error::Validation("Reaction without a target message id".into())
                })?;
                let reaction = request
                    .reaction
                    .as_deref()
                    .ok_or_else(|| Error::Validation("Reaction without an emoji".into()))?;
                Ok((
                    format!("/message/sendReaction/{}", instance),
                    json!({
                        "key": {
                            "remoteJid": format!("{}@s.whatsapp.net", number),
                            "fromMe": true,
                            "id": message_id,
                        },
                        "reaction": reaction,
                    }),
                ))
            }
        }
    }
}

fn default_file_name(kind: MessageKind) -> String {
    match kind {
        MessageKind::Image => "image.jpg".to_string(),
        MessageKind::Video => "video.mp4".to_string(),
        MessageKind::Audio => "audio.mp3".to_string(),
        _ => "file.bin".to_string(),
    }
}

/// Stickers must be webp and under 500KB of decoded payload
fn validate_sticker(media: &MediaPayload) -> Result<()> {
    if media.base64.is_empty() {
        return Err(Error::Validation("Sticker without base64 content".into()));
    }
    if let Some(mime) = media.mimetype.as_deref() {
        if !mime.contains("webp") {
            return Err(Error::Validation(format!(
                "Sticker must be webp, got {}",
                mime
            )));
        }
    }
    use base64::Engine;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(&media.base64)
        .map_err(|_| Error::Validation("Sticker base64 is malformed".into()))?;
    if decoded.len() > 500 * 1024 {
        return Err(Error::Validation(format!(
            "Sticker too large: {}KB (max 500KB)",
            decoded.len() / 1024
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(url: String) -> GatewayConfig {
        GatewayConfig {
            url,
            api_key: "test-key".to_string(),
            timeout_secs: 5,
            max_attempts: 3,
            retry_delay_secs: 0,
            default_country_prefix: "55".to_string(),
        }
    }

    fn text_request(phone: &str) -> SendRequest {
        SendRequest {
            instance_name: "inst-a".to_string(),
            phone: phone.to_string(),
            kind: MessageKind::Text,
            text: Some("hello".to_string()),
            media: None,
            reacted_message_id: None,
            reaction: None,
        }
    }

    #[test]
    fn test_format_number_adds_prefix_once() {
        let client = GatewayClient::new(test_config("http://x".into())).unwrap();
        assert_eq!(client.format_number("11999999999"), "5511999999999");
        assert_eq!(client.format_number("5511999999999"), "5511999999999");
        assert_eq!(client.format_number("+55 11 99999-9999"), "5511999999999");
    }

    #[test]
    fn test_sticker_must_be_webp() {
        let media = MediaPayload {
            base64: "AAAA".to_string(),
            caption: None,
            file_name: None,
            mimetype: Some("image/png".to_string()),
        };
        assert!(validate_sticker(&media).is_err());
    }

    #[tokio::test]
    async fn test_send_text_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/message/sendText/inst-a"))
            .and(header("apikey", "test-key"))
            .and(body_partial_json(serde_json::json!({
                "number": "5511999999999",
                "text": "hello",
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "key": { "id": "MSG123", "remoteJid": "x", "fromMe": true },
                "status": "PENDING",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GatewayClient::new(test_config(server.uri())).unwrap();
        let id = client.send(&text_request("11999999999")).await.unwrap();
        assert_eq!(id, "MSG123");
    }

    #[tokio::test]
    async fn test_server_error_is_retried_then_succeeds() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/message/sendText/inst-a"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/message/sendText/inst-a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "key": { "id": "MSG456" },
            })))
            .mount(&server)
            .await;

        let client = GatewayClient::new(test_config(server.uri())).unwrap();
        let id = client.send(&text_request("11999999999")).await.unwrap();
        assert_eq!(id, "MSG456");
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/message/sendText/inst-a"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad number"))
            .expect(1)
            .mount(&server)
            .await;

        let client = GatewayClient::new(test_config(server.uri())).unwrap();
        let err = client.send(&text_request("11999999999")).await.unwrap_err();
        assert!(err.to_string().contains("400"));
    }

    #[tokio::test]
    async fn test_missing_message_id_is_permanent() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/message/sendText/inst-a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "PENDING",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GatewayClient::new(test_config(server.uri())).unwrap();
        let err = client.send(&text_request("11999999999")).await.unwrap_err();
        assert!(err.to_string().contains("no message id"));
    }

    #[tokio::test]
    async fn test_reaction_payload_shape() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/message/sendReaction/inst-a"))
            .and(body_partial_json(serde_json::json!({
                "key": {
                    "remoteJid": "5511999999999@s.whatsapp.net",
                    "fromMe": true,
                    "id": "ORIG1",
                },
                "reaction": "👍",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "key": { "id": "REACT1" },
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GatewayClient::new(test_config(server.uri())).unwrap();
        let request = SendRequest {
            instance_name: "inst-a".to_string(),
            phone: "11999999999".to_string(),
            kind: MessageKind::Reaction,
            text: None,
            media: None,
            reacted_message_id: Some("ORIG1".to_string()),
            reaction: Some("👍".to_string()),
        };
        let id = client.send(&request).await.unwrap();
        assert_eq!(id, "REACT1");
    }
}
