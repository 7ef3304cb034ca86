//! OpenAI-compatible chat-completions client.

use super::{Attachment, Conversation, Gateway, Role};
use crate::errors::GatewayError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// HTTP client for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiGateway {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl OpenAiGateway {
    /// Creates a new gateway client.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Connection`] if the HTTP client cannot be
    /// constructed.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        Self::with_timeout(base_url, api_key, model, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a new gateway client with an explicit request timeout.
    pub fn with_timeout(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| GatewayError::Connection(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client,
            timeout_secs,
        })
    }

    /// Returns the configured model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_messages(
        &self,
        conversation: &Conversation,
        prompt: &str,
        attachments: &[Attachment],
    ) -> Vec<WireMessage> {
        let mut messages: Vec<WireMessage> = conversation
            .turns()
            .iter()
            .map(|turn| WireMessage {
                role: role_str(turn.role),
                content: WireContent::Text(turn.content.clone()),
            })
            .collect();

        let content = if attachments.is_empty() {
            WireContent::Text(prompt.to_string())
        } else {
            let mut parts = vec![WirePart::Text {
                text: prompt.to_string(),
            }];
            for att in attachments {
                parts.push(WirePart::ImageUrl {
                    image_url: WireImageUrl {
                        url: att.to_data_uri(),
                    },
                });
            }
            WireContent::Parts(parts)
        };

        messages.push(WireMessage {
            role: "user",
            content,
        });
        messages
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: WireContent,
}

#[derive(Serialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Parts(Vec<WirePart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WirePart {
    Text { text: String },
    ImageUrl { image_url: WireImageUrl },
}

#[derive(Serialize)]
struct WireImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl Gateway for OpenAiGateway {
    async fn generate(
        &self,
        conversation: &Conversation,
        prompt: &str,
        attachments: &[Attachment],
    ) -> Result<String, GatewayError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = WireRequest {
            model: &self.model,
            messages: self.build_messages(conversation, prompt, attachments),
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(self.timeout_secs)
                } else if e.is_connect() {
                    GatewayError::Connection(self.base_url.clone())
                } else {
                    GatewayError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: WireResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::ResponseParsing(e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(GatewayError::EmptyResponse);
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> OpenAiGateway {
        OpenAiGateway::new("https://api.example.com/v1/", "sk-test", "test-model")
            .expect("client builds")
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let gw = gateway();
        assert_eq!(gw.base_url, "https://api.example.com/v1");
    }

    #[test]
    fn test_text_only_message_serializes_as_string() {
        let gw = gateway();
        let conv = Conversation::with_system("sys");
        let messages = gw.build_messages(&conv, "hello", &[]);

        assert_eq!(messages.len(), 2);
        let json = serde_json::to_value(&messages[1]).expect("serializes");
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "hello");
    }

    #[test]
    fn test_attachments_become_image_url_parts() {
        let gw = gateway();
        let conv = Conversation::new();
        let att = Attachment::from_bytes("image/jpeg", b"xyz");
        let messages = gw.build_messages(&conv, "describe", &[att]);

        let json = serde_json::to_value(&messages[0]).expect("serializes");
        let parts = json["content"].as_array().expect("parts array");
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "image_url");
        assert!(parts[1]["image_url"]["url"]
            .as_str()
            .expect("url")
            .starts_with("data:image/jpeg;base64,"));
    }
}
