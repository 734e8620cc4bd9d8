//! Wire types for both sides of the translation.
//!
//! Inbound ("source") records use block-structured content; outbound
//! ("canonical") records are OpenAI-compatible with flat string content.

use serde::{Deserialize, Deserializer, Serialize};

/// Inbound messages request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceRequest {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub messages: Vec<SourceMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<ContentValue>,
}

/// A single inbound message. `content` arrives either as a string or a block list.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceMessage {
    pub role: String,
    pub content: ContentValue,
}

/// Union-typed content field.
///
/// Variant order matters for untagged deserialization: a JSON string becomes
/// `Text`, an array of objects becomes `Blocks`, anything else lands in `Other`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ContentValue {
    Text(String),
    Blocks(Vec<ContentBlock>),
    Other(serde_json::Value),
}

/// One element of a structured content list.
///
/// Only `text` matters for flattening; every other field of the block
/// (image sources, tool inputs, ...) is kept in `extra` and ignored.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ContentBlock {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(
        default,
        deserialize_with = "text_if_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ContentBlock {
    /// Build a plain text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: Some(text.into()),
            extra: serde_json::Map::new(),
        }
    }
}

/// Keep `text` only when it is a JSON string; a block with a non-string
/// `text` is treated like any other non-text block.
fn text_if_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Some(s),
        _ => None,
    })
}

/// Flattened outbound message.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CanonicalMessage {
    pub role: String,
    pub content: String,
}

/// Outbound chat completion request (OpenAI-compatible).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CanonicalRequest {
    pub model: String,
    pub messages: Vec<CanonicalMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
}

/// Backend chat completion response.
///
/// Every field defaults so that sparse backends still parse; `error` is
/// opaque because vendors disagree on its shape.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CanonicalResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
}

/// A completion choice.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Choice {
    #[serde(default)]
    pub message: ChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Message payload of a choice.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// Token usage statistics reported by the backend.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

/// Outbound messages response in the source protocol.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SourceResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub role: String,
    pub content: Vec<TextContent>,
    pub model: String,
    pub stop_reason: String,
    pub stop_sequence: Option<String>,
    pub usage: SourceUsage,
}

/// `{type: "text", text}` content item.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TextContent {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

/// Token usage in the source protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct SourceUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_input_tokens: u64,
    pub cache_read_input_tokens: u64,
}
