//! Translation between the source protocol and the canonical backend protocol.
//!
//! Both directions are total: content shapes the proxy does not recognise
//! degrade to a best-effort string instead of failing the request.

use super::types::{
    CanonicalMessage, CanonicalRequest, CanonicalResponse, ContentBlock, ContentValue,
    SourceRequest, SourceResponse, SourceUsage, TextContent,
};

/// Separator placed between text blocks when a block list is flattened.
pub const BLOCK_SEPARATOR: &str = "\n";

/// Normalizes a union-typed content value into one string.
///
/// Implementations must never fail. Swapping the extractor in `AppState`
/// changes how non-text blocks are treated without touching the pipeline.
pub trait ContentExtractor: Send + Sync {
    fn extract(&self, value: &ContentValue) -> String;
}

/// Default policy: keep text blocks in order, drop everything else.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlattenText;

impl ContentExtractor for FlattenText {
    fn extract(&self, value: &ContentValue) -> String {
        match value {
            ContentValue::Text(text) => text.clone(),
            ContentValue::Blocks(blocks) => join_texts(blocks.iter().filter_map(block_text)),
            ContentValue::Other(raw) => fallback_text(raw),
        }
    }
}

fn block_text(block: &ContentBlock) -> Option<&str> {
    block.text.as_deref()
}

fn join_texts<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts.collect::<Vec<_>>().join(BLOCK_SEPARATOR)
}

/// Textual rendering for shapes that are neither a string nor a clean block list.
///
/// Arrays that failed typed parsing (e.g. a bare string mixed in with blocks)
/// still contribute their object elements carrying a string `text`. `null`
/// renders as empty; every other value uses its JSON representation.
fn fallback_text(raw: &serde_json::Value) -> String {
    match raw {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => join_texts(
            items
                .iter()
                .filter_map(|item| item.get("text").and_then(|t| t.as_str())),
        ),
        other => other.to_string(),
    }
}

/// Build the outbound request from an inbound one.
///
/// A non-empty system prompt becomes a leading `system` message. Roles pass
/// through untouched.
pub fn to_canonical(req: &SourceRequest, extractor: &dyn ContentExtractor) -> CanonicalRequest {
    let mut messages = Vec::with_capacity(req.messages.len() + 1);

    if let Some(system) = &req.system {
        let content = extractor.extract(system);
        if !content.is_empty() {
            messages.push(CanonicalMessage {
                role: "system".to_string(),
                content,
            });
        }
    }

    messages.extend(req.messages.iter().map(|msg| CanonicalMessage {
        role: msg.role.clone(),
        content: extractor.extract(&msg.content),
    }));

    CanonicalRequest {
        model: req.model.clone(),
        messages,
        max_tokens: req.max_tokens,
        temperature: req.temperature,
        top_p: req.top_p,
    }
}

/// Map a backend finish reason onto the source protocol's stop reason.
///
/// Only `"stop"` means a natural end of turn; every other reason (length,
/// content filter, tool calls, missing) is reported as `"max_tokens"`.
pub fn stop_reason(finish_reason: Option<&str>) -> &'static str {
    match finish_reason {
        Some("stop") => "end_turn",
        _ => "max_tokens",
    }
}

/// Reshape a backend response into the source protocol.
pub fn to_source(resp: &CanonicalResponse) -> SourceResponse {
    let (content, stop) = match resp.choices.first() {
        Some(choice) => (
            vec![TextContent {
                kind: "text".to_string(),
                text: choice.message.content.clone().unwrap_or_default(),
            }],
            stop_reason(choice.finish_reason.as_deref()).to_string(),
        ),
        None => (Vec::new(), String::new()),
    };

    SourceResponse {
        id: format!("msg_{}", resp.id),
        kind: "message".to_string(),
        role: "assistant".to_string(),
        content,
        model: resp.model.clone(),
        stop_reason: stop,
        stop_sequence: None,
        usage: SourceUsage {
            input_tokens: resp.usage.prompt_tokens,
            output_tokens: resp.usage.completion_tokens,
            cache_creation_input_tokens: 0,
            cache_read_input_tokens: 0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::types::{Choice, ChoiceMessage, SourceMessage, Usage};

    fn extract(value: &ContentValue) -> String {
        FlattenText.extract(value)
    }

    fn request_with_system(system: Option<ContentValue>) -> SourceRequest {
        SourceRequest {
            model: "m".to_string(),
            messages: vec![SourceMessage {
                role: "user".to_string(),
                content: ContentValue::Text("hi".to_string()),
            }],
            max_tokens: Some(256),
            temperature: Some(0.5),
            top_p: None,
            system,
        }
    }

    fn response_with(finish_reason: Option<&str>) -> CanonicalResponse {
        CanonicalResponse {
            id: "abc".to_string(),
            model: "m".to_string(),
            choices: vec![Choice {
                message: ChoiceMessage {
                    content: Some("hello".to_string()),
                },
                finish_reason: finish_reason.map(str::to_string),
            }],
            usage: Usage {
                prompt_tokens: 3,
                completion_tokens: 1,
            },
            error: None,
        }
    }

    #[test]
    fn test_extract_string_is_identity() {
        for s in ["", "plain", "multi\nline", "  padded  "] {
            assert_eq!(extract(&ContentValue::Text(s.to_string())), s);
        }
    }

    #[test]
    fn test_extract_blocks_skips_non_text() {
        let mut image = ContentBlock::text("ignored");
        image.kind = "image".to_string();
        image.text = None;
        let value = ContentValue::Blocks(vec![
            ContentBlock::text("a"),
            image,
            ContentBlock::text("b"),
        ]);
        assert_eq!(extract(&value), "a\nb");
    }

    #[test]
    fn test_extract_empty_blocks() {
        assert_eq!(extract(&ContentValue::Blocks(vec![])), "");
    }

    #[test]
    fn test_extract_fallback_shapes() {
        assert_eq!(extract(&ContentValue::Other(serde_json::json!(42))), "42");
        assert_eq!(extract(&ContentValue::Other(serde_json::json!(true))), "true");
        assert_eq!(extract(&ContentValue::Other(serde_json::Value::Null)), "");
        assert_eq!(
            extract(&ContentValue::Other(serde_json::json!({"k": "v"}))),
            r#"{"k":"v"}"#
        );
    }

    #[test]
    fn test_extract_mixed_array_keeps_text_objects() {
        let value = ContentValue::Other(serde_json::json!(["x", {"text": "y"}, {"text": "z"}]));
        assert_eq!(extract(&value), "y\nz");
    }

    #[test]
    fn test_to_canonical_prepends_system() {
        let req = request_with_system(Some(ContentValue::Text("S".to_string())));
        let out = to_canonical(&req, &FlattenText);
        assert_eq!(out.messages.len(), 2);
        assert_eq!(
            out.messages[0],
            CanonicalMessage {
                role: "system".to_string(),
                content: "S".to_string()
            }
        );
        assert_eq!(out.messages[1].role, "user");
    }

    #[test]
    fn test_to_canonical_without_system() {
        let out = to_canonical(&request_with_system(None), &FlattenText);
        assert_eq!(out.messages.len(), 1);
        assert_eq!(out.messages[0].content, "hi");
    }

    #[test]
    fn test_to_canonical_skips_empty_system() {
        let req = request_with_system(Some(ContentValue::Blocks(vec![])));
        let out = to_canonical(&req, &FlattenText);
        assert_eq!(out.messages.len(), 1);
    }

    #[test]
    fn test_to_canonical_system_blocks() {
        let req = request_with_system(Some(ContentValue::Blocks(vec![
            ContentBlock::text("one"),
            ContentBlock::text("two"),
        ])));
        let out = to_canonical(&req, &FlattenText);
        assert_eq!(out.messages[0].content, "one\ntwo");
    }

    #[test]
    fn test_to_canonical_copies_sampling_and_roles() {
        let mut req = request_with_system(None);
        req.messages.push(SourceMessage {
            role: "tool".to_string(),
            content: ContentValue::Text("result".to_string()),
        });
        let out = to_canonical(&req, &FlattenText);
        assert_eq!(out.model, "m");
        assert_eq!(out.max_tokens, Some(256));
        assert_eq!(out.temperature, Some(0.5));
        assert_eq!(out.top_p, None);
        assert_eq!(out.messages[1].role, "tool");
    }

    #[test]
    fn test_to_source_stop_maps_to_end_turn() {
        let out = to_source(&response_with(Some("stop")));
        assert_eq!(out.id, "msg_abc");
        assert_eq!(out.stop_reason, "end_turn");
        assert_eq!(out.content.len(), 1);
        assert_eq!(out.content[0].kind, "text");
        assert_eq!(out.content[0].text, "hello");
        assert_eq!(out.usage.input_tokens, 3);
        assert_eq!(out.usage.output_tokens, 1);
        assert_eq!(out.usage.cache_creation_input_tokens, 0);
        assert_eq!(out.usage.cache_read_input_tokens, 0);
        assert!(out.stop_sequence.is_none());
    }

    #[test]
    fn test_to_source_other_reasons_collapse_to_max_tokens() {
        for reason in [Some("length"), Some("content_filter"), Some("tool_calls"), None] {
            let out = to_source(&response_with(reason));
            assert_eq!(out.stop_reason, "max_tokens", "reason {:?}", reason);
        }
    }

    #[test]
    fn test_to_source_no_choices() {
        let mut resp = response_with(Some("stop"));
        resp.choices.clear();
        let out = to_source(&resp);
        assert!(out.content.is_empty());
        assert_eq!(out.stop_reason, "");
        assert_eq!(out.kind, "message");
        assert_eq!(out.role, "assistant");
    }

    #[test]
    fn test_custom_extractor_is_used() {
        struct Upper;
        impl ContentExtractor for Upper {
            fn extract(&self, value: &ContentValue) -> String {
                FlattenText.extract(value).to_uppercase()
            }
        }
        let out = to_canonical(&request_with_system(None), &Upper);
        assert_eq!(out.messages[0].content, "HI");
    }
}
