//! Turns one raw vendor stream event into at most one [`StreamEvent`].
//!
//! The Bedrock streaming wire format differs between model families and API
//! revisions, so text is located by walking an ordered table of extractors and
//! taking the first hit.

use crate::bedrock::VendorEvent;
use crate::probe::{first_block_text, str_at};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    TextDelta { text: String },
    Completion { stop_reason: Option<String> },
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("chunk bytes are not valid utf-8")]
pub struct ChunkDecodeError;

type Extractor = for<'a> fn(&'a Value) -> Option<&'a str>;

/// Text extractors in priority order.
pub const TEXT_EXTRACTORS: &[(&str, Extractor)] = &[
    ("contentBlockDelta.delta.text", content_block_delta_camel),
    ("type=content_block_delta", content_block_delta_typed),
    ("delta.text", delta_text),
    ("output.message.content[0].text", output_message_text),
    ("content[0].text", content_block_text),
    ("content", content_string),
    ("completion", completion),
    ("text", bare_text),
];

fn content_block_delta_camel(v: &Value) -> Option<&str> {
    str_at(v, &["contentBlockDelta", "delta", "text"])
}

fn content_block_delta_typed(v: &Value) -> Option<&str> {
    if v.get("type").and_then(Value::as_str) != Some("content_block_delta") {
        return None;
    }
    Some(str_at(v, &["delta", "text"]).unwrap_or(""))
}

fn delta_text(v: &Value) -> Option<&str> {
    str_at(v, &["delta", "text"])
}

fn output_message_text(v: &Value) -> Option<&str> {
    first_block_text(v, &["output", "message", "content"])
}

fn content_block_text(v: &Value) -> Option<&str> {
    first_block_text(v, &["content"])
}

fn content_string(v: &Value) -> Option<&str> {
    str_at(v, &["content"])
}

fn completion(v: &Value) -> Option<&str> {
    str_at(v, &["completion"])
}

fn bare_text(v: &Value) -> Option<&str> {
    str_at(v, &["text"])
}

fn completion_marker(v: &Value) -> Option<StreamEvent> {
    if let Some(stop) = v.get("messageStop") {
        let stop_reason = str_at(stop, &["stopReason"]).map(str::to_string);
        return Some(StreamEvent::Completion { stop_reason });
    }
    if v.get("type").and_then(Value::as_str) == Some("message_stop")
        || v.get("amazon-bedrock-invocationMetrics").is_some()
    {
        return Some(StreamEvent::Completion { stop_reason: None });
    }
    None
}

/// Applies the extractor table to one decoded chunk body.
pub fn classify_chunk(body: &Value) -> StreamEvent {
    for (rule, extract) in TEXT_EXTRACTORS {
        if let Some(text) = extract(body) {
            tracing::debug!(rule, "text extractor matched");
            return StreamEvent::TextDelta {
                text: text.to_string(),
            };
        }
    }
    completion_marker(body).unwrap_or(StreamEvent::Unrecognized)
}

/// Decodes one vendor event. Events without a byte payload produce nothing.
///
/// Bytes that are UTF-8 but not JSON are forwarded verbatim as a text delta;
/// bytes that are not UTF-8 are a decode failure.
pub fn decode_event(event: &VendorEvent) -> Result<Option<StreamEvent>, ChunkDecodeError> {
    let VendorEvent::Chunk { bytes: Some(bytes) } = event else {
        return Ok(None);
    };
    let text = std::str::from_utf8(bytes).map_err(|_| ChunkDecodeError)?;
    match serde_json::from_str::<Value>(text) {
        Ok(body) => Ok(Some(classify_chunk(&body))),
        Err(_) => Ok(Some(StreamEvent::TextDelta {
            text: text.to_string(),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::json;

    fn text_of(body: Value) -> Option<String> {
        match classify_chunk(&body) {
            StreamEvent::TextDelta { text } => Some(text),
            _ => None,
        }
    }

    #[test]
    fn every_known_shape_yields_its_text() {
        let cases = [
            json!({"contentBlockDelta": {"delta": {"text": "r1"}, "contentBlockIndex": 0}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "r2"}}),
            json!({"delta": {"text": "r3"}}),
            json!({"output": {"message": {"content": [{"text": "r4"}]}}}),
            json!({"content": [{"type": "text", "text": "r5"}]}),
            json!({"content": "r6"}),
            json!({"completion": "r7", "stop_reason": null}),
            json!({"text": "r8"}),
        ];
        for (idx, body) in cases.into_iter().enumerate() {
            assert_eq!(text_of(body), Some(format!("r{}", idx + 1)));
        }
    }

    #[test]
    fn earlier_rule_wins_when_shapes_overlap() {
        let body = json!({
            "contentBlockDelta": {"delta": {"text": "first"}},
            "delta": {"text": "third"},
            "content": "sixth",
            "completion": "seventh",
            "text": "eighth"
        });
        assert_eq!(text_of(body), Some("first".to_string()));

        let body = json!({"content": [{"text": "fifth"}], "completion": "seventh"});
        assert_eq!(text_of(body), Some("fifth".to_string()));

        let body = json!({"completion": "seventh", "text": "eighth"});
        assert_eq!(text_of(body), Some("seventh".to_string()));
    }

    #[test]
    fn typed_content_block_delta_without_text_is_empty_match() {
        let body = json!({"type": "content_block_delta", "delta": {}, "completion": "late"});
        assert_eq!(text_of(body), Some(String::new()));
    }

    #[test]
    fn unknown_shapes_are_unrecognized() {
        assert_eq!(
            classify_chunk(&json!({"messageStart": {"role": "assistant"}})),
            StreamEvent::Unrecognized
        );
        assert_eq!(
            classify_chunk(&json!({"content": 42})),
            StreamEvent::Unrecognized
        );
    }

    #[test]
    fn stop_markers_are_completions() {
        assert_eq!(
            classify_chunk(&json!({"messageStop": {"stopReason": "end_turn"}})),
            StreamEvent::Completion {
                stop_reason: Some("end_turn".to_string())
            }
        );
        assert_eq!(
            classify_chunk(&json!({"type": "message_stop"})),
            StreamEvent::Completion { stop_reason: None }
        );
    }

    #[test]
    fn events_without_bytes_produce_nothing() {
        assert_eq!(decode_event(&VendorEvent::Chunk { bytes: None }), Ok(None));
        assert_eq!(
            decode_event(&VendorEvent::Other {
                event_type: "metadata".to_string()
            }),
            Ok(None)
        );
    }

    #[test]
    fn non_json_text_passes_through_and_invalid_utf8_fails() {
        let raw = VendorEvent::Chunk {
            bytes: Some(Bytes::from_static(b"plain words")),
        };
        assert_eq!(
            decode_event(&raw),
            Ok(Some(StreamEvent::TextDelta {
                text: "plain words".to_string()
            }))
        );

        let bad = VendorEvent::Chunk {
            bytes: Some(Bytes::from_static(&[0xff, 0xfe])),
        };
        assert_eq!(decode_event(&bad), Err(ChunkDecodeError));
    }
}
