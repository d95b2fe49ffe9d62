use crate::error::ModelError;
use crate::probe::{first_block_text, str_any, str_at, u64_any};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedResponse {
    pub content: String,
    pub usage: Usage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

type Extractor = for<'a> fn(&'a Value) -> Option<&'a str>;

const CONTENT_EXTRACTORS: &[Extractor] = &[
    |v| first_block_text(v, &["output", "message", "content"]),
    |v| first_block_text(v, &["content"]),
    |v| str_at(v, &["content"]),
    |v| str_at(v, &["output", "text"]),
    |v| str_at(v, &["completion"]),
];

/// Extracts text, usage and stop reason from a complete invocation reply.
pub fn normalize_response(body: Option<&Value>) -> Result<NormalizedResponse, ModelError> {
    let body = body.ok_or(ModelError::EmptyBody)?;
    let content = CONTENT_EXTRACTORS
        .iter()
        .find_map(|extract| extract(body))
        .unwrap_or_default()
        .to_string();
    let usage = body
        .get("usage")
        .map(|u| Usage {
            input_tokens: u64_any(u, &["inputTokens", "input_tokens"]).unwrap_or(0),
            output_tokens: u64_any(u, &["outputTokens", "output_tokens"]).unwrap_or(0),
        })
        .unwrap_or_default();
    let stop_reason = str_any(body, &["stopReason", "stop_reason"]).map(str::to_string);
    Ok(NormalizedResponse {
        content,
        usage,
        stop_reason,
    })
}
