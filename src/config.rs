use crate::sigv4::AwsCredentials;
use serde::{Deserialize, Serialize};

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_MODEL_ID: &str = "us.amazon.nova-pro-v1:0";

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_non_empty(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub fn resolve_region() -> String {
    env_non_empty("REGION")
        .or_else(|| env_non_empty("AWS_REGION"))
        .unwrap_or_else(|| DEFAULT_REGION.to_string())
}

/// Static access keys for SigV4. `ACCESS_KEY_ID` / `SECRET_ACCESS_KEY` take
/// precedence over the `AWS_`-prefixed names.
pub fn resolve_credentials() -> Option<AwsCredentials> {
    let access_key_id =
        env_non_empty("ACCESS_KEY_ID").or_else(|| env_non_empty("AWS_ACCESS_KEY_ID"))?;
    let secret_access_key =
        env_non_empty("SECRET_ACCESS_KEY").or_else(|| env_non_empty("AWS_SECRET_ACCESS_KEY"))?;
    Some(AwsCredentials {
        access_key_id,
        secret_access_key,
        session_token: env_non_empty("AWS_SESSION_TOKEN"),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfig {
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            max_tokens: 2048,
            temperature: 0.7,
            top_p: 0.9,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub region: String,
    pub model_id: String,
    /// Base URL of the Bedrock runtime, without a trailing path.
    pub endpoint: String,
    /// Bedrock API key. Used instead of SigV4 when set.
    pub bearer_token: Option<String>,
    pub credentials: Option<AwsCredentials>,
    pub request_timeout_ms: u64,
    pub stream_timeout_ms: u64,
    pub inference: InferenceConfig,
}

impl ModelConfig {
    pub fn from_env() -> Self {
        let region = resolve_region();
        let endpoint = env_non_empty("BEDROCK_ENDPOINT")
            .unwrap_or_else(|| format!("https://bedrock-runtime.{region}.amazonaws.com"));
        Self {
            model_id: env_non_empty("BEDROCK_MODEL_ID")
                .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string()),
            endpoint,
            bearer_token: env_non_empty("AWS_BEARER_TOKEN_BEDROCK"),
            credentials: resolve_credentials(),
            request_timeout_ms: env_u64("JOMKAYA_REQUEST_TIMEOUT_MS", 30_000),
            stream_timeout_ms: env_u64("JOMKAYA_STREAM_TIMEOUT_MS", 120_000),
            inference: InferenceConfig::default(),
            region,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TranslateConfig {
    pub region: String,
    pub endpoint: String,
    pub credentials: Option<AwsCredentials>,
    pub request_timeout_ms: u64,
}

impl TranslateConfig {
    pub fn from_env() -> Self {
        let region = resolve_region();
        let endpoint = env_non_empty("TRANSLATE_ENDPOINT")
            .unwrap_or_else(|| format!("https://translate.{region}.amazonaws.com"));
        Self {
            endpoint,
            credentials: resolve_credentials(),
            request_timeout_ms: env_u64("JOMKAYA_TRANSLATE_TIMEOUT_MS", 10_000),
            region,
        }
    }
}
