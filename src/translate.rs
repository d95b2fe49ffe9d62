//! English/Malay translation through AWS Translate.

use crate::bedrock::describe_error_body;
use crate::config::TranslateConfig;
use crate::language::Language;
use crate::sigv4::{self, SigningScope};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

const TRANSLATE_TARGET: &str = "AWSShineFrontendService_20170701.TranslateText";
const AMZ_JSON: &str = "application/x-amz-json-1.1";
const SIGNING_SERVICE: &str = "translate";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslateError {
    #[error("text is required for translation")]
    EmptyText,
    /// The service rejected our credentials. Callers fall back to the
    /// untranslated text.
    #[error("{0}")]
    PermissionDenied(String),
    #[error("{0}")]
    Upstream(String),
}

/// Source side of a translation; `Auto` lets the vendor detect it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLanguage {
    Auto,
    Known(Language),
}

impl SourceLanguage {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "auto" => Some(SourceLanguage::Auto),
            other => Language::from_code(other).map(SourceLanguage::Known),
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            SourceLanguage::Auto => "auto",
            SourceLanguage::Known(language) => language.code(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Translation {
    pub translated_text: String,
    pub source_language: String,
    pub target_language: Language,
}

#[async_trait]
pub trait TranslationClient: Send + Sync {
    async fn translate_text(
        &self,
        text: &str,
        source: SourceLanguage,
        target: Language,
    ) -> Result<Translation, TranslateError>;
}

#[derive(Clone)]
pub struct AwsTranslateClient {
    http: reqwest::Client,
    config: TranslateConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TranslateTextResponse {
    #[serde(default)]
    translated_text: String,
    #[serde(default)]
    source_language_code: Option<String>,
}

impl AwsTranslateClient {
    pub fn new(http: reqwest::Client, config: TranslateConfig) -> Self {
        Self { http, config }
    }
}

fn is_permission_error(message: &str) -> bool {
    message.contains("AccessDenied") || message.contains("UnrecognizedClient")
}

#[async_trait]
impl TranslationClient for AwsTranslateClient {
    async fn translate_text(
        &self,
        text: &str,
        source: SourceLanguage,
        target: Language,
    ) -> Result<Translation, TranslateError> {
        let payload = json!({
            "Text": text,
            "SourceLanguageCode": source.code(),
            "TargetLanguageCode": target.code(),
        });
        let body =
            serde_json::to_vec(&payload).map_err(|err| TranslateError::Upstream(err.to_string()))?;
        let url = format!("{}/", self.config.endpoint.trim_end_matches('/'));
        let mut req = self
            .http
            .post(&url)
            .header("X-Amz-Target", TRANSLATE_TARGET)
            .header(reqwest::header::CONTENT_TYPE, AMZ_JSON)
            .timeout(Duration::from_millis(self.config.request_timeout_ms));
        if let Some(credentials) = self.config.credentials.as_ref() {
            let scope = SigningScope {
                region: &self.config.region,
                service: SIGNING_SERVICE,
            };
            let signature = sigv4::sign_post(
                credentials,
                scope,
                &url,
                &[
                    ("x-amz-target", TRANSLATE_TARGET),
                    (reqwest::header::CONTENT_TYPE.as_str(), AMZ_JSON),
                ],
                &body,
            )
            .map_err(|err| TranslateError::Upstream(err.to_string()))?;
            req = signature.apply(req);
        }
        let resp = req.body(body).send().await.map_err(|err| {
            let message = err.to_string();
            if is_permission_error(&message) {
                TranslateError::PermissionDenied(message)
            } else {
                TranslateError::Upstream(message)
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let error_type = resp
                .headers()
                .get("x-amzn-errortype")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let text = resp.text().await.unwrap_or_default();
            let message = describe_error_body(status, error_type.as_deref(), &text);
            return Err(
                if status == reqwest::StatusCode::UNAUTHORIZED
                    || status == reqwest::StatusCode::FORBIDDEN
                    || is_permission_error(&message)
                {
                    TranslateError::PermissionDenied(message)
                } else {
                    TranslateError::Upstream(message)
                },
            );
        }

        let parsed: TranslateTextResponse = resp
            .json()
            .await
            .map_err(|err| TranslateError::Upstream(err.to_string()))?;
        Ok(Translation {
            translated_text: parsed.translated_text,
            source_language: parsed
                .source_language_code
                .unwrap_or_else(|| source.code().to_string()),
            target_language: target,
        })
    }
}

/// Translates `text`, short-circuiting blank input and identical explicit
/// source and target languages without touching the network.
pub async fn translate(
    client: &dyn TranslationClient,
    text: &str,
    source: SourceLanguage,
    target: Language,
) -> Result<Translation, TranslateError> {
    if text.trim().is_empty() {
        return Err(TranslateError::EmptyText);
    }
    if source == SourceLanguage::Known(target) {
        return Ok(Translation {
            translated_text: text.to_string(),
            source_language: target.code().to_string(),
            target_language: target,
        });
    }
    client.translate_text(text, source, target).await
}

/// Best-effort translation: any failure keeps the original text. The flag
/// reports whether a translation was actually applied.
pub async fn translate_or_keep(
    client: &dyn TranslationClient,
    text: String,
    target: Language,
) -> (String, bool) {
    match translate(client, &text, SourceLanguage::Auto, target).await {
        Ok(translation) => (translation.translated_text, true),
        Err(err) => {
            tracing::warn!(
                error = %err,
                target = target.code(),
                "reply translation failed, keeping original"
            );
            metrics::counter!("jomkaya_translation_fallbacks_total", "source" => "chat")
                .increment(1);
            (text, false)
        }
    }
}

pub fn supported_languages() -> Value {
    json!({
        "languages": [
            { "code": "en", "name": "English", "nativeName": "English" },
            { "code": "ms", "name": "Malay", "nativeName": "Bahasa Melayu" },
        ],
        "pairs": [
            { "from": "en", "to": "ms" },
            { "from": "ms", "to": "en" },
            { "from": "auto", "to": "en" },
            { "from": "auto", "to": "ms" },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingClient {
        calls: AtomicUsize,
        result: Result<Translation, TranslateError>,
    }

    #[async_trait]
    impl TranslationClient for CountingClient {
        async fn translate_text(
            &self,
            _text: &str,
            _source: SourceLanguage,
            _target: Language,
        ) -> Result<Translation, TranslateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn client(result: Result<Translation, TranslateError>) -> CountingClient {
        CountingClient {
            calls: AtomicUsize::new(0),
            result,
        }
    }

    #[tokio::test]
    async fn same_language_skips_the_vendor() {
        let c = client(Err(TranslateError::Upstream("unreachable".to_string())));
        let out = translate(&c, "Salam", SourceLanguage::Known(Language::Ms), Language::Ms)
            .await
            .unwrap();
        assert_eq!(out.translated_text, "Salam");
        assert_eq!(c.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn blank_text_is_rejected_before_the_vendor() {
        let c = client(Err(TranslateError::Upstream("unreachable".to_string())));
        let err = translate(&c, "  ", SourceLanguage::Auto, Language::En)
            .await
            .unwrap_err();
        assert_eq!(err, TranslateError::EmptyText);
        assert_eq!(c.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_reply_translation_keeps_original() {
        let c = client(Err(TranslateError::PermissionDenied(
            "AccessDeniedException".to_string(),
        )));
        let (text, translated) = translate_or_keep(&c, "hello".to_string(), Language::Ms).await;
        assert_eq!(text, "hello");
        assert!(!translated);
        assert_eq!(c.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn successful_reply_translation_is_flagged() {
        let c = client(Ok(Translation {
            translated_text: "helo".to_string(),
            source_language: "en".to_string(),
            target_language: Language::Ms,
        }));
        let (text, translated) = translate_or_keep(&c, "hello".to_string(), Language::Ms).await;
        assert_eq!(text, "helo");
        assert!(translated);
    }

    #[test]
    fn source_codes_accept_auto() {
        assert_eq!(SourceLanguage::from_code("auto"), Some(SourceLanguage::Auto));
        assert_eq!(
            SourceLanguage::from_code("en"),
            Some(SourceLanguage::Known(Language::En))
        );
        assert_eq!(SourceLanguage::from_code("fr"), None);
    }

    #[test]
    fn permission_markers_are_recognized() {
        assert!(is_permission_error("AccessDeniedException: nope"));
        assert!(is_permission_error("UnrecognizedClientException: bad token"));
        assert!(!is_permission_error("ThrottlingException: slow"));
    }
}
