use crate::app::AppState;
use crate::error::{AppError, AppResult};
use crate::language::{Language, detect_language};
use crate::normalize::{Usage, normalize_response};
use crate::profiles::UserProfile;
use crate::prompt::{
    HistoryEntry, ModelRequest, SystemPromptContext, append_user_turn, format_history,
};
use crate::relay::StreamRelay;
use crate::translate::{self, SourceLanguage, TranslateError};
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response, Sse};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::convert::Infallible;
use std::time::Duration;

/// Returned in place of a model reply when a non-streaming invocation fails.
pub const FALLBACK_MESSAGE: &str = "\
I'm having trouble reaching the JomKaya AI service right now, but here are some general guidelines for Shariah-compliant investing in Malaysia:

**Shariah-Compliant Investment Options:**
- Securities on the Securities Commission Malaysia's list of Shariah-compliant securities
- Sukuk (Islamic bonds) issued by the government and approved corporations
- Islamic unit trusts and Islamic REITs
- Shariah-compliant ETFs listed on Bursa Malaysia

**Key Principles:**
- Avoid businesses involved in alcohol, gambling or conventional interest (riba)
- Prefer companies with low debt and low interest-based income
- Diversify across sectors and asset classes
- Invest only what matches your risk tolerance and time horizon

Please consult a licensed Islamic financial advisor for advice specific to your situation, and try again in a moment.";

const NO_OUTPUT: &str = "No output from model";

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.render()
}

fn parse_json(body: Result<Json<Value>, JsonRejection>) -> AppResult<Value> {
    body.map(|Json(value)| value).map_err(|rejection| {
        tracing::debug!(error = %rejection, "rejected request body");
        AppError::invalid_request("Invalid JSON body")
    })
}

/// Optional chat fields. An explicit `null` means the same as omitting the field.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatOptions {
    #[serde(default)]
    conversation_history: Option<Vec<HistoryEntry>>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    use_streaming: Option<bool>,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatReply {
    success: bool,
    message: String,
    usage: Usage,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_reason: Option<String>,
    translated: bool,
}

pub async fn chat(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> AppResult<Response> {
    let body = parse_json(body)?;
    if body.get("action").and_then(Value::as_str) == Some("health") {
        metrics::counter!("jomkaya_chat_requests_total", "mode" => "health").increment(1);
        return Ok(Json(json!({ "success": true, "status": "connected" })).into_response());
    }

    let message = body
        .get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| AppError::invalid_request("Message is required"))?
        .to_string();
    let options: ChatOptions = serde_json::from_value(body)
        .map_err(|err| AppError::invalid_request(format!("Invalid chat request: {err}")))?;

    let profile = match options.user_id.as_deref() {
        Some(user_id) => load_profile(&state, user_id).await,
        None => None,
    };
    let context = SystemPromptContext {
        profile,
        language: options.language.clone(),
    };
    let history = options.conversation_history.unwrap_or_default();
    let messages = append_user_turn(format_history(&history), message);
    let request = ModelRequest::new(messages, &context, state.runtime.model.inference);

    if options.use_streaming.unwrap_or_default() {
        metrics::counter!("jomkaya_chat_requests_total", "mode" => "stream").increment(1);
        let relay = StreamRelay::new(
            state.model.clone(),
            request,
            Duration::from_millis(state.runtime.model.stream_timeout_ms),
        );
        let stream = relay
            .spawn()
            .map(|frame| Ok::<_, Infallible>(frame.into_event()));
        return Ok(Sse::new(stream).into_response());
    }

    metrics::counter!("jomkaya_chat_requests_total", "mode" => "invoke").increment(1);
    let preferred = options.language.as_deref().and_then(Language::from_code);
    Ok(invoke_once(&state, &request, preferred).await)
}

async fn load_profile(state: &AppState, user_id: &str) -> Option<UserProfile> {
    match state.profiles.get_profile(user_id).await {
        Ok(profile) => profile,
        Err(err) => {
            tracing::warn!(
                user_id,
                error = %err,
                "profile lookup failed, continuing without profile"
            );
            None
        }
    }
}

async fn invoke_once(
    state: &AppState,
    request: &ModelRequest,
    preferred: Option<Language>,
) -> Response {
    let normalized = match state.model.invoke(&request.to_body()).await {
        Ok(body) => normalize_response(body.as_ref()),
        Err(err) => Err(err),
    };
    let normalized = match normalized {
        Ok(normalized) => normalized,
        Err(err) => {
            tracing::warn!(
                kind = err.kind(),
                error = %err,
                "model invocation failed, serving fallback"
            );
            metrics::counter!("jomkaya_chat_fallbacks_total", "kind" => err.kind()).increment(1);
            return Json(json!({
                "success": false,
                "message": FALLBACK_MESSAGE,
                "error": err.to_string(),
                "fallback": true,
            }))
            .into_response();
        }
    };

    let mut message = normalized.content;
    if message.is_empty() {
        message = NO_OUTPUT.to_string();
    }
    let mut translated = false;
    if let Some(target) = preferred {
        let detected = detect_language(&message);
        if detected.language != target {
            tracing::debug!(
                detected = detected.language.code(),
                target = target.code(),
                "translating model reply"
            );
            (message, translated) =
                translate::translate_or_keep(state.translator.as_ref(), message, target).await;
        }
    }

    let reply = ChatReply {
        success: true,
        message,
        usage: normalized.usage,
        stop_reason: normalized.stop_reason,
        translated,
    };
    Json(reply).into_response()
}

pub async fn chat_get() -> AppError {
    AppError::invalid_request("Please use POST")
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateBody {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    source_language: Option<String>,
    #[serde(default)]
    target_language: Option<String>,
}

pub async fn translate_post(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> AppResult<Response> {
    let body: TranslateBody = serde_json::from_value(parse_json(body)?)
        .map_err(|err| AppError::invalid_request(format!("Invalid translation request: {err}")))?;
    let text = body
        .text
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::invalid_request("Text is required"))?;
    let (Some(source), Some(target)) = (body.source_language, body.target_language) else {
        return Err(AppError::invalid_request(
            "Source and target languages are required",
        ));
    };
    let (Some(source), Some(target)) = (
        SourceLanguage::from_code(&source),
        Language::from_code(&target),
    ) else {
        return Err(AppError::invalid_request("Unsupported language code"));
    };

    match translate::translate(state.translator.as_ref(), &text, source, target).await {
        Ok(translation) => Ok(Json(json!({
            "success": true,
            "translatedText": translation.translated_text,
            "sourceLanguage": translation.source_language,
            "targetLanguage": translation.target_language,
        }))
        .into_response()),
        Err(TranslateError::EmptyText) => Err(AppError::invalid_request("Text is required")),
        Err(TranslateError::PermissionDenied(message)) => {
            tracing::warn!(error = %message, "translation not permitted, returning original text");
            metrics::counter!("jomkaya_translation_fallbacks_total", "source" => "api")
                .increment(1);
            Ok(Json(json!({
                "success": false,
                "translatedText": text,
                "sourceLanguage": source.code(),
                "targetLanguage": target,
                "fallback": true,
                "error": message,
            }))
            .into_response())
        }
        Err(TranslateError::Upstream(message)) => {
            tracing::error!(error = %message, "translation failed");
            Err(AppError::internal("translation_failed", message))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TranslateQuery {
    action: Option<String>,
    text: Option<String>,
}

pub async fn translate_get(Query(query): Query<TranslateQuery>) -> AppResult<Json<Value>> {
    match query.action.as_deref() {
        Some("languages") => {
            let mut body = translate::supported_languages();
            if let Some(obj) = body.as_object_mut() {
                obj.insert("success".to_string(), Value::Bool(true));
            }
            Ok(Json(body))
        }
        Some("detect") => {
            let text = query
                .text
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| {
                    AppError::invalid_request("Text parameter is required for detection")
                })?;
            let detection = detect_language(&text);
            Ok(Json(json!({
                "success": true,
                "language": detection.language,
                "confidence": detection.confidence,
            })))
        }
        _ => Err(AppError::invalid_request("Invalid action parameter")),
    }
}

pub async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Value>> {
    let profile = state
        .profiles
        .get_profile(&user_id)
        .await
        .map_err(|e| AppError::internal("profile_store_error", e))?;
    Ok(Json(json!({ "success": true, "profile": profile })))
}

pub async fn put_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    body: Result<Json<UserProfile>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let Json(profile) = body.map_err(|rejection| {
        AppError::invalid_request(format!("Invalid profile: {}", rejection.body_text()))
    })?;
    state
        .profiles
        .put_profile(&user_id, &profile)
        .await
        .map_err(|e| AppError::internal("profile_store_error", e))?;
    tracing::info!(user_id = %user_id, "investor profile saved");
    Ok(Json(json!({ "success": true, "profile": profile })))
}
