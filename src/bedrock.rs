use crate::config::ModelConfig;
use crate::error::{ModelError, classify_upstream_error};
use crate::eventstream::{DecodeError, EventStreamDecoder, Frame};
use crate::sigv4::{self, SigningScope, UNRESERVED};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use percent_encoding::utf8_percent_encode;
use serde_json::Value;

const SIGNING_SERVICE: &str = "bedrock";
const JSON: &str = "application/json";

/// One transport-level event from the streaming invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VendorEvent {
    /// A `chunk` event. `bytes` is the base64-decoded payload when present.
    Chunk { bytes: Option<Bytes> },
    Other { event_type: String },
}

pub type VendorStream = BoxStream<'static, Result<VendorEvent, ModelError>>;

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Single-shot invocation. `Ok(None)` means the vendor replied without a body.
    async fn invoke(&self, body: &Value) -> Result<Option<Value>, ModelError>;

    async fn invoke_stream(&self, body: &Value) -> Result<VendorStream, ModelError>;
}

#[derive(Clone)]
pub struct BedrockClient {
    http: reqwest::Client,
    config: ModelConfig,
}

impl BedrockClient {
    pub fn new(http: reqwest::Client, config: ModelConfig) -> Self {
        Self { http, config }
    }

    fn url(&self, action: &str) -> String {
        let model = utf8_percent_encode(&self.config.model_id, UNRESERVED);
        format!(
            "{}/model/{}/{}",
            self.config.endpoint.trim_end_matches('/'),
            model,
            action
        )
    }

    fn classify(&self, raw: &str) -> ModelError {
        classify_upstream_error(raw, &self.config.model_id, &self.config.region)
    }

    async fn send(
        &self,
        action: &str,
        accept: &str,
        body: &Value,
        timeout_ms: Option<u64>,
    ) -> Result<reqwest::Response, ModelError> {
        let url = self.url(action);
        let payload = serde_json::to_vec(body).map_err(|err| ModelError::Decode(err.to_string()))?;
        let mut req = self
            .http
            .post(&url)
            .header(reqwest::header::ACCEPT, accept)
            .header(reqwest::header::CONTENT_TYPE, JSON);
        if let Some(timeout_ms) = timeout_ms {
            req = req.timeout(std::time::Duration::from_millis(timeout_ms));
        }
        req = self.authorize(req, &url, &payload)?;
        let resp = req.body(payload).send().await.map_err(|err| {
            if err.is_timeout() {
                ModelError::Timeout(timeout_ms.unwrap_or_default())
            } else {
                self.classify(&err.to_string())
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
            return Err(self.classify(&describe_error_body(status, error_type.as_deref(), &text)));
        }
        Ok(resp)
    }

    /// Bearer token when configured, otherwise SigV4 when keys are present.
    fn authorize(
        &self,
        req: reqwest::RequestBuilder,
        url: &str,
        payload: &[u8],
    ) -> Result<reqwest::RequestBuilder, ModelError> {
        if let Some(token) = self.config.bearer_token.as_deref() {
            return Ok(req.bearer_auth(token));
        }
        let Some(credentials) = self.config.credentials.as_ref() else {
            return Ok(req);
        };
        let scope = SigningScope {
            region: &self.config.region,
            service: SIGNING_SERVICE,
        };
        let signature = sigv4::sign_post(
            credentials,
            scope,
            url,
            &[(reqwest::header::CONTENT_TYPE.as_str(), JSON)],
            payload,
        )
        .map_err(|err| ModelError::Config(err.to_string()))?;
        Ok(signature.apply(req))
    }

    fn frame_to_event(&self, frame: Frame) -> Result<VendorEvent, ModelError> {
        match frame.message_type() {
            "event" => {}
            "exception" => {
                let kind = frame.header_str(":exception-type").unwrap_or("exception");
                return Err(self.classify(&format!("{kind}: {}", payload_message(&frame.payload))));
            }
            other => {
                let code = frame.header_str(":error-code").unwrap_or(other);
                let message = frame
                    .header_str(":error-message")
                    .map(str::to_string)
                    .unwrap_or_else(|| payload_message(&frame.payload));
                return Err(self.classify(&format!("{code}: {message}")));
            }
        }
        let event_type = frame.header_str(":event-type").unwrap_or("chunk");
        if event_type != "chunk" {
            return Ok(VendorEvent::Other {
                event_type: event_type.to_string(),
            });
        }
        let envelope: Value = serde_json::from_slice(&frame.payload)
            .map_err(|err| DecodeError::Payload(err.to_string()))?;
        let bytes = match envelope.get("bytes").and_then(Value::as_str) {
            Some(encoded) => Some(Bytes::from(
                BASE64
                    .decode(encoded)
                    .map_err(|err| DecodeError::Payload(err.to_string()))?,
            )),
            None => None,
        };
        Ok(VendorEvent::Chunk { bytes })
    }
}

pub(crate) fn describe_error_body(status: reqwest::StatusCode, error_type: Option<&str>, text: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(text).ok();
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("message").or_else(|| v.get("Message")))
        .and_then(Value::as_str)
        .unwrap_or(text);
    let kind = error_type
        .map(|t| t.split(':').next().unwrap_or(t).to_string())
        .or_else(|| {
            parsed
                .as_ref()
                .and_then(|v| v.get("__type"))
                .and_then(Value::as_str)
                .map(|t| t.rsplit('#').next().unwrap_or(t).to_string())
        });
    match kind {
        Some(kind) => format!("{kind}: {message}"),
        None => format!("upstream status {status}: {message}"),
    }
}

fn payload_message(payload: &[u8]) -> String {
    serde_json::from_slice::<Value>(payload)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| String::from_utf8_lossy(payload).into_owned())
}

#[async_trait]
impl ModelClient for BedrockClient {
    async fn invoke(&self, body: &Value) -> Result<Option<Value>, ModelError> {
        let resp = self
            .send(
                "invoke",
                "application/json",
                body,
                Some(self.config.request_timeout_ms),
            )
            .await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|err| ModelError::Upstream(err.to_string()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|err| ModelError::Decode(err.to_string()))
    }

    async fn invoke_stream(&self, body: &Value) -> Result<VendorStream, ModelError> {
        let resp = self
            .send(
                "invoke-with-response-stream",
                "application/vnd.amazon.eventstream",
                body,
                None,
            )
            .await?;
        let client = self.clone();
        let state = FrameReader {
            body: resp.bytes_stream().boxed(),
            decoder: EventStreamDecoder::new(),
            finished: false,
        };
        let events = futures_util::stream::unfold(state, move |mut reader| {
            let client = client.clone();
            async move {
                let item = reader.next_frame().await?;
                let item = item.and_then(|frame| client.frame_to_event(frame));
                if item.is_err() {
                    reader.finished = true;
                }
                Some((item, reader))
            }
        });
        Ok(events.boxed())
    }
}

struct FrameReader {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: EventStreamDecoder,
    finished: bool,
}

impl FrameReader {
    /// Pulls body bytes until a whole frame is buffered. `None` ends the stream.
    async fn next_frame(&mut self) -> Option<Result<Frame, ModelError>> {
        if self.finished {
            return None;
        }
        loop {
            match self.decoder.next_frame() {
                Ok(Some(frame)) => return Some(Ok(frame)),
                Ok(None) => {}
                Err(err) => {
                    self.finished = true;
                    return Some(Err(err.into()));
                }
            }
            match self.body.next().await {
                Some(Ok(chunk)) => self.decoder.push(&chunk),
                Some(Err(err)) => {
                    self.finished = true;
                    return Some(Err(ModelError::Upstream(err.to_string())));
                }
                None => {
                    self.finished = true;
                    let buffered = self.decoder.buffered();
                    if buffered > 0 {
                        return Some(Err(DecodeError::Truncated(buffered).into()));
                    }
                    return None;
                }
            }
        }
    }
}
