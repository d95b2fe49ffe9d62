use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Error returned at the HTTP boundary. Renders as `{success:false, error, code}`.
#[derive(Debug, Clone)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, code, message)
    }
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    success: bool,
    error: String,
    code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorEnvelope {
            success: false,
            error: self.message,
            code: self.code,
        };
        (self.status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Failures while talking to the hosted model.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    #[error("{0}")]
    Auth(String),
    #[error("{0}")]
    Config(String),
    #[error("no response body received from model")]
    EmptyBody,
    #[error("failed to decode stream event: {0}")]
    Decode(String),
    #[error("model invocation timed out after {0} ms")]
    Timeout(u64),
    #[error("{0}")]
    Upstream(String),
}

impl ModelError {
    pub fn kind(&self) -> &'static str {
        match self {
            ModelError::Auth(_) => "upstream_auth_error",
            ModelError::Config(_) => "upstream_config_error",
            ModelError::EmptyBody => "upstream_empty_body",
            ModelError::Decode(_) => "decode_error",
            ModelError::Timeout(_) => "timeout",
            ModelError::Upstream(_) => "upstream_error",
        }
    }
}

impl From<crate::eventstream::DecodeError> for ModelError {
    fn from(err: crate::eventstream::DecodeError) -> Self {
        ModelError::Decode(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorClass {
    Auth,
    Config,
}

struct ErrorRule {
    needle: &'static str,
    class: ErrorClass,
    message: &'static str,
}

// First matching needle wins. `{model_id}` and `{region}` are filled from the
// active model configuration.
const UPSTREAM_ERROR_RULES: &[ErrorRule] = &[
    ErrorRule {
        needle: "Resolved credential object is not valid",
        class: ErrorClass::Auth,
        message: "AWS credentials are invalid or missing. Please check your production environment variables.",
    },
    ErrorRule {
        needle: "The security token included in the request is invalid",
        class: ErrorClass::Auth,
        message: "AWS credentials are expired or invalid. Please update your credentials.",
    },
    ErrorRule {
        needle: "UnrecognizedClientException",
        class: ErrorClass::Auth,
        message: "AWS credentials are not recognized. Please verify your access key and secret key.",
    },
    ErrorRule {
        needle: "No value provided for input HTTP label",
        class: ErrorClass::Config,
        message: "Model identifier is missing. Current modelId: \"{model_id}\". Please check environment configuration.",
    },
    ErrorRule {
        needle: "The provided model identifier is invalid",
        class: ErrorClass::Config,
        message: "Invalid model identifier. Please check that model \"{model_id}\" is available in region {region}.",
    },
    ErrorRule {
        needle: "ResourceNotFoundException",
        class: ErrorClass::Config,
        message: "Model \"{model_id}\" was not found in region {region}. Please check environment configuration.",
    },
    ErrorRule {
        needle: "AccessDenied",
        class: ErrorClass::Auth,
        message: "Access denied. Please check your AWS credentials and permissions for Bedrock Runtime.",
    },
];

/// Maps raw vendor error text onto an operator-actionable `ModelError`.
pub fn classify_upstream_error(raw: &str, model_id: &str, region: &str) -> ModelError {
    let Some(rule) = UPSTREAM_ERROR_RULES
        .iter()
        .find(|rule| raw.contains(rule.needle))
    else {
        return ModelError::Upstream(raw.to_string());
    };
    let message = rule
        .message
        .replace("{model_id}", model_id)
        .replace("{region}", region);
    match rule.class {
        ErrorClass::Auth => ModelError::Auth(message),
        ErrorClass::Config => ModelError::Config(message),
    }
}
