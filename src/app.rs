use crate::bedrock::{BedrockClient, ModelClient};
use crate::config::{ModelConfig, TranslateConfig};
use crate::error::{AppError, AppResult};
use crate::profiles::{ProfileStore, SqliteProfileStore};
use crate::translate::{AwsTranslateClient, TranslationClient};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::PathBuf;
use std::sync::{Arc, Once, OnceLock};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<RuntimeConfig>,
    pub model: Arc<dyn ModelClient>,
    pub translator: Arc<dyn TranslationClient>,
    pub profiles: Arc<dyn ProfileStore>,
    pub metrics: PrometheusHandle,
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static METRICS_ERROR: OnceLock<AppError> = OnceLock::new();
static METRICS_INIT: Once = Once::new();

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub listen: String,
    pub metrics_path: String,
    pub database_dsn: String,
    pub model: ModelConfig,
    pub translate: TranslateConfig,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let listen = std::env::var("JOMKAYA_LISTEN")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());
        let metrics_path = std::env::var("JOMKAYA_METRICS_PATH")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "/metrics".to_string());
        Self {
            listen,
            metrics_path,
            database_dsn: resolve_database_dsn(),
            model: ModelConfig::from_env(),
            translate: TranslateConfig::from_env(),
        }
    }
}

pub async fn load_state() -> AppResult<AppState> {
    load_state_with_runtime(RuntimeConfig::from_env()).await
}

/// Builds the state with production clients for the configured runtime.
pub async fn load_state_with_runtime(runtime: RuntimeConfig) -> AppResult<AppState> {
    let http = reqwest::Client::builder()
        .user_agent("jomkaya/0.1")
        .build()
        .map_err(|err| AppError::internal("http_client_init_failed", err.to_string()))?;

    ensure_sqlite_file(&runtime.database_dsn)
        .map_err(|err| AppError::internal("database_init_failed", err))?;

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(
            runtime
                .database_dsn
                .parse::<sqlx::sqlite::SqliteConnectOptions>()
                .map_err(|err| AppError::internal("database_dsn_parse_failed", err.to_string()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .busy_timeout(std::time::Duration::from_secs(5)),
        )
        .await
        .map_err(|err| AppError::internal("database_init_failed", err.to_string()))?;

    let profiles = SqliteProfileStore::new(pool)
        .await
        .map_err(|err| AppError::internal("profile_store_init_failed", err))?;

    let model = BedrockClient::new(http.clone(), runtime.model.clone());
    let translator = AwsTranslateClient::new(http, runtime.translate.clone());
    tracing::info!(
        model_id = %runtime.model.model_id,
        region = %runtime.model.region,
        bedrock_auth = auth_mode(
            runtime.model.bearer_token.is_some(),
            runtime.model.credentials.is_some()
        ),
        translate_auth = auth_mode(false, runtime.translate.credentials.is_some()),
        "model client configured"
    );

    Ok(AppState {
        runtime: Arc::new(runtime),
        model: Arc::new(model),
        translator: Arc::new(translator),
        profiles: Arc::new(profiles),
        metrics: init_metrics()?,
    })
}

fn auth_mode(bearer: bool, access_keys: bool) -> &'static str {
    match (bearer, access_keys) {
        (true, _) => "bearer",
        (false, true) => "sigv4",
        (false, false) => "none",
    }
}

pub fn init_metrics() -> AppResult<PrometheusHandle> {
    METRICS_INIT.call_once(|| {
        match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                let _ = METRICS_HANDLE.set(handle);
            }
            Err(err) => {
                let _ = METRICS_ERROR.set(AppError::internal(
                    "metrics_init_failed",
                    err.to_string(),
                ));
            }
        }
    });

    if let Some(err) = METRICS_ERROR.get() {
        return Err(err.clone());
    }
    METRICS_HANDLE
        .get()
        .cloned()
        .ok_or_else(|| AppError::internal("metrics_init_failed", "metrics recorder not available"))
}

fn resolve_database_dsn() -> String {
    std::env::var("JOMKAYA_DATABASE_DSN")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| {
            std::env::var("DATABASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty())
        })
        .unwrap_or_else(|| "sqlite://./data/jomkaya.db".to_string())
}

fn ensure_sqlite_file(dsn: &str) -> Result<(), String> {
    let dsn = dsn.trim();
    if !dsn.starts_with("sqlite://") {
        return Ok(());
    }
    if dsn.contains(":memory:") || dsn.contains("mode=memory") {
        return Ok(());
    }
    let path_part = dsn.trim_start_matches("sqlite://");
    let path_part = path_part.split('?').next().unwrap_or("");
    if path_part.is_empty() {
        return Ok(());
    }
    let path = PathBuf::from(path_part);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|err| format!("sqlite_dir_create_failed: {err}"))?;
        }
    }
    if !path.exists() {
        std::fs::File::create(&path).map_err(|err| format!("sqlite_file_create_failed: {err}"))?;
    }
    Ok(())
}

pub fn build_app(state: AppState) -> Router {
    let metrics_path = state.runtime.metrics_path.clone();
    Router::<AppState>::new()
        .route(&metrics_path, get(crate::handlers::metrics))
        .nest("/api", build_api_router())
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(PropagateRequestIdLayer::new(
            axum::http::header::HeaderName::from_static("x-request-id"),
        ))
        .layer(SetRequestIdLayer::new(
            axum::http::header::HeaderName::from_static("x-request-id"),
            MakeRequestUuid,
        ))
        .layer(TraceLayer::new_for_http())
}

fn build_api_router() -> Router<AppState> {
    Router::new()
        .route(
            "/chat",
            post(crate::handlers::chat).get(crate::handlers::chat_get),
        )
        .route(
            "/translate",
            post(crate::handlers::translate_post).get(crate::handlers::translate_get),
        )
        .route(
            "/profile/{user_id}",
            get(crate::handlers::get_profile).put(crate::handlers::put_profile),
        )
}
