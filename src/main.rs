// src/main.rs
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use axum::{
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod auth;
mod extraction;
mod notifications;
mod reconciliation;
mod reconciliation_tests;
mod routes;
mod store;
mod time_parsing;
mod timesheet;
mod validation_service;

use auth::{AuthError, AuthService};
use extraction::{ExtractionService, ExtractorConfig, VisionExtractor, DEFAULT_EXTRACTION_API_URL};
use notifications::{LogNotifier, NotificationService};
use store::{AuditSink, InMemoryAuditSink, InMemoryStore, RecordStore, StoreError};
use validation_service::{ValidationError, ValidationService};

// --- Error Handling ---

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("Error occurred: {}", self);
        let status = match &self {
            AppError::Auth(auth_err) => match auth_err {
                AuthError::EmailTaken => StatusCode::BAD_REQUEST,
                AuthError::ManagerRequired => StatusCode::FORBIDDEN,
                _ => StatusCode::UNAUTHORIZED,
            },
            AppError::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
            AppError::Validation(validation_err) => match validation_err {
                ValidationError::WeekNotFound => StatusCode::NOT_FOUND,
                ValidationError::NoImages => StatusCode::BAD_REQUEST,
                ValidationError::AllImagesFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
                ValidationError::Store(_) => StatusCode::NOT_FOUND,
            },
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

// --- Configuration ---

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_url() -> String {
    DEFAULT_EXTRACTION_API_URL.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_host")]
    pub server_host: String,
    #[serde(default = "default_port")]
    pub server_port: u16,
    pub openai_api_key: String,
    #[serde(default = "default_model")]
    pub model_name: String,
    #[serde(default = "default_api_url")]
    pub extraction_api_url: String,
    pub manager_email: Option<String>,
    pub manager_password: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        // Load .env file if it exists
        dotenv::dotenv().ok();
        envy::from_env::<AppConfig>()
    }
}

// --- Application state ---

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub store: Arc<dyn RecordStore>,
    pub audit: Arc<dyn AuditSink>,
    pub notifier: Arc<dyn NotificationService>,
    pub validator: Arc<ValidationService>,
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting timesheet service");
    let config = AppConfig::from_env().context("Loading configuration from environment failed")?;

    let auth = Arc::new(AuthService::new());
    if let (Some(email), Some(password)) = (&config.manager_email, &config.manager_password) {
        auth.seed_manager(email, password);
    }

    let store: Arc<dyn RecordStore> = Arc::new(InMemoryStore::new());
    let audit: Arc<dyn AuditSink> = Arc::new(InMemoryAuditSink::new());
    let notifier: Arc<dyn NotificationService> = Arc::new(LogNotifier);
    let extractor: Arc<dyn ExtractionService> = Arc::new(VisionExtractor::new(ExtractorConfig {
        api_url: config.extraction_api_url.clone(),
        api_key: config.openai_api_key.clone(),
        model: config.model_name.clone(),
    }));
    let validator = Arc::new(ValidationService::new(
        extractor,
        store.clone(),
        audit.clone(),
    ));

    let state = AppState {
        auth,
        store,
        audit,
        notifier,
        validator,
    };
    info!("Application state initialized.");

    let app: Router = routes::api_router()
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Binding to {} failed", addr))?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, app).await.context("Server failed")?;

    Ok(())
}
