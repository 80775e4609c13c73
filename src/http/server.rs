//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, body limit, request ID, metrics)
//! - Bind server to listener, plain or TLS
//! - Apply configuration reloads to the live state

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::trace::TraceLayer;

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::http::instance::get_instance;
use crate::http::max_size::{max_size_for_form, max_size_for_url};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::http::submission::submit;
use crate::observability::metrics;
use crate::security::limits::body_limit_layer;
use crate::store::{
    CookieCredentials, CredentialResolver, FormRegistry, InstanceStore, MemoryInstanceStore,
    MemorySubmissionLog, SubmissionLog, Survey, SurveyStore,
};
use crate::upstream::Communicator;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Live configuration, swapped on reload.
    pub config: Arc<ArcSwap<RelayConfig>>,
    pub surveys: Arc<dyn SurveyStore>,
    pub credentials: Arc<dyn CredentialResolver>,
    pub submissions: Arc<dyn SubmissionLog>,
    pub instances: Arc<dyn InstanceStore>,
    pub communicator: Communicator,
}

/// HTTP server for the submission relay.
pub struct HttpServer {
    config: RelayConfig,
    state: AppState,
}

impl HttpServer {
    /// Create a server with in-memory stores built from `config`.
    pub fn new(config: RelayConfig) -> Self {
        let communicator = Communicator::new(
            Duration::from_secs(config.timeouts.connect_secs),
            Duration::from_secs(config.timeouts.head_secs),
        );

        let state = AppState {
            config: Arc::new(ArcSwap::from_pointee(config.clone())),
            surveys: Arc::new(FormRegistry::from_forms(&config.forms)),
            credentials: Arc::new(CookieCredentials::new(config.credentials.cookie_name.clone())),
            submissions: Arc::new(MemorySubmissionLog::new(None)),
            instances: Arc::new(MemoryInstanceStore::new()),
            communicator,
        };

        Self { config, state }
    }

    pub fn with_survey_store(mut self, surveys: Arc<dyn SurveyStore>) -> Self {
        self.state.surveys = surveys;
        self
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialResolver>) -> Self {
        self.state.credentials = credentials;
        self
    }

    pub fn with_submission_log(mut self, submissions: Arc<dyn SubmissionLog>) -> Self {
        self.state.submissions = submissions;
        self
    }

    pub fn with_instance_store(mut self, instances: Arc<dyn InstanceStore>) -> Self {
        self.state.instances = instances;
        self
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Get a reference to the startup config.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// The relay router with all middleware layers.
    pub fn router(&self) -> Router {
        build_router(&self.config, self.state.clone())
    }

    /// The operator API router.
    pub fn admin_router(&self) -> Router {
        crate::admin::setup_admin_router(self.state.clone())
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<RelayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, forms = self.config.forms.len(), "HTTP server starting");

        spawn_config_updates(self.state.clone(), config_updates);
        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Run the server over TLS.
    pub async fn run_tls(
        self,
        listener: std::net::TcpListener,
        tls: RustlsConfig,
        config_updates: mpsc::UnboundedReceiver<RelayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, forms = self.config.forms.len(), "HTTPS server starting");

        let handle = axum_server::Handle::new();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            tracing::info!("Shutdown signal received, draining connections");
            shutdown_handle.graceful_shutdown(Some(Duration::from_secs(30)));
        });

        spawn_config_updates(self.state.clone(), config_updates);
        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();

        axum_server::from_tcp_rustls(listener, tls)
            .handle(handle)
            .serve(app)
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}

fn build_router(config: &RelayConfig, state: AppState) -> Router {
    let submission = Router::new()
        .route("/max-size/", get(max_size_for_url).fallback(not_allowed))
        .route("/max-size/{form_id}", get(max_size_for_form).fallback(not_allowed))
        .route("/{form_id}", get(get_instance).post(submit).fallback(not_allowed))
        .fallback(not_allowed);

    Router::new()
        .route("/health", get(health))
        .nest(&format!("{}/submission", config.submission.base_path), submission)
        .fallback(not_found)
        .with_state(state)
        .layer(middleware::from_fn(track_metrics))
        .layer(body_limit_layer(&config.security))
        .layer(propagate_request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(set_request_id_layer())
}

fn spawn_config_updates(state: AppState, mut updates: mpsc::UnboundedReceiver<RelayConfig>) {
    tokio::spawn(async move {
        while let Some(config) = updates.recv().await {
            state.surveys.reload(&config.forms);
            tracing::info!(forms = config.forms.len(), "Configuration reloaded");
            state.config.store(Arc::new(config));
        }
    });
}

/// Look up an active survey.
pub(crate) async fn resolve_survey(state: &AppState, form_id: &str) -> Result<Survey, RelayError> {
    let survey = state
        .surveys
        .get(form_id)
        .await?
        .ok_or(RelayError::SurveyNotFound)?;
    if !survey.active {
        return Err(RelayError::SurveyInactive);
    }
    Ok(survey)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn not_allowed() -> RelayError {
    RelayError::NotAllowed
}

async fn not_found() -> RelayError {
    RelayError::NotFound
}

async fn track_metrics(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;
    metrics::record_request(&route, response.status().as_u16(), start);
    response
}
