//! HTTP API
//!
//! - `POST /query` - natural-language question in, rows + SQL + explanation out
//! - `GET /health` - liveness
//! - `GET /metrics` - Prometheus exposition

use argo_store::QueryStore;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::Instrument;
use uuid::Uuid;

use crate::llm::CompletionModel;
use crate::log_event;
use crate::metrics::{Metrics, Outcome};
use crate::query::{answer_question, ApiError, QueryRequest};

/// Dependencies shared by every request, passed in rather than held globally.
#[derive(Clone)]
pub struct AppState {
    pub model: Arc<dyn CompletionModel>,
    pub store: Arc<dyn QueryStore>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(model: Arc<dyn CompletionModel>, store: Arc<dyn QueryStore>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            model,
            store,
            metrics: Arc::new(Metrics::new()?),
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/query", post(query_handler))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Serve the API on `listener` until Ctrl-C.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Argo query server listening on {}", addr);
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

pub async fn query_handler(
    State(state): State<AppState>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Response {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("query", %request_id);

    async move {
        let started = Instant::now();
        let result = match body {
            Ok(Json(QueryRequest { query: Some(question) })) => {
                tracing::info!(question = %question, "Received query");
                answer_question(state.model.as_ref(), state.store.clone(), &question).await
            }
            Ok(Json(QueryRequest { query: None })) => Err(ApiError::MissingQuery),
            Err(rejection) => {
                tracing::debug!(%rejection, "Rejected request body");
                Err(ApiError::MissingQuery)
            }
        };
        let elapsed = started.elapsed();

        match result {
            Ok(response) => {
                state.metrics.observe(Outcome::Ok, elapsed.as_secs_f64());
                log_event!(
                    INFO,
                    "query_completed",
                    rows = response.data.len(),
                    duration_ms = elapsed.as_millis() as u64
                );
                Json(response).into_response()
            }
            Err(err) => {
                state.metrics.observe(err.outcome(), elapsed.as_secs_f64());
                match &err {
                    ApiError::MissingQuery => tracing::warn!("{}", err),
                    ApiError::Query { sql, source } => {
                        tracing::error!(sql = %sql, error = %source, "Query execution failed")
                    }
                    _ => tracing::error!(error = %err, "Request failed"),
                }
                err.into_response()
            }
        }
    }
    .instrument(span)
    .await
}

async fn health_check() -> &'static str {
    "OK"
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => ApiError::Internal(format!("Failed to render metrics: {}", e)).into_response(),
    }
}
