//! The question -> SQL -> rows pipeline behind `POST /query`

use argo_store::{QueryStore, Row, StoreError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::llm::{self, CompletionModel, LlmError};
use crate::metrics::Outcome;

pub const MISSING_QUERY_MESSAGE: &str = "Missing 'query' in request body";
pub const MODEL_ERROR_MESSAGE: &str = "Failed to translate the question into SQL";
pub const INTERNAL_ERROR_MESSAGE: &str = "An internal error occurred. Check the server logs.";

#[derive(Debug, Default, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub data: Vec<Row>,
    pub explanation: String,
    pub generated_sql: String,
}

/// Every way a request can fail. Any of them aborts the whole request.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing 'query' in request body")]
    MissingQuery,

    #[error("Model translation failed: {0}")]
    Model(#[from] LlmError),

    #[error("Query execution failed: {source}")]
    Query {
        sql: String,
        #[source]
        source: StoreError,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingQuery => StatusCode::BAD_REQUEST,
            ApiError::Model(_) | ApiError::Query { .. } | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn outcome(&self) -> Outcome {
        match self {
            ApiError::MissingQuery => Outcome::BadRequest,
            ApiError::Model(_) => Outcome::ModelError,
            ApiError::Query { .. } => Outcome::QueryError,
            ApiError::Internal(_) => Outcome::InternalError,
        }
    }

    /// Client-facing body; model and internal failures stay generic.
    fn body(&self) -> serde_json::Value {
        match self {
            ApiError::MissingQuery => json!({ "error": MISSING_QUERY_MESSAGE }),
            ApiError::Model(_) => json!({ "error": MODEL_ERROR_MESSAGE }),
            ApiError::Query { sql, source } => json!({
                "error": format!("Query execution failed: {}", source),
                "sql_query": sql,
            }),
            ApiError::Internal(_) => json!({ "error": INTERNAL_ERROR_MESSAGE }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

fn execution_error(sql: String, source: StoreError) -> ApiError {
    if source.is_query_error() {
        ApiError::Query { sql, source }
    } else {
        ApiError::Internal(source.to_string())
    }
}

/// Translate `question` into SQL, run it, and shape the response.
pub async fn answer_question(
    model: &dyn CompletionModel,
    store: Arc<dyn QueryStore>,
    question: &str,
) -> Result<QueryResponse, ApiError> {
    let translation = llm::translate(model, question).await?;
    tracing::info!(sql = %translation.generated_sql, "Generated SQL");

    let sql = translation.generated_sql.clone();
    let data = tokio::task::spawn_blocking(move || store.run_query(&sql))
        .await
        .map_err(|e| ApiError::Internal(format!("Query task failed: {}", e)))?
        .map_err(|e| execution_error(translation.generated_sql.clone(), e))?;

    Ok(QueryResponse {
        data,
        explanation: translation.explanation,
        generated_sql: translation.generated_sql,
    })
}
