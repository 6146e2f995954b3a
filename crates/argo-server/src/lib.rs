//! Argo query server
//!
//! Accepts natural-language questions about ARGO float measurements, has a
//! language model translate them into SQL against the `argo_data` table,
//! runs the SQL, and returns the rows with the generated SQL and an
//! explanation.

pub mod api;
pub mod client;
pub mod config;
pub mod llm;
pub mod logging;
pub mod metrics;
pub mod query;

pub use api::{router, AppState};
pub use llm::{CompletionModel, LlmError, OpenRouterModel, SqlTranslation};
pub use query::{answer_question, ApiError, QueryRequest, QueryResponse};
