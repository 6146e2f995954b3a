//! End-to-end tests for `POST /query` with a stub model and an in-memory store

use argo_server::api::query_handler;
use argo_server::metrics::Outcome;
use argo_server::{router, AppState, CompletionModel, LlmError, QueryRequest};
use argo_store::{create_table, insert_records, ArgoStore, MeasurementRecord};
use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, response::Response, Json};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const CYCLE_224_COMPLETION: &str = r#"{"Generated_SQL": "SELECT temperature, salinity FROM argo_data WHERE cycle_number = 224", "Explanation": "Returns temperature and salinity for cycle 224."}"#;

/// Returns a fixed completion and counts how often it was asked.
struct StubModel {
    completion: Result<String, ()>,
    calls: AtomicUsize,
}

impl StubModel {
    fn replying(completion: &str) -> Arc<Self> {
        Arc::new(Self {
            completion: Ok(completion.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            completion: Err(()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionModel for StubModel {
    async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.completion.clone().map_err(|_| LlmError::EmptyCompletion)
    }
}

fn record(uid: i64, cycle_number: i64, temperature: f64, salinity: f64) -> MeasurementRecord {
    MeasurementRecord {
        uid,
        platform_number: 2902746,
        cycle_number,
        latitude: Some(-12.5),
        longitude: Some(75.25),
        pressure: Some(5.0),
        temperature: Some(temperature),
        salinity: Some(salinity),
        juld: Some(19367.25),
    }
}

fn store_with(records: &[MeasurementRecord]) -> Arc<ArgoStore> {
    let store = ArgoStore::open_in_memory().unwrap();
    store
        .with_connection(|conn| {
            create_table(conn)?;
            insert_records(conn, records)?;
            Ok(())
        })
        .unwrap();
    Arc::new(store)
}

fn state(model: Arc<StubModel>, store: Arc<ArgoStore>) -> AppState {
    AppState::new(model, store).unwrap()
}

async fn post_query(state: &AppState, query: Option<&str>) -> (StatusCode, Value) {
    let request = QueryRequest {
        query: query.map(String::from),
    };
    let response = query_handler(State(state.clone()), Ok(Json(request))).await;
    split(response).await
}

async fn split(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_cycle_224_returns_rows_sql_and_explanation() {
    let model = StubModel::replying(CYCLE_224_COMPLETION);
    let state = state(model.clone(), store_with(&[record(1, 224, 15.2, 35.1)]));

    let (status, body) =
        post_query(&state, Some("Show me temperature and salinity for cycle 224")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([{"temperature": 15.2, "salinity": 35.1}]));
    assert_eq!(
        body["generated_sql"],
        "SELECT temperature, salinity FROM argo_data WHERE cycle_number = 224"
    );
    assert_eq!(body["explanation"], "Returns temperature and salinity for cycle 224.");
    assert_eq!(model.calls(), 1);
    assert_eq!(state.metrics.request_count(Outcome::Ok), 1);
}

#[tokio::test]
async fn test_only_matching_rows_are_returned() {
    let model = StubModel::replying(CYCLE_224_COMPLETION);
    let state = state(
        model,
        store_with(&[
            record(1, 223, 16.0, 35.0),
            record(2, 224, 15.2, 35.1),
            record(3, 225, 14.1, 34.8),
        ]),
    );

    let (status, body) = post_query(&state, Some("cycle 224 please")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_generated_sql_is_trimmed() {
    let model = StubModel::replying(
        "{\"Generated_SQL\": \"\\n  SELECT uid FROM argo_data  \\n\", \"Explanation\": \"  Ids. \"}",
    );
    let state = state(model, store_with(&[record(1, 224, 15.2, 35.1)]));

    let (status, body) = post_query(&state, Some("ids")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["generated_sql"], "SELECT uid FROM argo_data");
    assert_eq!(body["explanation"], "Ids.");
}

#[tokio::test]
async fn test_missing_query_is_400_without_calling_model() {
    let model = StubModel::replying(CYCLE_224_COMPLETION);
    let state = state(model.clone(), store_with(&[]));

    let (status, body) = post_query(&state, None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Missing 'query' in request body"}));
    assert_eq!(model.calls(), 0);
    assert_eq!(state.metrics.request_count(Outcome::BadRequest), 1);
}

#[tokio::test]
async fn test_unknown_column_reports_sql() {
    let sql = "SELECT dissolved_oxygen FROM argo_data WHERE cycle_number = 224";
    let completion = json!({"Generated_SQL": sql, "Explanation": "Oxygen."}).to_string();
    let state = state(
        StubModel::replying(&completion),
        store_with(&[record(1, 224, 15.2, 35.1)]),
    );

    let (status, body) = post_query(&state, Some("oxygen for cycle 224")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["sql_query"], sql);
    let message = body["error"].as_str().unwrap();
    assert!(message.starts_with("Query execution failed"));
    assert!(message.contains("dissolved_oxygen"));
    assert_eq!(state.metrics.request_count(Outcome::QueryError), 1);
}

#[tokio::test]
async fn test_non_json_completion_is_generic_failure() {
    let state = state(
        StubModel::replying("I'm sorry, I can't help with that."),
        store_with(&[record(1, 224, 15.2, 35.1)]),
    );

    let (status, body) = post_query(&state, Some("cycle 224")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"error": "Failed to translate the question into SQL"}));
    assert_eq!(state.metrics.request_count(Outcome::ModelError), 1);
}

#[tokio::test]
async fn test_missing_field_in_completion_is_generic_failure() {
    let state = state(
        StubModel::replying(r#"{"Generated_SQL": "SELECT * FROM argo_data"}"#),
        store_with(&[]),
    );

    let (status, body) = post_query(&state, Some("everything")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.get("data").is_none());
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_model_failure_is_generic_failure() {
    let state = state(StubModel::failing(), store_with(&[]));

    let (status, body) = post_query(&state, Some("anything")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"error": "Failed to translate the question into SQL"}));
}

#[tokio::test]
async fn test_repeated_query_returns_identical_data() {
    let state = state(
        StubModel::replying(r#"{"Generated_SQL": "SELECT * FROM argo_data ORDER BY uid", "Explanation": "All."}"#),
        store_with(&[record(1, 224, 15.2, 35.1), record(2, 225, 14.1, 34.8)]),
    );

    let (_, first) = post_query(&state, Some("all rows")).await;
    let (_, second) = post_query(&state, Some("all rows")).await;

    let first = serde_json::to_vec(&first["data"]).unwrap();
    let second = serde_json::to_vec(&second["data"]).unwrap();
    assert_eq!(first, second);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_share_one_state() {
    const REQUESTS: usize = 16;

    let model = StubModel::replying(CYCLE_224_COMPLETION);
    let state = state(
        model.clone(),
        store_with(&[
            record(1, 223, 16.0, 35.0),
            record(2, 224, 15.2, 35.1),
            record(3, 225, 14.1, 34.8),
        ]),
    );

    let handles: Vec<_> = (0..REQUESTS)
        .map(|i| {
            let state = state.clone();
            tokio::spawn(async move {
                let question = format!("cycle 224, request {}", i);
                post_query(&state, Some(&question)).await
            })
        })
        .collect();

    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!([{"temperature": 15.2, "salinity": 35.1}]));
    }

    assert_eq!(model.calls(), REQUESTS);
    assert_eq!(state.metrics.request_count(Outcome::Ok), REQUESTS as u64);
}

#[tokio::test]
async fn test_every_response_has_data_or_error() {
    let completions = [
        CYCLE_224_COMPLETION.to_string(),
        "not json".to_string(),
        json!({"Generated_SQL": "SELEKT", "Explanation": "bad"}).to_string(),
        json!({"Generated_SQL": "SELECT COUNT(*) AS n FROM argo_data", "Explanation": "Count."}).to_string(),
    ];

    for completion in completions {
        let state = state(StubModel::replying(&completion), store_with(&[record(1, 224, 15.2, 35.1)]));
        let (status, body) = post_query(&state, Some("question")).await;

        if status.is_success() {
            assert!(body["data"].is_array());
            assert!(body["explanation"].is_string());
            assert!(body["generated_sql"].is_string());
        } else {
            assert!(body["error"].is_string(), "no error field for {}", completion);
        }
    }
}

#[tokio::test]
async fn test_over_http() {
    let model = StubModel::replying(CYCLE_224_COMPLETION);
    let state = state(model.clone(), store_with(&[record(1, 224, 15.2, 35.1)]));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    let client = reqwest::Client::new();
    let url = format!("http://{}/query", addr);

    let ok = client
        .post(&url)
        .json(&json!({"query": "cycle 224"}))
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status().as_u16(), 200);
    let body: Value = ok.json().await.unwrap();
    assert_eq!(body["data"][0]["temperature"], json!(15.2));

    for bad_body in ["{}", "{\"query\": 5}", "not json at all"] {
        let response = client
            .post(&url)
            .header("content-type", "application/json")
            .body(bad_body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400, "body {:?}", bad_body);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Missing 'query' in request body");
    }
    assert_eq!(model.calls(), 1);

    let health = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(health.text().await.unwrap(), "OK");

    let metrics = client
        .get(format!("http://{}/metrics", addr))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("argo_query_requests_total{outcome=\"bad_request\"} 3"));
}

#[tokio::test]
async fn test_ask_client() {
    let state = state(
        StubModel::replying(CYCLE_224_COMPLETION),
        store_with(&[record(1, 224, 15.2, 35.1)]),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    let (status, body) = argo_server::client::ask(&format!("http://{}/query", addr), "cycle 224")
        .await
        .unwrap();
    assert_eq!(status, 200);
    assert_eq!(body["data"], json!([{"temperature": 15.2, "salinity": 35.1}]));
}
