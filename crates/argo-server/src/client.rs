//! Demonstration client: POST a question to a running server

use serde_json::{json, Value};

pub const DEFAULT_URL: &str = "http://127.0.0.1:5000/query";

/// Send `question` to the `/query` endpoint at `url` and return the JSON reply.
///
/// Error responses (4xx/5xx) are returned as values too; they carry an
/// `error` field rather than failing the call.
pub async fn ask(url: &str, question: &str) -> Result<(u16, Value), reqwest::Error> {
    let response = reqwest::Client::new()
        .post(url)
        .json(&json!({ "query": question }))
        .send()
        .await?;

    let status = response.status().as_u16();
    let body = response.json::<Value>().await?;
    Ok((status, body))
}
