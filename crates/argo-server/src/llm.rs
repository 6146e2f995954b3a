//! Natural language to SQL translation through an OpenAI-compatible model
//!
//! The translation is an explicit three-step pipeline:
//! [`build_prompt`] -> [`CompletionModel::complete`] -> [`parse_completion`].

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::LlmConfig;

/// Prompt sent to the model; `{user_query}` is replaced with the caller's question.
const PROMPT_TEMPLATE: &str = r#"
You are an AI assistant for ARGO float data. The database table is `argo_data` with columns:
uid (INT), platform_number (INT), cycle_number (INT), latitude (FLOAT),
longitude (FLOAT), pressure (FLOAT), temperature (FLOAT), salinity (FLOAT), juld (FLOAT).

Note: The 'juld' column represents days since 1950-01-01 (Julian Day).
- If the user asks for a specific date, convert it to juld and select all rows for that date (include fractional days).
- If no date is mentioned, do not filter by juld.

Instructions:
1. Generate a SQL query that retrieves the requested data.
2. Generate a simple, human-readable explanation of the query result in no more than 100 words.

Return the output in JSON format only, with no other text before or after the JSON object.

{
"Generated_SQL": "<SQL query here>",
"Explanation": "<plain-text explanation here>"
}

User Query: {user_query}
"#;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Model request failed: {0}")]
    Request(#[from] OpenAIError),

    #[error("Model returned an empty completion")]
    EmptyCompletion,

    #[error("Completion is not the expected JSON object: {source}. Completion: {completion}")]
    InvalidJson {
        completion: String,
        #[source]
        source: serde_json::Error,
    },
}

/// The model's answer: SQL to run and a plain-language explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlTranslation {
    #[serde(rename = "Generated_SQL")]
    pub generated_sql: String,

    #[serde(rename = "Explanation")]
    pub explanation: String,
}

/// A text-completion service.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Chat-completions client for OpenRouter (or any OpenAI-compatible endpoint)
pub struct OpenRouterModel {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
}

impl OpenRouterModel {
    pub fn new(api_key: impl Into<String>, config: &LlmConfig) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_base(config.api_base.clone())
            .with_api_key(api_key.into());

        Self {
            client: Client::with_config(openai_config),
            model: config.model.clone(),
            temperature: config.temperature,
        }
    }
}

#[async_trait]
impl CompletionModel for OpenRouterModel {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.as_str())
            .messages(vec![ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt)
                    .build()?,
            )])
            .temperature(self.temperature)
            .build()?;

        let response = self.client.chat().create(request).await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(LlmError::EmptyCompletion)?;

        tracing::debug!(model = %self.model, completion = %content, "Model completion received");
        Ok(content)
    }
}

/// Fill the prompt template with the user's question. No escaping is applied.
pub fn build_prompt(question: &str) -> String {
    PROMPT_TEMPLATE.replace("{user_query}", question)
}

/// Body of the first Markdown code fence in `text`, if there is one.
fn fenced_body(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_open = &text[start + 3..];
    // Skip the info string (e.g. `json`) up to the end of the opening line
    let body = match after_open.find('\n') {
        Some(newline) => &after_open[newline + 1..],
        None => after_open,
    };
    Some(match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    })
}

/// Escape raw newlines, carriage returns and tabs that appear inside JSON
/// string literals. Models emit multi-line SQL this way; strict JSON forbids it.
fn escape_control_chars(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            match c {
                _ if escaped => {
                    escaped = false;
                    out.push(c);
                }
                '\\' => {
                    escaped = true;
                    out.push(c);
                }
                '"' => {
                    in_string = false;
                    out.push(c);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                _ => out.push(c),
            }
        } else {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
        }
    }
    out
}

fn decode(text: &str) -> Result<SqlTranslation, serde_json::Error> {
    serde_json::from_str(&escape_control_chars(text))
}

/// Decode a completion into a [`SqlTranslation`], trimming both fields.
///
/// The whole completion is tried as JSON first; only if that fails is the
/// body of a surrounding Markdown code fence tried instead.
pub fn parse_completion(completion: &str) -> Result<SqlTranslation, LlmError> {
    let trimmed = completion.trim();
    let parsed = decode(trimmed)
        .or_else(|err| match fenced_body(trimmed) {
            Some(body) => decode(body),
            None => Err(err),
        })
        .map_err(|source| LlmError::InvalidJson {
            completion: completion.to_string(),
            source,
        })?;

    Ok(SqlTranslation {
        generated_sql: parsed.generated_sql.trim().to_string(),
        explanation: parsed.explanation.trim().to_string(),
    })
}

/// Ask `model` to translate `question` into SQL.
pub async fn translate(
    model: &dyn CompletionModel,
    question: &str,
) -> Result<SqlTranslation, LlmError> {
    let prompt = build_prompt(question);
    let completion = model.complete(&prompt).await?;
    parse_completion(&completion)
}
