//! Schema classification: arbitrary spreadsheet columns to canonical fields.
//!
//! Sends the header list and a small data sample to an external
//! classification oracle (Anthropic Claude API) and validates its structured
//! response against the supplied headers.
//!
//! The oracle is abstracted behind [`SchemaOracle`] so the upload pipeline
//! can run against a deterministic stub in tests. Retry/backoff is a
//! deployment concern layered outside this client: one request, one
//! response.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rollcall::classify::{AiClient, SchemaOracle};
//!
//! let client = AiClient::from_env()?;
//! let mapping = client.classify(&sheet.headers, &sheet.rows[..5]).await?;
//! ```

pub mod prompt;

use std::env;
use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{ClassifyError, ClassifyResult};
use crate::models::ColumnMapping;

pub use prompt::{build_messages, system_prompt, user_prompt};

/// Default bound on the oracle round trip.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The external classification oracle.
///
/// One request, one response, no retained state. Implementations must not
/// persist anything; the caller decides what to do with the mapping.
pub trait SchemaOracle: Send + Sync {
    /// Classify the upload's columns from its headers and a data sample.
    fn classify(
        &self,
        headers: &[String],
        sample_rows: &[Value],
    ) -> impl Future<Output = ClassifyResult<ColumnMapping>> + Send;
}

/// Anthropic API client
#[derive(Clone)]
pub struct AiClient {
    api_key: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

/// Anthropic API response structure
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

/// Anthropic API error response
#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl AiClient {
    /// Create a new client with explicit API key
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 1024,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Create a client from environment variable ANTHROPIC_API_KEY
    pub fn from_env() -> ClassifyResult<Self> {
        // Try loading .env file
        let _ = dotenvy::dotenv();

        let api_key =
            env::var("ANTHROPIC_API_KEY").map_err(|_| ClassifyError::MissingApiKey)?;

        Ok(Self::new(api_key))
    }

    /// Set the model to use
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the round-trip bound
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Call the Anthropic API and return the raw response text.
    async fn call_api(&self, headers: &[String], sample_rows: &[Value]) -> ClassifyResult<String> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ClassifyError::Http(e.to_string()))?;

        let messages = prompt::build_messages(headers, sample_rows);
        let system = prompt::system_prompt();

        let request_body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": 0,
            "system": system,
            "messages": messages
        });

        let response = client
            .post("https://api.anthropic.com/v1/messages")
            .header("Content-Type", "application/json")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClassifyError::Timeout
                } else {
                    ClassifyError::Http(e.to_string())
                }
            })?;

        let status = response.status();

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ClassifyError::Timeout
            } else {
                ClassifyError::Http(e.to_string())
            }
        })?;

        if !status.is_success() {
            // Try to parse the API error shape
            if let Ok(error) = serde_json::from_str::<AnthropicError>(&body) {
                return Err(ClassifyError::Http(error.error.message));
            }
            return Err(ClassifyError::Http(format!("HTTP {}: {}", status, body)));
        }

        let response: AnthropicResponse = serde_json::from_str(&body)
            .map_err(|e| ClassifyError::Mapping(format!("unparseable oracle response: {}", e)))?;

        let text = response
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(ClassifyError::Mapping("empty oracle response".to_string()));
        }

        Ok(text)
    }
}

impl SchemaOracle for AiClient {
    fn classify(
        &self,
        headers: &[String],
        sample_rows: &[Value],
    ) -> impl Future<Output = ClassifyResult<ColumnMapping>> + Send {
        let client = self.clone();
        let headers = headers.to_vec();
        let sample_rows = sample_rows.to_vec();
        async move {
            let response = client.call_api(&headers, &sample_rows).await?;
            let mapping = parse_mapping_from_response(&response)?;
            validate_mapping(&mapping, &headers)?;
            Ok(mapping)
        }
    }
}

/// Parse a column mapping from the oracle's response text.
pub fn parse_mapping_from_response(response: &str) -> ClassifyResult<ColumnMapping> {
    // The model may wrap its JSON in markdown code blocks
    let json_str = extract_json(response);

    serde_json::from_str(&json_str).map_err(|e| {
        ClassifyError::Mapping(format!(
            "malformed mapping: {}. Response was: {}",
            e,
            &response[..response.len().min(500)]
        ))
    })
}

/// Validate a mapping against the upload's headers.
///
/// `identifierColumn` and every non-null mapping value must be an exact
/// member of `headers`; otherwise no candidates may be persisted.
pub fn validate_mapping(mapping: &ColumnMapping, headers: &[String]) -> ClassifyResult<()> {
    let known = |column: &str| headers.iter().any(|h| h == column);

    if !known(&mapping.identifier_column) {
        return Err(ClassifyError::Mapping(format!(
            "identifier column '{}' is not among the upload headers",
            mapping.identifier_column
        )));
    }

    let fields = [
        ("fullName", &mapping.mappings.full_name),
        ("email", &mapping.mappings.email),
        ("nationalId", &mapping.mappings.national_id),
        ("area", &mapping.mappings.area),
    ];

    for (field, column) in fields {
        if let Some(column) = column {
            if !known(column) {
                return Err(ClassifyError::Mapping(format!(
                    "mapping for '{}' names unknown column '{}'",
                    field, column
                )));
            }
        }
    }

    Ok(())
}

/// Extract JSON from a response that may contain markdown code blocks
fn extract_json(text: &str) -> String {
    // Try to find JSON in code block
    if let Some(start) = text.find("```json") {
        if let Some(end) = text[start..].find("```\n").or_else(|| text[start..].rfind("```")) {
            let json_start = start + 7; // len of "```json"
            if json_start < start + end {
                return text[json_start..start + end].trim().to_string();
            }
        }
    }

    // Try to find JSON in generic code block
    if let Some(start) = text.find("```") {
        let after_start = start + 3;
        // Skip language identifier if present
        let content_start = text[after_start..]
            .find('\n')
            .map(|i| after_start + i + 1)
            .unwrap_or(after_start);

        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim().to_string();
        }
    }

    // Try to find raw JSON object
    if let Some(start) = text.find('{') {
        if let Some(end) = text.rfind('}') {
            if start < end {
                return text[start..=end].to_string();
            }
        }
    }

    text.to_string()
}
