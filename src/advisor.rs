//! Generative advisor integration
//!
//! This module handles communication with the Claude API for decision
//! support. Every advisor call in the engine follows the same contract: the
//! deterministic fallback is computed first, the advisor is attempted, and
//! any failure (transport, HTTP, unparseable JSON, out-of-catalog values)
//! silently yields the fallback. One failed call never contaminates another
//! component's advisor call.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// ---------------------------------------------------------------------------
/// Configuration
/// ---------------------------------------------------------------------------

const CLAUDE_API_URL: &str = "https://api.anthropic.com";
const CLAUDE_MODEL: &str = "claude-sonnet-4-20250514";
const API_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT_SECS: u64 = 30;

const COACH_SYSTEM_PROMPT: &str = include_str!("prompts/coach_system.txt");

/// ---------------------------------------------------------------------------
/// Error Types
/// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum AdvisorError {
  #[error("API key not configured")]
  MissingApiKey,

  #[error("Request failed: {0}")]
  Request(String),

  #[error("API error: {0}")]
  Api(String),

  #[error("Parse error: {0}")]
  Parse(String),
}

/// ---------------------------------------------------------------------------
/// Advisor Trait
/// ---------------------------------------------------------------------------

/// One prompt in, raw text out. The engine only ever depends on this trait;
/// tests script it, production wires the Claude client.
#[async_trait]
pub trait Advisor: Send + Sync {
  async fn complete(
    &self,
    system_prompt: &str,
    user_message: &str,
    max_tokens: u32,
  ) -> Result<String, AdvisorError>;
}

/// ---------------------------------------------------------------------------
/// Claude API Types
/// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ClaudeRequest {
  model: String,
  max_tokens: u32,
  system: String,
  messages: Vec<ClaudeMessage>,
}

#[derive(Debug, Serialize)]
struct ClaudeMessage {
  role: String,
  content: String,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
  content: Vec<ContentBlock>,
  usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
  #[serde(rename = "type")]
  content_type: String,
  text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
  input_tokens: u32,
  output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ClaudeErrorResponse {
  error: ClaudeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ClaudeErrorDetail {
  message: String,
}

/// ---------------------------------------------------------------------------
/// Claude Client
/// ---------------------------------------------------------------------------

pub struct ClaudeAdvisor {
  client: Client,
  api_key: String,
  base_url: String,
}

impl ClaudeAdvisor {
  pub fn new(api_key: &str) -> Result<Self, AdvisorError> {
    Self::with_base_url(api_key, CLAUDE_API_URL)
  }

  pub fn with_base_url(api_key: &str, base_url: &str) -> Result<Self, AdvisorError> {
    if api_key.is_empty() {
      return Err(AdvisorError::MissingApiKey);
    }

    let client = Client::builder()
      .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
      .build()
      .map_err(|e| AdvisorError::Request(e.to_string()))?;

    Ok(Self {
      client,
      api_key: api_key.to_string(),
      base_url: base_url.trim_end_matches('/').to_string(),
    })
  }
}

#[async_trait]
impl Advisor for ClaudeAdvisor {
  async fn complete(
    &self,
    system_prompt: &str,
    user_message: &str,
    max_tokens: u32,
  ) -> Result<String, AdvisorError> {
    let request = ClaudeRequest {
      model: CLAUDE_MODEL.to_string(),
      max_tokens,
      system: system_prompt.to_string(),
      messages: vec![ClaudeMessage {
        role: "user".to_string(),
        content: user_message.to_string(),
      }],
    };

    let response = self
      .client
      .post(format!("{}/v1/messages", self.base_url))
      .header("x-api-key", &self.api_key)
      .header("anthropic-version", API_VERSION)
      .header("content-type", "application/json")
      .json(&request)
      .send()
      .await
      .map_err(|e| AdvisorError::Request(e.to_string()))?;

    let status = response.status();
    let body = response
      .text()
      .await
      .map_err(|e| AdvisorError::Request(e.to_string()))?;

    if !status.is_success() {
      if let Ok(error_resp) = serde_json::from_str::<ClaudeErrorResponse>(&body) {
        return Err(AdvisorError::Api(error_resp.error.message));
      }
      return Err(AdvisorError::Api(format!("HTTP {}: {}", status, body)));
    }

    let claude_response: ClaudeResponse =
      serde_json::from_str(&body).map_err(|e| AdvisorError::Parse(e.to_string()))?;

    if let Some(usage) = &claude_response.usage {
      tracing::debug!(
        input_tokens = usage.input_tokens,
        output_tokens = usage.output_tokens,
        "advisor call complete"
      );
    }

    claude_response
      .content
      .iter()
      .find(|c| c.content_type == "text")
      .and_then(|c| c.text.clone())
      .ok_or_else(|| AdvisorError::Parse("No text content in response".to_string()))
  }
}

/// ---------------------------------------------------------------------------
/// Structured Requests
/// ---------------------------------------------------------------------------

/// Ask the advisor for a JSON-shaped answer. Any failure along the way
/// (transport, API, extraction, deserialization) is logged and collapses to
/// `None` so the caller's fallback takes over.
pub async fn request<T: DeserializeOwned>(
  advisor: &dyn Advisor,
  user_message: &str,
  max_tokens: u32,
) -> Option<T> {
  let text = match advisor.complete(COACH_SYSTEM_PROMPT, user_message, max_tokens).await {
    Ok(text) => text,
    Err(e) => {
      tracing::warn!(error = %e, "advisor unavailable; using fallback");
      return None;
    }
  };

  let json = match extract_json(&text) {
    Ok(json) => json,
    Err(e) => {
      tracing::warn!(error = %e, "advisor response had no JSON; using fallback");
      return None;
    }
  };

  match serde_json::from_str(&json) {
    Ok(value) => Some(value),
    Err(e) => {
      tracing::warn!(error = %e, "advisor JSON did not match the expected shape; using fallback");
      None
    }
  }
}

/// Result of composing a fallback with an advisor attempt.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
  pub value: T,
  pub ai_enhanced: bool,
}

/// Compose the two decision strategies: the fallback is computed eagerly by
/// the caller before this is ever awaited, and the primary substitutes only
/// when it produces a validated value.
pub async fn resolve<T, F>(fallback: T, primary: F) -> Resolved<T>
where
  F: std::future::Future<Output = Option<T>>,
{
  match primary.await {
    Some(value) => Resolved { value, ai_enhanced: true },
    None => Resolved { value: fallback, ai_enhanced: false },
  }
}

/// Extract JSON from an advisor response (handles markdown code blocks)
pub fn extract_json(text: &str) -> Result<String, AdvisorError> {
  // Try direct parse first
  if text.trim().starts_with('{') {
    return Ok(text.trim().to_string());
  }

  // Look for JSON in code blocks
  if let Some(start) = text.find("```json") {
    let start = start + 7;
    if let Some(end) = text[start..].find("```") {
      return Ok(text[start..start + end].trim().to_string());
    }
  }

  // Plain code blocks, skipping any language identifier
  if let Some(start) = text.find("```") {
    let start = start + 3;
    let content_start = text[start..]
      .find('\n')
      .map(|i| start + i + 1)
      .unwrap_or(start);
    if let Some(end) = text[content_start..].find("```") {
      return Ok(text[content_start..content_start + end].trim().to_string());
    }
  }

  // Last resort: first { to last }
  if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
    return Ok(text[start..=end].to_string());
  }

  Err(AdvisorError::Parse("Could not extract JSON from response".to_string()))
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
