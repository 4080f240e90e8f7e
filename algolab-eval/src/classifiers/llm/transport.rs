//! Language-model transports
//!
//! The classifier never decides by itself where it runs. The caller
//! injects one of:
//! - [`DirectTransport`]: calls an OpenAI-compatible chat-completions API
//!   with a server-side credential
//! - [`ProxyTransport`]: posts the turn to the classification proxy
//!   endpoint, which runs the classifier where the credential lives

use crate::types::{AlgorithmInput, ExecutionResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("algolab-eval/", env!("CARGO_PKG_VERSION"));

/// Transport failure, each variant maps to one fallback reason
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("No API key configured")]
    MissingCredentials,

    #[error("Request timed out")]
    Timeout,

    #[error("Remote returned status {code}: {message}")]
    Status { code: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl TransportError {
    /// Stable reason string recorded on fallback results
    pub fn fallback_reason(&self) -> String {
        match self {
            TransportError::MissingCredentials => "no-api-key".to_string(),
            TransportError::Timeout => "timeout".to_string(),
            TransportError::Status { code, message } => format!("llm_status_{}:{}", code, message),
            TransportError::Network(msg) => format!("network_error:{}", msg),
            TransportError::InvalidPayload(_) => "api_invalid_payload".to_string(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Network(e.to_string())
        }
    }
}

/// One chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Everything either transport may need for one classification
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Registry key of the classifier (the proxy runs it by key)
    pub algorithm_key: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub messages: Vec<ChatMessage>,
    /// Ask for `{"label": <enum>}` structured output
    pub structured_labels: Option<Vec<String>>,
    pub timeout: Duration,
    /// Original input, forwarded by the proxy transport
    pub input: AlgorithmInput,
}

/// Transport reply
#[derive(Debug, Clone, PartialEq)]
pub enum LlmReply {
    /// Raw model content, still to be parsed
    Completion { content: String },
    /// Result already computed server-side
    Classified(Box<ExecutionResult>),
}

#[async_trait]
pub trait LlmTransport: Send + Sync {
    /// Human-readable transport name for logs and summaries
    fn name(&self) -> &'static str;

    /// Whether a credential is available (never exposes it)
    fn has_credentials(&self) -> bool;

    async fn complete(&self, request: &LlmRequest) -> Result<LlmReply, TransportError>;
}

// ============================================================================
// Direct transport
// ============================================================================

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    temperature: f64,
    max_tokens: u32,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Chat-completions client holding the API key
pub struct DirectTransport {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl DirectTransport {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, TransportError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    fn response_format(labels: &[String]) -> serde_json::Value {
        serde_json::json!({
            "type": "json_schema",
            "json_schema": {
                "name": "x_label",
                "strict": true,
                "schema": {
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {
                        "label": { "type": "string", "enum": labels }
                    },
                    "required": ["label"]
                }
            }
        })
    }
}

#[async_trait]
impl LlmTransport for DirectTransport {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmReply, TransportError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(TransportError::MissingCredentials)?;

        let body = ChatCompletionBody {
            model: &request.model,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            messages: &request.messages,
            response_format: request
                .structured_labels
                .as_deref()
                .map(Self::response_format),
        };

        debug!(model = %request.model, messages = request.messages.len(), "Calling chat completions");

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|b| b.error.message)
                .unwrap_or(text);
            warn!(status = status.as_u16(), "Chat completions returned an error status");
            return Err(TransportError::Status {
                code: status.as_u16(),
                message,
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| TransportError::InvalidPayload(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| TransportError::InvalidPayload("no choices".to_string()))?;

        Ok(LlmReply::Completion { content })
    }
}

// ============================================================================
// Proxy transport
// ============================================================================

/// Proxy request body; also what the proxy endpoint accepts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyRequest {
    pub key: String,
    #[serde(default)]
    pub verbatim: Option<String>,
    #[serde(default)]
    pub verbatims: Option<Vec<String>>,
    #[serde(default)]
    pub context: Option<AlgorithmInput>,
}

/// Proxy response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyResponse {
    pub ok: bool,
    #[serde(default)]
    pub results: Vec<ExecutionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Posts turns to the classification proxy endpoint
pub struct ProxyTransport {
    http: Client,
    url: String,
}

impl ProxyTransport {
    pub fn new(url: &str) -> Result<Self, TransportError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self {
            http,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl LlmTransport for ProxyTransport {
    fn name(&self) -> &'static str {
        "proxy"
    }

    fn has_credentials(&self) -> bool {
        // Credentials live on the proxy side
        true
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmReply, TransportError> {
        let body = ProxyRequest {
            key: request.algorithm_key.clone(),
            verbatim: Some(request.input.primary_text().to_string()),
            verbatims: None,
            context: match &request.input {
                AlgorithmInput::Text { .. } => None,
                other => Some(other.clone()),
            },
        };

        let response = self
            .http
            .post(&self.url)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                code: status.as_u16(),
                message,
            });
        }

        let payload: ProxyResponse = response
            .json()
            .await
            .map_err(|e| TransportError::InvalidPayload(e.to_string()))?;

        if !payload.ok {
            return Err(TransportError::InvalidPayload(
                payload.error.unwrap_or_else(|| "ok=false".to_string()),
            ));
        }

        payload
            .results
            .into_iter()
            .next()
            .map(|r| LlmReply::Classified(Box::new(r)))
            .ok_or_else(|| TransportError::InvalidPayload("empty results".to_string()))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_reasons() {
        assert_eq!(TransportError::MissingCredentials.fallback_reason(), "no-api-key");
        assert_eq!(TransportError::Timeout.fallback_reason(), "timeout");
        assert_eq!(
            TransportError::Status {
                code: 429,
                message: "Rate limit".to_string()
            }
            .fallback_reason(),
            "llm_status_429:Rate limit"
        );
        assert_eq!(
            TransportError::Network("refused".to_string()).fallback_reason(),
            "network_error:refused"
        );
        assert_eq!(
            TransportError::InvalidPayload("x".to_string()).fallback_reason(),
            "api_invalid_payload"
        );
    }

    #[test]
    fn test_direct_transport_without_key_has_no_credentials() {
        let transport = DirectTransport::new("https://api.example.com/v1/", None).unwrap();
        assert!(!transport.has_credentials());
        let blank = DirectTransport::new("https://api.example.com/v1", Some("  ".to_string())).unwrap();
        assert!(!blank.has_credentials());
        let keyed = DirectTransport::new("https://api.example.com/v1", Some("sk-test".to_string())).unwrap();
        assert!(keyed.has_credentials());
        assert_eq!(keyed.base_url, "https://api.example.com/v1");
    }

    #[tokio::test]
    async fn test_direct_transport_missing_key_fails_before_network() {
        let transport = DirectTransport::new("http://127.0.0.1:9", None).unwrap();
        let request = LlmRequest {
            algorithm_key: "llm-x".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            max_tokens: 16,
            messages: vec![ChatMessage::user("bonjour")],
            structured_labels: None,
            timeout: Duration::from_millis(100),
            input: AlgorithmInput::text("bonjour"),
        };
        assert_eq!(
            transport.complete(&request).await.unwrap_err(),
            TransportError::MissingCredentials
        );
    }

    #[test]
    fn test_response_format_lists_labels() {
        let format = DirectTransport::response_format(&["ENGAGEMENT".to_string()]);
        assert_eq!(
            format["json_schema"]["schema"]["properties"]["label"]["enum"][0],
            "ENGAGEMENT"
        );
        assert_eq!(format["json_schema"]["strict"], true);
    }

    #[test]
    fn test_proxy_request_deserializes_single_or_many() {
        let single: ProxyRequest =
            serde_json::from_str(r#"{"key":"regex-x","verbatim":"je vais voir"}"#).unwrap();
        assert_eq!(single.verbatim.as_deref(), Some("je vais voir"));
        let many: ProxyRequest =
            serde_json::from_str(r#"{"key":"regex-x","verbatims":["a","b"]}"#).unwrap();
        assert_eq!(many.verbatims.unwrap().len(), 2);
    }
}
