//! Completion service: the LLM behind every generating stage.
//!
//! Stages talk to [`CompletionService`] through an [`Llm`] handle that
//! carries the model settings, so the HTTP client can be swapped for a
//! scripted double in tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use papermill_shared::{OpenRouterConfig, PapermillError, Result, read_env_secret};

/// User-Agent string for completion requests.
const USER_AGENT: &str = concat!("papermill/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Request / response
// ---------------------------------------------------------------------------

/// What a prompt is for. Used for logging and by test doubles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    SearchQuery,
    SourceSelection,
    Outline,
    Content,
    TableOfContents,
    Chapter,
    Introduction,
    Conclusion,
    Bibliography,
}

impl PromptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SearchQuery => "search_query",
            Self::SourceSelection => "source_selection",
            Self::Outline => "outline",
            Self::Content => "content",
            Self::TableOfContents => "table_of_contents",
            Self::Chapter => "chapter",
            Self::Introduction => "introduction",
            Self::Conclusion => "conclusion",
            Self::Bibliography => "bibliography",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub kind: PromptKind,
    pub model: String,
    pub prompt: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Default)]
pub struct CompletionResponse {
    pub text: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub latency_ms: u64,
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Llm handle
// ---------------------------------------------------------------------------

/// A completion service bound to model settings.
#[derive(Clone)]
pub struct Llm {
    service: Arc<dyn CompletionService>,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Llm {
    pub fn new(service: Arc<dyn CompletionService>, config: &OpenRouterConfig) -> Self {
        Self {
            service,
            model: config.default_model.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Send `prompt` with an output cap, never above the configured maximum.
    pub async fn ask_with_limit(
        &self,
        kind: PromptKind,
        prompt: &str,
        max_output_tokens: u32,
    ) -> Result<CompletionResponse> {
        let request = CompletionRequest {
            kind,
            model: self.model.clone(),
            prompt: prompt.to_string(),
            max_output_tokens: max_output_tokens.min(self.max_output_tokens).max(1),
            temperature: self.temperature,
        };
        let response = self.service.complete(request).await?;
        if response.text.trim().is_empty() {
            return Err(PapermillError::Completion(format!(
                "{} returned an empty answer for {}",
                self.service.name(),
                kind.as_str()
            )));
        }
        debug!(
            kind = kind.as_str(),
            tokens_in = response.tokens_in,
            tokens_out = response.tokens_out,
            "completion received"
        );
        Ok(response)
    }
}

impl std::fmt::Debug for Llm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Llm")
            .field("service", &self.service.name())
            .field("model", &self.model)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// OpenRouter client
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// OpenAI-compatible chat-completions client for OpenRouter.
pub struct OpenRouterClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenRouterClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| PapermillError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Build a client from the `[openrouter]` section, reading the key from
    /// the environment.
    pub fn from_config(config: &OpenRouterConfig) -> Result<Self> {
        let api_key = read_env_secret(&config.api_key_env, "OpenRouter")?;
        Self::new(
            &config.base_url,
            &api_key,
            Duration::from_secs(config.request_timeout_secs),
        )
    }
}

#[async_trait]
impl CompletionService for OpenRouterClient {
    #[instrument(skip_all, fields(kind = request.kind.as_str(), model = %request.model))]
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &request.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
            max_tokens: request.max_output_tokens,
        };

        let start = Instant::now();
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PapermillError::Completion(format!("request timed out: {e}"))
                } else {
                    PapermillError::Network(format!("completion request: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PapermillError::Completion(format!(
                "HTTP {status}: {}",
                text.chars().take(300).collect::<String>()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| PapermillError::parse(format!("completion response: {e}")))?;

        let text = parsed
            .choices
            .into_iter()
            .find_map(|c| c.message.and_then(|m| m.content))
            .ok_or_else(|| PapermillError::Completion("no content in response".into()))?;
        let (tokens_in, tokens_out) = parsed
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();
        let latency_ms = start.elapsed().as_millis() as u64;

        info!(tokens_in, tokens_out, latency_ms, "completion finished");

        Ok(CompletionResponse {
            text,
            tokens_in,
            tokens_out,
            latency_ms,
        })
    }

    fn name(&self) -> &str {
        "openrouter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedCompletion;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(prompt: &str) -> CompletionRequest {
        CompletionRequest {
            kind: PromptKind::Outline,
            model: "test/model".into(),
            prompt: prompt.into(),
            max_output_tokens: 100,
            temperature: 0.5,
        }
    }

    #[tokio::test]
    async fn openrouter_parses_text_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({ "model": "test/model", "max_tokens": 100 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "## One\n## Two" } }],
                "usage": { "prompt_tokens": 42, "completion_tokens": 7 }
            })))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(&server.uri(), "sk-test", Duration::from_secs(5))
            .unwrap();
        let response = client.complete(request("outline please")).await.unwrap();
        assert_eq!(response.text, "## One\n## Two");
        assert_eq!(response.tokens_in, 42);
        assert_eq!(response.tokens_out, 7);
    }

    #[tokio::test]
    async fn openrouter_error_status_is_completion_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(&server.uri(), "k", Duration::from_secs(5)).unwrap();
        let err = client.complete(request("x")).await.unwrap_err();
        assert!(matches!(err, PapermillError::Completion(msg) if msg.contains("429")));
    }

    #[tokio::test]
    async fn stalled_completion_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(500))
                    .set_body_json(json!({ "choices": [] })),
            )
            .mount(&server)
            .await;

        let client =
            OpenRouterClient::new(&server.uri(), "k", Duration::from_millis(100)).unwrap();
        let err = client.complete(request("x")).await.unwrap_err();
        assert!(matches!(err, PapermillError::Completion(msg) if msg.contains("timed out")));
    }

    #[tokio::test]
    async fn llm_caps_output_and_rejects_blank_answers() {
        let scripted = Arc::new(ScriptedCompletion::new());
        scripted.reply(PromptKind::SearchQuery, "   ");
        let llm = Llm {
            service: scripted.clone(),
            model: "m".into(),
            temperature: 0.1,
            max_output_tokens: 50,
        };

        let err = llm
            .ask_with_limit(PromptKind::SearchQuery, "q", 10_000)
            .await
            .unwrap_err();
        assert!(matches!(err, PapermillError::Completion(_)));
        assert_eq!(scripted.requests()[0].max_output_tokens, 50);
    }
}
