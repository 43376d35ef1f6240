//! LLM provider clients
//!
//! Every backend exposes the same capability: send one prompt, get text back.
//! The backend is picked once, from whichever API key is available, and stays
//! fixed for the life of the process.

use crate::agent::error::{AgentError, AgentResult, ProviderError};
use crate::config::{AgentConfig, BackendKind};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Trait for LLM providers
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Complete a single prompt
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Get provider name
    fn name(&self) -> &str;

    /// `false` only for the placeholder used when no credential is available
    fn is_configured(&self) -> bool {
        true
    }
}

/// API keys available to the process
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub google: Option<String>,
    pub openai: Option<String>,
    pub anthropic: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("google", &self.google.is_some())
            .field("openai", &self.openai.is_some())
            .field("anthropic", &self.anthropic.is_some())
            .finish()
    }
}

impl Credentials {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            google: config.api_key(BackendKind::Google),
            openai: config.api_key(BackendKind::OpenAI),
            anthropic: config.api_key(BackendKind::Anthropic),
        }
    }

    pub fn get(&self, kind: BackendKind) -> Option<&str> {
        match kind {
            BackendKind::Google => self.google.as_deref(),
            BackendKind::OpenAI => self.openai.as_deref(),
            BackendKind::Anthropic => self.anthropic.as_deref(),
        }
    }
}

/// Pick the first backend, in selection order, that has a credential.
pub fn select_backend(credentials: &Credentials) -> Option<BackendKind> {
    BackendKind::SELECTION_ORDER
        .into_iter()
        .find(|kind| credentials.get(*kind).is_some())
}

/// Sampling parameters shared by all backends
#[derive(Debug, Clone, Copy)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
}

impl GenerationSettings {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_seconds: config.timeout_seconds,
        }
    }
}

fn http_client(settings: &GenerationSettings) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(Duration::from_secs(settings.timeout_seconds))
        .build()
        .map_err(|e| ProviderError::Network(format!("Failed to create HTTP client: {e}")))
}

/// Send a request and decode a JSON body, mapping every failure to `ProviderError`.
async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    provider: &'static str,
    timeout_seconds: u64,
) -> Result<T, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::from_reqwest(e, timeout_seconds))?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ProviderError::Api {
            provider,
            status_code: status.as_u16(),
            message: error_text,
        });
    }

    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::from_reqwest(e, timeout_seconds))?;
    Ok(serde_json::from_str(&body)?)
}

fn non_empty(text: String, provider: &str) -> Result<String, ProviderError> {
    let text = text.trim();
    if text.is_empty() {
        Err(ProviderError::InvalidResponse(format!(
            "No content in {provider} response"
        )))
    } else {
        Ok(text.to_string())
    }
}

/// Google Gemini provider
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    settings: GenerationSettings,
}

impl GeminiProvider {
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        settings: GenerationSettings,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(&settings)?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            settings,
        })
    }
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let request_body = GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: self.settings.temperature,
                max_output_tokens: self.settings.max_tokens,
            },
        };

        debug!(
            "Calling Gemini API with model: {}, prompt length: {} chars",
            self.model,
            prompt.len()
        );

        let request = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body);
        let response: GeminiResponse =
            send_json(request, "Gemini", self.settings.timeout_seconds).await?;

        let text = response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default();

        non_empty(text, "Gemini")
    }

    fn name(&self) -> &str {
        "Google Gemini"
    }
}

// Gemini API types
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

/// OpenAI chat completions provider
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    settings: GenerationSettings,
}

impl OpenAiProvider {
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        settings: GenerationSettings,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(&settings)?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            settings,
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let request_body = OpenAiRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        debug!(
            "Calling OpenAI API with model: {}, max_tokens: {}, temperature: {}",
            self.model, self.settings.max_tokens, self.settings.temperature
        );

        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request_body);
        let response: OpenAiResponse =
            send_json(request, "OpenAI", self.settings.timeout_seconds).await?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        non_empty(text, "OpenAI")
    }

    fn name(&self) -> &str {
        "OpenAI"
    }
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

/// Anthropic Claude provider
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    settings: GenerationSettings,
}

impl AnthropicProvider {
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        settings: GenerationSettings,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(&settings)?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            settings,
        })
    }
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);

        let request_body = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        debug!(
            "Calling Anthropic API with model: {}, max_tokens: {}, temperature: {}",
            self.model, self.settings.max_tokens, self.settings.temperature
        );

        let request = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request_body);
        let response: AnthropicResponse =
            send_json(request, "Anthropic", self.settings.timeout_seconds).await?;

        let text = response
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<String>();

        non_empty(text, "Anthropic")
    }

    fn name(&self) -> &str {
        "Anthropic Claude"
    }
}

// Anthropic API types
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

/// Stand-in used when no credential is available; every call fails.
pub struct UnconfiguredProvider;

#[async_trait]
impl CompletionProvider for UnconfiguredProvider {
    async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
        Err(ProviderError::NotConfigured)
    }

    fn name(&self) -> &str {
        "unconfigured"
    }

    fn is_configured(&self) -> bool {
        false
    }
}

/// Create the provider for this process.
///
/// A backend forced in the config must have its key; otherwise the first
/// backend with a credential wins, and no credential at all yields
/// [`UnconfiguredProvider`].
pub fn create_provider(config: &AgentConfig) -> AgentResult<Box<dyn CompletionProvider>> {
    create_provider_with(config, &Credentials::from_config(config))
}

pub fn create_provider_with(
    config: &AgentConfig,
    credentials: &Credentials,
) -> AgentResult<Box<dyn CompletionProvider>> {
    let kind = match config.provider {
        Some(forced) => {
            if credentials.get(forced).is_none() {
                return Err(AgentError::Configuration(format!(
                    "provider '{forced}' selected but {} is not set",
                    forced.env_var()
                )));
            }
            Some(forced)
        }
        None => select_backend(credentials),
    };

    let Some(kind) = kind else {
        warn!("No LLM API key found; provider is unconfigured");
        return Ok(Box::new(UnconfiguredProvider));
    };

    let api_key = credentials.get(kind).unwrap_or_default().to_string();
    let settings = GenerationSettings::from_config(config);

    let provider: Box<dyn CompletionProvider> = match kind {
        BackendKind::Google => Box::new(GeminiProvider::new(
            api_key,
            config.google_base_url.clone(),
            config.google_model.clone(),
            settings,
        )?),
        BackendKind::OpenAI => Box::new(OpenAiProvider::new(
            api_key,
            config.openai_base_url.clone(),
            config.openai_model.clone(),
            settings,
        )?),
        BackendKind::Anthropic => Box::new(AnthropicProvider::new(
            api_key,
            config.anthropic_base_url.clone(),
            config.anthropic_model.clone(),
            settings,
        )?),
    };

    info!("Using LLM provider: {}", provider.name());
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    fn creds(google: bool, openai: bool, anthropic: bool) -> Credentials {
        let key = |present: bool, value: &str| present.then(|| value.to_string());
        Credentials {
            google: key(google, "g-key"),
            openai: key(openai, "o-key"),
            anthropic: key(anthropic, "a-key"),
        }
    }

    #[rstest]
    #[case(creds(true, true, true), Some(BackendKind::Google))]
    #[case(creds(false, true, true), Some(BackendKind::OpenAI))]
    #[case(creds(false, false, true), Some(BackendKind::Anthropic))]
    #[case(creds(true, false, true), Some(BackendKind::Google))]
    #[case(creds(false, false, false), None)]
    fn test_select_backend(#[case] credentials: Credentials, #[case] expected: Option<BackendKind>) {
        assert_eq!(select_backend(&credentials), expected);
    }

    #[tokio::test]
    async fn test_unconfigured_provider_fails_immediately() {
        let provider = create_provider_with(&AgentConfig::default(), &Credentials::default()).unwrap();
        assert!(!provider.is_configured());

        let err = provider.complete("anything").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured));
        assert!(err.to_string().starts_with("LLM Error"));
    }

    #[tokio::test]
    async fn test_forced_provider_requires_key() {
        let config = AgentConfig {
            provider: Some(BackendKind::Anthropic),
            ..AgentConfig::default()
        };
        let result = create_provider_with(&config, &creds(true, false, false));
        assert!(matches!(result, Err(AgentError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_forced_provider_overrides_selection_order() {
        let config = AgentConfig {
            provider: Some(BackendKind::OpenAI),
            ..AgentConfig::default()
        };
        let provider = create_provider_with(&config, &creds(true, true, false)).unwrap();
        assert_eq!(provider.name(), "OpenAI");
        assert!(provider.is_configured());
    }

    #[test]
    fn test_credentials_debug_hides_keys() {
        let debug = format!("{:?}", creds(true, false, false));
        assert!(!debug.contains("g-key"));
        assert!(debug.contains("google: true"));
    }

    /// Serve one canned HTTP response and hand back the raw request.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&received);
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if received.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }

            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            let _ = tx.send(String::from_utf8_lossy(&received).to_string());
        });

        (base_url, rx)
    }

    fn settings() -> GenerationSettings {
        GenerationSettings {
            temperature: 0.0,
            max_tokens: 256,
            timeout_seconds: 5,
        }
    }

    #[tokio::test]
    async fn test_openai_complete() {
        let (base_url, request) = serve_once(
            "200 OK",
            r#"{"choices":[{"message":{"role":"assistant","content":"  SELECT COUNT(*) FROM tracks  "}}]}"#,
        )
        .await;

        let provider =
            OpenAiProvider::new("o-key".to_string(), base_url, "gpt-4o".to_string(), settings()).unwrap();
        let text = provider.complete("How many tracks?").await.unwrap();
        assert_eq!(text, "SELECT COUNT(*) FROM tracks");

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /chat/completions"));
        assert!(request.to_lowercase().contains("authorization: bearer o-key"));
        assert!(request.contains("How many tracks?"));
    }

    #[tokio::test]
    async fn test_gemini_complete_joins_parts() {
        let (base_url, request) = serve_once(
            "200 OK",
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"There are "},{"text":"5 tracks."}]}}]}"#,
        )
        .await;

        let provider = GeminiProvider::new(
            "g-key".to_string(),
            base_url,
            "gemini-2.5-flash".to_string(),
            settings(),
        )
        .unwrap();
        let text = provider.complete("Explain").await.unwrap();
        assert_eq!(text, "There are 5 tracks.");

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /v1beta/models/gemini-2.5-flash:generateContent"));
        assert!(request.contains("maxOutputTokens"));
    }

    #[tokio::test]
    async fn test_anthropic_complete() {
        let (base_url, request) =
            serve_once("200 OK", r#"{"content":[{"type":"text","text":"SELECT 1"}]}"#).await;

        let provider = AnthropicProvider::new(
            "a-key".to_string(),
            base_url,
            "claude-sonnet-4-5-20250929".to_string(),
            settings(),
        )
        .unwrap();
        assert_eq!(provider.complete("q").await.unwrap(), "SELECT 1");

        let request = request.await.unwrap().to_lowercase();
        assert!(request.contains("x-api-key: a-key"));
        assert!(request.contains("anthropic-version: 2023-06-01"));
    }

    #[tokio::test]
    async fn test_api_error_status() {
        let (base_url, _request) =
            serve_once("429 Too Many Requests", r#"{"error":{"message":"quota exceeded"}}"#).await;

        let provider =
            OpenAiProvider::new("o-key".to_string(), base_url, "gpt-4o".to_string(), settings()).unwrap();
        let err = provider.complete("q").await.unwrap_err();
        match &err {
            ProviderError::Api {
                status_code,
                message,
                ..
            } => {
                assert_eq!(*status_code, 429);
                assert!(message.contains("quota exceeded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().starts_with("LLM Error: OpenAI returned 429"));
    }

    #[tokio::test]
    async fn test_empty_content_is_invalid() {
        let (base_url, _request) = serve_once("200 OK", r#"{"choices":[]}"#).await;

        let provider =
            OpenAiProvider::new("o-key".to_string(), base_url, "gpt-4o".to_string(), settings()).unwrap();
        let err = provider.complete("q").await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid() {
        let (base_url, _request) = serve_once("200 OK", "not json").await;

        let provider = AnthropicProvider::new(
            "a-key".to_string(),
            base_url,
            "claude".to_string(),
            settings(),
        )
        .unwrap();
        let err = provider.complete("q").await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let provider =
            OpenAiProvider::new("o-key".to_string(), base_url, "gpt-4o".to_string(), settings()).unwrap();
        let err = provider.complete("q").await.unwrap_err();
        assert!(matches!(err, ProviderError::Network(_)));
    }
}
