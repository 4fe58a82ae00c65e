use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::error::ChatError;
use crate::session::Credential;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A hosted text model: configured with a credential, asked with a single prompt.
#[allow(async_fn_in_trait)]
pub trait RemoteModel: Clone + Send + 'static {
    fn configure(&mut self, credential: Option<Credential>);
    async fn generate(&self, prompt: &str) -> Result<String, ChatError>;
}

#[derive(Debug, Serialize)]
pub struct Part {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest<'a> {
    pub contents: Vec<Content>,
    pub generation_config: &'a GenerationConfig,
}

#[derive(Debug, Deserialize)]
pub struct ResponsePart {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<ResponseContent>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub details: Vec<serde_json::Value>,
}

impl ErrorDetail {
    fn mentions_invalid_key(&self) -> bool {
        let reason_matches = self.details.iter().any(|d| {
            d.get("reason")
                .and_then(|r| r.as_str())
                .is_some_and(|r| r.starts_with("API_KEY"))
        });
        reason_matches || self.message.to_ascii_lowercase().contains("api key")
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_base: String,
    model: String,
    generation: GenerationConfig,
    credential: Option<Credential>,
}

impl GeminiClient {
    pub fn new(api_base: &str, model: &str, generation: GenerationConfig) -> anyhow::Result<Self> {
        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            model: model.to_string(),
            generation,
            credential: None,
        })
    }

    fn generate_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }
}

impl RemoteModel for GeminiClient {
    fn configure(&mut self, credential: Option<Credential>) {
        self.credential = credential;
    }

    async fn generate(&self, prompt: &str) -> Result<String, ChatError> {
        let credential = self
            .credential
            .as_ref()
            .ok_or_else(|| ChatError::Auth("no API key configured".to_string()))?;

        let body = GenerateRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: &self.generation,
        };

        let url = self.generate_url();
        tracing::info!(model = %self.model, "Sending generateContent request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", credential.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            let err = classify_failure(status, &text);
            tracing::warn!(status = status.as_u16(), error = %err, "generateContent failed");
            return Err(err);
        }

        let parsed: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| ChatError::Render(format!("could not parse response: {e}")))?;
        extract_text(parsed)
    }
}

fn transport_error(err: reqwest::Error) -> ChatError {
    if err.is_timeout() {
        ChatError::Transport(format!("request timed out: {err}"))
    } else if err.is_connect() {
        ChatError::Transport(format!("could not connect: {err}"))
    } else {
        ChatError::Transport(err.to_string())
    }
}

fn classify_failure(status: StatusCode, body: &str) -> ChatError {
    let detail = serde_json::from_str::<ErrorBody>(body).ok().map(|b| b.error);
    let message = match &detail {
        Some(d) if !d.message.is_empty() => d.message.clone(),
        _ if body.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("no error message")
            .to_string(),
        _ => body.trim().to_string(),
    };

    let invalid_key = detail.as_ref().is_some_and(ErrorDetail::mentions_invalid_key);
    let exhausted = detail
        .as_ref()
        .is_some_and(|d| d.status == "RESOURCE_EXHAUSTED");

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ChatError::Auth(message),
        StatusCode::BAD_REQUEST if invalid_key => ChatError::Auth(message),
        StatusCode::TOO_MANY_REQUESTS => ChatError::Quota(message),
        _ if exhausted => ChatError::Quota(message),
        _ => ChatError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

fn extract_text(response: GenerateResponse) -> Result<String, ChatError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ChatError::Render(format!("prompt was blocked ({reason})")));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ChatError::Render("response contained no candidates".to_string()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "UNKNOWN".to_string());
        return Err(ChatError::Render(format!(
            "response contained no text (finish reason {reason})"
        )));
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretBox;
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MODEL: &str = "gemini-test";

    fn client_for(server: &MockServer, key: Option<&str>) -> GeminiClient {
        let mut client = GeminiClient::new(
            &format!("{}/v1beta/", server.uri()),
            MODEL,
            GenerationConfig::default(),
        )
        .unwrap();
        client.configure(key.map(|k| Arc::new(SecretBox::new(Box::new(k.to_string())))));
        client
    }

    fn generate_path() -> String {
        format!("/v1beta/models/{MODEL}:generateContent")
    }

    fn error_json(code: u16, status: &str, message: &str) -> serde_json::Value {
        serde_json::json!({
            "error": { "code": code, "message": message, "status": status }
        })
    }

    #[tokio::test]
    async fn returns_concatenated_candidate_text() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(generate_path()))
            .and(header("x-goog-api-key", "key-123"))
            .and(body_partial_json(serde_json::json!({
                "contents": [{ "role": "user", "parts": [{ "text": "hello" }] }],
                "generationConfig": { "topK": 40, "maxOutputTokens": 8192, "responseMimeType": "text/plain" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": { "role": "model", "parts": [{ "text": "I am " }, { "text": "your guide." }] },
                    "finishReason": "STOP"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = client_for(&server, Some("key-123")).generate("hello").await.unwrap();
        assert_eq!(text, "I am your guide.");
    }

    #[tokio::test]
    async fn missing_key_fails_without_request() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = client_for(&server, None).generate("hello").await.unwrap_err();
        assert!(matches!(err, ChatError::Auth(_)));
    }

    #[tokio::test]
    async fn invalid_key_maps_to_auth() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(generate_path()))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {
                    "code": 400,
                    "message": "API key not valid. Please pass a valid API key.",
                    "status": "INVALID_ARGUMENT",
                    "details": [{ "reason": "API_KEY_INVALID" }]
                }
            })))
            .mount(&server)
            .await;

        let err = client_for(&server, Some("bad")).generate("hello").await.unwrap_err();
        assert_eq!(
            err,
            ChatError::Auth("API key not valid. Please pass a valid API key.".to_string())
        );
    }

    #[tokio::test]
    async fn forbidden_maps_to_auth() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_json(error_json(403, "PERMISSION_DENIED", "permission denied")),
            )
            .mount(&server)
            .await;

        let err = client_for(&server, Some("k")).generate("hello").await.unwrap_err();
        assert!(matches!(err, ChatError::Auth(_)));
    }

    #[tokio::test]
    async fn rate_limit_maps_to_quota() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_json(error_json(429, "RESOURCE_EXHAUSTED", "quota exceeded")),
            )
            .mount(&server)
            .await;

        let err = client_for(&server, Some("k")).generate("hello").await.unwrap_err();
        assert_eq!(err, ChatError::Quota("quota exceeded".to_string()));
    }

    #[tokio::test]
    async fn server_error_maps_to_api_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let err = client_for(&server, Some("k")).generate("hello").await.unwrap_err();
        assert_eq!(
            err,
            ChatError::Api {
                status: 503,
                message: "upstream down".to_string()
            }
        );
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_error() {
        // Grab a free port and release it so nothing is listening there.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut client = GeminiClient::new(
            &format!("http://127.0.0.1:{port}/v1beta"),
            MODEL,
            GenerationConfig::default(),
        )
        .unwrap();
        client.configure(Some(Arc::new(SecretBox::new(Box::new("k".to_string())))));

        let err = client.generate("hello").await.unwrap_err();
        assert!(matches!(err, ChatError::Transport(_)), "{err:?}");
    }

    #[tokio::test]
    async fn blocked_prompt_is_render_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "promptFeedback": { "blockReason": "SAFETY" }
            })))
            .mount(&server)
            .await;

        let err = client_for(&server, Some("k")).generate("hello").await.unwrap_err();
        assert_eq!(err, ChatError::Render("prompt was blocked (SAFETY)".to_string()));
    }

    #[tokio::test]
    async fn garbage_body_is_render_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server, Some("k")).generate("hello").await.unwrap_err();
        assert!(matches!(err, ChatError::Render(_)));
    }

    #[test]
    fn empty_candidate_reports_finish_reason() {
        let response: GenerateResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{ "finishReason": "MAX_TOKENS" }]
        }))
        .unwrap();
        let err = extract_text(response).unwrap_err();
        assert_eq!(
            err,
            ChatError::Render("response contained no text (finish reason MAX_TOKENS)".to_string())
        );
    }
}
