//! Provider for models served by a local Ollama instance.
use crate::completion::{
    CancellationToken, ChatMessage, Completion, CompletionMetrics, CompletionModel,
    CompletionResponse, CompletionStream, GenerationError,
};
use crate::config::{ConfigError, GenerationProfile};
use crate::model::{ModelConfig, ModelMetrics};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

// Bounds the wait for an unreachable host; generation itself has no deadline.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct OllamaSettings {
    host: String,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_OLLAMA_HOST.to_string(),
        }
    }
}

/// One line of the newline-delimited JSON reply stream. The final line
/// carries `done` plus token counts and durations.
#[derive(Debug, Deserialize)]
struct OllamaChunk {
    message: Option<OllamaChunkMessage>,
    response: Option<String>,
    error: Option<String>,
    #[serde(default)]
    done: bool,
    done_reason: Option<String>,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
    prompt_eval_duration: Option<u64>,
    eval_duration: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OllamaChunkMessage {
    content: String,
}

/// Reply text tagged with the endpoint shape it arrived in. The chat
/// endpoint nests text under `message.content`, the generate endpoint
/// sends a bare `response`; `text()` collapses both to one canonical
/// string here, so nothing downstream sees the difference.
#[derive(Debug, PartialEq)]
enum ReplyPayload<'a> {
    Chat(&'a str),
    Generate(&'a str),
    Empty,
}

impl ReplyPayload<'_> {
    fn text(&self) -> Option<&str> {
        match self {
            ReplyPayload::Chat(text) | ReplyPayload::Generate(text) => Some(text),
            ReplyPayload::Empty => None,
        }
    }
}

fn ns_to_ms(ns: u64) -> f32 {
    ns as f32 / 1_000_000.0
}

impl OllamaChunk {
    fn payload(&self) -> ReplyPayload<'_> {
        if let Some(message) = &self.message {
            ReplyPayload::Chat(&message.content)
        } else if let Some(response) = &self.response {
            ReplyPayload::Generate(response)
        } else {
            ReplyPayload::Empty
        }
    }

    fn metrics(&self) -> CompletionMetrics {
        CompletionMetrics {
            prompt_tokens: self.prompt_eval_count.unwrap_or(0),
            completion_tokens: self.eval_count.unwrap_or(0),
            prompt_eval_latency_ms: self.prompt_eval_duration.map(ns_to_ms).unwrap_or(0.0),
            completion_latency_ms: self.eval_duration.map(ns_to_ms).unwrap_or(0.0),
        }
    }
}

#[derive(Debug)]
pub struct OllamaModel {
    config: ModelConfig,
    settings: OllamaSettings,
    client: reqwest::Client,
    metrics: ModelMetrics,
}

impl OllamaModel {
    pub fn new(model_config: ModelConfig) -> Result<Self, ConfigError> {
        let settings: OllamaSettings =
            serde_yaml::from_value(serde_yaml::to_value(&model_config.settings)?)?;

        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            config: model_config,
            settings,
            client,
            metrics: ModelMetrics {
                init_latency_ms: 0.0,
            },
        })
    }

    fn request_body(&self, messages: &[ChatMessage], profile: &GenerationProfile) -> serde_json::Value {
        json!({
            "model": self.config.name,
            "messages": messages,
            "stream": true,
            "options": {
                "temperature": profile.temperature,
                "num_predict": profile.max_tokens,
            },
        })
    }
}

#[async_trait]
impl CompletionModel for OllamaModel {
    fn metrics(&self) -> ModelMetrics {
        self.metrics.clone()
    }

    async fn complete(
        &mut self,
        messages: &[ChatMessage],
        profile: &GenerationProfile,
        cancel_token: CancellationToken,
    ) -> CompletionStream<'_> {
        let url = format!("{}/api/chat", self.settings.host.trim_end_matches('/'));
        let body = self.request_body(messages, &profile.clamped());
        let request = self.client.post(&url).json(&body);

        let stream = async_stream::stream! {
            let response = match request.send().await {
                Ok(response) => response,
                Err(err) => {
                    yield Err(GenerationError::Request(err.to_string()));
                    return;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                yield Err(GenerationError::Api {
                    status: status.as_u16(),
                    message,
                });
                return;
            }

            let mut bytes = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();

            'read: while let Some(next) = bytes.next().await {
                if cancel_token.is_cancelled() {
                    yield Err(GenerationError::Cancelled);
                    break;
                }

                let chunk = match next {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        yield Err(GenerationError::Request(err.to_string()));
                        break;
                    }
                };
                buffer.extend_from_slice(&chunk);

                // One JSON document per line; a chunk may carry several.
                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line);
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    let parsed = match serde_json::from_str::<OllamaChunk>(line) {
                        Ok(parsed) => parsed,
                        Err(err) => {
                            yield Err(GenerationError::Decode(err.to_string()));
                            break 'read;
                        }
                    };

                    if let Some(error) = parsed.error {
                        yield Err(GenerationError::Api {
                            status: status.as_u16(),
                            message: error,
                        });
                        break 'read;
                    }

                    if let Some(text) = parsed.payload().text() {
                        yield Ok(Completion::Response(CompletionResponse {
                            text: text.to_string(),
                            finish_reason: parsed.done_reason.clone(),
                            raw_chunk: Some(line.to_string()),
                        }));
                    }

                    if parsed.done {
                        yield Ok(Completion::Metrics(parsed.metrics()));
                        break 'read;
                    }
                }
            }
        };

        Box::pin(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::Role;
    use crate::model::ModelProvider;
    use serde_json::json;
    use std::collections::HashMap;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, method, path},
    };

    fn mock_model_config(host: &str) -> ModelConfig {
        ModelConfig {
            name: "mistral".to_string(),
            label: None,
            provider: ModelProvider::Ollama,
            settings: HashMap::from([("host".to_string(), host.into())]),
        }
    }

    fn mock_chat_stream_body() -> String {
        let lines = vec![
            json!({"message": {"role": "assistant", "content": "Par"}, "done": false}),
            json!({"message": {"role": "assistant", "content": "is."}, "done": false}),
            json!({
                "message": {"role": "assistant", "content": ""},
                "done": true,
                "done_reason": "stop",
                "prompt_eval_count": 12,
                "eval_count": 4,
                "prompt_eval_duration": 80_000_000u64,
                "eval_duration": 250_000_000u64
            }),
        ];
        lines
            .into_iter()
            .map(|line| format!("{line}\n"))
            .collect()
    }

    #[test]
    fn test_settings_default_host() {
        let mut config = mock_model_config(DEFAULT_OLLAMA_HOST);
        config.settings.clear();
        let model = OllamaModel::new(config).unwrap();
        assert_eq!(model.settings.host, DEFAULT_OLLAMA_HOST);
    }

    #[test]
    fn test_chunk_normalization_accepts_both_shapes() {
        let chat: OllamaChunk =
            serde_json::from_str(r#"{"message":{"role":"assistant","content":"Paris."}}"#).unwrap();
        assert_eq!(chat.payload(), ReplyPayload::Chat("Paris."));
        assert_eq!(chat.payload().text(), Some("Paris."));

        let generate: OllamaChunk = serde_json::from_str(r#"{"response":"Paris."}"#).unwrap();
        assert_eq!(generate.payload(), ReplyPayload::Generate("Paris."));
        assert_eq!(generate.payload().text(), Some("Paris."));

        let done: OllamaChunk =
            serde_json::from_str(r#"{"done":true,"prompt_eval_count":7,"eval_count":3}"#).unwrap();
        assert_eq!(done.payload(), ReplyPayload::Empty);
        assert!(done.done);
        assert_eq!(done.metrics().prompt_tokens, 7);
        assert_eq!(done.metrics().completion_tokens, 3);
    }

    #[tokio::test]
    async fn test_complete_streams_chunks_and_metrics() {
        let server = MockServer::start().await;

        let mock_response = ResponseTemplate::new(200)
            .set_body_raw(mock_chat_stream_body(), "application/x-ndjson");
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({
                "model": "mistral",
                "stream": true,
                "options": {"num_predict": 150}
            })))
            .respond_with(mock_response)
            .mount(&server)
            .await;

        let mut model = OllamaModel::new(mock_model_config(&server.uri())).unwrap();
        let messages = vec![ChatMessage::new(Role::User, "What is the capital of France?")];
        let mut stream = model
            .complete(
                &messages,
                &GenerationProfile::default(),
                CancellationToken::new(),
            )
            .await;

        let mut text = String::new();
        let mut finish_reason = None;
        let mut metrics = CompletionMetrics::default();
        while let Some(result) = stream.next().await {
            match result.unwrap() {
                Completion::Response(response) => {
                    text.push_str(&response.text);
                    if response.finish_reason.is_some() {
                        finish_reason = response.finish_reason;
                    }
                }
                Completion::Metrics(m) => metrics = m,
            }
        }

        assert_eq!(text, "Paris.");
        assert_eq!(finish_reason.as_deref(), Some("stop"));
        assert_eq!(metrics.prompt_tokens, 12);
        assert_eq!(metrics.completion_tokens, 4);
        assert!(metrics.completion_latency_ms > 0.0);
    }

    #[tokio::test]
    async fn test_complete_surfaces_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model 'mistral' not found"))
            .mount(&server)
            .await;

        let mut model = OllamaModel::new(mock_model_config(&server.uri())).unwrap();
        let messages = vec![ChatMessage::new(Role::User, "hello")];
        let mut stream = model
            .complete(
                &messages,
                &GenerationProfile::default(),
                CancellationToken::new(),
            )
            .await;

        let err = stream.next().await.unwrap().unwrap_err();
        match err {
            GenerationError::Api { status, message } => {
                assert_eq!(status, 404);
                assert!(message.contains("not found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_complete_surfaces_in_stream_error_object() {
        let server = MockServer::start().await;
        let body = format!("{}\n", json!({"error": "model runner has stopped"}));
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
            .mount(&server)
            .await;

        let mut model = OllamaModel::new(mock_model_config(&server.uri())).unwrap();
        let messages = vec![ChatMessage::new(Role::User, "hello")];
        let mut stream = model
            .complete(
                &messages,
                &GenerationProfile::default(),
                CancellationToken::new(),
            )
            .await;

        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, GenerationError::Api { message, .. } if message.contains("stopped")));
    }

    #[tokio::test]
    async fn test_out_of_range_profile_is_clamped_before_dispatch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({
                "options": {"temperature": 1.0, "num_predict": 300}
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(mock_chat_stream_body(), "application/x-ndjson"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut model = OllamaModel::new(mock_model_config(&server.uri())).unwrap();
        let messages = vec![ChatMessage::new(Role::User, "hello")];
        let profile = GenerationProfile {
            temperature: 3.0,
            max_tokens: 5000,
        };
        let mut stream = model
            .complete(&messages, &profile, CancellationToken::new())
            .await;
        while let Some(result) = stream.next().await {
            result.unwrap();
        }
    }
}
