//! Provider for remotely hosted Hugging Face inference endpoints.
//!
//! The endpoints are reached through the OpenAI-compatible chat router, so
//! this adapter formats conversation turns as chat-completion messages and
//! streams the reply back.
use crate::completion::{
    CancellationToken, ChatMessage, Completion, CompletionMetrics, CompletionModel,
    CompletionResponse, CompletionStream, GenerationError, Role,
};
use crate::config::{ConfigError, GenerationProfile};
use crate::model::{ModelConfig, ModelMetrics};
use async_openai::config::OpenAIConfig;
use async_openai::{
    Client as OpenAIClient,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionStreamOptions, CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use futures::stream::StreamExt;
use serde::Deserialize;
use std::time::Instant;

pub const DEFAULT_ROUTER_ENDPOINT: &str = "https://router.huggingface.co/v1";

fn default_endpoint() -> String {
    DEFAULT_ROUTER_ENDPOINT.to_string()
}

#[derive(Debug, Clone, Deserialize)]
struct HuggingFaceSettings {
    #[serde(default = "default_endpoint")]
    endpoint: String,
    api_key: String,
}

#[derive(Debug)]
pub struct HuggingFaceModel {
    config: ModelConfig,
    client: OpenAIClient<OpenAIConfig>,
    metrics: ModelMetrics,
}

impl HuggingFaceModel {
    pub fn new(model_config: ModelConfig) -> Result<Self, ConfigError> {
        let settings: HuggingFaceSettings =
            serde_yaml::from_value(serde_yaml::to_value(&model_config.settings)?)?;

        // An `api_key` of the form "env:NAME" defers the credential to the
        // process environment; a missing variable is fatal here, before any
        // generation is attempted.
        let api_key = if let Some(env_key) = settings.api_key.strip_prefix("env:") {
            let env_key = env_key.trim();
            std::env::var(env_key).map_err(|_| {
                ConfigError::Credential(format!("Environment variable {env_key} is not set"))
            })?
        } else {
            settings.api_key.clone()
        };

        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(settings.endpoint.clone());

        Ok(Self {
            config: model_config,
            client: OpenAIClient::with_config(openai_config),
            metrics: ModelMetrics {
                init_latency_ms: 0.0,
            },
        })
    }

    fn to_request_message(msg: &ChatMessage) -> ChatCompletionRequestMessage {
        match msg.role {
            Role::System => ChatCompletionRequestMessage::System(
                async_openai::types::chat::ChatCompletionRequestSystemMessageArgs::default()
                    .content(msg.content.as_str())
                    .build()
                    .unwrap(),
            ),
            Role::Assistant => ChatCompletionRequestMessage::Assistant(
                async_openai::types::chat::ChatCompletionRequestAssistantMessageArgs::default()
                    .content(msg.content.as_str())
                    .build()
                    .unwrap(),
            ),
            Role::User => ChatCompletionRequestMessage::User(
                async_openai::types::chat::ChatCompletionRequestUserMessageArgs::default()
                    .content(msg.content.as_str())
                    .build()
                    .unwrap(),
            ),
        }
    }
}

#[async_trait]
impl CompletionModel for HuggingFaceModel {
    fn metrics(&self) -> ModelMetrics {
        self.metrics.clone()
    }

    async fn complete(
        &mut self,
        messages: &[ChatMessage],
        profile: &GenerationProfile,
        cancel_token: CancellationToken,
    ) -> CompletionStream<'_> {
        let request_messages: Vec<ChatCompletionRequestMessage> = messages
            .iter()
            .map(HuggingFaceModel::to_request_message)
            .collect();

        let profile = profile.clamped();
        let request = CreateChatCompletionRequestArgs::default()
            .model(self.config.name.clone())
            .messages(request_messages)
            .max_tokens(profile.max_tokens)
            .temperature(profile.temperature)
            .stream(true)
            .stream_options(ChatCompletionStreamOptions {
                include_usage: Some(true),
                include_obfuscation: None,
            })
            .build();

        let request = match request {
            Ok(request) => request,
            Err(err) => {
                return Box::pin(futures::stream::once(async move {
                    Err(GenerationError::Request(format!("Invalid request: {err}")))
                }));
            }
        };

        let start_time = Instant::now();

        let outer_stream = async_stream::stream! {
            let mut first_token_ms = 0.0f32;

            match self.client.chat().create_stream(request).await {
                Ok(mut stream) => {
                    while let Some(next) = stream.next().await {
                        // Check for cancellation *before* processing the chunk
                        if cancel_token.is_cancelled() {
                            yield Err(GenerationError::Cancelled);
                            break;
                        }

                        match next {
                            Ok(chunk) => {
                                let raw_json =
                                    serde_json::to_string(&chunk).unwrap_or_default();

                                if let Some(choice) = chunk.choices.first() {
                                    if first_token_ms == 0.0 {
                                        first_token_ms =
                                            start_time.elapsed().as_millis() as f32;
                                    }
                                    let text =
                                        choice.delta.content.clone().unwrap_or_default();
                                    yield Ok(Completion::Response(CompletionResponse {
                                        text,
                                        finish_reason: choice
                                            .finish_reason
                                            .as_ref()
                                            .map(|reason| format!("{reason:?}")),
                                        raw_chunk: Some(raw_json.clone()),
                                    }));
                                }

                                // Some servers club usage with the final
                                // response, others send a separate chunk.
                                if let Some(usage) = chunk.usage {
                                    let total_ms =
                                        start_time.elapsed().as_millis() as f32;
                                    yield Ok(Completion::Metrics(CompletionMetrics {
                                        prompt_tokens: usage.prompt_tokens,
                                        prompt_eval_latency_ms: first_token_ms,
                                        completion_tokens: usage.completion_tokens,
                                        completion_latency_ms: total_ms - first_token_ms,
                                    }));
                                }
                            }
                            Err(err) => {
                                yield Err(GenerationError::Decode(err.to_string()));
                                break;
                            }
                        }
                    }
                }
                Err(err) => {
                    yield Err(GenerationError::Request(err.to_string()));
                }
            }
        };

        Box::pin(outer_stream)
    }
}
