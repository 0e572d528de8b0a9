//! Completion primitives shared by all model providers.
use crate::config::GenerationProfile;
use crate::model::ModelMetrics;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Role of a conversation turn (serialized as lowercase strings).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One conversation turn: a role tag and its text.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Failure surfaced by a model provider. Never retried; the caller aborts
/// the current turn and leaves session state untouched.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("request to model endpoint failed: {0}")]
    Request(String),
    #[error("model endpoint returned HTTP {status}: {message}")]
    Api { status: u16, message: String },
    #[error("failed to decode model response: {0}")]
    Decode(String),
    #[error("generation cancelled")]
    Cancelled,
}

#[derive(Debug)]
pub enum Completion {
    Response(CompletionResponse),
    Metrics(CompletionMetrics),
}

#[derive(Debug, Clone, Default)]
pub struct CompletionMetrics {
    pub prompt_tokens: u32,
    pub prompt_eval_latency_ms: f32,
    pub completion_tokens: u32,
    pub completion_latency_ms: f32,
}

#[derive(Debug)]
pub struct CompletionResponse {
    pub text: String,
    pub finish_reason: Option<String>,
    pub raw_chunk: Option<String>,
}

pub type CompletionStream<'a> = BoxStream<'a, Result<Completion, GenerationError>>;

#[async_trait]
pub trait CompletionModel: Send + Sync + std::fmt::Debug {
    fn metrics(&self) -> ModelMetrics;
    async fn complete(
        &mut self,
        messages: &[ChatMessage],
        profile: &GenerationProfile,
        cancel_token: CancellationToken,
    ) -> CompletionStream<'_>;
}
