use anyhow::Result;
use chrono::{DateTime, Utc};
use confab_core::completion::{
    CancellationToken, ChatMessage, Completion, CompletionMetrics, CompletionModel, Role,
};
use confab_core::config::GenerationProfile;
use confab_core::prompt::compose_session;
use confab_core::session::Session;
use futures::StreamExt;
use tracing::debug;

/// Context associated with the last assistant reply.
#[derive(Clone)]
pub struct ReplyContext {
    pub finish_reason: Option<String>,
    pub metrics: CompletionMetrics,
    pub logs: String,
    pub timestamp: DateTime<Utc>,
}

/// Chat conversation between human and AI model.
///
/// Owns its `Session` outright; nothing else holds conversation state.
pub struct Chat {
    session: Session,
    model: Box<dyn CompletionModel + Send + Sync>,
    profile: GenerationProfile,
    last_reply: Option<ReplyContext>,
}

impl Chat {
    pub fn new(model: Box<dyn CompletionModel + Send + Sync>, profile: GenerationProfile) -> Self {
        Self {
            session: Session::new(),
            model,
            profile,
            last_reply: None,
        }
    }

    /// Send one user message and stream the reply through `on_token`.
    ///
    /// The session is appended to only once the whole reply has arrived:
    /// a failed or cancelled turn leaves the turn count unchanged.
    pub async fn send(
        &mut self,
        text: &str,
        cancel_token: CancellationToken,
        mut on_token: impl FnMut(&str),
    ) -> Result<String> {
        let mut messages = compose_session(&self.session);
        messages.push(ChatMessage::new(Role::User, text));
        debug!(turns = messages.len(), "Dispatching chat turn");

        let profile = self.profile.clamped();
        let mut reply = String::new();
        let mut logs = String::new();
        let mut metrics = CompletionMetrics::default();
        let mut finish_reason = None;

        {
            let mut stream = self
                .model
                .complete(&messages, &profile, cancel_token.clone())
                .await;

            while let Some(result) = stream.next().await {
                match result? {
                    Completion::Response(response) => {
                        if let Some(raw) = &response.raw_chunk {
                            logs.push_str(raw);
                            logs.push('\n');
                        }
                        if response.finish_reason.is_some() {
                            finish_reason = response.finish_reason;
                        }
                        reply.push_str(&response.text);
                        on_token(&response.text);
                    }
                    Completion::Metrics(m) => metrics = m,
                }
            }
        }

        // The turn is committed only after the stream finished cleanly.
        debug!(
            reply_chars = reply.len(),
            finish_reason = finish_reason.as_deref().unwrap_or(""),
            "Chat turn completed"
        );
        self.session.append(Role::User, text)?;
        self.session.append(Role::Assistant, &reply)?;
        self.last_reply = Some(ReplyContext {
            finish_reason,
            metrics,
            logs,
            timestamp: Utc::now(),
        });

        Ok(reply)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Reset the conversation to its initial system turn.
    pub fn clear(&mut self) {
        self.session.clear();
        self.last_reply = None;
    }

    pub fn last_reply(&self) -> Option<&ReplyContext> {
        self.last_reply.as_ref()
    }
}
