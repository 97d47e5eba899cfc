use std::sync::Arc;

use chrono::Utc;
use parley_llm::{LlmProvider, ModelRegistry, SessionId};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::chat::{ChatController, ChatEvent};
use crate::prompt::{Prompter, ThemeRequest};
use crate::session::{PostOutcome, PostRejection};
use crate::typing::TypingConfig;

/// State and control flow of the theme generator page.
///
/// Each generation is a one-shot request whose trimmed answer becomes the
/// theme text and is typed out as it streams in.
pub struct ThemeController {
    chat: ChatController,
    prompter: Box<dyn Prompter>,
    rng: StdRng,
    text: String,
}

impl ThemeController {
    pub fn new(
        session_id: SessionId,
        provider: Arc<dyn LlmProvider>,
        registry: ModelRegistry,
        prompter: Box<dyn Prompter>,
        typing: TypingConfig,
    ) -> Self {
        Self::with_rng(
            session_id,
            provider,
            registry,
            prompter,
            typing,
            StdRng::from_entropy(),
        )
    }

    /// Like [`Self::new`] with a caller-provided random source.
    pub fn with_rng(
        session_id: SessionId,
        provider: Arc<dyn LlmProvider>,
        registry: ModelRegistry,
        prompter: Box<dyn Prompter>,
        typing: TypingConfig,
        rng: StdRng,
    ) -> Self {
        Self {
            chat: ChatController::new(session_id, provider, registry, typing),
            prompter,
            rng,
            text: String::new(),
        }
    }

    pub fn chat(&self) -> &ChatController {
        &self.chat
    }

    /// Latest theme, trimmed. Empty until a response arrives.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn rendered_output(&self) -> &str {
        self.chat.rendered_output()
    }

    pub fn is_busy(&self) -> bool {
        self.chat.is_busy()
    }

    /// Whether the generate action is currently available.
    pub fn can_generate(&self) -> bool {
        !self.chat.is_loading()
    }

    pub fn set_model_id(&mut self, model_id: &str) -> bool {
        self.chat.set_model_id(model_id)
    }

    /// Requests a new theme with a random initial, seed and the current time.
    pub fn generate(&mut self) -> PostOutcome {
        let request = ThemeRequest::random(&mut self.rng, Utc::now().timestamp_millis());
        self.generate_with(request)
    }

    pub fn generate_with(&mut self, request: ThemeRequest) -> PostOutcome {
        if !self.can_generate() {
            return PostOutcome::Rejected(PostRejection::Busy);
        }

        tracing::debug!(initial = %request.initial, seed = request.seed, "generating theme");
        let prompt = self.prompter.theme_prompt(&request);
        self.chat.submit(&prompt, true)
    }

    /// Drops the theme and the conversation, cancelling any request.
    pub fn clear(&mut self) {
        self.text.clear();
        self.chat.clear();
    }

    /// Runs one cooperative step. Returns `None` when nothing is pending.
    pub async fn next_event(&mut self) -> Option<ChatEvent> {
        let event = self.chat.next_event().await?;
        if matches!(event, ChatEvent::Response(_))
            && let Some(response) = self.chat.orchestrator().latest_response()
        {
            self.text = response.trim().to_string();
        }
        Some(event)
    }

    pub async fn run_until_idle(&mut self) {
        while self.next_event().await.is_some() {}
    }
}
