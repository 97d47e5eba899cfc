use std::sync::Arc;

use parley_llm::{LlmProvider, ModelRegistry, SessionId};

use crate::session::{PostOutcome, RequestOrchestrator, SessionUpdate};
use crate::typing::{TypingConfig, TypingSimulator};

/// Progress reported by [`ChatController::next_event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Response(SessionUpdate),
    /// The typed output grew by one tick.
    Typed,
}

/// Pairs a request orchestrator with the typed renderer of its response.
///
/// The tail assistant text (trimmed) is the typing source, and the
/// orchestrator's loading flag is the settling flag.
pub struct ChatController {
    orchestrator: RequestOrchestrator,
    typing: TypingSimulator,
}

impl ChatController {
    pub fn new(
        session_id: SessionId,
        provider: Arc<dyn LlmProvider>,
        registry: ModelRegistry,
        typing: TypingConfig,
    ) -> Self {
        Self {
            orchestrator: RequestOrchestrator::new(session_id, provider, registry),
            typing: TypingSimulator::new(typing),
        }
    }

    pub fn orchestrator(&self) -> &RequestOrchestrator {
        &self.orchestrator
    }

    pub fn typing(&self) -> &TypingSimulator {
        &self.typing
    }

    pub fn rendered_output(&self) -> &str {
        self.typing.rendered_output()
    }

    pub fn is_loading(&self) -> bool {
        self.orchestrator.is_loading()
    }

    /// True while a response is arriving or still being typed out.
    pub fn is_busy(&self) -> bool {
        self.orchestrator.is_loading() || self.typing.is_active()
    }

    pub fn set_model_id(&mut self, model_id: &str) -> bool {
        self.orchestrator.set_model_id(model_id)
    }

    pub fn submit(&mut self, prompt: &str, replace_history: bool) -> PostOutcome {
        let outcome = self.orchestrator.post_chat(prompt, replace_history);
        self.sync_typing();
        outcome
    }

    pub fn clear(&mut self) {
        self.orchestrator.clear();
        self.typing.reset();
    }

    /// Runs one cooperative step: a response event or a typing tick.
    ///
    /// Returns `None` once nothing is arriving and nothing is left to type.
    pub async fn next_event(&mut self) -> Option<ChatEvent> {
        tokio::select! {
            update = self.orchestrator.next_update(), if self.orchestrator.is_loading() => {
                let update = update?;
                self.sync_typing();
                Some(ChatEvent::Response(update))
            }
            ticked = self.typing.next_tick(), if self.typing.is_active() => {
                ticked.then_some(ChatEvent::Typed)
            }
            else => None,
        }
    }

    /// Drives the exchange until the response is complete and fully typed.
    pub async fn run_until_idle(&mut self) {
        while self.next_event().await.is_some() {}
    }

    fn sync_typing(&mut self) {
        let response = self
            .orchestrator
            .latest_response()
            .map(str::trim)
            .unwrap_or_default();
        self.typing.set_source(response);
        self.typing.set_settling(self.orchestrator.is_loading());
    }
}
