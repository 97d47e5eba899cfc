use std::sync::Arc;

use parley_llm::{
    Generation, LlmProvider, ModelRegistry, ProviderEventStream, SessionId, StreamEventMapped,
    StreamEventPayload, StreamRequest, StreamTarget,
};
use tokio::task::JoinHandle;

use crate::message::{ChatSession, Message, Role};

const STREAM_CLOSED_MESSAGE: &str = "provider stream ended before a terminal event";

/// Why a `post_chat` call was turned away. Rejections leave state untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostRejection {
    /// A request is already outstanding for this session.
    Busy,
    EmptyPrompt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    Accepted(StreamTarget),
    Rejected(PostRejection),
    /// The provider refused to open a stream; recorded as the session error.
    Failed(String),
}

impl PostOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// State change produced by one applied stream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// Full cumulative response text so far.
    Content(String),
    Completed,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Applied(SessionUpdate),
    /// The event belongs to a cancelled or superseded request.
    Stale,
    /// Accepted but carried nothing that changes the session.
    Ignored,
}

struct ActiveRequest {
    target: StreamTarget,
    stream: ProviderEventStream,
    worker: Option<JoinHandle<()>>,
    accumulated: String,
    assistant_index: Option<usize>,
}

impl Drop for ActiveRequest {
    fn drop(&mut self) {
        self.stream.cancel();
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

/// Owns one chat session and its single in-flight request.
///
/// Failures never cross this boundary as errors: rejected posts, unknown
/// models, stream failures and stale events all end up as session state or
/// as an outcome value the caller may ignore.
pub struct RequestOrchestrator {
    session: ChatSession,
    provider: Arc<dyn LlmProvider>,
    registry: ModelRegistry,
    generation: Generation,
    active: Option<ActiveRequest>,
}

impl RequestOrchestrator {
    pub fn new(
        session_id: SessionId,
        provider: Arc<dyn LlmProvider>,
        registry: ModelRegistry,
    ) -> Self {
        let model_id = registry.default_model_id().to_string();
        Self {
            session: ChatSession::new(session_id, model_id),
            provider,
            registry,
            generation: Generation::default(),
            active: None,
        }
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn messages(&self) -> &[Message] {
        &self.session.messages
    }

    pub fn model_id(&self) -> &str {
        &self.session.model_id
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn is_loading(&self) -> bool {
        self.session.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.session.error.as_deref()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn active_target(&self) -> Option<StreamTarget> {
        self.active.as_ref().map(|active| active.target)
    }

    pub fn latest_response(&self) -> Option<&str> {
        self.session.latest_response()
    }

    /// Selects the model for subsequent requests.
    ///
    /// Unknown ids are ignored and the previous selection is kept; the return
    /// value only reports whether the selection changed hands.
    pub fn set_model_id(&mut self, model_id: &str) -> bool {
        if !self.registry.contains(model_id) {
            tracing::debug!(
                session_id = ?self.session.id,
                model_id = %model_id,
                "ignoring unknown model id"
            );
            return false;
        }

        self.session.model_id = model_id.to_string();
        true
    }

    /// Submits a prompt.
    ///
    /// With `replace_history` the conversation is reset to just this prompt
    /// (one-shot generation); otherwise it is appended as the next turn.
    pub fn post_chat(&mut self, prompt: &str, replace_history: bool) -> PostOutcome {
        if self.session.loading {
            tracing::debug!(session_id = ?self.session.id, "rejecting post while a request is outstanding");
            return PostOutcome::Rejected(PostRejection::Busy);
        }

        if prompt.trim().is_empty() {
            return PostOutcome::Rejected(PostRejection::EmptyPrompt);
        }

        if replace_history {
            self.session.messages.clear();
        }
        self.session.messages.push(Message::user(prompt));
        self.session.loading = true;
        self.session.error = None;

        self.generation = self.generation.next();
        let target = StreamTarget::new(self.session.id, self.generation);
        let request = StreamRequest::new(
            target,
            self.session.model_id.clone(),
            self.session.provider_messages(),
        );

        tracing::info!(
            target = ?target,
            model_id = %self.session.model_id,
            message_count = self.session.messages.len(),
            replace_history,
            "posting chat request"
        );

        // Without a runtime for the worker the post fails like a refused stream.
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(error) => {
                return self.fail_post(target, format!("no async runtime to stream on: {error}"));
            }
        };

        match self.provider.stream_chat(request) {
            Ok(handle) => {
                let worker = runtime.spawn(handle.worker);
                self.active = Some(ActiveRequest {
                    target,
                    stream: handle.stream,
                    worker: Some(worker),
                    accumulated: String::new(),
                    assistant_index: None,
                });
                PostOutcome::Accepted(target)
            }
            Err(error) => self.fail_post(target, error.to_string()),
        }
    }

    fn fail_post(&mut self, target: StreamTarget, message: String) -> PostOutcome {
        tracing::warn!(target = ?target, error = %message, "could not open response stream");
        self.session.loading = false;
        self.session.error = Some(message.clone());
        PostOutcome::Failed(message)
    }

    /// Discards the conversation and cancels any outstanding request.
    pub fn clear(&mut self) {
        if let Some(active) = self.active.take() {
            tracing::debug!(target = ?active.target, "cancelling in-flight request on clear");
        }

        self.generation = self.generation.next();
        self.session.messages.clear();
        self.session.loading = false;
        self.session.error = None;
    }

    /// Waits for the next event of the active stream and applies it.
    ///
    /// Returns `None` when no request is outstanding. Cancel-safe: dropping the
    /// future before it resolves loses no event.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        loop {
            let active = self.active.as_mut()?;
            let target = active.target;

            let Some(event) = active.stream.recv().await else {
                tracing::warn!(target = ?target, "provider stream closed without a terminal event");
                return Some(self.finish_with_error(STREAM_CLOSED_MESSAGE.to_string()));
            };

            match self.apply_event(event) {
                EventOutcome::Applied(update) => return Some(update),
                EventOutcome::Stale | EventOutcome::Ignored => continue,
            }
        }
    }

    /// Applies one provider event, discarding it when it does not belong to
    /// the outstanding request.
    pub fn apply_event(&mut self, event: StreamEventMapped) -> EventOutcome {
        let Some(active) = self.active.as_mut() else {
            tracing::trace!(target = ?event.target, "discarding event with no active request");
            return EventOutcome::Stale;
        };

        if active.target != event.target {
            tracing::trace!(
                active = ?active.target,
                attempted = ?event.target,
                "discarding stale stream event"
            );
            return EventOutcome::Stale;
        }

        match event.payload {
            StreamEventPayload::Delta(chunk) => {
                if chunk.is_empty() {
                    return EventOutcome::Ignored;
                }
                active.accumulated.push_str(&chunk);
                EventOutcome::Applied(self.publish_accumulated())
            }
            StreamEventPayload::Snapshot(text) => {
                if active.assistant_index.is_some() && active.accumulated == text {
                    return EventOutcome::Ignored;
                }
                active.accumulated = text;
                EventOutcome::Applied(self.publish_accumulated())
            }
            StreamEventPayload::Done => EventOutcome::Applied(self.finish_with_done()),
            StreamEventPayload::Error(message) => {
                EventOutcome::Applied(self.finish_with_error(message))
            }
        }
    }

    fn publish_accumulated(&mut self) -> SessionUpdate {
        let Some(active) = self.active.as_mut() else {
            return SessionUpdate::Content(String::new());
        };

        let content = active.accumulated.clone();
        match active.assistant_index {
            Some(index) => {
                if let Some(message) = self.session.messages.get_mut(index) {
                    message.content.clone_from(&content);
                }
            }
            None => {
                self.session
                    .messages
                    .push(Message::new(Role::Assistant, content.clone()));
                active.assistant_index = Some(self.session.messages.len() - 1);
            }
        }

        SessionUpdate::Content(content)
    }

    fn finish_with_done(&mut self) -> SessionUpdate {
        if let Some(active) = self.active.take() {
            tracing::info!(
                target = ?active.target,
                response_len = active.accumulated.len(),
                "chat request completed"
            );
        }
        self.session.loading = false;
        SessionUpdate::Completed
    }

    fn finish_with_error(&mut self, message: String) -> SessionUpdate {
        if let Some(active) = self.active.take() {
            tracing::warn!(target = ?active.target, error = %message, "chat request failed");
        }
        self.session.loading = false;
        self.session.error = Some(message.clone());
        SessionUpdate::Failed(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_llm::{
        ProviderError, ProviderResult, ProviderStreamHandle, make_event_stream,
    };
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Provider whose event senders are handed back to the test.
    #[derive(Default)]
    struct ManualProvider {
        senders: Mutex<Vec<mpsc::UnboundedSender<StreamEventMapped>>>,
        requests: Mutex<Vec<StreamRequest>>,
        refuse: bool,
    }

    impl ManualProvider {
        fn last_sender(&self) -> mpsc::UnboundedSender<StreamEventMapped> {
            self.senders
                .lock()
                .unwrap()
                .last()
                .cloned()
                .expect("a stream was opened")
        }
    }

    impl LlmProvider for ManualProvider {
        fn id(&self) -> &str {
            "manual"
        }

        fn name(&self) -> &str {
            "Manual"
        }

        fn stream_chat(&self, request: StreamRequest) -> ProviderResult<ProviderStreamHandle> {
            if self.refuse {
                return Err(ProviderError::UnsupportedProvider {
                    stage: "manual-stream-chat",
                    provider_id: "manual".to_string(),
                });
            }
            let (event_tx, stream, _cancel_rx) = make_event_stream();
            self.senders.lock().unwrap().push(event_tx);
            self.requests.lock().unwrap().push(request);
            Ok(ProviderStreamHandle {
                stream,
                worker: Box::pin(async {}),
            })
        }
    }

    fn orchestrator(provider: Arc<ManualProvider>) -> RequestOrchestrator {
        RequestOrchestrator::new(
            SessionId::new(7),
            provider,
            ModelRegistry::from_ids(["m1", "m2"]),
        )
    }

    fn event(target: StreamTarget, payload: StreamEventPayload) -> StreamEventMapped {
        StreamEventMapped { target, payload }
    }

    #[tokio::test]
    async fn unknown_model_keeps_previous_selection() {
        let mut orchestrator = orchestrator(Arc::default());
        assert_eq!(orchestrator.model_id(), "m1");
        assert!(orchestrator.set_model_id("m2"));
        assert!(!orchestrator.set_model_id("missing"));
        assert_eq!(orchestrator.model_id(), "m2");
    }

    #[tokio::test]
    async fn post_sends_selected_model_and_history() {
        let provider = Arc::new(ManualProvider::default());
        let mut orchestrator = orchestrator(provider.clone());
        orchestrator.set_model_id("m2");

        assert!(orchestrator.post_chat("first", false).is_accepted());
        let target = orchestrator.active_target().unwrap();
        orchestrator.apply_event(event(target, StreamEventPayload::Snapshot("one".into())));
        orchestrator.apply_event(event(target, StreamEventPayload::Done));

        assert!(orchestrator.post_chat("second", false).is_accepted());
        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].model_id, "m2");
        let contents = requests[1]
            .messages
            .iter()
            .map(|message| message.content.as_str())
            .collect::<Vec<_>>();
        assert_eq!(contents, vec!["first", "one", "second"]);
    }

    #[tokio::test]
    async fn replace_history_discards_prior_turns() {
        let provider = Arc::new(ManualProvider::default());
        let mut orchestrator = orchestrator(provider);

        orchestrator.post_chat("first", false);
        let target = orchestrator.active_target().unwrap();
        orchestrator.apply_event(event(target, StreamEventPayload::Delta("reply".into())));
        orchestrator.apply_event(event(target, StreamEventPayload::Done));

        orchestrator.post_chat("again", true);
        assert_eq!(orchestrator.messages(), &[Message::user("again")]);
    }

    #[tokio::test]
    async fn deltas_accumulate_into_one_tail_message() {
        let provider = Arc::new(ManualProvider::default());
        let mut orchestrator = orchestrator(provider);
        orchestrator.post_chat("Hi", true);
        let target = orchestrator.active_target().unwrap();

        let first = orchestrator.apply_event(event(target, StreamEventPayload::Delta("Hel".into())));
        let second = orchestrator.apply_event(event(target, StreamEventPayload::Delta("lo".into())));

        assert_eq!(first, EventOutcome::Applied(SessionUpdate::Content("Hel".into())));
        assert_eq!(second, EventOutcome::Applied(SessionUpdate::Content("Hello".into())));
        assert_eq!(
            orchestrator.messages(),
            &[Message::user("Hi"), Message::assistant("Hello")]
        );
    }

    #[tokio::test]
    async fn empty_deltas_and_repeated_snapshots_do_not_touch_messages() {
        let provider = Arc::new(ManualProvider::default());
        let mut orchestrator = orchestrator(provider);
        orchestrator.post_chat("Hi", true);
        let target = orchestrator.active_target().unwrap();

        orchestrator.apply_event(event(target, StreamEventPayload::Snapshot("Hel".into())));
        assert_eq!(
            orchestrator.apply_event(event(target, StreamEventPayload::Snapshot("Hel".into()))),
            EventOutcome::Ignored
        );
        assert_eq!(
            orchestrator.apply_event(event(target, StreamEventPayload::Delta(String::new()))),
            EventOutcome::Ignored
        );
        assert_eq!(
            orchestrator.messages(),
            &[Message::user("Hi"), Message::assistant("Hel")]
        );
        assert!(orchestrator.is_loading());
    }

    #[tokio::test]
    async fn failure_before_streaming_clears_loading_without_message() {
        let provider = Arc::new(ManualProvider::default());
        let mut orchestrator = orchestrator(provider);
        orchestrator.post_chat("Hi", true);
        let target = orchestrator.active_target().unwrap();

        let outcome =
            orchestrator.apply_event(event(target, StreamEventPayload::Error("boom".into())));

        assert_eq!(outcome, EventOutcome::Applied(SessionUpdate::Failed("boom".into())));
        assert!(!orchestrator.is_loading());
        assert_eq!(orchestrator.error(), Some("boom"));
        assert_eq!(orchestrator.messages(), &[Message::user("Hi")]);
        assert!(orchestrator.active_target().is_none());
    }

    #[tokio::test]
    async fn refused_stream_becomes_session_error() {
        let provider = Arc::new(ManualProvider {
            refuse: true,
            ..ManualProvider::default()
        });
        let mut orchestrator = orchestrator(provider);

        let outcome = orchestrator.post_chat("Hi", true);

        assert!(matches!(outcome, PostOutcome::Failed(_)));
        assert!(!orchestrator.is_loading());
        assert!(orchestrator.error().is_some());
    }

    #[test]
    fn post_without_runtime_becomes_session_error() {
        let provider = Arc::new(ManualProvider::default());
        let mut orchestrator = orchestrator(provider.clone());

        let outcome = orchestrator.post_chat("Hello", true);

        assert!(matches!(outcome, PostOutcome::Failed(_)));
        assert!(!orchestrator.is_loading());
        assert!(orchestrator.error().is_some_and(|error| error.contains("runtime")));
        assert_eq!(orchestrator.messages(), &[Message::user("Hello")]);
        assert!(orchestrator.active_target().is_none());
        assert!(provider.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_prompt_is_rejected() {
        let mut orchestrator = orchestrator(Arc::default());
        assert_eq!(
            orchestrator.post_chat("   ", false),
            PostOutcome::Rejected(PostRejection::EmptyPrompt)
        );
        assert!(orchestrator.messages().is_empty());
        assert_eq!(orchestrator.generation(), Generation::default());
    }

    #[tokio::test]
    async fn events_after_clear_are_stale() {
        let provider = Arc::new(ManualProvider::default());
        let mut orchestrator = orchestrator(provider.clone());
        orchestrator.post_chat("Hi", true);
        let old_target = orchestrator.active_target().unwrap();
        orchestrator.apply_event(event(old_target, StreamEventPayload::Delta("par".into())));

        orchestrator.clear();
        assert!(orchestrator.generation() > old_target.generation);

        let outcome =
            orchestrator.apply_event(event(old_target, StreamEventPayload::Delta("tial".into())));
        assert_eq!(outcome, EventOutcome::Stale);
        assert!(orchestrator.messages().is_empty());
        assert!(!orchestrator.is_loading());
        assert_eq!(orchestrator.next_update().await, None);
    }

    #[tokio::test]
    async fn superseded_generation_cannot_write_into_new_request() {
        let provider = Arc::new(ManualProvider::default());
        let mut orchestrator = orchestrator(provider);
        orchestrator.post_chat("one", true);
        let first = orchestrator.active_target().unwrap();
        orchestrator.clear();
        orchestrator.post_chat("two", true);
        let second = orchestrator.active_target().unwrap();

        assert_ne!(first, second);
        assert_eq!(
            orchestrator.apply_event(event(first, StreamEventPayload::Snapshot("old".into()))),
            EventOutcome::Stale
        );
        assert_eq!(
            orchestrator.apply_event(event(second, StreamEventPayload::Snapshot("new".into()))),
            EventOutcome::Applied(SessionUpdate::Content("new".into()))
        );
    }

    #[tokio::test]
    async fn closed_stream_without_terminal_event_fails() {
        let provider = Arc::new(ManualProvider::default());
        let mut orchestrator = orchestrator(provider.clone());
        orchestrator.post_chat("Hi", true);
        let target = orchestrator.active_target().unwrap();

        let sender = provider.last_sender();
        sender
            .send(event(target, StreamEventPayload::Delta("par".into())))
            .unwrap();
        provider.senders.lock().unwrap().clear();
        drop(sender);

        assert_eq!(
            orchestrator.next_update().await,
            Some(SessionUpdate::Content("par".into()))
        );
        assert_eq!(
            orchestrator.next_update().await,
            Some(SessionUpdate::Failed(STREAM_CLOSED_MESSAGE.to_string()))
        );
        assert!(!orchestrator.is_loading());
        assert_eq!(orchestrator.latest_response(), Some("par"));
    }
}
