use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::BoxStream;
use parley_llm::{LlmProvider, ModelRegistry, SessionId};

use crate::chat::{ChatController, ChatEvent};
use crate::debounce::DebounceGate;
use crate::deep_link::DeepLinkParams;
use crate::prompt::{Prompter, TranslateRequest};
use crate::session::{PostOutcome, PostRejection};
use crate::transcript::{TranscriptMerger, TranscriptSegment};
use crate::typing::TypingConfig;

/// Target languages offered by the translate page; the first is the default.
pub const LANGUAGES: &[&str] = &[
    "English", "Japanese", "Chinese", "Korean", "French", "Spanish", "German",
];

pub type TranscriptStream = BoxStream<'static, TranscriptSegment>;

/// Form fields of the translate page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslateForm {
    pub sentence: String,
    pub additional_context: String,
    pub language: String,
    pub translated_sentence: String,
}

impl Default for TranslateForm {
    fn default() -> Self {
        Self {
            sentence: String::new(),
            additional_context: String::new(),
            language: LANGUAGES[0].to_string(),
            translated_sentence: String::new(),
        }
    }
}

/// Arguments captured when an auto-translation is scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoTranslate {
    pub sentence: String,
    pub additional_context: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslateEvent {
    Chat(ChatEvent),
    /// The debounced auto-translation fired.
    AutoTranslated(PostOutcome),
    /// The sentence went empty, so the translation was cleared.
    TranslationCleared,
    TranscriptMerged(String),
    RecordingEnded,
}

#[derive(Debug, Clone, Copy)]
pub struct TranslateConfig {
    pub typing: TypingConfig,
    pub quiet_period: Duration,
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            typing: TypingConfig::default(),
            quiet_period: crate::debounce::DEFAULT_QUIET_PERIOD,
        }
    }
}

/// State and control flow of the translate page.
///
/// Input edits (typed or transcribed) are debounced into one translation
/// request; the response is typed out as it streams in.
pub struct TranslateController {
    form: TranslateForm,
    auto: bool,
    chat: ChatController,
    auto_gate: DebounceGate<AutoTranslate>,
    transcripts: TranscriptMerger,
    recording: Option<TranscriptStream>,
    prompter: Box<dyn Prompter>,
}

impl TranslateController {
    pub fn new(
        session_id: SessionId,
        provider: Arc<dyn LlmProvider>,
        registry: ModelRegistry,
        prompter: Box<dyn Prompter>,
        config: TranslateConfig,
    ) -> Self {
        Self {
            form: TranslateForm::default(),
            auto: true,
            chat: ChatController::new(session_id, provider, registry, config.typing),
            auto_gate: DebounceGate::new(config.quiet_period),
            transcripts: TranscriptMerger::new(),
            recording: None,
            prompter,
        }
    }

    pub fn form(&self) -> &TranslateForm {
        &self.form
    }

    pub fn chat(&self) -> &ChatController {
        &self.chat
    }

    pub fn rendered_output(&self) -> &str {
        self.chat.rendered_output()
    }

    pub fn is_auto(&self) -> bool {
        self.auto
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    pub fn transcripts(&self) -> &TranscriptMerger {
        &self.transcripts
    }

    /// Whether the execute action is currently available.
    pub fn can_execute(&self) -> bool {
        !self.form.sentence.is_empty() && !self.chat.is_loading()
    }

    /// Applies query-string initial values. Meant to be called once at mount.
    pub fn apply_deep_link(&mut self, params: &DeepLinkParams) {
        let model_id = params
            .resolve_model(
                self.chat.orchestrator().registry(),
                self.chat.orchestrator().model_id(),
            )
            .to_string();
        self.chat.set_model_id(&model_id);

        self.form.additional_context = params.additional_context.clone().unwrap_or_default();
        let language = params.language_or(LANGUAGES[0]).to_string();
        self.set_language(&language);
        self.set_sentence(params.sentence.as_deref().unwrap_or_default());
    }

    pub fn set_model_id(&mut self, model_id: &str) -> bool {
        self.chat.set_model_id(model_id)
    }

    pub fn set_sentence(&mut self, sentence: &str) {
        if self.form.sentence == sentence {
            return;
        }
        self.form.sentence = sentence.to_string();
        self.schedule_auto_translate();
    }

    pub fn set_language(&mut self, language: &str) {
        if self.form.language == language {
            return;
        }
        self.form.language = language.to_string();
        self.schedule_auto_translate();
    }

    pub fn set_additional_context(&mut self, context: &str) {
        self.form.additional_context = context.to_string();
    }

    pub fn set_auto(&mut self, auto: bool) {
        self.auto = auto;
        if !auto {
            self.auto_gate.cancel();
        }
    }

    /// Translates the current form immediately.
    pub fn execute(&mut self) -> PostOutcome {
        if self.chat.is_loading() {
            return PostOutcome::Rejected(PostRejection::Busy);
        }
        if self.form.sentence.is_empty() {
            return PostOutcome::Rejected(PostRejection::EmptyPrompt);
        }
        let request = TranslateRequest {
            sentence: self.form.sentence.clone(),
            language: self.form.language.clone(),
            context: Some(self.form.additional_context.clone()),
        };
        self.translate(request)
    }

    /// Resets the form, the conversation, the transcripts and all timers.
    ///
    /// An attached recording keeps running.
    pub fn clear(&mut self) {
        self.form = TranslateForm::default();
        self.chat.clear();
        self.transcripts.reset();
        self.auto_gate.cancel();
    }

    pub fn start_recording(&mut self, stream: TranscriptStream) {
        tracing::debug!("transcript stream attached");
        self.recording = Some(stream);
    }

    /// Detaches the transcript stream. Merged segments are kept until
    /// [`Self::reset_transcripts`] or [`Self::clear`].
    pub fn stop_recording(&mut self) {
        if self.recording.take().is_some() {
            tracing::debug!("transcript stream detached");
        }
    }

    pub fn reset_transcripts(&mut self) {
        self.transcripts.reset();
    }

    /// True while anything is pending: a response, typing, the debounce
    /// timer or a recording.
    pub fn is_busy(&self) -> bool {
        self.chat.is_busy() || self.auto_gate.is_pending() || self.recording.is_some()
    }

    /// Runs one cooperative step. Returns `None` when nothing is pending.
    pub async fn next_event(&mut self) -> Option<TranslateEvent> {
        enum Step {
            Chat(Option<ChatEvent>),
            Auto(AutoTranslate),
            Segment(Option<TranscriptSegment>),
        }

        loop {
            let step = tokio::select! {
                event = self.chat.next_event(), if self.chat.is_busy() => Step::Chat(event),
                args = self.auto_gate.fire(), if self.auto_gate.is_pending() => Step::Auto(args),
                segment = next_segment(&mut self.recording), if self.recording.is_some() => {
                    Step::Segment(segment)
                }
                else => return None,
            };

            return match step {
                Step::Chat(None) => continue,
                Step::Chat(Some(event)) => {
                    if matches!(event, ChatEvent::Response(_)) {
                        self.sync_translation();
                    }
                    Some(TranslateEvent::Chat(event))
                }
                Step::Auto(args) => Some(self.run_auto_translate(args)),
                Step::Segment(Some(segment)) => {
                    let merged = self.transcripts.push(segment);
                    self.set_sentence(&merged);
                    Some(TranslateEvent::TranscriptMerged(merged))
                }
                Step::Segment(None) => {
                    self.recording = None;
                    Some(TranslateEvent::RecordingEnded)
                }
            };
        }
    }

    /// Drives until nothing is pending. Do not call with an endless
    /// recording attached.
    pub async fn run_until_idle(&mut self) {
        while self.next_event().await.is_some() {}
    }

    fn schedule_auto_translate(&mut self) {
        if !self.auto {
            return;
        }
        self.auto_gate.schedule(AutoTranslate {
            sentence: self.form.sentence.clone(),
            additional_context: self.form.additional_context.clone(),
            language: self.form.language.clone(),
        });
    }

    fn run_auto_translate(&mut self, args: AutoTranslate) -> TranslateEvent {
        if args.sentence.is_empty() {
            self.form.translated_sentence.clear();
            if !self.chat.is_loading() {
                self.chat.clear();
            }
            return TranslateEvent::TranslationCleared;
        }

        if self.chat.is_loading() {
            tracing::debug!("skipping auto-translation while a request is outstanding");
            return TranslateEvent::AutoTranslated(PostOutcome::Rejected(PostRejection::Busy));
        }

        let outcome = self.translate(TranslateRequest {
            sentence: args.sentence,
            language: args.language,
            context: Some(args.additional_context),
        });
        TranslateEvent::AutoTranslated(outcome)
    }

    fn translate(&mut self, mut request: TranslateRequest) -> PostOutcome {
        if request.context.as_deref() == Some("") {
            request.context = None;
        }
        let prompt = self.prompter.translate_prompt(&request);
        self.chat.submit(&prompt, true)
    }

    fn sync_translation(&mut self) {
        if let Some(response) = self.chat.orchestrator().latest_response() {
            self.form.translated_sentence = response.trim().to_string();
        }
    }
}

async fn next_segment(stream: &mut Option<TranscriptStream>) -> Option<TranscriptSegment> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}
