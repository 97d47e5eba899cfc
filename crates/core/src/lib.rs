#![deny(unsafe_code)]

//! Streaming response orchestration shared by the prompt pages.
//!
//! A [`RequestOrchestrator`] owns one chat session and its single in-flight
//! request, a [`TypingSimulator`] types its cumulative response out, a
//! [`DebounceGate`] coalesces input bursts into one request and a
//! [`TranscriptMerger`] folds speech fragments into one input string.

pub mod chat;
pub mod debounce;
pub mod deep_link;
pub mod message;
pub mod prompt;
pub mod session;
pub mod theme;
pub mod transcript;
pub mod translate;
pub mod typing;

pub use chat::{ChatController, ChatEvent};
pub use debounce::{DEFAULT_QUIET_PERIOD, DebounceGate};
pub use deep_link::DeepLinkParams;
pub use message::{ChatSession, Message, Role};
pub use prompt::{HIRAGANA, PlainPrompter, Prompter, ThemeRequest, TranslateRequest};
pub use session::{EventOutcome, PostOutcome, PostRejection, RequestOrchestrator, SessionUpdate};
pub use theme::ThemeController;
pub use transcript::{TranscriptMerger, TranscriptSegment, merge_transcripts};
pub use translate::{
    AutoTranslate, LANGUAGES, TranscriptStream, TranslateConfig, TranslateController,
    TranslateEvent, TranslateForm,
};
pub use typing::{TypingConfig, TypingSimulator};
