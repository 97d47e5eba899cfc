use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::builder::PossibleValuesParser;
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use parley_core::{
    ChatController, ChatEvent, DeepLinkParams, PlainPrompter, PostOutcome, SessionUpdate,
    ThemeController, TranscriptSegment, TranscriptStream, TranslateController, TranslateEvent,
};
use parley_llm::{LlmProvider, SessionId, create_provider};
use snafu::{OptionExt, ResultExt, ensure};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::{
    AppResult, CreateProviderSnafu, MissingApiKeySnafu, NothingToTranslateSnafu, ReadInputSnafu,
    SettingsSnafu, WriteOutputSnafu,
};
use crate::settings::{SETTING_KEYS, Settings, SettingsStore};
use crate::terminal::TerminalRenderer;

const CHAT_SESSION_ID: SessionId = SessionId::new(1);
const TRANSLATE_SESSION_ID: SessionId = SessionId::new(2);
const THEME_SESSION_ID: SessionId = SessionId::new(3);

#[derive(Parser, Debug)]
#[command(
    name = "parley",
    version,
    about = "Stream chat and translation responses from a language model"
)]
pub struct Cli {
    /// Settings file to use instead of the platform config directory
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Chat with the model, one stdin line per turn
    Chat(ChatArgs),
    /// Translate a sentence, a deep link or transcripts read from stdin
    Translate(TranslateArgs),
    /// Generate word-game themes, one request at a time
    Theme(ThemeArgs),
    /// List the configured models; the default is marked with `*`
    Models,
    /// Show or change the settings file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the settings file location
    Path,
    /// Print the effective settings with the api key hidden
    Show,
    /// Change one value in the settings file
    Set {
        #[arg(value_parser = PossibleValuesParser::new(SETTING_KEYS.iter().copied()))]
        key: String,
        value: String,
    },
}

#[derive(Args, Debug, Default)]
pub struct ChatArgs {
    /// Model to use instead of the configured default
    #[arg(long)]
    pub model: Option<String>,

    /// Keep earlier turns as context for each new prompt
    #[arg(long)]
    pub multi_turn: bool,

    /// Ask a single question and exit
    pub prompt: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct TranslateArgs {
    /// Query string with `sentence`, `additionalContext`, `language` and `modelId`
    #[arg(long)]
    pub link: Option<String>,

    /// Target language
    #[arg(long, short)]
    pub language: Option<String>,

    /// Additional context for the translation
    #[arg(long)]
    pub context: Option<String>,

    /// Model to use instead of the configured default
    #[arg(long)]
    pub model: Option<String>,

    /// Read transcript segments from stdin, one per line, and translate as they arrive
    #[arg(long)]
    pub listen: bool,

    /// Sentence to translate
    pub sentence: Option<String>,
}

#[derive(Args, Debug)]
pub struct ThemeArgs {
    /// Model to use instead of the configured default
    #[arg(long)]
    pub model: Option<String>,

    /// Number of themes to generate
    #[arg(long, default_value_t = 1)]
    pub count: usize,
}

impl TranslateArgs {
    /// Explicit flags take precedence over the deep link.
    pub fn deep_link(&self, default_language: &str) -> DeepLinkParams {
        let link = self
            .link
            .as_deref()
            .map(DeepLinkParams::parse)
            .unwrap_or_default();

        DeepLinkParams {
            sentence: self.sentence.clone().or(link.sentence),
            additional_context: self.context.clone().or(link.additional_context),
            language: self
                .language
                .clone()
                .or(link.language)
                .or_else(|| Some(default_language.to_string())),
            model_id: self.model.clone().or(link.model_id),
        }
    }
}

pub async fn run(cli: Cli) -> AppResult<()> {
    let store = match cli.config {
        Some(path) => SettingsStore::new(path),
        None => SettingsStore::load(),
    };
    let settings = store.settings();

    match cli.command {
        Command::Models => list_models(&settings, &mut io::stdout().lock()),
        Command::Config { action } => run_config(&store, action, &mut io::stdout().lock()),
        Command::Chat(args) => {
            let provider = connect(&store)?;
            run_chat(provider, &settings, args).await
        }
        Command::Translate(args) => {
            let provider = connect(&store)?;
            run_translate(provider, &settings, args).await
        }
        Command::Theme(args) => {
            let provider = connect(&store)?;
            run_theme(provider, &settings, args).await
        }
    }
}

pub fn run_config(
    store: &SettingsStore,
    action: ConfigAction,
    out: &mut impl Write,
) -> AppResult<()> {
    let written = match action {
        ConfigAction::Path => writeln!(out, "{}", store.config_path().display()),
        ConfigAction::Show => {
            let json = store
                .settings()
                .redacted()
                .to_pretty_json()
                .context(SettingsSnafu {
                    stage: "show-settings",
                })?;
            writeln!(out, "{json}")
        }
        ConfigAction::Set { key, value } => {
            store.set(&key, &value).context(SettingsSnafu {
                stage: "set-setting",
            })?;
            writeln!(out, "updated `{key}` in {}", store.config_path().display())
        }
    };

    written.context(WriteOutputSnafu {
        stage: "write-config-output",
    })
}

fn connect(store: &SettingsStore) -> AppResult<Arc<dyn LlmProvider>> {
    let config = store
        .settings()
        .to_provider_config()
        .context(MissingApiKeySnafu {
            stage: "load-provider-config",
            path: store.config_path().to_path_buf(),
        })?;
    tracing::debug!(provider_id = %config.provider_id, endpoint = %config.endpoint, "creating provider");

    create_provider(config).context(CreateProviderSnafu {
        stage: "create-provider",
    })
}

pub fn list_models(settings: &Settings, out: &mut impl Write) -> AppResult<()> {
    let registry = settings.model_registry();
    for model in registry.models() {
        let marker = if model.id == registry.default_model_id() {
            '*'
        } else {
            ' '
        };
        let line = match &model.description {
            Some(description) => writeln!(out, "{marker} {} - {description}", model.id),
            None => writeln!(out, "{marker} {}", model.id),
        };
        line.context(WriteOutputSnafu {
            stage: "list-models",
        })?;
    }

    Ok(())
}

async fn run_chat(
    provider: Arc<dyn LlmProvider>,
    settings: &Settings,
    args: ChatArgs,
) -> AppResult<()> {
    let mut chat = ChatController::new(
        CHAT_SESSION_ID,
        provider,
        settings.model_registry(),
        settings.typing_config(),
    );
    if let Some(model_id) = args.model.as_deref()
        && !chat.set_model_id(model_id)
    {
        report_unknown_model(model_id, chat.orchestrator().model_id());
    }

    let mut renderer = TerminalRenderer::new(io::stdout());
    if let Some(prompt) = args.prompt.as_deref() {
        return ask(&mut chat, &mut renderer, prompt, true).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context(ReadInputSnafu {
        stage: "read-chat-line",
    })? {
        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                chat.clear();
                renderer.finish().context(WriteOutputSnafu {
                    stage: "clear-chat-output",
                })?;
            }
            command if command.starts_with("/model") => {
                let model_id = command.trim_start_matches("/model").trim();
                if model_id.is_empty() {
                    eprintln!("model: {}", chat.orchestrator().model_id());
                } else if !chat.set_model_id(model_id) {
                    report_unknown_model(model_id, chat.orchestrator().model_id());
                }
            }
            prompt => ask(&mut chat, &mut renderer, prompt, !args.multi_turn).await?,
        }
    }

    Ok(())
}

fn report_unknown_model(model_id: &str, current: &str) {
    tracing::warn!(model_id = %model_id, "unknown model, keeping current selection");
    eprintln!("unknown model `{model_id}`, still using `{current}`");
}

async fn ask<W: Write>(
    chat: &mut ChatController,
    renderer: &mut TerminalRenderer<W>,
    prompt: &str,
    replace_history: bool,
) -> AppResult<()> {
    match chat.submit(prompt, replace_history) {
        PostOutcome::Accepted(target) => tracing::debug!(target = ?target, "prompt accepted"),
        PostOutcome::Rejected(reason) => {
            tracing::warn!(reason = ?reason, "prompt rejected");
            return Ok(());
        }
        PostOutcome::Failed(message) => {
            eprintln!("request failed: {message}");
            return Ok(());
        }
    }

    while let Some(event) = chat.next_event().await {
        renderer
            .render(chat.rendered_output())
            .context(WriteOutputSnafu {
                stage: "render-chat-output",
            })?;
        if let ChatEvent::Response(SessionUpdate::Failed(message)) = event {
            eprintln!("request failed: {message}");
        }
    }

    renderer.finish().context(WriteOutputSnafu {
        stage: "finish-chat-output",
    })
}

async fn run_translate(
    provider: Arc<dyn LlmProvider>,
    settings: &Settings,
    args: TranslateArgs,
) -> AppResult<()> {
    let mut translate = TranslateController::new(
        TRANSLATE_SESSION_ID,
        provider,
        settings.model_registry(),
        Box::new(PlainPrompter),
        settings.translate_config(),
    );
    let params = args.deep_link(&settings.default_language);

    if args.listen {
        translate.apply_deep_link(&params);
        translate.start_recording(stdin_transcripts());
    } else {
        ensure!(
            params.sentence.as_deref().is_some_and(|s| !s.trim().is_empty()),
            NothingToTranslateSnafu {
                stage: "resolve-translate-input",
            }
        );
        // One-shot: translate now instead of waiting out the quiet period.
        translate.set_auto(false);
        translate.apply_deep_link(&params);
        let outcome = translate.execute();
        if !outcome.is_accepted() {
            tracing::warn!(outcome = ?outcome, "translation was not started");
            if let PostOutcome::Failed(message) = outcome {
                eprintln!("request failed: {message}");
            }
            return Ok(());
        }
    }

    let mut renderer = TerminalRenderer::new(io::stdout());
    while let Some(event) = translate.next_event().await {
        match event {
            TranslateEvent::Chat(ChatEvent::Response(SessionUpdate::Failed(message))) => {
                eprintln!("request failed: {message}");
            }
            TranslateEvent::Chat(_) => renderer
                .render(translate.rendered_output())
                .context(WriteOutputSnafu {
                    stage: "render-translation",
                })?,
            TranslateEvent::TranslationCleared => {
                renderer.finish().context(WriteOutputSnafu {
                    stage: "clear-translation",
                })?
            }
            TranslateEvent::AutoTranslated(outcome) => {
                tracing::debug!(outcome = ?outcome, "auto translation fired")
            }
            TranslateEvent::TranscriptMerged(sentence) => {
                tracing::info!(sentence = %sentence, "transcript merged")
            }
            TranslateEvent::RecordingEnded => tracing::debug!("transcript input ended"),
        }
    }

    renderer.finish().context(WriteOutputSnafu {
        stage: "finish-translation",
    })
}

async fn run_theme(
    provider: Arc<dyn LlmProvider>,
    settings: &Settings,
    args: ThemeArgs,
) -> AppResult<()> {
    let mut theme = ThemeController::new(
        THEME_SESSION_ID,
        provider,
        settings.model_registry(),
        Box::new(PlainPrompter),
        settings.typing_config(),
    );
    if let Some(model_id) = args.model.as_deref()
        && !theme.set_model_id(model_id)
    {
        report_unknown_model(model_id, theme.chat().orchestrator().model_id());
    }

    let mut renderer = TerminalRenderer::new(io::stdout());
    for _ in 0..args.count {
        match theme.generate() {
            PostOutcome::Accepted(target) => tracing::debug!(target = ?target, "theme requested"),
            PostOutcome::Rejected(reason) => {
                tracing::warn!(reason = ?reason, "theme request rejected");
                break;
            }
            PostOutcome::Failed(message) => {
                eprintln!("request failed: {message}");
                break;
            }
        }

        while let Some(event) = theme.next_event().await {
            renderer
                .render(theme.rendered_output())
                .context(WriteOutputSnafu {
                    stage: "render-theme",
                })?;
            if let ChatEvent::Response(SessionUpdate::Failed(message)) = event {
                eprintln!("request failed: {message}");
            }
        }
        renderer.finish().context(WriteOutputSnafu {
            stage: "finish-theme",
        })?;
    }

    Ok(())
}

/// Each stdin line becomes one transcript segment.
fn stdin_transcripts() -> TranscriptStream {
    let lines = BufReader::new(tokio::io::stdin()).lines();
    futures::stream::unfold(lines, |mut lines| async move {
        match lines.next_line().await {
            Ok(Some(line)) => Some((TranscriptSegment::new(line), lines)),
            Ok(None) => None,
            Err(error) => {
                tracing::warn!(error = %error, "stopped reading transcripts from stdin");
                None
            }
        }
    })
    .boxed()
}
