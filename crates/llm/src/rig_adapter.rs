use futures::StreamExt;
use rig::completion::{CompletionModel, Message as RigMessage};
use rig::prelude::CompletionClient;
use rig::providers::openai;
use rig::streaming::StreamedAssistantContent;
use snafu::{OptionExt, ResultExt, ensure};
use tokio::sync::{mpsc, oneshot};

use super::provider::{
    CompletionsFailedSnafu, EmptyMessageSetSnafu, HttpClientSnafu, LlmProvider,
    MissingApiKeySnafu, ProviderConfig, ProviderError, ProviderMessage, ProviderResult,
    ProviderStreamHandle, ProviderWorker, Role, StreamEventMapped, StreamEventPayload,
    StreamRequest, StreamTarget, make_event_stream,
};

pub const RIG_OPENAI_PROVIDER_ID: &str = "openai";

type RigStreamingResponse = rig::streaming::StreamingCompletionResponse<
    rig::providers::openai::responses_api::streaming::StreamingCompletionResponse,
>;

/// OpenAI-compatible model service backed by Rig's streaming completions.
///
/// Text chunks are folded into cumulative snapshots inside the worker, so a
/// session only ever sees `Snapshot`, then `Done` or `Error`. Reasoning and
/// tool-call chunks are dropped here.
pub struct RigProviderAdapter {
    config: ProviderConfig,
}

impl RigProviderAdapter {
    pub fn new(config: ProviderConfig) -> ProviderResult<Self> {
        ensure!(
            !config.api_key.is_empty(),
            MissingApiKeySnafu {
                stage: "rig-adapter-new",
                provider_id: config.provider_id.clone(),
            }
        );

        Ok(Self { config })
    }

    fn client(&self) -> ProviderResult<openai::Client> {
        let mut builder = openai::Client::builder().api_key(self.config.api_key.as_str());
        if !self.config.endpoint.is_empty() {
            builder = builder.base_url(self.config.endpoint.as_str());
        }
        builder.build().context(HttpClientSnafu {
            stage: "build-client",
        })
    }
}

fn to_rig_message(message: &ProviderMessage) -> RigMessage {
    match message.role {
        Role::User => RigMessage::user(message.content.clone()),
        Role::Assistant => RigMessage::assistant(message.content.clone()),
    }
}

/// Splits a request into its prompt and the history sent before it.
fn conversation(request: &StreamRequest) -> ProviderResult<(RigMessage, Vec<RigMessage>)> {
    let prompt = request.prompt().context(EmptyMessageSetSnafu {
        stage: "split-conversation",
        target: request.target,
    })?;
    let history = request.messages[..request.messages.len() - 1]
        .iter()
        .map(to_rig_message)
        .collect();

    Ok((to_rig_message(prompt), history))
}

async fn open_stream(
    client: openai::Client,
    request: &StreamRequest,
) -> ProviderResult<RigStreamingResponse> {
    let (prompt, history) = conversation(request)?;
    client
        .completion_model(request.model_id.clone())
        .completion_request(prompt)
        .messages(history)
        .stream()
        .await
        .context(CompletionsFailedSnafu {
            stage: "open-stream",
        })
}

fn text_chunk<R>(item: StreamedAssistantContent<R>) -> Option<String>
where
    R: Clone + Unpin,
{
    match item {
        StreamedAssistantContent::Text(text) => Some(text.text),
        _ => None,
    }
}

/// Sending half of one stream that keeps the cumulative response text.
struct SnapshotSink {
    target: StreamTarget,
    events: mpsc::UnboundedSender<StreamEventMapped>,
    text: String,
}

impl SnapshotSink {
    fn new(target: StreamTarget, events: mpsc::UnboundedSender<StreamEventMapped>) -> Self {
        Self {
            target,
            events,
            text: String::new(),
        }
    }

    fn send(&self, payload: StreamEventPayload) -> bool {
        self.events
            .send(StreamEventMapped {
                target: self.target,
                payload,
            })
            .is_ok()
    }

    /// Appends a chunk and publishes the new snapshot. Returns false once the
    /// session has stopped listening.
    fn push_text(&mut self, chunk: &str) -> bool {
        if chunk.is_empty() {
            return true;
        }
        self.text.push_str(chunk);
        self.send(StreamEventPayload::Snapshot(self.text.clone()))
    }

    fn fail(&self, error: ProviderError) {
        self.send(StreamEventPayload::Error(error.to_string()));
    }

    fn finish(&self) {
        self.send(StreamEventPayload::Done);
    }
}

async fn run_stream_worker(
    client: openai::Client,
    request: StreamRequest,
    mut sink: SnapshotSink,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let mut stream = match open_stream(client, &request).await {
        Ok(stream) => stream,
        Err(error) => {
            tracing::error!(
                target = ?sink.target,
                model_id = %request.model_id,
                error = %error,
                "failed to open provider stream"
            );
            sink.fail(error);
            return;
        }
    };

    loop {
        let item = tokio::select! {
            _ = &mut cancel_rx => {
                tracing::debug!(target = ?sink.target, "provider stream cancelled");
                stream.cancel();
                return;
            }
            item = stream.next() => item,
        };

        match item {
            Some(Ok(content)) => {
                if let Some(chunk) = text_chunk(content)
                    && !sink.push_text(&chunk)
                {
                    return;
                }
            }
            Some(Err(source)) => {
                tracing::warn!(
                    target = ?sink.target,
                    error = %source,
                    "provider stream emitted an error chunk"
                );
                sink.fail(ProviderError::CompletionsFailed {
                    stage: "stream-chunk",
                    source,
                });
                return;
            }
            None => {
                tracing::debug!(
                    target = ?sink.target,
                    response_len = sink.text.len(),
                    "provider stream finished"
                );
                sink.finish();
                return;
            }
        }
    }
}

impl LlmProvider for RigProviderAdapter {
    fn id(&self) -> &str {
        &self.config.provider_id
    }

    fn name(&self) -> &str {
        "Rig OpenAI"
    }

    fn stream_chat(&self, request: StreamRequest) -> ProviderResult<ProviderStreamHandle> {
        ensure!(
            !request.messages.is_empty(),
            EmptyMessageSetSnafu {
                stage: "stream-chat",
                target: request.target,
            }
        );
        let client = self.client()?;

        let (event_tx, stream, cancel_rx) = make_event_stream();
        let sink = SnapshotSink::new(request.target, event_tx);
        let worker: ProviderWorker =
            Box::pin(run_stream_worker(client, request, sink, cancel_rx));

        Ok(ProviderStreamHandle { stream, worker })
    }
}
