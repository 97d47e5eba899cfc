use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use parley_core::TypingConfig;
use parley_llm::{
    LlmProvider, ModelRegistry, ProviderResult, ProviderStreamHandle, StreamEventMapped,
    StreamEventPayload, StreamRequest, make_event_stream,
};

/// One scripted provider event, emitted after `delay`.
#[derive(Debug, Clone)]
pub struct Step {
    pub delay: Duration,
    pub payload: StreamEventPayload,
}

pub fn snapshot(delay_ms: u64, text: &str) -> Step {
    Step {
        delay: Duration::from_millis(delay_ms),
        payload: StreamEventPayload::Snapshot(text.to_string()),
    }
}

// Only the session scenarios stream deltas and failures.
#[allow(dead_code)]
pub fn delta(delay_ms: u64, text: &str) -> Step {
    Step {
        delay: Duration::from_millis(delay_ms),
        payload: StreamEventPayload::Delta(text.to_string()),
    }
}

pub fn done(delay_ms: u64) -> Step {
    Step {
        delay: Duration::from_millis(delay_ms),
        payload: StreamEventPayload::Done,
    }
}

#[allow(dead_code)]
pub fn failure(delay_ms: u64, message: &str) -> Step {
    Step {
        delay: Duration::from_millis(delay_ms),
        payload: StreamEventPayload::Error(message.to_string()),
    }
}

/// Model service that replays one queued script per request.
#[derive(Default)]
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Vec<Step>>>,
    requests: Mutex<Vec<StreamRequest>>,
}

impl ScriptedProvider {
    pub fn with_scripts(scripts: impl IntoIterator<Item = Vec<Step>>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            requests: Mutex::default(),
        })
    }

    pub fn requests(&self) -> Vec<StreamRequest> {
        self.requests.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn last_prompt(&self) -> Option<String> {
        self.requests
            .lock()
            .unwrap()
            .last()
            .and_then(|request| request.prompt())
            .map(|message| message.content.clone())
    }
}

impl LlmProvider for ScriptedProvider {
    fn id(&self) -> &str {
        "scripted"
    }

    fn name(&self) -> &str {
        "Scripted"
    }

    fn stream_chat(&self, request: StreamRequest) -> ProviderResult<ProviderStreamHandle> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![snapshot(10, "ok"), done(10)]);
        let target = request.target;
        self.requests.lock().unwrap().push(request);

        let (event_tx, stream, mut cancel_rx) = make_event_stream();
        let worker = Box::pin(async move {
            for step in script {
                tokio::select! {
                    _ = &mut cancel_rx => return,
                    _ = tokio::time::sleep(step.delay) => {}
                }
                let event = StreamEventMapped {
                    target,
                    payload: step.payload,
                };
                if event_tx.send(event).is_err() {
                    return;
                }
            }
        });

        Ok(ProviderStreamHandle { stream, worker })
    }
}

pub fn registry() -> ModelRegistry {
    ModelRegistry::from_ids(["m1", "m2"])
}

pub fn slow_typing() -> TypingConfig {
    TypingConfig {
        chars_per_tick: 1,
        tick_interval: Duration::from_millis(5),
    }
}
