mod support;

use parley_core::{
    ChatController, ChatEvent, Message, PostOutcome, PostRejection, RequestOrchestrator,
    SessionUpdate,
};
use parley_llm::SessionId;

use support::{ScriptedProvider, delta, done, failure, registry, slow_typing, snapshot};

#[tokio::test(start_paused = true)]
async fn cumulative_snapshots_end_in_one_assistant_message() {
    let provider = ScriptedProvider::with_scripts([vec![
        snapshot(10, "H"),
        snapshot(10, "He"),
        snapshot(10, "Hello there"),
        done(10),
    ]]);
    let mut orchestrator = RequestOrchestrator::new(SessionId::new(1), provider.clone(), registry());

    assert!(orchestrator.post_chat("Hello", true).is_accepted());
    assert_eq!(orchestrator.messages(), &[Message::user("Hello")]);
    assert!(orchestrator.is_loading());

    let mut updates = Vec::new();
    while let Some(update) = orchestrator.next_update().await {
        updates.push(update);
    }

    assert_eq!(
        updates,
        vec![
            SessionUpdate::Content("H".into()),
            SessionUpdate::Content("He".into()),
            SessionUpdate::Content("Hello there".into()),
            SessionUpdate::Completed,
        ]
    );
    assert_eq!(
        orchestrator.messages(),
        &[Message::user("Hello"), Message::assistant("Hello there")]
    );
    assert!(!orchestrator.is_loading());
    assert_eq!(provider.requests()[0].model_id, "m1");
}

#[tokio::test(start_paused = true)]
async fn post_while_loading_leaves_state_untouched() {
    let provider = ScriptedProvider::with_scripts([vec![delta(10, "partial"), done(100)]]);
    let mut orchestrator = RequestOrchestrator::new(SessionId::new(1), provider.clone(), registry());

    orchestrator.post_chat("first", false);
    orchestrator.next_update().await;
    let before = orchestrator.session().clone();
    let generation = orchestrator.generation();

    assert_eq!(
        orchestrator.post_chat("second", true),
        PostOutcome::Rejected(PostRejection::Busy)
    );
    assert_eq!(orchestrator.session(), &before);
    assert_eq!(orchestrator.generation(), generation);
    assert_eq!(provider.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn clear_mid_stream_resets_and_cancels() {
    let provider = ScriptedProvider::with_scripts([
        vec![delta(10, "one "), delta(10, "two "), delta(10, "three"), done(10)],
        vec![snapshot(10, "fresh"), done(10)],
    ]);
    let mut orchestrator = RequestOrchestrator::new(SessionId::new(1), provider, registry());

    orchestrator.post_chat("count", false);
    orchestrator.next_update().await;
    assert_eq!(orchestrator.latest_response(), Some("one "));

    orchestrator.clear();
    assert!(!orchestrator.is_loading());
    assert!(orchestrator.messages().is_empty());
    assert_eq!(orchestrator.next_update().await, None);

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(orchestrator.messages().is_empty());

    orchestrator.post_chat("again", false);
    while orchestrator.next_update().await.is_some() {}
    assert_eq!(
        orchestrator.messages(),
        &[Message::user("again"), Message::assistant("fresh")]
    );
}

#[tokio::test(start_paused = true)]
async fn stream_failure_stops_loading_without_retry() {
    let provider = ScriptedProvider::with_scripts([vec![failure(10, "rate limited")]]);
    let mut orchestrator = RequestOrchestrator::new(SessionId::new(1), provider.clone(), registry());

    orchestrator.post_chat("Hello", true);
    assert_eq!(
        orchestrator.next_update().await,
        Some(SessionUpdate::Failed("rate limited".into()))
    );
    assert_eq!(orchestrator.next_update().await, None);
    assert!(!orchestrator.is_loading());
    assert_eq!(orchestrator.error(), Some("rate limited"));
    assert_eq!(provider.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn typed_output_stays_a_prefix_and_catches_up_on_completion() {
    let provider = ScriptedProvider::with_scripts([vec![
        snapshot(5, "Stream"),
        snapshot(5, "Streaming text"),
        snapshot(5, "Streaming text arrives"),
        done(5),
    ]]);
    let mut chat = ChatController::new(SessionId::new(2), provider, registry(), slow_typing());

    assert!(chat.submit("go", true).is_accepted());
    let mut saw_partial_output = false;

    while let Some(event) = chat.next_event().await {
        let source = chat.orchestrator().latest_response().unwrap_or_default();
        assert!(source.starts_with(chat.rendered_output()));
        if chat.is_loading() && chat.rendered_output().len() < source.len() {
            saw_partial_output = true;
        }
        if event == ChatEvent::Response(SessionUpdate::Completed) {
            assert_eq!(chat.rendered_output(), "Streaming text arrives");
        }
    }

    assert!(saw_partial_output);
    assert_eq!(chat.rendered_output(), "Streaming text arrives");
    assert!(!chat.is_busy());
}

#[tokio::test(start_paused = true)]
async fn new_turn_retypes_from_the_beginning() {
    let provider = ScriptedProvider::with_scripts([
        vec![snapshot(5, "first answer"), done(5)],
        vec![snapshot(5, "second"), snapshot(50, "second answer"), done(5)],
    ]);
    let mut chat = ChatController::new(SessionId::new(3), provider, registry(), slow_typing());

    chat.submit("one", false);
    chat.run_until_idle().await;
    assert_eq!(chat.rendered_output(), "first answer");

    chat.submit("two", false);
    assert_eq!(chat.rendered_output(), "");
    chat.next_event().await;
    assert!("second".starts_with(chat.rendered_output()));
    chat.run_until_idle().await;
    assert_eq!(chat.rendered_output(), "second answer");
    assert_eq!(chat.orchestrator().messages().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn chat_clear_zeroes_typing() {
    let provider = ScriptedProvider::with_scripts([vec![snapshot(5, "long answer"), done(500)]]);
    let mut chat = ChatController::new(SessionId::new(4), provider, registry(), slow_typing());

    chat.submit("q", true);
    chat.next_event().await;
    chat.next_event().await;
    assert!(chat.is_busy());

    chat.clear();
    assert_eq!(chat.rendered_output(), "");
    assert!(!chat.is_busy());
    assert_eq!(chat.next_event().await, None);
}
