mod common;

use botchat::agent::providers::Purpose;
use botchat::config::OrchestratorConfig;
use botchat::error::ChatError;
use botchat::mood::Mood;
use botchat::orchestrator::events::{ConversationPhase, EventKind};
use botchat::orchestrator::{
    APOLOGY, ReactionChange, RegenerateOutcome, SendOutcome, SyncReport,
};
use botchat::store::{ChatStore, MessageQuery};
use botchat::types::{
    Attachment, AttachmentKind, ChatEntry, FeedbackScore, LocalKind, Message, Sender,
};
use common::{DEFAULT_REPLY, Harness, NOTE, SUMMARY};
use uuid::Uuid;

async fn delivered(h: &Harness, conversation: Uuid, text: &str) -> (Message, Message) {
    match h
        .orchestrator
        .send_message(conversation, text, Vec::new(), None)
        .await
        .expect("send")
    {
        SendOutcome::Delivered { user, reply } => (user, reply),
        other => panic!("expected delivery, got {other:?}"),
    }
}

async fn stored(h: &Harness, conversation: Uuid) -> Vec<Message> {
    h.store
        .list_messages(h.user, conversation, MessageQuery::all())
        .await
        .expect("list")
}

/// Toggle connectivity off and on, draining every outbox.
async fn reconnect(h: &Harness) -> Vec<(Uuid, SyncReport)> {
    h.orchestrator.set_online(false).await;
    h.orchestrator.set_online(true).await
}

// ===== conversations =====

#[tokio::test]
async fn create_conversation_is_idempotent() {
    let h = Harness::new().await;
    let (bot, first) = h.conversation("Pip").await;
    let writes = h.store.write_count();

    let second = h
        .orchestrator
        .create_conversation(bot.id)
        .await
        .expect("second");
    assert_eq!(first, second);
    assert_eq!(h.store.write_count(), writes);
    assert_eq!(h.orchestrator.list_conversations().await.expect("list").len(), 1);
}

#[tokio::test]
async fn conversations_list_most_recent_first() {
    let h = Harness::new().await;
    let (_, older) = h.conversation("Old").await;
    let (_, newer) = h.conversation("New").await;

    let ids: Vec<Uuid> = h
        .orchestrator
        .list_conversations()
        .await
        .expect("list")
        .iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(ids, vec![newer, older]);

    delivered(&h, older, "hello").await;
    let first = h.orchestrator.list_conversations().await.expect("list")[0].id;
    assert_eq!(first, older);
}

#[tokio::test]
async fn unknown_conversation_is_reported() {
    let h = Harness::new().await;
    let err = h
        .orchestrator
        .send_message(Uuid::new_v4(), "hi", Vec::new(), None)
        .await
        .expect_err("unknown");
    assert!(matches!(err, ChatError::Store(_) | ChatError::UnknownConversation(_)));
}

#[tokio::test]
async fn unknown_message_is_reported() {
    let h = Harness::new().await;
    let missing = Uuid::new_v4();

    let err = h
        .orchestrator
        .submit_feedback(missing, FeedbackScore::Positive)
        .await
        .expect_err("unknown");
    assert!(matches!(err, ChatError::UnknownMessage(id) if id == missing));

    let err = h
        .orchestrator
        .add_message_reaction(missing, "👍")
        .await
        .expect_err("unknown");
    assert!(matches!(err, ChatError::UnknownMessage(_)));
}

// ===== send pipeline =====

#[tokio::test]
async fn send_persists_both_sides_and_records_mood() {
    let h = Harness::new().await;
    let (_, conversation) = h.conversation("Pip").await;

    let (user, reply) = delivered(&h, conversation, "I'm so happy today").await;
    assert_eq!(user.sender, Sender::User);
    assert_eq!(reply.sender, Sender::Bot);
    assert_eq!(reply.content, DEFAULT_REPLY);
    assert_eq!(h.store.message_count().await, 2);

    let entries = h.orchestrator.messages(conversation).await.expect("messages");
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.persisted().is_some()));

    let listed = h.orchestrator.list_conversations().await.expect("list");
    assert_eq!(listed[0].last_mood, Some(Mood::Happy));
    assert_eq!(
        h.orchestrator.phase(conversation).await.expect("phase"),
        ConversationPhase::Idle
    );
}

#[tokio::test]
async fn reply_request_carries_context_and_prompt() {
    let h = Harness::new().await;
    let (_, conversation) = h.conversation("Pip").await;
    delivered(&h, conversation, "first").await;
    delivered(&h, conversation, "I feel sad").await;

    let request = h.provider.last(Purpose::Reply).expect("reply request");
    let system = request.system.expect("system prompt");
    assert!(system.starts_with("You are Pip"));
    assert!(system.contains("User mood: sad"));
    assert!(system.contains("Conversation context:"));
    // first, reply, "I feel sad"
    assert_eq!(request.turns.len(), 3);
}

#[tokio::test]
async fn context_window_is_limited_to_k_messages() {
    let config = OrchestratorConfig {
        context_window: 4,
        memory_refresh_threshold: 100,
        ..OrchestratorConfig::default()
    };
    let h = Harness::with_config(config).await;
    let (_, conversation) = h.conversation("Pip").await;
    for text in ["a", "b", "c", "d"] {
        delivered(&h, conversation, text).await;
    }
    let request = h.provider.last(Purpose::Reply).expect("reply");
    assert_eq!(request.turns.len(), 4);
    assert_eq!(request.turns.last().expect("turn").content, "d");
}

#[tokio::test]
async fn personality_shapes_the_stored_reply() {
    let h = Harness::new().await;
    let mut new = botchat::types::NewBot::new("Sir Reginald");
    new.personality = Some(botchat::types::Personality::new(50, 50, 50, 100).expect("traits"));
    let bot = h.orchestrator.create_bot(new).await.expect("bot");
    let conversation = h
        .orchestrator
        .create_conversation(bot.id)
        .await
        .expect("conversation");

    h.provider.queue_reply("I need help, don't worry.");
    let (_, reply) = delivered(&h, conversation, "hello").await;
    assert_eq!(reply.content, "I require assistance, do not worry.");
}

#[tokio::test]
async fn attachments_and_replies_are_persisted() {
    let h = Harness::new().await;
    let (_, conversation) = h.conversation("Pip").await;
    let (root, _) = delivered(&h, conversation, "root").await;

    let outcome = h
        .orchestrator
        .send_message(
            conversation,
            "look at this",
            vec![Attachment::new(AttachmentKind::Image, "https://example.com/a.png")],
            Some(root.id),
        )
        .await
        .expect("send");
    let SendOutcome::Delivered { user, .. } = outcome else {
        panic!("expected delivery");
    };
    assert_eq!(user.reply_to, Some(root.id));
    assert_eq!(user.thread_id, Some(root.id));
    assert_eq!(user.attachments.len(), 1);

    let thread = h
        .orchestrator
        .thread_messages(conversation, root.id)
        .await
        .expect("thread");
    let contents: Vec<&str> = thread.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["root", "look at this"]);
}

#[tokio::test]
async fn reply_to_outside_the_conversation_is_rejected() {
    let h = Harness::new().await;
    let (_, conversation) = h.conversation("Pip").await;
    let err = h
        .orchestrator
        .send_message(conversation, "hi", Vec::new(), Some(Uuid::new_v4()))
        .await
        .expect_err("bad parent");
    assert!(matches!(err, ChatError::Invalid(_)));
    assert_eq!(h.store.message_count().await, 0);
}

#[tokio::test]
async fn empty_message_is_rejected() {
    let h = Harness::new().await;
    let (_, conversation) = h.conversation("Pip").await;
    assert!(matches!(
        h.orchestrator
            .send_message(conversation, "   ", Vec::new(), None)
            .await,
        Err(ChatError::Invalid(_))
    ));
}

#[tokio::test]
async fn phases_are_published_in_order() {
    let h = Harness::new().await;
    let (_, conversation) = h.conversation("Pip").await;
    let mut events = h.orchestrator.subscribe();

    delivered(&h, conversation, "hello").await;

    let mut phases = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.conversation_id, Some(conversation));
        if let EventKind::Phase(phase) = event.kind {
            phases.push(phase);
        }
    }
    assert_eq!(
        phases,
        vec![
            ConversationPhase::Sending,
            ConversationPhase::AwaitingCompletion,
            ConversationPhase::Reconciled,
            ConversationPhase::Idle,
        ]
    );
}

// ===== failures & retries =====

#[tokio::test]
async fn completion_failure_shows_apology_and_schedules_retry() {
    let h = Harness::new().await;
    let (_, conversation) = h.conversation("Pip").await;
    h.provider.fail_replies(true);

    let outcome = h
        .orchestrator
        .send_message(conversation, "hello?", Vec::new(), None)
        .await
        .expect("send");
    assert!(matches!(
        outcome,
        SendOutcome::ReplyFailed {
            retry_scheduled: true,
            ..
        }
    ));

    let entries = h.orchestrator.messages(conversation).await.expect("messages");
    let last = entries.last().expect("entry");
    assert_eq!(last.local_kind(), Some(LocalKind::Apology));
    assert_eq!(last.content(), APOLOGY);
    assert!(!entries.iter().any(|e| e.local_kind() == Some(LocalKind::Typing)));
    assert_eq!(h.orchestrator.outbox_len(conversation).await.expect("len"), 1);
    assert_eq!(
        h.orchestrator.phase(conversation).await.expect("phase"),
        ConversationPhase::Idle
    );

    // the retry succeeds once the service recovers, without re-sending the user message
    h.provider.fail_replies(false);
    let reports = reconnect(&h).await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].1.delivered, 1);
    let messages = stored(&h, conversation).await;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, DEFAULT_REPLY);

    let entries = h.orchestrator.messages(conversation).await.expect("messages");
    assert!(!entries.iter().any(|e| e.local_kind() == Some(LocalKind::Apology)));
}

#[tokio::test]
async fn later_successful_send_supersedes_a_pending_retry() {
    let h = Harness::new().await;
    let (_, conversation) = h.conversation("Pip").await;

    h.provider.fail_replies(true);
    let outcome = h
        .orchestrator
        .send_message(conversation, "first question", Vec::new(), None)
        .await
        .expect("send");
    assert!(matches!(
        outcome,
        SendOutcome::ReplyFailed {
            retry_scheduled: true,
            ..
        }
    ));
    assert_eq!(h.orchestrator.outbox_len(conversation).await.expect("len"), 1);

    h.provider.fail_replies(false);
    delivered(&h, conversation, "second question").await;
    assert_eq!(h.orchestrator.outbox_len(conversation).await.expect("len"), 0);

    let replies_before = h.provider.calls(Purpose::Reply);
    assert!(reconnect(&h).await.is_empty());
    assert_eq!(h.provider.calls(Purpose::Reply), replies_before);

    let senders: Vec<Sender> = stored(&h, conversation)
        .await
        .into_iter()
        .map(|m| m.sender)
        .collect();
    assert_eq!(senders, vec![Sender::User, Sender::User, Sender::Bot]);
}

#[tokio::test]
async fn three_failed_attempts_are_terminal() {
    let h = Harness::new().await;
    let (_, conversation) = h.conversation("Pip").await;
    h.provider.fail_replies(true);

    h.orchestrator
        .send_message(conversation, "anyone?", Vec::new(), None)
        .await
        .expect("send");

    let second = reconnect(&h).await;
    assert_eq!(second[0].1.requeued, 1);
    let third = reconnect(&h).await;
    assert_eq!(third[0].1.failed, 1);

    assert_eq!(h.provider.calls(Purpose::Reply), 3);
    assert_eq!(h.orchestrator.outbox_len(conversation).await.expect("len"), 0);
    assert!(reconnect(&h).await.is_empty());
    assert_eq!(h.provider.calls(Purpose::Reply), 3);

    // only the user message was ever persisted
    assert_eq!(stored(&h, conversation).await.len(), 1);
    let entries = h.orchestrator.messages(conversation).await.expect("messages");
    assert_eq!(
        entries.last().and_then(ChatEntry::local_kind),
        Some(LocalKind::Apology)
    );
}

#[tokio::test]
async fn failed_write_is_queued_not_dropped() {
    let h = Harness::new().await;
    let (_, conversation) = h.conversation("Pip").await;
    let mut events = h.orchestrator.subscribe();
    h.store.set_reachable(false);

    let outcome = h
        .orchestrator
        .send_message(conversation, "still there?", Vec::new(), None)
        .await
        .expect("send");
    assert!(matches!(outcome, SendOutcome::Queued { .. }));
    assert_eq!(h.orchestrator.outbox_len(conversation).await.expect("len"), 1);
    assert_eq!(h.provider.calls(Purpose::Reply), 0);

    let mut noticed = false;
    while let Ok(event) = events.try_recv() {
        noticed |= matches!(event.kind, EventKind::Notice(_));
    }
    assert!(noticed);

    h.store.set_reachable(true);
    let report = h
        .orchestrator
        .sync_pending_messages(conversation)
        .await
        .expect("sync");
    assert_eq!(report.delivered, 1);
    assert_eq!(stored(&h, conversation).await.len(), 2);
}

// ===== offline =====

#[tokio::test]
async fn offline_sends_queue_and_replay_in_order() {
    let h = Harness::new().await;
    let (_, conversation) = h.conversation("Pip").await;

    h.orchestrator.set_online(false).await;
    let writes = h.store.write_count();
    for text in ["first", "second"] {
        let outcome = h
            .orchestrator
            .send_message(conversation, text, Vec::new(), None)
            .await
            .expect("send");
        assert!(matches!(outcome, SendOutcome::Queued { .. }));
    }
    assert_eq!(h.store.write_count(), writes);
    assert_eq!(h.orchestrator.outbox_len(conversation).await.expect("len"), 2);
    assert_eq!(h.provider.calls(Purpose::Reply), 0);

    let entries = h.orchestrator.messages(conversation).await.expect("messages");
    assert!(
        entries
            .iter()
            .all(|e| e.local_kind() == Some(LocalKind::Queued))
    );

    let reports = h.orchestrator.set_online(true).await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].1.delivered, 2);
    assert_eq!(h.orchestrator.outbox_len(conversation).await.expect("len"), 0);

    let contents: Vec<String> = stored(&h, conversation)
        .await
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(contents, vec!["first", DEFAULT_REPLY, "second", DEFAULT_REPLY]);

    let entries = h.orchestrator.messages(conversation).await.expect("messages");
    assert!(entries.iter().all(|e| e.persisted().is_some()));
    let shown: Vec<&str> = entries.iter().map(|e| e.content()).collect();
    assert_eq!(shown, vec!["first", DEFAULT_REPLY, "second", DEFAULT_REPLY]);
}

#[tokio::test]
async fn offline_writes_other_than_send_fail_loudly() {
    let h = Harness::new().await;
    let (_, conversation) = h.conversation("Pip").await;
    let (_, reply) = delivered(&h, conversation, "hello").await;

    h.orchestrator.set_online(false).await;
    let err = h
        .orchestrator
        .add_message_reaction(reply.id, "👍")
        .await
        .expect_err("offline");
    assert!(err.is_transient());
    assert!(h.orchestrator.clear_chat(conversation).await.is_err());
    assert_eq!(h.store.message_count().await, 2);
}

#[tokio::test]
async fn reads_fall_back_to_the_cache() {
    let h = Harness::new().await;
    let (bot, conversation) = h.conversation("Pip").await;
    delivered(&h, conversation, "hello").await;

    h.store.set_reachable(false);
    let bots = h.orchestrator.list_bots().await.expect("cached bots");
    assert_eq!(bots.len(), 1);
    assert_eq!(bots[0].id, bot.id);
    let conversations = h
        .orchestrator
        .list_conversations()
        .await
        .expect("cached conversations");
    assert_eq!(conversations.len(), 1);
    let entries = h
        .orchestrator
        .open_conversation(conversation)
        .await
        .expect("cached messages");
    assert_eq!(entries.len(), 2);
    let found = h
        .orchestrator
        .search_messages(conversation, "HELLO")
        .await
        .expect("local search");
    assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn offline_reads_without_cache_are_empty() {
    let h = Harness::new().await;
    h.orchestrator.set_online(false).await;
    assert!(h.orchestrator.list_bots().await.expect("bots").is_empty());
    assert!(
        h.orchestrator
            .list_conversations()
            .await
            .expect("conversations")
            .is_empty()
    );
}

// ===== regenerate & clear =====

#[tokio::test]
async fn regenerate_replaces_the_last_bot_message() {
    let h = Harness::new().await;
    let (_, conversation) = h.conversation("Pip").await;
    let (_, old) = delivered(&h, conversation, "tell me a story").await;

    h.provider.queue_reply("Once upon a time.");
    let outcome = h
        .orchestrator
        .regenerate_response(conversation)
        .await
        .expect("regenerate");
    let RegenerateOutcome::Regenerated { replaced, reply } = outcome else {
        panic!("expected regeneration");
    };
    assert_eq!(replaced, Some(old.id));
    assert_eq!(reply.content, "Once upon a time.");

    let messages = stored(&h, conversation).await;
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.id != old.id));
    assert_eq!(h.provider.calls(Purpose::Reply), 2);
}

#[tokio::test]
async fn regenerate_on_empty_conversation_does_nothing() {
    let h = Harness::new().await;
    let (_, conversation) = h.conversation("Pip").await;
    let writes = h.store.write_count();

    let outcome = h
        .orchestrator
        .regenerate_response(conversation)
        .await
        .expect("regenerate");
    assert_eq!(outcome, RegenerateOutcome::NothingToRegenerate);
    assert_eq!(h.provider.calls(Purpose::Reply), 0);
    assert_eq!(h.store.write_count(), writes);
}

#[tokio::test]
async fn clear_chat_empties_store_and_session() {
    let h = Harness::new().await;
    let (_, conversation) = h.conversation("Pip").await;
    delivered(&h, conversation, "one").await;
    delivered(&h, conversation, "two").await;

    let removed = h.orchestrator.clear_chat(conversation).await.expect("clear");
    assert_eq!(removed, 4);
    assert!(h.orchestrator.messages(conversation).await.expect("messages").is_empty());
    assert!(stored(&h, conversation).await.is_empty());
}

// ===== reactions & feedback =====

#[tokio::test]
async fn reactions_toggle_per_user_and_emoji() {
    let h = Harness::new().await;
    let (_, conversation) = h.conversation("Pip").await;
    let (_, reply) = delivered(&h, conversation, "hello").await;

    let expected = [
        ReactionChange::Added,
        ReactionChange::Removed,
        ReactionChange::Added,
    ];
    for want in expected {
        let got = h
            .orchestrator
            .add_message_reaction(reply.id, "👍")
            .await
            .expect("toggle");
        assert_eq!(got, want);
    }

    let entries = h.orchestrator.messages(conversation).await.expect("messages");
    let message = entries
        .iter()
        .filter_map(ChatEntry::persisted)
        .find(|m| m.id == reply.id)
        .expect("reply");
    assert_eq!(message.reactions.len(), 1);
    assert_eq!(message.reactions[0].count, 1);
    assert!(message.reactions[0].reacted_by_me);

    assert!(
        h.orchestrator
            .remove_message_reaction(reply.id, "👍")
            .await
            .expect("remove")
    );
    assert!(
        !h.orchestrator
            .remove_message_reaction(reply.id, "👍")
            .await
            .expect("remove again")
    );
}

#[tokio::test]
async fn negative_feedback_is_stored_and_learned_once() {
    let h = Harness::new().await;
    let (bot, conversation) = h.conversation("Pip").await;
    let (_, reply) = delivered(&h, conversation, "hello").await;

    let outcome = h
        .orchestrator
        .submit_feedback(reply.id, FeedbackScore::Negative)
        .await
        .expect("feedback");
    assert_eq!(outcome.message.feedback_score, Some(FeedbackScore::Negative));
    assert_eq!(outcome.learned.as_deref(), Some(NOTE));

    let stored_reply = h
        .store
        .get_message(h.user, reply.id)
        .await
        .expect("reply");
    assert_eq!(stored_reply.feedback_score, Some(FeedbackScore::Negative));

    let memory = h.orchestrator.bot_memory(bot.id).await.expect("memory");
    assert_eq!(memory.learned_responses, vec![NOTE.to_string()]);

    let request = h.provider.last(Purpose::FeedbackNote).expect("note request");
    assert!(request.system.expect("system").contains("disliked"));
}

#[tokio::test]
async fn feedback_note_failure_still_keeps_the_score() {
    let h = Harness::new().await;
    let (bot, conversation) = h.conversation("Pip").await;
    let (_, reply) = delivered(&h, conversation, "hello").await;
    h.provider.fail_everything(true);

    let outcome = h
        .orchestrator
        .submit_feedback(reply.id, FeedbackScore::Positive)
        .await
        .expect("feedback");
    assert_eq!(outcome.learned, None);
    assert_eq!(outcome.message.feedback_score, Some(FeedbackScore::Positive));
    assert!(h.orchestrator.bot_memory(bot.id).await.is_none());
}

#[tokio::test]
async fn learned_responses_are_capped() {
    let config = OrchestratorConfig {
        max_learned_responses: 2,
        ..OrchestratorConfig::default()
    };
    let h = Harness::with_config(config).await;
    let (bot, conversation) = h.conversation("Pip").await;
    let (_, reply) = delivered(&h, conversation, "hello").await;

    for _ in 0..3 {
        h.orchestrator
            .submit_feedback(reply.id, FeedbackScore::Neutral)
            .await
            .expect("feedback");
    }
    let memory = h.orchestrator.bot_memory(bot.id).await.expect("memory");
    assert_eq!(memory.learned_responses.len(), 2);
}

// ===== derived reads =====

#[tokio::test]
async fn summary_is_generated_and_cached_on_the_conversation() {
    let h = Harness::new().await;
    let (_, conversation) = h.conversation("Pip").await;

    let empty = h
        .orchestrator
        .generate_conversation_summary(conversation)
        .await
        .expect("summary");
    assert_eq!(empty, None);
    assert_eq!(h.provider.calls(Purpose::Summary), 0);

    delivered(&h, conversation, "I love pasta").await;
    let summary = h
        .orchestrator
        .generate_conversation_summary(conversation)
        .await
        .expect("summary");
    assert_eq!(summary.as_deref(), Some(SUMMARY));

    let listed = h.orchestrator.list_conversations().await.expect("list");
    assert_eq!(listed[0].summary.as_deref(), Some(SUMMARY));
}

#[tokio::test]
async fn suggestions_are_parsed_and_limited() {
    let h = Harness::new().await;
    let (_, conversation) = h.conversation("Pip").await;
    delivered(&h, conversation, "hello").await;

    let suggestions = h
        .orchestrator
        .generate_suggestions(conversation)
        .await
        .expect("suggestions");
    assert_eq!(suggestions, vec!["Tell me more", "Why is that?", "Thanks!"]);
}

#[tokio::test]
async fn search_is_case_insensitive() {
    let h = Harness::new().await;
    let (_, conversation) = h.conversation("Pip").await;
    delivered(&h, conversation, "Pasta for dinner?").await;
    delivered(&h, conversation, "or maybe soup").await;

    let found = h
        .orchestrator
        .search_messages(conversation, "PASTA")
        .await
        .expect("search");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].content, "Pasta for dinner?");
}

// ===== memory & mood =====

#[tokio::test]
async fn memory_refreshes_once_the_window_is_long_enough() {
    let h = Harness::new().await;
    let (bot, conversation) = h.conversation("Pip").await;

    delivered(&h, conversation, "hi").await;
    delivered(&h, conversation, "I love pasta").await;
    assert_eq!(h.provider.calls(Purpose::MemoryExtraction), 0);

    delivered(&h, conversation, "especially carbonara").await;
    assert_eq!(h.provider.calls(Purpose::MemoryExtraction), 1);

    let memory = h.orchestrator.bot_memory(bot.id).await.expect("memory");
    assert_eq!(memory.summary, "User likes pasta.");
    assert_eq!(memory.preferences["food"], "pasta");

    // later replies see the memory in their prompt
    delivered(&h, conversation, "what should I cook?").await;
    let system = h
        .provider
        .last(Purpose::Reply)
        .and_then(|r| r.system)
        .expect("system");
    assert!(system.contains("User likes pasta."));
}

#[tokio::test]
async fn remote_mood_is_used_when_enabled() {
    let config = OrchestratorConfig {
        remote_mood: true,
        ..OrchestratorConfig::default()
    };
    let h = Harness::with_config(config).await;
    let (_, conversation) = h.conversation("Pip").await;
    delivered(&h, conversation, "I'm furious").await;

    assert_eq!(h.provider.calls(Purpose::MoodClassification), 1);
    let listed = h.orchestrator.list_conversations().await.expect("list");
    assert_eq!(listed[0].last_mood, Some(Mood::Calm));
}

// ===== bots =====

#[tokio::test]
async fn bot_updates_reach_open_sessions() {
    let h = Harness::new().await;
    let (mut bot, conversation) = h.conversation("Pip").await;
    delivered(&h, conversation, "hi").await;

    bot.system_prompt = Some("Only answer in haiku.".into());
    h.orchestrator.update_bot(bot).await.expect("update");
    delivered(&h, conversation, "again").await;

    let system = h
        .provider
        .last(Purpose::Reply)
        .and_then(|r| r.system)
        .expect("system");
    assert_eq!(system, "Only answer in haiku.");
}

#[tokio::test]
async fn deleting_a_bot_removes_its_conversation() {
    let h = Harness::new().await;
    let (bot, conversation) = h.conversation("Pip").await;
    delivered(&h, conversation, "bye").await;

    h.orchestrator.delete_bot(bot.id).await.expect("delete");
    assert!(h.orchestrator.list_bots().await.expect("bots").is_empty());
    assert!(
        h.orchestrator
            .list_conversations()
            .await
            .expect("conversations")
            .is_empty()
    );
    assert_eq!(h.store.message_count().await, 0);
}

#[tokio::test]
async fn nameless_bots_are_rejected() {
    let h = Harness::new().await;
    let result = h
        .orchestrator
        .create_bot(botchat::types::NewBot::new("  "))
        .await;
    assert!(matches!(result, Err(ChatError::Invalid(_))));
}

#[tokio::test]
async fn connectivity_changes_are_published() {
    let h = Harness::new().await;
    let mut events = h.orchestrator.subscribe();
    assert!(h.orchestrator.is_online());

    h.orchestrator.set_online(false).await;
    assert!(!h.orchestrator.is_online());
    // a repeated state is not a transition
    h.orchestrator.set_online(false).await;
    h.orchestrator.set_online(true).await;

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let EventKind::Connectivity(online) = event.kind {
            seen.push(online);
        }
    }
    assert_eq!(seen, vec![false, true]);
}
