use botchat::error::StoreError;
use botchat::store::{ChatStore, InMemoryStore, MessageQuery};
use botchat::types::{
    Attachment, AttachmentKind, BotMemory, ConversationPatch, FeedbackScore, NewBot, NewMessage,
    Sender,
};
use botchat::mood::Mood;
use uuid::Uuid;

async fn seeded() -> (InMemoryStore, Uuid, Uuid, Uuid) {
    let store = InMemoryStore::new();
    let user = Uuid::new_v4();
    let bot = store
        .insert_bot(user, NewBot::new("Echo"))
        .await
        .expect("bot");
    let conversation = store
        .insert_conversation(user, bot.id, bot.name.clone())
        .await
        .expect("conversation");
    (store, user, bot.id, conversation.id)
}

#[tokio::test]
async fn rows_of_other_users_are_invisible() {
    let (store, owner, bot, conversation) = seeded().await;
    let stranger = Uuid::new_v4();

    assert!(matches!(
        store.get_bot(stranger, bot).await,
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(
        store.get_conversation(stranger, conversation).await,
        Err(StoreError::NotFound(_))
    ));
    assert!(store.list_bots(stranger).await.expect("list").is_empty());
    assert!(
        store
            .insert_message(stranger, NewMessage::text(conversation, Sender::User, "hi"))
            .await
            .is_err()
    );
    assert_eq!(store.list_bots(owner).await.expect("list").len(), 1);
}

#[tokio::test]
async fn one_conversation_per_user_and_bot() {
    let (store, user, bot, conversation) = seeded().await;
    let second = store.insert_conversation(user, bot, "again".into()).await;
    assert!(matches!(second, Err(StoreError::Invalid(_))));

    let found = store
        .find_conversation(user, bot)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(found.id, conversation);
}

#[tokio::test]
async fn reply_target_must_share_the_conversation() {
    let (store, user, _, conversation) = seeded().await;
    let other_bot = store
        .insert_bot(user, NewBot::new("Other"))
        .await
        .expect("bot");
    let other = store
        .insert_conversation(user, other_bot.id, "Other".into())
        .await
        .expect("conversation");
    let foreign = store
        .insert_message(user, NewMessage::text(other.id, Sender::User, "elsewhere"))
        .await
        .expect("message");

    let mut reply = NewMessage::text(conversation, Sender::User, "re");
    reply.reply_to = Some(foreign.id);
    assert!(matches!(
        store.insert_message(user, reply).await,
        Err(StoreError::Invalid(_))
    ));
}

#[tokio::test]
async fn messages_order_limit_and_until() {
    let (store, user, _, conversation) = seeded().await;
    let mut ids = Vec::new();
    for text in ["one", "two", "three", "four"] {
        let m = store
            .insert_message(user, NewMessage::text(conversation, Sender::User, text))
            .await
            .expect("insert");
        ids.push(m);
    }

    let oldest: Vec<String> = store
        .list_messages(user, conversation, MessageQuery::all())
        .await
        .expect("list")
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(oldest, vec!["one", "two", "three", "four"]);

    let latest: Vec<String> = store
        .list_messages(user, conversation, MessageQuery::latest(2))
        .await
        .expect("list")
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(latest, vec!["four", "three"]);

    let until: Vec<String> = store
        .list_messages(
            user,
            conversation,
            MessageQuery::latest(10).until(ids[1].created_at),
        )
        .await
        .expect("list")
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(until, vec!["two", "one"]);
}

#[tokio::test]
async fn reactions_are_unique_and_aggregated() {
    let (store, user, _, conversation) = seeded().await;
    let message = store
        .insert_message(user, NewMessage::text(conversation, Sender::Bot, "hello"))
        .await
        .expect("message");

    store
        .insert_reaction(user, message.id, "👍")
        .await
        .expect("first");
    assert!(matches!(
        store.insert_reaction(user, message.id, "👍").await,
        Err(StoreError::Invalid(_))
    ));
    store
        .insert_reaction(user, message.id, "🎉")
        .await
        .expect("second emoji");

    let read = store.get_message(user, message.id).await.expect("get");
    assert_eq!(read.reactions.len(), 2);
    assert!(read.reactions.iter().all(|r| r.count == 1 && r.reacted_by_me));
    // equal counts sort by emoji
    assert!(read.reactions[0].emoji < read.reactions[1].emoji);

    let existing = store
        .find_reaction(user, message.id, "👍")
        .await
        .expect("find")
        .expect("exists");
    store
        .delete_reaction(user, existing.id)
        .await
        .expect("delete");
    let read = store.get_message(user, message.id).await.expect("get");
    assert_eq!(read.reactions.len(), 1);
    assert_eq!(read.reactions[0].emoji, "🎉");
}

#[tokio::test]
async fn attachments_are_written_with_the_message() {
    let (store, user, _, conversation) = seeded().await;
    let mut new = NewMessage::text(conversation, Sender::User, "look");
    new.attachments = vec![Attachment::new(
        AttachmentKind::Image,
        "https://example.com/cat.png",
    )];
    let stored = store.insert_message(user, new).await.expect("insert");
    assert_eq!(stored.attachments.len(), 1);
    assert_eq!(stored.attachments[0].kind, AttachmentKind::Image);
}

#[tokio::test]
async fn feedback_search_and_clear() {
    let (store, user, _, conversation) = seeded().await;
    let m = store
        .insert_message(user, NewMessage::text(conversation, Sender::Bot, "Try the Pasta"))
        .await
        .expect("insert");
    store
        .insert_message(user, NewMessage::text(conversation, Sender::User, "ok"))
        .await
        .expect("insert");

    let rated = store
        .set_feedback(user, m.id, FeedbackScore::Negative)
        .await
        .expect("feedback");
    assert_eq!(rated.feedback_score, Some(FeedbackScore::Negative));

    let found = store
        .search_messages(user, conversation, "pasta")
        .await
        .expect("search");
    assert_eq!(found.len(), 1);
    assert!(
        store
            .search_messages(user, conversation, "  ")
            .await
            .expect("search")
            .is_empty()
    );

    assert_eq!(
        store
            .clear_messages(user, conversation)
            .await
            .expect("clear"),
        2
    );
    assert_eq!(store.message_count().await, 0);
}

#[tokio::test]
async fn conversation_patch_bumps_recency() {
    let (store, user, _, conversation) = seeded().await;
    let other_bot = store.insert_bot(user, NewBot::new("B")).await.expect("bot");
    let newer = store
        .insert_conversation(user, other_bot.id, "B".into())
        .await
        .expect("conversation");

    let listed = store.list_conversations(user).await.expect("list");
    assert_eq!(listed[0].id, newer.id);

    let patched = store
        .update_conversation(
            user,
            conversation,
            ConversationPatch {
                last_mood: Some(Mood::Calm),
                summary: None,
            },
        )
        .await
        .expect("patch");
    assert_eq!(patched.last_mood, Some(Mood::Calm));

    let listed = store.list_conversations(user).await.expect("list");
    assert_eq!(listed[0].id, conversation);
}

#[tokio::test]
async fn memory_upsert_is_keyed_by_bot_and_user() {
    let (store, user, bot, _) = seeded().await;
    assert!(store.get_memory(user, bot).await.expect("get").is_none());

    let mut memory = BotMemory::empty(bot, user);
    memory.summary = "first".into();
    store.upsert_memory(user, memory.clone()).await.expect("insert");
    memory.summary = "second".into();
    store.upsert_memory(user, memory).await.expect("replace");

    let stored = store.get_memory(user, bot).await.expect("get").expect("exists");
    assert_eq!(stored.summary, "second");

    let stranger = Uuid::new_v4();
    let forged = BotMemory::empty(bot, user);
    assert!(matches!(
        store.upsert_memory(stranger, forged).await,
        Err(StoreError::Unauthorized(_))
    ));
}

#[tokio::test]
async fn deleting_a_bot_cascades() {
    let (store, user, bot, conversation) = seeded().await;
    store
        .insert_message(user, NewMessage::text(conversation, Sender::User, "bye"))
        .await
        .expect("insert");
    store.delete_bot(user, bot).await.expect("delete");

    assert!(store.find_conversation(user, bot).await.expect("find").is_none());
    assert_eq!(store.message_count().await, 0);
}

#[tokio::test]
async fn unreachable_store_fails_transiently_and_counts_no_writes() {
    let (store, user, _, conversation) = seeded().await;
    let before = store.write_count();
    store.set_reachable(false);

    let err = store
        .insert_message(user, NewMessage::text(conversation, Sender::User, "hi"))
        .await
        .expect_err("offline");
    assert!(err.is_transient());
    assert_eq!(store.write_count(), before);

    store.set_reachable(true);
    tokio_test::assert_ok!(
        store
            .insert_message(user, NewMessage::text(conversation, Sender::User, "hi"))
            .await
    );
    assert_eq!(store.write_count(), before + 1);
}
