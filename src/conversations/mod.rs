//! Two-party conversations keyed by their sorted participant pair.
//!
//! A conversation must be started explicitly (search, then "start chat") before
//! anything can be sent; a send to someone you have no conversation with is
//! dropped. Unread counters are per participant and only ever moved by atomic
//! `UPDATE`s. Every write transaction opens with a write, so concurrent senders
//! queue on the database lock instead of failing.
mod pair;
pub mod routes;

use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    AppError, AppResult,
    auth::username_exists,
    db::{self, Message},
    events::{ChatEvent, Hub},
};

pub use pair::ParticipantPair;

/// One row of a user's conversation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct ConversationSummary {
    pub key: String,
    pub with_user: String,
    pub unread: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
struct ConversationRow {
    key: String,
    created_at: i64,
    updated_at: i64,
}

/// Everything needed to show one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Thread {
    pub key: String,
    #[serde(skip)]
    pub pair: ParticipantPair,
    pub participants: [String; 2],
    pub messages: Vec<Message>,
    pub unread: BTreeMap<String, i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent(Message),
    NoConversation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Started {
    pub key: String,
    pub created: bool,
}

async fn resolve(db_pool: &SqlitePool, pair: &ParticipantPair) -> AppResult<Option<ConversationRow>> {
    Ok(
        sqlx::query_as("SELECT key,created_at,updated_at FROM conversations WHERE key=?")
            .bind(pair.key())
            .fetch_optional(db_pool)
            .await?,
    )
}

/// Opens a conversation between `me` and `other`, reusing the existing one if any.
pub async fn start(db_pool: &SqlitePool, hub: &Hub, me: &str, other: &str) -> AppResult<Started> {
    let pair = ParticipantPair::new(me, other)?;
    if !username_exists(db_pool, other).await? {
        return Err(AppError::UnknownUser(other.to_owned()));
    }

    let key = pair.key();
    let [a, b] = pair.participants();
    let now = db::now_millis();

    let mut tx = db_pool.begin().await?;
    let created = sqlx::query(
        "INSERT INTO conversations (key,participant_a,participant_b,created_at,updated_at) VALUES (?,?,?,?,?)
         ON CONFLICT(key) DO NOTHING",
    )
    .bind(&key)
    .bind(&a)
    .bind(&b)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .rows_affected()
        == 1;
    for username in [&a, &b] {
        sqlx::query("INSERT INTO unread (conversation_key,username,count) VALUES (?,?,0) ON CONFLICT DO NOTHING")
            .bind(&key)
            .bind(username)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    if created {
        info!("conversation {pair} started by @{me}");
        hub.publish(ChatEvent::ConversationStarted {
            conversation: key.clone(),
            participants: [a, b],
        });
    }
    Ok(Started { key, created })
}

/// Conversations `username` takes part in, most recently active first.
pub async fn list_for(db_pool: &SqlitePool, username: &str) -> AppResult<Vec<ConversationSummary>> {
    Ok(sqlx::query_as(
        "SELECT c.key AS key,
                CASE WHEN c.participant_a = ?1 THEN c.participant_b ELSE c.participant_a END AS with_user,
                COALESCE(u.count, 0) AS unread,
                c.updated_at AS updated_at
         FROM conversations c
         LEFT JOIN unread u ON u.conversation_key = c.key AND u.username = ?1
         WHERE c.participant_a = ?1 OR c.participant_b = ?1
         ORDER BY c.updated_at DESC, c.key",
    )
    .bind(username)
    .fetch_all(db_pool)
    .await?)
}

pub async fn unread_counts(db_pool: &SqlitePool, key: &str) -> AppResult<BTreeMap<String, i64>> {
    let rows: Vec<(String, i64)> = sqlx::query_as("SELECT username,count FROM unread WHERE conversation_key=?")
        .bind(key)
        .fetch_all(db_pool)
        .await?;
    Ok(rows.into_iter().collect())
}

/// The conversation between `a` and `b` with its messages in send order.
pub async fn thread(db_pool: &SqlitePool, a: &str, b: &str) -> AppResult<Option<Thread>> {
    let pair = ParticipantPair::new(a, b)?;
    let Some(row) = resolve(db_pool, &pair).await? else {
        return Ok(None);
    };

    let messages: Vec<Message> = sqlx::query_as(
        "SELECT id,sender,text,sent_at FROM messages WHERE conversation_key=? ORDER BY seq",
    )
    .bind(&row.key)
    .fetch_all(db_pool)
    .await?;
    let unread = unread_counts(db_pool, &row.key).await?;

    Ok(Some(Thread {
        key: row.key,
        participants: pair.participants(),
        pair,
        messages,
        unread,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }))
}

/// Appends a message from `sender` to `recipient` and bumps the recipient's unread count.
pub async fn send(
    db_pool: &SqlitePool,
    hub: &Hub,
    sender: &str,
    recipient: &str,
    text: &str,
) -> AppResult<SendOutcome> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::MissingFields);
    }
    let pair = ParticipantPair::new(sender, recipient)?;
    let key = pair.key();

    let message = Message {
        id: Uuid::now_v7().to_string(),
        sender: sender.to_owned(),
        text: text.to_owned(),
        sent_at: db::now_millis(),
    };

    // Must open with the write: a read-first transaction can't wait to upgrade.
    let mut tx = db_pool.begin().await?;
    let inserted = sqlx::query(
        "INSERT INTO messages (id,conversation_key,sender,text,sent_at)
         SELECT ?1,?2,?3,?4,?5 WHERE EXISTS (SELECT 1 FROM conversations WHERE key=?2)",
    )
    .bind(&message.id)
    .bind(&key)
    .bind(&message.sender)
    .bind(&message.text)
    .bind(message.sent_at)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    if inserted == 0 {
        debug!("dropping message from @{sender}, no conversation with @{recipient}");
        return Ok(SendOutcome::NoConversation);
    }

    let (unread,): (i64,) = sqlx::query_as(
        "INSERT INTO unread (conversation_key,username,count) VALUES (?,?,1)
         ON CONFLICT(conversation_key,username) DO UPDATE SET count = count + 1
         RETURNING count",
    )
    .bind(&key)
    .bind(recipient)
    .fetch_one(&mut *tx)
    .await?;
    sqlx::query("UPDATE conversations SET updated_at=? WHERE key=?")
        .bind(message.sent_at)
        .bind(&key)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    hub.publish(ChatEvent::MessageAppended {
        conversation: key.clone(),
        participants: pair.participants(),
        message: message.clone(),
    });
    hub.publish(ChatEvent::UnreadChanged {
        conversation: key,
        username: recipient.to_owned(),
        count: unread,
    });
    Ok(SendOutcome::Sent(message))
}

/// Resets `viewer`'s unread count for their conversation with `other`.
/// Returns `false` if there is no such conversation.
pub async fn mark_read(db_pool: &SqlitePool, hub: &Hub, viewer: &str, other: &str) -> AppResult<bool> {
    let pair = ParticipantPair::new(viewer, other)?;
    let key = pair.key();
    if resolve(db_pool, &pair).await?.is_none() {
        return Ok(false);
    }

    let previous: Option<(i64,)> = sqlx::query_as(
        "UPDATE unread SET count = 0 WHERE conversation_key=? AND username=? AND count != 0 RETURNING 0",
    )
    .bind(&key)
    .bind(viewer)
    .fetch_optional(db_pool)
    .await?;

    if previous.is_some() {
        hub.publish(ChatEvent::UnreadChanged {
            conversation: key,
            username: viewer.to_owned(),
            count: 0,
        });
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::create_account;

    async fn setup(names: &[&str]) -> (SqlitePool, Hub) {
        let db_pool = db::memory().await.unwrap();
        for name in names {
            create_account(&db_pool, &format!("{name}@example.com"), "password1", name)
                .await
                .unwrap();
        }
        (db_pool, Hub::new(16))
    }

    fn sent(outcome: SendOutcome) -> Message {
        match outcome {
            SendOutcome::Sent(message) => message,
            SendOutcome::NoConversation => panic!("message was dropped"),
        }
    }

    #[tokio::test]
    async fn send_without_conversation_is_dropped() {
        let (db_pool, hub) = setup(&["alice", "bob"]).await;

        let outcome = send(&db_pool, &hub, "alice", "bob", "hi").await.unwrap();
        assert_eq!(outcome, SendOutcome::NoConversation);
        assert!(thread(&db_pool, "alice", "bob").await.unwrap().is_none());

        let (messages,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages")
            .fetch_one(&db_pool)
            .await
            .unwrap();
        assert_eq!(messages, 0);
    }

    #[tokio::test]
    async fn first_message_after_start() {
        let (db_pool, hub) = setup(&["alice", "bob"]).await;
        let started = start(&db_pool, &hub, "alice", "bob").await.unwrap();
        assert!(started.created);

        sent(send(&db_pool, &hub, "alice", "bob", "hi").await.unwrap());

        let thread = thread(&db_pool, "alice", "bob").await.unwrap().unwrap();
        assert_eq!(thread.key, started.key);
        assert_eq!(thread.messages.len(), 1);
        assert_eq!(thread.messages[0].text, "hi");
        assert_eq!(thread.messages[0].sender, "alice");
        assert_eq!(
            thread.unread,
            BTreeMap::from([("alice".to_owned(), 0), ("bob".to_owned(), 1)])
        );
    }

    #[tokio::test]
    async fn either_order_resolves_the_same_conversation() {
        let (db_pool, hub) = setup(&["alice", "bob"]).await;
        let first = start(&db_pool, &hub, "bob", "alice").await.unwrap();
        let second = start(&db_pool, &hub, "alice", "bob").await.unwrap();
        assert_eq!(first.key, second.key);
        assert!(!second.created);

        let ab = thread(&db_pool, "alice", "bob").await.unwrap().unwrap();
        let ba = thread(&db_pool, "bob", "alice").await.unwrap().unwrap();
        assert_eq!(ab, ba);

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM conversations")
            .fetch_one(&db_pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn appending_keeps_earlier_messages_in_order() {
        let (db_pool, hub) = setup(&["alice", "bob"]).await;
        start(&db_pool, &hub, "alice", "bob").await.unwrap();

        let mut expected = Vec::new();
        for (i, (from, to)) in [("alice", "bob"), ("bob", "alice"), ("alice", "bob")].into_iter().enumerate() {
            let before = thread(&db_pool, from, to).await.unwrap().unwrap().messages;
            assert_eq!(before, expected);

            expected.push(sent(send(&db_pool, &hub, from, to, &format!("message {i}")).await.unwrap()));
        }

        let after = thread(&db_pool, "bob", "alice").await.unwrap().unwrap().messages;
        assert_eq!(after, expected);
    }

    #[tokio::test]
    async fn mark_read_only_touches_the_viewer() {
        let (db_pool, hub) = setup(&["alice", "bob"]).await;
        start(&db_pool, &hub, "alice", "bob").await.unwrap();
        sent(send(&db_pool, &hub, "alice", "bob", "one").await.unwrap());
        sent(send(&db_pool, &hub, "bob", "alice", "two").await.unwrap());
        sent(send(&db_pool, &hub, "bob", "alice", "three").await.unwrap());

        let key = ParticipantPair::new("alice", "bob").unwrap().key();
        assert_eq!(
            unread_counts(&db_pool, &key).await.unwrap(),
            BTreeMap::from([("alice".to_owned(), 2), ("bob".to_owned(), 1)])
        );

        assert!(mark_read(&db_pool, &hub, "alice", "bob").await.unwrap());
        assert_eq!(
            unread_counts(&db_pool, &key).await.unwrap(),
            BTreeMap::from([("alice".to_owned(), 0), ("bob".to_owned(), 1)])
        );

        assert!(!mark_read(&db_pool, &hub, "alice", "nobody").await.unwrap());
    }

    #[tokio::test]
    async fn start_rejects_unknown_users_and_self() {
        let (db_pool, hub) = setup(&["alice"]).await;
        assert!(matches!(
            start(&db_pool, &hub, "alice", "ghost").await,
            Err(AppError::UnknownUser(name)) if name == "ghost"
        ));
        assert!(matches!(start(&db_pool, &hub, "alice", "alice").await, Err(AppError::SelfChat)));
    }

    #[tokio::test]
    async fn blank_messages_are_rejected() {
        let (db_pool, hub) = setup(&["alice", "bob"]).await;
        start(&db_pool, &hub, "alice", "bob").await.unwrap();
        assert!(matches!(
            send(&db_pool, &hub, "alice", "bob", "   ").await,
            Err(AppError::MissingFields)
        ));
    }

    #[tokio::test]
    async fn list_shows_the_other_participant_and_own_unread() {
        let (db_pool, hub) = setup(&["alice", "bob", "carol"]).await;
        start(&db_pool, &hub, "alice", "bob").await.unwrap();
        start(&db_pool, &hub, "carol", "alice").await.unwrap();
        sent(send(&db_pool, &hub, "carol", "alice", "hey").await.unwrap());

        let list = list_for(&db_pool, "alice").await.unwrap();
        let with: Vec<(&str, i64)> = list.iter().map(|c| (c.with_user.as_str(), c.unread)).collect();
        assert_eq!(with.len(), 2);
        assert!(with.contains(&("bob", 0)));
        assert!(with.contains(&("carol", 1)));

        let bob = list_for(&db_pool, "bob").await.unwrap();
        assert_eq!(bob.len(), 1);
        assert_eq!(bob[0].with_user, "alice");
        assert!(list_for(&db_pool, "nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_publishes_to_both_participants() {
        let (db_pool, hub) = setup(&["alice", "bob"]).await;
        start(&db_pool, &hub, "alice", "bob").await.unwrap();
        let mut bob = hub.subscribe("bob");
        let mut alice = hub.subscribe("alice");

        let message = sent(send(&db_pool, &hub, "alice", "bob", "hi").await.unwrap());

        let appended = ChatEvent::MessageAppended {
            conversation: "alice:bob".to_owned(),
            participants: ["alice".to_owned(), "bob".to_owned()],
            message,
        };
        assert_eq!(bob.next().await, Some(appended.clone()));
        assert_eq!(
            bob.next().await,
            Some(ChatEvent::UnreadChanged {
                conversation: "alice:bob".to_owned(),
                username: "bob".to_owned(),
                count: 1,
            })
        );
        assert_eq!(alice.next().await, Some(appended));
    }
}
