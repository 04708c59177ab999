use std::collections::HashMap;

use sqlx::{SqliteConnection, SqlitePool};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    db,
    error::{ChatError, ChatResult, is_unique_violation},
    hub::{Event, Hub, Subscription},
    profiles,
};

use super::message::{DeliveryState, Draft, Message};

const MESSAGE_COLUMNS: &str = "seq,id,pairing_id,sender_id,sender_name,kind,text,image_url,audio_url,drawing_url,timestamp,sent_at,delivery";

#[derive(sqlx::FromRow)]
struct MessageRow {
    seq: i64,
    id: String,
    pairing_id: String,
    sender_id: String,
    sender_name: String,
    kind: String,
    text: String,
    image_url: String,
    audio_url: String,
    drawing_url: String,
    timestamp: i64,
    sent_at: Option<i64>,
    delivery: i64,
}

impl MessageRow {
    fn into_message(self, reactions: &mut HashMap<String, Vec<(String, String)>>) -> ChatResult<Message> {
        Ok(Message {
            kind: self.kind.parse()?,
            reactions: reactions.remove(&self.id).unwrap_or_default().into_iter().collect(),
            delivery_state: DeliveryState::from_rank(self.delivery),
            id: self.id,
            seq: self.seq,
            pairing_id: self.pairing_id,
            sender_id: self.sender_id,
            sender_display_name: self.sender_name,
            text: self.text,
            image_url: self.image_url,
            audio_url: self.audio_url,
            drawing_url: self.drawing_url,
            timestamp: self.timestamp,
            sent_at: self.sent_at,
        })
    }
}

async fn fetch_row(conn: &mut SqliteConnection, pairing_id: &str, message_id: &str) -> sqlx::Result<Option<MessageRow>> {
    sqlx::query_as(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id=? AND pairing_id=?"))
        .bind(message_id)
        .bind(pairing_id)
        .fetch_optional(conn)
        .await
}

async fn reactions_for(
    conn: &mut SqliteConnection,
    pairing_id: &str,
) -> sqlx::Result<HashMap<String, Vec<(String, String)>>> {
    let rows: Vec<(String, String, String)> = sqlx::query_as(
        "SELECT r.message_id,r.user_id,r.token FROM reactions r JOIN messages m ON m.id=r.message_id WHERE m.pairing_id=?",
    )
    .bind(pairing_id)
    .fetch_all(conn)
    .await?;

    let mut by_message: HashMap<String, Vec<(String, String)>> = HashMap::new();
    for (message_id, user_id, token) in rows {
        by_message.entry(message_id).or_default().push((user_id, token));
    }
    Ok(by_message)
}

async fn assemble(conn: &mut SqliteConnection, pairing_id: &str, rows: Vec<MessageRow>) -> ChatResult<Vec<Message>> {
    let mut reactions = reactions_for(conn, pairing_id).await?;
    rows.into_iter()
        .map(|row| row.into_message(&mut reactions))
        .collect()
}

/// Adds a message to the pairing's log and returns its id.
///
/// The sender must currently be in `pairing_id`. A draft whose `client_token` was
/// already stored returns the existing message id instead of a duplicate.
pub async fn append_message(
    db_pool: &SqlitePool,
    hub: &Hub,
    pairing_id: &str,
    sender_id: &str,
    draft: Draft,
) -> ChatResult<String> {
    profiles::require_pairing(db_pool, sender_id, pairing_id).await?;
    let (kind, draft) = draft.validate()?;

    let mut tx = db_pool.begin().await?;

    if let Some(token) = &draft.client_token {
        if let Some(existing) = find_by_token(&mut tx, pairing_id, sender_id, token).await? {
            debug!(pairing_id, message_id = existing, "duplicate submission");
            return Ok(existing);
        }
    }

    let (sender_name,): (String,) = sqlx::query_as("SELECT display_name FROM profiles WHERE user_id=?")
        .bind(sender_id)
        .fetch_one(&mut *tx)
        .await?;

    let (latest,): (Option<i64>,) = sqlx::query_as("SELECT MAX(timestamp) FROM messages WHERE pairing_id=?")
        .bind(pairing_id)
        .fetch_one(&mut *tx)
        .await?;
    let timestamp = latest.map_or(db::now_millis(), |latest| latest.max(db::now_millis()));

    let id = Uuid::now_v7().to_string();
    let inserted = sqlx::query(
        "INSERT INTO messages (id,pairing_id,sender_id,sender_name,kind,text,image_url,audio_url,drawing_url,timestamp,sent_at,delivery,client_token) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?)",
    )
    .bind(&id)
    .bind(pairing_id)
    .bind(sender_id)
    .bind(&sender_name)
    .bind(kind.as_str())
    .bind(&draft.text)
    .bind(&draft.image_url)
    .bind(&draft.audio_url)
    .bind(&draft.drawing_url)
    .bind(timestamp)
    .bind(draft.sent_at)
    .bind(DeliveryState::Sent.rank())
    .bind(&draft.client_token)
    .execute(&mut *tx)
    .await;

    match inserted {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) && draft.client_token.is_some() => {
            drop(tx);
            let mut conn = db_pool.acquire().await?;
            let token = draft.client_token.as_deref().unwrap_or_default();
            return find_by_token(&mut conn, pairing_id, sender_id, token)
                .await?
                .ok_or(ChatError::Transport(e.into()));
        }
        Err(e) => return Err(e.into()),
    }

    tx.commit().await?;
    debug!(pairing_id, message_id = id, kind = kind.as_str(), "message appended");
    hub.conversation_changed(pairing_id);
    Ok(id)
}

async fn find_by_token(
    conn: &mut SqliteConnection,
    pairing_id: &str,
    sender_id: &str,
    token: &str,
) -> sqlx::Result<Option<String>> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT id FROM messages WHERE pairing_id=? AND sender_id=? AND client_token=?")
            .bind(pairing_id)
            .bind(sender_id)
            .bind(token)
            .fetch_optional(conn)
            .await?;
    Ok(row.map(|(id,)| id))
}

/// Every message ever stored under `pairing_id`, oldest first.
///
/// Works for pairings that have since ended; the log outlives the pairing.
pub async fn list_messages(db_pool: &SqlitePool, pairing_id: &str) -> ChatResult<Vec<Message>> {
    let mut conn = db_pool.acquire().await?;
    let rows: Vec<MessageRow> = sqlx::query_as(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE pairing_id=? ORDER BY timestamp, seq"
    ))
    .bind(pairing_id)
    .fetch_all(&mut *conn)
    .await?;
    assemble(&mut conn, pairing_id, rows).await
}

/// Up to `limit` messages with a sequence number above `after_seq`, oldest first.
pub async fn messages_after(
    db_pool: &SqlitePool,
    pairing_id: &str,
    after_seq: i64,
    limit: i64,
) -> ChatResult<Vec<Message>> {
    let mut conn = db_pool.acquire().await?;
    let rows: Vec<MessageRow> = sqlx::query_as(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE pairing_id=? AND seq>? ORDER BY timestamp, seq LIMIT ?"
    ))
    .bind(pairing_id)
    .bind(after_seq)
    .bind(limit.max(0))
    .fetch_all(&mut *conn)
    .await?;
    assemble(&mut conn, pairing_id, rows).await
}

pub async fn get_message(db_pool: &SqlitePool, pairing_id: &str, message_id: &str) -> ChatResult<Message> {
    let mut conn = db_pool.acquire().await?;
    let row = fetch_row(&mut conn, pairing_id, message_id)
        .await?
        .ok_or_else(|| ChatError::MessageNotFound(message_id.to_owned()))?;
    let mut reactions = HashMap::new();
    let rows: Vec<(String, String)> = sqlx::query_as("SELECT user_id,token FROM reactions WHERE message_id=?")
        .bind(message_id)
        .fetch_all(&mut *conn)
        .await?;
    reactions.insert(message_id.to_owned(), rows);
    row.into_message(&mut reactions)
}

/// Advances a message's delivery state. Only the recipient may do this, and never
/// backwards; setting the current state again is a no-op.
pub async fn set_delivery_state(
    db_pool: &SqlitePool,
    hub: &Hub,
    pairing_id: &str,
    message_id: &str,
    observer_id: &str,
    state: DeliveryState,
) -> ChatResult<()> {
    profiles::require_pairing(db_pool, observer_id, pairing_id).await?;
    let mut conn = db_pool.acquire().await?;

    let row = fetch_row(&mut conn, pairing_id, message_id)
        .await?
        .ok_or_else(|| ChatError::MessageNotFound(message_id.to_owned()))?;
    if row.sender_id == observer_id {
        return Err(ChatError::Forbidden);
    }

    let advanced = sqlx::query("UPDATE messages SET delivery=? WHERE id=? AND pairing_id=? AND delivery<?")
        .bind(state.rank())
        .bind(message_id)
        .bind(pairing_id)
        .bind(state.rank())
        .execute(&mut *conn)
        .await?
        .rows_affected();
    if advanced == 1 {
        hub.conversation_changed(pairing_id);
        return Ok(());
    }

    let (current,): (i64,) = sqlx::query_as("SELECT delivery FROM messages WHERE id=?")
        .bind(message_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ChatError::MessageNotFound(message_id.to_owned()))?;
    let current = DeliveryState::from_rank(current);
    if current > state {
        return Err(ChatError::DeliveryRegression { from: current, to: state });
    }
    Ok(())
}

/// Marks the partner's `sent` messages as delivered to `observer_id`, provided the
/// partner is online. Returns how many moved.
pub async fn acknowledge_delivered(
    db_pool: &SqlitePool,
    hub: &Hub,
    pairing_id: &str,
    observer_id: &str,
) -> ChatResult<u64> {
    let pairing = profiles::require_pairing(db_pool, observer_id, pairing_id).await?;
    let mut conn = db_pool.acquire().await?;

    let (online,): (bool,) = sqlx::query_as("SELECT online FROM profiles WHERE user_id=?")
        .bind(&pairing.partner_user_id)
        .fetch_one(&mut *conn)
        .await?;
    if !online {
        return Ok(0);
    }

    let moved = sqlx::query("UPDATE messages SET delivery=? WHERE pairing_id=? AND sender_id=? AND delivery<?")
        .bind(DeliveryState::Delivered.rank())
        .bind(pairing_id)
        .bind(&pairing.partner_user_id)
        .bind(DeliveryState::Delivered.rank())
        .execute(&mut *conn)
        .await?
        .rows_affected();
    if moved > 0 {
        hub.conversation_changed(pairing_id);
    }
    Ok(moved)
}

/// Sets `user_id`'s reaction on a message, or removes it when it already equals
/// `token`. Returns the reaction left in place.
pub async fn toggle_reaction(
    db_pool: &SqlitePool,
    hub: &Hub,
    pairing_id: &str,
    message_id: &str,
    user_id: &str,
    token: &str,
) -> ChatResult<Option<String>> {
    let token = token.trim();
    if token.is_empty() {
        return Err(ChatError::InvalidMessage("empty reaction".to_owned()));
    }
    profiles::require_pairing(db_pool, user_id, pairing_id).await?;

    let mut tx = db_pool.begin().await?;
    if fetch_row(&mut tx, pairing_id, message_id).await?.is_none() {
        return Err(ChatError::MessageNotFound(message_id.to_owned()));
    }

    let existing: Option<(String,)> = sqlx::query_as("SELECT token FROM reactions WHERE message_id=? AND user_id=?")
        .bind(message_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

    let result = if existing.is_some_and(|(current,)| current == token) {
        sqlx::query("DELETE FROM reactions WHERE message_id=? AND user_id=?")
            .bind(message_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        None
    } else {
        sqlx::query(
            "INSERT INTO reactions (message_id,user_id,token) VALUES (?,?,?) ON CONFLICT(message_id,user_id) DO UPDATE SET token=excluded.token",
        )
        .bind(message_id)
        .bind(user_id)
        .bind(token)
        .execute(&mut *tx)
        .await?;
        Some(token.to_owned())
    };

    tx.commit().await?;
    hub.conversation_changed(pairing_id);
    Ok(result)
}

/// Hard-deletes a message. Only its sender may.
pub async fn delete_message(
    db_pool: &SqlitePool,
    hub: &Hub,
    pairing_id: &str,
    message_id: &str,
    requester_id: &str,
) -> ChatResult<()> {
    profiles::require_pairing(db_pool, requester_id, pairing_id).await?;

    let mut tx = db_pool.begin().await?;
    let row = fetch_row(&mut tx, pairing_id, message_id)
        .await?
        .ok_or_else(|| ChatError::MessageNotFound(message_id.to_owned()))?;
    if row.sender_id != requester_id {
        return Err(ChatError::Forbidden);
    }

    sqlx::query("DELETE FROM reactions WHERE message_id=?")
        .bind(message_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM messages WHERE id=?")
        .bind(message_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(pairing_id, message_id, "message deleted");
    hub.conversation_changed(pairing_id);
    Ok(())
}

/// Calls `callback` with the full ordered log now and after every change to it.
pub fn subscribe_messages(
    db_pool: SqlitePool,
    hub: &Hub,
    pairing_id: String,
    mut callback: impl FnMut(Vec<Message>) + Send + 'static,
) -> Subscription {
    let mut rx = hub.subscribe();
    Subscription::spawn(async move {
        loop {
            match list_messages(&db_pool, &pairing_id).await {
                Ok(messages) => callback(messages),
                Err(e) => warn!(pairing_id, "message subscription read failed: {e}"),
            }

            loop {
                match rx.recv().await {
                    Ok(Event::Conversation { pairing_id: changed }) if changed == pairing_id => break,
                    Ok(_) => {}
                    Err(RecvError::Lagged(_)) => break,
                    Err(RecvError::Closed) => return,
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        conversation::MessageKind,
        db::test_pool,
        profiles::{Identity, connect, disconnect, ensure_profile},
    };

    async fn paired() -> (SqlitePool, Hub, String) {
        let (db_pool, hub) = (test_pool().await, Hub::default());
        for user_id in ["a", "b", "c"] {
            let identity = Identity {
                user_id: user_id.into(),
                display_name: Some(user_id.to_uppercase()),
                contact_handle: None,
            };
            ensure_profile(&db_pool, &hub, &identity, 8).await.unwrap();
        }
        let b = profiles::fetch_profile(&db_pool, "b").await.unwrap();
        let pairing = connect(&db_pool, &hub, "a", &b.exchange_code).await.unwrap().pairing;
        (db_pool, hub, pairing.pairing_id)
    }

    #[tokio::test]
    async fn append_then_list_in_order() {
        let (db_pool, hub, pairing_id) = paired().await;

        let first = append_message(&db_pool, &hub, &pairing_id, "a", Draft::text("hello")).await.unwrap();
        let second = append_message(&db_pool, &hub, &pairing_id, "b", Draft::media(MessageKind::Image, "https://img/1"))
            .await
            .unwrap();

        let log = list_messages(&db_pool, &pairing_id).await.unwrap();
        assert_eq!(log.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), [first.as_str(), second.as_str()]);
        assert!(log[0].timestamp <= log[1].timestamp);
        assert!(log[0].seq < log[1].seq);

        let hello = &log[0];
        assert_eq!(hello.kind, MessageKind::Text);
        assert_eq!(hello.sender_display_name, "A");
        assert_eq!(hello.delivery_state, DeliveryState::Sent);
        assert!(hello.reactions.is_empty());
        assert_eq!(hello.image_url, "");
        assert_eq!(log[1].image_url, "https://img/1");
        assert_eq!(log[1].text, "");
    }

    #[tokio::test]
    async fn append_requires_membership() {
        let (db_pool, hub, pairing_id) = paired().await;

        let err = append_message(&db_pool, &hub, &pairing_id, "c", Draft::text("hi")).await.unwrap_err();
        assert!(matches!(err, ChatError::NotPaired));
        let err = append_message(&db_pool, &hub, "", "a", Draft::text("hi")).await.unwrap_err();
        assert!(matches!(err, ChatError::NotPaired));

        let err = append_message(&db_pool, &hub, &pairing_id, "a", Draft::text("  ")).await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidMessage(_)));
    }

    #[tokio::test]
    async fn client_tokens_deduplicate() {
        let (db_pool, hub, pairing_id) = paired().await;

        let draft = Draft::text("only once").with_token("tok-1");
        let first = append_message(&db_pool, &hub, &pairing_id, "a", draft.clone()).await.unwrap();
        let again = append_message(&db_pool, &hub, &pairing_id, "a", draft).await.unwrap();
        assert_eq!(first, again);

        // the same token from the other sender is a different message
        let other = append_message(&db_pool, &hub, &pairing_id, "b", Draft::text("me too").with_token("tok-1"))
            .await
            .unwrap();
        assert_ne!(first, other);
        assert_eq!(list_messages(&db_pool, &pairing_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn cursor_paging_returns_newer_messages() {
        let (db_pool, hub, pairing_id) = paired().await;
        for n in 0..5 {
            append_message(&db_pool, &hub, &pairing_id, "a", Draft::text(format!("m{n}"))).await.unwrap();
        }

        let page = messages_after(&db_pool, &pairing_id, 0, 2).await.unwrap();
        assert_eq!(page.iter().map(|m| m.text.as_str()).collect::<Vec<_>>(), ["m0", "m1"]);
        let rest = messages_after(&db_pool, &pairing_id, page[1].seq, 10).await.unwrap();
        assert_eq!(rest.iter().map(|m| m.text.as_str()).collect::<Vec<_>>(), ["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn reactions_toggle_per_user() {
        let (db_pool, hub, pairing_id) = paired().await;
        let id = append_message(&db_pool, &hub, &pairing_id, "a", Draft::text("hi")).await.unwrap();

        let set = toggle_reaction(&db_pool, &hub, &pairing_id, &id, "b", "heart").await.unwrap();
        assert_eq!(set.as_deref(), Some("heart"));
        toggle_reaction(&db_pool, &hub, &pairing_id, &id, "a", "kiss").await.unwrap();

        let message = get_message(&db_pool, &pairing_id, &id).await.unwrap();
        assert_eq!(message.reactions.get("b").map(String::as_str), Some("heart"));
        assert_eq!(message.reactions.len(), 2);

        // a different token replaces, the same token removes
        toggle_reaction(&db_pool, &hub, &pairing_id, &id, "b", "wow").await.unwrap();
        assert_eq!(get_message(&db_pool, &pairing_id, &id).await.unwrap().reactions["b"], "wow");
        let cleared = toggle_reaction(&db_pool, &hub, &pairing_id, &id, "b", "wow").await.unwrap();
        assert_eq!(cleared, None);
        assert!(!get_message(&db_pool, &pairing_id, &id).await.unwrap().reactions.contains_key("b"));

        let err = toggle_reaction(&db_pool, &hub, &pairing_id, "nope", "b", "heart").await.unwrap_err();
        assert!(matches!(err, ChatError::MessageNotFound(_)));
    }

    #[tokio::test]
    async fn delivery_state_only_moves_forward() {
        let (db_pool, hub, pairing_id) = paired().await;
        let id = append_message(&db_pool, &hub, &pairing_id, "a", Draft::text("hi")).await.unwrap();

        let err = set_delivery_state(&db_pool, &hub, &pairing_id, &id, "a", DeliveryState::Seen)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Forbidden));

        set_delivery_state(&db_pool, &hub, &pairing_id, &id, "b", DeliveryState::Seen).await.unwrap();
        set_delivery_state(&db_pool, &hub, &pairing_id, &id, "b", DeliveryState::Seen).await.unwrap();

        let err = set_delivery_state(&db_pool, &hub, &pairing_id, &id, "b", DeliveryState::Delivered)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ChatError::DeliveryRegression { from: DeliveryState::Seen, to: DeliveryState::Delivered }
        ));
        assert_eq!(get_message(&db_pool, &pairing_id, &id).await.unwrap().delivery_state, DeliveryState::Seen);
    }

    #[tokio::test]
    async fn delivered_acknowledgement_needs_the_sender_online() {
        let (db_pool, hub, pairing_id) = paired().await;
        let id = append_message(&db_pool, &hub, &pairing_id, "a", Draft::text("hi")).await.unwrap();
        append_message(&db_pool, &hub, &pairing_id, "b", Draft::text("own")).await.unwrap();

        profiles::set_presence(&db_pool, &hub, "a", false).await.unwrap();
        assert_eq!(acknowledge_delivered(&db_pool, &hub, &pairing_id, "b").await.unwrap(), 0);

        profiles::set_presence(&db_pool, &hub, "a", true).await.unwrap();
        assert_eq!(acknowledge_delivered(&db_pool, &hub, &pairing_id, "b").await.unwrap(), 1);
        assert_eq!(get_message(&db_pool, &pairing_id, &id).await.unwrap().delivery_state, DeliveryState::Delivered);
        assert_eq!(acknowledge_delivered(&db_pool, &hub, &pairing_id, "b").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn only_the_sender_deletes() {
        let (db_pool, hub, pairing_id) = paired().await;
        let id = append_message(&db_pool, &hub, &pairing_id, "a", Draft::text("oops")).await.unwrap();
        toggle_reaction(&db_pool, &hub, &pairing_id, &id, "b", "heart").await.unwrap();

        let err = delete_message(&db_pool, &hub, &pairing_id, &id, "b").await.unwrap_err();
        assert!(matches!(err, ChatError::Forbidden));
        assert_eq!(list_messages(&db_pool, &pairing_id).await.unwrap().len(), 1);

        delete_message(&db_pool, &hub, &pairing_id, &id, "a").await.unwrap();
        assert!(list_messages(&db_pool, &pairing_id).await.unwrap().is_empty());
        let (left,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM reactions").fetch_one(&db_pool).await.unwrap();
        assert_eq!(left, 0);
    }

    #[tokio::test]
    async fn log_survives_disconnect() {
        let (db_pool, hub, pairing_id) = paired().await;
        append_message(&db_pool, &hub, &pairing_id, "a", Draft::text("remember me")).await.unwrap();

        disconnect(&db_pool, &hub, "a").await.unwrap();

        let log = list_messages(&db_pool, &pairing_id).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].text, "remember me");
        let err = append_message(&db_pool, &hub, &pairing_id, "a", Draft::text("late")).await.unwrap_err();
        assert!(matches!(err, ChatError::NotPaired));
    }

    #[tokio::test]
    async fn subscription_delivers_growing_snapshots() {
        let (db_pool, hub, pairing_id) = paired().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = subscribe_messages(db_pool.clone(), &hub, pairing_id.clone(), move |log| {
            let _ = tx.send(log);
        });

        let next = |rx: &mut mpsc::UnboundedReceiver<Vec<Message>>| rx.try_recv().ok();
        let initial = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert!(initial.is_empty());
        assert!(next(&mut rx).is_none());

        let id = append_message(&db_pool, &hub, &pairing_id, "b", Draft::text("ping")).await.unwrap();
        let snapshot = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(snapshot.len(), initial.len() + 1);
        assert_eq!(snapshot.last().map(|m| m.id.as_str()), Some(id.as_str()));

        delete_message(&db_pool, &hub, &pairing_id, &id, "b").await.unwrap();
        let snapshot = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert!(snapshot.is_empty());
    }
}
