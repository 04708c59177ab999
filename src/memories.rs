use axum::{Json, Router, debug_handler, extract::State, routing::get};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    AppResult, AppState, db,
    error::{ChatError, ChatResult},
    hub::Hub,
    profiles, session,
};

/// A note pinned to the pairing's shared board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    pub id: String,
    pub pairing_id: String,
    pub author_id: String,
    pub author_name: String,
    pub text: String,
    pub timestamp: i64,
}

pub async fn add_memory(
    db_pool: &SqlitePool,
    hub: &Hub,
    pairing_id: &str,
    author_id: &str,
    text: &str,
) -> ChatResult<Memory> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ChatError::InvalidMessage("empty memory".to_owned()));
    }
    profiles::require_pairing(db_pool, author_id, pairing_id).await?;
    let author = profiles::fetch_profile(db_pool, author_id).await?;

    let memory = Memory {
        id: Uuid::now_v7().to_string(),
        pairing_id: pairing_id.to_owned(),
        author_id: author_id.to_owned(),
        author_name: author.display_name,
        text: text.to_owned(),
        timestamp: db::now_millis(),
    };
    sqlx::query("INSERT INTO memories (id,pairing_id,author_id,author_name,text,timestamp) VALUES (?,?,?,?,?,?)")
        .bind(&memory.id)
        .bind(&memory.pairing_id)
        .bind(&memory.author_id)
        .bind(&memory.author_name)
        .bind(&memory.text)
        .bind(memory.timestamp)
        .execute(db_pool)
        .await?;

    hub.conversation_changed(pairing_id);
    Ok(memory)
}

/// Newest first.
pub async fn list_memories(db_pool: &SqlitePool, pairing_id: &str) -> ChatResult<Vec<Memory>> {
    Ok(sqlx::query_as(
        "SELECT id,pairing_id,author_id,author_name,text,timestamp FROM memories WHERE pairing_id=? ORDER BY timestamp DESC, id DESC",
    )
    .bind(pairing_id)
    .fetch_all(db_pool)
    .await?)
}

#[derive(Deserialize)]
pub(crate) struct NewMemory {
    text: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(memories).post(new_memory))
}

#[debug_handler(state = AppState)]
pub(crate) async fn memories(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<Vec<Memory>>> {
    let (_, pairing) = session::current_pairing(&db_pool, &session).await?;
    Ok(Json(list_memories(&db_pool, &pairing.pairing_id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn new_memory(
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    session: Session,
    Json(NewMemory { text }): Json<NewMemory>,
) -> AppResult<Json<Memory>> {
    let (user_id, pairing) = session::current_pairing(&db_pool, &session).await?;
    Ok(Json(add_memory(&db_pool, &hub, &pairing.pairing_id, &user_id, &text).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::test_pool, profiles::Identity};

    #[tokio::test]
    async fn board_lists_newest_first_and_needs_a_pairing() {
        let (db_pool, hub) = (test_pool().await, Hub::default());
        for user_id in ["a", "b"] {
            profiles::ensure_profile(&db_pool, &hub, &Identity::new(user_id), 8).await.unwrap();
        }
        let b = profiles::fetch_profile(&db_pool, "b").await.unwrap();
        let pairing_id = profiles::connect(&db_pool, &hub, "a", &b.exchange_code).await.unwrap().pairing.pairing_id;

        add_memory(&db_pool, &hub, &pairing_id, "a", "first date").await.unwrap();
        add_memory(&db_pool, &hub, &pairing_id, "b", "  beach trip ").await.unwrap();

        let board = list_memories(&db_pool, &pairing_id).await.unwrap();
        assert_eq!(board.iter().map(|m| m.text.as_str()).collect::<Vec<_>>(), ["beach trip", "first date"]);

        let err = add_memory(&db_pool, &hub, &pairing_id, "a", " ").await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidMessage(_)));

        profiles::disconnect(&db_pool, &hub, "a").await.unwrap();
        let err = add_memory(&db_pool, &hub, &pairing_id, "a", "after").await.unwrap_err();
        assert!(matches!(err, ChatError::NotPaired));
        assert_eq!(list_memories(&db_pool, &pairing_id).await.unwrap().len(), 2);
    }
}
