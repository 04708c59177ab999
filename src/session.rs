use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{
    AppResult,
    error::ChatError,
    profiles::{self, Pairing},
};

pub const USER_ID: &str = "user_id";
pub const CSRF_STATE: &str = "csrf_state";
pub const PKCE_VERIFIER: &str = "pkce_verifier";
pub const RETURN_URL: &str = "return_url";

/// The signed-in user, or `Unauthenticated`.
pub async fn current_user(session: &Session) -> AppResult<String> {
    match session.get::<String>(USER_ID).await? {
        Some(user_id) => Ok(user_id),
        None => Err(ChatError::Unauthenticated.into()),
    }
}

/// The signed-in user and the pairing they are currently in, or `NotPaired`.
pub(crate) async fn current_pairing(db_pool: &SqlitePool, session: &Session) -> AppResult<(String, Pairing)> {
    let user_id = current_user(session).await?;
    let pairing = profiles::active_pairing(db_pool, &user_id)
        .await?
        .ok_or(ChatError::NotPaired)?;
    Ok((user_id, pairing))
}
