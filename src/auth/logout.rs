use axum::{
    debug_handler,
    extract::{Query, State},
    response::Redirect,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;
use tracing::info;

use crate::{AppResult, AppState, hub::Hub, profiles, session::USER_ID};

use super::login::landing;

#[derive(Deserialize)]
pub(crate) struct LogoutQuery {
    pub(crate) return_url: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn logout(
    Query(LogoutQuery { return_url }): Query<LogoutQuery>,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    session: Session,
) -> AppResult<Redirect> {
    if let Some(user_id) = session.get::<String>(USER_ID).await? {
        profiles::set_presence(&db_pool, &hub, &user_id, false).await?;
        info!(user_id, "signed out");
    }
    session.clear().await;
    Ok(Redirect::to(landing(return_url.as_deref())))
}
