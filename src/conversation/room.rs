use std::sync::Arc;

use axum::{
    Json, debug_handler,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{
    AppResult, AppState, config::Config, error::ChatError, hub::Hub, media::MediaClient, session,
};

use super::{
    message::{DeliveryState, Draft, Message, MessageKind},
    store,
};

#[derive(Deserialize)]
pub(crate) struct PageQuery {
    after: Option<i64>,
    limit: Option<i64>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn messages(
    State(db_pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    session: Session,
    Query(PageQuery { after, limit }): Query<PageQuery>,
) -> AppResult<Json<Vec<Message>>> {
    let (_, pairing) = session::current_pairing(&db_pool, &session).await?;
    let limit = limit.unwrap_or(config.page_limit).clamp(1, config.page_limit);
    Ok(Json(
        store::messages_after(&db_pool, &pairing.pairing_id, after.unwrap_or(0), limit).await?,
    ))
}

#[debug_handler(state = AppState)]
pub(crate) async fn send(
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    session: Session,
    Json(draft): Json<Draft>,
) -> AppResult<Response> {
    let (user_id, pairing) = session::current_pairing(&db_pool, &session).await?;
    let id = store::append_message(&db_pool, &hub, &pairing.pairing_id, &user_id, draft).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))).into_response())
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete(
    Path(message_id): Path<String>,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    session: Session,
) -> AppResult<StatusCode> {
    let (user_id, pairing) = session::current_pairing(&db_pool, &session).await?;
    store::delete_message(&db_pool, &hub, &pairing.pairing_id, &message_id, &user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub(crate) struct ReactionBody {
    token: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn react(
    Path(message_id): Path<String>,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    session: Session,
    Json(ReactionBody { token }): Json<ReactionBody>,
) -> AppResult<Response> {
    let (user_id, pairing) = session::current_pairing(&db_pool, &session).await?;
    let reaction =
        store::toggle_reaction(&db_pool, &hub, &pairing.pairing_id, &message_id, &user_id, &token).await?;
    Ok(Json(json!({ "reaction": reaction })).into_response())
}

#[derive(Deserialize)]
pub(crate) struct DeliveryBody {
    state: DeliveryState,
}

#[debug_handler(state = AppState)]
pub(crate) async fn delivery(
    Path(message_id): Path<String>,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    session: Session,
    Json(DeliveryBody { state }): Json<DeliveryBody>,
) -> AppResult<StatusCode> {
    let (user_id, pairing) = session::current_pairing(&db_pool, &session).await?;
    store::set_delivery_state(&db_pool, &hub, &pairing.pairing_id, &message_id, &user_id, state).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Takes the raw file as the request body, hosts it, then posts it as a message.
#[debug_handler(state = AppState)]
pub(crate) async fn upload(
    Path(kind): Path<String>,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    State(media): State<MediaClient>,
    session: Session,
    body: Bytes,
) -> AppResult<Response> {
    let (user_id, pairing) = session::current_pairing(&db_pool, &session).await?;
    let kind: MessageKind = kind.parse()?;
    if body.is_empty() {
        return Err(ChatError::InvalidMessage("empty upload".to_owned()).into());
    }

    let url = media.upload(kind, body.to_vec()).await?;
    let id = store::append_message(&db_pool, &hub, &pairing.pairing_id, &user_id, Draft::media(kind, url.clone()))
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id, "url": url }))).into_response())
}
