use axum::{
    Json, debug_handler,
    extract::{
        State, WebSocketUpgrade,
        ws::Message as WsMessage,
    },
    http::StatusCode,
    response::Response,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tower_sessions::Session;
use tracing::debug;

use crate::{AppResult, AppState, conversation, error::ChatError, hub::Hub, session};

use super::{
    model::{PairingResult, Profile},
    pairing,
};

#[debug_handler(state = AppState)]
pub(crate) async fn me(State(db_pool): State<SqlitePool>, session: Session) -> AppResult<Json<Profile>> {
    let user_id = session::current_user(&session).await?;
    Ok(Json(pairing::fetch_profile(&db_pool, &user_id).await?))
}

/// What one partner may see of the other.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PartnerCard {
    user_id: String,
    display_name: String,
    online: bool,
}

#[debug_handler(state = AppState)]
pub(crate) async fn partner(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<PartnerCard>> {
    let user_id = session::current_user(&session).await?;
    let pairing = pairing::active_pairing(&db_pool, &user_id)
        .await?
        .ok_or(ChatError::PartnerNotFound)?;
    let partner = pairing::fetch_profile(&db_pool, &pairing.partner_user_id).await?;
    Ok(Json(PartnerCard {
        user_id: partner.user_id,
        display_name: partner.display_name,
        online: partner.presence,
    }))
}

#[derive(Deserialize)]
pub(crate) struct ConnectBody {
    code: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn connect(
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    session: Session,
    Json(ConnectBody { code }): Json<ConnectBody>,
) -> AppResult<Json<PairingResult>> {
    let user_id = session::current_user(&session).await?;
    Ok(Json(pairing::connect(&db_pool, &hub, &user_id, &code).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn disconnect(
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    session: Session,
) -> AppResult<StatusCode> {
    let user_id = session::current_user(&session).await?;
    pairing::disconnect(&db_pool, &hub, &user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ProfileFrame {
    Profile { profile: Profile },
}

/// Streams the caller's profile, so a client learns the moment it gets paired or unpaired.
#[debug_handler(state = AppState)]
pub(crate) async fn profile_ws(
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    session: Session,

    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let user_id = session::current_user(&session).await?;
    pairing::fetch_profile(&db_pool, &user_id).await?;

    Ok(ws.on_upgrade(async move |socket| {
        pairing::connection_opened(&db_pool, &hub, &user_id).await;
        let (mut sender, mut receiver) = socket.split();
        let (tx, mut profiles) = mpsc::unbounded_channel();
        let subscription = pairing::subscribe_profile(db_pool.clone(), &hub, user_id.clone(), move |profile| {
            drop(tx.send(profile))
        });

        loop {
            tokio::select! {
                profile = profiles.recv() => {
                    let Some(profile) = profile else { break };
                    if conversation::send_frame(&mut sender, &ProfileFrame::Profile { profile }).await.is_err() {
                        break;
                    }
                }
                incoming = receiver.next() => match incoming {
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
            }
        }

        drop(subscription);
        pairing::connection_closed(&db_pool, &hub, &user_id).await;
        debug!(user_id, "profile socket closed");
    }))
}
