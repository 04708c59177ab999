use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message as WsMessage, WebSocket},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::{
    sync::mpsc,
    time::{Instant, sleep_until},
};
use tower_sessions::Session;
use tracing::{debug, warn};

use crate::{
    AppResult, AppState,
    config::Config,
    error::{ChatError, ChatResult},
    hub::Hub,
    profiles::{self, Pairing, Profile},
    session,
};

use super::{
    message::{DeliveryState, Draft, Message},
    store,
    typing::{TypingTracker, TypingView, subscribe_typing},
};

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub(crate) enum ServerFrame {
    Messages { messages: Vec<Message> },
    PartnerPresence { online: bool },
    PartnerTyping { typing: bool },
    /// The pairing ended; the socket closes after this.
    Unpaired,
    Error { code: &'static str, message: String },
}

impl From<&ChatError> for ServerFrame {
    fn from(err: &ChatError) -> Self {
        ServerFrame::Error { code: err.code(), message: err.to_string() }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub(crate) enum ClientFrame {
    Send { draft: Draft },
    React { message_id: String, token: String },
    Seen { message_id: String },
    Delete { message_id: String },
    Typing,
    StopTyping,
}

enum Notice {
    Messages(Vec<Message>),
    Own(Profile),
    Partner(Profile),
    PartnerTyping(bool),
}

#[debug_handler(state = AppState)]
pub(crate) async fn conversation_ws(
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    State(config): State<Arc<Config>>,
    session: Session,

    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let (user_id, pairing) = session::current_pairing(&db_pool, &session).await?;

    Ok(ws.on_upgrade(async move |socket| {
        let conversation = Conversation { db_pool, hub, config, user_id, pairing };
        conversation.serve(socket).await
    }))
}

struct Conversation {
    db_pool: SqlitePool,
    hub: Hub,
    config: Arc<Config>,
    user_id: String,
    pairing: Pairing,
}

impl Conversation {
    async fn serve(self, socket: WebSocket) {
        let Conversation { db_pool, hub, user_id, pairing, .. } = &self;
        let pairing_id = &pairing.pairing_id;
        profiles::connection_opened(db_pool, hub, user_id).await;
        debug!(user_id, pairing_id, "conversation socket open");

        let (mut sender, mut receiver) = socket.split();
        let (tx, mut notices) = mpsc::unbounded_channel();

        let subscriptions = [
            store::subscribe_messages(db_pool.clone(), hub, pairing_id.clone(), {
                let tx = tx.clone();
                move |messages| drop(tx.send(Notice::Messages(messages)))
            }),
            profiles::subscribe_profile(db_pool.clone(), hub, user_id.clone(), {
                let tx = tx.clone();
                move |profile| drop(tx.send(Notice::Own(profile)))
            }),
            profiles::subscribe_profile(db_pool.clone(), hub, pairing.partner_user_id.clone(), {
                let tx = tx.clone();
                move |profile| drop(tx.send(Notice::Partner(profile)))
            }),
            subscribe_typing(hub, pairing_id.clone(), pairing.partner_user_id.clone(), move |typing| {
                drop(tx.send(Notice::PartnerTyping(typing)))
            }),
        ];

        let timeout = self.config.typing_timeout;
        let mut typing = TypingTracker::new(hub.clone(), pairing_id.clone(), user_id.clone(), timeout);
        let mut partner_typing = TypingView::new(timeout);
        let mut partner_online = None;

        loop {
            let typing_deadline = typing.deadline();
            let partner_stale_at = partner_typing.stale_at();

            let frame = tokio::select! {
                notice = notices.recv() => match notice {
                    None => break,
                    Some(Notice::Messages(messages)) => {
                        if let Err(e) = store::acknowledge_delivered(db_pool, hub, pairing_id, user_id).await {
                            warn!(user_id, pairing_id, "could not acknowledge delivery: {e}");
                        }
                        ServerFrame::Messages { messages }
                    }
                    Some(Notice::Own(profile)) => {
                        if profile.pairing_id.as_ref() == Some(pairing_id) {
                            continue;
                        }
                        let _ = send_frame(&mut sender, &ServerFrame::Unpaired).await;
                        break;
                    }
                    Some(Notice::Partner(profile)) => {
                        if partner_online == Some(profile.presence) {
                            continue;
                        }
                        partner_online = Some(profile.presence);
                        ServerFrame::PartnerPresence { online: profile.presence }
                    }
                    Some(Notice::PartnerTyping(raised)) => {
                        let now = Instant::now();
                        let was_typing = partner_typing.is_typing(now);
                        partner_typing.update(raised, now);
                        // heartbeats only refresh the view
                        if was_typing && raised {
                            continue;
                        }
                        ServerFrame::PartnerTyping { typing: partner_typing.is_typing(now) }
                    }
                },

                incoming = receiver.next() => match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<ClientFrame>(text.as_str()) {
                            Ok(frame) => match self.handle(frame, &mut typing).await {
                                Ok(()) => continue,
                                Err(e) if e.is_transport() => {
                                    warn!(user_id, pairing_id, "socket request failed: {e}");
                                    ServerFrame::from(&e)
                                }
                                Err(e) => ServerFrame::from(&e),
                            },
                            Err(e) => ServerFrame::Error { code: "bad_frame", message: e.to_string() },
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                },

                _ = until(typing_deadline) => {
                    typing.expire(Instant::now());
                    continue;
                }

                _ = until(partner_stale_at) => {
                    partner_typing.update(false, Instant::now());
                    ServerFrame::PartnerTyping { typing: false }
                }
            };

            if send_frame(&mut sender, &frame).await.is_err() {
                break;
            }
        }

        typing.stop();
        drop(subscriptions);
        profiles::connection_closed(db_pool, hub, user_id).await;
        debug!(user_id, pairing_id, "conversation socket closed");
    }

    async fn handle(&self, frame: ClientFrame, typing: &mut TypingTracker) -> ChatResult<()> {
        let Conversation { db_pool, hub, user_id, pairing, .. } = self;
        let pairing_id = &pairing.pairing_id;

        match frame {
            ClientFrame::Send { draft } => {
                typing.stop();
                store::append_message(db_pool, hub, pairing_id, user_id, draft).await?;
            }
            ClientFrame::React { message_id, token } => {
                store::toggle_reaction(db_pool, hub, pairing_id, &message_id, user_id, &token).await?;
            }
            ClientFrame::Seen { message_id } => {
                store::set_delivery_state(db_pool, hub, pairing_id, &message_id, user_id, DeliveryState::Seen)
                    .await?;
            }
            ClientFrame::Delete { message_id } => {
                store::delete_message(db_pool, hub, pairing_id, &message_id, user_id).await?;
            }
            ClientFrame::Typing => typing.keystroke(Instant::now()),
            ClientFrame::StopTyping => typing.stop(),
        }
        Ok(())
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

pub(crate) async fn send_frame(
    sender: &mut SplitSink<WebSocket, WsMessage>,
    frame: &impl Serialize,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(frame).map_err(axum::Error::new)?;
    sender.send(WsMessage::Text(text.into())).await
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn server_frames_are_tagged() {
        let frame = serde_json::to_value(ServerFrame::PartnerTyping { typing: true }).unwrap();
        assert_eq!(frame, json!({ "type": "partner_typing", "typing": true }));

        let frame = serde_json::to_value(ServerFrame::Unpaired).unwrap();
        assert_eq!(frame, json!({ "type": "unpaired" }));

        let frame = serde_json::to_value(ServerFrame::from(&ChatError::NotPaired)).unwrap();
        assert_eq!(frame["code"], "not_paired");
    }

    #[test]
    fn client_frames_parse() {
        let frame: ClientFrame =
            serde_json::from_value(json!({ "type": "send", "draft": { "kind": "text", "text": "hi" } })).unwrap();
        assert!(matches!(frame, ClientFrame::Send { draft } if draft.text == "hi"));

        let frame: ClientFrame =
            serde_json::from_value(json!({ "type": "seen", "messageId": "m-1" })).unwrap();
        assert!(matches!(frame, ClientFrame::Seen { message_id } if message_id == "m-1"));

        let frame: ClientFrame = serde_json::from_value(json!({ "type": "stop_typing" })).unwrap();
        assert!(matches!(frame, ClientFrame::StopTyping));

        assert!(serde_json::from_value::<ClientFrame>(json!({ "type": "shout" })).is_err());
    }
}
