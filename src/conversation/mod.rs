mod message;
mod outbox;
mod room;
mod store;
mod typing;
mod ws;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};

use crate::{AppState, memories};

pub use message::{DeliveryState, Draft, Message, MessageKind};
pub use outbox::Outbox;
pub use store::{
    acknowledge_delivered, append_message, delete_message, get_message, list_messages, messages_after,
    set_delivery_state, subscribe_messages, toggle_reaction,
};
pub use typing::{TypingTracker, TypingView, subscribe_typing};
pub(crate) use ws::send_frame;

const UPLOAD_LIMIT: usize = 16 * 1024 * 1024;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/messages", get(room::messages).post(room::send))
        .route("/messages/{id}", delete(room::delete))
        .route("/messages/{id}/reaction", post(room::react))
        .route("/messages/{id}/delivery", post(room::delivery))
        .route(
            "/media/{kind}",
            post(room::upload).layer(DefaultBodyLimit::max(UPLOAD_LIMIT)),
        )
        .route("/ws", get(ws::conversation_ws))
        .nest("/memories", memories::router())
}
