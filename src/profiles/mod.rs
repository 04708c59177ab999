mod code;
mod model;
mod page;
mod pairing;
mod store;

use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

pub use code::{generate_exchange_code, normalize_exchange_code};
pub use model::{Pairing, PairingResult, PairingStatus, Profile};
pub use pairing::{
    Identity, active_pairing, connect, disconnect, ensure_profile, fetch_profile, reconcile_pairings,
    require_pairing, set_presence, subscribe_profile,
};
pub(crate) use pairing::{connection_closed, connection_opened};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(page::me))
        .route("/partner", get(page::partner))
        .route("/connect", post(page::connect))
        .route("/disconnect", post(page::disconnect))
        .route("/ws", get(page::profile_ws))
}
