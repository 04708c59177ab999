use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect},
};
use oauth2::{AuthorizationCode, CsrfToken, PkceCodeVerifier, TokenResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use tower_sessions::Session;
use tracing::info;

use crate::{
    AppResult, AppState, GetField,
    config::Config,
    hub::Hub,
    profiles::{self, Identity},
    session::{CSRF_STATE, PKCE_VERIFIER, RETURN_URL, USER_ID},
};

use super::{Clients, clients::ClientProvider, login::landing};

#[derive(Deserialize)]
pub struct LockinQuery {
    pub state: Option<String>,
    pub code: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FirebaseRequest {
    post_body: String,
    request_uri: String,
    return_idp_credential: bool,
    return_secure_token: bool,
}

#[debug_handler(state = AppState)]
pub(crate) async fn lockin(
    Path(provider): Path<ClientProvider>,
    Query(LockinQuery { state, code }): Query<LockinQuery>,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    State(clients): State<Clients>,
    State(config): State<Arc<Config>>,
    session: Session,
) -> AppResult<impl IntoResponse> {
    let state = CsrfToken::new(state.ok_or("OAuth: without state")?);
    let code = AuthorizationCode::new(code.ok_or("OAuth: without code")?);

    let Some(stored_state) = session.get::<String>(CSRF_STATE).await? else {
        return Err("no csrf_state".into());
    };

    if state.secret().as_str() != stored_state.as_str() {
        return Err("csrf tokens don't match".into());
    }

    let Some(pkce_verifier) = session.get::<String>(PKCE_VERIFIER).await? else {
        return Err("no pkce_verifier".into());
    };

    let client = clients.get_client(provider)?;
    let http_client = reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    let token_result = client
        .exchange_code(code)
        .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier))
        .request_async(&http_client)
        .await?;

    let access_token = token_result.access_token().secret();
    let body: Value = http_client.post(&clients.firebase_idpurl)
        .json(&FirebaseRequest {
            post_body: format!("access_token={access_token}&providerId={}", provider.id()),
            request_uri: format!("{}/", config.public_url),
            return_idp_credential: true,
            return_secure_token: true,
        })
        .send()
        .await?
        .json()
        .await?;

    let identity = identity_of(&body)?;
    let profile = profiles::ensure_profile(&db_pool, &hub, &identity, config.code_attempts).await?;
    session.insert(USER_ID, identity.user_id.clone()).await?;
    session.remove::<String>(CSRF_STATE).await?;
    session.remove::<String>(PKCE_VERIFIER).await?;

    info!(user_id = identity.user_id, %provider, code = profile.exchange_code, "signed in");

    let return_url = session.remove::<String>(RETURN_URL).await?;
    Ok(Redirect::to(landing(return_url.as_deref())))
}

/// Pulls the user out of a `signInWithIdp` answer.
fn identity_of(body: &Value) -> AppResult<Identity> {
    let text = |field: &str| body.get(field).and_then(Value::as_str).map(str::to_owned);
    Ok(Identity {
        user_id: body.get_str_field("localId")?,
        display_name: text("displayName"),
        contact_handle: text("email"),
    })
}
