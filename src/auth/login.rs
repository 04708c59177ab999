use axum::{
    debug_handler,
    extract::{Path, Query, State},
    response::Redirect,
};
use oauth2::{CsrfToken, PkceCodeChallenge, Scope};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{debug, warn};

use crate::{
    AppResult, AppState,
    session::{CSRF_STATE, PKCE_VERIFIER, RETURN_URL},
};

use super::{Clients, clients::ClientProvider};

#[derive(Deserialize)]
pub(crate) struct LoginQuery {
    pub(crate) return_url: Option<String>,
}

/// Sends the browser to the provider's consent page. The CSRF state and PKCE
/// verifier wait in the session until the provider calls back into `lockin`.
#[debug_handler(state = AppState)]
pub(crate) async fn login(
    Path(provider): Path<ClientProvider>,
    Query(LoginQuery { return_url }): Query<LoginQuery>,
    State(clients): State<Clients>,
    session: Session,
) -> AppResult<Redirect> {
    let client = clients.get_client(provider)?;
    let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();

    let (authorize_url, csrf_state) = client
        .authorize_url(CsrfToken::new_random)
        .add_scopes(scopes_for(provider))
        .set_pkce_challenge(challenge)
        .url();

    session.insert(CSRF_STATE, csrf_state.secret()).await?;
    session.insert(PKCE_VERIFIER, verifier.secret()).await?;
    match return_url.as_deref().map(local_path) {
        Some(Some(path)) => session.insert(RETURN_URL, path).await?,
        Some(None) => warn!(%provider, "ignoring off-site return_url"),
        None => {}
    }

    debug!(%provider, "redirecting to provider");
    Ok(Redirect::to(authorize_url.as_str()))
}

/// What each provider must grant for the identity toolkit to fill in a name and
/// a contact handle.
fn scopes_for(provider: ClientProvider) -> Vec<Scope> {
    let names: &[&str] = match provider {
        ClientProvider::Google => &["openid", "email", "profile"],
        ClientProvider::Github => &["read:user", "user:email"],
    };
    names.iter().map(|name| Scope::new((*name).to_owned())).collect()
}

/// `url` if it stays on this site, i.e. an absolute path with no scheme or host.
pub(super) fn local_path(url: &str) -> Option<&str> {
    let url = url.trim();
    let same_site = url.starts_with('/')
        && !url.starts_with("//")
        && !url.starts_with("/\\")
        && !url.chars().any(char::is_control);
    same_site.then_some(url)
}

/// Where to land after an auth round trip.
pub(super) fn landing(return_url: Option<&str>) -> &str {
    return_url.and_then(local_path).unwrap_or("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_local_paths_survive() {
        assert_eq!(local_path("/c/messages?before=3"), Some("/c/messages?before=3"));
        assert_eq!(local_path(" /p/me "), Some("/p/me"));
        assert_eq!(local_path("https://evil.example/"), None);
        assert_eq!(local_path("//evil.example/"), None);
        assert_eq!(local_path("/\\evil.example"), None);
        assert_eq!(local_path("/\nLocation: x"), None);
        assert_eq!(local_path("p/me"), None);

        assert_eq!(landing(None), "/");
        assert_eq!(landing(Some("//evil.example")), "/");
        assert_eq!(landing(Some("/p/partner")), "/p/partner");
    }

    #[test]
    fn providers_ask_for_identity_scopes() {
        let names = |provider| scopes_for(provider).into_iter().map(|s| s.as_str().to_owned()).collect::<Vec<_>>();
        assert_eq!(names(ClientProvider::Google), ["openid", "email", "profile"]);
        assert_eq!(names(ClientProvider::Github), ["read:user", "user:email"]);
    }
}
