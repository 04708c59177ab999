use std::{fmt, path::Path};

use oauth2::{AuthUrl, Client, ClientId, ClientSecret, RedirectUrl, TokenUrl, basic::BasicClient};
use serde::Deserialize;
use serde_json::Value;

use crate::{AppResult, GetField};

type OAuthClient = Client<oauth2::StandardErrorResponse<oauth2::basic::BasicErrorResponseType>, oauth2::StandardTokenResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>, oauth2::StandardTokenIntrospectionResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>, oauth2::StandardRevocableToken, oauth2::StandardErrorResponse<oauth2::RevocationErrorResponseType>, oauth2::EndpointSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointSet>;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClientProvider {
    Google,
    Github,
}

impl ClientProvider {
    /// Provider id as the identity toolkit knows it.
    pub fn id(&self) -> &str {
        use ClientProvider::*;
        match self {
            Google => "google.com",
            Github => "github.com",
        }
    }

    fn path(&self) -> &str {
        use ClientProvider::*;
        match self {
            Google => "google",
            Github => "github",
        }
    }

    fn endpoints(&self) -> (&'static str, &'static str) {
        use ClientProvider::*;
        match self {
            Google => ("https://accounts.google.com/o/oauth2/auth", "https://oauth2.googleapis.com/token"),
            Github => ("https://github.com/login/oauth/authorize", "https://github.com/login/oauth/access_token"),
        }
    }
}

impl fmt::Display for ClientProvider {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Clone)]
pub struct Clients {
    pub(crate) firebase_idpurl: String,
    google_client: Option<OAuthClient>,
    github_client: Option<OAuthClient>,
}

impl Clients {
    /// Reads the client secrets file. Redirects point back at `public_url`.
    pub fn load(path: impl AsRef<Path>, public_url: &str) -> anyhow::Result<Clients> {
        let path = path.as_ref();
        let json: Value = serde_json::from_slice(&std::fs::read(path)?)?;
        Clients::from_json(json, public_url).map_err(|e| e.0.context(format!("reading {}", path.display())))
    }

    pub fn from_json(json: Value, public_url: &str) -> AppResult<Clients> {
        let firebase_idpurl = format!(
            "https://identitytoolkit.googleapis.com/v1/accounts:signInWithIdp?key={}",
            json.get_obj_field("firebase")?.get_str_field("apikey")?
        );

        Ok(
            Clients {
                firebase_idpurl,
                google_client: provider_client(&json, ClientProvider::Google, public_url)?,
                github_client: provider_client(&json, ClientProvider::Github, public_url)?,
            }
        )
    }

    pub fn get_client(&self, provider: ClientProvider) -> AppResult<OAuthClient> {
        use ClientProvider::*;
        match provider {
            Google => self.google_client.clone(),
            Github => self.github_client.clone(),
        }.ok_or(format!("OAuth provider {provider} keys not supplied").into())
    }
}

fn provider_client(json: &Value, provider: ClientProvider, public_url: &str) -> AppResult<Option<OAuthClient>> {
    let Some(json) = json.get(provider.path()) else {
        return Ok(None);
    };
    let client_id = ClientId::new(json.get_str_field("client_id")?);
    let client_secret = ClientSecret::new(json.get_str_field("client_secret")?);

    let (auth_url, token_url) = provider.endpoints();
    let auth_url = AuthUrl::new(auth_url.to_owned())?;
    let token_url = TokenUrl::new(token_url.to_owned())?;
    let redirect_url = RedirectUrl::new(format!("{public_url}/lockin/{}", provider.path()))?;

    Ok(Some(
        BasicClient::new(client_id)
            .set_client_secret(client_secret)
            .set_auth_uri(auth_url)
            .set_token_uri(token_url)
            .set_redirect_uri(redirect_url)
    ))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn only_configured_providers_get_clients() {
        let json = json!({
            "firebase": { "apikey": "k" },
            "github": { "client_id": "id", "client_secret": "secret" },
        });
        let clients = Clients::from_json(json, "https://chat.example").unwrap();
        assert!(clients.firebase_idpurl.ends_with("?key=k"));
        assert!(clients.get_client(ClientProvider::Github).is_ok());
        assert!(clients.get_client(ClientProvider::Google).is_err());
    }

    #[test]
    fn firebase_key_is_required() {
        assert!(Clients::from_json(json!({}), "http://localhost:8080").is_err());
    }
}
