//! Facebook Graph API (OAuth2).

use anyhow::Result;
use unisocial::{AuthEngine, Connection, EntityRoute, OAuth2Engine, ProviderProfile};

pub const BASE_URL: &str = "https://graph.facebook.com/";
pub const AUTH_URL: &str = "https://www.facebook.com/dialog/oauth";
pub const TOKEN_URL: &str = "https://graph.facebook.com/oauth/access_token";
pub const SCOPES: &[&str] = &["public_profile", "email"];

/// Facebook Graph profile: `data` listings with a full `paging.next` URL,
/// bearer token as the `access_token` parameter, objects fetched by bare id.
pub fn profile() -> ProviderProfile {
    ProviderProfile::new("facebook", BASE_URL)
        .with_authorize_url(AUTH_URL)
        .with_access_token_url(TOKEN_URL)
        .with_token_param("access_token")
        .with_list_field("data")
        .with_cursor("paging.next", "after")
        .with_field_type("from", "user")
        .with_route("user", EntityRoute::path(":id"))
        .with_route("page", EntityRoute::path(":id"))
        .with_route("post", EntityRoute::path(":id"))
        .with_max_batch_size(50)
        .with_batch_params("ids", "ids")
}

/// Facebook application credentials.
///
/// Loads from environment variables:
/// - `UNISOCIAL_FACEBOOK_CLIENT_ID`
/// - `UNISOCIAL_FACEBOOK_CLIENT_SECRET`
#[derive(Debug)]
pub struct FacebookConfig {
    pub client_id: String,
    pub client_secret: String,
}

impl FacebookConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Load config from environment variables.
    pub fn from_env() -> Result<Self> {
        let (client_id, client_secret) = crate::client_pair_from_env("facebook")?;
        Ok(Self {
            client_id,
            client_secret,
        })
    }

    /// Connection over the default HTTP transport, requesting the standard
    /// scopes. No user token is held yet.
    pub fn connect(&self) -> Connection {
        let engine = OAuth2Engine::new(self.client_id.clone(), self.client_secret.clone())
            .with_scope(SCOPES.iter().copied());
        Connection::with_http(profile(), AuthEngine::OAuth2(engine))
    }
}
