//! Google APIs, YouTube Data v3 shape (OAuth2).

use anyhow::Result;
use unisocial::{AuthEngine, Connection, EntityRoute, OAuth2Engine, ProviderProfile};

pub const BASE_URL: &str = "https://www.googleapis.com/youtube/v3/";
pub const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
pub const TOKEN_URL: &str = "https://accounts.google.com/o/oauth2/token";
pub const SCOPES: &[&str] = &["https://www.googleapis.com/auth/youtube.readonly"];

/// YouTube Data profile: `items` listings paged with `nextPageToken` /
/// `pageToken`, resources fetched by `id` parameter.
pub fn profile() -> ProviderProfile {
    ProviderProfile::new("google", BASE_URL)
        .with_authorize_url(AUTH_URL)
        .with_access_token_url(TOKEN_URL)
        .with_token_param("access_token")
        .with_list_field("items")
        .with_cursor("nextPageToken", "pageToken")
        .with_route("video", EntityRoute::with_param("videos", "id"))
        .with_route("channel", EntityRoute::with_param("channels", "id"))
        .with_route("playlist", EntityRoute::with_param("playlists", "id"))
        .with_max_batch_size(50)
        .with_batch_params("id", "forUsername")
}

/// Google application credentials.
///
/// Loads from environment variables:
/// - `UNISOCIAL_GOOGLE_CLIENT_ID`
/// - `UNISOCIAL_GOOGLE_CLIENT_SECRET`
#[derive(Debug)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
}

impl GoogleConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Load config from environment variables.
    pub fn from_env() -> Result<Self> {
        let (client_id, client_secret) = crate::client_pair_from_env("google")?;
        Ok(Self {
            client_id,
            client_secret,
        })
    }

    /// Connection over the default HTTP transport, requesting read-only
    /// YouTube scope. No user token is held yet.
    pub fn connect(&self) -> Connection {
        let engine = OAuth2Engine::new(self.client_id.clone(), self.client_secret.clone())
            .with_scope(SCOPES.iter().copied());
        Connection::with_http(profile(), AuthEngine::OAuth2(engine))
    }
}
