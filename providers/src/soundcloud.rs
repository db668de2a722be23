//! SoundCloud HTTP API (OAuth2).

use anyhow::Result;
use unisocial::{AuthEngine, Connection, EntityRoute, OAuth2Engine, ProviderProfile};

pub const BASE_URL: &str = "https://api.soundcloud.com/";
pub const AUTH_URL: &str = "https://soundcloud.com/connect";
pub const TOKEN_URL: &str = "https://api.soundcloud.com/oauth2/token";

/// SoundCloud profile: linked partitioning (`collection` items plus a full
/// `next_href` URL), token as the `oauth_token` parameter, `:id` paths.
pub fn profile() -> ProviderProfile {
    ProviderProfile::new("soundcloud", BASE_URL)
        .with_authorize_url(AUTH_URL)
        .with_access_token_url(TOKEN_URL)
        .with_token_param("oauth_token")
        .with_list_field("collection")
        .with_cursor("next_href", "cursor")
        .with_field_type("user", "user")
        .with_route("track", EntityRoute::path("tracks/:id"))
        .with_route("user", EntityRoute::path("users/:id"))
        .with_route("playlist", EntityRoute::path("playlists/:id"))
        .with_max_batch_size(50)
        .with_batch_params("ids", "q")
}

/// SoundCloud application credentials.
///
/// Loads from environment variables:
/// - `UNISOCIAL_SOUNDCLOUD_CLIENT_ID`
/// - `UNISOCIAL_SOUNDCLOUD_CLIENT_SECRET`
#[derive(Debug)]
pub struct SoundCloudConfig {
    pub client_id: String,
    pub client_secret: String,
}

impl SoundCloudConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Load config from environment variables.
    pub fn from_env() -> Result<Self> {
        let (client_id, client_secret) = crate::client_pair_from_env("soundcloud")?;
        Ok(Self {
            client_id,
            client_secret,
        })
    }

    /// Connection over the default HTTP transport. No user token is held
    /// yet.
    pub fn connect(&self) -> Connection {
        let engine = OAuth2Engine::new(self.client_id.clone(), self.client_secret.clone());
        Connection::with_http(profile(), AuthEngine::OAuth2(engine))
    }
}
