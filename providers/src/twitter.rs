//! Twitter REST API v1.1 (OAuth1).

use anyhow::Result;
use unisocial::{AuthEngine, Connection, EntityRoute, OAuth1Engine, ProviderProfile};

pub const BASE_URL: &str = "https://api.twitter.com/1.1/";
pub const AUTH_URL: &str = "https://api.twitter.com/oauth/authenticate";
pub const REQUEST_TOKEN_URL: &str = "https://api.twitter.com/oauth/request_token";
pub const TOKEN_URL: &str = "https://api.twitter.com/oauth/access_token";

/// User lookup accepts at most 100 ids or screen names per request.
pub const MAX_BATCH_SIZE: usize = 100;

/// Twitter provider profile: `id_str` alias, cursor-paged friend/follower
/// listings that end on cursor `"0"`, nested user/tweet type tags.
pub fn profile() -> ProviderProfile {
    ProviderProfile::new("twitter", BASE_URL)
        .with_authorize_url(AUTH_URL)
        .with_request_token_url(REQUEST_TOKEN_URL)
        .with_access_token_url(TOKEN_URL)
        .with_id_fields(["id", "id_str"])
        .with_list_field("users")
        .with_cursor("next_cursor", "cursor")
        .with_terminal_cursor("0")
        .with_field_type("user", "user")
        .with_field_type("user_mentions", "user")
        .with_field_type("status", "tweet")
        .with_field_type("retweeted_status", "tweet")
        .with_route("user", EntityRoute::with_param("users/show.json", "user_id"))
        .with_route("tweet", EntityRoute::with_param("statuses/show.json", "id"))
        .with_max_batch_size(MAX_BATCH_SIZE)
        .with_batch_params("user_id", "screen_name")
}

/// Twitter application credentials (the consumer key pair).
///
/// Loads from environment variables:
/// - `UNISOCIAL_TWITTER_CLIENT_ID`
/// - `UNISOCIAL_TWITTER_CLIENT_SECRET`
#[derive(Debug)]
pub struct TwitterConfig {
    pub client_id: String,
    pub client_secret: String,
}

impl TwitterConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Load config from environment variables.
    pub fn from_env() -> Result<Self> {
        let (client_id, client_secret) = crate::client_pair_from_env("twitter")?;
        Ok(Self {
            client_id,
            client_secret,
        })
    }

    /// Connection over the default HTTP transport. No user token is held
    /// yet; run the OAuth dance or restore a persisted credential.
    pub fn connect(&self) -> Connection {
        let engine = OAuth1Engine::new(self.client_id.clone(), self.client_secret.clone());
        Connection::with_http(profile(), AuthEngine::OAuth1(engine))
    }
}
