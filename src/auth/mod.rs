//! Authentication engines.
//!
//! A connection owns one [`AuthEngine`]: OAuth1 (per-request HMAC signing,
//! three-legged handshake) or OAuth2 (authorization-code flow, bearer
//! tokens with expiry and refresh). Both persist handshake state and access
//! credentials through the caller-supplied [`CredentialStore`].

pub mod oauth1;
pub mod oauth2;
mod store;

#[cfg(test)]
mod tests;

pub use store::{CredentialStore, MemoryCredentialStore};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Safety margin for expiry checks, so a token does not lapse mid-request.
pub const EXPIRY_MARGIN_SECS: i64 = 5;

/// A user-level access credential, serializable for the credential store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum AccessCredential {
    /// OAuth1 token/secret pair. Does not expire on its own.
    #[serde(rename = "oauth1")]
    OAuth1 { token: String, secret: String },
    /// OAuth2 bearer token with optional refresh token and absolute expiry.
    #[serde(rename = "oauth2")]
    OAuth2 {
        access_token: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        refresh_token: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expires_at: Option<DateTime<Utc>>,
    },
}

impl AccessCredential {
    /// Whether the credential will have expired `margin_secs` from now.
    /// A credential without an expiry never expires.
    pub fn is_expired(&self, margin_secs: i64) -> bool {
        match self {
            AccessCredential::OAuth1 { .. } => false,
            AccessCredential::OAuth2 { expires_at, .. } => expires_at
                .map(|at| Utc::now() + Duration::seconds(margin_secs) >= at)
                .unwrap_or(false),
        }
    }
}

/// Per-connection authentication engine.
#[derive(Debug, Clone)]
pub enum AuthEngine {
    OAuth1(oauth1::OAuth1Engine),
    OAuth2(oauth2::OAuth2Engine),
}

impl AuthEngine {
    /// Currently held user credential, if any.
    pub fn credential(&self) -> Option<AccessCredential> {
        match self {
            AuthEngine::OAuth1(engine) => engine.credential(),
            AuthEngine::OAuth2(engine) => engine.credential(),
        }
    }

    /// Install a user credential. The credential kind must match the engine.
    pub fn set_credential(&mut self, credential: AccessCredential) -> Result<()> {
        match (self, credential) {
            (AuthEngine::OAuth1(engine), AccessCredential::OAuth1 { token, secret }) => {
                engine.set_token(token, secret);
                Ok(())
            }
            (
                AuthEngine::OAuth2(engine),
                AccessCredential::OAuth2 {
                    access_token,
                    refresh_token,
                    expires_at,
                },
            ) => {
                engine.set_token(access_token, refresh_token, expires_at);
                Ok(())
            }
            (AuthEngine::OAuth1(_), _) => Err(Error::Configuration(
                "OAuth2 credential handed to an OAuth1 connection".to_string(),
            )),
            (AuthEngine::OAuth2(_), _) => Err(Error::Configuration(
                "OAuth1 credential handed to an OAuth2 connection".to_string(),
            )),
        }
    }

    pub fn clear_credential(&mut self) {
        match self {
            AuthEngine::OAuth1(engine) => engine.clear_token(),
            AuthEngine::OAuth2(engine) => engine.clear_token(),
        }
    }

    /// Authenticated and usable: a token is held and, for OAuth2, not
    /// within the expiry margin.
    pub fn is_auth(&self) -> bool {
        match self {
            AuthEngine::OAuth1(engine) => engine.has_token(),
            AuthEngine::OAuth2(engine) => engine.is_auth(),
        }
    }
}

/// Store key for the persisted access credential.
pub(crate) fn access_key(provider: &str) -> String {
    format!("{provider}:access")
}

/// Store key for the OAuth1 temporary request token.
pub(crate) fn request_token_key(provider: &str) -> String {
    format!("{provider}:request_token")
}

/// Store key for the OAuth2 CSRF state nonce.
pub(crate) fn state_key(provider: &str) -> String {
    format!("{provider}:state")
}

pub(crate) fn save_credential(
    store: &dyn CredentialStore,
    provider: &str,
    credential: &AccessCredential,
) -> Result<()> {
    let json = serde_json::to_string(credential)
        .map_err(|err| Error::Configuration(format!("credential not serializable: {err}")))?;
    store.set(&access_key(provider), json);
    Ok(())
}

pub(crate) fn load_credential(
    store: &dyn CredentialStore,
    provider: &str,
) -> Result<Option<AccessCredential>> {
    match store.get(&access_key(provider)) {
        None => Ok(None),
        Some(json) => serde_json::from_str(&json)
            .map(Some)
            .map_err(|err| Error::Configuration(format!("stored credential unreadable: {err}"))),
    }
}
