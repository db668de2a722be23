//! OAuth2 authorization-code flow.
//!
//! The engine is network-free: it builds authorization URLs and token
//! request bodies, validates callbacks and interprets token responses. The
//! connection performs the actual token-endpoint calls and threads the
//! credential store through.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{AccessCredential, EXPIRY_MARGIN_SECS};
use crate::error::{Error, Result};
use crate::profile::ProviderProfile;
use crate::transport::{append_query, Params};

/// Handshake record persisted between building the authorization URL and
/// handling the callback: the single-use CSRF nonce and the redirect URI
/// the token exchange must repeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PendingAuth {
    pub state: String,
    pub redirect_uri: String,
}

/// OAuth2 engine: application client pair, requested scope and the held
/// bearer token.
#[derive(Debug, Clone)]
pub struct OAuth2Engine {
    client_id: String,
    client_secret: String,
    scope: Vec<String>,
    check_state: bool,
    token: Option<BearerToken>,
}

#[derive(Debug, Clone)]
struct BearerToken {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl OAuth2Engine {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: Vec::new(),
            check_state: true,
            token: None,
        }
    }

    pub fn with_scope<I, S>(mut self, scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope = scope.into_iter().map(Into::into).collect();
        self
    }

    /// Disable CSRF state verification. Only for providers that refuse to
    /// echo the state parameter back.
    pub fn without_state_check(mut self) -> Self {
        self.check_state = false;
        self
    }

    pub fn checks_state(&self) -> bool {
        self.check_state
    }

    pub fn set_token(
        &mut self,
        access_token: String,
        refresh_token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) {
        self.token = Some(BearerToken {
            access_token,
            refresh_token,
            expires_at,
        });
    }

    pub fn clear_token(&mut self) {
        self.token = None;
    }

    pub fn credential(&self) -> Option<AccessCredential> {
        self.token.as_ref().map(|token| AccessCredential::OAuth2 {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            expires_at: token.expires_at,
        })
    }

    /// Whether a held token will have expired `margin_secs` from now. A
    /// token without a recorded expiry never expires.
    pub fn is_expired(&self, margin_secs: i64) -> bool {
        self.token
            .as_ref()
            .and_then(|token| token.expires_at)
            .map(|at| Utc::now() + Duration::seconds(margin_secs) >= at)
            .unwrap_or(false)
    }

    /// A token is held and outside the expiry margin.
    pub fn is_auth(&self) -> bool {
        self.token.is_some() && !self.is_expired(EXPIRY_MARGIN_SECS)
    }

    /// Build the user-facing authorization URL. `state` is the caller's
    /// freshly generated CSRF nonce, already persisted.
    pub fn auth_url(
        &self,
        profile: &ProviderProfile,
        redirect_uri: &str,
        state: &str,
    ) -> Result<String> {
        if self.client_id.is_empty() {
            return Err(Error::Configuration(
                "OAuth2 client id is required to build an authorization URL".to_string(),
            ));
        }
        let authorize = profile.authorize_url.as_deref().ok_or_else(|| {
            Error::Configuration(format!("provider {} has no authorize URL", profile.name))
        })?;

        let mut query = Params::new();
        query.insert("client_id".to_string(), self.client_id.clone());
        query.insert("redirect_uri".to_string(), redirect_uri.to_string());
        if !self.scope.is_empty() {
            query.insert("scope".to_string(), self.scope.join(","));
        }
        query.insert("state".to_string(), state.to_string());
        query.insert("response_type".to_string(), "code".to_string());
        if self.is_expired(EXPIRY_MARGIN_SECS) {
            // Re-authorizing with a stale token: ask for a refreshable grant.
            query.insert("grant_type".to_string(), "refresh_token".to_string());
        }

        Ok(append_query(authorize, &query))
    }

    /// Validate the provider callback and extract the authorization code.
    /// `expected_state` is the stored single-use nonce; the caller removes
    /// it from the store before verification.
    pub fn callback_code<'a>(
        &self,
        params: &'a Params,
        expected_state: Option<&str>,
    ) -> Result<&'a str> {
        if let Some(error) = params.get("error") {
            let detail = params.get("error_description").unwrap_or(error);
            warn!(provider_error = %error, "authorization declined");
            return Err(Error::Authentication(format!(
                "provider declined authorization: {detail}"
            )));
        }

        let code = params.get("code").ok_or_else(|| {
            Error::Authentication("callback carries no authorization code".to_string())
        })?;

        if self.check_state {
            let received = params.get("state").map(String::as_str);
            if expected_state.is_none() || received != expected_state {
                warn!("state nonce mismatch on OAuth2 callback");
                return Err(Error::Authentication(
                    "state nonce mismatch; possible cross-site request forgery".to_string(),
                ));
            }
        }

        Ok(code)
    }

    /// Form body for the authorization-code exchange. The redirect URI must
    /// repeat the one used in the authorization URL; it is omitted only
    /// when no handshake record survived.
    pub fn exchange_params(&self, redirect_uri: Option<&str>, code: &str) -> Result<Params> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(Error::Configuration(
                "OAuth2 client id and secret are required for the code exchange".to_string(),
            ));
        }
        let mut params = Params::new();
        params.insert("client_id".to_string(), self.client_id.clone());
        params.insert("client_secret".to_string(), self.client_secret.clone());
        if let Some(redirect_uri) = redirect_uri {
            params.insert("redirect_uri".to_string(), redirect_uri.to_string());
        }
        params.insert("grant_type".to_string(), "authorization_code".to_string());
        params.insert("code".to_string(), code.to_string());
        Ok(params)
    }

    /// Form body for a refresh-token grant.
    pub fn refresh_params(&self) -> Result<Params> {
        let refresh_token = self
            .token
            .as_ref()
            .and_then(|token| token.refresh_token.as_deref())
            .ok_or_else(|| {
                Error::Authentication("no refresh token held; reauthorize instead".to_string())
            })?;

        let mut params = Params::new();
        params.insert("client_id".to_string(), self.client_id.clone());
        params.insert("client_secret".to_string(), self.client_secret.clone());
        params.insert("grant_type".to_string(), "refresh_token".to_string());
        params.insert("refresh_token".to_string(), refresh_token.to_string());
        Ok(params)
    }

    /// Interpret a token-endpoint response and install the new token.
    ///
    /// Accepts `expires` or `expires_in` (seconds, number or numeric string)
    /// and turns it into an absolute expiry. A refresh response without a
    /// new refresh token keeps the old one.
    pub fn absorb_token_response(
        &mut self,
        body: &serde_json::Value,
    ) -> Result<AccessCredential> {
        let access_token = body
            .get("access_token")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let Some(access_token) = access_token else {
            let detail = body
                .get("error_description")
                .or_else(|| body.get("error"))
                .and_then(|v| v.as_str())
                .unwrap_or("token endpoint answered without an access token");
            return Err(Error::Authentication(detail.to_string()));
        };

        let expires_at =
            expiry_seconds(body).map(|seconds| Utc::now() + Duration::seconds(seconds));
        let refresh_token = body
            .get("refresh_token")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| {
                self.token
                    .as_ref()
                    .and_then(|token| token.refresh_token.clone())
            });

        let token = BearerToken {
            access_token,
            refresh_token,
            expires_at,
        };
        let credential = AccessCredential::OAuth2 {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            expires_at: token.expires_at,
        };
        self.token = Some(token);
        Ok(credential)
    }

    /// Attach authentication to a data request. Requests already carrying a
    /// token or client id pass through; unauthenticated requests fall back
    /// to the public client id.
    pub fn apply_token(&self, params: &mut Params, profile: &ProviderProfile) {
        if params.contains_key("oauth_token")
            || params.contains_key("client_id")
            || params.contains_key(&profile.token_param)
        {
            return;
        }

        match &self.token {
            Some(token) => {
                params.insert(profile.token_param.clone(), token.access_token.clone());
            }
            None => {
                if !self.client_id.is_empty() {
                    params.insert("client_id".to_string(), self.client_id.clone());
                }
            }
        }
    }
}

fn expiry_seconds(body: &serde_json::Value) -> Option<i64> {
    let raw = body.get("expires").or_else(|| body.get("expires_in"))?;
    raw.as_i64()
        .or_else(|| raw.as_str().and_then(|s| s.parse().ok()))
}
