//! OAuth1 request signing and handshake pieces.
//!
//! Every request carries an `Authorization: OAuth ...` header with an
//! HMAC-SHA1 signature over the canonicalized request. The header is a pure
//! function of the request plus nonce and timestamp; handshake legs reuse it
//! with overrides (`oauth_callback`, `oauth_verifier`, a temporary token).

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use uuid::Uuid;

use super::AccessCredential;
use crate::error::{Error, Result};
use crate::transport::{split_query, Method, Params};

type HmacSha1 = Hmac<Sha1>;

/// OAuth1 signing engine: consumer pair plus an optional user token.
#[derive(Debug, Clone)]
pub struct OAuth1Engine {
    consumer_key: String,
    consumer_secret: String,
    token: Option<TokenPair>,
}

#[derive(Debug, Clone)]
struct TokenPair {
    token: String,
    secret: String,
}

impl OAuth1Engine {
    pub fn new(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            token: None,
        }
    }

    pub fn set_token(&mut self, token: String, secret: String) {
        self.token = Some(TokenPair { token, secret });
    }

    pub fn clear_token(&mut self) {
        self.token = None;
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub fn credential(&self) -> Option<AccessCredential> {
        self.token.as_ref().map(|pair| AccessCredential::OAuth1 {
            token: pair.token.clone(),
            secret: pair.secret.clone(),
        })
    }

    /// Build the `Authorization` header for one request.
    ///
    /// The signed set is the oauth parameters, the business `params` and any
    /// query parameters already on `url`; explicit parameters win over the
    /// URL query. Multipart uploads sign only the oauth parameters.
    ///
    /// `overrides` add to or replace the default oauth parameters
    /// (`oauth_callback`, `oauth_verifier`, a fixed `oauth_nonce` and
    /// `oauth_timestamp` for reproducible signatures). The special
    /// `oauth_token_secret` override selects the signing secret; it never
    /// appears in the signed set or the header.
    pub fn authorization_header(
        &self,
        method: Method,
        url: &str,
        params: &Params,
        overrides: &Params,
        multipart: bool,
    ) -> Result<String> {
        if self.consumer_key.is_empty() || self.consumer_secret.is_empty() {
            return Err(Error::Configuration(
                "OAuth1 consumer key and secret are required for signing".to_string(),
            ));
        }

        let mut oauth: BTreeMap<String, String> = BTreeMap::new();
        oauth.insert("oauth_consumer_key".to_string(), self.consumer_key.clone());
        oauth.insert(
            "oauth_nonce".to_string(),
            Uuid::new_v4().simple().to_string(),
        );
        oauth.insert(
            "oauth_signature_method".to_string(),
            "HMAC-SHA1".to_string(),
        );
        oauth.insert(
            "oauth_timestamp".to_string(),
            Utc::now().timestamp().to_string(),
        );
        oauth.insert("oauth_version".to_string(), "1.0".to_string());
        if let Some(pair) = &self.token {
            oauth.insert("oauth_token".to_string(), pair.token.clone());
        }

        let mut signing_secret = self.token.as_ref().map(|pair| pair.secret.clone());
        for (key, value) in overrides {
            if key == "oauth_token_secret" {
                signing_secret = Some(value.clone());
            } else {
                oauth.insert(key.clone(), value.clone());
            }
        }

        let (base_url, url_params) = split_query(url);

        let mut signed: BTreeMap<String, String> = BTreeMap::new();
        if !multipart {
            for (key, value) in url_params {
                signed.insert(key, value);
            }
            for (key, value) in params {
                signed.insert(key.clone(), value.clone());
            }
        }
        for (key, value) in &oauth {
            signed.insert(key.clone(), value.clone());
        }

        let joined = signed
            .iter()
            .map(|(k, v)| format!("{}={}", rfc3986(k), rfc3986(v)))
            .collect::<Vec<_>>()
            .join("&");
        let base = format!(
            "{}&{}&{}",
            method.as_str(),
            rfc3986(base_url),
            rfc3986(&joined)
        );

        let key = format!(
            "{}&{}",
            rfc3986(&self.consumer_secret),
            rfc3986(signing_secret.as_deref().unwrap_or(""))
        );
        let mut mac = HmacSha1::new_from_slice(key.as_bytes())
            .map_err(|_| Error::Configuration("unusable OAuth1 signing key".to_string()))?;
        mac.update(base.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());

        oauth.insert("oauth_signature".to_string(), signature);
        let header = oauth
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, rfc3986(v)))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(format!("OAuth {header}"))
    }
}

/// RFC 3986 percent-encoding: everything except unreserved characters.
fn rfc3986(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Temporary request-token pair persisted between the two handshake legs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TempToken {
    pub token: String,
    pub secret: String,
}

/// Extract `oauth_token`/`oauth_token_secret` from a decoded token response.
pub(crate) fn token_pair_from_response(body: &serde_json::Value) -> Result<(String, String)> {
    let token = body.get("oauth_token").and_then(|v| v.as_str());
    let secret = body.get("oauth_token_secret").and_then(|v| v.as_str());
    match (token, secret) {
        (Some(token), Some(secret)) => Ok((token.to_string(), secret.to_string())),
        _ => Err(Error::Authentication(
            "token endpoint answered without oauth_token/oauth_token_secret".to_string(),
        )),
    }
}
