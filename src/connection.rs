//! Provider connections.
//!
//! A [`Connection`] composes a provider profile, an authentication engine
//! and the HTTP transport into the entry point callers use: raw requests,
//! converted fetches, entity factories, batched dispatch and the OAuth
//! handshake glue. Connections are cheap-clone handles; entities and
//! collections carry one as their back-reference.
//!
//! Locking discipline: the auth engine sits in one `RwLock` slot. Requests
//! clone what they need under a short read lock and never hold it across
//! a transport await; handshake and refresh writes replace the credential
//! as one atomic store, so no request ever observes a half-updated one.

use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::oauth1::{self, TempToken};
use crate::auth::oauth2::{OAuth2Engine, PendingAuth};
use crate::auth::{
    access_key, load_credential, request_token_key, save_credential, state_key, AccessCredential,
    AuthEngine, CredentialStore,
};
use crate::collection::Collection;
use crate::convert::{ConvertContext, DataConverter};
use crate::entity::{Entity, EntityState};
use crate::error::{ApiFailure, Error, Result, TransportError};
use crate::profile::ProviderProfile;
use crate::transport::{
    append_query, decode_body, split_query, HttpTransport, Method, Params, Transport,
    TransportRequest, TransportResponse, UploadPart,
};
use crate::value::Value;

/// One request in a batched dispatch.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub resource: String,
    pub params: Params,
}

impl ApiRequest {
    pub fn get(resource: impl Into<String>, params: Params) -> Self {
        Self {
            method: Method::Get,
            resource: resource.into(),
            params,
        }
    }

    pub fn post(resource: impl Into<String>, params: Params) -> Self {
        Self {
            method: Method::Post,
            resource: resource.into(),
            params,
        }
    }
}

/// Cheap-clone handle to one provider connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    profile: ProviderProfile,
    engine: RwLock<AuthEngine>,
    transport: Arc<dyn Transport>,
}

impl Connection {
    pub fn new(
        profile: ProviderProfile,
        engine: AuthEngine,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                profile,
                engine: RwLock::new(engine),
                transport,
            }),
        }
    }

    /// Connection over the default reqwest transport.
    pub fn with_http(profile: ProviderProfile, engine: AuthEngine) -> Self {
        Self::new(profile, engine, Arc::new(HttpTransport::new()))
    }

    pub fn profile(&self) -> &ProviderProfile {
        &self.inner.profile
    }

    /// Same application, different user: a new connection sharing profile
    /// and transport but holding the given credential.
    pub async fn as_user(&self, credential: AccessCredential) -> Result<Connection> {
        let mut engine = self.inner.engine.read().await.clone();
        engine.clear_credential();
        engine.set_credential(credential)?;
        Ok(Self {
            inner: Arc::new(ConnectionInner {
                profile: self.inner.profile.clone(),
                engine: RwLock::new(engine),
                transport: Arc::clone(&self.inner.transport),
            }),
        })
    }

    /// Load a previously persisted credential for this provider. Returns
    /// whether one was found.
    pub async fn restore(&self, store: &dyn CredentialStore) -> Result<bool> {
        match load_credential(store, &self.inner.profile.name)? {
            Some(credential) => {
                self.inner.engine.write().await.set_credential(credential)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn credential(&self) -> Option<AccessCredential> {
        self.inner.engine.read().await.credential()
    }

    pub async fn set_credential(&self, credential: AccessCredential) -> Result<()> {
        self.inner.engine.write().await.set_credential(credential)
    }

    /// A usable credential is held (and not expired, for OAuth2).
    pub async fn is_auth(&self) -> bool {
        self.inner.engine.read().await.is_auth()
    }

    // ---- raw requests ----------------------------------------------------

    /// Signed request returning the decoded but unconverted body.
    pub async fn request(&self, method: Method, resource: &str, params: Params) -> Result<Value> {
        let prepared = self
            .prepare(method, resource, params, &Params::new(), Vec::new())
            .await?;
        let response = self.inner.transport.request(&prepared).await?;
        Self::interpret_response(response)
    }

    pub async fn get(&self, resource: &str, params: Params) -> Result<Value> {
        self.request(Method::Get, resource, params).await
    }

    pub async fn post(&self, resource: &str, params: Params) -> Result<Value> {
        self.request(Method::Post, resource, params).await
    }

    /// Multipart POST. Business parameters travel as form fields next to
    /// the uploaded parts and stay out of the OAuth1 signature.
    pub async fn post_multipart(
        &self,
        resource: &str,
        params: Params,
        parts: Vec<UploadPart>,
    ) -> Result<Value> {
        let prepared = self
            .prepare(Method::Post, resource, params, &Params::new(), parts)
            .await?;
        let response = self.inner.transport.request(&prepared).await?;
        Self::interpret_response(response)
    }

    /// Dispatch several requests concurrently, each signed on its own.
    /// Results keep the input order; failures are per-request.
    pub async fn multi(&self, requests: &[ApiRequest]) -> Result<Vec<Result<Value>>> {
        let mut prepared = Vec::with_capacity(requests.len());
        {
            let engine = self.inner.engine.read().await;
            for request in requests {
                prepared.push(Self::build_request(
                    &engine,
                    &self.inner.profile,
                    request.method,
                    &self.inner.profile.resolve_url(&request.resource),
                    request.params.clone(),
                    &Params::new(),
                    Vec::new(),
                )?);
            }
        }

        let responses = self.inner.transport.multi(&prepared).await;
        Ok(responses
            .into_iter()
            .map(|result| match result {
                Ok(response) => Self::interpret_response(response),
                Err(err) => Err(Error::Transport(err)),
            })
            .collect())
    }

    /// Signed request with oauth parameter overrides, for the OAuth1
    /// handshake legs.
    async fn request_with_oauth(
        &self,
        method: Method,
        url: &str,
        overrides: &Params,
    ) -> Result<serde_json::Value> {
        let prepared = self
            .prepare(method, url, Params::new(), overrides, Vec::new())
            .await?;
        let response = self.inner.transport.request(&prepared).await?;
        Self::decode_or_status(response)
    }

    async fn prepare(
        &self,
        method: Method,
        resource: &str,
        params: Params,
        overrides: &Params,
        multipart: Vec<UploadPart>,
    ) -> Result<TransportRequest> {
        let url = self.inner.profile.resolve_url(resource);
        let engine = self.inner.engine.read().await;
        Self::build_request(
            &engine,
            &self.inner.profile,
            method,
            &url,
            params,
            overrides,
            multipart,
        )
    }

    fn build_request(
        engine: &AuthEngine,
        profile: &ProviderProfile,
        method: Method,
        url: &str,
        mut params: Params,
        overrides: &Params,
        multipart: Vec<UploadPart>,
    ) -> Result<TransportRequest> {
        let mut request = TransportRequest::new(method, url);
        match engine {
            AuthEngine::OAuth1(oauth1_engine) => {
                let header = oauth1_engine.authorization_header(
                    method,
                    url,
                    &params,
                    overrides,
                    !multipart.is_empty(),
                )?;
                request = request.with_header("Authorization", header);
            }
            AuthEngine::OAuth2(oauth2_engine) => {
                oauth2_engine.apply_token(&mut params, profile);
            }
        }
        request.params = params;
        request.multipart = multipart;
        Ok(request)
    }

    fn interpret_response(response: TransportResponse) -> Result<Value> {
        match decode_body(&response) {
            Ok(decoded) => {
                if let Some(failure) = ApiFailure::from_body(&decoded) {
                    debug!(code = ?failure.code, "provider reported an error payload");
                    return Err(Error::Api(failure));
                }
                if !response.is_success() {
                    return Err(Error::Transport(TransportError::Status {
                        status: response.status,
                        body: response.body,
                    }));
                }
                Ok(Value::from_json(decoded))
            }
            Err(_) if !response.is_success() => Err(Error::Transport(TransportError::Status {
                status: response.status,
                body: response.body,
            })),
            Err(err) => Err(Error::Transport(err)),
        }
    }

    /// Decode without the error-envelope check, for token endpoints whose
    /// error bodies the auth engines interpret themselves.
    fn decode_or_status(response: TransportResponse) -> Result<serde_json::Value> {
        match decode_body(&response) {
            Ok(decoded) => Ok(decoded),
            Err(_) if !response.is_success() => Err(Error::Transport(TransportError::Status {
                status: response.status,
                body: response.body,
            })),
            Err(err) => Err(Error::Transport(err)),
        }
    }

    // ---- converted fetches ----------------------------------------------

    /// GET a resource and convert the response: entities become stubs,
    /// pages become collections with a usable next-page cursor.
    pub async fn fetch(&self, resource: &str, params: Params) -> Result<Value> {
        self.fetch_typed(resource, params, None).await
    }

    pub(crate) async fn fetch_typed(
        &self,
        resource: &str,
        params: Params,
        type_tag: Option<&str>,
    ) -> Result<Value> {
        let raw = self
            .request(Method::Get, resource, params.clone())
            .await?;
        Ok(self.convert_response(resource, params, raw, type_tag))
    }

    /// Convert a decoded body with the originating request as context.
    pub(crate) fn convert_response(
        &self,
        resource: &str,
        params: Params,
        raw: Value,
        type_tag: Option<&str>,
    ) -> Value {
        let url = self.inner.profile.resolve_url(resource);
        let context = ConvertContext::new(url, params);
        self.converter(context).convert_typed(raw, type_tag)
    }

    /// Fetch a full URL, typically a collection's next-page cursor. The
    /// URL's own query becomes the conversion context, so pagination keeps
    /// carrying the original parameters forward.
    pub async fn fetch_url(&self, url: &str) -> Result<Value> {
        self.fetch_url_typed(url, None).await
    }

    pub(crate) async fn fetch_url_typed(&self, url: &str, type_tag: Option<&str>) -> Result<Value> {
        let (base, params) = split_query(url);
        self.fetch_typed(base, params, type_tag).await
    }

    /// Fetch one entity of a known type through its profile route.
    pub async fn fetch_entity(&self, type_tag: &str, id: &str) -> Result<Entity> {
        let route = self
            .inner
            .profile
            .route_for(type_tag)
            .ok_or_else(|| {
                Error::Configuration(format!("no fetch route for entity type {type_tag}"))
            })?
            .clone();

        let mut params = Params::new();
        let resource = if route.resource.contains(":id") {
            route.resource.replace(":id", id)
        } else {
            if let Some(param) = &route.id_param {
                params.insert(param.clone(), id.to_string());
            }
            route.resource.clone()
        };

        match self.fetch_typed(&resource, params, Some(type_tag)).await? {
            Value::Entity(mut entity) => {
                entity.set_full();
                Ok(entity)
            }
            _ => Err(Error::Api(ApiFailure {
                message: format!("entity endpoint {resource} answered with a non-object payload"),
                code: None,
            })),
        }
    }

    // ---- entity and collection factories --------------------------------

    /// Full entity from local data; no network access.
    pub fn create(&self, type_tag: impl Into<String>, data: IndexMap<String, Value>) -> Entity {
        let converter = self.converter(ConvertContext::bare());
        let properties = converter.convert_fields(data);
        Entity::new(Some(type_tag.into()), EntityState::Full, properties)
            .with_connection(self.clone())
    }

    /// Stub holding just an id. Missing-field access warns and stays local.
    pub fn stub(&self, type_tag: impl Into<String>, id: impl Into<Value>) -> Entity {
        self.stub_with_state(type_tag, id, EntityState::Stub)
    }

    /// Stub holding several known fields.
    pub fn stub_from(
        &self,
        type_tag: impl Into<String>,
        properties: IndexMap<String, Value>,
    ) -> Entity {
        Entity::new(Some(type_tag.into()), EntityState::Stub, properties)
            .with_connection(self.clone())
    }

    /// Stub that fetches the full object on first missing-field access.
    pub fn autoexpanding_stub(&self, type_tag: impl Into<String>, id: impl Into<Value>) -> Entity {
        self.stub_with_state(type_tag, id, EntityState::AutoExpand)
    }

    fn stub_with_state(
        &self,
        type_tag: impl Into<String>,
        id: impl Into<Value>,
        state: EntityState,
    ) -> Entity {
        let id_field = self
            .inner
            .profile
            .id_fields
            .first()
            .cloned()
            .unwrap_or_else(|| "id".to_string());
        let mut properties = IndexMap::new();
        properties.insert(id_field, id.into());
        Entity::new(Some(type_tag.into()), state, properties).with_connection(self.clone())
    }

    /// Collection over already-known entities.
    pub fn collection(&self, item_type: Option<String>, items: Vec<Entity>) -> Collection {
        Collection::new(item_type, items).with_connection(self.clone())
    }

    fn converter(&self, context: ConvertContext) -> DataConverter<'_> {
        DataConverter::new(&self.inner.profile, context).with_connection(self.clone())
    }

    // ---- OAuth handshake glue -------------------------------------------

    /// Start the authorization dance: returns the URL to send the user to.
    ///
    /// OAuth1 fetches and persists a temporary request token first; OAuth2
    /// persists a fresh single-use CSRF nonce together with the redirect
    /// URI for the later code exchange.
    pub async fn auth_url(
        &self,
        redirect_url: &str,
        store: &dyn CredentialStore,
    ) -> Result<String> {
        let engine = self.inner.engine.read().await.clone();
        match engine {
            AuthEngine::OAuth1(_) => self.oauth1_auth_url(redirect_url, store).await,
            AuthEngine::OAuth2(oauth2_engine) => {
                let pending = PendingAuth {
                    state: Uuid::new_v4().to_string(),
                    redirect_uri: redirect_url.to_string(),
                };
                let url =
                    oauth2_engine.auth_url(&self.inner.profile, redirect_url, &pending.state)?;
                let json = serde_json::to_string(&pending).map_err(|err| {
                    Error::Configuration(format!("handshake state not serializable: {err}"))
                })?;
                store.set(&state_key(&self.inner.profile.name), json);
                Ok(url)
            }
        }
    }

    async fn oauth1_auth_url(
        &self,
        redirect_url: &str,
        store: &dyn CredentialStore,
    ) -> Result<String> {
        let profile = &self.inner.profile;
        let request_token_url = profile.request_token_url.clone().ok_or_else(|| {
            Error::Configuration(format!("provider {} has no request-token URL", profile.name))
        })?;
        let authorize_url = profile.authorize_url.as_deref().ok_or_else(|| {
            Error::Configuration(format!("provider {} has no authorize URL", profile.name))
        })?;

        let mut overrides = Params::new();
        overrides.insert("oauth_callback".to_string(), redirect_url.to_string());
        let decoded = self
            .request_with_oauth(Method::Post, &request_token_url, &overrides)
            .await?;
        let (token, secret) = oauth1::token_pair_from_response(&decoded)?;

        let tmp = TempToken {
            token: token.clone(),
            secret,
        };
        let json = serde_json::to_string(&tmp).map_err(|err| {
            Error::Configuration(format!("request token not serializable: {err}"))
        })?;
        store.set(&request_token_key(&profile.name), json);
        debug!(provider = %profile.name, "request token stored, redirecting user");

        let mut query = Params::new();
        query.insert("oauth_token".to_string(), token);
        Ok(append_query(authorize_url, &query))
    }

    /// Finish the authorization dance with the provider's callback
    /// parameters. Verifies, exchanges, installs the credential atomically
    /// and persists it under `"{provider}:access"`.
    pub async fn handle_auth_response(
        &self,
        params: &Params,
        store: &dyn CredentialStore,
    ) -> Result<AccessCredential> {
        let engine = self.inner.engine.read().await.clone();
        match engine {
            AuthEngine::OAuth1(_) => self.oauth1_handle(params, store).await,
            AuthEngine::OAuth2(oauth2_engine) => {
                self.oauth2_handle(&oauth2_engine, params, store).await
            }
        }
    }

    async fn oauth1_handle(
        &self,
        params: &Params,
        store: &dyn CredentialStore,
    ) -> Result<AccessCredential> {
        let profile = &self.inner.profile;

        let verifier = params.get("oauth_verifier").ok_or_else(|| {
            Error::Authentication("callback carries no oauth_verifier".to_string())
        })?;

        let key = request_token_key(&profile.name);
        let stored = store.get(&key).ok_or_else(|| {
            Error::Authentication("no pending request token; restart the authorization".to_string())
        })?;
        let tmp: TempToken = serde_json::from_str(&stored).map_err(|err| {
            Error::Configuration(format!("stored request token unreadable: {err}"))
        })?;

        if let Some(callback_token) = params.get("oauth_token") {
            if callback_token != &tmp.token {
                return Err(Error::Authentication(
                    "callback request token does not match the pending one".to_string(),
                ));
            }
        }

        let access_token_url = profile.access_token_url.clone().ok_or_else(|| {
            Error::Configuration(format!("provider {} has no access-token URL", profile.name))
        })?;

        let mut overrides = Params::new();
        overrides.insert("oauth_token".to_string(), tmp.token.clone());
        overrides.insert("oauth_verifier".to_string(), verifier.clone());
        overrides.insert("oauth_token_secret".to_string(), tmp.secret.clone());

        let decoded = self
            .request_with_oauth(Method::Get, &access_token_url, &overrides)
            .await?;
        let (token, secret) = oauth1::token_pair_from_response(&decoded)?;

        store.delete(&key);

        let credential = AccessCredential::OAuth1 { token, secret };
        self.inner
            .engine
            .write()
            .await
            .set_credential(credential.clone())?;
        save_credential(store, &profile.name, &credential)?;
        info!(provider = %profile.name, "OAuth1 access token stored");
        Ok(credential)
    }

    async fn oauth2_handle(
        &self,
        engine: &OAuth2Engine,
        params: &Params,
        store: &dyn CredentialStore,
    ) -> Result<AccessCredential> {
        let profile = &self.inner.profile;

        // The stored nonce is single-use: gone after this call, match or not.
        let key = state_key(&profile.name);
        let pending = store
            .get(&key)
            .and_then(|json| serde_json::from_str::<PendingAuth>(&json).ok());
        store.delete(&key);

        let code = engine.callback_code(params, pending.as_ref().map(|p| p.state.as_str()))?;
        let redirect_uri = pending.as_ref().map(|p| p.redirect_uri.as_str());
        let body = engine.exchange_params(redirect_uri, code)?;

        let decoded = self.token_endpoint_call(body).await?;
        let credential = self.absorb_oauth2_response(&decoded).await?;
        save_credential(store, &profile.name, &credential)?;
        info!(provider = %profile.name, "OAuth2 access token stored");
        Ok(credential)
    }

    /// Trade the held refresh token for a fresh access token.
    pub async fn refresh(&self, store: &dyn CredentialStore) -> Result<AccessCredential> {
        let engine = self.inner.engine.read().await.clone();
        match engine {
            AuthEngine::OAuth1(_) => Err(Error::Configuration(
                "OAuth1 access tokens do not expire and cannot be refreshed".to_string(),
            )),
            AuthEngine::OAuth2(oauth2_engine) => {
                let body = oauth2_engine.refresh_params()?;
                let decoded = self.token_endpoint_call(body).await?;
                let credential = self.absorb_oauth2_response(&decoded).await?;
                save_credential(store, &self.inner.profile.name, &credential)?;
                info!(provider = %self.inner.profile.name, "OAuth2 access token refreshed");
                Ok(credential)
            }
        }
    }

    async fn token_endpoint_call(&self, body: Params) -> Result<serde_json::Value> {
        let url = self.inner.profile.access_token_url.clone().ok_or_else(|| {
            Error::Configuration(format!(
                "provider {} has no access-token URL",
                self.inner.profile.name
            ))
        })?;
        let request = TransportRequest::new(Method::Post, url).with_params(body);
        let response = self.inner.transport.request(&request).await?;
        Self::decode_or_status(response)
    }

    async fn absorb_oauth2_response(
        &self,
        decoded: &serde_json::Value,
    ) -> Result<AccessCredential> {
        let mut engine = self.inner.engine.write().await;
        match &mut *engine {
            AuthEngine::OAuth2(inner) => inner.absorb_token_response(decoded),
            AuthEngine::OAuth1(_) => Err(Error::Configuration(
                "connection is not OAuth2".to_string(),
            )),
        }
    }

    /// Drop the held credential and its persisted copy.
    pub async fn forget_credential(&self, store: &dyn CredentialStore) {
        self.inner.engine.write().await.clear_credential();
        store.delete(&access_key(&self.inner.profile.name));
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("provider", &self.inner.profile.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::auth::oauth1::OAuth1Engine;
    use crate::auth::oauth2::OAuth2Engine;
    use crate::auth::MemoryCredentialStore;
    use crate::profile::EntityRoute;

    /// Replays scripted responses in order and records every request.
    struct ScriptedTransport {
        responses: Mutex<VecDeque<TransportResponse>>,
        seen: Mutex<Vec<TransportRequest>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<TransportResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<TransportRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn request(
            &self,
            request: &TransportRequest,
        ) -> std::result::Result<TransportResponse, TransportError> {
            self.seen.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| TransportError::Body("no scripted response left".to_string()))
        }
    }

    fn json_response(status: u16, body: &str) -> TransportResponse {
        TransportResponse {
            status,
            content_type: Some("application/json".to_string()),
            body: body.to_string(),
        }
    }

    fn form_response(body: &str) -> TransportResponse {
        TransportResponse {
            status: 200,
            content_type: Some("text/html; charset=utf-8".to_string()),
            body: body.to_string(),
        }
    }

    fn oauth1_connection(transport: Arc<ScriptedTransport>) -> Connection {
        let profile = ProviderProfile::new("twitter", "https://api.twitter.com/1.1/")
            .with_authorize_url("https://api.twitter.com/oauth/authenticate")
            .with_request_token_url("https://api.twitter.com/oauth/request_token")
            .with_access_token_url("https://api.twitter.com/oauth/access_token");
        let mut engine = OAuth1Engine::new("ckey", "csecret");
        engine.set_token("utoken".to_string(), "usecret".to_string());
        Connection::new(profile, AuthEngine::OAuth1(engine), transport)
    }

    fn oauth2_connection(transport: Arc<ScriptedTransport>) -> Connection {
        let profile = ProviderProfile::new("facebook", "https://graph.facebook.com/")
            .with_authorize_url("https://www.facebook.com/dialog/oauth")
            .with_access_token_url("https://graph.facebook.com/oauth/access_token")
            .with_token_param("access_token");
        let mut engine = OAuth2Engine::new("client-1", "secret-1");
        engine.set_token("bearer-1".to_string(), None, None);
        Connection::new(profile, AuthEngine::OAuth2(engine), transport)
    }

    #[tokio::test]
    async fn test_oauth1_request_carries_authorization_header() {
        let transport = ScriptedTransport::new(vec![json_response(200, r#"{"ok":true}"#)]);
        let connection = oauth1_connection(Arc::clone(&transport));

        let mut params = Params::new();
        params.insert("screen_name".to_string(), "arnold".to_string());
        connection.get("users/show.json", params).await.unwrap();

        let seen = transport.requests();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].url, "https://api.twitter.com/1.1/users/show.json");
        let (name, value) = &seen[0].headers[0];
        assert_eq!(name, "Authorization");
        assert!(value.starts_with("OAuth "));
        assert!(value.contains(r#"oauth_consumer_key="ckey""#));
        assert!(value.contains(r#"oauth_token="utoken""#));
        // Business parameters are signed but travel as query parameters.
        assert!(!value.contains("screen_name"));
        assert_eq!(seen[0].params.get("screen_name").map(String::as_str), Some("arnold"));
    }

    #[tokio::test]
    async fn test_oauth2_request_injects_token_parameter() {
        let transport = ScriptedTransport::new(vec![json_response(200, r#"{"id":"42"}"#)]);
        let connection = oauth2_connection(Arc::clone(&transport));

        connection.get("me", Params::new()).await.unwrap();

        let seen = transport.requests();
        assert_eq!(seen[0].url, "https://graph.facebook.com/me");
        assert_eq!(
            seen[0].params.get("access_token").map(String::as_str),
            Some("bearer-1")
        );
        assert!(seen[0].headers.is_empty());
    }

    #[tokio::test]
    async fn test_error_envelope_maps_to_api_error() {
        let body = r#"{"error":{"message":"Invalid OAuth access token.","code":190}}"#;
        let transport = ScriptedTransport::new(vec![json_response(400, body)]);
        let connection = oauth2_connection(transport);

        let err = connection.get("me", Params::new()).await.unwrap_err();
        match err {
            Error::Api(failure) => {
                assert_eq!(failure.message, "Invalid OAuth access token.");
                assert_eq!(failure.code, Some(190));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failure_status_without_envelope_is_a_transport_error() {
        let transport =
            ScriptedTransport::new(vec![json_response(503, r#"{"status":"down"}"#)]);
        let connection = oauth2_connection(transport);

        let err = connection.get("me", Params::new()).await.unwrap_err();
        match err {
            Error::Transport(TransportError::Status { status, .. }) => assert_eq!(status, 503),
            other => panic!("expected Status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_multi_keeps_input_order_and_isolates_failures() {
        let transport = ScriptedTransport::new(vec![
            json_response(200, r#"{"id":"1"}"#),
            json_response(400, r#"{"error":{"message":"nope","code":10}}"#),
            json_response(200, r#"{"id":"3"}"#),
        ]);
        let connection = oauth2_connection(transport);

        let requests = vec![
            ApiRequest::get("a", Params::new()),
            ApiRequest::get("b", Params::new()),
            ApiRequest::get("c", Params::new()),
        ];
        let results = connection.multi(&requests).await.unwrap();

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(Error::Api(_))));
        assert!(results[2].is_ok());
    }

    #[tokio::test]
    async fn test_oauth1_auth_url_stores_request_token() {
        let transport = ScriptedTransport::new(vec![form_response(
            "oauth_token=req-1&oauth_token_secret=reqsec-1&oauth_callback_confirmed=true",
        )]);
        let connection = oauth1_connection(Arc::clone(&transport));
        let store = MemoryCredentialStore::new();

        let url = connection
            .auth_url("https://app.example.com/cb", &store)
            .await
            .unwrap();

        assert_eq!(
            url,
            "https://api.twitter.com/oauth/authenticate?oauth_token=req-1"
        );
        let seen = transport.requests();
        assert_eq!(seen[0].url, "https://api.twitter.com/oauth/request_token");
        assert_eq!(seen[0].method, Method::Post);
        let (_, header) = &seen[0].headers[0];
        assert!(header.contains("oauth_callback="));
        assert!(store.get("twitter:request_token").is_some());
    }

    #[tokio::test]
    async fn test_oauth1_callback_exchanges_and_persists_credential() {
        let transport = ScriptedTransport::new(vec![
            form_response("oauth_token=req-1&oauth_token_secret=reqsec-1"),
            form_response("oauth_token=acc-1&oauth_token_secret=accsec-1"),
        ]);
        let connection = oauth1_connection(Arc::clone(&transport));
        let store = MemoryCredentialStore::new();

        connection
            .auth_url("https://app.example.com/cb", &store)
            .await
            .unwrap();

        let mut callback = Params::new();
        callback.insert("oauth_token".to_string(), "req-1".to_string());
        callback.insert("oauth_verifier".to_string(), "verif-1".to_string());
        let credential = connection.handle_auth_response(&callback, &store).await.unwrap();

        assert_eq!(
            credential,
            AccessCredential::OAuth1 {
                token: "acc-1".to_string(),
                secret: "accsec-1".to_string(),
            }
        );
        // Request token is single-use; the access credential is persisted.
        assert!(store.get("twitter:request_token").is_none());
        assert!(store.get("twitter:access").is_some());
        assert!(connection.is_auth().await);
    }

    #[tokio::test]
    async fn test_oauth1_callback_with_mismatched_token_fails() {
        let transport = ScriptedTransport::new(vec![form_response(
            "oauth_token=req-1&oauth_token_secret=reqsec-1",
        )]);
        let connection = oauth1_connection(transport);
        let store = MemoryCredentialStore::new();

        connection
            .auth_url("https://app.example.com/cb", &store)
            .await
            .unwrap();

        let mut callback = Params::new();
        callback.insert("oauth_token".to_string(), "someone-elses".to_string());
        callback.insert("oauth_verifier".to_string(), "verif-1".to_string());
        let err = connection.handle_auth_response(&callback, &store).await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[tokio::test]
    async fn test_oauth2_round_trip_installs_bearer_token() {
        let transport = ScriptedTransport::new(vec![json_response(
            200,
            r#"{"access_token":"bearer-2","refresh_token":"refresh-2","expires_in":3600}"#,
        )]);
        let profile = ProviderProfile::new("facebook", "https://graph.facebook.com/")
            .with_authorize_url("https://www.facebook.com/dialog/oauth")
            .with_access_token_url("https://graph.facebook.com/oauth/access_token");
        let engine = OAuth2Engine::new("client-1", "secret-1");
        let connection = Connection::new(
            profile,
            AuthEngine::OAuth2(engine),
            Arc::clone(&transport) as Arc<dyn Transport>,
        );
        let store = MemoryCredentialStore::new();

        let url = connection
            .auth_url("https://app.example.com/cb", &store)
            .await
            .unwrap();
        let state_json = store.get("facebook:state").unwrap();
        let pending: PendingAuth = serde_json::from_str(&state_json).unwrap();
        assert!(url.contains(&format!("state={}", pending.state)));

        let mut callback = Params::new();
        callback.insert("code".to_string(), "code-1".to_string());
        callback.insert("state".to_string(), pending.state.clone());
        let credential = connection.handle_auth_response(&callback, &store).await.unwrap();

        match credential {
            AccessCredential::OAuth2 {
                access_token,
                refresh_token,
                expires_at,
            } => {
                assert_eq!(access_token, "bearer-2");
                assert_eq!(refresh_token.as_deref(), Some("refresh-2"));
                assert!(expires_at.is_some());
            }
            other => panic!("expected OAuth2 credential, got {other:?}"),
        }

        // Nonce is gone; token exchange repeated the original redirect URI.
        assert!(store.get("facebook:state").is_none());
        let seen = transport.requests();
        assert_eq!(
            seen[0].params.get("redirect_uri").map(String::as_str),
            Some("https://app.example.com/cb")
        );
        assert_eq!(seen[0].params.get("code").map(String::as_str), Some("code-1"));
        assert!(connection.is_auth().await);
    }

    #[tokio::test]
    async fn test_oauth2_callback_without_pending_state_fails() {
        let transport = ScriptedTransport::new(vec![]);
        let connection = oauth2_connection(transport);
        let store = MemoryCredentialStore::new();

        let mut callback = Params::new();
        callback.insert("code".to_string(), "code-1".to_string());
        callback.insert("state".to_string(), "forged".to_string());
        let err = connection.handle_auth_response(&callback, &store).await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[tokio::test]
    async fn test_refresh_on_oauth1_is_a_configuration_error() {
        let transport = ScriptedTransport::new(vec![]);
        let connection = oauth1_connection(transport);
        let store = MemoryCredentialStore::new();

        let err = connection.refresh(&store).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_restore_loads_persisted_credential() {
        let transport = ScriptedTransport::new(vec![]);
        let profile = ProviderProfile::new("facebook", "https://graph.facebook.com/");
        let engine = OAuth2Engine::new("client-1", "secret-1");
        let connection = Connection::new(profile, AuthEngine::OAuth2(engine), transport);
        let store = MemoryCredentialStore::new();

        assert!(!connection.restore(&store).await.unwrap());
        assert!(!connection.is_auth().await);

        store.set(
            "facebook:access",
            r#"{"kind":"oauth2","access_token":"bearer-9"}"#.to_string(),
        );
        assert!(connection.restore(&store).await.unwrap());
        assert!(connection.is_auth().await);
        assert!(connection.credential().await.is_some());
    }

    #[tokio::test]
    async fn test_fetch_entity_promotes_to_full() {
        let transport = ScriptedTransport::new(vec![json_response(
            200,
            r#"{"id":"42","screen_name":"arnold"}"#,
        )]);
        let profile = ProviderProfile::new("twitter", "https://api.twitter.com/1.1/")
            .with_route("user", EntityRoute::with_param("users/show.json", "user_id"));
        let engine = OAuth1Engine::new("ckey", "csecret");
        let connection = Connection::new(
            profile,
            AuthEngine::OAuth1(engine),
            Arc::clone(&transport) as Arc<dyn Transport>,
        );

        let entity = connection.fetch_entity("user", "42").await.unwrap();
        assert!(!entity.is_stub());
        assert_eq!(entity.id().as_deref(), Some("42"));

        let seen = transport.requests();
        assert_eq!(seen[0].params.get("user_id").map(String::as_str), Some("42"));
    }
}
