//! Unisocial - one client model over several social-network web APIs.
//!
//! Each provider (Twitter, Facebook, Google, SoundCloud, ...) is reached
//! through a [`Connection`] built from a [`ProviderProfile`] and an
//! [`AuthEngine`] (OAuth1 request signing or OAuth2 bearer tokens).
//! Responses are decoded and converted into one uniform model: objects with
//! identifiers become lazily expanding [`Entity`] values, listings become
//! [`Collection`]s whose next-page cursor keeps the original request
//! parameters, and bulk lookups run through a [`Batcher`] that splits them
//! to provider size limits and reassembles partial results in input order.
//!
//! # Connecting and fetching
//!
//! ```no_run
//! use unisocial::{AuthEngine, Connection, OAuth1Engine, Params, ProviderProfile};
//!
//! # async fn run() -> unisocial::Result<()> {
//! let profile = ProviderProfile::new("twitter", "https://api.twitter.com/1.1/")
//!     .with_id_fields(["id", "id_str"]);
//! let engine = OAuth1Engine::new("consumer-key", "consumer-secret");
//! let connection = Connection::with_http(profile, AuthEngine::OAuth1(engine));
//!
//! let mut params = Params::new();
//! params.insert("screen_name".to_string(), "arnold".to_string());
//! let timeline = connection.fetch("statuses/user_timeline.json", params).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # The OAuth dance
//!
//! ```no_run
//! use unisocial::{AuthEngine, Connection, MemoryCredentialStore, OAuth2Engine, Params,
//!     ProviderProfile};
//!
//! # async fn run(callback_params: Params) -> unisocial::Result<()> {
//! let profile = ProviderProfile::new("facebook", "https://graph.facebook.com/")
//!     .with_authorize_url("https://www.facebook.com/dialog/oauth")
//!     .with_access_token_url("https://graph.facebook.com/oauth/access_token")
//!     .with_token_param("access_token");
//! let engine = OAuth2Engine::new("app-id", "app-secret").with_scope(["email"]);
//! let connection = Connection::with_http(profile, AuthEngine::OAuth2(engine));
//!
//! let store = MemoryCredentialStore::new();
//! let redirect = connection.auth_url("https://app.example.com/cb", &store).await?;
//! // ... send the user to `redirect`; the provider calls back with
//! // code/state parameters ...
//! let credential = connection.handle_auth_response(&callback_params, &store).await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod batch;
pub mod collection;
pub mod connection;
pub mod convert;
pub mod entity;
pub mod error;
pub mod profile;
pub mod transport;
pub mod value;

// Re-export public types
pub use auth::oauth1::OAuth1Engine;
pub use auth::oauth2::OAuth2Engine;
pub use auth::{AccessCredential, AuthEngine, CredentialStore, MemoryCredentialStore};
pub use batch::{BatchOutcome, BatchSlot, Batcher, Target};
pub use collection::Collection;
pub use connection::{ApiRequest, Connection};
pub use convert::{ConvertContext, DataConverter};
pub use entity::{Entity, EntityRef, EntityState};
pub use error::{ApiFailure, Error, Result, TransportError};
pub use profile::{EntityRoute, ProviderProfile};
pub use transport::{
    HttpTransport, Method, Params, Transport, TransportRequest, TransportResponse, UploadPart,
};
pub use value::Value;
