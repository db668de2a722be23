//! Provider profiles.
//!
//! A profile is plain data describing what varies between APIs: endpoint
//! URLs, the token parameter name, id aliases, page shape, cursor location
//! and batching limits. Connections and the converter consult the profile;
//! no provider name is ever special-cased in core code.

use std::collections::HashMap;

/// Route used to fetch a single entity of one type.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRoute {
    /// Resource path resolved against the profile base URL. May carry an
    /// `:id` placeholder (`users/:id`).
    pub resource: String,
    /// Query parameter carrying the id when the path has no placeholder
    /// (`users/show` + `user_id=...`).
    pub id_param: Option<String>,
}

impl EntityRoute {
    /// Route with the id interpolated into the path.
    pub fn path(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            id_param: None,
        }
    }

    /// Route with the id passed as a request parameter.
    pub fn with_param(resource: impl Into<String>, id_param: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            id_param: Some(id_param.into()),
        }
    }
}

/// Endpoint and field-name data for one provider.
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    /// Short provider name (`twitter`, `facebook`); also the credential
    /// store key prefix.
    pub name: String,
    /// Base API URL relative resources resolve against.
    pub base_url: String,
    /// User-facing authorization page.
    pub authorize_url: Option<String>,
    /// OAuth1 temporary-token endpoint.
    pub request_token_url: Option<String>,
    /// Token exchange endpoint (OAuth1 access token / OAuth2 code exchange).
    pub access_token_url: Option<String>,
    /// Parameter carrying the access token on data requests.
    pub token_param: String,
    /// Field names that identify an object, in preference order.
    pub id_fields: Vec<String>,
    /// Field holding the item array in a page-shaped response.
    pub list_field: String,
    /// Dot-separated path to the next-page cursor in a page-shaped response.
    pub cursor_path: String,
    /// Request parameter the provider reads bare cursor tokens from.
    pub cursor_param: String,
    /// Cursor value meaning "no further pages" (Twitter sends `"0"`).
    pub terminal_cursor: Option<String>,
    /// Nested field name to entity type tag (`user_mentions` to `user`).
    pub field_types: HashMap<String, String>,
    /// Entity type tag to fetch route.
    pub routes: HashMap<String, EntityRoute>,
    /// Largest number of targets one batched sub-request may carry.
    pub max_batch_size: usize,
    /// Parameter carrying comma-joined numeric ids in a batched request.
    pub batch_id_param: String,
    /// Parameter carrying comma-joined names in a batched request.
    pub batch_name_param: String,
}

impl ProviderProfile {
    /// Profile with neutral defaults; builder methods fill in the rest.
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            authorize_url: None,
            request_token_url: None,
            access_token_url: None,
            token_param: "oauth_token".to_string(),
            id_fields: vec!["id".to_string()],
            list_field: "data".to_string(),
            cursor_path: "paging.next".to_string(),
            cursor_param: "cursor".to_string(),
            terminal_cursor: None,
            field_types: HashMap::new(),
            routes: HashMap::new(),
            max_batch_size: 50,
            batch_id_param: "id".to_string(),
            batch_name_param: "name".to_string(),
        }
    }

    pub fn with_authorize_url(mut self, url: impl Into<String>) -> Self {
        self.authorize_url = Some(url.into());
        self
    }

    pub fn with_request_token_url(mut self, url: impl Into<String>) -> Self {
        self.request_token_url = Some(url.into());
        self
    }

    pub fn with_access_token_url(mut self, url: impl Into<String>) -> Self {
        self.access_token_url = Some(url.into());
        self
    }

    pub fn with_token_param(mut self, param: impl Into<String>) -> Self {
        self.token_param = param.into();
        self
    }

    pub fn with_id_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.id_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_list_field(mut self, field: impl Into<String>) -> Self {
        self.list_field = field.into();
        self
    }

    pub fn with_cursor(mut self, path: impl Into<String>, param: impl Into<String>) -> Self {
        self.cursor_path = path.into();
        self.cursor_param = param.into();
        self
    }

    pub fn with_terminal_cursor(mut self, value: impl Into<String>) -> Self {
        self.terminal_cursor = Some(value.into());
        self
    }

    pub fn with_field_type(mut self, field: impl Into<String>, type_tag: impl Into<String>) -> Self {
        self.field_types.insert(field.into(), type_tag.into());
        self
    }

    pub fn with_route(mut self, type_tag: impl Into<String>, route: EntityRoute) -> Self {
        self.routes.insert(type_tag.into(), route);
        self
    }

    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    pub fn with_batch_params(
        mut self,
        id_param: impl Into<String>,
        name_param: impl Into<String>,
    ) -> Self {
        self.batch_id_param = id_param.into();
        self.batch_name_param = name_param.into();
        self
    }

    /// Resolve a resource against the base URL. Absolute URLs pass through.
    pub fn resolve_url(&self, resource: &str) -> String {
        if resource.starts_with("http://") || resource.starts_with("https://") {
            return resource.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            resource.trim_start_matches('/')
        )
    }

    /// Entity type tag for a nested field name, if the profile maps one.
    pub fn type_for_field(&self, field: &str) -> Option<&str> {
        self.field_types.get(field).map(String::as_str)
    }

    /// Fetch route for an entity type tag.
    pub fn route_for(&self, type_tag: &str) -> Option<&EntityRoute> {
        self.routes.get(type_tag)
    }

    /// Whether a cursor value means the listing is exhausted.
    pub fn is_terminal_cursor(&self, cursor: &str) -> bool {
        self.terminal_cursor.as_deref() == Some(cursor)
    }
}
