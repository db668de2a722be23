//! Data conversion.
//!
//! Turns decoded response bodies into the uniform model: strict timestamps
//! become `DateTime`, id-carrying objects become stub entities, page-shaped
//! objects become collections with a usable next-page URL. Conversion is
//! deterministic and side-effect-free; converting a converted value changes
//! nothing.

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use tracing::debug;

use crate::collection::Collection;
use crate::connection::Connection;
use crate::entity::{Entity, EntityState};
use crate::profile::ProviderProfile;
use crate::transport::{append_query, split_query, Params};
use crate::value::Value;

/// Context of the originating request, carried into cursor rewriting so a
/// later page fetch repeats the same filter parameters.
#[derive(Debug, Clone, Default)]
pub struct ConvertContext {
    /// Resolved URL the payload came from.
    pub resource: Option<String>,
    /// Business parameters of the originating request.
    pub params: Params,
}

impl ConvertContext {
    pub fn new(resource: impl Into<String>, params: Params) -> Self {
        Self {
            resource: Some(resource.into()),
            params,
        }
    }

    /// Context-free conversion: no cursor rewriting possible.
    pub fn bare() -> Self {
        Self::default()
    }
}

/// Recursive converter for one response payload.
pub struct DataConverter<'a> {
    profile: &'a ProviderProfile,
    context: ConvertContext,
    connection: Option<Connection>,
}

impl<'a> DataConverter<'a> {
    pub fn new(profile: &'a ProviderProfile, context: ConvertContext) -> Self {
        Self {
            profile,
            context,
            connection: None,
        }
    }

    /// Attach created entities and collections to this connection.
    pub fn with_connection(mut self, connection: Connection) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn convert(&self, value: Value) -> Value {
        self.convert_value(value, None)
    }

    /// Convert with a type tag for the top-level object, e.g. when the
    /// caller requested one entity of a known type.
    pub fn convert_typed(&self, value: Value, type_tag: Option<&str>) -> Value {
        self.convert_value(value, type_tag)
    }

    fn convert_value(&self, value: Value, type_tag: Option<&str>) -> Value {
        match value {
            // Already-typed values pass through untouched.
            Value::Entity(_) | Value::Collection(_) | Value::DateTime(_) => value,
            Value::String(text) => convert_string(text),
            Value::Null | Value::Bool(_) | Value::Number(_) => value,
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| self.convert_value(item, type_tag))
                    .collect(),
            ),
            Value::Object(map) => self.convert_object(map, type_tag),
        }
    }

    fn convert_object(&self, map: IndexMap<String, Value>, type_tag: Option<&str>) -> Value {
        if self.is_page(&map) {
            // Page shape wins over an identifying field: a listing that
            // happens to carry its own id is still a listing.
            return self.convert_page(map, type_tag);
        }
        if self.has_identifier(&map) {
            return self.convert_entity(map, type_tag);
        }
        Value::Object(self.convert_fields(map))
    }

    fn is_page(&self, map: &IndexMap<String, Value>) -> bool {
        matches!(map.get(&self.profile.list_field), Some(Value::Array(_)))
    }

    fn has_identifier(&self, map: &IndexMap<String, Value>) -> bool {
        self.profile
            .id_fields
            .iter()
            .any(|field| map.contains_key(field))
    }

    /// Field-wise recursion; nested fields may pick up a type tag from the
    /// profile's field table (`user_mentions` tagging its members as users).
    pub(crate) fn convert_fields(&self, map: IndexMap<String, Value>) -> IndexMap<String, Value> {
        map.into_iter()
            .map(|(field, value)| {
                let child_tag = self.profile.type_for_field(&field);
                let converted = self.convert_value(value, child_tag);
                (field, converted)
            })
            .collect()
    }

    fn convert_entity(&self, map: IndexMap<String, Value>, type_tag: Option<&str>) -> Value {
        let properties = self.convert_fields(map);
        let mut entity = Entity::new(
            type_tag.map(str::to_string),
            EntityState::Stub,
            properties,
        );
        if let Some(connection) = &self.connection {
            entity = entity.with_connection(connection.clone());
        }
        Value::Entity(entity)
    }

    fn convert_page(&self, mut map: IndexMap<String, Value>, type_tag: Option<&str>) -> Value {
        let next_page = value_at_path(&map, &self.profile.cursor_path)
            .and_then(Value::to_id_string)
            .and_then(|cursor| self.rewrite_cursor(&cursor));

        let mut items = Vec::new();
        if let Some(Value::Array(members)) = map.swap_remove(&self.profile.list_field) {
            items.reserve(members.len());
            for member in members {
                match self.convert_value(member, type_tag) {
                    Value::Entity(entity) => items.push(entity),
                    // Plain id listings (`{"ids": [101, 102], ...}`) page
                    // through as stubs.
                    Value::Number(id) => items.push(self.id_stub(Value::Number(id), type_tag)),
                    Value::String(id) => items.push(self.id_stub(Value::String(id), type_tag)),
                    other => {
                        debug!(member = ?other, "skipping unidentifiable page member");
                    }
                }
            }
        }

        let mut collection = Collection::new(type_tag.map(str::to_string), items)
            .with_next_page(next_page);
        if let Some(connection) = &self.connection {
            collection = collection.with_connection(connection.clone());
        }
        Value::Collection(collection)
    }

    fn id_stub(&self, id: Value, type_tag: Option<&str>) -> Entity {
        let mut properties = IndexMap::new();
        properties.insert("id".to_string(), id);
        let mut entity = Entity::new(type_tag.map(str::to_string), EntityState::Stub, properties);
        if let Some(connection) = &self.connection {
            entity = entity.with_connection(connection.clone());
        }
        entity
    }

    /// Normalize a next-page cursor into a request URL carrying the
    /// originating parameters.
    ///
    /// URL cursors keep their own parameters on conflict; bare tokens are
    /// rebuilt onto the originating resource under the profile's cursor
    /// parameter. A terminal cursor value means the listing is exhausted.
    fn rewrite_cursor(&self, cursor: &str) -> Option<String> {
        if self.profile.is_terminal_cursor(cursor) {
            return None;
        }

        if cursor.starts_with("http://") || cursor.starts_with("https://") {
            let (base, cursor_params) = split_query(cursor);
            let mut merged = self.context.params.clone();
            for (key, value) in cursor_params {
                merged.insert(key, value);
            }
            return Some(append_query(base, &merged));
        }

        let Some(resource) = self.context.resource.as_deref() else {
            debug!(cursor, "bare cursor token without request context; dropping pagination");
            return None;
        };
        let (base, url_params) = split_query(resource);
        let mut merged = url_params;
        for (key, value) in &self.context.params {
            merged.insert(key.clone(), value.clone());
        }
        merged.insert(self.profile.cursor_param.clone(), cursor.to_string());
        Some(append_query(base, &merged))
    }
}

/// Strict `YYYY-MM-DDTHH:MM:SS` timestamps become `DateTime`; everything
/// else stays a string.
fn convert_string(text: String) -> Value {
    if has_datetime_shape(&text) {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S") {
            return Value::DateTime(datetime);
        }
    }
    Value::String(text)
}

/// Exactly 19 characters, digits and separators in fixed positions.
fn has_datetime_shape(text: &str) -> bool {
    let bytes = text.as_bytes();
    if bytes.len() != 19 {
        return false;
    }
    bytes.iter().enumerate().all(|(i, b)| match i {
        4 | 7 => *b == b'-',
        10 => *b == b'T',
        13 | 16 => *b == b':',
        _ => b.is_ascii_digit(),
    })
}

/// Dot-path lookup inside a property map.
fn value_at_path<'v>(map: &'v IndexMap<String, Value>, path: &str) -> Option<&'v Value> {
    let mut segments = path.split('.');
    let mut current = map.get(segments.next()?)?;
    for segment in segments {
        current = current.get(segment)?;
    }
    Some(current)
}
