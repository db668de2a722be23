//! Generic entity representation of remote objects.
//!
//! An [`Entity`] is an ordered property map plus a type tag and a stub
//! state. Stubs hold only identifying fields; autoexpanding stubs fetch the
//! full object transparently on the first access of a missing field. The
//! connection back-reference is a cheap clone used only for that lazy
//! fetch; entities survive detaching (serialization, caching) and can be
//! reattached later.


use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::value::Value;

/// How complete an entity's property set is.
///
/// State only ever moves `Stub`/`AutoExpand` to `Full`, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    /// All known fields are present.
    Full,
    /// Identifying fields only; missing-field access warns but stays local.
    Stub,
    /// Identifying fields only; missing-field access fetches the rest.
    AutoExpand,
}

/// A remote object: type tag, stub state and an ordered property map.
#[derive(Clone)]
pub struct Entity {
    type_tag: Option<String>,
    state: EntityState,
    properties: IndexMap<String, Value>,
    connection: Option<Connection>,
}

impl Entity {
    /// Detached entity. Attach with [`Entity::with_connection`] or
    /// [`Entity::reconnect`] before anything that needs the network.
    pub fn new(
        type_tag: Option<String>,
        state: EntityState,
        properties: IndexMap<String, Value>,
    ) -> Self {
        Self {
            type_tag,
            state,
            properties,
            connection: None,
        }
    }

    pub fn with_connection(mut self, connection: Connection) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn type_tag(&self) -> Option<&str> {
        self.type_tag.as_deref()
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    /// Any state short of `Full`.
    pub fn is_stub(&self) -> bool {
        self.state != EntityState::Full
    }

    pub(crate) fn set_full(&mut self) {
        self.state = EntityState::Full;
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    pub fn properties(&self) -> &IndexMap<String, Value> {
        &self.properties
    }

    pub fn into_properties(self) -> IndexMap<String, Value> {
        self.properties
    }

    /// Pure property lookup; never touches the network.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(name.into(), value.into());
    }

    /// Property lookup with lazy expansion.
    ///
    /// A present field returns without network access. A missing field on an
    /// autoexpanding stub triggers one fetch, merges the result, marks the
    /// entity full and retries the lookup. A missing field on a plain stub
    /// is a warning, not an error.
    pub async fn get(&mut self, name: &str) -> Result<Option<&Value>> {
        if !self.properties.contains_key(name) {
            match self.state {
                EntityState::AutoExpand => {
                    debug!(field = name, "expanding stub on missing field");
                    self.fetch(false).await?;
                }
                EntityState::Stub => {
                    warn!(
                        field = name,
                        entity_type = self.type_tag.as_deref().unwrap_or("untyped"),
                        "field missing on stub entity; fetch() it or use an autoexpanding stub"
                    );
                }
                EntityState::Full => {}
            }
        }
        Ok(self.properties.get(name))
    }

    /// Load the full object from the provider.
    ///
    /// No-op when already full, unless `refresh` forces a reload. Needs a
    /// connection, a type tag with a configured route, and an id.
    pub async fn fetch(&mut self, refresh: bool) -> Result<()> {
        if self.state == EntityState::Full && !refresh {
            return Ok(());
        }

        let connection = self.connection.clone().ok_or(Error::NotConnected)?;
        let type_tag = self.type_tag.clone().ok_or_else(|| {
            Error::Configuration("entity has no type tag to resolve a fetch route".to_string())
        })?;
        let id = self.id().ok_or_else(|| {
            Error::Configuration("entity has no id to fetch with".to_string())
        })?;

        let fetched = connection.fetch_entity(&type_tag, &id).await?;
        self.merge(fetched.into_properties());
        self.state = EntityState::Full;
        Ok(())
    }

    /// Additive merge: new values overwrite same-named values, nothing is
    /// removed. Never demotes a full entity back to a stub.
    pub fn merge(&mut self, properties: IndexMap<String, Value>) {
        for (name, value) in properties {
            self.properties.insert(name, value);
        }
    }

    /// Identifying value, normalized to a string. Honors the provider's id
    /// aliases when connected; a detached entity falls back to `id`.
    pub fn id(&self) -> Option<String> {
        match &self.connection {
            Some(connection) => connection
                .profile()
                .id_fields
                .iter()
                .find_map(|field| self.properties.get(field))
                .and_then(Value::to_id_string),
            None => self.properties.get("id").and_then(Value::to_id_string),
        }
    }

    /// Identity comparison: same type and same id. Accepts another entity
    /// or a raw id.
    pub fn is<'a>(&self, other: impl Into<EntityRef<'a>>) -> bool {
        match other.into() {
            EntityRef::Id(id) => self.id().as_deref() == Some(id),
            EntityRef::Entity(other) => {
                if self.type_tag != other.type_tag {
                    return false;
                }
                match (self.id(), other.id()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                }
            }
        }
    }

    /// Drop the connection back-reference, e.g. before serializing.
    pub fn detach(&mut self) {
        self.connection = None;
    }

    /// Reattach a detached entity. Refuses to replace a live connection.
    pub fn reconnect(&mut self, connection: Connection) -> Result<()> {
        if self.connection.is_some() {
            return Err(Error::Configuration(
                "entity is still connected; detach it first".to_string(),
            ));
        }
        self.connection = Some(connection);
        Ok(())
    }
}

/// Something an entity can be compared against.
pub enum EntityRef<'a> {
    Entity(&'a Entity),
    Id(&'a str),
}

impl<'a> From<&'a Entity> for EntityRef<'a> {
    fn from(entity: &'a Entity) -> Self {
        EntityRef::Entity(entity)
    }
}

impl<'a> From<&'a str> for EntityRef<'a> {
    fn from(id: &'a str) -> Self {
        EntityRef::Id(id)
    }
}

impl<'a> From<&'a String> for EntityRef<'a> {
    fn from(id: &'a String) -> Self {
        EntityRef::Id(id)
    }
}

// Connection equality is identity, not state; two copies of the same remote
// object compare equal regardless of which connection they came through.
impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.type_tag == other.type_tag
            && self.state == other.state
            && self.properties == other.properties
    }
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("type_tag", &self.type_tag)
            .field("state", &self.state)
            .field("properties", &self.properties)
            .field(
                "connection",
                &self.connection.as_ref().map(|c| c.profile().name.clone()),
            )
            .finish()
    }
}
