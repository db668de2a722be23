//! Ordered entity collections with cursor pagination.
//!
//! A collection is append-only: advancing pages adds items and replaces the
//! cursor, nothing already loaded is ever dropped or refetched. Iterating
//! loaded items is free; the next page is always an explicit
//! [`Collection::fetch_next`] call.

use crate::connection::Connection;
use crate::entity::Entity;
use crate::error::{ApiFailure, Error, Result};
use crate::value::Value;

/// Entities of one type plus the cursor to their next page.
///
/// The cursor is a request URL; bare provider tokens are normalized into
/// URLs at conversion time, with the originating request's parameters
/// embedded. An absent cursor means the listing is exhausted.
#[derive(Clone)]
pub struct Collection {
    item_type: Option<String>,
    items: Vec<Entity>,
    next_page: Option<String>,
    connection: Option<Connection>,
}

impl Collection {
    pub fn new(item_type: Option<String>, items: Vec<Entity>) -> Self {
        Self {
            item_type,
            items,
            next_page: None,
            connection: None,
        }
    }

    pub fn with_next_page(mut self, next_page: Option<String>) -> Self {
        self.next_page = next_page;
        self
    }

    pub fn with_connection(mut self, connection: Connection) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn item_type(&self) -> Option<&str> {
        self.item_type.as_deref()
    }

    pub fn items(&self) -> &[Entity] {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut [Entity] {
        &mut self.items
    }

    pub fn into_items(self) -> Vec<Entity> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether another page is known to exist.
    pub fn has_more(&self) -> bool {
        self.next_page.is_some()
    }

    pub fn next_page(&self) -> Option<&str> {
        self.next_page.as_deref()
    }

    /// Load the next page, appending its items in response order.
    ///
    /// Terminal collections (no cursor) return an empty slice without any
    /// network access. On success the returned slice covers exactly the
    /// newly appended items; the cursor moves forward or clears. On failure
    /// the cursor is untouched, so the call can be retried.
    pub async fn fetch_next(&mut self) -> Result<&[Entity]> {
        let start = self.items.len();

        let Some(url) = self.next_page.clone() else {
            return Ok(&self.items[start..]);
        };
        let connection = self.connection.clone().ok_or(Error::NotConnected)?;

        match connection
            .fetch_url_typed(&url, self.item_type.as_deref())
            .await?
        {
            Value::Collection(page) => {
                self.next_page = page.next_page;
                self.items.extend(page.items);
            }
            // Some endpoints answer the last page as a bare array.
            Value::Array(values) => {
                self.next_page = None;
                self.items
                    .extend(values.into_iter().filter_map(|value| match value {
                        Value::Entity(entity) => Some(entity),
                        _ => None,
                    }));
            }
            _ => {
                return Err(Error::Api(ApiFailure {
                    message: format!("expected a page of results from {url}"),
                    code: None,
                }));
            }
        }

        Ok(&self.items[start..])
    }
}

// Connection equality is identity, not state.
impl PartialEq for Collection {
    fn eq(&self, other: &Self) -> bool {
        self.item_type == other.item_type
            && self.items == other.items
            && self.next_page == other.next_page
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("item_type", &self.item_type)
            .field("len", &self.items.len())
            .field("next_page", &self.next_page)
            .finish()
    }
}

impl IntoIterator for Collection {
    type Item = Entity;
    type IntoIter = std::vec::IntoIter<Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Entity;
    type IntoIter = std::slice::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityState;
    use indexmap::IndexMap;

    fn stub(id: &str) -> Entity {
        let mut properties = IndexMap::new();
        properties.insert("id".to_string(), Value::from(id));
        Entity::new(Some("user".to_string()), EntityState::Stub, properties)
    }

    #[tokio::test]
    async fn test_fetch_next_without_cursor_is_terminal_and_free() {
        let mut collection = Collection::new(Some("user".to_string()), vec![stub("1")]);
        assert!(!collection.has_more());

        let appended = collection.fetch_next().await.unwrap();
        assert!(appended.is_empty());
        assert_eq!(collection.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_next_detached_with_cursor_fails() {
        let mut collection = Collection::new(Some("user".to_string()), vec![])
            .with_next_page(Some("https://api.example.com/users?cursor=2".to_string()));

        assert!(matches!(
            collection.fetch_next().await,
            Err(Error::NotConnected)
        ));
        // The cursor survives the failure.
        assert!(collection.has_more());
    }

    #[test]
    fn test_iteration_and_accessors() {
        let collection = Collection::new(Some("user".to_string()), vec![stub("1"), stub("2")]);

        assert_eq!(collection.len(), 2);
        assert!(!collection.is_empty());
        assert_eq!(collection.item_type(), Some("user"));

        let ids: Vec<_> = (&collection)
            .into_iter()
            .filter_map(|entity| entity.id())
            .collect();
        assert_eq!(ids, vec!["1", "2"]);

        // Re-iteration is free and repeatable.
        let again: Vec<_> = collection
            .items()
            .iter()
            .filter_map(|entity| entity.id())
            .collect();
        assert_eq!(again, ids);
    }

    #[test]
    fn test_equality_ignores_connection() {
        let a = Collection::new(Some("user".to_string()), vec![stub("1")])
            .with_next_page(Some("https://api.example.com/users?cursor=2".to_string()));
        let b = a.clone();
        assert_eq!(a, b);
    }
}
