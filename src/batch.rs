//! Bulk lookups over provider size limits.
//!
//! Providers cap how many objects one request may name (Twitter's user
//! lookup takes 100). [`Batcher`] splits a target list into sub-requests of
//! at most the profile's `max_batch_size`, dispatches them concurrently
//! through [`Connection::multi`] and reassembles one outcome in the original
//! input order. A failing sub-request marks only its own slots; siblings
//! land normally.

use std::sync::Arc;

use tracing::debug;

use crate::collection::Collection;
use crate::connection::{ApiRequest, Connection};
use crate::entity::Entity;
use crate::error::{ApiFailure, Error, Result};
use crate::transport::{Method, Params};
use crate::value::Value;

/// One lookup target. Kinds are never mixed within a sub-request: numeric
/// ids and names go to the provider under different parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Id(u64),
    Name(String),
}

impl Target {
    fn request_value(&self) -> String {
        match self {
            Target::Id(id) => id.to_string(),
            Target::Name(name) => name.clone(),
        }
    }
}

impl From<u64> for Target {
    fn from(id: u64) -> Self {
        Target::Id(id)
    }
}

impl From<&str> for Target {
    fn from(name: &str) -> Self {
        Target::Name(name.to_string())
    }
}

impl From<String> for Target {
    fn from(name: String) -> Self {
        Target::Name(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetKind {
    Id,
    Name,
}

/// Outcome for one requested target.
#[derive(Debug, Clone)]
pub enum BatchSlot {
    Found(Entity),
    /// The sub-request succeeded but the provider dropped this identifier.
    Missing,
    /// The whole sub-request this target travelled in failed.
    Failed(Arc<Error>),
}

/// Reassembled result of a batched lookup; slot order equals input order.
#[derive(Debug)]
pub struct BatchOutcome {
    slots: Vec<(Target, BatchSlot)>,
    item_type: Option<String>,
    connection: Connection,
}

impl BatchOutcome {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[(Target, BatchSlot)] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&BatchSlot> {
        self.slots.get(index).map(|(_, slot)| slot)
    }

    /// Found entities in input order; missing and failed slots are skipped.
    pub fn entities(&self) -> Vec<&Entity> {
        self.slots
            .iter()
            .filter_map(|(_, slot)| match slot {
                BatchSlot::Found(entity) => Some(entity),
                _ => None,
            })
            .collect()
    }

    /// Targets the provider silently dropped.
    pub fn missing(&self) -> Vec<&Target> {
        self.slots
            .iter()
            .filter_map(|(target, slot)| match slot {
                BatchSlot::Missing => Some(target),
                _ => None,
            })
            .collect()
    }

    /// Targets whose sub-request failed, with the shared error.
    pub fn failures(&self) -> Vec<(&Target, &Error)> {
        self.slots
            .iter()
            .filter_map(|(target, slot)| match slot {
                BatchSlot::Failed(error) => Some((target, error.as_ref())),
                _ => None,
            })
            .collect()
    }

    pub fn fully_found(&self) -> bool {
        self.slots
            .iter()
            .all(|(_, slot)| matches!(slot, BatchSlot::Found(_)))
    }

    /// Found entities as one collection, input order, no further pages.
    pub fn into_collection(self) -> Collection {
        let BatchOutcome {
            slots,
            item_type,
            connection,
        } = self;
        let items = slots
            .into_iter()
            .filter_map(|(_, slot)| match slot {
                BatchSlot::Found(entity) => Some(entity),
                _ => None,
            })
            .collect();
        connection.collection(item_type, items)
    }
}

/// Batched lookup builder over one connection.
pub struct Batcher<'a> {
    connection: &'a Connection,
    resource: String,
    method: Method,
    params: Params,
    item_type: Option<String>,
}

impl<'a> Batcher<'a> {
    pub fn new(connection: &'a Connection, resource: impl Into<String>) -> Self {
        Self {
            connection,
            resource: resource.into(),
            method: Method::Get,
            params: Params::new(),
            item_type: None,
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Extra parameters repeated on every sub-request.
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Type tag applied to returned entities.
    pub fn with_item_type(mut self, type_tag: impl Into<String>) -> Self {
        self.item_type = Some(type_tag.into());
        self
    }

    /// Look up all targets: split per kind into chunks of at most the
    /// profile's `max_batch_size`, dispatch concurrently, reassemble in
    /// input order. Per-target failure shows in the slot, not as an `Err`.
    pub async fn lookup(&self, targets: Vec<Target>) -> Result<BatchOutcome> {
        let mut slots: Vec<Option<BatchSlot>> = (0..targets.len()).map(|_| None).collect();

        if targets.is_empty() {
            return Ok(self.outcome(targets, slots));
        }

        let profile = self.connection.profile();
        let batch_size = profile.max_batch_size.max(1);

        let mut ids: Vec<usize> = Vec::new();
        let mut names: Vec<usize> = Vec::new();
        for (index, target) in targets.iter().enumerate() {
            match target {
                Target::Id(_) => ids.push(index),
                Target::Name(_) => names.push(index),
            }
        }

        let mut requests = Vec::new();
        let mut groups: Vec<(TargetKind, Vec<usize>)> = Vec::new();
        for (kind, entries, param) in [
            (TargetKind::Id, &ids, &profile.batch_id_param),
            (TargetKind::Name, &names, &profile.batch_name_param),
        ] {
            for chunk in entries.chunks(batch_size) {
                let joined = chunk
                    .iter()
                    .map(|index| targets[*index].request_value())
                    .collect::<Vec<_>>()
                    .join(",");
                let mut params = self.params.clone();
                params.insert(param.clone(), joined);
                requests.push(ApiRequest {
                    method: self.method,
                    resource: self.resource.clone(),
                    params,
                });
                groups.push((kind, chunk.to_vec()));
            }
        }
        debug!(
            targets = targets.len(),
            sub_requests = requests.len(),
            "dispatching batched lookup"
        );

        let results = self.connection.multi(&requests).await?;

        for ((result, request), (kind, indexes)) in
            results.into_iter().zip(&requests).zip(&groups)
        {
            match result {
                Err(error) => fail_slots(&mut slots, indexes, error),
                Ok(raw) => {
                    let converted = self.connection.convert_response(
                        &request.resource,
                        request.params.clone(),
                        raw,
                        self.item_type.as_deref(),
                    );
                    match entities_from(converted) {
                        Some(pool) => self.assign(*kind, indexes, &targets, pool, &mut slots),
                        None => {
                            let error = Error::Api(ApiFailure {
                                message: format!(
                                    "batch endpoint {} answered with an unexpected shape",
                                    request.resource
                                ),
                                code: None,
                            });
                            fail_slots(&mut slots, indexes, error);
                        }
                    }
                }
            }
        }

        Ok(self.outcome(targets, slots))
    }

    /// Match one sub-request's entities back to its targets. Identifier
    /// match first; when the response carries no usable identifiers at all
    /// and the counts line up, fall back to positional order. Unmatched
    /// targets are Missing.
    fn assign(
        &self,
        kind: TargetKind,
        indexes: &[usize],
        targets: &[Target],
        mut pool: Vec<Entity>,
        slots: &mut [Option<BatchSlot>],
    ) {
        let name_field = &self.connection.profile().batch_name_param;
        let mut assigned: Vec<Option<Entity>> = (0..indexes.len()).map(|_| None).collect();

        for (position, index) in indexes.iter().enumerate() {
            let wanted = targets[*index].request_value();
            let hit = pool.iter().position(|entity| match kind {
                TargetKind::Id => entity.id().as_deref() == Some(wanted.as_str()),
                TargetKind::Name => entity
                    .property(name_field)
                    .and_then(Value::as_str)
                    .map(|name| name.eq_ignore_ascii_case(&wanted))
                    .unwrap_or(false),
            });
            if let Some(at) = hit {
                assigned[position] = Some(pool.remove(at));
            }
        }

        if assigned.iter().all(Option::is_none) && pool.len() == indexes.len() {
            for (slot, entity) in assigned.iter_mut().zip(pool.drain(..)) {
                *slot = Some(entity);
            }
        }

        for (index, entity) in indexes.iter().zip(assigned) {
            slots[*index] = Some(match entity {
                Some(entity) => BatchSlot::Found(entity),
                None => BatchSlot::Missing,
            });
        }
    }

    fn outcome(&self, targets: Vec<Target>, slots: Vec<Option<BatchSlot>>) -> BatchOutcome {
        let slots = targets
            .into_iter()
            .zip(slots)
            .map(|(target, slot)| (target, slot.unwrap_or(BatchSlot::Missing)))
            .collect();
        BatchOutcome {
            slots,
            item_type: self.item_type.clone(),
            connection: self.connection.clone(),
        }
    }
}

fn fail_slots(slots: &mut [Option<BatchSlot>], indexes: &[usize], error: Error) {
    let shared = Arc::new(error);
    for index in indexes {
        slots[*index] = Some(BatchSlot::Failed(Arc::clone(&shared)));
    }
}

/// Entities out of one converted sub-request response. Providers answer
/// batch lookups with a bare array, a page, or a single object.
fn entities_from(value: Value) -> Option<Vec<Entity>> {
    match value {
        Value::Collection(collection) => Some(collection.into_items()),
        Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Entity(entity) => Some(entity),
                    _ => None,
                })
                .collect(),
        ),
        Value::Entity(entity) => Some(vec![entity]),
        _ => None,
    }
}
