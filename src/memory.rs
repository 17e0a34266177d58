//! In-memory [`RemoteEntityClient`] for tests and offline embedding.
//!
//! Keeps one kind's records in a `Vec` behind `std::sync::RwLock`,
//! assigns sequential numeric identifiers on create and answers the
//! secondary lookups the backend serves. A failure can be queued with
//! [`InMemoryClient::fail_next`] to exercise error paths.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::api::{ListQuery, Lookup, RemoteEntityClient};
use crate::error::{CrmError, CrmResult};
use crate::models::{Entity, EntityId};

pub struct InMemoryClient<E> {
    items: RwLock<Vec<E>>,
    next_id: AtomicI64,
    fail_next: Mutex<Option<CrmError>>,
    list_calls: AtomicUsize,
}

impl<E: Entity> InMemoryClient<E> {
    pub fn new() -> Self {
        Self::with_items(Vec::new())
    }

    /// Seeds the backend. New identifiers continue after the largest
    /// numeric id present.
    pub fn with_items(items: Vec<E>) -> Self {
        let max = items
            .iter()
            .filter_map(|e| match e.id() {
                Some(EntityId::Int(n)) => Some(*n),
                _ => None,
            })
            .max()
            .unwrap_or(0);
        Self {
            items: RwLock::new(items),
            next_id: AtomicI64::new(max + 1),
            fail_next: Mutex::new(None),
            list_calls: AtomicUsize::new(0),
        }
    }

    /// The next call (of any operation) fails with `error`.
    pub fn fail_next(&self, error: CrmError) {
        *self.fail_next.lock().unwrap_or_else(|e| e.into_inner()) = Some(error);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Current server-side records.
    pub fn snapshot(&self) -> Vec<E> {
        self.read().clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<E>> {
        self.items.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<E>> {
        self.items.write().unwrap_or_else(|e| e.into_inner())
    }

    fn take_failure(&self) -> CrmResult<()> {
        match self
            .fail_next
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn not_found(id: &EntityId) -> CrmError {
        CrmError::Transport {
            status: 404,
            message: format!("{} not found with id: {}", E::KIND.label(), id),
        }
    }
}

impl<E: Entity> Default for InMemoryClient<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns `entity` with its `id` field replaced.
fn with_id<E: Entity>(entity: &E, id: &EntityId) -> CrmResult<E> {
    let mut value = serde_json::to_value(entity)?;
    if let serde_json::Value::Object(map) = &mut value {
        map.insert("id".to_string(), serde_json::to_value(id)?);
    }
    Ok(serde_json::from_value(value)?)
}

fn field_equals<E: Entity>(item: &E, field: &str, expected: &str) -> bool {
    item.field(field)
        .map(|v| v.as_text() == expected.to_lowercase())
        .unwrap_or(false)
}

fn matches_lookup<E: Entity>(item: &E, lookup: &Lookup) -> bool {
    match lookup {
        Lookup::Name(needle) => item
            .display_name()
            .to_lowercase()
            .contains(&needle.to_lowercase()),
        Lookup::City(v) => field_equals(item, "city", v),
        Lookup::State(v) => field_equals(item, "state", v),
        Lookup::Country(v) => field_equals(item, "country", v),
        Lookup::Owner(id) => item
            .field("userId")
            .map(|v| v.as_text() == id.to_string().to_lowercase())
            .unwrap_or(false),
        Lookup::Role(role) => item
            .field("roles")
            .map(|v| v.as_text().split(',').any(|r| r == role.to_lowercase()))
            .unwrap_or(false),
    }
}

#[async_trait]
impl<E: Entity> RemoteEntityClient<E> for InMemoryClient<E> {
    async fn list_all(&self, query: &ListQuery) -> CrmResult<Vec<E>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.take_failure()?;
        let items = self.read();
        Ok(match &query.lookup {
            Some(lookup) => items
                .iter()
                .filter(|e| matches_lookup(*e, lookup))
                .cloned()
                .collect(),
            None => items.clone(),
        })
    }

    async fn get_by_id(&self, id: &EntityId) -> CrmResult<E> {
        self.take_failure()?;
        id.validate()?;
        self.read()
            .iter()
            .find(|e| e.has_id(id))
            .cloned()
            .ok_or_else(|| Self::not_found(id))
    }

    async fn create(&self, draft: &E) -> CrmResult<E> {
        self.take_failure()?;
        let id = EntityId::Int(self.next_id.fetch_add(1, Ordering::SeqCst));
        let created = with_id(draft, &id)?;
        self.write().push(created.clone());
        Ok(created)
    }

    async fn update(&self, id: &EntityId, draft: &E) -> CrmResult<E> {
        self.take_failure()?;
        id.validate()?;
        let updated = with_id(draft, id)?;
        let mut items = self.write();
        match items.iter_mut().find(|e| e.has_id(id)) {
            Some(slot) => {
                *slot = updated.clone();
                Ok(updated)
            }
            None => Err(Self::not_found(id)),
        }
    }

    async fn delete(&self, id: &EntityId) -> CrmResult<()> {
        self.take_failure()?;
        id.validate()?;
        let mut items = self.write();
        let before = items.len();
        items.retain(|e| !e.has_id(id));
        if items.len() == before {
            return Err(Self::not_found(id));
        }
        Ok(())
    }
}
