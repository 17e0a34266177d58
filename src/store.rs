//! Per-kind entity collection store.
//!
//! A [`CollectionStore`] owns the local copy of one kind's collection and
//! keeps it consistent with the server's responses. It never changes the
//! collection optimistically: every mutation waits for the server and then
//! applies the server's answer.
//!
//! # States
//!
//! ```text
//! Idle ──▶ Loading ──▶ Ready
//!             ▲   └──▶ Error
//!             └──────────┘  (any fetch or mutation)
//! ```
//!
//! # Sequencing
//!
//! Each `fetch_all` takes a ticket from a monotonically increasing
//! counter. When a response lands and its ticket is no longer the latest
//! issued, it is discarded without touching items, status or error. Under
//! rapid re-fetching the collection therefore reflects the most recent
//! request, not whichever response arrived last.
//!
//! Mutations are not serialized against each other or against fetches.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tracing::{debug, warn};

use crate::api::{ListQuery, Lookup, RemoteEntityClient};
use crate::config::RefetchConfig;
use crate::error::{CrmError, CrmResult};
use crate::filter::{self, FilterSpec};
use crate::models::{Entity, EntityId};
use crate::notify::{Notification, Notifier, SilentNotifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    Idle,
    Loading,
    Ready,
    Error,
}

struct StoreState<E> {
    items: Vec<E>,
    status: LoadState,
    last_error: Option<CrmError>,
    /// Query of the most recent fetch; reused by policy refetches.
    query: ListQuery,
}

/// Which mutations force a full reload instead of applying the response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefetchPolicy {
    pub after_update: bool,
    pub after_delete: bool,
}

impl RefetchPolicy {
    pub fn for_kind<E: Entity>(config: &RefetchConfig) -> Self {
        Self {
            after_update: config.refetch_after_update(E::KIND),
            after_delete: config.refetch_after_delete(E::KIND),
        }
    }
}

pub struct CollectionStore<E, C> {
    client: C,
    state: RwLock<StoreState<E>>,
    seq: AtomicU64,
    notifier: Arc<dyn Notifier>,
    policy: RefetchPolicy,
}

impl<E, C> CollectionStore<E, C>
where
    E: Entity,
    C: RemoteEntityClient<E>,
{
    pub fn new(client: C, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            client,
            state: RwLock::new(StoreState {
                items: Vec::new(),
                status: LoadState::Idle,
                last_error: None,
                query: ListQuery::all(),
            }),
            seq: AtomicU64::new(0),
            notifier,
            policy: RefetchPolicy::default(),
        }
    }

    /// A store that reports nothing; for embedding and tests.
    pub fn silent(client: C) -> Self {
        Self::new(client, Arc::new(SilentNotifier))
    }

    pub fn with_policy(mut self, policy: RefetchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState<E>> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState<E>> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    // ============ Accessors ============

    pub fn items(&self) -> Vec<E> {
        self.read().items.clone()
    }

    pub fn len(&self) -> usize {
        self.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn status(&self) -> LoadState {
        self.read().status
    }

    pub fn is_loading(&self) -> bool {
        self.status() == LoadState::Loading
    }

    pub fn last_error(&self) -> Option<CrmError> {
        self.read().last_error.clone()
    }

    pub fn find(&self, id: &EntityId) -> Option<E> {
        self.read().items.iter().find(|e| e.has_id(id)).cloned()
    }

    /// The collection as displayed under `spec`.
    pub fn view(&self, spec: &FilterSpec) -> Vec<E> {
        filter::apply(&self.read().items, spec)
    }

    // ============ Reads ============

    /// Loads the collection. On success the collection is replaced and the
    /// error cleared; on failure the error is recorded and the previous
    /// collection kept. A response overtaken by a newer `fetch_all` is
    /// dropped.
    pub async fn fetch_all(&self, query: &ListQuery) -> CrmResult<()> {
        let ticket = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.write();
            state.status = LoadState::Loading;
            state.query = query.clone();
        }

        let result = self.client.list_all(query).await;

        let mut state = self.write();
        if self.seq.load(Ordering::SeqCst) != ticket {
            debug!(kind = %E::KIND, ticket, "discarding superseded list response");
            return result.map(|_| ());
        }
        match result {
            Ok(items) => {
                debug!(kind = %E::KIND, count = items.len(), "collection loaded");
                state.items = items;
                state.status = LoadState::Ready;
                state.last_error = None;
                Ok(())
            }
            Err(e) => {
                warn!(kind = %E::KIND, error = %e, "collection load failed");
                state.status = LoadState::Error;
                state.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Replaces the collection with a server-side subset (by name, city,
    /// owner, ...). Same semantics as [`fetch_all`](Self::fetch_all).
    pub async fn replace_with(&self, lookup: Lookup) -> CrmResult<()> {
        self.fetch_all(&ListQuery::lookup(lookup)).await
    }

    /// Repeats the most recent fetch.
    pub async fn refresh(&self) -> CrmResult<()> {
        let query = self.read().query.clone();
        self.fetch_all(&query).await
    }

    /// Empties the collection and returns to `Idle`. Fetches still in
    /// flight are discarded when they land.
    pub fn reset(&self) {
        self.seq.fetch_add(1, Ordering::SeqCst);
        let mut state = self.write();
        state.items.clear();
        state.status = LoadState::Idle;
        state.last_error = None;
        state.query = ListQuery::all();
    }

    /// Reads one record without touching the collection. Failures are
    /// recorded and notified.
    pub async fn fetch_one(&self, id: &EntityId) -> CrmResult<E> {
        let result = match id.validate() {
            Ok(()) => self.client.get_by_id(id).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(entity) => Ok(entity),
            Err(e) => {
                self.write().last_error = Some(e.clone());
                self.notify_failure("load", &e);
                Err(e)
            }
        }
    }

    // ============ Mutations ============

    /// Persists `draft` and appends the server's entity to the collection.
    /// An entity whose identifier is already present replaces that element
    /// instead, so identifiers stay unique.
    pub async fn create(&self, draft: &E) -> CrmResult<E> {
        if let Err(e) = draft.validate_draft() {
            return Err(self.fail("create", e));
        }
        self.begin();
        let result = match self.client.create(draft).await {
            Ok(created) if created.id().is_none() => Err(CrmError::Decode(format!(
                "created {} has no id",
                E::KIND.label().to_lowercase()
            ))),
            other => other,
        };
        match result {
            Ok(created) => {
                {
                    let mut state = self.write();
                    match position(&state.items, created.id()) {
                        Some(i) => state.items[i] = created.clone(),
                        None => state.items.push(created.clone()),
                    }
                    state.status = LoadState::Ready;
                    state.last_error = None;
                }
                self.notify_success("created");
                Ok(created)
            }
            Err(e) => Err(self.fail("create", e)),
        }
    }

    /// Persists changes to `id`. The matching element is replaced in place;
    /// an `id` absent from the collection adds nothing. Kinds whose policy
    /// says so reload the whole collection instead.
    pub async fn update(&self, id: &EntityId, draft: &E) -> CrmResult<E> {
        if let Err(e) = id.validate() {
            return Err(self.fail("update", e));
        }
        let mut draft = draft.clone();
        draft.normalize_draft();
        if let Err(e) = draft.validate_draft() {
            return Err(self.fail("update", e));
        }

        self.begin();
        let updated = match self.client.update(id, &draft).await {
            Ok(updated) => updated,
            Err(e) => return Err(self.fail("update", e)),
        };

        if self.policy.after_update {
            self.settle_ready();
            self.notify_success("updated");
            let _ = self.refresh().await;
            return Ok(updated);
        }

        {
            let mut state = self.write();
            if let Some(i) = position(&state.items, Some(id)) {
                state.items[i] = updated.clone();
            }
            state.status = LoadState::Ready;
            state.last_error = None;
        }
        self.notify_success("updated");
        Ok(updated)
    }

    /// Deletes `id` and removes it from the collection.
    pub async fn delete(&self, id: &EntityId) -> CrmResult<()> {
        if let Err(e) = id.validate() {
            return Err(self.fail("delete", e));
        }
        self.begin();
        if let Err(e) = RemoteEntityClient::<E>::delete(&self.client, id).await {
            return Err(self.fail("delete", e));
        }
        {
            let mut state = self.write();
            state.items.retain(|e| !e.has_id(id));
            state.status = LoadState::Ready;
            state.last_error = None;
        }
        self.notify_success("deleted");
        if self.policy.after_delete {
            let _ = self.refresh().await;
        }
        Ok(())
    }

    fn begin(&self) {
        self.write().status = LoadState::Loading;
    }

    fn settle_ready(&self) {
        let mut state = self.write();
        state.status = LoadState::Ready;
        state.last_error = None;
    }

    /// Records a mutation failure, notifies, and hands the error back for
    /// the caller.
    fn fail(&self, verb: &str, error: CrmError) -> CrmError {
        warn!(kind = %E::KIND, verb, error = %error, "mutation failed");
        {
            let mut state = self.write();
            state.status = LoadState::Error;
            state.last_error = Some(error.clone());
        }
        self.notify_failure(verb, &error);
        error
    }

    fn notify_success(&self, past: &str) {
        self.notifier.notify(Notification::success(
            E::KIND,
            format!("{} {} successfully", E::KIND.label(), past),
        ));
    }

    fn notify_failure(&self, verb: &str, error: &CrmError) {
        self.notifier.notify(Notification::error(
            E::KIND,
            format!(
                "Failed to {} {}: {}",
                verb,
                E::KIND.label().to_lowercase(),
                error.user_message()
            ),
        ));
    }
}

fn position<E: Entity>(items: &[E], id: Option<&EntityId>) -> Option<usize> {
    let id = id?;
    items.iter().position(|e| e.has_id(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryClient;
    use crate::models::{Customer, Task};
    use crate::notify::{Level, MemoryNotifier};
    use async_trait::async_trait;
    use std::time::Duration;

    fn customer(id: i64, name: &str) -> Customer {
        Customer {
            id: Some(EntityId::Int(id)),
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn acme_beta() -> Vec<Customer> {
        vec![customer(1, "Acme"), customer(2, "Beta")]
    }

    type MemStore<E> = CollectionStore<E, Arc<InMemoryClient<E>>>;

    async fn loaded(
        items: Vec<Customer>,
    ) -> (MemStore<Customer>, Arc<InMemoryClient<Customer>>, Arc<MemoryNotifier>) {
        let backend = Arc::new(InMemoryClient::with_items(items));
        let notes = Arc::new(MemoryNotifier::new());
        let store = CollectionStore::new(backend.clone(), notes.clone());
        store.fetch_all(&ListQuery::all()).await.unwrap();
        (store, backend, notes)
    }

    #[tokio::test]
    async fn test_starts_idle() {
        let store: MemStore<Customer> = CollectionStore::silent(Arc::new(InMemoryClient::new()));
        assert_eq!(store.status(), LoadState::Idle);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_all_loads_collection() {
        let (store, _, _) = loaded(acme_beta()).await;
        assert_eq!(store.items(), acme_beta());
        assert_eq!(store.status(), LoadState::Ready);
        assert!(store.last_error().is_none());
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_stale_collection() {
        let (store, backend, _) = loaded(acme_beta()).await;
        backend.fail_next(CrmError::Network("connection refused".to_string()));
        let err = store.fetch_all(&ListQuery::all()).await.unwrap_err();
        assert!(err.is_remote());
        assert_eq!(store.items(), acme_beta());
        assert_eq!(store.status(), LoadState::Error);
        assert_eq!(store.last_error(), Some(err));
        assert!(!store.is_loading());

        store.refresh().await.unwrap();
        assert_eq!(store.status(), LoadState::Ready);
        assert!(store.last_error().is_none());
    }

    #[tokio::test]
    async fn test_create_appends_server_entity() {
        let (store, _, notes) = loaded(acme_beta()).await;
        let draft = Customer {
            name: "Gamma".to_string(),
            ..Default::default()
        };
        let created = store.create(&draft).await.unwrap();
        assert_eq!(created.id, Some(EntityId::Int(3)));
        assert_eq!(store.len(), 3);
        assert!(store.items().contains(&created));

        let seen = notes.take();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].level, Level::Success);
        assert_eq!(seen[0].message, "Customer created successfully");
    }

    #[tokio::test]
    async fn test_create_failure_leaves_collection_and_rethrows() {
        let (store, backend, notes) = loaded(acme_beta()).await;
        backend.fail_next(CrmError::Transport {
            status: 400,
            message: "Email already exists".to_string(),
        });
        let draft = Customer {
            name: "Gamma".to_string(),
            ..Default::default()
        };
        let err = store.create(&draft).await.unwrap_err();
        assert!(matches!(err, CrmError::Transport { status: 400, .. }));
        assert_eq!(store.items(), acme_beta());
        let seen = notes.take();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].level, Level::Error);
        assert_eq!(
            seen[0].message,
            "Failed to create customer: API Error: 400 - Email already exists"
        );
    }

    #[tokio::test]
    async fn test_update_replaces_in_place() {
        let (store, _, _) = loaded(acme_beta()).await;
        let updated = store
            .update(&EntityId::Int(1), &customer(1, "Acme Corp"))
            .await
            .unwrap();
        assert_eq!(updated.name, "Acme Corp");
        let names: Vec<String> = store.items().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Acme Corp", "Beta"]);
    }

    /// Server accepts updates for ids the local collection never loaded.
    struct AcceptingClient;

    #[async_trait]
    impl RemoteEntityClient<Customer> for AcceptingClient {
        async fn list_all(&self, _query: &ListQuery) -> CrmResult<Vec<Customer>> {
            Ok(acme_beta())
        }
        async fn get_by_id(&self, id: &EntityId) -> CrmResult<Customer> {
            Err(CrmError::NotFound(id.to_string()))
        }
        async fn create(&self, draft: &Customer) -> CrmResult<Customer> {
            Ok(draft.clone())
        }
        async fn update(&self, id: &EntityId, draft: &Customer) -> CrmResult<Customer> {
            let mut out = draft.clone();
            out.id = Some(id.clone());
            Ok(out)
        }
        async fn delete(&self, _id: &EntityId) -> CrmResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_update_unknown_id_adds_nothing() {
        let store = CollectionStore::silent(AcceptingClient);
        store.fetch_all(&ListQuery::all()).await.unwrap();
        store
            .update(&EntityId::Int(99), &customer(99, "Ghost"))
            .await
            .unwrap();
        assert_eq!(store.items(), acme_beta());
    }

    #[tokio::test]
    async fn test_create_with_existing_id_replaces() {
        let store = CollectionStore::silent(AcceptingClient);
        store.fetch_all(&ListQuery::all()).await.unwrap();
        store.create(&customer(2, "Beta Two")).await.unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.find(&EntityId::Int(2)).unwrap().name, "Beta Two");
    }

    #[tokio::test]
    async fn test_create_without_id_is_decode_error() {
        let store = CollectionStore::silent(AcceptingClient);
        let draft = Customer {
            name: "Gamma".to_string(),
            ..Default::default()
        };
        let err = store.create(&draft).await.unwrap_err();
        assert!(matches!(err, CrmError::Decode(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_entity() {
        let (store, _, notes) = loaded(acme_beta()).await;
        store.delete(&EntityId::Int(2)).await.unwrap();
        assert_eq!(store.items(), vec![customer(1, "Acme")]);
        assert_eq!(notes.take()[0].message, "Customer deleted successfully");
    }

    #[tokio::test]
    async fn test_invalid_id_never_reaches_backend() {
        let (store, backend, notes) = loaded(acme_beta()).await;
        let err = store.delete(&EntityId::from("null")).await.unwrap_err();
        assert!(matches!(err, CrmError::Validation { .. }));
        assert_eq!(backend.snapshot().len(), 2);
        assert_eq!(notes.take()[0].level, Level::Error);
    }

    #[tokio::test]
    async fn test_invalid_draft_never_reaches_backend() {
        let (store, backend, notes) = loaded(acme_beta()).await;
        let err = store.create(&Customer::default()).await.unwrap_err();
        assert_eq!(err, CrmError::validation("name", "Name is required"));
        assert_eq!(store.status(), LoadState::Error);
        assert_eq!(
            notes.take()[0].message,
            "Failed to create customer: Invalid name: Name is required"
        );

        let bad_email = Customer {
            name: "Acme".to_string(),
            email: Some("ops@acme".to_string()),
            ..Default::default()
        };
        let err = store.update(&EntityId::Int(1), &bad_email).await.unwrap_err();
        assert!(matches!(err, CrmError::Validation { ref field, .. } if field == "email"));

        assert_eq!(backend.snapshot(), acme_beta());
        assert_eq!(store.items(), acme_beta());
        // No id was consumed by the rejected create.
        let created = store.create(&customer(0, "Gamma")).await.unwrap();
        assert_eq!(created.id, Some(EntityId::Int(3)));
    }

    #[tokio::test]
    async fn test_delete_refetch_policy_reloads_collection() {
        let backend = Arc::new(InMemoryClient::with_items(acme_beta()));
        let store: MemStore<Customer> = CollectionStore::silent(backend.clone()).with_policy(
            RefetchPolicy::for_kind::<Customer>(&RefetchConfig::default()),
        );
        store.fetch_all(&ListQuery::all()).await.unwrap();
        assert_eq!(backend.list_calls(), 1);

        // Written by another client after the initial load.
        let gamma = Customer {
            name: "Gamma".to_string(),
            ..Default::default()
        };
        RemoteEntityClient::<Customer>::create(&*backend, &gamma)
            .await
            .unwrap();

        store.delete(&EntityId::Int(2)).await.unwrap();
        assert_eq!(backend.list_calls(), 2);
        assert_eq!(store.items(), backend.snapshot());
        assert_eq!(store.len(), 2);
        assert_eq!(store.status(), LoadState::Ready);
    }

    #[tokio::test]
    async fn test_delete_matches_string_ids() {
        let items = vec![
            Customer {
                id: Some(EntityId::Str("1".to_string())),
                name: "Acme".to_string(),
                ..Default::default()
            },
            Customer {
                id: Some(EntityId::Str("2".to_string())),
                name: "Beta".to_string(),
                ..Default::default()
            },
        ];
        let (store, backend, _) = loaded(items).await;
        let id: EntityId = "2".parse().unwrap();
        assert_eq!(id, EntityId::Int(2));

        assert_eq!(store.find(&id).unwrap().name, "Beta");
        store.delete(&id).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(backend.snapshot().len(), 1);

        let renamed = Customer {
            name: "Acme Corp".to_string(),
            ..Default::default()
        };
        store.update(&EntityId::Int(1), &renamed).await.unwrap();
        assert_eq!(store.items()[0].name, "Acme Corp");
    }

    #[tokio::test]
    async fn test_update_refetch_policy_reloads_collection() {
        let backend = Arc::new(InMemoryClient::with_items(vec![Task {
            id: Some(EntityId::Int(1)),
            description: "Call Acme".to_string(),
            ..Default::default()
        }]));
        let store: MemStore<Task> = CollectionStore::silent(backend.clone()).with_policy(
            RefetchPolicy::for_kind::<Task>(&RefetchConfig::default()),
        );
        store.fetch_all(&ListQuery::all()).await.unwrap();
        assert_eq!(backend.list_calls(), 1);

        let draft = Task {
            description: "Call Acme again".to_string(),
            ..Default::default()
        };
        let updated = store.update(&EntityId::Int(1), &draft).await.unwrap();
        assert_eq!(updated.status.as_deref(), Some("Pending"));
        assert_eq!(updated.priority.as_deref(), Some("Medium"));
        assert_eq!(backend.list_calls(), 2);
        assert_eq!(store.items()[0].description, "Call Acme again");
    }

    #[tokio::test]
    async fn test_fetch_one_does_not_touch_collection() {
        let (store, _, notes) = loaded(acme_beta()).await;
        let one = store.fetch_one(&EntityId::Int(2)).await.unwrap();
        assert_eq!(one.name, "Beta");
        assert!(store.fetch_one(&EntityId::Int(7)).await.is_err());
        assert_eq!(store.items(), acme_beta());
        assert_eq!(notes.take().len(), 1);
        assert!(store.last_error().is_some());
    }

    #[tokio::test]
    async fn test_replace_with_lookup() {
        let mut acme = customer(1, "Acme");
        acme.city = Some("Pune".to_string());
        let (store, _, _) = loaded(vec![acme.clone(), customer(2, "Beta")]).await;
        store
            .replace_with(Lookup::City("Pune".to_string()))
            .await
            .unwrap();
        assert_eq!(store.items(), vec![acme]);
    }

    #[tokio::test]
    async fn test_view_applies_filter_spec() {
        let (store, _, _) = loaded(acme_beta()).await;
        let view = store.view(&FilterSpec::new().contains("name", "be"));
        assert_eq!(view, vec![customer(2, "Beta")]);
        assert_eq!(store.len(), 2);
    }

    /// Answers list calls after a per-query delay; the query's `delay`
    /// param is in milliseconds and `name` becomes the single result.
    struct SlowClient;

    #[async_trait]
    impl RemoteEntityClient<Customer> for SlowClient {
        async fn list_all(&self, query: &ListQuery) -> CrmResult<Vec<Customer>> {
            let ms: u64 = query.params["delay"].parse().unwrap();
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(vec![customer(1, &query.params["name"])])
        }
        async fn get_by_id(&self, id: &EntityId) -> CrmResult<Customer> {
            Err(CrmError::NotFound(id.to_string()))
        }
        async fn create(&self, draft: &Customer) -> CrmResult<Customer> {
            Ok(draft.clone())
        }
        async fn update(&self, _id: &EntityId, draft: &Customer) -> CrmResult<Customer> {
            Ok(draft.clone())
        }
        async fn delete(&self, _id: &EntityId) -> CrmResult<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_fetch_response_is_discarded() {
        let store = CollectionStore::silent(SlowClient);
        let slow = ListQuery::all().param("delay", "200").param("name", "old");
        let fast = ListQuery::all().param("delay", "10").param("name", "new");

        let (a, b) = tokio::join!(store.fetch_all(&slow), async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            store.fetch_all(&fast).await
        });
        a.unwrap();
        b.unwrap();
        assert_eq!(store.items()[0].name, "new");
        assert_eq!(store.status(), LoadState::Ready);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn block_on<F: std::future::Future>(future: F) -> F::Output {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap()
                .block_on(future)
        }

        fn numbered(names: &[String]) -> Vec<Customer> {
            names
                .iter()
                .enumerate()
                .map(|(i, name)| customer(i as i64 + 1, name))
                .collect()
        }

        fn arb_names(min: usize) -> impl Strategy<Value = Vec<String>> {
            prop::collection::vec("[A-Za-z]{1,8}", min..8)
        }

        proptest! {
            #[test]
            fn test_create_adds_exactly_one(names in arb_names(0), name in "[A-Za-z]{1,8}") {
                let (before, after) = block_on(async {
                    let (store, _, _) = loaded(numbered(&names)).await;
                    let before = store.items();
                    let draft = Customer { name: name.clone(), ..Default::default() };
                    store.create(&draft).await.unwrap();
                    (before, store.items())
                });
                prop_assert_eq!(after.len(), before.len() + 1);
                prop_assert_eq!(&after[..before.len()], &before[..]);
            }

            #[test]
            fn test_delete_removes_exactly_one(names in arb_names(1), pick in any::<prop::sample::Index>()) {
                let id = EntityId::Int(pick.index(names.len()) as i64 + 1);
                let (before, after) = block_on(async {
                    let (store, _, _) = loaded(numbered(&names)).await;
                    let before = store.items();
                    store.delete(&id).await.unwrap();
                    (before, store.items())
                });
                prop_assert_eq!(after.len(), before.len() - 1);
                prop_assert!(after.iter().all(|c| !c.has_id(&id)));
            }

            #[test]
            fn test_update_of_unloaded_id_adds_nothing(names in arb_names(0), name in "[A-Za-z]{1,8}") {
                let (before, after) = block_on(async {
                    let (store, backend, _) = loaded(numbered(&names)).await;
                    let before = store.items();
                    let unseen = Customer { name: "Unseen".to_string(), ..Default::default() };
                    let unseen = RemoteEntityClient::<Customer>::create(&*backend, &unseen)
                        .await
                        .unwrap();
                    let id = unseen.id.clone().unwrap();
                    let draft = Customer { name: name.clone(), ..Default::default() };
                    store.update(&id, &draft).await.unwrap();
                    (before, store.items())
                });
                prop_assert_eq!(after, before);
            }
        }
    }
}
