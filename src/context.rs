//! Process-wide CRM context.
//!
//! [`CrmContext`] is built once at startup and handed to whatever needs
//! the collections. It owns the HTTP client, the shared response cache
//! and its sweeper task, and one [`CollectionStore`] per entity kind. All
//! stores share one cache, so a write through any store invalidates the
//! cached reads of dependent kinds.
//!
//! Generic code reaches a kind's store through [`StoreFor`]:
//!
//! ```ignore
//! async fn count<E: Entity>(ctx: &CrmContext) -> CrmResult<usize>
//! where
//!     CrmContext: StoreFor<E>,
//! {
//!     let store = ctx.store();
//!     store.fetch_all(&ListQuery::all()).await?;
//!     Ok(store.len())
//! }
//! ```

use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::api::HttpClient;
use crate::cache::ResponseCache;
use crate::cached::CachedClient;
use crate::config::Config;
use crate::error::CrmResult;
use crate::models::{Contact, Customer, Deal, Entity, Note, Task, User};
use crate::notify::Notifier;
use crate::session::Session;
use crate::store::{CollectionStore, RefetchPolicy};

/// Client stack used by every store: HTTP behind the shared cache.
pub type EntityClient<E> = CachedClient<E, HttpClient>;

/// Store type held by the context for kind `E`.
pub type EntityStore<E> = CollectionStore<E, EntityClient<E>>;

pub struct CrmContext {
    config: Config,
    http: Arc<HttpClient>,
    cache: ResponseCache<Value>,
    sweeper: Option<JoinHandle<()>>,
    customers: EntityStore<Customer>,
    deals: EntityStore<Deal>,
    tasks: EntityStore<Task>,
    contacts: EntityStore<Contact>,
    notes: EntityStore<Note>,
    users: EntityStore<User>,
}

fn build_store<E: Entity>(
    config: &Config,
    http: &Arc<HttpClient>,
    cache: &ResponseCache<Value>,
    notifier: &Arc<dyn Notifier>,
) -> EntityStore<E> {
    let client = CachedClient::new(Arc::clone(http), cache.clone(), config.cache.enabled);
    CollectionStore::new(client, Arc::clone(notifier))
        .with_policy(RefetchPolicy::for_kind::<E>(&config.refetch))
}

impl CrmContext {
    /// Builds the context. When called inside a tokio runtime the cache
    /// sweeper is started; it stops when the context is dropped.
    pub fn new(config: Config, notifier: Arc<dyn Notifier>) -> CrmResult<Self> {
        let http = Arc::new(HttpClient::new(&config.api)?);
        let cache: ResponseCache<Value> = ResponseCache::new(config.cache.default_ttl());

        let sweeper = match tokio::runtime::Handle::try_current() {
            Ok(_) if config.cache.enabled => {
                Some(cache.spawn_sweeper(config.cache.sweep_interval()))
            }
            _ => None,
        };

        Ok(Self {
            customers: build_store(&config, &http, &cache, &notifier),
            deals: build_store(&config, &http, &cache, &notifier),
            tasks: build_store(&config, &http, &cache, &notifier),
            contacts: build_store(&config, &http, &cache, &notifier),
            notes: build_store(&config, &http, &cache, &notifier),
            users: build_store(&config, &http, &cache, &notifier),
            config,
            http,
            cache,
            sweeper,
        })
    }

    /// Signs requests with the session's token.
    pub fn with_session(self, session: &Session) -> Self {
        self.http.set_token(Some(session.token.clone()));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub fn cache(&self) -> &ResponseCache<Value> {
        &self.cache
    }

    pub fn customers(&self) -> &EntityStore<Customer> {
        &self.customers
    }

    pub fn deals(&self) -> &EntityStore<Deal> {
        &self.deals
    }

    pub fn tasks(&self) -> &EntityStore<Task> {
        &self.tasks
    }

    pub fn contacts(&self) -> &EntityStore<Contact> {
        &self.contacts
    }

    pub fn notes(&self) -> &EntityStore<Note> {
        &self.notes
    }

    pub fn users(&self) -> &EntityStore<User> {
        &self.users
    }

    /// Drops the token, every cached response and every loaded collection.
    pub fn logout(&self) {
        self.http.set_token(None);
        self.cache.clear();
        self.customers.reset();
        self.deals.reset();
        self.tasks.reset();
        self.contacts.reset();
        self.notes.reset();
        self.users.reset();
        debug!("context cleared on logout");
    }
}

impl Drop for CrmContext {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.take() {
            handle.abort();
        }
    }
}

/// Typed access to the store of kind `E`.
pub trait StoreFor<E: Entity> {
    fn store(&self) -> &EntityStore<E>;
}

macro_rules! store_for {
    ($ty:ty, $field:ident) => {
        impl StoreFor<$ty> for CrmContext {
            fn store(&self) -> &EntityStore<$ty> {
                &self.$field
            }
        }
    };
}

store_for!(Customer, customers);
store_for!(Deal, deals);
store_for!(Task, tasks);
store_for!(Contact, contacts);
store_for!(Note, notes);
store_for!(User, users);
