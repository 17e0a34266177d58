//! Caching decorator for [`RemoteEntityClient`].
//!
//! Reads go through the shared [`ResponseCache`] keyed by
//! `"{kind}:{query}"` (or `"{kind}:id={id}"` for single records), so
//! concurrent identical reads issue one request. Successful writes
//! invalidate every cached read of the written kind plus the kinds that
//! embed references to it ([`EntityKind::dependents`]).
//!
//! The cache stores raw `serde_json::Value`s so one cache instance can be
//! shared by all kinds.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::api::{ListQuery, RemoteEntityClient};
use crate::cache::ResponseCache;
use crate::error::{CrmError, CrmResult};
use crate::models::{Entity, EntityId, EntityKind};

pub struct CachedClient<E, C> {
    inner: Arc<C>,
    cache: ResponseCache<Value>,
    enabled: bool,
    _kind: PhantomData<fn() -> E>,
}

impl<E, C> CachedClient<E, C>
where
    E: Entity,
    C: RemoteEntityClient<E> + 'static,
{
    pub fn new(inner: Arc<C>, cache: ResponseCache<Value>, enabled: bool) -> Self {
        Self {
            inner,
            cache,
            enabled,
            _kind: PhantomData,
        }
    }

    pub fn cache(&self) -> &ResponseCache<Value> {
        &self.cache
    }

    fn list_key(query: &ListQuery) -> String {
        format!("{}:{}", E::KIND, query.key())
    }

    fn item_key(id: &EntityId) -> String {
        format!("{}:id={}", E::KIND, id)
    }

    /// Drops cached reads of this kind and of every dependent kind.
    fn invalidate_after_write(&self) {
        let mut removed = invalidate_kind(&self.cache, E::KIND);
        for dependent in E::KIND.dependents() {
            removed += invalidate_kind(&self.cache, *dependent);
        }
        debug!(kind = %E::KIND, removed, "cache invalidated after write");
    }
}

fn invalidate_kind(cache: &ResponseCache<Value>, kind: EntityKind) -> usize {
    cache.invalidate_pattern(&format!("{}:", kind))
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> CrmResult<T> {
    serde_json::from_value(value).map_err(CrmError::from)
}

#[async_trait]
impl<E, C> RemoteEntityClient<E> for CachedClient<E, C>
where
    E: Entity,
    C: RemoteEntityClient<E> + 'static,
{
    async fn list_all(&self, query: &ListQuery) -> CrmResult<Vec<E>> {
        if !self.enabled {
            return self.inner.list_all(query).await;
        }
        let inner = Arc::clone(&self.inner);
        let owned = query.clone();
        let value = self
            .cache
            .get_cached_response(
                &Self::list_key(query),
                move || async move {
                    let items: Vec<E> = inner.list_all(&owned).await?;
                    serde_json::to_value(items).map_err(CrmError::from)
                },
                None,
            )
            .await?;
        decode(value)
    }

    async fn get_by_id(&self, id: &EntityId) -> CrmResult<E> {
        if !self.enabled {
            return self.inner.get_by_id(id).await;
        }
        let inner = Arc::clone(&self.inner);
        let owned = id.clone();
        let value = self
            .cache
            .get_cached_response(
                &Self::item_key(id),
                move || async move {
                    let item: E = inner.get_by_id(&owned).await?;
                    serde_json::to_value(item).map_err(CrmError::from)
                },
                None,
            )
            .await?;
        decode(value)
    }

    async fn create(&self, draft: &E) -> CrmResult<E> {
        let created = self.inner.create(draft).await?;
        self.invalidate_after_write();
        Ok(created)
    }

    async fn update(&self, id: &EntityId, draft: &E) -> CrmResult<E> {
        let updated = self.inner.update(id, draft).await?;
        self.invalidate_after_write();
        Ok(updated)
    }

    async fn delete(&self, id: &EntityId) -> CrmResult<()> {
        RemoteEntityClient::<E>::delete(&*self.inner, id).await?;
        self.invalidate_after_write();
        Ok(())
    }
}
