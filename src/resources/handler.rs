//! `RawResourceHandler` trait and the `CachedResourceHandler` composition
//! point that wraps it with caching, deduplication, pagination, and
//! invalidation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::{CacheConfig, CacheStats, LruCache};
use crate::dedup::{DedupStats, RequestDeduplicator};
use crate::error::Error;
use crate::notify::{Event, EventKind, NotificationBus};
use crate::pagination::{PaginationEngine, PaginationMeta};

use super::envelope::{ResourceMeta, ResourceResponse};
use super::registry::ResourceRegistry;

/// The interface every vault resource handler implements. The registry
/// resolves a URI to one of these (plus extracted template params); the
/// handler is responsible for turning that into upstream calls and a
/// JSON-serializable value.
#[async_trait]
pub trait RawResourceHandler: Send + Sync {
    async fn handle_request(
        &self,
        uri: &str,
        params: &HashMap<String, String>,
    ) -> Result<serde_json::Value, Error>;
}

/// Combined cache + dedup stats, as exposed by `CachedResourceHandler::stats`.
#[derive(Debug, Clone, Copy)]
pub struct HandlerStats {
    pub cache: CacheStats,
    pub dedup: DedupStats,
}

/// Wraps the registry + raw handlers with the full read path: a
/// pagination-aware cache key, cache lookup, single-flight miss path, TTL
/// selection by longest prefix match, and subscription to invalidation
/// events.
pub struct CachedResourceHandler {
    registry: ResourceRegistry,
    cache: LruCache<ResourceResponse>,
    dedup: RequestDeduplicator<ResourceResponse, Error>,
    config: CacheConfig,
}

impl CachedResourceHandler {
    /// Builds the handler and subscribes it to `bus` for invalidation
    /// events. The returned `Arc` is what callers should hold — the
    /// subscription closures capture a clone of the cache handle, not the
    /// handler itself, so no cyclic `Arc` is needed.
    pub fn new(registry: ResourceRegistry, config: CacheConfig, bus: &NotificationBus) -> Arc<Self> {
        let handler = Arc::new(Self {
            registry,
            cache: LruCache::new(config.max_size),
            dedup: RequestDeduplicator::new(config.deduplication_ttl),
            config,
        });

        subscribe_invalidation(&handler, bus);
        handler
    }

    /// Executes a read for `uri`: derive the cache key, check the cache,
    /// and on miss run the (optionally deduplicated) raw handler.
    ///
    /// Takes `self: &Arc<Self>` because the dedupe closure must own a
    /// `'static` handle to call back into `populate` from inside the
    /// deduplicator's shared future.
    pub async fn execute(self: &Arc<Self>, uri: &str) -> Result<ResourceResponse, Arc<Error>> {
        let key = self.cache_key(uri);

        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached);
        }

        if !self.config.enable_deduplication {
            return self.populate(uri, &key).await.map_err(Arc::new);
        }

        let this = self.clone();
        let uri = uri.to_string();
        let key_for_produce = key.clone();
        self.dedup
            .dedupe(&key, move || async move { this.populate(&uri, &key_for_produce).await })
            .await
            .map(|arc| (*arc).clone())
    }

    /// Lists every registered static URI and template, for `resources/list`
    /// and `resources/templates/list`.
    pub fn list_resources(&self) -> Vec<String> {
        self.registry.list()
    }

    fn cache_key(&self, uri: &str) -> String {
        if self.config.pagination_optimization {
            PaginationEngine::canonical_key(uri)
        } else {
            uri.to_string()
        }
    }

    async fn populate(&self, uri: &str, key: &str) -> Result<ResourceResponse, Error> {
        // Re-check the cache: a concurrent dedupe waiter may have populated
        // it between our initial miss and now.
        if let Some(cached) = self.cache.get(key) {
            return Ok(cached);
        }

        let resolution = self
            .registry
            .resolve(uri)
            .ok_or_else(|| Error::from(crate::error::ValidationError::UnknownResource(uri.to_string())))?;

        let mut value = resolution
            .handler
            .handle_request(uri, &resolution.params)
            .await?;

        let pagination = extract_field::<PaginationMeta>(&mut value, "pagination");
        let meta = extract_field::<ResourceMeta>(&mut value, "_meta");

        let mut response = ResourceResponse::json(value);
        if let Some(pagination) = pagination {
            response = response.with_pagination(pagination);
        }
        if let Some(meta) = meta {
            response = response.with_meta(meta);
        }

        let ttl = self.config.ttl_for(uri);
        self.cache.set(key.to_string(), response.clone(), Some(ttl));
        Ok(response)
    }

    pub async fn stats(&self) -> HandlerStats {
        HandlerStats {
            cache: self.cache.stats(),
            dedup: self.dedup.stats().await,
        }
    }

    fn invalidate_for_event(&self, event: &Event) {
        match event.kind {
            EventKind::FileCreated | EventKind::FileUpdated | EventKind::FileDeleted => {
                if let Some(path) = &event.path {
                    let note_uri = format!("vault://note/{path}");
                    let parent = parent_dir(path);
                    self.cache.delete_matching(|k| {
                        k.starts_with(&note_uri)
                            || k.starts_with("vault://recent")
                            || k.starts_with("vault://stats")
                            || (!parent.is_empty()
                                && k.starts_with(&format!("vault://folder/{parent}")))
                    });
                }
            }
            EventKind::DirectoryCreated | EventKind::DirectoryDeleted => {
                if let Some(path) = &event.path {
                    let folder_uri = format!("vault://folder/{path}");
                    self.cache.delete_matching(|k| {
                        k.starts_with(&folder_uri)
                            || k.starts_with("vault://structure")
                            || k.starts_with("vault://recent")
                    });
                }
            }
            EventKind::TagAdded | EventKind::TagRemoved => {
                let tag_uri = event
                    .path
                    .as_ref()
                    .map(|name| format!("vault://tag/{name}"));
                self.cache.delete_matching(|k| {
                    k.starts_with("vault://tags")
                        || tag_uri.as_deref().is_some_and(|t| k.starts_with(t))
                });
            }
            EventKind::CacheInvalidated => {
                for key in &event.keys {
                    self.cache.delete(key);
                }
            }
        }
    }
}

fn parent_dir(path: &str) -> String {
    match path.rfind('/') {
        Some(idx) => path[..idx].to_string(),
        None => String::new(),
    }
}

/// Pulls an embedded field (e.g. `pagination`, `_meta`) out of a raw
/// handler's JSON body and deserializes it into the typed envelope
/// counterpart, leaving the rest of the body untouched.
fn extract_field<T: serde::de::DeserializeOwned>(
    value: &mut serde_json::Value,
    field: &str,
) -> Option<T> {
    let obj = value.as_object_mut()?;
    let raw = obj.remove(field)?;
    serde_json::from_value(raw).ok()
}

fn subscribe_invalidation(handler: &Arc<CachedResourceHandler>, bus: &NotificationBus) {
    for kind in [
        EventKind::FileCreated,
        EventKind::FileUpdated,
        EventKind::FileDeleted,
        EventKind::DirectoryCreated,
        EventKind::DirectoryDeleted,
        EventKind::TagAdded,
        EventKind::TagRemoved,
        EventKind::CacheInvalidated,
    ] {
        let handler = handler.clone();
        // Runs synchronously on the emitting caller's stack: cache
        // invalidation must have completed by the time `emit` returns, or a
        // reader racing the writer could still observe the stale entry.
        bus.subscribe(kind, move |event| {
            handler.invalidate_for_event(event);
        });
    }
}
