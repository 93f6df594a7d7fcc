// ENC - Edit-and-Continue Engine
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Module baseline cache.
//!
//! The first request for a module asks the [`ModuleMetadataProvider`] for its
//! metadata and symbols; every concurrent or later request shares the same
//! [`CachedModule`]. Entries are evicted when the runtime unloads the module
//! and wholesale when the debug session ends.

use std::{
    any::Any,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
};

use dashmap::DashMap;
use enc_common::ModuleId;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::{
    affinity::{NativeReaderHandle, ReaderWorker},
    provider::{
        MetadataSnapshot, MethodDebugInfo, ModuleMetadataProvider, PortableSymbols, SymbolError,
        SymbolSource,
    },
};

/// Errors produced by the baseline cache.
#[derive(Debug, Error)]
pub enum BaselineError {
    /// The runtime has not loaded the module.
    #[error("module {0} is not loaded")]
    NotLoaded(ModuleId),

    /// The module was unloaded and its metadata released.
    #[error("module {0} has been unloaded")]
    ModuleUnloaded(ModuleId),

    /// The module is loaded but its metadata could not be read.
    #[error("metadata of module {module} is not available: {reason}")]
    MetadataUnavailable {
        /// Module whose metadata was requested.
        module: ModuleId,
        /// Provider-supplied reason.
        reason: String,
    },

    /// The module's symbols could not be read.
    #[error("symbols of module {module} are not available: {source}")]
    Symbols {
        /// Module whose symbols were requested.
        module: ModuleId,
        /// Underlying failure.
        #[source]
        source: SymbolError,
    },
}

enum ModuleSymbols {
    None,
    Portable(Arc<PortableSymbols>),
    Native(NativeReaderHandle),
}

/// Metadata and symbols of one loaded module, shared by every caller.
pub struct CachedModule {
    module: ModuleId,
    metadata: MetadataSnapshot,
    symbols: Mutex<Option<ModuleSymbols>>,
    unloaded: AtomicBool,
}

impl fmt::Debug for CachedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedModule")
            .field("module", &self.module)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

impl CachedModule {
    /// Module identity.
    pub fn id(&self) -> ModuleId {
        self.module
    }

    /// Whether the module is still loaded and its metadata readable.
    pub fn is_alive(&self) -> bool {
        !self.unloaded.load(Ordering::Acquire) && self.metadata.is_alive()
    }

    /// The metadata bytes of the loaded image.
    pub fn metadata(&self) -> Result<Arc<[u8]>, BaselineError> {
        if self.unloaded.load(Ordering::Acquire) {
            return Err(BaselineError::ModuleUnloaded(self.module));
        }
        self.metadata.bytes().ok_or(BaselineError::ModuleUnloaded(self.module))
    }

    /// Debug info of a method from the module's symbols.
    pub async fn method_debug_info(
        &self,
        method_token: u32,
    ) -> Result<Option<MethodDebugInfo>, BaselineError> {
        let pending = {
            let symbols = self.symbols.lock();
            match symbols.as_ref() {
                None => return Err(BaselineError::ModuleUnloaded(self.module)),
                Some(ModuleSymbols::None) => return Ok(None),
                Some(ModuleSymbols::Portable(symbols)) => {
                    return Ok(symbols.method_debug_info(method_token).cloned())
                }
                Some(ModuleSymbols::Native(reader)) => reader.method_debug_info(method_token),
            }
        };

        pending.await.map_err(|source| BaselineError::Symbols { module: self.module, source })
    }

    fn release(&self) {
        self.unloaded.store(true, Ordering::Release);
        // Dropping a native handle queues its release on the reader worker.
        drop(self.symbols.lock().take());
    }
}

/// Per-module emit state the delta emitter builds on.
///
/// Generation 0 is the loaded image; every committed delta yields the next
/// generation. Emitter-specific state rides along opaquely.
#[derive(Clone)]
pub struct EmitBaseline {
    module: Arc<CachedModule>,
    generation: u32,
    state: Option<Arc<dyn Any + Send + Sync>>,
}

impl fmt::Debug for EmitBaseline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmitBaseline")
            .field("module", &self.module.id())
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl EmitBaseline {
    /// Baseline of the loaded image.
    pub fn initial(module: Arc<CachedModule>) -> Self {
        Self { module, generation: 0, state: None }
    }

    /// Baseline of the generation following this one.
    pub fn next(&self, state: Arc<dyn Any + Send + Sync>) -> Self {
        Self { module: Arc::clone(&self.module), generation: self.generation + 1, state: Some(state) }
    }

    /// The cached module this baseline builds on.
    pub fn module(&self) -> &Arc<CachedModule> {
        &self.module
    }

    /// Identity of the module.
    pub fn module_id(&self) -> ModuleId {
        self.module.id()
    }

    /// Generation number.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Emitter state, if it has type `T`.
    pub fn state<T: Any>(&self) -> Option<&T> {
        self.state.as_deref().and_then(|state| state.downcast_ref())
    }

    /// Fail with [`BaselineError::ModuleUnloaded`] once the module is gone.
    pub fn ensure_alive(&self) -> Result<(), BaselineError> {
        if self.module.is_alive() {
            Ok(())
        } else {
            Err(BaselineError::ModuleUnloaded(self.module.id()))
        }
    }
}

type Entry = Arc<OnceCell<Arc<CachedModule>>>;

struct CacheInner {
    provider: Arc<dyn ModuleMetadataProvider>,
    worker: Arc<ReaderWorker>,
    entries: DashMap<ModuleId, Entry>,
}

impl CacheInner {
    fn evict_on_unload(&self, module: ModuleId, cached: &Weak<CachedModule>) {
        let removed = self.entries.remove_if(&module, |_, entry| {
            entry.get().is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), cached.as_ptr()))
        });
        if removed.is_some() {
            info!(%module, "Module unloaded, evicted baseline");
        }
    }

    fn discard(&self, module: ModuleId, entry: &Entry) {
        self.entries.remove_if(&module, |_, current| Arc::ptr_eq(current, entry));
    }
}

/// Single-flight cache of module baselines.
#[derive(Clone)]
pub struct BaselineCache {
    inner: Arc<CacheInner>,
}

impl fmt::Debug for BaselineCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaselineCache").field("entries", &self.inner.entries.len()).finish()
    }
}

impl BaselineCache {
    /// Create an empty cache.
    pub fn new(provider: Arc<dyn ModuleMetadataProvider>, worker: Arc<ReaderWorker>) -> Self {
        Self { inner: Arc::new(CacheInner { provider, worker, entries: DashMap::new() }) }
    }

    /// The cached baseline of `module`, created on first use.
    ///
    /// Concurrent callers for the same module share one provider lookup and
    /// receive the same instance. Returns `Ok(None)` when the module is not
    /// loaded; nothing is cached in that case.
    pub async fn get_or_create(
        &self,
        module: ModuleId,
    ) -> Result<Option<Arc<CachedModule>>, BaselineError> {
        let entry = self.inner.entries.entry(module).or_default().clone();
        let outcome = entry.get_or_try_init(|| self.create(module)).await.cloned();

        match outcome {
            Ok(cached) if cached.is_alive() => Ok(Some(cached)),
            // Unloaded while it was being created.
            Ok(_) | Err(BaselineError::NotLoaded(_)) => {
                self.inner.discard(module, &entry);
                Ok(None)
            }
            Err(err) => {
                self.inner.discard(module, &entry);
                Err(err)
            }
        }
    }

    async fn create(&self, module: ModuleId) -> Result<Arc<CachedModule>, BaselineError> {
        debug!(%module, "Creating module baseline");

        let info = self
            .inner
            .provider
            .try_get_baseline_module_info(module)
            .map_err(|err| BaselineError::MetadataUnavailable { module, reason: err.to_string() })?
            .ok_or(BaselineError::NotLoaded(module))?;

        let symbols = match info.symbols {
            SymbolSource::None => ModuleSymbols::None,
            SymbolSource::Portable(symbols) => ModuleSymbols::Portable(symbols),
            SymbolSource::Native(factory) => ModuleSymbols::Native(
                self.inner
                    .worker
                    .install(factory)
                    .await
                    .map_err(|source| BaselineError::Symbols { module, source })?,
            ),
        };

        let cached = Arc::new(CachedModule {
            module,
            metadata: info.metadata,
            symbols: Mutex::new(Some(symbols)),
            unloaded: AtomicBool::new(false),
        });

        let cache = Arc::downgrade(&self.inner);
        let weak = Arc::downgrade(&cached);
        self.inner.provider.on_module_unloaded(
            module,
            Box::new(move || {
                if let Some(cached) = weak.upgrade() {
                    cached.release();
                }
                if let Some(cache) = cache.upgrade() {
                    cache.evict_on_unload(module, &weak);
                }
            }),
        );

        Ok(cached)
    }

    /// The cached baseline of `module`, without creating one.
    pub fn get(&self, module: ModuleId) -> Option<Arc<CachedModule>> {
        self.inner.entries.get(&module).and_then(|entry| entry.get().cloned())
    }

    /// Number of modules with a cache entry.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Whether the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Evict every entry and release its symbol reader.
    pub fn clear(&self) {
        let entries: Vec<Entry> = self.inner.entries.iter().map(|e| e.value().clone()).collect();
        self.inner.entries.clear();
        for entry in entries {
            if let Some(cached) = entry.get() {
                cached.release();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use super::*;
    use crate::provider::{BaselineModuleInfo, MetadataError, UnloadCallback};

    #[derive(Default)]
    struct FakeProvider {
        lookups: AtomicUsize,
        loaded: Mutex<HashMap<ModuleId, Arc<[u8]>>>,
        callbacks: Mutex<HashMap<ModuleId, Vec<UnloadCallback>>>,
        broken: Mutex<Option<ModuleId>>,
    }

    impl FakeProvider {
        fn load(&self, module: ModuleId) {
            self.loaded.lock().insert(module, Arc::from(vec![0xCA, 0xFE]));
        }

        fn unload(&self, module: ModuleId) {
            self.loaded.lock().remove(&module);
            let callbacks = self.callbacks.lock().remove(&module).unwrap_or_default();
            for callback in callbacks {
                callback();
            }
        }
    }

    impl ModuleMetadataProvider for FakeProvider {
        fn try_get_baseline_module_info(
            &self,
            module: ModuleId,
        ) -> Result<Option<BaselineModuleInfo>, MetadataError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if *self.broken.lock() == Some(module) {
                return Err(MetadataError::Unavailable("corrupt image".into()));
            }
            Ok(self.loaded.lock().get(&module).map(|bytes| BaselineModuleInfo {
                metadata: MetadataSnapshot::new(bytes),
                symbols: SymbolSource::Portable(Arc::new(PortableSymbols::new())),
            }))
        }

        fn on_module_unloaded(&self, module: ModuleId, callback: UnloadCallback) {
            self.callbacks.lock().entry(module).or_default().push(callback);
        }
    }

    fn setup() -> (Arc<FakeProvider>, BaselineCache) {
        enc_common::logging::ensure_test_logging(None);
        let provider = Arc::new(FakeProvider::default());
        let worker = ReaderWorker::spawn("enc-test-reader").unwrap();
        let cache = BaselineCache::new(provider.clone(), worker);
        (provider, cache)
    }

    fn module(n: u8) -> ModuleId {
        ModuleId::from_bytes([n; 16])
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_lookup() {
        let (provider, cache) = setup();
        provider.load(module(1));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_or_create(module(1)).await })
            })
            .collect();

        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap().unwrap().unwrap());
        }

        assert_eq!(provider.lookups.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|m| Arc::ptr_eq(m, &results[0])));
    }

    #[tokio::test]
    async fn test_not_loaded_is_not_cached() {
        let (provider, cache) = setup();

        assert!(cache.get_or_create(module(2)).await.unwrap().is_none());
        assert!(cache.is_empty());

        provider.load(module(2));
        assert!(cache.get_or_create(module(2)).await.unwrap().is_some());
        assert_eq!(provider.lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unload_evicts_and_invalidates() {
        let (provider, cache) = setup();
        provider.load(module(3));

        let cached = cache.get_or_create(module(3)).await.unwrap().unwrap();
        assert!(cached.metadata().is_ok());

        provider.unload(module(3));
        assert!(cache.get(module(3)).is_none());
        assert!(matches!(cached.metadata(), Err(BaselineError::ModuleUnloaded(_))));
        assert!(matches!(
            cached.method_debug_info(1).await,
            Err(BaselineError::ModuleUnloaded(_))
        ));
        assert!(EmitBaseline::initial(cached).ensure_alive().is_err());
    }

    #[tokio::test]
    async fn test_metadata_failure_is_reported_and_retried() {
        let (provider, cache) = setup();
        provider.load(module(4));
        *provider.broken.lock() = Some(module(4));

        let err = cache.get_or_create(module(4)).await.unwrap_err();
        assert!(matches!(err, BaselineError::MetadataUnavailable { .. }));

        *provider.broken.lock() = None;
        assert!(cache.get_or_create(module(4)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clear_releases_everything() {
        let (provider, cache) = setup();
        provider.load(module(5));
        provider.load(module(6));

        let first = cache.get_or_create(module(5)).await.unwrap().unwrap();
        cache.get_or_create(module(6)).await.unwrap();
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
        assert!(!first.is_alive());
    }

    #[tokio::test]
    async fn test_emit_baseline_generations() {
        let (provider, cache) = setup();
        provider.load(module(7));
        let cached = cache.get_or_create(module(7)).await.unwrap().unwrap();

        let initial = EmitBaseline::initial(cached);
        assert_eq!(initial.generation(), 0);
        assert!(initial.state::<u32>().is_none());

        let next = initial.next(Arc::new(42u32));
        assert_eq!(next.generation(), 1);
        assert_eq!(next.state::<u32>(), Some(&42));
        assert_eq!(next.state::<String>(), None);
        assert_eq!(next.module_id(), module(7));
    }
}
