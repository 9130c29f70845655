//! Keyed, refcounted registry of cache stores.
//!
//! A [`CachePool`] owns one [`CacheStore`] per pathname. Construction is
//! delegated to the backend through [`CachePool::do_open`]; the provided
//! [`CachePool::open`] runs the find-or-create sequence under the
//! registry lock, so concurrent opens of the same pathname construct the
//! store exactly once and every successful open bumps the entry's
//! refcount. [`CachePool::store_release`] is the inverse: it decrements
//! the refcount and erases the entry when the last reference goes away.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::{error, warn};

use crate::error::{CacheError, CacheResult};
use crate::file::OpenOptions;
use crate::store::CacheStore;

/// A registered store and the number of successful opens against it.
pub struct StoreEntry {
    /// The live store.
    pub store: Arc<dyn CacheStore>,
    /// Open count; the entry is erased when this drops to zero.
    pub refs: u64,
}

/// Registry state shared by the provided [`CachePool`] methods.
///
/// The map key is an owned copy of the pathname, and each store owns its
/// own copy too, so erasing an entry never invalidates a pathname held
/// by a live store.
#[derive(Default)]
pub struct StoreRegistry {
    stores: Mutex<HashMap<PathBuf, StoreEntry>>,
}

impl StoreRegistry {
    /// Create an empty registry.
    pub fn new() -> StoreRegistry {
        StoreRegistry::default()
    }

    /// Lock the registry map.
    pub fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, StoreEntry>> {
        self.stores.lock()
    }

    /// Open count for `path`, if registered.
    pub fn ref_count(&self, path: &Path) -> Option<u64> {
        self.stores.lock().get(path).map(|entry| entry.refs)
    }

    /// Number of registered stores.
    pub fn len(&self) -> usize {
        self.stores.lock().len()
    }

    /// Whether no stores are registered.
    pub fn is_empty(&self) -> bool {
        self.stores.lock().is_empty()
    }
}

/// Backend-agnostic store pool.
///
/// Backends implement [`registry`](Self::registry) and
/// [`do_open`](Self::do_open); callers use the provided
/// [`open`](Self::open) / [`store_release`](Self::store_release).
pub trait CachePool: Send + Sync {
    /// The registry backing the provided methods.
    fn registry(&self) -> &StoreRegistry;

    /// Construct the store for `path`. Called with the registry lock
    /// held, so at most one construction runs per pathname.
    fn do_open(&self, path: &Path, opts: &OpenOptions) -> io::Result<Arc<dyn CacheStore>>;

    /// Find or create the store for `path`.
    ///
    /// Increments the refcount on every successful return. Construction
    /// failure is logged and reported as `None`.
    fn open(&self, path: &Path, opts: &OpenOptions) -> Option<Arc<dyn CacheStore>> {
        let mut stores = self.registry().lock();
        if let Some(entry) = stores.get_mut(path) {
            entry.refs += 1;
            return Some(entry.store.clone());
        }
        match self.do_open(path, opts) {
            Ok(store) => {
                stores.insert(
                    path.to_path_buf(),
                    StoreEntry {
                        store: store.clone(),
                        refs: 1,
                    },
                );
                Some(store)
            }
            Err(err) => {
                error!(path = %path.display(), %err, "failed to open cache store");
                None
            }
        }
    }

    /// Release one open of `store`.
    ///
    /// Decrements the refcount for the store's pathname and erases the
    /// entry when it reaches zero. A pathname with no entry fails with
    /// [`CacheError::NotRegistered`] and leaves the registry unchanged.
    fn store_release(&self, store: &dyn CacheStore) -> CacheResult<()> {
        let path = store.pathname();
        let mut stores = self.registry().lock();
        let Some(entry) = stores.get_mut(path) else {
            warn!(path = %path.display(), "released store is not registered");
            return Err(CacheError::NotRegistered);
        };
        entry.refs -= 1;
        if entry.refs == 0 {
            stores.remove(path);
        }
        Ok(())
    }
}
