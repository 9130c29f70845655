//! Full-file cache backend.
//!
//! Every cached source file is mirrored by one media file with the same
//! logical layout. An in-memory extent set tracks which refill units
//! have been committed; persistence of that map, and eviction of cold
//! media files, belong to external collaborators.

mod extent;
mod pool;
mod store;

pub use extent::ExtentSet;
pub use pool::{FileCachePool, FileCachePoolBuilder, FileCachePoolConfig, REFILL_ALIGNMENT};
pub use store::FileCacheStore;
