//! filecache: concurrency-safe I/O virtualization for image acceleration.
//!
//! This crate is the layer underneath a block-device image-acceleration
//! stack: reads are served from local cache media, misses are reported
//! as byte ranges for on-demand refill, and a file's backing
//! implementation can be swapped live once a local copy lands.
//!
//! # Architecture
//!
//! ```text
//!            +-----------------------------+
//!            |          CachedFs           |
//!            |  (refill loop: try read,    |
//!            |   fetch miss, commit, retry)|
//!            +------+---------------+------+
//!                   |               |
//!                   v               v
//!            +------------+  +-------------+
//!            | CachePool  |  | source File |
//!            | (registry) |  | (SwitchFile |
//!            +-----+------+  |  decorates) |
//!                  |         +-------------+
//!                  v
//!            +------------+  +-------------+
//!            | CacheStore |  | RingBuffer  |
//!            | (gaps +    |  | (refill     |
//!            |  media I/O)|  |  streaming) |
//!            +------------+  +-------------+
//! ```
//!
//! # Concurrency
//!
//! All components are passive objects driven by caller threads:
//!
//! - [`CachePool`] constructs at most one store per pathname, even under
//!   concurrent opens
//! - [`RingBuffer`] blocks producers on full and consumers on empty,
//!   with independent read-side and write-side serialization
//! - [`SwitchFile`] retargets its delegate behind a one-shot quiescence
//!   barrier; no forwarded call observes a half-replaced handle

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cached;
pub mod error;
pub mod file;
pub mod full_file;
pub mod localfs;
pub mod pool;
pub mod ring;
pub mod store;
pub mod switch;
pub mod sync;

pub use cached::{new_full_file_cached_fs, CachedFile, CachedFileSystem, CachedFs};
pub use error::{CacheError, CacheResult};
pub use file::{ContainerCodec, File, FileStat, FileSystem, OpenOptions};
pub use full_file::{FileCachePool, FileCachePoolBuilder, FileCachePoolConfig};
pub use localfs::{LocalFile, LocalFs};
pub use pool::{CachePool, StoreEntry, StoreRegistry};
pub use ring::RingBuffer;
pub use store::{CacheRead, CacheStore};
pub use switch::SwitchFile;
