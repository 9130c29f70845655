//! Full-file cache pool backend and its builder.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::error::{CacheError, CacheResult};
use crate::file::{FileSystem, OpenOptions};
use crate::full_file::store::FileCacheStore;
use crate::pool::{CachePool, StoreRegistry};
use crate::store::CacheStore;

/// Required alignment of the refill unit.
pub const REFILL_ALIGNMENT: u64 = 4096;

/// Capacity and cadence bounds for a [`FileCachePool`].
///
/// The capacity, period, and free-space bounds are consumed by the
/// external evictor; the pool itself only carries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileCachePoolConfig {
    /// Granularity of refill ranges, a multiple of 4096 bytes.
    pub refill_unit: u64,
    /// Upper bound on total cached bytes.
    pub capacity_bytes: u64,
    /// Cadence of eviction scans.
    pub eviction_period: Duration,
    /// Free space to preserve on the media filesystem.
    pub disk_avail_bytes: u64,
}

/// Pool of [`FileCacheStore`]s over a media filesystem.
///
/// Every store's media file lives under the media filesystem at the
/// store's own pathname, mirroring the source layout.
pub struct FileCachePool {
    media_fs: Arc<dyn FileSystem>,
    config: FileCachePoolConfig,
    registry: StoreRegistry,
}

impl std::fmt::Debug for FileCachePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCachePool")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FileCachePool {
    /// The pool's configuration.
    pub fn config(&self) -> &FileCachePoolConfig {
        &self.config
    }
}

impl CachePool for FileCachePool {
    fn registry(&self) -> &StoreRegistry {
        &self.registry
    }

    fn do_open(&self, path: &Path, opts: &OpenOptions) -> io::Result<Arc<dyn CacheStore>> {
        // The media file is always writable: refills land on it no
        // matter how the frontend opened the source.
        let media_opts = OpenOptions::new()
            .write(true)
            .create(true)
            .mode(opts.mode);
        let media = self.media_fs.open(path, &media_opts)?;
        Ok(Arc::new(FileCacheStore::new(
            path.to_path_buf(),
            media,
            self.config.refill_unit,
        )))
    }
}

/// Builder for [`FileCachePool`].
///
/// ```ignore
/// let pool = FileCachePoolBuilder::new(media_fs)
///     .refill_unit(256 * 1024)
///     .capacity_bytes(32 << 30)
///     .build()?;
/// ```
pub struct FileCachePoolBuilder {
    media_fs: Arc<dyn FileSystem>,
    config: FileCachePoolConfig,
}

impl FileCachePoolBuilder {
    /// Start a builder over `media_fs` with default bounds.
    pub fn new(media_fs: Arc<dyn FileSystem>) -> FileCachePoolBuilder {
        FileCachePoolBuilder {
            media_fs,
            config: FileCachePoolConfig {
                refill_unit: 256 * 1024,
                capacity_bytes: 32 << 30,
                eviction_period: Duration::from_secs(1),
                disk_avail_bytes: 0,
            },
        }
    }

    /// Set the refill unit. Must be a multiple of 4096 bytes.
    pub fn refill_unit(mut self, refill_unit: u64) -> Self {
        self.config.refill_unit = refill_unit;
        self
    }

    /// Set the capacity bound.
    pub fn capacity_bytes(mut self, capacity_bytes: u64) -> Self {
        self.config.capacity_bytes = capacity_bytes;
        self
    }

    /// Set the eviction cadence.
    pub fn eviction_period(mut self, eviction_period: Duration) -> Self {
        self.config.eviction_period = eviction_period;
        self
    }

    /// Set the media free-space bound.
    pub fn disk_avail_bytes(mut self, disk_avail_bytes: u64) -> Self {
        self.config.disk_avail_bytes = disk_avail_bytes;
        self
    }

    /// Validate the configuration and build the pool.
    pub fn build(self) -> CacheResult<FileCachePool> {
        if self.config.refill_unit == 0 || self.config.refill_unit % REFILL_ALIGNMENT != 0 {
            error!(
                refill_unit = self.config.refill_unit,
                "refill unit must be a multiple of 4096 bytes"
            );
            return Err(CacheError::InvalidRefillUnit);
        }
        info!(
            refill_unit = self.config.refill_unit,
            capacity_bytes = self.config.capacity_bytes,
            "initialized full-file cache pool"
        );
        Ok(FileCachePool {
            media_fs: self.media_fs,
            config: self.config,
            registry: StoreRegistry::new(),
        })
    }
}
