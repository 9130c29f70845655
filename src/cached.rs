//! Cache-backed filesystem frontend.
//!
//! [`CachedFile`] drives the refill loop: a scattered read first asks
//! the store ([`CacheStore::try_preadv`]); on a miss it fetches the
//! reported range from the source file, commits it into the store, and
//! retries. Fetch policy stays out of the store, which only ever
//! reports what is missing.

use std::io::{self, IoSlice, IoSliceMut, SeekFrom};
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::error::{CacheError, CacheResult};
use crate::file::{File, FileStat, FileSystem, OpenOptions};
use crate::full_file::{FileCachePool, FileCachePoolBuilder};
use crate::pool::CachePool;
use crate::store::{CacheRead, CacheStore};
use crate::sync::{AtomicU64, Ordering};

/// Rounds of fetch-and-commit a single read will attempt before giving
/// up on a store that never converges.
const MAX_REFILL_ROUNDS: usize = 16;

/// A filesystem whose reads are served through a cache pool.
pub trait CachedFileSystem: FileSystem {
    /// The pool backing this filesystem.
    fn pool(&self) -> &dyn CachePool;
}

/// Filesystem frontend pairing a source filesystem with a cache pool.
#[derive(Clone)]
pub struct CachedFs {
    source: Arc<dyn FileSystem>,
    pool: Arc<FileCachePool>,
}

impl CachedFs {
    /// Create a frontend over `source` backed by `pool`.
    pub fn new(source: Arc<dyn FileSystem>, pool: Arc<FileCachePool>) -> CachedFs {
        CachedFs { source, pool }
    }
}

impl FileSystem for CachedFs {
    fn open(&self, path: &Path, opts: &OpenOptions) -> io::Result<Box<dyn File>> {
        let src = self.source.open(path, opts)?;
        let src_size = src.stat()?.size;
        let store = self
            .pool
            .open(path, opts)
            .ok_or_else(|| io::Error::other("failed to open cache store"))?;
        store.set_src_size(src_size);
        Ok(Box::new(CachedFile {
            src,
            store,
            pool: self.pool.clone(),
            fs: Arc::new(self.clone()),
            pos: AtomicU64::new(0),
        }))
    }
}

impl CachedFileSystem for CachedFs {
    fn pool(&self) -> &dyn CachePool {
        &*self.pool
    }
}

/// A file whose reads are served from the cache, refilled on demand
/// from the source. Writes go through to both.
pub struct CachedFile {
    src: Box<dyn File>,
    store: Arc<dyn CacheStore>,
    pool: Arc<dyn CachePool>,
    fs: Arc<CachedFs>,
    pos: AtomicU64,
}

impl CachedFile {
    /// Fetch `range` from the source and commit it into the store.
    fn refill(&self, range: &Range<u64>) -> io::Result<()> {
        let len = (range.end - range.start) as usize;
        let mut buf = vec![0u8; len];
        let mut fetched = 0;
        while fetched < len {
            let n = self
                .src
                .pread(&mut buf[fetched..], range.start + fetched as u64)?;
            if n == 0 {
                break;
            }
            fetched += n;
        }
        if fetched > 0 {
            self.store
                .pwritev(&[IoSlice::new(&buf[..fetched])], range.start)?;
        }
        Ok(())
    }
}

impl File for CachedFile {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let offset = self.pos.load(Ordering::Acquire);
        let n = self.pread(buf, offset)?;
        self.pos.fetch_add(n as u64, Ordering::AcqRel);
        Ok(n)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let offset = self.pos.load(Ordering::Acquire);
        let n = self.pwrite(buf, offset)?;
        self.pos.fetch_add(n as u64, Ordering::AcqRel);
        Ok(n)
    }

    fn pread(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.preadv(&mut [IoSliceMut::new(buf)], offset)
    }

    fn pwrite(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        self.pwritev(&[IoSlice::new(buf)], offset)
    }

    fn preadv(&self, bufs: &mut [IoSliceMut<'_>], offset: u64) -> io::Result<usize> {
        for _ in 0..MAX_REFILL_ROUNDS {
            match self.store.try_preadv(bufs, offset)? {
                CacheRead::Hit { size } => return Ok(size),
                CacheRead::Miss { refill } => self.refill(&refill)?,
            }
        }
        Err(CacheError::RefillStalled.into())
    }

    fn pwritev(&self, bufs: &[IoSlice<'_>], offset: u64) -> io::Result<usize> {
        // Write-through keeps the cached copy coherent with the source.
        let n = self.src.pwritev(bufs, offset)?;
        if n > 0 {
            let mut remaining = n;
            let partial: Vec<IoSlice<'_>> = bufs
                .iter()
                .map_while(|b| {
                    if remaining == 0 {
                        return None;
                    }
                    let take = b.len().min(remaining);
                    remaining -= take;
                    Some(IoSlice::new(&b[..take]))
                })
                .collect();
            self.store.pwritev(&partial, offset)?;
        }
        Ok(n)
    }

    fn seek(&self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(delta) => self.pos.load(Ordering::Acquire) as i64 + delta,
            SeekFrom::End(delta) => self.src.stat()?.size as i64 + delta,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of file",
            ));
        }
        self.pos.store(target as u64, Ordering::Release);
        Ok(target as u64)
    }

    fn stat(&self) -> io::Result<FileStat> {
        self.src.stat()
    }

    fn fsync(&self) -> io::Result<()> {
        self.src.fsync()
    }

    fn fdatasync(&self) -> io::Result<()> {
        self.src.fdatasync()
    }

    fn truncate(&self, _len: u64) -> io::Result<()> {
        // Truncation would desynchronize the committed extents.
        Err(CacheError::Unsupported.into())
    }

    fn filesystem(&self) -> Option<Arc<dyn FileSystem>> {
        let fs: Arc<dyn FileSystem> = self.fs.clone();
        Some(fs)
    }
}

impl Drop for CachedFile {
    fn drop(&mut self) {
        if let Err(err) = self.pool.store_release(&*self.store) {
            warn!(
                path = %self.store.pathname().display(),
                %err,
                "failed to release cache store"
            );
        }
    }
}

/// Build a full-file cached filesystem over `source_fs`, with cache
/// media on `media_fs`.
///
/// Fails with [`CacheError::InvalidRefillUnit`] when `refill_unit` is
/// not a multiple of 4096 bytes.
pub fn new_full_file_cached_fs(
    source_fs: Arc<dyn FileSystem>,
    media_fs: Arc<dyn FileSystem>,
    refill_unit: u64,
    capacity_gb: u64,
    eviction_period: Duration,
    disk_avail_bytes: u64,
) -> CacheResult<Box<dyn CachedFileSystem>> {
    let pool = FileCachePoolBuilder::new(media_fs)
        .refill_unit(refill_unit)
        .capacity_bytes(capacity_gb << 30)
        .eviction_period(eviction_period)
        .disk_avail_bytes(disk_avail_bytes)
        .build()?;
    Ok(Box::new(CachedFs::new(source_fs, Arc::new(pool))))
}
