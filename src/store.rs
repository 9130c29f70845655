//! Cache-aware per-file I/O endpoint.
//!
//! A [`CacheStore`] serves reads out of local cache media and reports the
//! byte ranges it cannot serve, leaving fetch scheduling to the caller:
//! on a miss, [`CacheStore::try_preadv`] performs no I/O and hands back
//! the missing range so the caller can fetch it from the origin, commit
//! it with [`CacheStore::pwritev`], and retry.
//!
//! Each I/O direction comes in two forms: the borrowed-scatter-list form
//! and the `_mutable` form whose implementation may consume the scatter
//! list in place. Each member of a pair is default-implemented in terms
//! of the other (the borrowed form re-borrows the segments into a
//! scratch list the mutable form is free to destroy), so a concrete
//! store overrides exactly one member per direction.

use std::io::{self, IoSlice, IoSliceMut};
use std::ops::Range;
use std::path::Path;

/// Outcome of a [`CacheStore::try_preadv`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheRead {
    /// The whole range was cached and the scattered read was performed.
    Hit {
        /// Bytes read into the scatter list.
        size: usize,
    },
    /// Bytes are missing; no I/O was performed.
    Miss {
        /// The uncached range, aligned to the store's refill unit, that
        /// must be fetched and committed before retrying.
        refill: Range<u64>,
    },
}

/// Per-file cache endpoint.
///
/// The pathname handed out by [`pathname`](Self::pathname) is owned by
/// the store itself and stays valid for the store's whole lifetime,
/// regardless of registry mutation in the owning pool.
pub trait CacheStore: Send + Sync {
    /// The store's identity within its pool.
    fn pathname(&self) -> &Path;

    /// The sub-range of `[offset, offset + len)` not currently cached,
    /// aligned to the store's refill unit.
    ///
    /// Returns an empty range when the whole request is cached. Never
    /// fails; degenerate requests yield an empty range.
    fn query_refill_range(&self, offset: u64, len: u64) -> Range<u64>;

    /// Bind the logical size of the source file backing this store.
    ///
    /// Refill windows clamp to this size so the trailing partial unit
    /// converges. Stores that are not size-bound ignore it.
    fn set_src_size(&self, _size: u64) {}

    /// Serve a scattered read if fully cached, otherwise report the
    /// missing range without performing any I/O.
    fn try_preadv(&self, bufs: &mut [IoSliceMut<'_>], offset: u64) -> io::Result<CacheRead> {
        let want: u64 = bufs.iter().map(|b| b.len() as u64).sum();
        let refill = self.query_refill_range(offset, want);
        if refill.is_empty() {
            let size = self.preadv(bufs, offset)?;
            Ok(CacheRead::Hit { size })
        } else {
            Ok(CacheRead::Miss { refill })
        }
    }

    /// [`try_preadv`](Self::try_preadv) over a consumable scatter list.
    fn try_preadv_mutable(
        &self,
        bufs: &mut [IoSliceMut<'_>],
        offset: u64,
    ) -> io::Result<CacheRead> {
        self.try_preadv(bufs, offset)
    }

    /// Scattered read from cache media. The scatter list is left intact.
    fn preadv(&self, bufs: &mut [IoSliceMut<'_>], offset: u64) -> io::Result<usize> {
        let mut scratch: Vec<IoSliceMut<'_>> =
            bufs.iter_mut().map(|b| IoSliceMut::new(&mut **b)).collect();
        self.preadv_mutable(&mut scratch, offset)
    }

    /// Scattered read; the implementation may consume `bufs` in place.
    fn preadv_mutable(&self, bufs: &mut [IoSliceMut<'_>], offset: u64) -> io::Result<usize> {
        self.preadv(bufs, offset)
    }

    /// Scattered write into cache media, marking the range cached. The
    /// scatter list is left intact.
    fn pwritev(&self, bufs: &[IoSlice<'_>], offset: u64) -> io::Result<usize> {
        let mut scratch: Vec<IoSlice<'_>> = bufs.iter().map(|b| IoSlice::new(b)).collect();
        self.pwritev_mutable(&mut scratch, offset)
    }

    /// Scattered write; the implementation may consume `bufs` in place.
    fn pwritev_mutable(&self, bufs: &mut [IoSlice<'_>], offset: u64) -> io::Result<usize> {
        self.pwritev(bufs, offset)
    }
}
