//! Media-file-backed cache store.

use std::io::{self, IoSlice, IoSliceMut};
use std::ops::Range;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::file::File;
use crate::full_file::extent::ExtentSet;
use crate::store::CacheStore;
use crate::sync::{AtomicU64, Ordering};

/// Sentinel for an unbound source size: refill windows are not clamped.
const SIZE_UNBOUND: u64 = u64::MAX;

/// A cache store mirroring one source file onto one media file.
///
/// The media file has the same logical layout as the source; an
/// in-memory [`ExtentSet`] records which ranges have been committed.
/// Reads come straight off the media file, writes land on the media
/// file and mark their range present.
pub struct FileCacheStore {
    path: PathBuf,
    media: Box<dyn File>,
    refill_unit: u64,
    src_size: AtomicU64,
    extents: Mutex<ExtentSet>,
}

impl FileCacheStore {
    /// Create a store for `path` over an opened media file.
    pub fn new(path: PathBuf, media: Box<dyn File>, refill_unit: u64) -> FileCacheStore {
        FileCacheStore {
            path,
            media,
            refill_unit,
            src_size: AtomicU64::new(SIZE_UNBOUND),
            extents: Mutex::new(ExtentSet::new()),
        }
    }

    /// The store's refill unit in bytes.
    pub fn refill_unit(&self) -> u64 {
        self.refill_unit
    }

    fn align_down(&self, x: u64) -> u64 {
        x - x % self.refill_unit
    }

    fn align_up(&self, x: u64) -> u64 {
        match x % self.refill_unit {
            0 => x,
            rem => x - rem + self.refill_unit,
        }
    }
}

impl CacheStore for FileCacheStore {
    fn pathname(&self) -> &Path {
        &self.path
    }

    fn set_src_size(&self, size: u64) {
        self.src_size.store(size, Ordering::Release);
    }

    fn query_refill_range(&self, offset: u64, len: u64) -> Range<u64> {
        if len == 0 {
            return 0..0;
        }

        // Align the request outward to whole refill units, then clamp to
        // the source size so the trailing partial unit converges.
        let start = self.align_down(offset);
        let mut end = self.align_up(offset.saturating_add(len));
        let src_size = self.src_size.load(Ordering::Acquire);
        if src_size != SIZE_UNBOUND {
            end = end.min(src_size);
        }
        if end <= start {
            return 0..0;
        }

        let window = start..end;
        match self.extents.lock().uncovered_in(&window) {
            None => 0..0,
            Some(gap) => {
                let gap_start = self.align_down(gap.start);
                let gap_end = self.align_up(gap.end).min(window.end);
                gap_start..gap_end
            }
        }
    }

    fn preadv_mutable(&self, bufs: &mut [IoSliceMut<'_>], offset: u64) -> io::Result<usize> {
        self.media.preadv(bufs, offset)
    }

    fn pwritev(&self, bufs: &[IoSlice<'_>], offset: u64) -> io::Result<usize> {
        let n = self.media.pwritev(bufs, offset)?;
        self.extents.lock().insert(offset..offset + n as u64);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::OpenOptions;
    use crate::localfs::LocalFile;
    use crate::store::CacheRead;
    use tempfile::tempdir;

    const UNIT: u64 = 4096;

    fn test_store(dir: &tempfile::TempDir) -> FileCacheStore {
        let media = LocalFile::open(
            &dir.path().join("media"),
            &OpenOptions::new().write(true).create(true),
        )
        .unwrap();
        FileCacheStore::new(PathBuf::from("/img"), Box::new(media), UNIT)
    }

    #[test]
    fn test_query_uncached_is_aligned_request() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);
        store.set_src_size(UNIT * 8);

        assert_eq!(store.query_refill_range(100, 200), 0..UNIT);
        assert_eq!(
            store.query_refill_range(UNIT + 1, UNIT),
            UNIT..UNIT * 3
        );
    }

    #[test]
    fn test_query_cached_is_empty() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);
        store.set_src_size(UNIT * 8);

        let data = vec![1u8; (UNIT * 2) as usize];
        store.pwritev(&[IoSlice::new(&data)], 0).unwrap();

        assert_eq!(store.query_refill_range(0, UNIT * 2), 0..0);
        assert_eq!(store.query_refill_range(10, 100), 0..0);
        assert_eq!(store.query_refill_range(0, 0), 0..0);
    }

    #[test]
    fn test_query_partial_is_uncached_subrange() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);
        store.set_src_size(UNIT * 8);

        let data = vec![1u8; (UNIT * 2) as usize];
        store.pwritev(&[IoSlice::new(&data)], 0).unwrap();

        assert_eq!(
            store.query_refill_range(UNIT, UNIT * 3),
            UNIT * 2..UNIT * 4
        );
    }

    #[test]
    fn test_query_clamps_to_src_size() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);
        store.set_src_size(UNIT + 100);

        // The trailing partial unit clamps to the source size and, once
        // committed, the request is a hit.
        assert_eq!(store.query_refill_range(0, UNIT * 4), 0..UNIT + 100);
        let data = vec![2u8; (UNIT + 100) as usize];
        store.pwritev(&[IoSlice::new(&data)], 0).unwrap();
        assert_eq!(store.query_refill_range(0, UNIT * 4), 0..0);

        // Entirely past the end: nothing to refill.
        assert_eq!(store.query_refill_range(UNIT * 6, 10), 0..0);
    }

    #[test]
    fn test_try_preadv_round_trip() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);
        store.set_src_size(UNIT);

        let mut buf = [0u8; 16];
        let mut iov = [IoSliceMut::new(&mut buf)];
        match store.try_preadv(&mut iov, 0).unwrap() {
            CacheRead::Miss { refill } => assert_eq!(refill, 0..UNIT),
            other => panic!("expected miss, got {:?}", other),
        }

        let data = vec![7u8; UNIT as usize];
        store.pwritev(&[IoSlice::new(&data)], 0).unwrap();

        match store.try_preadv(&mut iov, 0).unwrap() {
            CacheRead::Hit { size } => assert_eq!(size, 16),
            other => panic!("expected hit, got {:?}", other),
        }
        assert_eq!(buf, [7u8; 16]);
    }
}
