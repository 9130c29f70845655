//! End-to-end tests of the cached filesystem frontend: the refill loop
//! populates the media store and subsequent reads never touch the
//! source.

use std::io::{self, IoSlice, IoSliceMut, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use filecache::{
    new_full_file_cached_fs, CacheError, File, FileStat, FileSystem, LocalFs, OpenOptions,
};

/// Filesystem wrapper counting positional reads on opened files.
struct CountingFs {
    inner: LocalFs,
    reads: Arc<AtomicU64>,
}

impl CountingFs {
    fn new(inner: LocalFs) -> CountingFs {
        CountingFs {
            inner,
            reads: Arc::new(AtomicU64::new(0)),
        }
    }
}

struct CountingFile {
    inner: Box<dyn File>,
    reads: Arc<AtomicU64>,
}

impl File for CountingFile {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read(buf)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn pread(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.pread(buf, offset)
    }

    fn pwrite(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        self.inner.pwrite(buf, offset)
    }

    fn seek(&self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }

    fn stat(&self) -> io::Result<FileStat> {
        self.inner.stat()
    }

    fn fsync(&self) -> io::Result<()> {
        self.inner.fsync()
    }

    fn fdatasync(&self) -> io::Result<()> {
        self.inner.fdatasync()
    }

    fn truncate(&self, len: u64) -> io::Result<()> {
        self.inner.truncate(len)
    }
}

impl FileSystem for CountingFs {
    fn open(&self, path: &Path, opts: &OpenOptions) -> io::Result<Box<dyn File>> {
        Ok(Box::new(CountingFile {
            inner: self.inner.open(path, opts)?,
            reads: self.reads.clone(),
        }))
    }
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[test]
fn test_factory_rejects_misaligned_refill_unit() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(LocalFs::new(dir.path().join("src")));
    let media = Arc::new(LocalFs::new(dir.path().join("media")));

    let err = new_full_file_cached_fs(
        source,
        media,
        4096 + 1,
        1,
        Duration::from_millis(100),
        0,
    )
    .err()
    .unwrap();
    assert_eq!(err, CacheError::InvalidRefillUnit);
}

#[test]
fn test_refill_then_serve_from_cache() {
    const FILE_LEN: usize = 10_000;

    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    let data = pattern(FILE_LEN);
    std::fs::write(dir.path().join("src/image.raw"), &data).unwrap();

    let source = Arc::new(CountingFs::new(LocalFs::new(dir.path().join("src"))));
    let reads = source.reads.clone();
    let media = Arc::new(LocalFs::new(dir.path().join("media")));

    let fs = new_full_file_cached_fs(
        source,
        media,
        4096,
        1,
        Duration::from_millis(100),
        0,
    )
    .unwrap();

    let file = fs
        .open(Path::new("/image.raw"), &OpenOptions::new())
        .unwrap();

    // First read misses and refills from the source.
    let mut buf = vec![0u8; FILE_LEN];
    let n = file.pread(&mut buf, 0).unwrap();
    assert_eq!(n, FILE_LEN);
    assert_eq!(buf, data);
    let after_first = reads.load(Ordering::SeqCst);
    assert!(after_first > 0);

    // The media file now mirrors the source.
    let media_copy = std::fs::read(dir.path().join("media/image.raw")).unwrap();
    assert_eq!(&media_copy[..FILE_LEN], &data[..]);

    // Fully cached: no further source reads, any alignment.
    let mut chunk = [0u8; 777];
    let n = file.pread(&mut chunk, 4000).unwrap();
    assert_eq!(n, 777);
    assert_eq!(&chunk[..], &data[4000..4777]);
    assert_eq!(reads.load(Ordering::SeqCst), after_first);
}

#[test]
fn test_partial_reads_refill_only_missing_units() {
    const FILE_LEN: usize = 4096 * 4;

    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    let data = pattern(FILE_LEN);
    std::fs::write(dir.path().join("src/layer"), &data).unwrap();

    let source = Arc::new(CountingFs::new(LocalFs::new(dir.path().join("src"))));
    let reads = source.reads.clone();
    let media = Arc::new(LocalFs::new(dir.path().join("media")));

    let fs = new_full_file_cached_fs(
        source,
        media,
        4096,
        1,
        Duration::from_millis(100),
        0,
    )
    .unwrap();
    let file = fs.open(Path::new("/layer"), &OpenOptions::new()).unwrap();

    // Read inside the first unit.
    let mut buf = [0u8; 100];
    file.pread(&mut buf, 50).unwrap();
    assert_eq!(&buf[..], &data[50..150]);
    let after_first_unit = reads.load(Ordering::SeqCst);

    // Another read inside the same unit is a pure hit.
    file.pread(&mut buf, 2000).unwrap();
    assert_eq!(&buf[..], &data[2000..2100]);
    assert_eq!(reads.load(Ordering::SeqCst), after_first_unit);

    // A read straddling into uncached units refills again.
    let mut big = [0u8; 8192];
    file.pread(&mut big, 2048).unwrap();
    assert_eq!(&big[..], &data[2048..2048 + 8192]);
    assert!(reads.load(Ordering::SeqCst) > after_first_unit);
}

#[test]
fn test_vectored_read_through_cache() {
    const FILE_LEN: usize = 4096 * 2;

    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    let data = pattern(FILE_LEN);
    std::fs::write(dir.path().join("src/blob"), &data).unwrap();

    let fs = new_full_file_cached_fs(
        Arc::new(LocalFs::new(dir.path().join("src"))),
        Arc::new(LocalFs::new(dir.path().join("media"))),
        4096,
        1,
        Duration::from_millis(100),
        0,
    )
    .unwrap();
    let file = fs.open(Path::new("/blob"), &OpenOptions::new()).unwrap();

    let mut a = [0u8; 1000];
    let mut b = [0u8; 3000];
    let mut iov = [IoSliceMut::new(&mut a), IoSliceMut::new(&mut b)];
    let n = file.preadv(&mut iov, 500).unwrap();
    assert_eq!(n, 4000);
    assert_eq!(&a[..], &data[500..1500]);
    assert_eq!(&b[..], &data[1500..4500]);
}

#[test]
fn test_write_through_updates_cache_and_source() {
    const FILE_LEN: usize = 4096;

    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::write(dir.path().join("src/rw"), pattern(FILE_LEN)).unwrap();

    let fs = new_full_file_cached_fs(
        Arc::new(LocalFs::new(dir.path().join("src"))),
        Arc::new(LocalFs::new(dir.path().join("media"))),
        4096,
        1,
        Duration::from_millis(100),
        0,
    )
    .unwrap();
    let file = fs
        .open(
            Path::new("/rw"),
            &OpenOptions::new().write(true),
        )
        .unwrap();

    let payload = [9u8; 256];
    assert_eq!(
        file.pwritev(&[IoSlice::new(&payload)], 512).unwrap(),
        256
    );

    // Visible through the cache path and on the source file.
    let mut buf = [0u8; 256];
    file.pread(&mut buf, 512).unwrap();
    assert_eq!(buf, payload);

    let on_source = std::fs::read(dir.path().join("src/rw")).unwrap();
    assert_eq!(&on_source[512..768], &payload[..]);
}

#[test]
fn test_store_released_on_drop() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::write(dir.path().join("src/once"), pattern(4096)).unwrap();

    let fs = new_full_file_cached_fs(
        Arc::new(LocalFs::new(dir.path().join("src"))),
        Arc::new(LocalFs::new(dir.path().join("media"))),
        4096,
        1,
        Duration::from_millis(100),
        0,
    )
    .unwrap();

    {
        let a = fs.open(Path::new("/once"), &OpenOptions::new()).unwrap();
        let b = fs.open(Path::new("/once"), &OpenOptions::new()).unwrap();
        assert_eq!(
            fs.pool().registry().ref_count(Path::new("/once")),
            Some(2)
        );
        drop(a);
        assert_eq!(
            fs.pool().registry().ref_count(Path::new("/once")),
            Some(1)
        );
        drop(b);
    }
    assert!(fs.pool().registry().is_empty());
}
