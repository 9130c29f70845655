//! Local filesystem adaptors over `std::fs`.

use std::fs;
use std::io::{self, SeekFrom};
use std::os::unix::fs::{FileExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use crate::file::{File, FileStat, FileSystem, OpenOptions};
use crate::sync::{AtomicU64, Ordering};

/// A file on the local filesystem.
///
/// Positional I/O goes straight to `pread(2)`/`pwrite(2)`; the cursor for
/// `read`/`write`/`seek` is kept in an atomic so the handle stays `&self`
/// all the way down.
pub struct LocalFile {
    file: fs::File,
    pos: AtomicU64,
}

impl LocalFile {
    /// Open `path` with the given options.
    pub fn open(path: &Path, opts: &OpenOptions) -> io::Result<LocalFile> {
        let file = fs::OpenOptions::new()
            .read(opts.read)
            .write(opts.write)
            .create(opts.create)
            .truncate(opts.truncate)
            .mode(opts.mode)
            .open(path)?;
        Ok(LocalFile {
            file,
            pos: AtomicU64::new(0),
        })
    }

    /// Wrap an already-open `std::fs::File`.
    pub fn from_std(file: fs::File) -> LocalFile {
        LocalFile {
            file,
            pos: AtomicU64::new(0),
        }
    }
}

impl File for LocalFile {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let offset = self.pos.load(Ordering::Acquire);
        let n = self.file.read_at(buf, offset)?;
        self.pos.fetch_add(n as u64, Ordering::AcqRel);
        Ok(n)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let offset = self.pos.load(Ordering::Acquire);
        let n = self.file.write_at(buf, offset)?;
        self.pos.fetch_add(n as u64, Ordering::AcqRel);
        Ok(n)
    }

    fn pread(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.file.read_at(buf, offset)
    }

    fn pwrite(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        self.file.write_at(buf, offset)
    }

    fn seek(&self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(delta) => self.pos.load(Ordering::Acquire) as i64 + delta,
            SeekFrom::End(delta) => self.file.metadata()?.len() as i64 + delta,
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
        let meta = self.file.metadata()?;
        Ok(FileStat { size: meta.len() })
    }

    fn fsync(&self) -> io::Result<()> {
        self.file.sync_all()
    }

    fn fdatasync(&self) -> io::Result<()> {
        self.file.sync_data()
    }

    fn truncate(&self, len: u64) -> io::Result<()> {
        self.file.set_len(len)
    }

    fn set_mode(&self, mode: u32) -> io::Result<()> {
        self.file
            .set_permissions(fs::Permissions::from_mode(mode))
    }

    fn chown(&self, uid: u32, gid: u32) -> io::Result<()> {
        std::os::unix::fs::fchown(&self.file, Some(uid), Some(gid))
    }

    #[cfg(target_os = "linux")]
    fn fallocate(&self, offset: u64, len: u64) -> io::Result<()> {
        use std::os::unix::io::AsRawFd;
        // Safety: fd is valid for the lifetime of self.file; offsets are
        // passed through unchanged.
        let ret = unsafe {
            libc::fallocate(
                self.file.as_raw_fd(),
                0,
                offset as libc::off_t,
                len as libc::off_t,
            )
        };
        if ret == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

/// A [`FileSystem`] rooted at a directory.
///
/// Absolute paths are resolved inside the root, so `/a/b` opens
/// `<root>/a/b`. Parent directories are created as needed when opening
/// with `create`.
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    /// Create an adaptor rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> LocalFs {
        LocalFs { root: root.into() }
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match path.strip_prefix("/") {
            Ok(rel) => self.root.join(rel),
            Err(_) => self.root.join(path),
        }
    }
}

impl FileSystem for LocalFs {
    fn open(&self, path: &Path, opts: &OpenOptions) -> io::Result<Box<dyn File>> {
        let full = self.resolve(path);
        if opts.create {
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Box::new(LocalFile::open(&full, opts)?))
    }
}
