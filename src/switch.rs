//! Live file-swap decorator.
//!
//! [`SwitchFile`] wraps a [`File`] and can retarget it while I/O is in
//! flight: once a locally-committed replacement exists,
//! [`SwitchFile::set_switch_file`] arms a one-shot swap that fires at
//! the next quiescent moment.
//!
//! # Thread Safety
//!
//! The swap state machine is `Normal -> Armed -> Swapping -> Normal` over
//! an atomic, and quiescence comes from a reader-admission barrier:
//!
//! - every forwarded operation holds the read side of the handle lock
//!   across the delegate call, so its in-flight window is exactly the
//!   guard's lifetime, on every exit path
//! - arming stores `Armed`; the first operation to observe it wins the
//!   `Armed -> Swapping` compare-and-exchange and becomes the swapping
//!   thread, exactly one per arm
//! - the swapping thread takes the write side, which admits no new
//!   readers and drains the in-flight ones, performs the swap, and
//!   releases `Swapping -> Normal`
//! - operations that lose the race, or observe `Swapping`, go straight
//!   to read admission and queue behind the writer
//!
//! No forwarded call ever observes a half-replaced handle, and nothing
//! sleep-polls.
//!
//! A swap whose target fails to open or probe is logged and dropped:
//! the prior handle stays active and the armed intent is consumed.

use std::io::{self, IoSlice, IoSliceMut, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{error, info, trace};

use crate::file::{ContainerCodec, File, FileStat, FileSystem, OpenOptions};
use crate::localfs::LocalFile;
use crate::sync::{AtomicBool, AtomicU8, Ordering};

/// No swap pending.
const NORMAL: u8 = 0;
/// A swap target is recorded and waiting for the next operation.
const ARMED: u8 = 1;
/// One thread is draining in-flight operations and swapping.
const SWAPPING: u8 = 2;

/// Decorator that atomically retargets its delegate file.
pub struct SwitchFile {
    active: RwLock<Box<dyn File>>,
    /// Previous handle after a swap, disposed when the decorator drops.
    retired: Mutex<Option<Box<dyn File>>>,
    pending: Mutex<Option<PathBuf>>,
    state: AtomicU8,
    /// Whether the active handle is a locally-committed file.
    local: AtomicBool,
    codec: Option<Arc<dyn ContainerCodec>>,
}

impl SwitchFile {
    /// Wrap `source` as the initially active handle.
    pub fn new(source: Box<dyn File>) -> SwitchFile {
        Self::build(source, None)
    }

    /// Wrap `source` and probe swap targets with `codec`.
    pub fn with_codec(source: Box<dyn File>, codec: Arc<dyn ContainerCodec>) -> SwitchFile {
        Self::build(source, Some(codec))
    }

    fn build(source: Box<dyn File>, codec: Option<Arc<dyn ContainerCodec>>) -> SwitchFile {
        SwitchFile {
            active: RwLock::new(source),
            retired: Mutex::new(None),
            pending: Mutex::new(None),
            state: AtomicU8::new(NORMAL),
            local: AtomicBool::new(false),
            codec,
        }
    }

    /// Arm a one-shot swap to `path`.
    ///
    /// Does not block and does not swap; the next forwarded operation
    /// drives the swap. Re-arming before the swap fires replaces the
    /// target; the last arm wins.
    pub fn set_switch_file(&self, path: impl Into<PathBuf>) {
        *self.pending.lock() = Some(path.into());
        self.state.store(ARMED, Ordering::Release);
    }

    /// Whether the active handle is a locally-committed file.
    pub fn is_local(&self) -> bool {
        self.local.load(Ordering::Acquire)
    }

    fn check_switch(&self) {
        if self
            .state
            .compare_exchange(ARMED, SWAPPING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let target = self.pending.lock().take();
            // Write acquisition closes admission and drains every
            // in-flight operation.
            let mut active = self.active.write();
            if let Some(path) = target {
                self.do_switch(&mut active, &path);
            }
            drop(active);
            // Leave Armed in place if a re-arm landed mid-swap; it
            // fires on a later operation.
            let _ = self.state.compare_exchange(
                SWAPPING,
                NORMAL,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
    }

    /// Open and probe the target, then replace the active handle. Any
    /// failure keeps the current handle.
    fn do_switch(&self, active: &mut Box<dyn File>, path: &Path) {
        let mut file: Box<dyn File> = match LocalFile::open(path, &OpenOptions::new()) {
            Ok(file) => Box::new(file),
            Err(err) => {
                error!(path = %path.display(), %err, "failed to open switch target");
                return;
            }
        };

        if let Some(codec) = &self.codec {
            match codec.probe(&*file) {
                Ok(true) => match codec.open(file) {
                    Ok(wrapped) => file = wrapped,
                    Err(err) => {
                        error!(path = %path.display(), %err, "failed to open compressed container");
                        return;
                    }
                },
                Ok(false) => {}
                Err(err) => {
                    error!(path = %path.display(), %err, "failed to probe switch target");
                    return;
                }
            }
        }

        info!(path = %path.display(), "switched to local file");
        let prev = std::mem::replace(active, file);
        *self.retired.lock() = Some(prev);
        self.local.store(true, Ordering::Release);
    }

    fn forward<R>(&self, op: impl FnOnce(&dyn File) -> R) -> R {
        self.check_switch();
        let active = self.active.read();
        op(&**active)
    }
}

impl File for SwitchFile {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.forward(|f| f.read(buf))
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.forward(|f| f.write(buf))
    }

    fn pread(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.check_switch();
        let active = self.active.read();
        if self.local.load(Ordering::Acquire) {
            trace!(target: "audit", offset, count = buf.len(), "file:pread");
        }
        active.pread(buf, offset)
    }

    fn pwrite(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        self.forward(|f| f.pwrite(buf, offset))
    }

    fn readv(&self, bufs: &mut [IoSliceMut<'_>]) -> io::Result<usize> {
        self.forward(|f| f.readv(bufs))
    }

    fn writev(&self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        self.forward(|f| f.writev(bufs))
    }

    fn preadv(&self, bufs: &mut [IoSliceMut<'_>], offset: u64) -> io::Result<usize> {
        self.forward(|f| f.preadv(bufs, offset))
    }

    fn pwritev(&self, bufs: &[IoSlice<'_>], offset: u64) -> io::Result<usize> {
        self.forward(|f| f.pwritev(bufs, offset))
    }

    fn seek(&self, pos: SeekFrom) -> io::Result<u64> {
        self.forward(|f| f.seek(pos))
    }

    fn stat(&self) -> io::Result<FileStat> {
        self.forward(|f| f.stat())
    }

    fn fsync(&self) -> io::Result<()> {
        self.forward(|f| f.fsync())
    }

    fn fdatasync(&self) -> io::Result<()> {
        self.forward(|f| f.fdatasync())
    }

    fn truncate(&self, len: u64) -> io::Result<()> {
        self.forward(|f| f.truncate(len))
    }

    fn set_mode(&self, mode: u32) -> io::Result<()> {
        self.forward(|f| f.set_mode(mode))
    }

    fn chown(&self, uid: u32, gid: u32) -> io::Result<()> {
        self.forward(|f| f.chown(uid, gid))
    }

    fn fallocate(&self, offset: u64, len: u64) -> io::Result<()> {
        self.forward(|f| f.fallocate(offset, len))
    }

    fn filesystem(&self) -> Option<Arc<dyn FileSystem>> {
        self.forward(|f| f.filesystem())
    }

    fn close(&self) -> io::Result<()> {
        self.forward(|f| f.close())
    }
}
