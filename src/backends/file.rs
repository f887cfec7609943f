//! File backend: one cell per file, shared across processes.
//!
//! On-disk layout is a fixed header followed by the blob:
//!
//! ```text
//! [ version: u64 LE ][ writer id: 16 bytes ][ blob ... ]
//! ```
//!
//! Writers serialize on a POSIX advisory record lock
//! (`fcntl(F_SETLKW)`) held on a sibling lock file and replace the
//! cell atomically by writing a temporary file in the same directory
//! and renaming it over the path. Record locks are held per process,
//! not per file handle, so writers in one process additionally
//! serialize on a shared in-process mutex keyed by lock path. Readers
//! never lock; the rename guarantees they see a whole cell or the
//! previous one. Change detection polls the file on a small interval,
//! comparing versions so the caller's own writes never count as a
//! change.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::types::{CasOutcome, Version};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use uuid::Uuid;

const HEADER_LEN: usize = 8 + 16;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Backend storing the cell in a single file.
pub struct FileBackend {
    path: PathBuf,
    lock_path: PathBuf,
    dir: PathBuf,
    writer: Uuid,
    interval: Duration,
    last_seen: AtomicU64,
    shutdown: Mutex<bool>,
    wake: Condvar,
    writer_serial: Arc<Mutex<()>>,
}

impl FileBackend {
    /// Open (or prepare to create) the cell at `path`. The advisory
    /// lock file lives next to it at `<path>.lock`.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".lock");
        let lock_path = PathBuf::from(lock_path);
        let writer_serial = process_lock(&lock_path);
        Ok(FileBackend {
            path,
            lock_path,
            dir,
            writer: Uuid::new_v4(),
            interval: DEFAULT_POLL_INTERVAL,
            last_seen: AtomicU64::new(0),
            shutdown: Mutex::new(false),
            wake: Condvar::new(),
            writer_serial,
        })
    }

    /// Override the change-detection poll interval. Larger values suit
    /// networked filesystems.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    fn read_cell(&self) -> Result<Option<(u64, Uuid, Vec<u8>)>> {
        let mut file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        if data.len() < HEADER_LEN {
            return Err(Error::Backend(format!(
                "truncated cell header in {}: {} bytes",
                self.path.display(),
                data.len()
            )));
        }
        let version = u64::from_le_bytes(data[..8].try_into().expect("8-byte slice"));
        let writer = Uuid::from_slice(&data[8..HEADER_LEN]).expect("16-byte slice");
        Ok(Some((version, writer, data[HEADER_LEN..].to_vec())))
    }

    fn current_version(&self) -> Result<u64> {
        Ok(self.read_cell()?.map(|(v, _, _)| v).unwrap_or(0))
    }

    /// Write header + blob to a temporary sibling and rename it over
    /// the cell path.
    fn install(&self, version: u64, blob: &[u8]) -> Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&version.to_le_bytes())?;
        tmp.write_all(self.writer.as_bytes())?;
        tmp.write_all(blob)?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        self.last_seen.store(version, Ordering::SeqCst);
        Ok(())
    }
}

impl Backend for FileBackend {
    fn read(&self) -> Result<Option<(Version, Vec<u8>)>> {
        match self.read_cell()? {
            None => Ok(None),
            Some((version, _, blob)) => {
                self.last_seen.store(version, Ordering::SeqCst);
                Ok(Some((Version::new(version), blob)))
            }
        }
    }

    fn write(&self, blob: &[u8]) -> Result<Version> {
        let _lock = FileLock::acquire(&self.writer_serial, &self.lock_path)?;
        let version = self.current_version()? + 1;
        self.install(version, blob)?;
        Ok(Version::new(version))
    }

    fn try_write(&self, blob: &[u8], expected: Version) -> Result<CasOutcome> {
        let _lock = FileLock::acquire(&self.writer_serial, &self.lock_path)?;
        let current = self.current_version()?;
        if Version::new(current) != expected {
            return Ok(CasOutcome::Mismatch(Version::new(current)));
        }
        let version = current + 1;
        self.install(version, blob)?;
        Ok(CasOutcome::Installed(Version::new(version)))
    }

    fn wait_for_change(&self) -> bool {
        loop {
            {
                let mut shutdown = self.shutdown.lock();
                if *shutdown {
                    return false;
                }
                let _ = self.wake.wait_for(&mut shutdown, self.interval);
                if *shutdown {
                    return false;
                }
            }

            // Poll failures (file vanished mid-rename, transient I/O)
            // are treated as "no change yet".
            let observed = match self.read_cell() {
                Ok(Some((version, writer, _))) => Some((version, writer)),
                _ => None,
            };
            if let Some((version, writer)) = observed {
                if version != self.last_seen.load(Ordering::SeqCst) {
                    self.last_seen.store(version, Ordering::SeqCst);
                    if writer != self.writer {
                        return true;
                    }
                }
            }
        }
    }

    fn close(&self) {
        *self.shutdown.lock() = true;
        self.wake.notify_all();
    }
}

/// Build a whole-file `flock` argument for a POSIX record lock.
fn whole_file_flock(lock_type: i32) -> libc::flock {
    let lock_type = i16::try_from(lock_type).expect("fcntl lock type must fit in i16");
    let whence = i16::try_from(libc::SEEK_SET).expect("SEEK_SET must fit in i16");
    libc::flock {
        l_type: lock_type,
        l_whence: whence,
        l_start: 0,
        l_len: 0,
        l_pid: 0,
    }
}

/// The in-process serialization mutex shared by every backend on one
/// lock path.
///
/// POSIX record locks do not exclude handles within the owning
/// process, and closing any descriptor for the lock file would drop
/// the process's lock. Serializing here means at most one descriptor
/// for the lock file exists per process at a time.
fn process_lock(path: &Path) -> Arc<Mutex<()>> {
    static REGISTRY: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();
    let registry = REGISTRY.get_or_init(|| Mutex::new(HashMap::new()));
    let mut registry = registry.lock();
    registry.entry(path.to_path_buf()).or_default().clone()
}

/// RAII writer lock: the in-process mutex plus a blocking whole-file
/// `fcntl(F_SETLKW)` record lock on the lock file.
struct FileLock<'a> {
    _serial: MutexGuard<'a, ()>,
    file: File,
}

impl<'a> FileLock<'a> {
    fn acquire(serial: &'a Mutex<()>, path: &Path) -> Result<FileLock<'a>> {
        let guard = serial.lock();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;
        let flock = whole_file_flock(libc::F_WRLCK);
        nix::fcntl::fcntl(file.as_raw_fd(), nix::fcntl::FcntlArg::F_SETLKW(&flock))
            .map_err(|e| Error::Io(e.into()))?;
        Ok(FileLock { _serial: guard, file })
    }
}

impl Drop for FileLock<'_> {
    fn drop(&mut self) {
        let flock = whole_file_flock(libc::F_UNLCK);
        let _ = nix::fcntl::fcntl(self.file.as_raw_fd(), nix::fcntl::FcntlArg::F_SETLK(&flock));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell_in(dir: &tempfile::TempDir) -> FileBackend {
        FileBackend::new(dir.path().join("cell")).unwrap()
    }

    #[test]
    fn missing_file_reads_none() {
        let dir = tempfile::tempdir().unwrap();
        let backend = cell_in(&dir);
        assert!(backend.read().unwrap().is_none());
    }

    #[test]
    fn write_then_read_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let backend = cell_in(&dir);
        let v1 = backend.write(b"payload").unwrap();
        let (version, blob) = backend.read().unwrap().unwrap();
        assert_eq!(version, v1);
        assert_eq!(blob, b"payload");
    }

    #[test]
    fn versions_advance_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let a = cell_in(&dir);
        let b = cell_in(&dir);
        let v1 = a.write(b"one").unwrap();
        let v2 = b.write(b"two").unwrap();
        assert_ne!(v1, v2);
        assert_eq!(a.read().unwrap().unwrap().1, b"two");
    }

    #[test]
    fn cas_from_empty_and_from_version() {
        let dir = tempfile::tempdir().unwrap();
        let backend = cell_in(&dir);

        let outcome = backend.try_write(b"init", Version::NONE).unwrap();
        let v1 = match outcome {
            CasOutcome::Installed(v) => v,
            other => panic!("expected install, got {other:?}"),
        };

        assert!(!backend.try_write(b"stale", Version::NONE).unwrap().installed());
        assert!(backend.try_write(b"next", v1).unwrap().installed());
    }

    #[test]
    fn cas_miss_reports_observed_version() {
        let dir = tempfile::tempdir().unwrap();
        let a = cell_in(&dir);
        let b = cell_in(&dir);
        let v1 = a.write(b"one").unwrap();
        let v2 = b.write(b"two").unwrap();

        match a.try_write(b"three", v1).unwrap() {
            CasOutcome::Mismatch(observed) => assert_eq!(observed, v2),
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn truncated_cell_is_a_backend_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cell");
        std::fs::write(&path, b"short").unwrap();
        let backend = FileBackend::new(&path).unwrap();
        assert!(matches!(backend.read(), Err(Error::Backend(_))));
    }

    #[test]
    fn close_unblocks_waiter() {
        let dir = tempfile::tempdir().unwrap();
        let backend = std::sync::Arc::new(
            cell_in(&dir).with_poll_interval(Duration::from_millis(10)),
        );
        let waiter = {
            let backend = backend.clone();
            std::thread::spawn(move || backend.wait_for_change())
        };
        std::thread::sleep(Duration::from_millis(30));
        backend.close();
        assert!(!waiter.join().unwrap());
    }

    #[test]
    fn wait_for_change_skips_own_writes() {
        let dir = tempfile::tempdir().unwrap();
        let ours = std::sync::Arc::new(
            cell_in(&dir).with_poll_interval(Duration::from_millis(10)),
        );
        let theirs = cell_in(&dir);

        ours.write(b"mine").unwrap();
        let waiter = {
            let ours = ours.clone();
            std::thread::spawn(move || ours.wait_for_change())
        };

        std::thread::sleep(Duration::from_millis(50));
        theirs.write(b"theirs").unwrap();
        assert!(waiter.join().unwrap());
        ours.close();
    }
}
