//! In-process backend: a shared cell behind a mutex and a condvar.

use crate::backend::Backend;
use crate::error::Result;
use crate::types::{CasOutcome, Version};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

struct CellState {
    version: u64,
    blob: Option<Vec<u8>>,
}

struct Cell {
    state: Mutex<CellState>,
    changed: Condvar,
}

/// Backend holding the cell in process memory.
///
/// `clone()` produces another participant handle on the same cell; each
/// handle tracks the last version it observed so `wait_for_change`
/// skips the handle's own writes.
pub struct MemoryBackend {
    cell: Arc<Cell>,
    last_seen: AtomicU64,
    closed: AtomicBool,
}

impl MemoryBackend {
    /// Create a new, empty cell.
    pub fn new() -> Self {
        MemoryBackend {
            cell: Arc::new(Cell {
                state: Mutex::new(CellState { version: 0, blob: None }),
                changed: Condvar::new(),
            }),
            last_seen: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Current cell version; test and diagnostic aid.
    pub fn current_version(&self) -> Version {
        let state = self.cell.state.lock();
        if state.blob.is_none() {
            Version::NONE
        } else {
            Version::new(state.version)
        }
    }

    fn install(&self, state: &mut CellState, blob: &[u8]) -> Version {
        state.version += 1;
        state.blob = Some(blob.to_vec());
        self.last_seen.store(state.version, Ordering::SeqCst);
        self.cell.changed.notify_all();
        Version::new(state.version)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryBackend {
    fn clone(&self) -> Self {
        MemoryBackend {
            cell: Arc::clone(&self.cell),
            last_seen: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }
}

impl Backend for MemoryBackend {
    fn read(&self) -> Result<Option<(Version, Vec<u8>)>> {
        let state = self.cell.state.lock();
        self.last_seen.store(state.version, Ordering::SeqCst);
        Ok(state
            .blob
            .as_ref()
            .map(|blob| (Version::new(state.version), blob.clone())))
    }

    fn write(&self, blob: &[u8]) -> Result<Version> {
        let mut state = self.cell.state.lock();
        Ok(self.install(&mut state, blob))
    }

    fn try_write(&self, blob: &[u8], expected: Version) -> Result<CasOutcome> {
        let mut state = self.cell.state.lock();
        let current = if state.blob.is_none() {
            Version::NONE
        } else {
            Version::new(state.version)
        };
        if current != expected {
            return Ok(CasOutcome::Mismatch(current));
        }
        Ok(CasOutcome::Installed(self.install(&mut state, blob)))
    }

    fn wait_for_change(&self) -> bool {
        let mut state = self.cell.state.lock();
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return false;
            }
            if state.version != self.last_seen.load(Ordering::SeqCst) {
                self.last_seen.store(state.version, Ordering::SeqCst);
                return true;
            }
            self.cell.changed.wait(&mut state);
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // Hold the lock so a concurrent waiter cannot miss the wakeup.
        let _state = self.cell.state.lock();
        self.cell.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn empty_cell_reads_none() {
        let backend = MemoryBackend::new();
        assert!(backend.read().unwrap().is_none());
        assert_eq!(backend.current_version(), Version::NONE);
    }

    #[test]
    fn write_then_read() {
        let backend = MemoryBackend::new();
        let v1 = backend.write(b"one").unwrap();
        let (version, blob) = backend.read().unwrap().unwrap();
        assert_eq!(version, v1);
        assert_eq!(blob, b"one");
    }

    #[test]
    fn versions_change_on_every_write() {
        let backend = MemoryBackend::new();
        let v1 = backend.write(b"a").unwrap();
        let v2 = backend.write(b"a").unwrap();
        assert_ne!(v1, v2);
    }

    #[test]
    fn cas_against_empty_cell() {
        let backend = MemoryBackend::new();
        let outcome = backend.try_write(b"init", Version::NONE).unwrap();
        assert!(outcome.installed());

        // A second expect-empty CAS must now miss.
        let outcome = backend.try_write(b"again", Version::NONE).unwrap();
        assert!(!outcome.installed());
    }

    #[test]
    fn cas_miss_leaves_cell_untouched() {
        let backend = MemoryBackend::new();
        let v1 = backend.write(b"one").unwrap();
        let outcome = backend.try_write(b"two", Version::new(999)).unwrap();
        assert_eq!(outcome, CasOutcome::Mismatch(v1));
        assert_eq!(backend.read().unwrap().unwrap().1, b"one");
    }

    #[test]
    fn clone_shares_the_cell() {
        let a = MemoryBackend::new();
        let b = a.clone();
        a.write(b"shared").unwrap();
        assert_eq!(b.read().unwrap().unwrap().1, b"shared");
    }

    #[test]
    fn concurrent_cas_exactly_one_wins() {
        let backend = Arc::new(MemoryBackend::new());
        let base = backend.write(b"0").unwrap();

        let wins: Vec<bool> = (0..4)
            .map(|_| {
                let backend = backend.clone();
                thread::spawn(move || backend.try_write(b"1", base).unwrap().installed())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect();

        assert_eq!(wins.iter().filter(|w| **w).count(), 1);
    }

    #[test]
    fn wait_for_change_sees_other_participants_only() {
        let ours = MemoryBackend::new();
        let theirs = ours.clone();
        ours.write(b"mine").unwrap();

        let waiter = {
            let handle = ours.clone();
            // The waiter handle reads first so its last-seen version is
            // current.
            handle.read().unwrap();
            thread::spawn(move || handle.wait_for_change())
        };

        thread::sleep(Duration::from_millis(20));
        theirs.write(b"theirs").unwrap();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn close_unblocks_waiter() {
        let backend = Arc::new(MemoryBackend::new());
        backend.read().unwrap();

        let waiter = {
            let backend = backend.clone();
            thread::spawn(move || backend.wait_for_change())
        };
        thread::sleep(Duration::from_millis(20));
        backend.close();
        assert!(!waiter.join().unwrap());
    }
}
