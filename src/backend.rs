//! Storage backend contract.
//!
//! A backend is a single versioned atomic cell. The engine's
//! correctness rests entirely on the atomicity guarantees spelled out
//! here; everything else about a backend (where the bytes live, how
//! change notification works) is opaque.

use crate::error::Result;
use crate::types::{CasOutcome, Version};

/// A versioned atomic cell shared by independent participants.
///
/// All operations are atomic with respect to other participants on the
/// same cell:
///
/// - A `read` that follows a successful `write` or `try_write` by any
///   participant sees the newly installed `(version, blob)` or some
///   strictly later one.
/// - `try_write` is linearizable; commits across participants are
///   totally ordered by its CAS order.
/// - Versions are unique per blob generation and strictly change on
///   every successful write. They need not be monotonic; callers must
///   compare for inequality only.
///
/// Implementations must be `Send + Sync`: the manager calls `read`,
/// `write`, and `try_write` from user threads while a dedicated watcher
/// thread blocks in `wait_for_change`.
pub trait Backend: Send + Sync {
    /// Fetch the current cell state as a consistent snapshot, or `None`
    /// if nothing has ever been stored.
    fn read(&self) -> Result<Option<(Version, Vec<u8>)>>;

    /// Unconditionally replace the cell contents, returning the new
    /// version. Used for first-ever population or intentional
    /// overwrite.
    fn write(&self, blob: &[u8]) -> Result<Version>;

    /// Compare-and-swap: install `blob` under a fresh version iff the
    /// cell currently holds `expected` ([`Version::NONE`] means "expect
    /// the cell to be empty"). On mismatch nothing is written and the
    /// observed version is returned.
    fn try_write(&self, blob: &[u8], expected: Version) -> Result<CasOutcome>;

    /// Block until the cell's version has changed since this handle
    /// last observed it (via `read`, a successful write, or a previous
    /// `wait_for_change`). Returns `false` only after [`close`] to
    /// signal permanent shutdown; spurious `true` returns are permitted
    /// and the manager re-validates by comparing versions.
    ///
    /// Called from the manager's watcher thread only.
    ///
    /// [`close`]: Backend::close
    fn wait_for_change(&self) -> bool;

    /// Cooperatively cancel this handle: any blocked or future
    /// `wait_for_change` returns `false`. Idempotent.
    fn close(&self);
}
