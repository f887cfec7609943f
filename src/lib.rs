//! # syncell
//!
//! Ordinary in-memory containers whose mutations are transparently
//! replicated, with atomic commits and optimistic concurrency, across
//! independent participants sharing a storage cell.
//!
//! A participant reads a typed value, manipulates it with the usual
//! container operations, and at commit points observes its changes
//! appear atomically to every other participant, or observes a
//! conflict and retries.
//!
//! ## Quick Start
//!
//! ```
//! use syncell::{retry, Manager, MemoryBackend, RetryPolicy, Value};
//!
//! # fn main() -> syncell::Result<()> {
//! let manager = Manager::new(MemoryBackend::new())?;
//! manager.write(Value::map_of([("count", 0i64)]))?;
//!
//! // Mutations outside a transaction commit immediately.
//! let root = manager.read()?;
//! let counters = root.as_map().expect("root is a map");
//! counters.insert("count", 1i64)?;
//!
//! // A transaction buffers mutations and commits them with one CAS;
//! // the retry helper re-runs the closure when the CAS loses.
//! retry(&manager, RetryPolicy::unbounded().retries(10), || {
//!     let n = counters.get("count")?.and_then(|v| v.as_int()).unwrap_or(0);
//!     counters.insert("count", n + 1)
//! })?;
//!
//! assert_eq!(manager.snapshot()?, Some(Value::map_of([("count", 2i64)])));
//! # Ok(())
//! # }
//! ```
//!
//! ## Pieces
//!
//! - [`Manager`] — per-participant coordinator: cache, commits,
//!   watcher thread.
//! - [`ListRef`], [`MapRef`], [`SetRef`], [`BufRef`], [`RecordRef`] —
//!   mutation-tracking wrappers over the live tree.
//! - [`Transaction`] — scoped commit/rollback with nesting.
//! - [`Backend`] — the versioned-atomic-cell contract;
//!   [`MemoryBackend`] and [`FileBackend`] are the bundled
//!   implementations.
//! - [`retry`] — bounded re-execution on commit conflicts.

#![warn(missing_docs)]

mod backend;
mod backends;
mod codec;
mod error;
mod manager;
mod node;
mod retry;
mod txn;
mod types;
mod value;
mod wrappers;

pub mod prelude;

pub use backend::Backend;
pub use backends::{FileBackend, MemoryBackend};
pub use codec::{decode, encode};
pub use error::{Error, Result};
pub use manager::Manager;
pub use retry::{retry, RetryPolicy};
pub use txn::Transaction;
pub use types::{CasOutcome, Version};
pub use value::{Record, Scalar, Value};
pub use wrappers::{Arg, BufRef, ListRef, MapRef, RecordRef, SetRef, ValueRef};
