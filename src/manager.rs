//! The per-participant coordinator.
//!
//! A [`Manager`] owns one value graph bound to one backend cell: it
//! caches the last decoded tree plus its version, hands out wrapper
//! handles into that tree, commits mutations with compare-and-swap,
//! and runs a watcher thread that folds other participants' commits
//! into the cache.
//!
//! One mutex (the engine mutex) protects the cache, the watcher
//! coordination state, and the transaction frame stack. Commit holds
//! it across the CAS round-trip: commit is the critical section.

use crate::backend::Backend;
use crate::codec;
use crate::error::{Error, Result};
use crate::node::Graph;
use crate::txn::{Transaction, TxnStack};
use crate::types::{CasOutcome, NodeId, Version};
use crate::value::Value;
use crate::wrappers::ValueRef;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Everything the engine mutex protects.
pub(crate) struct EngineState {
    pub(crate) graph: Graph,
    pub(crate) version: Version,
    pub(crate) txn: Option<TxnStack>,
    /// Root replaced (or scalar root mutated) since the last commit.
    pub(crate) root_replaced: bool,
    /// The watcher saw a change while a transaction was open.
    pub(crate) pending_refresh: bool,
    /// The last watcher refresh failed; the next read re-attempts.
    pub(crate) stale: bool,
}

impl EngineState {
    fn new() -> Self {
        EngineState {
            graph: Graph::new(),
            version: Version::NONE,
            txn: None,
            root_replaced: false,
            pending_refresh: false,
            stale: false,
        }
    }

    /// Record dirty-flag flips in the open transaction frame so a
    /// nested error exit can restore them.
    pub(crate) fn record_flips(&mut self, flipped: &[NodeId]) {
        if let Some(stack) = self.txn.as_mut() {
            stack.top_frame().record_flips(flipped);
        }
    }
}

/// Shared engine core; wrapper handles keep it alive.
pub(crate) struct Core {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) state: Mutex<EngineState>,
}

impl Core {
    /// Pull the backend cell into the cache. With `force`, the tree is
    /// rebuilt even when the version matches, discarding local
    /// uncommitted state; that is the rollback path.
    pub(crate) fn refresh_locked(&self, state: &mut EngineState, force: bool) -> Result<()> {
        match self.backend.read()? {
            None => {
                if force {
                    state.graph.clear_root();
                    state.version = Version::NONE;
                    state.root_replaced = false;
                }
                state.stale = false;
                Ok(())
            }
            Some((version, blob)) => {
                if force || version != state.version {
                    let value = codec::decode(&blob)?;
                    state.graph.reconcile(value);
                    state.version = version;
                    state.root_replaced = false;
                    tracing::debug!(version = %version, "refreshed cache from backend");
                }
                state.pending_refresh = false;
                state.stale = false;
                Ok(())
            }
        }
    }

    /// Encode the root and CAS it against `baseline`. On a miss, pull
    /// the winning state so the caller can retry from fresh data, and
    /// surface the conflict.
    pub(crate) fn commit_root(&self, state: &mut EngineState, baseline: Version) -> Result<()> {
        if !state.graph.root_dirty() && !state.root_replaced {
            return Ok(());
        }
        let value = match state.graph.snapshot_root() {
            Some(value) => value,
            None => return Ok(()),
        };
        let blob = codec::encode(&value)?;
        match self.backend.try_write(&blob, baseline)? {
            CasOutcome::Installed(version) => {
                state.version = version;
                state.graph.clear_dirty();
                state.root_replaced = false;
                tracing::debug!(version = %version, "committed");
                Ok(())
            }
            CasOutcome::Mismatch(actual) => {
                tracing::debug!(expected = %baseline, actual = %actual, "commit lost the race");
                self.refresh_locked(state, true)?;
                Err(Error::Conflict { expected: baseline, actual })
            }
        }
    }

    /// Commit immediately when no transaction is buffering: every
    /// mutation outside a scope is its own single-op transaction.
    pub(crate) fn autocommit(&self, state: &mut EngineState) -> Result<()> {
        if state.txn.is_some() {
            return Ok(());
        }
        let baseline = state.version;
        self.commit_root(state, baseline)
    }
}

fn spawn_watcher(core: &Arc<Core>) -> Result<JoinHandle<()>> {
    let weak = Arc::downgrade(core);
    let handle = thread::Builder::new()
        .name("syncell-watcher".into())
        .spawn(move || loop {
            let Some(core) = weak.upgrade() else { return };
            if !core.backend.wait_for_change() {
                return;
            }
            let mut state = core.state.lock();
            if state.txn.is_some() {
                // A transaction pins the baseline; apply after it ends.
                state.pending_refresh = true;
            } else if let Err(err) = core.refresh_locked(&mut state, false) {
                state.stale = true;
                tracing::warn!(error = %err, "watcher refresh failed; cache marked stale");
            }
        })?;
    Ok(handle)
}

/// Coordinator for one participant on one backend cell.
///
/// # Example
///
/// ```
/// use syncell::{Manager, MemoryBackend, Value};
///
/// # fn main() -> syncell::Result<()> {
/// let manager = Manager::new(MemoryBackend::new())?;
/// manager.write(Value::map_of([("count", 0i64)]))?;
///
/// let root = manager.read()?;
/// let map = root.as_map().expect("root is a map");
/// map.insert("count", 1i64)?;
///
/// assert_eq!(
///     manager.snapshot()?,
///     Some(Value::map_of([("count", 1i64)])),
/// );
/// # Ok(())
/// # }
/// ```
pub struct Manager {
    core: Arc<Core>,
    watcher: Option<JoinHandle<()>>,
}

impl Manager {
    /// Bind a manager to a backend cell and start its watcher.
    pub fn new(backend: impl Backend + 'static) -> Result<Manager> {
        let core = Arc::new(Core {
            backend: Arc::new(backend),
            state: Mutex::new(EngineState::new()),
        });
        let watcher = spawn_watcher(&core)?;
        Ok(Manager { core, watcher: Some(watcher) })
    }

    /// The live root wrapper. Uses the cache when it is valid,
    /// otherwise refreshes from the backend first.
    ///
    /// Fails with [`Error::EmptyCell`] when the backend holds no value.
    pub fn read(&self) -> Result<ValueRef> {
        let mut state = self.core.state.lock();
        // Inside a transaction the tree is pinned at the baseline, so
        // an invalid cache is served as-is rather than refreshed.
        if state.txn.is_none() && (state.graph.root.is_none() || state.stale) {
            self.core.refresh_locked(&mut state, false)?;
        }
        match &state.graph.root {
            None => Err(Error::EmptyCell),
            Some(slot) => Ok(ValueRef::from_slot(&self.core, &state.graph, slot)),
        }
    }

    /// Fetch the latest stored value from the backend, re-pointing
    /// surviving wrappers and detaching orphaned ones.
    ///
    /// May not be called while a transaction is open.
    pub fn refresh(&self) -> Result<ValueRef> {
        let mut state = self.core.state.lock();
        if state.txn.is_some() {
            return Err(Error::RefreshInTransaction);
        }
        self.core.refresh_locked(&mut state, false)?;
        match &state.graph.root {
            None => Err(Error::EmptyCell),
            Some(slot) => Ok(ValueRef::from_slot(&self.core, &state.graph, slot)),
        }
    }

    /// Replace the stored value.
    ///
    /// Outside a transaction this writes the backend unconditionally;
    /// inside one it replaces the root in the buffered state and the
    /// outermost commit performs the write.
    pub fn write(&self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let mut state = self.core.state.lock();
        if state.txn.is_some() {
            state.graph.set_root(value, true);
            state.root_replaced = true;
            return Ok(());
        }
        let blob = codec::encode(&value)?;
        let version = self.core.backend.write(&blob)?;
        state.graph.reconcile(value);
        state.version = version;
        state.root_replaced = false;
        Ok(())
    }

    /// Version-guarded replace, bypassing the transaction machinery
    /// entirely. Returns false when the backend held a different
    /// version. Primarily an escape hatch.
    pub fn try_write(&self, value: impl Into<Value>, expected: Version) -> Result<bool> {
        let value = value.into();
        let mut state = self.core.state.lock();
        let blob = codec::encode(&value)?;
        match self.core.backend.try_write(&blob, expected)? {
            CasOutcome::Installed(version) => {
                state.graph.reconcile(value);
                state.version = version;
                state.root_replaced = false;
                Ok(true)
            }
            CasOutcome::Mismatch(_) => Ok(false),
        }
    }

    /// Unwrapped deep copy of the cached tree, or `None` when the cell
    /// is empty. Mutating the result does not affect shared state.
    pub fn snapshot(&self) -> Result<Option<Value>> {
        let mut state = self.core.state.lock();
        if state.txn.is_none() && (state.graph.root.is_none() || state.stale) {
            self.core.refresh_locked(&mut state, false)?;
        }
        Ok(state.graph.snapshot_root())
    }

    /// The cached cell version.
    pub fn version(&self) -> Version {
        self.core.state.lock().version
    }

    /// Begin a transaction scope. Nested calls share buffered state
    /// with the enclosing scope; only the outermost commit writes the
    /// backend.
    pub fn transaction(&self) -> Transaction {
        Transaction::begin(&self.core)
    }

    /// True iff the wrapper is reachable from this manager's root.
    pub fn is_linked(&self, value: &ValueRef) -> bool {
        match value.node_handle() {
            Some((core, id)) if Arc::ptr_eq(core, &self.core) => {
                self.core.state.lock().graph.is_linked(id)
            }
            _ => false,
        }
    }

    /// True iff the wrapper has pending uncommitted mutations.
    pub fn is_dirty(&self, value: &ValueRef) -> bool {
        match value.node_handle() {
            Some((core, id)) if Arc::ptr_eq(core, &self.core) => self
                .core
                .state
                .lock()
                .graph
                .node(id)
                .map(|n| n.dirty)
                .unwrap_or(false),
            _ => false,
        }
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.core.backend.close();
        if let Some(watcher) = self.watcher.take() {
            let _ = watcher.join();
        }
    }
}
