//! Transaction scopes.
//!
//! A [`Transaction`] is a scoped region around a participant's work.
//! Entering the outermost scope pins the cached version as the commit
//! baseline and suppresses the watcher's right to swap the tree;
//! nested scopes push frames that share buffered state with the
//! enclosing scope.
//!
//! [`commit`](Transaction::commit) is the normal exit. Dropping the
//! guard without committing is the error exit: the outermost scope
//! restores a clean tree by re-reading the backend, a nested scope
//! restores the dirty-flag state recorded at its entry (full deep
//! rollback of container contents is only guaranteed for the outermost
//! scope).

use crate::error::Result;
use crate::manager::Core;
use crate::types::{NodeId, Version};
use rustc_hash::FxHashSet;
use std::sync::Arc;

/// Bookkeeping for one open scope.
#[derive(Debug, Default)]
pub(crate) struct Frame {
    /// Dirty flags as they were at frame entry, for nodes first
    /// dirtied inside this frame.
    saved_dirty: Vec<(NodeId, bool)>,
    recorded: FxHashSet<u64>,
    root_replaced_at_entry: bool,
}

impl Frame {
    fn new(root_replaced: bool) -> Self {
        Frame { root_replaced_at_entry: root_replaced, ..Frame::default() }
    }

    pub(crate) fn record_flips(&mut self, flipped: &[NodeId]) {
        for id in flipped {
            if self.recorded.insert(id.0) {
                self.saved_dirty.push((*id, false));
            }
        }
    }

    /// Fold a normally-exited child frame into this one so its flips
    /// are still restorable if this frame later fails.
    fn absorb(&mut self, child: Frame) {
        for (id, was_dirty) in child.saved_dirty {
            if self.recorded.insert(id.0) {
                self.saved_dirty.push((id, was_dirty));
            }
        }
    }
}

/// Frame stack for one open outermost transaction.
#[derive(Debug)]
pub(crate) struct TxnStack {
    pub(crate) baseline: Version,
    frames: Vec<Frame>,
}

impl TxnStack {
    pub(crate) fn top_frame(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("open transaction has a frame")
    }
}

/// Scoped transaction guard.
///
/// Obtained from [`Manager::transaction`](crate::Manager::transaction).
/// Every exit path either commits or rolls back: call
/// [`commit`](Transaction::commit) on success, and let the guard drop
/// (or call [`rollback`](Transaction::rollback)) on failure.
#[must_use = "dropping a transaction without commit rolls it back"]
pub struct Transaction {
    core: Arc<Core>,
    finished: bool,
}

impl Transaction {
    pub(crate) fn begin(core: &Arc<Core>) -> Transaction {
        let mut state = core.state.lock();
        let root_replaced = state.root_replaced;
        if state.txn.is_none() {
            // Prime an invalid cache before pinning the baseline, so a
            // first read inside the scope cannot move it.
            if state.graph.root.is_none() || state.stale {
                if let Err(err) = core.refresh_locked(&mut state, false) {
                    state.stale = true;
                    tracing::warn!(error = %err, "refresh at transaction entry failed");
                }
            }
            state.txn = Some(TxnStack {
                baseline: state.version,
                frames: vec![Frame::new(root_replaced)],
            });
        } else {
            let stack = state.txn.as_mut().expect("checked above");
            stack.frames.push(Frame::new(root_replaced));
        }
        Transaction { core: Arc::clone(core), finished: false }
    }

    /// Normal exit.
    ///
    /// A nested scope merges its buffered state into the enclosing
    /// scope. The outermost scope encodes the root and CASes it against
    /// the baseline: exactly one backend write per outermost commit,
    /// and none at all when nothing is dirty. On a CAS miss the cache
    /// is refreshed from the winning state and
    /// [`Error::Conflict`](crate::Error::Conflict) is returned.
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        let core = Arc::clone(&self.core);
        let mut state = core.state.lock();

        let (is_nested, baseline) = {
            let stack = state.txn.as_mut().expect("commit on open transaction");
            (stack.frames.len() > 1, stack.baseline)
        };

        if is_nested {
            let stack = state.txn.as_mut().expect("checked above");
            let child = stack.frames.pop().expect("nested frame");
            stack.top_frame().absorb(child);
            return Ok(());
        }

        let result = core.commit_root(&mut state, baseline);
        state.txn = None;
        if state.pending_refresh {
            state.pending_refresh = false;
            if result.is_ok() {
                // The watcher saw a change while we were open; fold it
                // in now. The conflict path has already refreshed.
                if let Err(err) = core.refresh_locked(&mut state, false) {
                    state.stale = true;
                    tracing::warn!(error = %err, "deferred refresh failed; cache marked stale");
                }
            }
        }
        result
    }

    /// Error exit, equivalent to dropping the guard.
    pub fn rollback(mut self) {
        self.abort();
    }

    fn abort(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let core = Arc::clone(&self.core);
        let mut state = core.state.lock();

        let (is_nested, frame) = {
            let Some(stack) = state.txn.as_mut() else { return };
            let frame = stack.frames.pop().expect("open transaction has a frame");
            (!stack.frames.is_empty(), frame)
        };

        if is_nested {
            // Restore the dirty flags recorded at frame entry; wrappers
            // detached inside the frame stay detached.
            for (id, was_dirty) in frame.saved_dirty {
                if let Some(node) = state.graph.node_mut(id) {
                    node.dirty = was_dirty;
                }
            }
            state.root_replaced = frame.root_replaced_at_entry;
            return;
        }

        state.txn = None;
        state.pending_refresh = false;
        // Re-read the backend to restore a clean tree, discarding all
        // buffered mutations.
        if let Err(err) = core.refresh_locked(&mut state, true) {
            state.stale = true;
            tracing::warn!(error = %err, "rollback refresh failed; cache marked stale");
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.abort();
    }
}
