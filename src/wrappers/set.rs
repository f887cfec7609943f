//! Set wrapper.
//!
//! Elements are scalars with value semantics; there is no child
//! wrapper bookkeeping beyond membership.

use super::{mutate, Mutated};
use crate::error::{Error, Result};
use crate::manager::{Core, EngineState};
use crate::node::{NodeKind, Slot};
use crate::types::NodeId;
use crate::value::{Scalar, Value};
use rustc_hash::FxHashSet;
use std::fmt;
use std::sync::Arc;

/// Handle to a set node.
#[derive(Clone)]
pub struct SetRef {
    core: Arc<Core>,
    id: NodeId,
}

fn items<'a>(state: &'a EngineState, id: NodeId) -> Result<&'a FxHashSet<Scalar>> {
    match &state.graph.node(id).ok_or(Error::Detached)?.kind {
        NodeKind::Set(items) => Ok(items),
        other => Err(Error::InvalidOperation(format!(
            "expected Set node, found {}",
            other.variant_name()
        ))),
    }
}

fn items_mut<'a>(state: &'a mut EngineState, id: NodeId) -> Result<&'a mut FxHashSet<Scalar>> {
    match &mut state.graph.node_mut(id).ok_or(Error::Detached)?.kind {
        NodeKind::Set(items) => Ok(items),
        other => Err(Error::InvalidOperation(format!(
            "expected Set node, found {}",
            other.variant_name()
        ))),
    }
}

impl SetRef {
    pub(crate) fn new(core: &Arc<Core>, id: NodeId) -> Self {
        SetRef { core: Arc::clone(core), id }
    }

    pub(crate) fn core(&self) -> &Arc<Core> {
        &self.core
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    /// Number of elements.
    pub fn len(&self) -> Result<usize> {
        let state = self.core.state.lock();
        items(&state, self.id).map(|s| s.len())
    }

    /// True when the set is empty.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// True when the element is present.
    pub fn contains(&self, item: impl Into<Scalar>) -> Result<bool> {
        let item = item.into();
        let state = self.core.state.lock();
        Ok(items(&state, self.id)?.contains(&item))
    }

    /// All elements, in no particular order.
    pub fn items(&self) -> Result<Vec<Scalar>> {
        let state = self.core.state.lock();
        Ok(items(&state, self.id)?.iter().cloned().collect())
    }

    /// Plain deep copy of the set.
    pub fn snapshot(&self) -> Result<Value> {
        let state = self.core.state.lock();
        Ok(state.graph.snapshot_slot(&Slot::Node(self.id)))
    }

    /// Add an element. Returns false when it was already present.
    pub fn insert(&self, item: impl Into<Scalar>) -> Result<bool> {
        let item = item.into();
        mutate(&self.core, self.id, |state| {
            if items_mut(state, self.id)?.insert(item) {
                Ok(Mutated::Yes(true))
            } else {
                Ok(Mutated::No(false))
            }
        })
    }

    /// Remove an element if present. Returns false when it was absent.
    pub fn discard(&self, item: impl Into<Scalar>) -> Result<bool> {
        let item = item.into();
        mutate(&self.core, self.id, |state| {
            if items_mut(state, self.id)?.remove(&item) {
                Ok(Mutated::Yes(true))
            } else {
                Ok(Mutated::No(false))
            }
        })
    }

    /// Remove an element that must be present.
    pub fn remove(&self, item: impl Into<Scalar>) -> Result<()> {
        let item = item.into();
        mutate(&self.core, self.id, |state| {
            if items_mut(state, self.id)?.remove(&item) {
                Ok(Mutated::Yes(()))
            } else {
                Err(Error::InvalidOperation("element not in set".into()))
            }
        })
    }

    /// Remove all elements.
    pub fn clear(&self) -> Result<()> {
        mutate(&self.core, self.id, |state| {
            let set = items_mut(state, self.id)?;
            if set.is_empty() {
                return Ok(Mutated::No(()));
            }
            set.clear();
            Ok(Mutated::Yes(()))
        })
    }

    /// In-place union: add every element of `other`.
    pub fn union_update<I: Into<Scalar>>(&self, other: impl IntoIterator<Item = I>) -> Result<()> {
        let other: Vec<Scalar> = other.into_iter().map(Into::into).collect();
        mutate(&self.core, self.id, |state| {
            let set = items_mut(state, self.id)?;
            let mut changed = false;
            for item in other {
                changed |= set.insert(item);
            }
            Ok(if changed { Mutated::Yes(()) } else { Mutated::No(()) })
        })
    }

    /// In-place intersection: keep only elements also in `other`.
    pub fn intersection_update<I: Into<Scalar>>(
        &self,
        other: impl IntoIterator<Item = I>,
    ) -> Result<()> {
        let keep: FxHashSet<Scalar> = other.into_iter().map(Into::into).collect();
        mutate(&self.core, self.id, |state| {
            let set = items_mut(state, self.id)?;
            let before = set.len();
            set.retain(|item| keep.contains(item));
            Ok(if set.len() != before { Mutated::Yes(()) } else { Mutated::No(()) })
        })
    }

    /// In-place difference: drop every element of `other`.
    pub fn difference_update<I: Into<Scalar>>(
        &self,
        other: impl IntoIterator<Item = I>,
    ) -> Result<()> {
        let drop: Vec<Scalar> = other.into_iter().map(Into::into).collect();
        mutate(&self.core, self.id, |state| {
            let set = items_mut(state, self.id)?;
            let mut changed = false;
            for item in &drop {
                changed |= set.remove(item);
            }
            Ok(if changed { Mutated::Yes(()) } else { Mutated::No(()) })
        })
    }
}

impl fmt::Debug for SetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetRef").field("node", &self.id).finish()
    }
}
