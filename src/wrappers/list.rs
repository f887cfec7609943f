//! Sequence wrapper.

use super::{detach_slot, mutate, resolve_arg, Arg, Mutated, ValueRef};
use crate::error::{Error, Result};
use crate::manager::{Core, EngineState};
use crate::node::{Key, NodeKind, Slot};
use crate::types::NodeId;
use crate::value::Value;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// Handle to a sequence node.
#[derive(Clone)]
pub struct ListRef {
    core: Arc<Core>,
    id: NodeId,
}

fn slots<'a>(state: &'a EngineState, id: NodeId) -> Result<&'a Vec<Slot>> {
    match &state.graph.node(id).ok_or(Error::Detached)?.kind {
        NodeKind::List(slots) => Ok(slots),
        other => Err(Error::InvalidOperation(format!(
            "expected List node, found {}",
            other.variant_name()
        ))),
    }
}

fn slots_mut<'a>(state: &'a mut EngineState, id: NodeId) -> Result<&'a mut Vec<Slot>> {
    match &mut state.graph.node_mut(id).ok_or(Error::Detached)?.kind {
        NodeKind::List(slots) => Ok(slots),
        other => Err(Error::InvalidOperation(format!(
            "expected List node, found {}",
            other.variant_name()
        ))),
    }
}

fn index_error(index: usize, len: usize) -> Error {
    Error::InvalidOperation(format!("index {index} out of range for sequence of length {len}"))
}

impl ListRef {
    pub(crate) fn new(core: &Arc<Core>, id: NodeId) -> Self {
        ListRef { core: Arc::clone(core), id }
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
        slots(&state, self.id).map(|s| s.len())
    }

    /// True when the sequence is empty.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Element at `index`: a handle for containers, a plain scalar
    /// otherwise.
    pub fn get(&self, index: usize) -> Result<Option<ValueRef>> {
        let state = self.core.state.lock();
        Ok(slots(&state, self.id)?
            .get(index)
            .map(|slot| ValueRef::from_slot(&self.core, &state.graph, slot)))
    }

    /// All elements, as a point-in-time listing.
    pub fn items(&self) -> Result<Vec<ValueRef>> {
        let state = self.core.state.lock();
        Ok(slots(&state, self.id)?
            .iter()
            .map(|slot| ValueRef::from_slot(&self.core, &state.graph, slot))
            .collect())
    }

    /// Plain deep copy of the sequence.
    pub fn snapshot(&self) -> Result<Value> {
        let state = self.core.state.lock();
        Ok(state.graph.snapshot_slot(&Slot::Node(self.id)))
    }

    /// Replace the element at `index`.
    pub fn set(&self, index: usize, value: impl Into<Arg>) -> Result<()> {
        let arg = value.into();
        mutate(&self.core, self.id, |state| {
            let len = slots(state, self.id)?.len();
            if index >= len {
                return Err(index_error(index, len));
            }
            let slot = resolve_arg(state, &self.core, arg, self.id, Key::Index(index))?;
            let old = std::mem::replace(&mut slots_mut(state, self.id)?[index], slot);
            detach_slot(state, &old);
            Ok(Mutated::Yes(()))
        })
    }

    /// Append an element.
    pub fn push(&self, value: impl Into<Arg>) -> Result<()> {
        let arg = value.into();
        mutate(&self.core, self.id, |state| {
            let index = slots(state, self.id)?.len();
            let slot = resolve_arg(state, &self.core, arg, self.id, Key::Index(index))?;
            slots_mut(state, self.id)?.push(slot);
            Ok(Mutated::Yes(()))
        })
    }

    /// Insert an element before `index` (`index == len` appends),
    /// shifting later siblings.
    pub fn insert(&self, index: usize, value: impl Into<Arg>) -> Result<()> {
        let arg = value.into();
        mutate(&self.core, self.id, |state| {
            let len = slots(state, self.id)?.len();
            if index > len {
                return Err(index_error(index, len));
            }
            let slot = resolve_arg(state, &self.core, arg, self.id, Key::Index(index))?;
            slots_mut(state, self.id)?.insert(index, slot);
            state.graph.reindex_list(self.id, index + 1);
            Ok(Mutated::Yes(()))
        })
    }

    /// Remove the element at `index`, returning its plain value. A
    /// removed child wrapper becomes detached.
    pub fn remove(&self, index: usize) -> Result<Value> {
        mutate(&self.core, self.id, |state| {
            let old = {
                let slots = slots_mut(state, self.id)?;
                if index >= slots.len() {
                    return Err(index_error(index, slots.len()));
                }
                slots.remove(index)
            };
            let removed = state.graph.snapshot_slot(&old);
            detach_slot(state, &old);
            state.graph.reindex_list(self.id, index);
            Ok(Mutated::Yes(removed))
        })
    }

    /// Remove the first element structurally equal to `value`. Returns
    /// false when no element matches.
    pub fn remove_item(&self, value: &Value) -> Result<bool> {
        mutate(&self.core, self.id, |state| {
            let current = slots(state, self.id)?.clone();
            let found = current
                .iter()
                .position(|slot| state.graph.snapshot_slot(slot) == *value);
            let index = match found {
                Some(index) => index,
                None => return Ok(Mutated::No(false)),
            };
            let old = slots_mut(state, self.id)?.remove(index);
            detach_slot(state, &old);
            state.graph.reindex_list(self.id, index);
            Ok(Mutated::Yes(true))
        })
    }

    /// Remove and return the last element, or `None` when empty.
    pub fn pop(&self) -> Result<Option<Value>> {
        mutate(&self.core, self.id, |state| {
            let old = match slots_mut(state, self.id)?.pop() {
                Some(slot) => slot,
                None => return Ok(Mutated::No(None)),
            };
            let removed = state.graph.snapshot_slot(&old);
            detach_slot(state, &old);
            Ok(Mutated::Yes(Some(removed)))
        })
    }

    /// Remove all elements, detaching child wrappers.
    pub fn clear(&self) -> Result<()> {
        mutate(&self.core, self.id, |state| {
            let old = {
                let slots = slots_mut(state, self.id)?;
                if slots.is_empty() {
                    return Ok(Mutated::No(()));
                }
                std::mem::take(slots)
            };
            for slot in &old {
                detach_slot(state, slot);
            }
            Ok(Mutated::Yes(()))
        })
    }

    /// Replace `range` with `values` (slice assignment). The range may
    /// be empty and may differ in length from the replacement.
    pub fn splice(
        &self,
        range: Range<usize>,
        values: impl IntoIterator<Item = Value>,
    ) -> Result<()> {
        let values: Vec<Value> = values.into_iter().collect();
        mutate(&self.core, self.id, |state| {
            let len = slots(state, self.id)?.len();
            if range.start > range.end || range.end > len {
                return Err(Error::InvalidOperation(format!(
                    "range {}..{} out of bounds for sequence of length {len}",
                    range.start, range.end
                )));
            }
            let removed: Vec<Slot> = slots_mut(state, self.id)?
                .splice(range.clone(), std::iter::empty())
                .collect();
            for slot in &removed {
                detach_slot(state, slot);
            }
            let start = range.start;
            let fresh: Vec<Slot> = values
                .into_iter()
                .enumerate()
                .map(|(offset, value)| {
                    state.graph.build_slot(
                        value,
                        Some((self.id, Key::Index(start + offset))),
                        true,
                    )
                })
                .collect();
            slots_mut(state, self.id)?.splice(start..start, fresh);
            state.graph.reindex_list(self.id, start);
            Ok(Mutated::Yes(()))
        })
    }

    /// Append every value in order.
    pub fn extend<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Result<()> {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return Ok(());
        }
        mutate(&self.core, self.id, |state| {
            let start = slots(state, self.id)?.len();
            let fresh: Vec<Slot> = values
                .into_iter()
                .enumerate()
                .map(|(offset, value)| {
                    state.graph.build_slot(
                        value,
                        Some((self.id, Key::Index(start + offset))),
                        true,
                    )
                })
                .collect();
            slots_mut(state, self.id)?.extend(fresh);
            Ok(Mutated::Yes(()))
        })
    }

    /// Reverse the order of elements in place.
    pub fn reverse(&self) -> Result<()> {
        mutate(&self.core, self.id, |state| {
            let slots = slots_mut(state, self.id)?;
            if slots.len() < 2 {
                return Ok(Mutated::No(()));
            }
            slots.reverse();
            state.graph.reindex_list(self.id, 0);
            Ok(Mutated::Yes(()))
        })
    }

    /// Sort the elements in place. Only sequences of scalars can be
    /// sorted; the order is total, with variants grouped and NaN
    /// placed deterministically.
    pub fn sort(&self) -> Result<()> {
        mutate(&self.core, self.id, |state| {
            let slots = slots_mut(state, self.id)?;
            if slots.iter().any(|slot| matches!(slot, Slot::Node(_))) {
                return Err(Error::InvalidOperation(
                    "sort requires a sequence of scalars".into(),
                ));
            }
            if slots.len() < 2 {
                return Ok(Mutated::No(()));
            }
            slots.sort_by(|a, b| match (a, b) {
                (Slot::Scalar(x), Slot::Scalar(y)) => x.total_cmp(y),
                _ => unreachable!("checked all-scalar above"),
            });
            Ok(Mutated::Yes(()))
        })
    }
}

impl fmt::Debug for ListRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListRef").field("node", &self.id).finish()
    }
}
