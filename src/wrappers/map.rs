//! Mapping wrapper.

use super::{detach_slot, mutate, resolve_arg, Arg, Mutated, ValueRef};
use crate::error::{Error, Result};
use crate::manager::{Core, EngineState};
use crate::node::{Key, NodeKind, Slot};
use crate::types::NodeId;
use crate::value::{Scalar, Value};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// Handle to a mapping node. Keys are scalars.
#[derive(Clone)]
pub struct MapRef {
    core: Arc<Core>,
    id: NodeId,
}

fn entries<'a>(state: &'a EngineState, id: NodeId) -> Result<&'a FxHashMap<Scalar, Slot>> {
    match &state.graph.node(id).ok_or(Error::Detached)?.kind {
        NodeKind::Map(map) => Ok(map),
        other => Err(Error::InvalidOperation(format!(
            "expected Map node, found {}",
            other.variant_name()
        ))),
    }
}

fn entries_mut<'a>(
    state: &'a mut EngineState,
    id: NodeId,
) -> Result<&'a mut FxHashMap<Scalar, Slot>> {
    match &mut state.graph.node_mut(id).ok_or(Error::Detached)?.kind {
        NodeKind::Map(map) => Ok(map),
        other => Err(Error::InvalidOperation(format!(
            "expected Map node, found {}",
            other.variant_name()
        ))),
    }
}

impl MapRef {
    pub(crate) fn new(core: &Arc<Core>, id: NodeId) -> Self {
        MapRef { core: Arc::clone(core), id }
    }

    pub(crate) fn core(&self) -> &Arc<Core> {
        &self.core
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    /// Number of entries.
    pub fn len(&self) -> Result<usize> {
        let state = self.core.state.lock();
        entries(&state, self.id).map(|m| m.len())
    }

    /// True when the mapping is empty.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// True when the key is present.
    pub fn contains_key(&self, key: impl Into<Scalar>) -> Result<bool> {
        let key = key.into();
        let state = self.core.state.lock();
        Ok(entries(&state, self.id)?.contains_key(&key))
    }

    /// Value under `key`: a handle for containers, a plain scalar
    /// otherwise.
    pub fn get(&self, key: impl Into<Scalar>) -> Result<Option<ValueRef>> {
        let key = key.into();
        let state = self.core.state.lock();
        Ok(entries(&state, self.id)?
            .get(&key)
            .map(|slot| ValueRef::from_slot(&self.core, &state.graph, slot)))
    }

    /// All keys, in no particular order.
    pub fn keys(&self) -> Result<Vec<Scalar>> {
        let state = self.core.state.lock();
        Ok(entries(&state, self.id)?.keys().cloned().collect())
    }

    /// All entries, as a point-in-time listing.
    pub fn items(&self) -> Result<Vec<(Scalar, ValueRef)>> {
        let state = self.core.state.lock();
        Ok(entries(&state, self.id)?
            .iter()
            .map(|(k, slot)| (k.clone(), ValueRef::from_slot(&self.core, &state.graph, slot)))
            .collect())
    }

    /// Plain deep copy of the mapping.
    pub fn snapshot(&self) -> Result<Value> {
        let state = self.core.state.lock();
        Ok(state.graph.snapshot_slot(&Slot::Node(self.id)))
    }

    /// Set `key` to `value`. Replacing a child wrapper detaches it.
    pub fn insert(&self, key: impl Into<Scalar>, value: impl Into<Arg>) -> Result<()> {
        let key = key.into();
        let arg = value.into();
        mutate(&self.core, self.id, |state| {
            let slot = resolve_arg(state, &self.core, arg, self.id, Key::Entry(key.clone()))?;
            let old = entries_mut(state, self.id)?.insert(key, slot);
            if let Some(old) = old {
                detach_slot(state, &old);
            }
            Ok(Mutated::Yes(()))
        })
    }

    /// Remove `key`, detaching a child wrapper. Returns false when the
    /// key was absent.
    pub fn remove(&self, key: impl Into<Scalar>) -> Result<bool> {
        let key = key.into();
        mutate(&self.core, self.id, |state| {
            match entries_mut(state, self.id)?.remove(&key) {
                None => Ok(Mutated::No(false)),
                Some(old) => {
                    detach_slot(state, &old);
                    Ok(Mutated::Yes(true))
                }
            }
        })
    }

    /// Remove all entries, detaching child wrappers.
    pub fn clear(&self) -> Result<()> {
        mutate(&self.core, self.id, |state| {
            let old = {
                let map = entries_mut(state, self.id)?;
                if map.is_empty() {
                    return Ok(Mutated::No(()));
                }
                std::mem::take(map)
            };
            for slot in old.values() {
                detach_slot(state, slot);
            }
            Ok(Mutated::Yes(()))
        })
    }

    /// Bulk update: set every entry in order.
    pub fn extend<K: Into<Scalar>, V: Into<Value>>(
        &self,
        new_entries: impl IntoIterator<Item = (K, V)>,
    ) -> Result<()> {
        let new_entries: Vec<(Scalar, Value)> = new_entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        if new_entries.is_empty() {
            return Ok(());
        }
        mutate(&self.core, self.id, |state| {
            for (key, value) in new_entries {
                let slot =
                    state
                        .graph
                        .build_slot(value, Some((self.id, Key::Entry(key.clone()))), true);
                let old = entries_mut(state, self.id)?.insert(key, slot);
                if let Some(old) = old {
                    detach_slot(state, &old);
                }
            }
            Ok(Mutated::Yes(()))
        })
    }
}

impl fmt::Debug for MapRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapRef").field("node", &self.id).finish()
    }
}
