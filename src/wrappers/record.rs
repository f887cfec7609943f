//! Record wrapper.
//!
//! Records stand in for user-defined objects as a tagged variant
//! carrying a field table; field values may be any value, and
//! container-valued fields are wrapped and linked like any other
//! child.

use super::{detach_slot, mutate, resolve_arg, Arg, Mutated, ValueRef};
use crate::error::{Error, Result};
use crate::manager::{Core, EngineState};
use crate::node::{Key, NodeKind, Slot};
use crate::types::NodeId;
use crate::value::Value;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// Handle to a record node.
#[derive(Clone)]
pub struct RecordRef {
    core: Arc<Core>,
    id: NodeId,
}

fn fields<'a>(state: &'a EngineState, id: NodeId) -> Result<&'a FxHashMap<String, Slot>> {
    match &state.graph.node(id).ok_or(Error::Detached)?.kind {
        NodeKind::Record { fields, .. } => Ok(fields),
        other => Err(Error::InvalidOperation(format!(
            "expected Record node, found {}",
            other.variant_name()
        ))),
    }
}

fn fields_mut<'a>(
    state: &'a mut EngineState,
    id: NodeId,
) -> Result<&'a mut FxHashMap<String, Slot>> {
    match &mut state.graph.node_mut(id).ok_or(Error::Detached)?.kind {
        NodeKind::Record { fields, .. } => Ok(fields),
        other => Err(Error::InvalidOperation(format!(
            "expected Record node, found {}",
            other.variant_name()
        ))),
    }
}

impl RecordRef {
    pub(crate) fn new(core: &Arc<Core>, id: NodeId) -> Self {
        RecordRef { core: Arc::clone(core), id }
    }

    pub(crate) fn core(&self) -> &Arc<Core> {
        &self.core
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    /// The record's type tag.
    pub fn name(&self) -> Result<String> {
        let state = self.core.state.lock();
        match &state.graph.node(self.id).ok_or(Error::Detached)?.kind {
            NodeKind::Record { name, .. } => Ok(name.clone()),
            other => Err(Error::InvalidOperation(format!(
                "expected Record node, found {}",
                other.variant_name()
            ))),
        }
    }

    /// Number of fields.
    pub fn len(&self) -> Result<usize> {
        let state = self.core.state.lock();
        fields(&state, self.id).map(|f| f.len())
    }

    /// True when the record has no fields.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// True when the field is present.
    pub fn contains(&self, field: &str) -> Result<bool> {
        let state = self.core.state.lock();
        Ok(fields(&state, self.id)?.contains_key(field))
    }

    /// Value of `field`: a handle for containers, a plain scalar
    /// otherwise.
    pub fn get(&self, field: &str) -> Result<Option<ValueRef>> {
        let state = self.core.state.lock();
        Ok(fields(&state, self.id)?
            .get(field)
            .map(|slot| ValueRef::from_slot(&self.core, &state.graph, slot)))
    }

    /// All field names, in no particular order.
    pub fn field_names(&self) -> Result<Vec<String>> {
        let state = self.core.state.lock();
        Ok(fields(&state, self.id)?.keys().cloned().collect())
    }

    /// Plain deep copy of the record.
    pub fn snapshot(&self) -> Result<Value> {
        let state = self.core.state.lock();
        Ok(state.graph.snapshot_slot(&Slot::Node(self.id)))
    }

    /// Set a field. Replacing a container-valued field detaches the
    /// old child and wraps the new value in place.
    pub fn set(&self, field: impl Into<String>, value: impl Into<Arg>) -> Result<()> {
        let field = field.into();
        let arg = value.into();
        mutate(&self.core, self.id, |state| {
            let slot = resolve_arg(state, &self.core, arg, self.id, Key::Field(field.clone()))?;
            let old = fields_mut(state, self.id)?.insert(field, slot);
            if let Some(old) = old {
                detach_slot(state, &old);
            }
            Ok(Mutated::Yes(()))
        })
    }

    /// Delete a field, detaching a child wrapper. Returns false when
    /// the field was absent.
    pub fn remove(&self, field: &str) -> Result<bool> {
        mutate(&self.core, self.id, |state| {
            match fields_mut(state, self.id)?.remove(field) {
                None => Ok(Mutated::No(false)),
                Some(old) => {
                    detach_slot(state, &old);
                    Ok(Mutated::Yes(true))
                }
            }
        })
    }
}

impl fmt::Debug for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordRef").field("node", &self.id).finish()
    }
}
