//! Byte-buffer wrapper.

use super::{mutate, Mutated};
use crate::error::{Error, Result};
use crate::manager::{Core, EngineState};
use crate::node::{NodeKind, Slot};
use crate::types::NodeId;
use crate::value::Value;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// Handle to a mutable byte-buffer node.
#[derive(Clone)]
pub struct BufRef {
    core: Arc<Core>,
    id: NodeId,
}

fn bytes<'a>(state: &'a EngineState, id: NodeId) -> Result<&'a Vec<u8>> {
    match &state.graph.node(id).ok_or(Error::Detached)?.kind {
        NodeKind::Buf(bytes) => Ok(bytes),
        other => Err(Error::InvalidOperation(format!(
            "expected Bytes node, found {}",
            other.variant_name()
        ))),
    }
}

fn bytes_mut<'a>(state: &'a mut EngineState, id: NodeId) -> Result<&'a mut Vec<u8>> {
    match &mut state.graph.node_mut(id).ok_or(Error::Detached)?.kind {
        NodeKind::Buf(bytes) => Ok(bytes),
        other => Err(Error::InvalidOperation(format!(
            "expected Bytes node, found {}",
            other.variant_name()
        ))),
    }
}

impl BufRef {
    pub(crate) fn new(core: &Arc<Core>, id: NodeId) -> Self {
        BufRef { core: Arc::clone(core), id }
    }

    pub(crate) fn core(&self) -> &Arc<Core> {
        &self.core
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    /// Buffer length in bytes.
    pub fn len(&self) -> Result<usize> {
        let state = self.core.state.lock();
        bytes(&state, self.id).map(|b| b.len())
    }

    /// True when the buffer is empty.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Byte at `index`.
    pub fn get(&self, index: usize) -> Result<Option<u8>> {
        let state = self.core.state.lock();
        Ok(bytes(&state, self.id)?.get(index).copied())
    }

    /// Copy of the whole buffer.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let state = self.core.state.lock();
        bytes(&state, self.id).map(|b| b.clone())
    }

    /// Plain deep copy as a value.
    pub fn snapshot(&self) -> Result<Value> {
        let state = self.core.state.lock();
        Ok(state.graph.snapshot_slot(&Slot::Node(self.id)))
    }

    /// Overwrite the byte at `index`.
    pub fn set(&self, index: usize, byte: u8) -> Result<()> {
        mutate(&self.core, self.id, |state| {
            let buf = bytes_mut(state, self.id)?;
            match buf.get_mut(index) {
                Some(slot) => {
                    if *slot == byte {
                        return Ok(Mutated::No(()));
                    }
                    *slot = byte;
                    Ok(Mutated::Yes(()))
                }
                None => Err(Error::InvalidOperation(format!(
                    "index {index} out of range for buffer of length {}",
                    buf.len()
                ))),
            }
        })
    }

    /// Append one byte.
    pub fn push(&self, byte: u8) -> Result<()> {
        mutate(&self.core, self.id, |state| {
            bytes_mut(state, self.id)?.push(byte);
            Ok(Mutated::Yes(()))
        })
    }

    /// Append a slice.
    pub fn extend_from_slice(&self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        mutate(&self.core, self.id, |state| {
            bytes_mut(state, self.id)?.extend_from_slice(data);
            Ok(Mutated::Yes(()))
        })
    }

    /// Shorten the buffer to at most `len` bytes.
    pub fn truncate(&self, len: usize) -> Result<()> {
        mutate(&self.core, self.id, |state| {
            let buf = bytes_mut(state, self.id)?;
            if len >= buf.len() {
                return Ok(Mutated::No(()));
            }
            buf.truncate(len);
            Ok(Mutated::Yes(()))
        })
    }

    /// Replace `range` with `data` (slice assignment); lengths may
    /// differ.
    pub fn splice(&self, range: Range<usize>, data: &[u8]) -> Result<()> {
        mutate(&self.core, self.id, |state| {
            let buf = bytes_mut(state, self.id)?;
            if range.start > range.end || range.end > buf.len() {
                return Err(Error::InvalidOperation(format!(
                    "range {}..{} out of bounds for buffer of length {}",
                    range.start,
                    range.end,
                    buf.len()
                )));
            }
            buf.splice(range, data.iter().copied());
            Ok(Mutated::Yes(()))
        })
    }
}

impl fmt::Debug for BufRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufRef").field("node", &self.id).finish()
    }
}
