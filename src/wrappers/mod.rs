//! Mutation-tracking wrapper handles.
//!
//! Each handle is bound to one node in its manager's value graph and
//! exposes the operations native to that node's variant, mirroring the
//! standard containers so code can move from local to replicated data
//! without changing shape. Reads return handles for child containers
//! and plain scalars for leaves; every mutation marks the node and its
//! ancestors dirty and, outside a transaction, commits immediately as
//! a single-op transaction.
//!
//! Handles stay usable after the node is removed from the live tree,
//! but only for reads: mutating a detached wrapper fails with
//! [`Error::Detached`].

mod buf;
mod list;
mod map;
mod record;
mod set;

pub use buf::BufRef;
pub use list::ListRef;
pub use map::MapRef;
pub use record::RecordRef;
pub use set::SetRef;

use crate::error::{Error, Result};
use crate::manager::{Core, EngineState};
use crate::node::{Graph, Key, NodeKind, Slot};
use crate::types::NodeId;
use crate::value::{Scalar, Value};
use std::sync::Arc;

/// A value being placed into a container: either a plain value that
/// will be adopted and wrapped, or an existing wrapper handle.
///
/// Passing a handle that is still linked elsewhere fails with
/// [`Error::Aliasing`]; a detached handle contributes a deep copy of
/// its local replica.
pub struct Arg {
    inner: ArgInner,
}

enum ArgInner {
    Plain(Value),
    Handle(Arc<Core>, NodeId),
}

impl Arg {
    fn handle(core: &Arc<Core>, id: NodeId) -> Arg {
        Arg { inner: ArgInner::Handle(Arc::clone(core), id) }
    }
}

macro_rules! arg_from_value {
    ($($ty:ty),* $(,)?) => {
        $(impl From<$ty> for Arg {
            fn from(v: $ty) -> Arg {
                Arg { inner: ArgInner::Plain(v.into()) }
            }
        })*
    };
}

arg_from_value!(Value, Scalar, bool, i32, i64, f64, &str, String, crate::value::Record);

impl From<&ListRef> for Arg {
    fn from(v: &ListRef) -> Arg {
        Arg::handle(v.core(), v.id())
    }
}

impl From<&MapRef> for Arg {
    fn from(v: &MapRef) -> Arg {
        Arg::handle(v.core(), v.id())
    }
}

impl From<&SetRef> for Arg {
    fn from(v: &SetRef) -> Arg {
        Arg::handle(v.core(), v.id())
    }
}

impl From<&BufRef> for Arg {
    fn from(v: &BufRef) -> Arg {
        Arg::handle(v.core(), v.id())
    }
}

impl From<&RecordRef> for Arg {
    fn from(v: &RecordRef) -> Arg {
        Arg::handle(v.core(), v.id())
    }
}

impl From<&ValueRef> for Arg {
    fn from(v: &ValueRef) -> Arg {
        match v {
            ValueRef::Scalar(s) => s.clone().into(),
            ValueRef::List(h) => h.into(),
            ValueRef::Map(h) => h.into(),
            ValueRef::Set(h) => h.into(),
            ValueRef::Buf(h) => h.into(),
            ValueRef::Record(h) => h.into(),
        }
    }
}

/// A read result: a plain scalar or a handle to a child container.
#[derive(Debug, Clone)]
pub enum ValueRef {
    /// Leaf scalar, returned by value.
    Scalar(Scalar),
    /// Sequence handle.
    List(ListRef),
    /// Mapping handle.
    Map(MapRef),
    /// Set handle.
    Set(SetRef),
    /// Byte-buffer handle.
    Buf(BufRef),
    /// Record handle.
    Record(RecordRef),
}

impl ValueRef {
    pub(crate) fn from_slot(core: &Arc<Core>, graph: &Graph, slot: &Slot) -> ValueRef {
        match slot {
            Slot::Scalar(s) => ValueRef::Scalar(s.clone()),
            Slot::Node(id) => {
                let node = graph.node(*id).expect("slot points at live arena entry");
                match &node.kind {
                    NodeKind::List(_) => ValueRef::List(ListRef::new(core, *id)),
                    NodeKind::Map(_) => ValueRef::Map(MapRef::new(core, *id)),
                    NodeKind::Set(_) => ValueRef::Set(SetRef::new(core, *id)),
                    NodeKind::Buf(_) => ValueRef::Buf(BufRef::new(core, *id)),
                    NodeKind::Record { .. } => ValueRef::Record(RecordRef::new(core, *id)),
                }
            }
        }
    }

    pub(crate) fn node_handle(&self) -> Option<(&Arc<Core>, NodeId)> {
        match self {
            ValueRef::Scalar(_) => None,
            ValueRef::List(h) => Some((h.core(), h.id())),
            ValueRef::Map(h) => Some((h.core(), h.id())),
            ValueRef::Set(h) => Some((h.core(), h.id())),
            ValueRef::Buf(h) => Some((h.core(), h.id())),
            ValueRef::Record(h) => Some((h.core(), h.id())),
        }
    }

    /// The scalar, if this is a leaf.
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            ValueRef::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// The integer, if this is an integer leaf.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ValueRef::Scalar(Scalar::Int(i)) => Some(*i),
            _ => None,
        }
    }

    /// The string slice, if this is a string leaf.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ValueRef::Scalar(Scalar::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// The sequence handle, if this is a sequence.
    pub fn as_list(&self) -> Option<&ListRef> {
        match self {
            ValueRef::List(h) => Some(h),
            _ => None,
        }
    }

    /// The mapping handle, if this is a mapping.
    pub fn as_map(&self) -> Option<&MapRef> {
        match self {
            ValueRef::Map(h) => Some(h),
            _ => None,
        }
    }

    /// The set handle, if this is a set.
    pub fn as_set(&self) -> Option<&SetRef> {
        match self {
            ValueRef::Set(h) => Some(h),
            _ => None,
        }
    }

    /// The byte-buffer handle, if this is a buffer.
    pub fn as_buf(&self) -> Option<&BufRef> {
        match self {
            ValueRef::Buf(h) => Some(h),
            _ => None,
        }
    }

    /// The record handle, if this is a record.
    pub fn as_record(&self) -> Option<&RecordRef> {
        match self {
            ValueRef::Record(h) => Some(h),
            _ => None,
        }
    }

    /// Plain deep copy of the referenced value.
    pub fn snapshot(&self) -> Result<Value> {
        match self.node_handle() {
            None => match self {
                ValueRef::Scalar(s) => Ok(s.clone().into()),
                _ => unreachable!("non-scalar has a node handle"),
            },
            Some((core, id)) => {
                let state = core.state.lock();
                Ok(state.graph.snapshot_slot(&Slot::Node(id)))
            }
        }
    }
}

/// Result of a mutating closure: whether anything actually changed.
/// No-op mutations skip dirty marking and the implicit commit.
pub(super) enum Mutated<R> {
    Yes(R),
    No(R),
}

pub(super) fn ensure_live(state: &EngineState, id: NodeId) -> Result<()> {
    match state.graph.node(id) {
        Some(node) if !node.detached => Ok(()),
        _ => Err(Error::Detached),
    }
}

/// Shared mutation path: detached check, the operation itself, dirty
/// propagation, then the implicit single-op commit when no transaction
/// is buffering.
pub(super) fn mutate<R>(
    core: &Arc<Core>,
    id: NodeId,
    op: impl FnOnce(&mut EngineState) -> Result<Mutated<R>>,
) -> Result<R> {
    let mut state = core.state.lock();
    ensure_live(&state, id)?;
    match op(&mut state)? {
        Mutated::No(result) => Ok(result),
        Mutated::Yes(result) => {
            let flipped = state.graph.mark_dirty(id)?;
            state.record_flips(&flipped);
            core.autocommit(&mut state)?;
            Ok(result)
        }
    }
}

/// Turn an [`Arg`] into a slot at the given position.
pub(super) fn resolve_arg(
    state: &mut EngineState,
    core: &Arc<Core>,
    arg: Arg,
    parent: NodeId,
    key: Key,
) -> Result<Slot> {
    match arg.inner {
        ArgInner::Plain(value) => Ok(state.graph.build_slot(value, Some((parent, key)), true)),
        ArgInner::Handle(other, id) => {
            if !Arc::ptr_eq(&other, core) {
                return Err(Error::InvalidOperation(
                    "value belongs to a different manager".into(),
                ));
            }
            if state.graph.is_linked(id) {
                return Err(Error::Aliasing);
            }
            // A detached handle contributes a copy of its local replica.
            let value = state.graph.snapshot_slot(&Slot::Node(id));
            Ok(state.graph.build_slot(value, Some((parent, key)), true))
        }
    }
}

pub(super) fn detach_slot(state: &mut EngineState, slot: &Slot) {
    if let Slot::Node(id) = slot {
        state.graph.detach(*id);
    }
}
