//! Arena of value-graph nodes.
//!
//! The live tree is stored as an arena indexed by [`NodeId`]; parent
//! links are back-edges (id + key), never owning references, so wrapper
//! handles can reach the root in O(depth) while the manager owns all
//! the data. Scalars are stored inline in their parent's slot and never
//! get a node.
//!
//! Detached nodes stay in the arena with their last contents so user
//! handles can still read them; the detached flag, once set, never
//! clears.

use crate::error::{Error, Result};
use crate::types::NodeId;
use crate::value::{Record, Scalar, Value};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::{HashMap, HashSet};

/// One position in a container: an inline scalar or a child node.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Slot {
    Scalar(Scalar),
    Node(NodeId),
}

/// The key under which a node sits in its parent.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Key {
    Index(usize),
    Entry(Scalar),
    Field(String),
}

/// Variant payload of a node.
#[derive(Debug)]
pub(crate) enum NodeKind {
    List(Vec<Slot>),
    Map(FxHashMap<Scalar, Slot>),
    Set(FxHashSet<Scalar>),
    Buf(Vec<u8>),
    Record { name: String, fields: FxHashMap<String, Slot> },
}

impl NodeKind {
    pub(crate) fn variant_name(&self) -> &'static str {
        match self {
            NodeKind::List(_) => "List",
            NodeKind::Map(_) => "Map",
            NodeKind::Set(_) => "Set",
            NodeKind::Buf(_) => "Bytes",
            NodeKind::Record { .. } => "Record",
        }
    }

    fn child_ids(&self) -> Vec<NodeId> {
        match self {
            NodeKind::List(slots) => slots.iter().filter_map(Slot::node_id).collect(),
            NodeKind::Map(map) => map.values().filter_map(Slot::node_id).collect(),
            NodeKind::Record { fields, .. } => {
                fields.values().filter_map(Slot::node_id).collect()
            }
            NodeKind::Set(_) | NodeKind::Buf(_) => Vec::new(),
        }
    }
}

impl Slot {
    fn node_id(&self) -> Option<NodeId> {
        match self {
            Slot::Node(id) => Some(*id),
            Slot::Scalar(_) => None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<(NodeId, Key)>,
    pub(crate) dirty: bool,
    pub(crate) detached: bool,
}

/// The arena plus the root slot.
#[derive(Debug, Default)]
pub(crate) struct Graph {
    nodes: FxHashMap<u64, Node>,
    next: u64,
    pub(crate) root: Option<Slot>,
}

impl Graph {
    pub(crate) fn new() -> Self {
        Graph::default()
    }

    pub(crate) fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id.0)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id.0)
    }

    fn alloc(&mut self, parent: Option<(NodeId, Key)>, dirty: bool) -> NodeId {
        self.next += 1;
        let id = NodeId(self.next);
        self.nodes.insert(
            id.0,
            Node { kind: NodeKind::Buf(Vec::new()), parent, dirty, detached: false },
        );
        id
    }

    /// Adopt a plain value at a position, building nodes for every
    /// container in it. `dirty` is true for user mutations, false when
    /// the tree comes from the backend.
    pub(crate) fn build_slot(
        &mut self,
        value: Value,
        parent: Option<(NodeId, Key)>,
        dirty: bool,
    ) -> Slot {
        match value {
            Value::Null => Slot::Scalar(Scalar::Null),
            Value::Bool(b) => Slot::Scalar(Scalar::Bool(b)),
            Value::Int(i) => Slot::Scalar(Scalar::Int(i)),
            Value::Float(f) => Slot::Scalar(Scalar::Float(f)),
            Value::String(s) => Slot::Scalar(Scalar::Str(s)),
            Value::Bytes(b) => {
                let id = self.alloc(parent, dirty);
                self.node_mut(id).expect("fresh node").kind = NodeKind::Buf(b);
                Slot::Node(id)
            }
            Value::List(items) => {
                let id = self.alloc(parent, dirty);
                let slots: Vec<Slot> = items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| self.build_slot(item, Some((id, Key::Index(i))), dirty))
                    .collect();
                self.node_mut(id).expect("fresh node").kind = NodeKind::List(slots);
                Slot::Node(id)
            }
            Value::Map(entries) => {
                let id = self.alloc(parent, dirty);
                let map: FxHashMap<Scalar, Slot> = entries
                    .into_iter()
                    .map(|(k, v)| {
                        let slot = self.build_slot(v, Some((id, Key::Entry(k.clone()))), dirty);
                        (k, slot)
                    })
                    .collect();
                self.node_mut(id).expect("fresh node").kind = NodeKind::Map(map);
                Slot::Node(id)
            }
            Value::Set(items) => {
                let id = self.alloc(parent, dirty);
                self.node_mut(id).expect("fresh node").kind =
                    NodeKind::Set(items.into_iter().collect());
                Slot::Node(id)
            }
            Value::Record(rec) => {
                let id = self.alloc(parent, dirty);
                let fields: FxHashMap<String, Slot> = rec
                    .fields
                    .into_iter()
                    .map(|(k, v)| {
                        let slot = self.build_slot(v, Some((id, Key::Field(k.clone()))), dirty);
                        (k, slot)
                    })
                    .collect();
                self.node_mut(id).expect("fresh node").kind =
                    NodeKind::Record { name: rec.name, fields };
                Slot::Node(id)
            }
        }
    }

    /// Replace the root with a freshly adopted value, detaching any
    /// previous tree.
    pub(crate) fn set_root(&mut self, value: Value, dirty: bool) {
        if let Some(Slot::Node(old)) = self.root.take() {
            self.detach(old);
        }
        let slot = self.build_slot(value, None, dirty);
        self.root = Some(slot);
    }

    /// Deep copy of a slot as a plain value.
    pub(crate) fn snapshot_slot(&self, slot: &Slot) -> Value {
        match slot {
            Slot::Scalar(s) => s.clone().into(),
            Slot::Node(id) => {
                let node = self.node(*id).expect("slot points at live arena entry");
                match &node.kind {
                    NodeKind::Buf(b) => Value::Bytes(b.clone()),
                    NodeKind::List(slots) => {
                        Value::List(slots.iter().map(|s| self.snapshot_slot(s)).collect())
                    }
                    NodeKind::Map(map) => Value::Map(
                        map.iter()
                            .map(|(k, v)| (k.clone(), self.snapshot_slot(v)))
                            .collect::<HashMap<_, _>>(),
                    ),
                    NodeKind::Set(items) => {
                        Value::Set(items.iter().cloned().collect::<HashSet<_>>())
                    }
                    NodeKind::Record { name, fields } => Value::Record(Record {
                        name: name.clone(),
                        fields: fields
                            .iter()
                            .map(|(k, v)| (k.clone(), self.snapshot_slot(v)))
                            .collect(),
                    }),
                }
            }
        }
    }

    pub(crate) fn snapshot_root(&self) -> Option<Value> {
        self.root.as_ref().map(|slot| self.snapshot_slot(slot))
    }

    /// Clear the subtree root's link and set the detached flag on every
    /// node in the subtree.
    pub(crate) fn detach(&mut self, id: NodeId) {
        if let Some(node) = self.node_mut(id) {
            node.parent = None;
        }
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            let children = match self.nodes.get_mut(&cur.0) {
                Some(node) if !node.detached => {
                    node.detached = true;
                    node.kind.child_ids()
                }
                _ => continue,
            };
            stack.extend(children);
        }
    }

    /// True iff the chain of parent links from `id` reaches the root.
    pub(crate) fn is_linked(&self, id: NodeId) -> bool {
        let mut cur = id;
        loop {
            let node = match self.node(cur) {
                Some(n) if !n.detached => n,
                _ => return false,
            };
            match &node.parent {
                Some((parent, _)) => cur = *parent,
                None => return self.root == Some(Slot::Node(cur)),
            }
        }
    }

    /// Set the dirty flag on `id` and every ancestor up to the root or
    /// the first already-dirty ancestor. Returns the ids that were
    /// flipped, for transaction-frame bookkeeping.
    ///
    /// Fails with [`Error::Detached`] if the wrapper is no longer
    /// linked.
    pub(crate) fn mark_dirty(&mut self, id: NodeId) -> Result<Vec<NodeId>> {
        match self.node(id) {
            Some(node) if !node.detached => {}
            _ => return Err(Error::Detached),
        }

        let mut flipped = Vec::new();
        let mut cur = id;
        loop {
            let node = self.node_mut(cur).expect("parent chain stays in arena");
            if node.dirty {
                break;
            }
            node.dirty = true;
            flipped.push(cur);
            match &node.parent {
                Some((parent, _)) => cur = *parent,
                None => break,
            }
        }
        Ok(flipped)
    }

    /// Drop all dirty flags; runs after a successful commit.
    pub(crate) fn clear_dirty(&mut self) {
        for node in self.nodes.values_mut() {
            node.dirty = false;
        }
    }

    /// True if the root node carries uncommitted mutations. A scalar
    /// root is tracked by the engine's root-replaced flag instead.
    pub(crate) fn root_dirty(&self) -> bool {
        match &self.root {
            Some(Slot::Node(id)) => self.node(*id).map(|n| n.dirty).unwrap_or(false),
            _ => false,
        }
    }

    /// Re-key list children from `from` onward after an insert or
    /// remove shifted later siblings.
    pub(crate) fn reindex_list(&mut self, id: NodeId, from: usize) {
        let shifted: Vec<(usize, NodeId)> = match self.node(id) {
            Some(Node { kind: NodeKind::List(slots), .. }) => slots
                .iter()
                .enumerate()
                .skip(from)
                .filter_map(|(i, slot)| slot.node_id().map(|child| (i, child)))
                .collect(),
            _ => return,
        };
        for (i, child) in shifted {
            if let Some(node) = self.node_mut(child) {
                node.parent = Some((id, Key::Index(i)));
            }
        }
    }

    /// Rebuild the tree from a freshly decoded value, keeping the
    /// `NodeId` of every node whose path and variant survive so
    /// outstanding user handles remain valid. Everything that no longer
    /// has a position is detached. The resulting tree is clean.
    pub(crate) fn reconcile(&mut self, value: Value) {
        let old = self.root.take();
        let root = self.reconcile_slot(old, value, None);
        self.root = Some(root);
    }

    /// Drop the tree entirely (the cell became empty); the old tree is
    /// detached for any handles still holding it.
    pub(crate) fn clear_root(&mut self) {
        if let Some(Slot::Node(old)) = self.root.take() {
            self.detach(old);
        }
    }

    fn reconcile_slot(
        &mut self,
        old: Option<Slot>,
        new: Value,
        parent: Option<(NodeId, Key)>,
    ) -> Slot {
        if let Some(scalar) = new.as_scalar() {
            if let Some(Slot::Node(id)) = old {
                self.detach(id);
            }
            return Slot::Scalar(scalar);
        }

        let reusable = match &old {
            Some(Slot::Node(id)) => {
                let node = self.node(*id).expect("old slot points at live arena entry");
                matches!(
                    (&node.kind, &new),
                    (NodeKind::List(_), Value::List(_))
                        | (NodeKind::Map(_), Value::Map(_))
                        | (NodeKind::Set(_), Value::Set(_))
                        | (NodeKind::Buf(_), Value::Bytes(_))
                        | (NodeKind::Record { .. }, Value::Record(_))
                )
            }
            _ => false,
        };

        if !reusable {
            if let Some(Slot::Node(id)) = old {
                self.detach(id);
            }
            return self.build_slot(new, parent, false);
        }

        let id = match old {
            Some(Slot::Node(id)) => id,
            _ => unreachable!("reusable implies an old node"),
        };
        let old_kind = {
            let node = self.node_mut(id).expect("reused node");
            node.parent = parent;
            node.dirty = false;
            std::mem::replace(&mut node.kind, NodeKind::Buf(Vec::new()))
        };

        let kind = match (old_kind, new) {
            (NodeKind::List(mut old_slots), Value::List(items)) => {
                let keep = items.len().min(old_slots.len());
                for slot in old_slots.drain(keep..).collect::<Vec<_>>() {
                    if let Slot::Node(child) = slot {
                        self.detach(child);
                    }
                }
                let mut old_iter = old_slots.into_iter();
                let slots: Vec<Slot> = items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| {
                        let prev = old_iter.next();
                        self.reconcile_slot(prev, item, Some((id, Key::Index(i))))
                    })
                    .collect();
                NodeKind::List(slots)
            }
            (NodeKind::Map(mut old_map), Value::Map(entries)) => {
                let map: FxHashMap<Scalar, Slot> = entries
                    .into_iter()
                    .map(|(k, v)| {
                        let prev = old_map.remove(&k);
                        let slot = self.reconcile_slot(prev, v, Some((id, Key::Entry(k.clone()))));
                        (k, slot)
                    })
                    .collect();
                for slot in old_map.into_values() {
                    if let Slot::Node(child) = slot {
                        self.detach(child);
                    }
                }
                NodeKind::Map(map)
            }
            (NodeKind::Set(_), Value::Set(items)) => NodeKind::Set(items.into_iter().collect()),
            (NodeKind::Buf(_), Value::Bytes(bytes)) => NodeKind::Buf(bytes),
            (NodeKind::Record { fields: mut old_fields, .. }, Value::Record(rec)) => {
                let fields: FxHashMap<String, Slot> = rec
                    .fields
                    .into_iter()
                    .map(|(k, v)| {
                        let prev = old_fields.remove(&k);
                        let slot = self.reconcile_slot(prev, v, Some((id, Key::Field(k.clone()))));
                        (k, slot)
                    })
                    .collect();
                for slot in old_fields.into_values() {
                    if let Slot::Node(child) = slot {
                        self.detach(child);
                    }
                }
                NodeKind::Record { name: rec.name, fields }
            }
            _ => unreachable!("variant match checked above"),
        };

        self.node_mut(id).expect("reused node").kind = kind;
        Slot::Node(id)
    }
}
