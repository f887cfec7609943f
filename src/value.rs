//! Plain value model for cell contents.
//!
//! A [`Value`] is the unwrapped, freely copyable form of a cell's value
//! graph: what `Manager::write` accepts and `Manager::snapshot` returns.
//! [`Scalar`] is the subset that is stored by value and never wrapped;
//! scalars also serve as mapping keys and set elements.
//!
//! ## Equality rules
//!
//! - Different types are never equal (no coercion): `Int(1) != Float(1.0)`,
//!   `String("a") != Bytes([97])`.
//! - Floats use IEEE-754 equality: `NaN != NaN`, `-0.0 == 0.0`. Hashing
//!   normalizes `-0.0` to `0.0` so equal floats hash alike.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

/// A leaf value: stored in place, hashable, usable as a mapping key or
/// set element.
#[derive(Debug, Clone)]
pub enum Scalar {
    /// Absence of a value.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit IEEE-754 float.
    Float(f64),
    /// UTF-8 string.
    Str(String),
}

impl Scalar {
    /// Type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Null => "Null",
            Scalar::Bool(_) => "Bool",
            Scalar::Int(_) => "Int",
            Scalar::Float(_) => "Float",
            Scalar::Str(_) => "Str",
        }
    }

    /// Total order over scalars, used when sorting sequences.
    ///
    /// Orders by variant first, then by value; floats use
    /// `f64::total_cmp` so NaN sorts deterministically.
    pub fn total_cmp(&self, other: &Scalar) -> Ordering {
        fn rank(s: &Scalar) -> u8 {
            match s {
                Scalar::Null => 0,
                Scalar::Bool(_) => 1,
                Scalar::Int(_) => 2,
                Scalar::Float(_) => 3,
                Scalar::Str(_) => 4,
            }
        }
        match (self, other) {
            (Scalar::Bool(a), Scalar::Bool(b)) => a.cmp(b),
            (Scalar::Int(a), Scalar::Int(b)) => a.cmp(b),
            (Scalar::Float(a), Scalar::Float(b)) => a.total_cmp(b),
            (Scalar::Str(a), Scalar::Str(b)) => a.cmp(b),
            _ => rank(self).cmp(&rank(other)),
        }
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Scalar::Null, Scalar::Null) => true,
            (Scalar::Bool(a), Scalar::Bool(b)) => a == b,
            (Scalar::Int(a), Scalar::Int(b)) => a == b,
            // IEEE-754 equality: NaN != NaN, -0.0 == 0.0
            (Scalar::Float(a), Scalar::Float(b)) => a == b,
            (Scalar::Str(a), Scalar::Str(b)) => a == b,
            _ => false,
        }
    }
}

// Follows IEEE-754 semantics where NaN != NaN; callers storing NaN keys
// accept that those keys are unreachable by lookup.
impl Eq for Scalar {}

impl Hash for Scalar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Scalar::Null => {}
            Scalar::Bool(b) => b.hash(state),
            Scalar::Int(i) => i.hash(state),
            Scalar::Float(f) => {
                // -0.0 and 0.0 compare equal, so they must hash alike.
                if *f == 0.0 {
                    0u64.hash(state);
                } else {
                    f.to_bits().hash(state);
                }
            }
            Scalar::Str(s) => s.hash(state),
        }
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Int(v as i64)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Str(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Str(v)
    }
}

/// A record value: a named-field container standing in for a
/// user-defined object. Fields hold arbitrary values.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Type tag carried through the codec.
    pub name: String,
    /// Field table.
    pub fields: HashMap<String, Value>,
}

impl Record {
    /// Create an empty record with the given type tag.
    pub fn new(name: impl Into<String>) -> Self {
        Record { name: name.into(), fields: HashMap::new() }
    }

    /// Set a field, returning self for chaining.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }
}

/// Plain form of a value graph.
///
/// The five container variants (`Bytes`, `List`, `Map`, `Set`, `Record`)
/// become wrapper nodes when linked into a manager's live tree; scalars
/// stay plain.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absence of a value.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit IEEE-754 float.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Mutable byte buffer.
    Bytes(Vec<u8>),
    /// Ordered sequence.
    List(Vec<Value>),
    /// Scalar-keyed mapping.
    Map(HashMap<Scalar, Value>),
    /// Unordered collection of scalars.
    Set(HashSet<Scalar>),
    /// Named-field container.
    Record(Record),
}

impl Value {
    /// Type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Bytes(_) => "Bytes",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Set(_) => "Set",
            Value::Record(_) => "Record",
        }
    }

    /// True for the variants that become wrapper nodes when linked.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            Value::Bytes(_) | Value::List(_) | Value::Map(_) | Value::Set(_) | Value::Record(_)
        )
    }

    /// The scalar form of this value, if it has one.
    pub fn as_scalar(&self) -> Option<Scalar> {
        match self {
            Value::Null => Some(Scalar::Null),
            Value::Bool(b) => Some(Scalar::Bool(*b)),
            Value::Int(i) => Some(Scalar::Int(*i)),
            Value::Float(f) => Some(Scalar::Float(*f)),
            Value::String(s) => Some(Scalar::Str(s.clone())),
            _ => None,
        }
    }

    /// Try to get as i64.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as list slice.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Try to get as map reference.
    pub fn as_map(&self) -> Option<&HashMap<Scalar, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Build a map value from string keys, the common case.
    pub fn map_of<V: Into<Value>>(entries: impl IntoIterator<Item = (&'static str, V)>) -> Value {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (Scalar::Str(k.to_string()), v.into()))
                .collect(),
        )
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        match s {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(b),
            Scalar::Int(i) => Value::Int(i),
            Scalar::Float(f) => Value::Float(f),
            Scalar::Str(s) => Value::String(s),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Value::Record(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(s: &Scalar) -> u64 {
        let mut h = DefaultHasher::new();
        s.hash(&mut h);
        h.finish()
    }

    #[test]
    fn no_type_coercion() {
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::Bool(false), Value::Int(0));
        assert_ne!(Value::String("abc".into()), Value::Bytes(vec![97, 98, 99]));
        assert_ne!(Value::Null, Value::Int(0));
    }

    #[test]
    fn float_equality_is_ieee() {
        assert_ne!(Scalar::Float(f64::NAN), Scalar::Float(f64::NAN));
        assert_eq!(Scalar::Float(-0.0), Scalar::Float(0.0));
    }

    #[test]
    fn negative_zero_hashes_like_zero() {
        assert_eq!(hash_of(&Scalar::Float(-0.0)), hash_of(&Scalar::Float(0.0)));
    }

    #[test]
    fn scalar_total_order() {
        let mut xs = vec![
            Scalar::Str("b".into()),
            Scalar::Int(2),
            Scalar::Null,
            Scalar::Float(1.5),
            Scalar::Int(-1),
            Scalar::Bool(true),
        ];
        xs.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(
            xs,
            vec![
                Scalar::Null,
                Scalar::Bool(true),
                Scalar::Int(-1),
                Scalar::Int(2),
                Scalar::Float(1.5),
                Scalar::Str("b".into()),
            ]
        );
    }

    #[test]
    fn map_of_builds_string_keys() {
        let v = Value::map_of([("count", 0i64)]);
        let m = v.as_map().unwrap();
        assert_eq!(m.get(&Scalar::Str("count".into())), Some(&Value::Int(0)));
    }

    #[test]
    fn record_builder() {
        let r = Record::new("point").with("x", 1i64).with("y", 2i64);
        assert_eq!(r.fields.len(), 2);
        assert_eq!(r.name, "point");
    }
}
