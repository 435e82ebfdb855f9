//! Input value model for loosely-typed message envelopes.
//!
//! Envelopes produced by messaging protocol libraries mix primitives,
//! 64-bit integer wrappers, binary buffers, dates and shared (possibly
//! cyclic) object references. This module models them as a closed sum
//! type so the canonicalizer can dispatch on an explicit discriminant.
//!
//! ## Identity
//!
//! Mappings live in a [`ValueGraph`] arena and are referenced through
//! [`NodeId`] handles. Two handles to the same node are the *same* object;
//! two nodes with equal contents are *distinct* objects. Cycles are formed
//! by storing a mapping's handle somewhere below itself.
//!
//! Sequences are owned inline, so every cycle passes through a mapping.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Handle to a mapping stored in a [`ValueGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in its arena.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// 64-bit integer wrapper split into two signed 32-bit halves.
///
/// This is the shape protocol libraries use to carry 64-bit protobuf
/// fields through a host whose native number is an IEEE double.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Int64 {
    /// Low 32 bits.
    pub low: i32,
    /// High 32 bits.
    pub high: i32,
    /// Whether the value is interpreted as unsigned.
    pub unsigned: bool,
}

const TWO_PWR_32: f64 = 4_294_967_296.0;

impl Int64 {
    /// Build from raw halves.
    pub fn new(low: i32, high: i32, unsigned: bool) -> Self {
        Self { low, high, unsigned }
    }

    /// Split a signed value.
    pub fn from_i64(value: i64) -> Self {
        Self {
            low: value as i32,
            high: (value >> 32) as i32,
            unsigned: false,
        }
    }

    /// Split an unsigned value.
    pub fn from_u64(value: u64) -> Self {
        Self {
            low: value as u32 as i32,
            high: (value >> 32) as u32 as i32,
            unsigned: true,
        }
    }

    /// Nearest double to the arithmetic value.
    ///
    /// Lossy: magnitudes above 2^53 - 1 are rounded.
    pub fn to_f64(&self) -> f64 {
        let low = self.low as u32 as f64;
        if self.unsigned {
            (self.high as u32 as f64) * TWO_PWR_32 + low
        } else {
            (self.high as f64) * TWO_PWR_32 + low
        }
    }

    /// Exact arithmetic value.
    pub fn to_i128(&self) -> i128 {
        let low = self.low as u32 as i128;
        if self.unsigned {
            ((self.high as u32 as i128) << 32) | low
        } else {
            ((self.high as i128) << 32) + low
        }
    }
}

impl From<i64> for Int64 {
    fn from(value: i64) -> Self {
        Self::from_i64(value)
    }
}

impl From<u64> for Int64 {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

/// Origin type of a binary value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BinaryKind {
    /// Platform byte buffer.
    Buffer,
    /// `Uint8Array`.
    Uint8Array,
    /// `Uint8ClampedArray`.
    Uint8ClampedArray,
    /// `Int8Array`.
    Int8Array,
    /// `Uint16Array`.
    Uint16Array,
    /// `Int16Array`.
    Int16Array,
    /// `Uint32Array`.
    Uint32Array,
    /// `Int32Array`.
    Int32Array,
    /// `Float32Array`.
    Float32Array,
    /// `Float64Array`.
    Float64Array,
    /// `BigInt64Array`.
    BigInt64Array,
    /// `BigUint64Array`.
    BigUint64Array,
    /// Scalar-access view; not treated as a byte sequence.
    DataView,
    /// Raw backing store; not treated as a byte sequence.
    ArrayBuffer,
    /// Any other named view type (e.g. a subclass).
    Other(String),
}

impl BinaryKind {
    /// Name recorded in the binary payload descriptor.
    pub fn type_name(&self) -> &str {
        match self {
            Self::Buffer => "Buffer",
            Self::Uint8Array => "Uint8Array",
            Self::Uint8ClampedArray => "Uint8ClampedArray",
            Self::Int8Array => "Int8Array",
            Self::Uint16Array => "Uint16Array",
            Self::Int16Array => "Int16Array",
            Self::Uint32Array => "Uint32Array",
            Self::Int32Array => "Int32Array",
            Self::Float32Array => "Float32Array",
            Self::Float64Array => "Float64Array",
            Self::BigInt64Array => "BigInt64Array",
            Self::BigUint64Array => "BigUint64Array",
            Self::DataView => "DataView",
            Self::ArrayBuffer => "ArrayBuffer",
            Self::Other(name) => name.as_str(),
        }
    }

    /// Parse a type name; unknown names map to [`BinaryKind::Other`].
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "Buffer" => Self::Buffer,
            "Uint8Array" => Self::Uint8Array,
            "Uint8ClampedArray" => Self::Uint8ClampedArray,
            "Int8Array" => Self::Int8Array,
            "Uint16Array" => Self::Uint16Array,
            "Int16Array" => Self::Int16Array,
            "Uint32Array" => Self::Uint32Array,
            "Int32Array" => Self::Int32Array,
            "Float32Array" => Self::Float32Array,
            "Float64Array" => Self::Float64Array,
            "BigInt64Array" => Self::BigInt64Array,
            "BigUint64Array" => Self::BigUint64Array,
            "DataView" => Self::DataView,
            "ArrayBuffer" => Self::ArrayBuffer,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether values of this kind encode as a byte sequence.
    ///
    /// `DataView` and `ArrayBuffer` fall through to the generic-object rule.
    pub fn is_byte_sequence(&self) -> bool {
        !matches!(self, Self::DataView | Self::ArrayBuffer)
    }
}

impl fmt::Display for BinaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Capability of exposing a byte window over a backing store.
pub trait AsBytes {
    /// Offset of the window into the backing store.
    fn byte_offset(&self) -> usize;

    /// Length of the window.
    fn byte_length(&self) -> usize;

    /// The entire backing store.
    fn backing_bytes(&self) -> &[u8];

    /// Bytes inside the window, clamped to the backing store.
    fn as_bytes(&self) -> &[u8] {
        let backing = self.backing_bytes();
        let start = self.byte_offset().min(backing.len());
        let end = start.saturating_add(self.byte_length()).min(backing.len());
        &backing[start..end]
    }
}

/// A typed view over a shared byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryView {
    kind: BinaryKind,
    backing: Arc<[u8]>,
    byte_offset: usize,
    byte_length: usize,
}

impl BinaryView {
    /// View covering all of `bytes`.
    pub fn new(kind: BinaryKind, bytes: impl Into<Vec<u8>>) -> Self {
        let backing: Arc<[u8]> = Arc::from(bytes.into());
        let byte_length = backing.len();
        Self { kind, backing, byte_offset: 0, byte_length }
    }

    /// Platform buffer covering all of `bytes`.
    pub fn buffer(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(BinaryKind::Buffer, bytes)
    }

    /// `Uint8Array` covering all of `bytes`.
    pub fn uint8_array(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(BinaryKind::Uint8Array, bytes)
    }

    /// View over a window of a shared backing store.
    ///
    /// The window is clamped so it never extends past the store.
    pub fn slice(kind: BinaryKind, backing: Arc<[u8]>, byte_offset: usize, byte_length: usize) -> Self {
        let byte_offset = byte_offset.min(backing.len());
        let byte_length = byte_length.min(backing.len() - byte_offset);
        Self { kind, backing, byte_offset, byte_length }
    }

    /// Narrower view sharing this view's backing store.
    ///
    /// `offset` is relative to this view's own window.
    pub fn subview(&self, kind: BinaryKind, offset: usize, length: usize) -> Self {
        let offset = offset.min(self.byte_length);
        let length = length.min(self.byte_length - offset);
        Self {
            kind,
            backing: Arc::clone(&self.backing),
            byte_offset: self.byte_offset + offset,
            byte_length: length,
        }
    }

    /// Origin type.
    pub fn kind(&self) -> &BinaryKind {
        &self.kind
    }

    /// Shared handle to the backing store.
    pub fn backing(&self) -> Arc<[u8]> {
        Arc::clone(&self.backing)
    }

    /// Whether both views read from the same backing store.
    pub fn shares_backing_with(&self, other: &BinaryView) -> bool {
        Arc::ptr_eq(&self.backing, &other.backing)
    }
}

impl AsBytes for BinaryView {
    fn byte_offset(&self) -> usize {
        self.byte_offset
    }

    fn byte_length(&self) -> usize {
        self.byte_length
    }

    fn backing_bytes(&self) -> &[u8] {
        &self.backing
    }
}

/// A loosely-typed value as found inside a message envelope.
///
/// Equality on [`InputValue::Mapping`] is reference identity.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    /// Missing value.
    Undefined,
    /// Explicit null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Native double-precision number.
    Number(f64),
    /// Library 64-bit integer wrapper.
    Int64(Int64),
    /// Native arbitrary-precision integer primitive.
    BigInt(i128),
    /// String.
    String(String),
    /// Binary buffer or typed view.
    Binary(BinaryView),
    /// Date.
    Date(DateTime<Utc>),
    /// Ordered sequence.
    Sequence(Vec<InputValue>),
    /// Handle to a mapping in the owning [`ValueGraph`].
    Mapping(NodeId),
    /// Host value with no data representation (function, symbol, ...).
    Opaque(String),
}

impl InputValue {
    /// `null` or `undefined`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    /// Host truthiness: `false`, `0`, `NaN`, `""`, `0n` and nullish are falsy.
    ///
    /// Wrapper objects (64-bit integers, buffers, dates, sequences, mappings)
    /// are always truthy regardless of contents.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::BigInt(n) => *n != 0,
            Self::String(s) => !s.is_empty(),
            Self::Int64(_)
            | Self::Binary(_)
            | Self::Date(_)
            | Self::Sequence(_)
            | Self::Mapping(_)
            | Self::Opaque(_) => true,
        }
    }

    /// Borrow as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Mapping handle, if this is a mapping.
    pub fn as_mapping(&self) -> Option<NodeId> {
        match self {
            Self::Mapping(id) => Some(*id),
            _ => None,
        }
    }

    /// Short label of the variant, for logs.
    pub fn type_label(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Int64(_) => "int64",
            Self::BigInt(_) => "bigint",
            Self::String(_) => "string",
            Self::Binary(_) => "binary",
            Self::Date(_) => "date",
            Self::Sequence(_) => "sequence",
            Self::Mapping(_) => "mapping",
            Self::Opaque(_) => "opaque",
        }
    }
}

impl From<bool> for InputValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for InputValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for InputValue {
    fn from(value: i32) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for InputValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for InputValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Int64> for InputValue {
    fn from(value: Int64) -> Self {
        Self::Int64(value)
    }
}

impl From<BinaryView> for InputValue {
    fn from(value: BinaryView) -> Self {
        Self::Binary(value)
    }
}

impl From<DateTime<Utc>> for InputValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Date(value)
    }
}

impl From<Vec<InputValue>> for InputValue {
    fn from(value: Vec<InputValue>) -> Self {
        Self::Sequence(value)
    }
}

impl From<NodeId> for InputValue {
    fn from(value: NodeId) -> Self {
        Self::Mapping(value)
    }
}

/// Own enumerable entries of one object, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
    entries: Vec<(String, InputValue)>,
}

impl Mapping {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key. An existing key keeps its position; returns the old value.
    pub fn insert(&mut self, key: impl Into<String>, value: InputValue) -> Option<InputValue> {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Look up a key.
    pub fn get(&self, key: &str) -> Option<&InputValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Whether `key` is an own key.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Remove a key, preserving the order of the rest.
    pub fn remove(&mut self, key: &str) -> Option<InputValue> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &InputValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the mapping has no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Arena owning every mapping of an envelope.
#[derive(Debug, Clone, Default)]
pub struct ValueGraph {
    nodes: Vec<Mapping>,
}

impl ValueGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an empty mapping.
    pub fn add_mapping(&mut self) -> NodeId {
        self.nodes.push(Mapping::new());
        NodeId(self.nodes.len() - 1)
    }

    /// Allocate a mapping pre-filled with `entries`.
    pub fn add_mapping_from<I, K>(&mut self, entries: I) -> NodeId
    where
        I: IntoIterator<Item = (K, InputValue)>,
        K: Into<String>,
    {
        let mut mapping = Mapping::new();
        for (key, value) in entries {
            mapping.insert(key, value);
        }
        self.nodes.push(mapping);
        NodeId(self.nodes.len() - 1)
    }

    /// Borrow a mapping. `None` for handles from another graph.
    pub fn mapping(&self, id: NodeId) -> Option<&Mapping> {
        self.nodes.get(id.0)
    }

    /// Set `key` on mapping `id`. Returns `false` if the handle is unknown.
    pub fn set(&mut self, id: NodeId, key: impl Into<String>, value: InputValue) -> bool {
        match self.nodes.get_mut(id.0) {
            Some(mapping) => {
                mapping.insert(key, value);
                true
            }
            None => false,
        }
    }

    /// Number of mappings in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena holds no mappings.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Follow `path` from `root` with optional-chaining semantics.
    ///
    /// Stepping through a nullish value or a non-mapping fails the lookup,
    /// as does landing on a nullish value.
    pub fn get_path<'a>(&'a self, root: &'a InputValue, path: &[&str]) -> Option<&'a InputValue> {
        let mut current = root;
        for key in path {
            let id = current.as_mapping()?;
            current = self.mapping(id)?.get(key)?;
        }
        if current.is_nullish() {
            None
        } else {
            Some(current)
        }
    }

    /// Import a JSON document as an acyclic subgraph.
    ///
    /// Numbers become doubles. Object keys keep document order, integer-like
    /// keys included.
    pub fn import_json(&mut self, value: &serde_json::Value) -> InputValue {
        use serde_json::Value;

        match value {
            Value::Null => InputValue::Null,
            Value::Bool(b) => InputValue::Bool(*b),
            Value::Number(n) => InputValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => InputValue::String(s.clone()),
            Value::Array(items) => {
                InputValue::Sequence(items.iter().map(|item| self.import_json(item)).collect())
            }
            Value::Object(map) => {
                let entries: Vec<(String, InputValue)> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), self.import_json(v)))
                    .collect();
                InputValue::Mapping(self.add_mapping_from(entries))
            }
        }
    }

    /// Build a fresh graph from a JSON document, returning it with its root.
    pub fn from_json(value: &serde_json::Value) -> (Self, InputValue) {
        let mut graph = Self::new();
        let root = graph.import_json(value);
        (graph, root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_int64_signed_conversion() {
        let v = Int64::from_i64(-1);
        assert_eq!(v.to_i128(), -1);
        assert_eq!(v.to_f64(), -1.0);

        let v = Int64::from_i64(1_700_000_000_123);
        assert_eq!(v.to_i128(), 1_700_000_000_123);
        assert_eq!(v.to_f64(), 1_700_000_000_123.0);
    }

    #[test]
    fn test_int64_unsigned_conversion() {
        let v = Int64::from_u64(u64::MAX);
        assert_eq!(v.to_i128(), u64::MAX as i128);
        assert_eq!(v.to_f64(), 18_446_744_073_709_551_615.0);
    }

    #[test]
    fn test_binary_view_window() {
        let view = BinaryView::buffer(vec![1, 2, 3, 4, 5, 6]);
        let sub = view.subview(BinaryKind::Uint8Array, 2, 3);
        assert_eq!(sub.as_bytes(), &[3, 4, 5]);
        assert_eq!(sub.byte_offset(), 2);
        assert!(sub.shares_backing_with(&view));

        let nested = sub.subview(BinaryKind::Uint8Array, 1, 100);
        assert_eq!(nested.as_bytes(), &[4, 5]);
    }

    #[test]
    fn test_binary_slice_clamps() {
        let backing: Arc<[u8]> = Arc::from(vec![9u8, 8, 7]);
        let view = BinaryView::slice(BinaryKind::Buffer, backing, 2, 10);
        assert_eq!(view.as_bytes(), &[7]);

        let empty = BinaryView::slice(BinaryKind::Buffer, view.backing(), 10, 1);
        assert!(empty.as_bytes().is_empty());
    }

    #[test]
    fn test_binary_kind_names() {
        assert_eq!(BinaryKind::from_type_name("Float32Array"), BinaryKind::Float32Array);
        assert_eq!(BinaryKind::from_type_name("MyBuffer").type_name(), "MyBuffer");
        assert!(!BinaryKind::DataView.is_byte_sequence());
        assert!(BinaryKind::Buffer.is_byte_sequence());
    }

    #[test]
    fn test_mapping_reassign_keeps_position() {
        let mut m = Mapping::new();
        m.insert("a", 1.into());
        m.insert("b", 2.into());
        let old = m.insert("a", 3.into());

        assert_eq!(old, Some(InputValue::Number(1.0)));
        let keys: Vec<_> = m.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_truthiness() {
        assert!(!InputValue::Undefined.is_truthy());
        assert!(!InputValue::Number(f64::NAN).is_truthy());
        assert!(!InputValue::from("").is_truthy());
        assert!(!InputValue::BigInt(0).is_truthy());
        assert!(InputValue::Int64(Int64::from_i64(0)).is_truthy());
        assert!(InputValue::Sequence(vec![]).is_truthy());
    }

    #[test]
    fn test_get_path_optional_chaining() {
        let (graph, root) = ValueGraph::from_json(&json!({
            "message": { "conversation": "hi", "contextInfo": null },
        }));

        assert_eq!(
            graph.get_path(&root, &["message", "conversation"]),
            Some(&InputValue::from("hi"))
        );
        assert_eq!(graph.get_path(&root, &["message", "contextInfo"]), None);
        assert_eq!(graph.get_path(&root, &["message", "conversation", "length"]), None);
        assert_eq!(graph.get_path(&InputValue::Null, &["message"]), None);
    }

    #[test]
    fn test_import_json_preserves_order() {
        let (graph, root) = ValueGraph::from_json(&json!({ "z": 1, "a": [true, null], "m": {} }));
        let id = root.as_mapping().unwrap();
        let keys: Vec<_> = graph.mapping(id).unwrap().iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_unknown_handle_is_rejected() {
        let mut other = ValueGraph::new();
        other.add_mapping();
        let foreign = other.add_mapping();

        let mut graph = ValueGraph::new();
        assert!(graph.mapping(foreign).is_none());
        assert!(!graph.set(foreign, "k", InputValue::Null));
    }

    #[test]
    fn test_type_labels() {
        let mut graph = ValueGraph::new();
        let id = graph.add_mapping();

        assert_eq!(InputValue::Undefined.type_label(), "undefined");
        assert_eq!(InputValue::from(1.5).type_label(), "number");
        assert_eq!(InputValue::Int64(Int64::from_i64(1)).type_label(), "int64");
        assert_eq!(InputValue::Binary(BinaryView::buffer(vec![1])).type_label(), "binary");
        assert_eq!(InputValue::Sequence(vec![]).type_label(), "sequence");
        assert_eq!(InputValue::Mapping(id).type_label(), "mapping");
        assert_eq!(InputValue::Opaque("fn".to_string()).type_label(), "opaque");
    }

    #[test]
    fn test_import_keeps_document_key_order() {
        let doc: serde_json::Value = serde_json::from_str(r#"{"b":1,"10":2,"a":3,"2":4}"#).unwrap();
        let (graph, root) = ValueGraph::from_json(&doc);

        let mapping = graph.mapping(root.as_mapping().unwrap()).unwrap();
        let keys: Vec<_> = mapping.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "10", "a", "2"]);
    }
}
