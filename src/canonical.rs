//! Graph-safe canonicalization of envelope values.
//!
//! Converts an [`InputValue`] graph into a JSON-safe [`serde_json::Value`]
//! tree suitable for logging, storage or transmission.
//!
//! ## Dispatch
//!
//! | Input | Output |
//! |-------|--------|
//! | undefined | absent (`None`) |
//! | null | `null` |
//! | 64-bit wrapper / bigint | number (or string, see [`BigIntMode`]) |
//! | byte buffer / typed array | `{type, encoding: "base64", data}` |
//! | data view / array buffer | `{}` at every occurrence |
//! | sequence | array; absent elements become `null` |
//! | date | ISO-8601 string, millisecond precision, `Z` |
//! | mapping | object in key order; absent fields omitted; repeat references absent |
//! | bool / number / string | unchanged (non-finite numbers become `null`) |
//! | opaque | absent |
//!
//! ## Precision
//!
//! With the default [`BigIntMode::Number`], integers beyond ±(2^53 - 1) are
//! rounded to the nearest double. This is lossy. Use [`BigIntMode::String`]
//! or [`BigIntMode::Auto`] when exact values matter.
//!
//! ## Determinism Guarantees
//!
//! - Same graph + same visited-set state → identical output
//! - Mapping key order is insertion order
//! - A mapping reference is encoded at its first occurrence only

use std::collections::HashSet;
use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use xxhash_rust::xxh64::xxh64;

use crate::types::{AsBytes, BinaryView, InputValue, NodeId, ValueGraph};

/// Largest integer a double represents exactly.
pub const MAX_SAFE_INTEGER: i128 = 9_007_199_254_740_991;

/// Encoding recorded in every binary payload descriptor.
pub const BINARY_ENCODING: &str = "base64";

/// Mapping identities already entered during one canonicalization call.
#[derive(Debug, Clone, Default)]
pub struct VisitedSet {
    seen: HashSet<NodeId>,
}

impl VisitedSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` has been entered.
    pub fn contains(&self, id: NodeId) -> bool {
        self.seen.contains(&id)
    }

    /// Mark `id` as entered. Returns `false` if it already was.
    pub fn insert(&mut self, id: NodeId) -> bool {
        self.seen.insert(id)
    }

    /// Number of entered mappings.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether nothing has been entered.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Forget every entry.
    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

/// Representation of 64-bit wrappers and bigint primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BigIntMode {
    /// Always a JSON number. Lossy beyond the safe-integer range.
    #[default]
    Number,
    /// Always a decimal string. Lossless.
    String,
    /// Number inside the safe-integer range, decimal string outside.
    Auto,
}

impl BigIntMode {
    /// Parse from a configuration string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "number" => Some(Self::Number),
            "string" => Some(Self::String),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }

    /// Configuration string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::String => "string",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for BigIntMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonicalization settings.
///
/// The default matches the classic behavior: lossy numbers, no limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CanonicalizeOptions {
    /// How big integers are emitted.
    pub bigint_mode: BigIntMode,
    /// Maximum number of nested containers (sequences and mappings).
    pub max_depth: Option<usize>,
    /// Maximum number of values visited in one call.
    pub max_nodes: Option<usize>,
}

impl CanonicalizeOptions {
    /// Read options from the environment.
    ///
    /// - `CANON_BIGINT_MODE`: `number` | `string` | `auto`
    /// - `CANON_MAX_DEPTH`: positive integer
    /// - `CANON_MAX_NODES`: positive integer
    ///
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        let mut options = Self::default();

        if let Ok(raw) = std::env::var("CANON_BIGINT_MODE") {
            match BigIntMode::from_str(&raw) {
                Some(mode) => options.bigint_mode = mode,
                None => tracing::warn!(value = %raw, "Ignoring unknown CANON_BIGINT_MODE"),
            }
        }
        options.max_depth = read_limit("CANON_MAX_DEPTH");
        options.max_nodes = read_limit("CANON_MAX_NODES");

        options
    }

    /// Set the big-integer mode.
    pub fn with_bigint_mode(mut self, mode: BigIntMode) -> Self {
        self.bigint_mode = mode;
        self
    }

    /// Cap container nesting.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    /// Cap visited values.
    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = Some(max_nodes);
        self
    }
}

fn read_limit(var: &str) -> Option<usize> {
    let raw = std::env::var(var).ok()?;
    match raw.trim().parse::<usize>() {
        Ok(limit) => Some(limit),
        Err(_) => {
            tracing::warn!(variable = var, value = %raw, "Ignoring invalid limit");
            None
        }
    }
}

/// Canonicalization limit violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CanonicalizeError {
    /// Containers nested deeper than allowed.
    #[error("Depth limit exceeded: more than {limit} nested containers")]
    DepthLimitExceeded {
        /// Configured limit.
        limit: usize,
    },
    /// More values than allowed.
    #[error("Node limit exceeded: more than {limit} values")]
    NodeLimitExceeded {
        /// Configured limit.
        limit: usize,
    },
}

/// Graph-safe canonicalizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Canonicalizer {
    options: CanonicalizeOptions,
}

impl Canonicalizer {
    /// Create a canonicalizer with the given options.
    pub fn new(options: CanonicalizeOptions) -> Self {
        Self { options }
    }

    /// Active options.
    pub fn options(&self) -> &CanonicalizeOptions {
        &self.options
    }

    /// Canonicalize `value`. Never fails.
    ///
    /// Returns `None` when the value is absent (undefined, opaque, or a
    /// mapping already in `visited`). Subtrees past a configured limit are
    /// dropped as absent and a warning is logged.
    pub fn canonicalize(&self, graph: &ValueGraph, value: &InputValue, visited: &mut VisitedSet) -> Option<Value> {
        let mut walk = Walk::new(graph, self.options, false);
        let result = walk.value(value, visited, 0);

        if let Some((limit, dropped)) = walk.truncated {
            tracing::warn!(error = %limit, dropped = dropped, nodes = walk.nodes, "Canonical output truncated");
        }

        result.unwrap_or_default()
    }

    /// Canonicalize `value`, failing on the first limit violation.
    pub fn try_canonicalize(
        &self,
        graph: &ValueGraph,
        value: &InputValue,
        visited: &mut VisitedSet,
    ) -> Result<Option<Value>, CanonicalizeError> {
        Walk::new(graph, self.options, true).value(value, visited, 0)
    }
}

/// Canonicalize with default options and a fresh visited set.
pub fn canonicalize(graph: &ValueGraph, value: &InputValue) -> Option<Value> {
    canonicalize_with(graph, value, &mut VisitedSet::new())
}

/// Canonicalize with default options and a caller-supplied visited set.
pub fn canonicalize_with(graph: &ValueGraph, value: &InputValue, visited: &mut VisitedSet) -> Option<Value> {
    Canonicalizer::default().canonicalize(graph, value, visited)
}

/// State of one traversal.
struct Walk<'g> {
    graph: &'g ValueGraph,
    options: CanonicalizeOptions,
    strict: bool,
    nodes: usize,
    /// First limit hit and the kind of value dropped there.
    truncated: Option<(CanonicalizeError, &'static str)>,
}

impl<'g> Walk<'g> {
    fn new(graph: &'g ValueGraph, options: CanonicalizeOptions, strict: bool) -> Self {
        Self { graph, options, strict, nodes: 0, truncated: None }
    }

    fn value(
        &mut self,
        value: &InputValue,
        visited: &mut VisitedSet,
        depth: usize,
    ) -> Result<Option<Value>, CanonicalizeError> {
        self.nodes += 1;
        if let Some(limit) = self.options.max_nodes {
            if self.nodes > limit {
                return self.limit_hit(CanonicalizeError::NodeLimitExceeded { limit }, value.type_label());
            }
        }

        let out = match value {
            InputValue::Undefined => None,
            InputValue::Null => Some(Value::Null),
            InputValue::Int64(v) => Some(self.big_integer(v.to_f64(), v.to_i128())),
            InputValue::BigInt(v) => Some(self.big_integer(*v as f64, *v)),
            InputValue::Binary(view) if view.kind().is_byte_sequence() => Some(binary_descriptor(view)),
            InputValue::Sequence(items) => {
                if let Some(err) = self.depth_exceeded(depth) {
                    return self.limit_hit(err, value.type_label());
                }
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.value(item, visited, depth + 1)?.unwrap_or(Value::Null));
                }
                Some(Value::Array(out))
            }
            InputValue::Date(date) => Some(Value::String(format_iso8601(date))),
            // Non-sequence binaries expose no own keys. Views are values, not
            // graph nodes, so a repeated view is encoded at every occurrence.
            InputValue::Binary(_) => Some(Value::Object(Map::new())),
            InputValue::Mapping(id) => return self.mapping(*id, visited, depth),
            InputValue::Bool(b) => Some(Value::Bool(*b)),
            InputValue::Number(n) => Some(number_value(*n)),
            InputValue::String(s) => Some(Value::String(s.clone())),
            InputValue::Opaque(_) => None,
        };

        Ok(out)
    }

    fn mapping(
        &mut self,
        id: NodeId,
        visited: &mut VisitedSet,
        depth: usize,
    ) -> Result<Option<Value>, CanonicalizeError> {
        if visited.contains(id) {
            return Ok(None);
        }
        let Some(mapping) = self.graph.mapping(id) else {
            return Ok(None);
        };
        if let Some(err) = self.depth_exceeded(depth) {
            return self.limit_hit(err, "mapping");
        }

        visited.insert(id);

        let mut out = Map::new();
        for (key, nested) in mapping.iter() {
            if let Some(canonical) = self.value(nested, visited, depth + 1)? {
                out.insert(key.to_string(), canonical);
            }
        }

        Ok(Some(Value::Object(out)))
    }

    fn depth_exceeded(&self, depth: usize) -> Option<CanonicalizeError> {
        let limit = self.options.max_depth?;
        (depth >= limit).then_some(CanonicalizeError::DepthLimitExceeded { limit })
    }

    fn limit_hit(&mut self, err: CanonicalizeError, dropped: &'static str) -> Result<Option<Value>, CanonicalizeError> {
        if self.strict {
            return Err(err);
        }
        if self.truncated.is_none() {
            self.truncated = Some((err, dropped));
        }
        Ok(None)
    }

    fn big_integer(&self, approx: f64, exact: i128) -> Value {
        let safe = (-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&exact);
        match self.options.bigint_mode {
            BigIntMode::Number => number_value(approx),
            BigIntMode::String => Value::String(exact.to_string()),
            BigIntMode::Auto if safe => number_value(approx),
            BigIntMode::Auto => Value::String(exact.to_string()),
        }
    }
}

/// JSON form of a double: integral values in the safe range as integers,
/// other finite values as floats, non-finite values as `null`.
fn number_value(n: f64) -> Value {
    if !n.is_finite() {
        return Value::Null;
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER as f64 {
        return Value::from(n as i64);
    }
    serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

/// Build the `{type, encoding, data}` descriptor for a byte view.
pub fn binary_descriptor(view: &BinaryView) -> Value {
    let mut out = Map::new();
    out.insert("type".to_string(), Value::String(view.kind().type_name().to_string()));
    out.insert("encoding".to_string(), Value::String(BINARY_ENCODING.to_string()));
    out.insert("data".to_string(), Value::String(STANDARD.encode(view.as_bytes())));
    Value::Object(out)
}

/// ISO-8601 UTC timestamp with millisecond precision.
///
/// Years outside 0..=9999 use the signed six-digit extended form.
pub fn format_iso8601(date: &DateTime<Utc>) -> String {
    let year = date.year();
    if (0..=9999).contains(&year) {
        date.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
    } else {
        format!("{:+07}-{}", year, date.format("%m-%dT%H:%M:%S%.3fZ"))
    }
}

/// Serialize a canonical value to bytes for hashing.
pub fn to_canonical_bytes(value: &Value) -> Vec<u8> {
    value.to_string().into_bytes()
}

/// Compute the xxh64 fingerprint of a canonical value.
pub fn canonical_hash(value: &Value) -> u64 {
    xxh64(&to_canonical_bytes(value), 0)
}

/// Compute the fingerprint and return it as hex.
pub fn canonical_hash_hex(value: &Value) -> String {
    format!("{:016x}", canonical_hash(value))
}
