/*!
 * Value Model
 *
 * `Value` is the polymorphic, immutable datum that flows through the
 * RESP codec, the JSON writer and the in-memory database: an integer, a
 * float, a boolean, a byte string, a shared vector, a shared hash, or an
 * inert error marker. Null is not a variant of `Value` itself — it is
 * the absence of one, represented the same way everywhere a value can
 * occur: `Option<Value>` in owning position, `Option<&Value>` in
 * borrowing position. [`Visitor::visit`] routes both uniformly, so a
 * `None` and a boxed null are observationally identical to any visitor.
 */

use crate::format;
use crate::error::Error;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use std::rc::Rc;

/// The sum type. Cloning is cheap: `Vector`/`Hash` are reference-counted
/// handles, never deep-copied.
#[derive(Debug, Clone)]
pub enum Value {
    Integer(i32),
    Float(f64),
    Boolean(bool),
    String(Vec<u8>),
    Vector(Vector),
    Hash(Hash),
    /// (source, message) — a remote-side failure signal. Inert until
    /// observed by [`Access`].
    Error(String, String),
}

impl Value {
    pub fn string(s: impl Into<Vec<u8>>) -> Value {
        Value::String(s.into())
    }

    pub fn error(source: impl Into<String>, text: impl Into<String>) -> Value {
        Value::Error(source.into(), text.into())
    }

    /// Route `self` to the one matching [`Visitor`] entry point.
    pub fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) {
        match self {
            Value::Integer(v) => visitor.visit_integer(*v),
            Value::Float(v) => visitor.visit_float(*v),
            Value::Boolean(v) => visitor.visit_boolean(*v),
            Value::String(v) => visitor.visit_string(v),
            Value::Vector(v) => visitor.visit_vector(v),
            Value::Hash(v) => visitor.visit_hash(v),
            Value::Error(source, text) => visitor.visit_error(source, text),
        }
    }
}

/// Visit a nullable value: `None` dispatches to [`Visitor::visit_null`],
/// `Some(v)` dispatches through `v`'s own variant.
pub fn visit<V: Visitor + ?Sized>(value: Option<&Value>, visitor: &mut V) {
    match value {
        Some(v) => v.accept(visitor),
        None => visitor.visit_null(),
    }
}

/// One callback per [`Value`] variant, plus `visit_null` for the absent
/// case and `visit_other` reserved for forward-compatible extension
/// (unreachable for this closed enum, but kept so callers written
/// against a hypothetical superset of `Value` still compile).
pub trait Visitor {
    fn visit_string(&mut self, str: &[u8]);
    fn visit_integer(&mut self, iv: i32);
    fn visit_float(&mut self, fv: f64);
    fn visit_boolean(&mut self, bv: bool);
    fn visit_hash(&mut self, hv: &Hash);
    fn visit_vector(&mut self, vv: &Vector);
    fn visit_error(&mut self, source: &str, text: &str);
    fn visit_null(&mut self);

    /// Called for an extension variant a future `Value` might carry.
    /// The closed enum in this crate never triggers it.
    fn visit_other(&mut self) {}
}

/// Abstract constructor for Values, so the RESP parser (and anything
/// else that needs to mint Values from parsed primitives) can be
/// pointed at a different factory without touching its state machine.
pub trait ValueFactory {
    fn create_null(&self) -> Option<Value> {
        None
    }
    fn create_integer(&self, v: i32) -> Option<Value> {
        Some(Value::Integer(v))
    }
    fn create_float(&self, v: f64) -> Option<Value> {
        Some(Value::Float(v))
    }
    fn create_boolean(&self, v: bool) -> Option<Value> {
        Some(Value::Boolean(v))
    }
    fn create_string(&self, v: Vec<u8>) -> Option<Value> {
        Some(Value::String(v))
    }
    fn create_vector(&self, seg: Segment) -> Option<Value> {
        Some(Value::Vector(Vector::new(seg)))
    }
    fn create_error(&self, source: &str, text: &str) -> Option<Value> {
        Some(Value::error(source, text))
    }
}

/// The factory used everywhere unless a caller injects a different one.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultValueFactory;

impl ValueFactory for DefaultValueFactory {}

/// Ordered mapping from string name to a dense `0..N` index. Backs
/// [`Hash`]'s key storage and the command-name tables in `database.rs`.
#[derive(Debug, Clone, Default)]
pub struct NameMap {
    names: Vec<SmolStr>,
    lookup: FxHashMap<SmolStr, usize>,
}

impl NameMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the existing index for `name`, or add it and return the
    /// new index.
    pub fn add_maybe(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.lookup.get(name) {
            return idx;
        }
        let idx = self.names.len();
        let key = SmolStr::new(name);
        self.names.push(key.clone());
        self.lookup.insert(key, idx);
        idx
    }

    pub fn get_index_by_name(&self, name: &str) -> Option<usize> {
        self.lookup.get(name).copied()
    }

    pub fn get_name_by_index(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(SmolStr::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(SmolStr::as_str)
    }
}

/// Ordered sequence of owned, nullable Values. Usable as a random-access
/// array (autoextending on `set`/`insert`, out-of-range `get` reads as
/// null) and as a stack (`push_back`/`pop_back`/`top`).
///
/// There is no separate representation for "no such slot" versus "this
/// slot holds null": both read back as `None`, exactly like the source
/// `afl::data::Segment`, whose `operator[]` returns a null pointer in
/// either case.
#[derive(Debug, Clone, Default)]
pub struct Segment {
    slots: Vec<Option<Value>>,
}

impl Segment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Segment {
            slots: Vec::with_capacity(n),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.slots.get(index).and_then(|v| v.as_ref())
    }

    fn make_index_accessible(&mut self, index: usize) {
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
    }

    /// Overwrite slot `index`, auto-extending with nulls as needed.
    pub fn set(&mut self, index: usize, value: Option<Value>) {
        self.make_index_accessible(index);
        self.slots[index] = value;
    }

    /// Insert `value` before `index`, shifting later elements forward.
    pub fn insert(&mut self, index: usize, value: Option<Value>) {
        if index >= self.slots.len() {
            self.make_index_accessible(index.saturating_sub(1));
            self.slots.push(value);
        } else {
            self.slots.insert(index, value);
        }
    }

    /// Remove `index` and return its value, leaving a hole of `None` at
    /// that position only if `index` was the last slot (which simply
    /// shrinks). Out-of-range indices return `None`.
    pub fn extract(&mut self, index: usize) -> Option<Value> {
        if index < self.slots.len() {
            self.slots.remove(index)
        } else {
            None
        }
    }

    pub fn swap(&mut self, other: &mut Segment) {
        std::mem::swap(&mut self.slots, &mut other.slots);
    }

    pub fn swap_elements(&mut self, index: usize, other: &mut Segment, other_index: usize) {
        self.make_index_accessible(index);
        other.make_index_accessible(other_index);
        std::mem::swap(&mut self.slots[index], &mut other.slots[other_index]);
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Smallest `N` such that every slot at index `>= N` is null.
    pub fn num_used_slots(&self) -> usize {
        let mut n = self.slots.len();
        while n > 0 && self.slots[n - 1].is_none() {
            n -= 1;
        }
        n
    }

    pub fn push_back(&mut self, value: Option<Value>) -> &mut Self {
        self.slots.push(value);
        self
    }

    pub fn push_back_integer(&mut self, value: i32) -> &mut Self {
        self.push_back(Some(Value::Integer(value)))
    }

    pub fn push_back_string(&mut self, value: impl Into<Vec<u8>>) -> &mut Self {
        self.push_back(Some(Value::string(value)))
    }

    pub fn pop_back(&mut self) -> Option<Value> {
        assert!(!self.slots.is_empty(), "pop_back: segment is empty");
        self.slots.pop().unwrap()
    }

    pub fn pop_back_n(&mut self, count: usize) {
        assert!(self.slots.len() >= count, "pop_back_n: not enough elements");
        self.slots.truncate(self.slots.len() - count);
    }

    /// `ofs`-th element from the end (0 = last).
    pub fn top(&self, ofs: usize) -> Option<&Value> {
        assert!(ofs < self.slots.len(), "top: offset out of range");
        self.slots[self.slots.len() - ofs - 1].as_ref()
    }

    pub fn extract_top(&mut self) -> Option<Value> {
        assert!(!self.slots.is_empty(), "extract_top: segment is empty");
        self.slots.pop().unwrap()
    }

    /// Move the top `count` elements (in order) onto `other`, without
    /// cloning.
    pub fn transfer_last_to(&mut self, count: usize, other: &mut Segment) {
        assert!(self.slots.len() >= count, "transfer_last_to: not enough elements");
        let split_at = self.slots.len() - count;
        other.slots.extend(self.slots.drain(split_at..));
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&Value>> {
        self.slots.iter().map(|v| v.as_ref())
    }
}

impl std::ops::Index<usize> for Segment {
    type Output = Option<Value>;
    fn index(&self, index: usize) -> &Option<Value> {
        &self.slots[index]
    }
}

/// Reference-counted, heap-resident [`Segment`]. Cheap to clone; cloning
/// shares the underlying storage rather than copying it.
#[derive(Debug, Clone)]
pub struct Vector(Rc<Segment>);

impl Vector {
    pub fn new(seg: Segment) -> Self {
        Vector(Rc::new(seg))
    }

    pub fn segment(&self) -> &Segment {
        &self.0
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

struct HashInner {
    keys: NameMap,
    values: Segment,
}

/// Reference-counted mapping from unique String keys (insertion order
/// preserved) to Values. Built with [`HashBuilder`], then frozen —
/// `Hash` itself offers no mutation, matching the immutability of
/// `Value`.
#[derive(Clone)]
pub struct Hash(Rc<HashInner>);

impl std::fmt::Debug for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hash").field("keys", &self.0.keys).finish()
    }
}

impl Hash {
    pub fn get(&self, key: &str) -> Option<&Value> {
        let idx = self.0.keys.get_index_by_name(key)?;
        self.0.values.get(idx)
    }

    pub fn keys(&self) -> &NameMap {
        &self.0.keys
    }

    pub fn values(&self) -> &Segment {
        &self.0.values
    }
}

/// Builder for [`Hash`]: construction needs interior mutation (fields
/// arrive one at a time), but once frozen a `Hash` is just another
/// immutable, shared Value payload.
#[derive(Debug, Default)]
pub struct HashBuilder {
    keys: NameMap,
    values: Segment,
}

impl HashBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, overwriting any previous value under the same key.
    pub fn set(&mut self, key: &str, value: Option<Value>) -> &mut Self {
        let idx = self.keys.add_maybe(key);
        self.values.set(idx, value);
        self
    }

    pub fn freeze(self) -> Hash {
        Hash(Rc::new(HashInner {
            keys: self.keys,
            values: self.values,
        }))
    }
}

/// A cursor over a [`Segment`] (or a window of one), with
/// destructive-read semantics: `eat()` returns the next value and
/// advances, regardless of whether that value is present or null —
/// reading past the configured window behaves exactly like reading a
/// null slot within it.
pub struct SegmentView<'a> {
    segment: &'a Segment,
    index: usize,
    count: usize,
}

impl<'a> SegmentView<'a> {
    pub fn new(segment: &'a Segment) -> Self {
        SegmentView {
            segment,
            index: 0,
            count: segment.len(),
        }
    }

    pub fn with_range(segment: &'a Segment, first: usize, limit: usize) -> Self {
        let index = first.min(segment.len());
        let count = limit.min(segment.len() - index);
        SegmentView {
            segment,
            index,
            count,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn eat(&mut self) -> Option<&'a Value> {
        if self.count == 0 {
            return None;
        }
        self.count -= 1;
        let v = self.segment.get(self.index);
        self.index += 1;
        v
    }

    /// Consume one value and convert it with [`Access::to_string`].
    /// `Ok(None)` means the consumed slot (or the exhausted view) was
    /// null; `Err` only if the value was an [`Value::Error`].
    pub fn eat_string(&mut self) -> Result<Option<Vec<u8>>, Error> {
        match self.eat() {
            Some(v) => Access::new(Some(v)).to_string().map(Some),
            None => Ok(None),
        }
    }

    /// Consume one value and convert it with [`Access::to_integer`].
    pub fn eat_integer(&mut self) -> Result<Option<i32>, Error> {
        match self.eat() {
            Some(v) => Access::new(Some(v)).to_integer().map(Some),
            None => Ok(None),
        }
    }
}

/// A short-lived, non-owning view over a (possibly null) Value
/// reference that performs the "fuzzy" conversions every command
/// dispatcher and SegmentView needs. `Access` must not outlive the
/// Value it was built from.
#[derive(Debug, Clone, Copy)]
pub struct Access<'a> {
    value: Option<&'a Value>,
}

impl<'a> Access<'a> {
    pub fn new(value: Option<&'a Value>) -> Self {
        Access { value }
    }

    pub fn value(&self) -> Option<&'a Value> {
        self.value
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    /// Introspect without propagating: `Some((source, text))` iff this
    /// is an error value.
    pub fn is_error(&self) -> Option<(&'a str, &'a str)> {
        match self.value {
            Some(Value::Error(source, text)) => Some((source.as_str(), text.as_str())),
            _ => None,
        }
    }

    fn propagate_error(&self) -> Result<(), Error> {
        if let Some(Value::Error(source, text)) = self.value {
            return Err(Error::remote(source.clone(), text.clone()));
        }
        Ok(())
    }

    /// null→0; int as-is; float truncated toward zero; bool→0/1;
    /// string parsed as decimal (empty→0); hash/vector/other fail;
    /// error propagates.
    pub fn to_integer(&self) -> Result<i32, Error> {
        self.propagate_error()?;
        match self.value {
            None => Ok(0),
            Some(Value::Integer(v)) => Ok(*v),
            Some(Value::Float(v)) => Ok(*v as i32),
            Some(Value::Boolean(v)) => Ok(*v as i32),
            Some(Value::String(s)) => {
                if s.is_empty() {
                    Ok(0)
                } else {
                    std::str::from_utf8(s)
                        .ok()
                        .and_then(|s| s.trim().parse::<i32>().ok())
                        .ok_or_else(|| Error::invalid_data(crate::error::messages::INVALID_NUMBER))
                }
            }
            Some(Value::Hash(_)) | Some(Value::Vector(_)) => {
                Err(Error::invalid_data(crate::error::messages::INVALID_NUMBER))
            }
            Some(Value::Error(..)) => unreachable!("handled by propagate_error"),
        }
    }

    /// null→""; int/float→decimal; bool→"true"/"false";
    /// vector→comma-joined recursive `to_string`; hash→"<hash>";
    /// error propagates.
    pub fn to_string(&self) -> Result<Vec<u8>, Error> {
        self.propagate_error()?;
        Ok(match self.value {
            None => Vec::new(),
            Some(Value::Integer(v)) => format::decimal(*v).into_bytes(),
            Some(Value::Float(v)) => format::general_float(*v).into_bytes(),
            Some(Value::Boolean(v)) => (if *v { "true" } else { "false" }).into(),
            Some(Value::String(s)) => s.clone(),
            Some(Value::Hash(_)) => b"<hash>".to_vec(),
            Some(Value::Vector(vv)) => {
                let mut out = Vec::new();
                for i in 0..vv.len() {
                    if i != 0 {
                        out.push(b',');
                    }
                    // A nested error aborts the whole join, matching the
                    // reference implementation's exception propagation.
                    out.extend(Access::new(vv.get(i)).to_string()?);
                }
                out
            }
            Some(Value::Error(..)) => unreachable!("handled by propagate_error"),
        })
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.to_string().unwrap_or_default()).into_owned()
    }

    /// Vector length, else 0; error propagates.
    pub fn get_array_size(&self) -> Result<usize, Error> {
        self.propagate_error()?;
        Ok(match self.value {
            Some(Value::Vector(vv)) => vv.len(),
            _ => 0,
        })
    }

    /// Hash→keys in insertion order; vector→keys of complete
    /// alternating (key, value) pairs; else empty.
    pub fn get_hash_keys(&self) -> Result<Vec<Vec<u8>>, Error> {
        self.propagate_error()?;
        Ok(match self.value {
            Some(Value::Hash(hv)) => hv
                .keys()
                .names()
                .map(|n| n.as_bytes().to_vec())
                .collect(),
            Some(Value::Vector(vv)) => {
                let mut out = Vec::new();
                let mut i = 0;
                while i + 1 < vv.len() {
                    out.push(Access::new(vv.get(i)).to_string()?);
                    i += 2;
                }
                out
            }
            _ => Vec::new(),
        })
    }

    /// Vector element at `index` (or null); else null; error propagates.
    pub fn index(&self, index: usize) -> Result<Access<'a>, Error> {
        self.propagate_error()?;
        Ok(match self.value {
            Some(Value::Vector(vv)) => Access::new(vv.get(index)),
            _ => Access::new(None),
        })
    }

    /// Hash lookup by key; vector treated as alternating (key, value)
    /// pairs; else null; error propagates.
    pub fn field(&self, key: &[u8]) -> Result<Access<'a>, Error> {
        self.propagate_error()?;
        Ok(match self.value {
            Some(Value::Hash(hv)) => {
                let key = String::from_utf8_lossy(key);
                Access::new(hv.get(&key))
            }
            Some(Value::Vector(vv)) => {
                let mut i = 0;
                let mut found = None;
                while i + 1 < vv.len() {
                    if Access::new(vv.get(i)).to_string()? == key {
                        found = vv.get(i + 1);
                        break;
                    }
                    i += 2;
                }
                Access::new(found)
            }
            _ => Access::new(None),
        })
    }

    pub fn to_integer_list(&self) -> Result<Vec<i32>, Error> {
        let n = self.get_array_size()?;
        (0..n).map(|i| self.index(i)?.to_integer()).collect()
    }

    pub fn to_string_list(&self) -> Result<Vec<Vec<u8>>, Error> {
        let n = self.get_array_size()?;
        (0..n).map(|i| self.index(i)?.to_string()).collect()
    }
}
