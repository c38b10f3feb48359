/*!
 * In-Memory Key-Value Store
 *
 * [`Database`] is a self-contained, mutex-guarded substitute for a real
 * Redis connection: it implements [`CommandHandler`] directly against
 * an in-process map, so anything written against `CommandHandler` (the
 * RESP session glue, a test, a higher-level `Key`/`Subtree` wrapper)
 * can run without a server. One mutex covers the entire backing map for
 * the duration of a single command, so compound operations — set
 * algebra stores, `RPOPLPUSH`, `SORT ... STORE` — observe and mutate a
 * consistent snapshot; there is no interleaving of two commands'
 * effects.
 *
 * Known, deliberate differences from real Redis, carried over from the
 * reference this was modeled on:
 * - `SORT ... STORE` returns an empty array rather than an element
 *   count.
 * - `SORT`'s `BY`/`GET` patterns accept `*` in hash field names.
 * - `KEYS` only implements the single-`*`-wildcard form `Subtree`
 *   generates, not full glob syntax.
 * - no blocking primitives (`BLPOP`, pub/sub) — there is exactly one
 *   thread of execution per command.
 * - counters are `i32`, not `i64`; sort keys compare as `i32`, not
 *   floating point.
 */

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use ahash::RandomState;
use hashbrown::HashMap;
use parking_lot::Mutex;
use rand::Rng;

use crate::command::CommandHandler;
use crate::error::Error;
use crate::sort;
use crate::value::{Segment, SegmentView, Value};

const SOURCE: &str = "<InternalDatabase>";

const MISSING_COMMAND: &str = "Missing command";
const INVALID_PARAMETER_COUNT: &str = "Invalid number of parameters";
const INVALID_TYPE: &str = "Invalid type";
const INVALID_TYPE_INT: &str = "Invalid type (expect integer)";
const INVALID_INDEX: &str = "Invalid index";
const INVALID_COMMAND: &str = "Invalid command";
const KEY_NOT_FOUND: &str = "Key not found";

fn fail<T>(msg: &str) -> Result<T, Error> {
    log::debug!("command rejected: {msg}");
    Err(Error::remote(SOURCE, msg))
}

fn check_argument_count(v: &SegmentView, need: usize) -> Result<(), Error> {
    if v.len() != need {
        fail(INVALID_PARAMETER_COUNT)
    } else {
        Ok(())
    }
}

fn check_argument_count_at_least(v: &SegmentView, need: usize) -> Result<(), Error> {
    if v.len() < need {
        fail(INVALID_PARAMETER_COUNT)
    } else {
        Ok(())
    }
}

/// A single `*` wildcard, anchored at both ends — the only glob form
/// `KEYS` needs to support, since it exists to implement `Subtree`'s
/// `key:*` enumeration rather than arbitrary patterns.
pub(crate) fn match_key(pat: &[u8], key: &[u8]) -> bool {
    match pat.iter().position(|&b| b == b'*') {
        None => pat == key,
        Some(n) => {
            let end_length = pat.len() - n - 1;
            key.len() >= pat.len() - 1
                && pat[..n] == key[..n]
                && pat[pat.len() - end_length..] == key[key.len() - end_length..]
        }
    }
}

/// One stored key's value. `TYPE` reports these names verbatim.
#[derive(Debug, Clone)]
pub(crate) enum Entry {
    String(Vec<u8>),
    Hash(BTreeMap<Vec<u8>, Vec<u8>>),
    List(VecDeque<Vec<u8>>),
    Set(BTreeSet<Vec<u8>>),
}

impl Entry {
    fn type_name(&self) -> &'static str {
        match self {
            Entry::String(_) => "string",
            Entry::Hash(_) => "hash",
            Entry::List(_) => "list",
            Entry::Set(_) => "set",
        }
    }

    /// The values `SORT` can sort: a list in its own order, or a set in
    /// its (sorted, since it's backed by a `BTreeSet`) iteration order.
    pub(crate) fn sortable_values(&self) -> Option<Vec<Vec<u8>>> {
        match self {
            Entry::List(l) => Some(l.iter().cloned().collect()),
            Entry::Set(s) => Some(s.iter().cloned().collect()),
            _ => None,
        }
    }
}

pub(crate) type Map = HashMap<Vec<u8>, Entry, RandomState>;

fn get_string<'a>(map: &'a Map, key: &[u8]) -> Result<Option<&'a [u8]>, Error> {
    match map.get(key) {
        None => Ok(None),
        Some(Entry::String(s)) => Ok(Some(s)),
        Some(_) => fail(INVALID_TYPE),
    }
}

fn get_create_string<'a>(map: &'a mut Map, key: &[u8]) -> Result<&'a mut Vec<u8>, Error> {
    let needs_type_check = map.get(key).is_some();
    let entry = map.entry(key.to_vec()).or_insert_with(|| Entry::String(Vec::new()));
    match entry {
        Entry::String(s) => Ok(s),
        _ if needs_type_check => fail(INVALID_TYPE),
        _ => unreachable!(),
    }
}

fn get_hash<'a>(map: &'a Map, key: &[u8]) -> Result<Option<&'a BTreeMap<Vec<u8>, Vec<u8>>>, Error> {
    match map.get(key) {
        None => Ok(None),
        Some(Entry::Hash(h)) => Ok(Some(h)),
        Some(_) => fail(INVALID_TYPE),
    }
}

fn get_create_hash<'a>(map: &'a mut Map, key: &[u8]) -> Result<&'a mut BTreeMap<Vec<u8>, Vec<u8>>, Error> {
    let needs_type_check = map.get(key).is_some();
    let entry = map.entry(key.to_vec()).or_insert_with(|| Entry::Hash(BTreeMap::new()));
    match entry {
        Entry::Hash(h) => Ok(h),
        _ if needs_type_check => fail(INVALID_TYPE),
        _ => unreachable!(),
    }
}

fn get_list<'a>(map: &'a Map, key: &[u8]) -> Result<Option<&'a VecDeque<Vec<u8>>>, Error> {
    match map.get(key) {
        None => Ok(None),
        Some(Entry::List(l)) => Ok(Some(l)),
        Some(_) => fail(INVALID_TYPE),
    }
}

fn get_create_list<'a>(map: &'a mut Map, key: &[u8]) -> Result<&'a mut VecDeque<Vec<u8>>, Error> {
    let needs_type_check = map.get(key).is_some();
    let entry = map.entry(key.to_vec()).or_insert_with(|| Entry::List(VecDeque::new()));
    match entry {
        Entry::List(l) => Ok(l),
        _ if needs_type_check => fail(INVALID_TYPE),
        _ => unreachable!(),
    }
}

fn get_set<'a>(map: &'a Map, key: &[u8]) -> Result<Option<&'a BTreeSet<Vec<u8>>>, Error> {
    match map.get(key) {
        None => Ok(None),
        Some(Entry::Set(s)) => Ok(Some(s)),
        Some(_) => fail(INVALID_TYPE),
    }
}

fn get_create_set<'a>(map: &'a mut Map, key: &[u8]) -> Result<&'a mut BTreeSet<Vec<u8>>, Error> {
    let needs_type_check = map.get(key).is_some();
    let entry = map.entry(key.to_vec()).or_insert_with(|| Entry::Set(BTreeSet::new()));
    match entry {
        Entry::Set(s) => Ok(s),
        _ if needs_type_check => fail(INVALID_TYPE),
        _ => unreachable!(),
    }
}

/// Convert a user-supplied (possibly negative) list index into a
/// 0-based position. Negative indices count from the end; an index
/// more negative than `-len` wraps past zero into a huge position
/// instead of clamping to 0, matching `size_t(m_list.size() + n)`'s
/// unsigned wraparound in the reference — every subsequent lookup
/// against the list's real length then misses, rather than silently
/// hitting element 0.
fn convert_list_index(len: usize, n: i32) -> usize {
    if n >= 0 {
        n as usize
    } else {
        (len as i64).wrapping_add(n as i64) as usize
    }
}

fn modify_numeric_string(s: &mut Vec<u8>, delta: i32) -> Result<i32, Error> {
    let mut int_val = 0i32;
    if !s.is_empty() {
        int_val = std::str::from_utf8(s)
            .ok()
            .and_then(|s| s.parse::<i32>().ok())
            .ok_or_else(|| Error::remote(SOURCE, INVALID_TYPE_INT))?;
    }
    int_val = int_val.wrapping_add(delta);
    *s = int_val.to_string().into_bytes();
    Ok(int_val)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SetOperation {
    Difference,
    Intersection,
    Union,
}

/// `SDIFF`/`SINTER`/`SUNION` and their `*STORE` variants: combine the
/// first key's set with each following key's set, left to right.
pub(crate) fn execute_set_operation(
    map: &Map,
    op: SetOperation,
    v: &mut SegmentView,
) -> Result<BTreeSet<Vec<u8>>, Error> {
    let first = v.eat_string()?.ok_or_else(|| Error::remote(SOURCE, INVALID_PARAMETER_COUNT))?;
    let mut out = get_set(map, &first)?.cloned().unwrap_or_default();

    while !v.is_empty() {
        let key = v
            .eat_string()?
            .ok_or_else(|| Error::remote(SOURCE, INVALID_PARAMETER_COUNT))?;
        let set = get_set(map, &key)?.cloned().unwrap_or_default();
        match op {
            SetOperation::Difference => out.retain(|e| !set.contains(e)),
            SetOperation::Intersection => out.retain(|e| set.contains(e)),
            SetOperation::Union => out.extend(set),
        }
    }
    Ok(out)
}

/// Mutex-guarded key-value store implementing the subset of Redis
/// commands `Key`/`Subtree`-style wrappers need.
#[derive(Default)]
pub struct Database {
    data: Mutex<Map>,
}

impl Database {
    pub fn new() -> Self {
        Database {
            data: Mutex::new(Map::default()),
        }
    }

    fn dispatch(&self, map: &mut Map, verb: &[u8], v: &mut SegmentView) -> Result<Option<Value>, Error> {
        macro_rules! int { ($e:expr) => { Ok(Some(Value::Integer($e))) } }
        macro_rules! string { ($e:expr) => { Ok(Some(Value::string($e))) } }
        macro_rules! vector { ($seg:expr) => { Ok(Some(Value::Vector(crate::value::Vector::new($seg)))) } }
        macro_rules! eat_str {
            ($v:expr) => {
                $v.eat_string()?.ok_or_else(|| Error::remote(SOURCE, INVALID_PARAMETER_COUNT))?
            };
        }
        macro_rules! eat_int {
            ($v:expr) => {
                $v.eat_integer()?.ok_or_else(|| Error::remote(SOURCE, INVALID_PARAMETER_COUNT))?
            };
        }

        match verb {
            b"APPEND" => {
                check_argument_count(v, 2)?;
                let key = eat_str!(v);
                let value = eat_str!(v);
                let s = get_create_string(map, &key)?;
                s.extend_from_slice(&value);
                int!(s.len() as i32)
            }
            b"DECR" => {
                check_argument_count(v, 1)?;
                let key = eat_str!(v);
                int!(modify_numeric_string(get_create_string(map, &key)?, -1)?)
            }
            b"DECRBY" => {
                check_argument_count(v, 2)?;
                let key = eat_str!(v);
                let delta = eat_int!(v);
                int!(modify_numeric_string(get_create_string(map, &key)?, -delta)?)
            }
            b"DEL" => {
                let mut n = 0;
                while !v.is_empty() {
                    let key = eat_str!(v);
                    if map.remove(&key).is_some() {
                        n += 1;
                    }
                }
                int!(n)
            }
            b"EXISTS" => {
                let mut n = 0;
                while !v.is_empty() {
                    let key = eat_str!(v);
                    if map.contains_key(&key) {
                        n += 1;
                    }
                }
                int!(n)
            }
            b"GET" => {
                check_argument_count(v, 1)?;
                let key = eat_str!(v);
                match get_string(map, &key)? {
                    Some(s) => string!(s.to_vec()),
                    None => Ok(None),
                }
            }
            b"GETRANGE" => {
                check_argument_count(v, 3)?;
                let key = eat_str!(v);
                let mut beg = eat_int!(v);
                let mut end = eat_int!(v);
                match get_string(map, &key)? {
                    Some(s) => {
                        let len = s.len() as i32;
                        if beg < 0 {
                            beg += len;
                        }
                        if end < 0 {
                            end += len;
                        }
                        beg = beg.max(0);
                        end = end.max(0);
                        end += 1;
                        if beg >= end || beg >= len {
                            string!(Vec::new())
                        } else {
                            string!(s[beg as usize..end as usize].to_vec())
                        }
                    }
                    None => Ok(None),
                }
            }
            b"GETSET" => {
                check_argument_count(v, 2)?;
                let key = eat_str!(v);
                let value = eat_str!(v);
                let result = get_string(map, &key)?.map(|s| s.to_vec());
                *get_create_string(map, &key)? = value;
                Ok(result.map(Value::string))
            }
            b"HDEL" => {
                check_argument_count_at_least(v, 1)?;
                let key = eat_str!(v);
                let mut n = 0;
                if let Some(h) = get_hash_mut_if_present(map, &key)? {
                    while !v.is_empty() {
                        let field = eat_str!(v);
                        if h.remove(&field).is_some() {
                            n += 1;
                        }
                    }
                    if h.is_empty() {
                        map.remove(&key);
                    }
                } else {
                    while !v.is_empty() {
                        eat_str!(v);
                    }
                }
                int!(n)
            }
            b"HEXISTS" => {
                check_argument_count_at_least(v, 1)?;
                let key = eat_str!(v);
                let mut n = 0;
                if let Some(h) = get_hash(map, &key)? {
                    while !v.is_empty() {
                        let field = eat_str!(v);
                        if h.contains_key(&field) {
                            n += 1;
                        }
                    }
                } else {
                    while !v.is_empty() {
                        eat_str!(v);
                    }
                }
                int!(n)
            }
            b"HGET" => {
                check_argument_count(v, 2)?;
                let key = eat_str!(v);
                let field = eat_str!(v);
                match get_hash(map, &key)?.and_then(|h| h.get(&field)) {
                    Some(s) => string!(s.clone()),
                    None => Ok(None),
                }
            }
            b"HINCRBY" => {
                check_argument_count(v, 3)?;
                let key = eat_str!(v);
                let field = eat_str!(v);
                let delta = eat_int!(v);
                let h = get_create_hash(map, &key)?;
                let slot = h.entry(field).or_insert_with(Vec::new);
                int!(modify_numeric_string(slot, delta)?)
            }
            b"HKEYS" => {
                check_argument_count(v, 1)?;
                let key = eat_str!(v);
                let mut seg = Segment::new();
                if let Some(h) = get_hash(map, &key)? {
                    for k in h.keys() {
                        seg.push_back_string(k.clone());
                    }
                }
                vector!(seg)
            }
            b"HLEN" => {
                check_argument_count(v, 1)?;
                let key = eat_str!(v);
                int!(get_hash(map, &key)?.map_or(0, |h| h.len() as i32))
            }
            b"HMSET" => {
                if v.len() % 2 != 1 {
                    return fail(INVALID_PARAMETER_COUNT);
                }
                let key = eat_str!(v);
                let h = get_create_hash(map, &key)?;
                while !v.is_empty() {
                    let field = eat_str!(v);
                    let value = eat_str!(v);
                    h.insert(field, value);
                }
                string!(*b"OK")
            }
            b"HSET" => {
                check_argument_count(v, 3)?;
                let key = eat_str!(v);
                let field = eat_str!(v);
                let value = eat_str!(v);
                let h = get_create_hash(map, &key)?;
                let is_new = !h.contains_key(&field);
                h.insert(field, value);
                int!(is_new as i32)
            }
            b"INCR" => {
                check_argument_count(v, 1)?;
                let key = eat_str!(v);
                int!(modify_numeric_string(get_create_string(map, &key)?, 1)?)
            }
            b"INCRBY" => {
                check_argument_count(v, 2)?;
                let key = eat_str!(v);
                let delta = eat_int!(v);
                int!(modify_numeric_string(get_create_string(map, &key)?, delta)?)
            }
            b"KEYS" => {
                check_argument_count(v, 1)?;
                let pat = eat_str!(v);
                let mut seg = Segment::new();
                for k in map.keys() {
                    if match_key(&pat, k) {
                        seg.push_back_string(k.clone());
                    }
                }
                vector!(seg)
            }
            b"LINDEX" => {
                check_argument_count(v, 2)?;
                let key = eat_str!(v);
                let idx = eat_int!(v);
                match get_list(map, &key)? {
                    Some(l) => {
                        let n = convert_list_index(l.len(), idx);
                        match l.get(n) {
                            Some(s) => string!(s.clone()),
                            None => Ok(None),
                        }
                    }
                    None => Ok(None),
                }
            }
            b"LLEN" => {
                check_argument_count(v, 1)?;
                let key = eat_str!(v);
                int!(get_list(map, &key)?.map_or(0, |l| l.len() as i32))
            }
            b"LPOP" => {
                check_argument_count(v, 1)?;
                let key = eat_str!(v);
                match get_list_mut_if_present(map, &key)? {
                    Some(l) => match l.pop_front() {
                        Some(result) => {
                            if l.is_empty() {
                                map.remove(&key);
                            }
                            string!(result)
                        }
                        None => Ok(None),
                    },
                    None => Ok(None),
                }
            }
            b"LPUSH" => {
                check_argument_count_at_least(v, 2)?;
                let key = eat_str!(v);
                let l = get_create_list(map, &key)?;
                while !v.is_empty() {
                    let value = eat_str!(v);
                    l.push_front(value);
                }
                int!(l.len() as i32)
            }
            b"LRANGE" => {
                check_argument_count(v, 3)?;
                let key = eat_str!(v);
                let beg = eat_int!(v);
                let end = eat_int!(v);
                let mut seg = Segment::new();
                if let Some(l) = get_list(map, &key)? {
                    let mut i = convert_list_index(l.len(), beg);
                    let j = convert_list_index(l.len(), end);
                    while i <= j {
                        match l.get(i) {
                            Some(s) => seg.push_back_string(s.clone()),
                            None => break,
                        }
                        i += 1;
                    }
                }
                vector!(seg)
            }
            b"LREM" => {
                check_argument_count(v, 3)?;
                let key = eat_str!(v);
                let mut count = eat_int!(v);
                let value = eat_str!(v);
                let mut result = 0;
                if let Some(l) = get_list_mut_if_present(map, &key)? {
                    if count < 0 {
                        let mut i = l.len();
                        while i > 0 {
                            i -= 1;
                            if l[i] == value {
                                l.remove(i);
                                result += 1;
                                count += 1;
                                if count == 0 {
                                    break;
                                }
                            }
                        }
                    } else {
                        let mut i = 0;
                        while i < l.len() {
                            if l[i] == value {
                                l.remove(i);
                                result += 1;
                                count -= 1;
                                if count == 0 {
                                    break;
                                }
                            } else {
                                i += 1;
                            }
                        }
                    }
                    if l.is_empty() {
                        map.remove(&key);
                    }
                }
                int!(result)
            }
            b"LSET" => {
                check_argument_count(v, 3)?;
                let key = eat_str!(v);
                let idx = eat_int!(v);
                let value = eat_str!(v);
                let ok = match map.get_mut(&key) {
                    Some(Entry::List(l)) => {
                        let n = convert_list_index(l.len(), idx);
                        match l.get_mut(n) {
                            Some(slot) => {
                                *slot = value;
                                true
                            }
                            None => false,
                        }
                    }
                    Some(_) => return fail(INVALID_TYPE),
                    None => false,
                };
                if !ok {
                    return fail(INVALID_INDEX);
                }
                string!(*b"OK")
            }
            b"LTRIM" => {
                check_argument_count(v, 3)?;
                let key = eat_str!(v);
                let beg = eat_int!(v);
                let end = eat_int!(v);
                if let Some(l) = get_list_mut_if_present(map, &key)? {
                    let mut i = convert_list_index(l.len(), beg);
                    let mut j = convert_list_index(l.len(), end);
                    while !l.is_empty() && i > 0 {
                        l.pop_front();
                        i -= 1;
                        if j > 0 {
                            j -= 1;
                        }
                    }
                    while l.len() > j.wrapping_add(1) {
                        l.pop_back();
                    }
                    if l.is_empty() {
                        map.remove(&key);
                    }
                }
                string!(*b"OK")
            }
            b"MSET" => {
                if v.len() % 2 != 0 {
                    return fail(INVALID_PARAMETER_COUNT);
                }
                while !v.is_empty() {
                    let key = eat_str!(v);
                    let value = eat_str!(v);
                    map.remove(&key);
                    *get_create_string(map, &key)? = value;
                }
                string!(*b"OK")
            }
            b"RENAME" => {
                check_argument_count(v, 2)?;
                let key = eat_str!(v);
                let new_key = eat_str!(v);
                match map.remove(&key) {
                    Some(entry) => {
                        map.insert(new_key, entry);
                        string!(*b"OK")
                    }
                    None => fail(KEY_NOT_FOUND),
                }
            }
            b"RENAMENX" => {
                check_argument_count(v, 2)?;
                let key = eat_str!(v);
                let new_key = eat_str!(v);
                if !map.contains_key(&key) {
                    return fail(KEY_NOT_FOUND);
                }
                if map.contains_key(&new_key) {
                    int!(0)
                } else {
                    let entry = map.remove(&key).unwrap();
                    map.insert(new_key, entry);
                    int!(1)
                }
            }
            b"RPOP" => {
                check_argument_count(v, 1)?;
                let key = eat_str!(v);
                match get_list_mut_if_present(map, &key)? {
                    Some(l) => match l.pop_back() {
                        Some(result) => {
                            if l.is_empty() {
                                map.remove(&key);
                            }
                            string!(result)
                        }
                        None => Ok(None),
                    },
                    None => Ok(None),
                }
            }
            b"RPOPLPUSH" => {
                check_argument_count(v, 2)?;
                let key = eat_str!(v);
                let dest = eat_str!(v);
                let popped = match get_list_mut_if_present(map, &key)? {
                    Some(l) => l.pop_back(),
                    None => None,
                };
                match popped {
                    Some(result) => {
                        get_create_list(map, &dest)?.push_front(result.clone());
                        if let Some(Entry::List(l)) = map.get(&key) {
                            if l.is_empty() {
                                map.remove(&key);
                            }
                        }
                        string!(result)
                    }
                    None => Ok(None),
                }
            }
            b"RPUSH" => {
                check_argument_count_at_least(v, 2)?;
                let key = eat_str!(v);
                let l = get_create_list(map, &key)?;
                while !v.is_empty() {
                    let value = eat_str!(v);
                    l.push_back(value);
                }
                int!(l.len() as i32)
            }
            b"SADD" => {
                check_argument_count_at_least(v, 2)?;
                let key = eat_str!(v);
                let mut result = 0;
                let s = get_create_set(map, &key)?;
                while !v.is_empty() {
                    let value = eat_str!(v);
                    if s.insert(value) {
                        result += 1;
                    }
                }
                int!(result)
            }
            b"SCARD" => {
                check_argument_count(v, 1)?;
                let key = eat_str!(v);
                int!(get_set(map, &key)?.map_or(0, |s| s.len() as i32))
            }
            b"SDIFF" | b"SINTER" | b"SUNION" => {
                check_argument_count_at_least(v, 1)?;
                let op = match verb {
                    b"SDIFF" => SetOperation::Difference,
                    b"SINTER" => SetOperation::Intersection,
                    _ => SetOperation::Union,
                };
                let set = execute_set_operation(map, op, v)?;
                let mut seg = Segment::new();
                for item in set {
                    seg.push_back_string(item);
                }
                vector!(seg)
            }
            b"SDIFFSTORE" | b"SINTERSTORE" | b"SUNIONSTORE" => {
                check_argument_count_at_least(v, 2)?;
                let key = eat_str!(v);
                let op = match verb {
                    b"SDIFFSTORE" => SetOperation::Difference,
                    b"SINTERSTORE" => SetOperation::Intersection,
                    _ => SetOperation::Union,
                };
                let set = execute_set_operation(map, op, v)?;
                let n = set.len() as i32;
                if set.is_empty() {
                    map.remove(&key);
                } else {
                    *get_create_set(map, &key)? = set;
                }
                int!(n)
            }
            b"SET" => {
                check_argument_count(v, 2)?;
                let key = eat_str!(v);
                let value = eat_str!(v);
                map.remove(&key);
                *get_create_string(map, &key)? = value;
                string!(*b"OK")
            }
            b"SETNX" => {
                check_argument_count(v, 2)?;
                let key = eat_str!(v);
                let value = eat_str!(v);
                if get_string(map, &key)?.is_some() {
                    int!(0)
                } else {
                    map.insert(key, Entry::String(value));
                    int!(1)
                }
            }
            b"SISMEMBER" => {
                check_argument_count(v, 2)?;
                let key = eat_str!(v);
                let value = eat_str!(v);
                int!(get_set(map, &key)?.map_or(0, |s| s.contains(&value) as i32))
            }
            b"SMEMBERS" => {
                check_argument_count(v, 1)?;
                let key = eat_str!(v);
                let mut seg = Segment::new();
                if let Some(s) = get_set(map, &key)? {
                    for item in s {
                        seg.push_back_string(item.clone());
                    }
                }
                vector!(seg)
            }
            b"SMOVE" => {
                check_argument_count(v, 3)?;
                let key = eat_str!(v);
                let dest = eat_str!(v);
                let value = eat_str!(v);
                let removed = match get_set(map, &key)? {
                    Some(s) => s.contains(&value),
                    None => false,
                };
                if removed {
                    if let Some(Entry::Set(s)) = map.get_mut(&key) {
                        s.remove(&value);
                        let empty = s.is_empty();
                        if empty {
                            map.remove(&key);
                        }
                    }
                    get_create_set(map, &dest)?.insert(value);
                    int!(1)
                } else {
                    int!(0)
                }
            }
            b"SORT" => {
                check_argument_count_at_least(v, 1)?;
                let key = eat_str!(v);
                let entry = map.get(&key);
                if entry.is_some() && entry.unwrap().sortable_values().is_none() {
                    return fail(INVALID_TYPE);
                }
                let origin = entry.and_then(Entry::sortable_values).unwrap_or_default();
                let seg = sort::execute_sort_operation(map, origin, v)?;
                match seg {
                    sort::SortOutcome::Values(seg) => vector!(seg),
                    sort::SortOutcome::Stored { key: dest, values } => {
                        map.remove(&dest);
                        if !values.is_empty() {
                            let l = get_create_list(map, &dest)?;
                            l.extend(values);
                        }
                        vector!(Segment::new())
                    }
                }
            }
            b"SPOP" | b"SRANDMEMBER" => {
                check_argument_count(v, 1)?;
                let key = eat_str!(v);
                let remove = verb == b"SPOP";
                let picked = match get_set(map, &key)? {
                    Some(s) if !s.is_empty() => {
                        let idx = rand::thread_rng().gen_range(0..s.len());
                        s.iter().nth(idx).cloned()
                    }
                    _ => None,
                };
                match picked {
                    Some(value) => {
                        if remove {
                            if let Some(Entry::Set(s)) = map.get_mut(&key) {
                                s.remove(&value);
                                if s.is_empty() {
                                    map.remove(&key);
                                }
                            }
                        }
                        string!(value)
                    }
                    None => Ok(None),
                }
            }
            b"SREM" => {
                check_argument_count_at_least(v, 2)?;
                let key = eat_str!(v);
                let mut result = 0;
                let mut empty_after = false;
                match map.get_mut(&key) {
                    Some(Entry::Set(s)) => {
                        while !v.is_empty() {
                            let value = eat_str!(v);
                            if s.remove(&value) {
                                result += 1;
                            }
                        }
                        empty_after = s.is_empty();
                    }
                    Some(_) => return fail(INVALID_TYPE),
                    None => {
                        while !v.is_empty() {
                            eat_str!(v);
                        }
                    }
                }
                if empty_after {
                    map.remove(&key);
                }
                int!(result)
            }
            b"STRLEN" => {
                check_argument_count(v, 1)?;
                let key = eat_str!(v);
                int!(get_string(map, &key)?.map_or(0, |s| s.len() as i32))
            }
            b"TYPE" => {
                check_argument_count(v, 1)?;
                let key = eat_str!(v);
                match map.get(&key) {
                    Some(e) => string!(e.type_name()),
                    None => string!(*b"none"),
                }
            }
            _ => fail(INVALID_COMMAND),
        }
    }
}

/// `map.get_mut` for a `Hash` entry, `None` if absent, `Err` on a type
/// mismatch — used by commands that only need to act when the key
/// already exists (`HDEL`, `HEXISTS`).
fn get_hash_mut_if_present<'a>(
    map: &'a mut Map,
    key: &[u8],
) -> Result<Option<&'a mut BTreeMap<Vec<u8>, Vec<u8>>>, Error> {
    match map.get_mut(key) {
        None => Ok(None),
        Some(Entry::Hash(h)) => Ok(Some(h)),
        Some(_) => fail(INVALID_TYPE),
    }
}

fn get_list_mut_if_present<'a>(map: &'a mut Map, key: &[u8]) -> Result<Option<&'a mut VecDeque<Vec<u8>>>, Error> {
    match map.get_mut(key) {
        None => Ok(None),
        Some(Entry::List(l)) => Ok(Some(l)),
        Some(_) => fail(INVALID_TYPE),
    }
}

impl CommandHandler for Database {
    fn call(&self, command: &Segment) -> Result<Option<Value>, Error> {
        let mut map = self.data.lock();
        let mut v = SegmentView::new(command);
        let verb = v.eat_string()?.ok_or_else(|| Error::remote(SOURCE, MISSING_COMMAND))?;
        let verb = verb.to_ascii_uppercase();
        self.dispatch(&mut map, &verb, &mut v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::make_command;
    use crate::value::Access;

    fn call(db: &Database, args: &[&str]) -> Option<Value> {
        db.call(&make_command(args.iter().map(|s| s.to_string()))).unwrap()
    }

    fn as_string(v: Option<Value>) -> Vec<u8> {
        Access::new(v.as_ref()).to_string().unwrap()
    }

    #[test]
    fn set_get_roundtrip() {
        let db = Database::new();
        assert_eq!(as_string(call(&db, &["SET", "k", "v"])), b"OK");
        assert_eq!(as_string(call(&db, &["GET", "k"])), b"v");
        assert!(call(&db, &["GET", "missing"]).is_none());
    }

    #[test]
    fn incr_decr_create_and_modify() {
        let db = Database::new();
        assert_eq!(as_string(call(&db, &["INCR", "ctr"])), b"1");
        assert_eq!(as_string(call(&db, &["INCRBY", "ctr", "4"])), b"5");
        assert_eq!(as_string(call(&db, &["DECR", "ctr"])), b"4");
    }

    #[test]
    fn incr_rejects_non_numeric_string() {
        let db = Database::new();
        call(&db, &["SET", "k", "abc"]);
        assert!(db.call(&make_command(["INCR", "k"])).is_err());
    }

    #[test]
    fn type_command_reports_each_kind() {
        let db = Database::new();
        call(&db, &["SET", "s", "v"]);
        call(&db, &["RPUSH", "l", "v"]);
        call(&db, &["SADD", "se", "v"]);
        call(&db, &["HSET", "h", "f", "v"]);
        assert_eq!(as_string(call(&db, &["TYPE", "s"])), b"string");
        assert_eq!(as_string(call(&db, &["TYPE", "l"])), b"list");
        assert_eq!(as_string(call(&db, &["TYPE", "se"])), b"set");
        assert_eq!(as_string(call(&db, &["TYPE", "h"])), b"hash");
        assert_eq!(as_string(call(&db, &["TYPE", "nope"])), b"none");
    }

    #[test]
    fn wrong_type_access_fails() {
        let db = Database::new();
        call(&db, &["SET", "k", "v"]);
        assert!(db.call(&make_command(["LPUSH", "k", "v"])).is_err());
    }

    #[test]
    fn list_push_pop_and_range() {
        let db = Database::new();
        call(&db, &["RPUSH", "l", "a"]);
        call(&db, &["RPUSH", "l", "b"]);
        call(&db, &["LPUSH", "l", "z"]);
        // l = [z, a, b]
        let range = db.call(&make_command(["LRANGE", "l", "0", "-1"])).unwrap().unwrap();
        let a = Access::new(Some(&range));
        assert_eq!(a.get_array_size().unwrap(), 3);
        assert_eq!(a.index(0).unwrap().to_string().unwrap(), b"z");
        assert_eq!(as_string(call(&db, &["LPOP", "l"])), b"z");
        assert_eq!(as_string(call(&db, &["RPOP", "l"])), b"b");
    }

    #[test]
    fn lindex_severely_negative_index_misses_instead_of_clamping() {
        let db = Database::new();
        call(&db, &["RPUSH", "l", "a", "b", "c"]);
        assert!(call(&db, &["LINDEX", "l", "-100"]).is_none());
        assert_eq!(as_string(call(&db, &["LINDEX", "l", "-1"])), b"c");
    }

    #[test]
    fn lset_severely_negative_index_fails() {
        let db = Database::new();
        call(&db, &["RPUSH", "l", "a", "b", "c"]);
        assert!(db.call(&make_command(["LSET", "l", "-100", "z"])).is_err());
        assert_eq!(as_string(call(&db, &["LSET", "l", "-1", "z"])), b"OK");
        assert_eq!(as_string(call(&db, &["LINDEX", "l", "2"])), b"z");
    }

    #[test]
    fn hash_set_get_and_delete_clears_empty_key() {
        let db = Database::new();
        assert_eq!(as_string(call(&db, &["HSET", "h", "f", "1"])), b"1");
        assert_eq!(as_string(call(&db, &["HSET", "h", "f", "2"])), b"0");
        assert_eq!(as_string(call(&db, &["HGET", "h", "f"])), b"2");
        assert_eq!(as_string(call(&db, &["HDEL", "h", "f"])), b"1");
        assert_eq!(as_string(call(&db, &["TYPE", "h"])), b"none");
    }

    #[test]
    fn set_operations_combine_sets() {
        let db = Database::new();
        call(&db, &["SADD", "a", "x", "y"]);
        call(&db, &["SADD", "b", "y", "z"]);
        let inter = db.call(&make_command(["SINTER", "a", "b"])).unwrap().unwrap();
        assert_eq!(Access::new(Some(&inter)).get_array_size().unwrap(), 1);
        let union = db.call(&make_command(["SUNION", "a", "b"])).unwrap().unwrap();
        assert_eq!(Access::new(Some(&union)).get_array_size().unwrap(), 3);
    }

    #[test]
    fn keys_matches_single_wildcard() {
        let db = Database::new();
        call(&db, &["SET", "user:1", "v"]);
        call(&db, &["SET", "user:2", "v"]);
        call(&db, &["SET", "other", "v"]);
        let keys = db.call(&make_command(["KEYS", "user:*"])).unwrap().unwrap();
        assert_eq!(Access::new(Some(&keys)).get_array_size().unwrap(), 2);
    }

    #[test]
    fn rename_moves_value_and_rejects_missing_source() {
        let db = Database::new();
        call(&db, &["SET", "a", "v"]);
        call(&db, &["RENAME", "a", "b"]);
        assert!(call(&db, &["GET", "a"]).is_none());
        assert_eq!(as_string(call(&db, &["GET", "b"])), b"v");
        assert!(db.call(&make_command(["RENAME", "missing", "x"])).is_err());
    }
}
