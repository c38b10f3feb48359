/*!
 * `SORT key [BY pattern] [LIMIT offset count] [GET pattern ...] [ASC|DESC] [ALPHA] [STORE dest]`
 *
 * Sorting a list or set by an externally-referenced value: `BY`/`GET`
 * patterns name either the element itself (`#`), another string key
 * (substituting `*` for the element), or a hash field of another key
 * (`pattern->field`). A pattern that resolves to nothing leaves the
 * sort key at its default (empty) but is reported as absent (pushes a
 * null, not an empty string) in the result list — except under
 * `STORE`, which always pushes a string.
 */

use crate::database::{Entry, Map};
use crate::error::Error;
use crate::value::{Segment, SegmentView};

const SOURCE: &str = "<InternalDatabase>";
const INVALID_PARAMETER_COUNT: &str = "Invalid number of parameters";
const INVALID_OPTION: &str = "Invalid option";
const INVALID_TYPE_INT: &str = "Invalid type (expect integer)";

pub(crate) enum SortOutcome {
    Values(Segment),
    Stored { key: Vec<u8>, values: Vec<Vec<u8>> },
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Resolve one `BY`/`GET` pattern against one element's origin value.
/// `None` means the pattern named something that doesn't exist (an
/// absent hash field, an absent string key, or a hash where a string
/// was expected) — distinct from resolving to an empty string.
fn get_sort_value(map: &Map, origin: &[u8], pattern: &[u8]) -> Option<Vec<u8>> {
    if pattern == b"#" {
        return Some(origin.to_vec());
    }

    let mut pat = pattern.to_vec();
    if let Some(n) = pat.iter().position(|&b| b == b'*') {
        let mut substituted = Vec::with_capacity(pat.len() + origin.len());
        substituted.extend_from_slice(&pat[..n]);
        substituted.extend_from_slice(origin);
        substituted.extend_from_slice(&pat[n + 1..]);
        pat = substituted;
    }

    if let Some(n) = find_subslice(&pat, b"->") {
        let key = &pat[..n];
        let field = &pat[n + 2..];
        match map.get(key) {
            Some(Entry::Hash(h)) => h.get(field).cloned(),
            _ => None,
        }
    } else {
        match map.get(&pat) {
            Some(Entry::String(s)) => Some(s.clone()),
            _ => None,
        }
    }
}

fn parse_sort_key(value: &[u8]) -> Result<i32, Error> {
    if value.is_empty() {
        return Ok(0);
    }
    std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.parse::<i32>().ok())
        .ok_or_else(|| Error::remote(SOURCE, INVALID_TYPE_INT))
}

pub(crate) fn execute_sort_operation(
    map: &Map,
    origin_values: Vec<Vec<u8>>,
    v: &mut SegmentView,
) -> Result<SortOutcome, Error> {
    let mut pattern: Vec<u8> = b"#".to_vec();
    let mut get: Vec<Vec<u8>> = Vec::new();

    let mut limit = false;
    let mut offset: i32 = 0;
    let mut count: i32 = 0;

    let mut descending = false;
    let mut alpha = false;

    let mut store = false;
    let mut store_key = Vec::new();

    while !v.is_empty() {
        let flag = v
            .eat_string()?
            .ok_or_else(|| Error::remote(SOURCE, INVALID_PARAMETER_COUNT))?
            .to_ascii_uppercase();
        match flag.as_slice() {
            b"BY" => {
                pattern = v
                    .eat_string()?
                    .ok_or_else(|| Error::remote(SOURCE, INVALID_PARAMETER_COUNT))?;
            }
            b"LIMIT" => {
                offset = v
                    .eat_integer()?
                    .ok_or_else(|| Error::remote(SOURCE, INVALID_PARAMETER_COUNT))?;
                count = v
                    .eat_integer()?
                    .ok_or_else(|| Error::remote(SOURCE, INVALID_PARAMETER_COUNT))?;
                limit = true;
            }
            b"GET" => {
                get.push(
                    v.eat_string()?
                        .ok_or_else(|| Error::remote(SOURCE, INVALID_PARAMETER_COUNT))?,
                );
            }
            b"ASC" => descending = false,
            b"DESC" => descending = true,
            b"ALPHA" => alpha = true,
            b"STORE" => {
                store_key = v
                    .eat_string()?
                    .ok_or_else(|| Error::remote(SOURCE, INVALID_PARAMETER_COUNT))?;
                store = true;
            }
            _ => return Err(Error::remote(SOURCE, INVALID_OPTION)),
        }
    }
    if get.is_empty() {
        get.push(b"#".to_vec());
    }

    let origin_values = origin_values;
    let mut indices: Vec<usize> = (0..origin_values.len()).collect();
    if alpha {
        let keys: Vec<Vec<u8>> = origin_values
            .iter()
            .map(|o| get_sort_value(map, o, &pattern).unwrap_or_default())
            .collect();
        indices.sort_by(|&a, &b| keys[a].cmp(&keys[b]));
    } else {
        let keys: Vec<i32> = origin_values
            .iter()
            .map(|o| parse_sort_key(&get_sort_value(map, o, &pattern).unwrap_or_default()))
            .collect::<Result<_, _>>()?;
        indices.sort_by_key(|&i| keys[i]);
    }
    if descending {
        indices.reverse();
    }
    let mut slots: Vec<Option<Vec<u8>>> = origin_values.into_iter().map(Some).collect();
    let ordered: Vec<Vec<u8>> = indices.into_iter().map(|i| slots[i].take().unwrap()).collect();

    if !limit {
        offset = 0;
        count = ordered.len() as i32;
    }

    if store {
        let mut values = Vec::new();
        if !ordered.is_empty() {
            let mut i = 0usize;
            let mut off = offset;
            while i < count as usize && (off as usize) < ordered.len() {
                for pat in &get {
                    let tmp = get_sort_value(map, &ordered[off as usize], pat).unwrap_or_default();
                    values.push(tmp);
                }
                i += 1;
                off += 1;
            }
        }
        Ok(SortOutcome::Stored { key: store_key, values })
    } else {
        let mut seg = Segment::new();
        let mut i = 0usize;
        let mut off = offset;
        while i < count as usize && off >= 0 && (off as usize) < ordered.len() {
            for pat in &get {
                match get_sort_value(map, &ordered[off as usize], pat) {
                    Some(tmp) => seg.push_back_string(tmp),
                    None => seg.push_back(None),
                }
            }
            i += 1;
            off += 1;
        }
        Ok(SortOutcome::Values(seg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::command::{make_command, CommandHandler};
    use crate::value::Access;

    #[test]
    fn sort_numeric_ascending_by_default() {
        let db = Database::new();
        db.call(&make_command(["RPUSH", "l", "3", "1", "2"])).unwrap();
        let r = db.call(&make_command(["SORT", "l"])).unwrap().unwrap();
        let a = Access::new(Some(&r));
        assert_eq!(a.index(0).unwrap().to_string().unwrap(), b"1");
        assert_eq!(a.index(1).unwrap().to_string().unwrap(), b"2");
        assert_eq!(a.index(2).unwrap().to_string().unwrap(), b"3");
    }

    #[test]
    fn sort_alpha_descending() {
        let db = Database::new();
        db.call(&make_command(["RPUSH", "l", "b", "a", "c"])).unwrap();
        let r = db
            .call(&make_command(["SORT", "l", "ALPHA", "DESC"]))
            .unwrap()
            .unwrap();
        let a = Access::new(Some(&r));
        assert_eq!(a.index(0).unwrap().to_string().unwrap(), b"c");
        assert_eq!(a.index(2).unwrap().to_string().unwrap(), b"a");
    }

    #[test]
    fn sort_by_external_key_and_get_pattern() {
        let db = Database::new();
        db.call(&make_command(["RPUSH", "l", "1", "2"])).unwrap();
        db.call(&make_command(["SET", "weight_1", "20"])).unwrap();
        db.call(&make_command(["SET", "weight_2", "10"])).unwrap();
        db.call(&make_command(["SET", "name_1", "alice"])).unwrap();
        db.call(&make_command(["SET", "name_2", "bob"])).unwrap();
        let r = db
            .call(&make_command([
                "SORT", "l", "BY", "weight_*", "GET", "name_*",
            ]))
            .unwrap()
            .unwrap();
        let a = Access::new(Some(&r));
        assert_eq!(a.get_array_size().unwrap(), 2);
        assert_eq!(a.index(0).unwrap().to_string().unwrap(), b"bob");
        assert_eq!(a.index(1).unwrap().to_string().unwrap(), b"alice");
    }

    #[test]
    fn sort_store_writes_list_and_returns_empty_array() {
        let db = Database::new();
        db.call(&make_command(["RPUSH", "l", "3", "1", "2"])).unwrap();
        let r = db
            .call(&make_command(["SORT", "l", "STORE", "dest"]))
            .unwrap()
            .unwrap();
        assert_eq!(Access::new(Some(&r)).get_array_size().unwrap(), 0);
        let stored = db.call(&make_command(["LRANGE", "dest", "0", "-1"])).unwrap().unwrap();
        let a = Access::new(Some(&stored));
        assert_eq!(a.index(0).unwrap().to_string().unwrap(), b"1");
    }

    #[test]
    fn sort_missing_get_target_yields_null_entries() {
        let db = Database::new();
        db.call(&make_command(["RPUSH", "l", "1", "2"])).unwrap();
        let r = db
            .call(&make_command(["SORT", "l", "GET", "absent_*"]))
            .unwrap()
            .unwrap();
        let a = Access::new(Some(&r));
        assert!(a.index(0).unwrap().is_null());
    }
}
