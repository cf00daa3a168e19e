//! Stream operations (4.D.6): append-only logs with monotonically
//! increasing `ms-seq` ids. Blocking reads and consumer groups are out of
//! scope.

use crate::protocol::reply::{self, Reply};
use crate::storage::value::{StreamValue, TypeTag, Value};
use crate::storage::Storage;
use crate::util::now_ms;

fn with_stream<'a>(storage: &'a mut Storage, key: &[u8]) -> Result<&'a mut StreamValue, ()> {
    let v = storage.get_mut_typed(key, TypeTag::Stream, || Value::Stream(StreamValue::new()))?;
    match v {
        Value::Stream(s) => Ok(s),
        _ => unreachable!(),
    }
}

/// Parses `ms-seq`, `ms` (seq defaults to 0), or `*` (signalled by `None`).
pub fn parse_id(raw: &[u8]) -> Option<Option<(u64, u64)>> {
    if raw == b"*" {
        return Some(None);
    }
    let s = std::str::from_utf8(raw).ok()?;
    match s.split_once('-') {
        Some((ms, seq)) => Some(Some((ms.parse().ok()?, seq.parse().ok()?))),
        None => Some(Some((s.parse().ok()?, 0))),
    }
}

fn format_id(ms: u64, seq: u64) -> String {
    format!("{ms}-{seq}")
}

pub fn xadd(storage: &mut Storage, key: &[u8], id: Option<(u64, u64)>, fields: Vec<(Vec<u8>, Vec<u8>)>) -> Reply {
    let s = match with_stream(storage, key) {
        Ok(s) => s,
        Err(()) => return reply::wrongtype(),
    };
    let (ms, seq) = match id {
        Some((ms, seq)) => {
            if (ms, seq) <= (s.last_ms, s.last_seq) {
                return reply::err(
                    "ERR",
                    "The ID specified in XADD is equal or smaller than the target stream top item",
                );
            }
            (ms, seq)
        }
        None => {
            let now = now_ms();
            if now > s.last_ms {
                (now, 0)
            } else {
                (s.last_ms, s.last_seq + 1)
            }
        }
    };
    s.last_ms = ms;
    s.last_seq = seq;
    let id_str = format_id(ms, seq);
    s.entries.push((id_str.clone(), fields));
    storage.bump_version(key);
    Reply::bulk_from(id_str.into_bytes())
}

pub fn xlen(storage: &mut Storage, key: &[u8]) -> Reply {
    storage.touch(key);
    match storage.get_value(key) {
        None => Reply::Int(0),
        Some(Value::Stream(s)) => Reply::Int(s.entries.len() as i64),
        Some(_) => reply::wrongtype(),
    }
}

fn entry_to_reply(id: &str, fields: &[(Vec<u8>, Vec<u8>)]) -> Reply {
    let mut flat = Vec::with_capacity(fields.len() * 2);
    for (f, v) in fields {
        flat.push(Reply::bulk_from(f.clone()));
        flat.push(Reply::bulk_from(v.clone()));
    }
    Reply::Array(vec![Reply::bulk_from(id.as_bytes().to_vec()), Reply::Array(flat)])
}

fn id_in_range(id: &str, lo: Option<(u64, u64)>, hi: Option<(u64, u64)>) -> bool {
    let Some((ms, seq)) = parse_id(id.as_bytes()).flatten() else {
        return false;
    };
    let above_lo = lo.map_or(true, |l| (ms, seq) >= l);
    let below_hi = hi.map_or(true, |h| (ms, seq) <= h);
    above_lo && below_hi
}

pub fn xrange(
    storage: &mut Storage,
    key: &[u8],
    lo: Option<(u64, u64)>,
    hi: Option<(u64, u64)>,
    count: Option<usize>,
) -> Reply {
    storage.touch(key);
    match storage.get_value(key) {
        None => Reply::Array(Vec::new()),
        Some(Value::Stream(s)) => {
            let mut out: Vec<Reply> = s
                .entries
                .iter()
                .filter(|(id, _)| id_in_range(id, lo, hi))
                .map(|(id, f)| entry_to_reply(id, f))
                .collect();
            if let Some(n) = count {
                out.truncate(n);
            }
            Reply::Array(out)
        }
        Some(_) => reply::wrongtype(),
    }
}

pub fn xrevrange(
    storage: &mut Storage,
    key: &[u8],
    lo: Option<(u64, u64)>,
    hi: Option<(u64, u64)>,
    count: Option<usize>,
) -> Reply {
    storage.touch(key);
    match storage.get_value(key) {
        None => Reply::Array(Vec::new()),
        Some(Value::Stream(s)) => {
            let mut out: Vec<Reply> = s
                .entries
                .iter()
                .rev()
                .filter(|(id, _)| id_in_range(id, lo, hi))
                .map(|(id, f)| entry_to_reply(id, f))
                .collect();
            if let Some(n) = count {
                out.truncate(n);
            }
            Reply::Array(out)
        }
        Some(_) => reply::wrongtype(),
    }
}

/// Non-blocking `XREAD`: entries strictly newer than `after` per stream.
pub fn xread(storage: &mut Storage, streams: &[(Vec<u8>, (u64, u64))], count: Option<usize>) -> Reply {
    let mut out = Vec::new();
    for (key, after) in streams {
        storage.touch(key);
        let entries: Vec<Reply> = match storage.get_value(key) {
            Some(Value::Stream(s)) => {
                let mut matched: Vec<Reply> = s
                    .entries
                    .iter()
                    .filter(|(id, _)| {
                        parse_id(id.as_bytes())
                            .flatten()
                            .map_or(false, |parsed| parsed > *after)
                    })
                    .map(|(id, f)| entry_to_reply(id, f))
                    .collect();
                if let Some(n) = count {
                    matched.truncate(n);
                }
                matched
            }
            _ => Vec::new(),
        };
        if !entries.is_empty() {
            out.push(Reply::Array(vec![Reply::bulk_from(key.clone()), Reply::Array(entries)]));
        }
    }
    if out.is_empty() {
        Reply::NilArray
    } else {
        Reply::Array(out)
    }
}

pub fn xtrim_maxlen(storage: &mut Storage, key: &[u8], maxlen: usize) -> Reply {
    storage.touch(key);
    match storage.get_raw(key) {
        None => return Reply::Int(0),
        Some(Value::Stream(_)) => {}
        Some(_) => return reply::wrongtype(),
    }
    let s = with_stream(storage, key).unwrap();
    let removed = s.entries.len().saturating_sub(maxlen);
    if removed > 0 {
        s.entries.drain(0..removed);
        storage.bump_version(key);
    }
    storage.prune_if_empty(key);
    Reply::Int(removed as i64)
}
