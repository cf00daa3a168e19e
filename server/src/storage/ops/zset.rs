//! Sorted-set operations (4.D.5).

use crate::protocol::reply::{self, Reply};
use crate::storage::value::{TypeTag, Value, ZSetValue};
use crate::storage::Storage;

fn with_zset<'a>(storage: &'a mut Storage, key: &[u8]) -> Result<&'a mut ZSetValue, ()> {
    let v = storage.get_mut_typed(key, TypeTag::ZSet, || Value::ZSet(ZSetValue::new()))?;
    match v {
        Value::ZSet(z) => Ok(z),
        _ => unreachable!(),
    }
}

#[derive(Default)]
pub struct ZAddOpts {
    pub nx: bool,
    pub xx: bool,
    pub gt: bool,
    pub lt: bool,
    pub ch: bool,
}

pub fn zadd(
    storage: &mut Storage,
    key: &[u8],
    opts: &ZAddOpts,
    pairs: &[(f64, Vec<u8>)],
) -> Reply {
    if opts.nx && opts.xx {
        return reply::syntax();
    }
    let z = match with_zset(storage, key) {
        Ok(z) => z,
        Err(()) => return reply::wrongtype(),
    };
    let mut added = 0i64;
    let mut changed = 0i64;
    for (score, member) in pairs {
        let existing = z.score(member);
        if opts.nx && existing.is_some() {
            continue;
        }
        if opts.xx && existing.is_none() {
            continue;
        }
        if let Some(old) = existing {
            if opts.gt && *score <= old {
                continue;
            }
            if opts.lt && *score >= old {
                continue;
            }
            if old != *score {
                changed += 1;
            }
        } else {
            added += 1;
        }
        z.upsert(member.clone(), *score);
    }
    storage.bump_version(key);
    Reply::Int(if opts.ch { added + changed } else { added })
}

pub fn zscore(storage: &mut Storage, key: &[u8], member: &[u8]) -> Reply {
    storage.touch(key);
    match storage.get_value(key) {
        None => Reply::Bulk(None),
        Some(Value::ZSet(z)) => match z.score(member) {
            Some(s) => Reply::bulk_from(crate::protocol::encoder::format_double(s).into_bytes()),
            None => Reply::Bulk(None),
        },
        Some(_) => reply::wrongtype(),
    }
}

pub fn zcard(storage: &mut Storage, key: &[u8]) -> Reply {
    storage.touch(key);
    match storage.get_value(key) {
        None => Reply::Int(0),
        Some(Value::ZSet(z)) => Reply::Int(z.len() as i64),
        Some(_) => reply::wrongtype(),
    }
}

pub fn zrem(storage: &mut Storage, key: &[u8], members: &[Vec<u8>]) -> Reply {
    storage.touch(key);
    match storage.get_raw(key) {
        None => return Reply::Int(0),
        Some(Value::ZSet(_)) => {}
        Some(_) => return reply::wrongtype(),
    }
    let z = with_zset(storage, key).unwrap();
    let mut removed = 0i64;
    for m in members {
        if z.remove(m) {
            removed += 1;
        }
    }
    if removed > 0 {
        storage.bump_version(key);
    }
    storage.prune_if_empty(key);
    Reply::Int(removed)
}

pub fn zrank(storage: &mut Storage, key: &[u8], member: &[u8]) -> Reply {
    storage.touch(key);
    match storage.get_value(key) {
        None => Reply::Bulk(None),
        Some(Value::ZSet(z)) => match z.rank(member) {
            Some(r) => Reply::Int(r as i64),
            None => Reply::Bulk(None),
        },
        Some(_) => reply::wrongtype(),
    }
}

fn entries_to_reply(entries: impl Iterator<Item = (f64, Vec<u8>)>, with_scores: bool) -> Reply {
    let mut out = Vec::new();
    for (score, member) in entries {
        out.push(Reply::bulk_from(member));
        if with_scores {
            out.push(Reply::bulk_from(
                crate::protocol::encoder::format_double(score).into_bytes(),
            ));
        }
    }
    Reply::Array(out)
}

pub fn zrange(storage: &mut Storage, key: &[u8], start: i64, stop: i64, with_scores: bool) -> Reply {
    storage.touch(key);
    match storage.get_value(key) {
        None => Reply::Array(Vec::new()),
        Some(Value::ZSet(z)) => entries_to_reply(
            z.range_by_index(start, stop)
                .iter()
                .cloned()
                .map(|(s, m)| (s, m)),
            with_scores,
        ),
        Some(_) => reply::wrongtype(),
    }
}

/// Parses a score-range bound: `-inf`, `+inf`, `(1.5` (exclusive), or `1.5`.
pub fn parse_bound(bytes: &[u8]) -> Option<(f64, bool)> {
    let s = std::str::from_utf8(bytes).ok()?;
    if s.eq_ignore_ascii_case("-inf") {
        return Some((f64::NEG_INFINITY, false));
    }
    if s.eq_ignore_ascii_case("+inf") || s.eq_ignore_ascii_case("inf") {
        return Some((f64::INFINITY, false));
    }
    if let Some(rest) = s.strip_prefix('(') {
        return rest.parse::<f64>().ok().map(|v| (v, true));
    }
    s.parse::<f64>().ok().map(|v| (v, false))
}

pub fn zrangebyscore(
    storage: &mut Storage,
    key: &[u8],
    min: (f64, bool),
    max: (f64, bool),
    with_scores: bool,
    limit: Option<(usize, usize)>,
) -> Reply {
    storage.touch(key);
    match storage.get_value(key) {
        None => Reply::Array(Vec::new()),
        Some(Value::ZSet(z)) => {
            let mut items: Vec<(f64, Vec<u8>)> = z
                .range_by_score(min.0, min.1, max.0, max.1)
                .into_iter()
                .cloned()
                .collect();
            if let Some((offset, count)) = limit {
                items = items.into_iter().skip(offset).take(count).collect();
            }
            entries_to_reply(items.into_iter(), with_scores)
        }
        Some(_) => reply::wrongtype(),
    }
}

pub fn zrevrangebyscore(
    storage: &mut Storage,
    key: &[u8],
    min: (f64, bool),
    max: (f64, bool),
    with_scores: bool,
    limit: Option<(usize, usize)>,
) -> Reply {
    storage.touch(key);
    match storage.get_value(key) {
        None => Reply::Array(Vec::new()),
        Some(Value::ZSet(z)) => {
            let mut items: Vec<(f64, Vec<u8>)> = z
                .range_by_score(min.0, min.1, max.0, max.1)
                .into_iter()
                .cloned()
                .collect();
            items.reverse();
            if let Some((offset, count)) = limit {
                items = items.into_iter().skip(offset).take(count).collect();
            }
            entries_to_reply(items.into_iter(), with_scores)
        }
        Some(_) => reply::wrongtype(),
    }
}

pub fn zincrby(storage: &mut Storage, key: &[u8], delta: f64, member: &[u8]) -> Reply {
    let z = match with_zset(storage, key) {
        Ok(z) => z,
        Err(()) => return reply::wrongtype(),
    };
    let next = z.score(member).unwrap_or(0.0) + delta;
    z.upsert(member.to_vec(), next);
    storage.bump_version(key);
    Reply::bulk_from(crate::protocol::encoder::format_double(next).into_bytes())
}
