//! List operations (4.D.3). Blocking variants are out of scope.

use std::collections::VecDeque;

use crate::protocol::reply::{self, Reply};
use crate::storage::value::{clamp_range, TypeTag, Value};
use crate::storage::Storage;

fn with_list<'a>(storage: &'a mut Storage, key: &[u8]) -> Result<&'a mut VecDeque<Vec<u8>>, ()> {
    let v = storage.get_mut_typed(key, TypeTag::List, || Value::List(VecDeque::new()))?;
    match v {
        Value::List(l) => Ok(l),
        _ => unreachable!(),
    }
}

pub fn lpush(storage: &mut Storage, key: &[u8], values: &[Vec<u8>]) -> Reply {
    let l = match with_list(storage, key) {
        Ok(l) => l,
        Err(()) => return reply::wrongtype(),
    };
    for v in values {
        l.push_front(v.clone());
    }
    let len = l.len();
    storage.bump_version(key);
    Reply::Int(len as i64)
}

pub fn rpush(storage: &mut Storage, key: &[u8], values: &[Vec<u8>]) -> Reply {
    let l = match with_list(storage, key) {
        Ok(l) => l,
        Err(()) => return reply::wrongtype(),
    };
    for v in values {
        l.push_back(v.clone());
    }
    let len = l.len();
    storage.bump_version(key);
    Reply::Int(len as i64)
}

pub fn lpop(storage: &mut Storage, key: &[u8], count: Option<usize>) -> Reply {
    storage.touch(key);
    match storage.get_raw(key) {
        None => return if count.is_some() { Reply::NilArray } else { Reply::Bulk(None) },
        Some(Value::List(_)) => {}
        Some(_) => return reply::wrongtype(),
    }
    let l = with_list(storage, key).unwrap();
    let reply = match count {
        None => Reply::Bulk(l.pop_front()),
        Some(n) => {
            let mut out = Vec::new();
            for _ in 0..n {
                match l.pop_front() {
                    Some(v) => out.push(Reply::bulk_from(v)),
                    None => break,
                }
            }
            Reply::Array(out)
        }
    };
    storage.bump_version(key);
    storage.prune_if_empty(key);
    reply
}

pub fn rpop(storage: &mut Storage, key: &[u8], count: Option<usize>) -> Reply {
    storage.touch(key);
    match storage.get_raw(key) {
        None => return if count.is_some() { Reply::NilArray } else { Reply::Bulk(None) },
        Some(Value::List(_)) => {}
        Some(_) => return reply::wrongtype(),
    }
    let l = with_list(storage, key).unwrap();
    let reply = match count {
        None => Reply::Bulk(l.pop_back()),
        Some(n) => {
            let mut out = Vec::new();
            for _ in 0..n {
                match l.pop_back() {
                    Some(v) => out.push(Reply::bulk_from(v)),
                    None => break,
                }
            }
            Reply::Array(out)
        }
    };
    storage.bump_version(key);
    storage.prune_if_empty(key);
    reply
}

pub fn llen(storage: &mut Storage, key: &[u8]) -> Reply {
    storage.touch(key);
    match storage.get_value(key) {
        None => Reply::Int(0),
        Some(Value::List(l)) => Reply::Int(l.len() as i64),
        Some(_) => reply::wrongtype(),
    }
}

pub fn lrange(storage: &mut Storage, key: &[u8], start: i64, stop: i64) -> Reply {
    storage.touch(key);
    match storage.get_value(key) {
        None => Reply::Array(Vec::new()),
        Some(Value::List(l)) => {
            let (lo, hi) = clamp_range(start, stop, l.len() as i64);
            if hi < lo {
                Reply::Array(Vec::new())
            } else {
                Reply::Array(
                    l.iter()
                        .skip(lo as usize)
                        .take((hi - lo + 1) as usize)
                        .map(|v| Reply::bulk_from(v.clone()))
                        .collect(),
                )
            }
        }
        Some(_) => reply::wrongtype(),
    }
}

pub fn lindex(storage: &mut Storage, key: &[u8], index: i64) -> Reply {
    storage.touch(key);
    match storage.get_value(key) {
        None => Reply::Bulk(None),
        Some(Value::List(l)) => {
            let len = l.len() as i64;
            let idx = if index < 0 { len + index } else { index };
            if idx < 0 || idx >= len {
                Reply::Bulk(None)
            } else {
                Reply::bulk_from(l[idx as usize].clone())
            }
        }
        Some(_) => reply::wrongtype(),
    }
}

pub fn lset(storage: &mut Storage, key: &[u8], index: i64, value: Vec<u8>) -> Reply {
    storage.touch(key);
    match storage.get_raw(key) {
        None => return reply::err("ERR", "no such key"),
        Some(Value::List(_)) => {}
        Some(_) => return reply::wrongtype(),
    }
    let l = with_list(storage, key).unwrap();
    let len = l.len() as i64;
    let idx = if index < 0 { len + index } else { index };
    if idx < 0 || idx >= len {
        return reply::err("ERR", "index out of range");
    }
    l[idx as usize] = value;
    storage.bump_version(key);
    Reply::Ok
}

pub fn ltrim(storage: &mut Storage, key: &[u8], start: i64, stop: i64) -> Reply {
    storage.touch(key);
    match storage.get_raw(key) {
        None => return Reply::Ok,
        Some(Value::List(_)) => {}
        Some(_) => return reply::wrongtype(),
    }
    let l = with_list(storage, key).unwrap();
    let (lo, hi) = clamp_range(start, stop, l.len() as i64);
    let kept: VecDeque<Vec<u8>> = if hi < lo {
        VecDeque::new()
    } else {
        l.iter()
            .skip(lo as usize)
            .take((hi - lo + 1) as usize)
            .cloned()
            .collect()
    };
    *l = kept;
    storage.bump_version(key);
    storage.prune_if_empty(key);
    Reply::Ok
}

pub enum InsertWhere {
    Before,
    After,
}

pub fn linsert(
    storage: &mut Storage,
    key: &[u8],
    where_: InsertWhere,
    pivot: &[u8],
    value: Vec<u8>,
) -> Reply {
    storage.touch(key);
    match storage.get_raw(key) {
        None => return Reply::Int(0),
        Some(Value::List(_)) => {}
        Some(_) => return reply::wrongtype(),
    }
    let l = with_list(storage, key).unwrap();
    let Some(pos) = l.iter().position(|v| v.as_slice() == pivot) else {
        return Reply::Int(-1);
    };
    let idx = match where_ {
        InsertWhere::Before => pos,
        InsertWhere::After => pos + 1,
    };
    l.insert(idx, value);
    let len = l.len();
    storage.bump_version(key);
    Reply::Int(len as i64)
}

pub fn lrem(storage: &mut Storage, key: &[u8], count: i64, value: &[u8]) -> Reply {
    storage.touch(key);
    match storage.get_raw(key) {
        None => return Reply::Int(0),
        Some(Value::List(_)) => {}
        Some(_) => return reply::wrongtype(),
    }
    let l = with_list(storage, key).unwrap();
    let mut removed = 0i64;
    if count == 0 {
        let before = l.len();
        l.retain(|v| v.as_slice() != value);
        removed = (before - l.len()) as i64;
    } else if count > 0 {
        let mut i = 0;
        while i < l.len() && removed < count {
            if l[i].as_slice() == value {
                l.remove(i);
                removed += 1;
            } else {
                i += 1;
            }
        }
    } else {
        let want = -count;
        let mut i = l.len();
        while i > 0 && removed < want {
            i -= 1;
            if l[i].as_slice() == value {
                l.remove(i);
                removed += 1;
            }
        }
    }
    if removed > 0 {
        storage.bump_version(key);
    }
    storage.prune_if_empty(key);
    Reply::Int(removed)
}
