//! Set operations (4.D.4), including the algebraic `SINTER`/`SUNION`/`SDIFF`
//! family and their `*STORE` variants.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::protocol::reply::{self, Reply};
use crate::storage::value::{SetValue, TypeTag, Value};
use crate::storage::Storage;

fn with_set<'a>(storage: &'a mut Storage, key: &[u8]) -> Result<&'a mut SetValue, ()> {
    let v = storage.get_mut_typed(key, TypeTag::Set, || Value::Set(SetValue::new()))?;
    match v {
        Value::Set(s) => Ok(s),
        _ => unreachable!(),
    }
}

pub fn sadd(storage: &mut Storage, key: &[u8], members: &[Vec<u8>]) -> Reply {
    let s = match with_set(storage, key) {
        Ok(s) => s,
        Err(()) => return reply::wrongtype(),
    };
    let mut added = 0i64;
    for m in members {
        if s.insert(m.clone()) {
            added += 1;
        }
    }
    storage.bump_version(key);
    Reply::Int(added)
}

pub fn srem(storage: &mut Storage, key: &[u8], members: &[Vec<u8>]) -> Reply {
    storage.touch(key);
    match storage.get_raw(key) {
        None => return Reply::Int(0),
        Some(Value::Set(_)) => {}
        Some(_) => return reply::wrongtype(),
    }
    let s = with_set(storage, key).unwrap();
    let mut removed = 0i64;
    for m in members {
        if s.remove(m) {
            removed += 1;
        }
    }
    if removed > 0 {
        storage.bump_version(key);
    }
    storage.prune_if_empty(key);
    Reply::Int(removed)
}

pub fn sismember(storage: &mut Storage, key: &[u8], member: &[u8]) -> Reply {
    storage.touch(key);
    match storage.get_value(key) {
        None => Reply::Int(0),
        Some(Value::Set(s)) => Reply::Int(s.contains(member) as i64),
        Some(_) => reply::wrongtype(),
    }
}

pub fn smembers(storage: &mut Storage, key: &[u8]) -> Reply {
    storage.touch(key);
    match storage.get_value(key) {
        None => Reply::Array(Vec::new()),
        Some(Value::Set(s)) => Reply::Array(s.members().into_iter().map(Reply::bulk_from).collect()),
        Some(_) => reply::wrongtype(),
    }
}

pub fn scard(storage: &mut Storage, key: &[u8]) -> Reply {
    storage.touch(key);
    match storage.get_value(key) {
        None => Reply::Int(0),
        Some(Value::Set(s)) => Reply::Int(s.len() as i64),
        Some(_) => reply::wrongtype(),
    }
}

pub fn spop(storage: &mut Storage, key: &[u8], count: Option<usize>) -> Reply {
    storage.touch(key);
    match storage.get_raw(key) {
        None => return if count.is_some() { Reply::Array(Vec::new()) } else { Reply::Bulk(None) },
        Some(Value::Set(_)) => {}
        Some(_) => return reply::wrongtype(),
    }
    let s = with_set(storage, key).unwrap();
    let mut members = s.members();
    members.shuffle(&mut rand::thread_rng());
    let take = count.unwrap_or(1).min(members.len());
    let popped: Vec<Vec<u8>> = members.drain(..take).collect();
    for m in &popped {
        s.remove(m);
    }
    storage.bump_version(key);
    storage.prune_if_empty(key);
    match count {
        None => Reply::Bulk(popped.into_iter().next()),
        Some(_) => Reply::Array(popped.into_iter().map(Reply::bulk_from).collect()),
    }
}

pub fn srandmember(storage: &mut Storage, key: &[u8], count: Option<i64>) -> Reply {
    storage.touch(key);
    let members = match storage.get_value(key) {
        None => return match count {
            None => Reply::Bulk(None),
            Some(_) => Reply::Array(Vec::new()),
        },
        Some(Value::Set(s)) => s.members(),
        Some(_) => return reply::wrongtype(),
    };
    if members.is_empty() {
        return match count {
            None => Reply::Bulk(None),
            Some(_) => Reply::Array(Vec::new()),
        };
    }
    let mut rng = rand::thread_rng();
    match count {
        None => Reply::bulk_from(members[rng.gen_range(0..members.len())].clone()),
        Some(n) if n >= 0 => {
            let take = (n as usize).min(members.len());
            let mut pool = members;
            pool.shuffle(&mut rng);
            Reply::Array(pool.into_iter().take(take).map(Reply::bulk_from).collect())
        }
        Some(n) => {
            let take = (-n) as usize;
            Reply::Array(
                (0..take)
                    .map(|_| Reply::bulk_from(members[rng.gen_range(0..members.len())].clone()))
                    .collect(),
            )
        }
    }
}

pub fn smove(storage: &mut Storage, src: &[u8], dst: &[u8], member: &[u8]) -> Reply {
    storage.touch(src);
    match storage.get_raw(src) {
        None => return Reply::Int(0),
        Some(Value::Set(_)) => {}
        Some(_) => return reply::wrongtype(),
    }
    if let Err(()) = storage.check_type(dst, TypeTag::Set) {
        return reply::wrongtype();
    }
    let removed = with_set(storage, src).unwrap().remove(member);
    if !removed {
        return Reply::Int(0);
    }
    storage.bump_version(src);
    storage.prune_if_empty(src);
    with_set(storage, dst).unwrap().insert(member.to_vec());
    storage.bump_version(dst);
    Reply::Int(1)
}

fn load_set(storage: &mut Storage, key: &[u8]) -> Result<HashSet<Vec<u8>>, ()> {
    storage.touch(key);
    match storage.get_value(key) {
        None => Ok(HashSet::new()),
        Some(Value::Set(s)) => Ok(s.members().into_iter().collect()),
        Some(_) => Err(()),
    }
}

pub enum SetOp {
    Inter,
    Union,
    Diff,
}

pub fn set_algebra(storage: &mut Storage, op: SetOp, keys: &[Vec<u8>]) -> Result<Vec<Vec<u8>>, ()> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }
    let mut acc = load_set(storage, &keys[0])?;
    for key in &keys[1..] {
        let other = load_set(storage, key)?;
        acc = match op {
            SetOp::Inter => acc.intersection(&other).cloned().collect(),
            SetOp::Union => acc.union(&other).cloned().collect(),
            SetOp::Diff => acc.difference(&other).cloned().collect(),
        };
    }
    Ok(acc.into_iter().collect())
}

pub fn sinter(storage: &mut Storage, keys: &[Vec<u8>]) -> Reply {
    match set_algebra(storage, SetOp::Inter, keys) {
        Ok(members) => Reply::Array(members.into_iter().map(Reply::bulk_from).collect()),
        Err(()) => reply::wrongtype(),
    }
}

pub fn sunion(storage: &mut Storage, keys: &[Vec<u8>]) -> Reply {
    match set_algebra(storage, SetOp::Union, keys) {
        Ok(members) => Reply::Array(members.into_iter().map(Reply::bulk_from).collect()),
        Err(()) => reply::wrongtype(),
    }
}

pub fn sdiff(storage: &mut Storage, keys: &[Vec<u8>]) -> Reply {
    match set_algebra(storage, SetOp::Diff, keys) {
        Ok(members) => Reply::Array(members.into_iter().map(Reply::bulk_from).collect()),
        Err(()) => reply::wrongtype(),
    }
}

pub fn store_algebra(storage: &mut Storage, op: SetOp, dest: &[u8], keys: &[Vec<u8>]) -> Reply {
    match set_algebra(storage, op, keys) {
        Err(()) => reply::wrongtype(),
        Ok(members) => {
            let len = members.len();
            if members.is_empty() {
                storage.remove_key(dest);
            } else {
                let mut set = SetValue::new();
                for m in members {
                    set.insert(m);
                }
                storage.set_value(dest, Value::Set(set));
            }
            Reply::Int(len as i64)
        }
    }
}
