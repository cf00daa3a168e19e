//! Hash operations (4.D.2).

use crate::protocol::reply::{self, Reply};
use crate::storage::value::{HashValue, TypeTag, Value};
use crate::storage::Storage;

fn with_hash<'a>(storage: &'a mut Storage, key: &[u8]) -> Result<&'a mut HashValue, ()> {
    let v = storage.get_mut_typed(key, TypeTag::Hash, || Value::Hash(HashValue::new()))?;
    match v {
        Value::Hash(h) => Ok(h),
        _ => unreachable!(),
    }
}

pub fn hset(storage: &mut Storage, key: &[u8], pairs: &[(Vec<u8>, Vec<u8>)]) -> Reply {
    let h = match with_hash(storage, key) {
        Ok(h) => h,
        Err(()) => return reply::wrongtype(),
    };
    let mut created = 0i64;
    for (f, v) in pairs {
        if h.set(f.clone(), v.clone()) {
            created += 1;
        }
    }
    storage.bump_version(key);
    Reply::Int(created)
}

pub fn hsetnx(storage: &mut Storage, key: &[u8], field: &[u8], value: Vec<u8>) -> Reply {
    let h = match with_hash(storage, key) {
        Ok(h) => h,
        Err(()) => return reply::wrongtype(),
    };
    if h.get(field).is_some() {
        return Reply::Int(0);
    }
    h.set(field.to_vec(), value);
    storage.bump_version(key);
    Reply::Int(1)
}

pub fn hget(storage: &mut Storage, key: &[u8], field: &[u8]) -> Reply {
    storage.touch(key);
    match storage.get_value(key) {
        None => Reply::Bulk(None),
        Some(Value::Hash(h)) => Reply::Bulk(h.get(field).map(|v| v.to_vec())),
        Some(_) => reply::wrongtype(),
    }
}

pub fn hmget(storage: &mut Storage, key: &[u8], fields: &[Vec<u8>]) -> Reply {
    storage.touch(key);
    match storage.get_value(key) {
        None => Reply::Array(fields.iter().map(|_| Reply::Bulk(None)).collect()),
        Some(Value::Hash(h)) => Reply::Array(
            fields
                .iter()
                .map(|f| Reply::Bulk(h.get(f).map(|v| v.to_vec())))
                .collect(),
        ),
        Some(_) => reply::wrongtype(),
    }
}

pub fn hdel(storage: &mut Storage, key: &[u8], fields: &[Vec<u8>]) -> Reply {
    storage.touch(key);
    let mut removed = 0i64;
    match storage.get_raw(key) {
        Some(Value::Hash(_)) => {}
        Some(_) => return reply::wrongtype(),
        None => return Reply::Int(0),
    }
    if let Ok(h) = with_hash(storage, key) {
        for f in fields {
            if h.remove(f) {
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

pub fn hexists(storage: &mut Storage, key: &[u8], field: &[u8]) -> Reply {
    storage.touch(key);
    match storage.get_value(key) {
        None => Reply::Int(0),
        Some(Value::Hash(h)) => Reply::Int(h.get(field).is_some() as i64),
        Some(_) => reply::wrongtype(),
    }
}

pub fn hlen(storage: &mut Storage, key: &[u8]) -> Reply {
    storage.touch(key);
    match storage.get_value(key) {
        None => Reply::Int(0),
        Some(Value::Hash(h)) => Reply::Int(h.len() as i64),
        Some(_) => reply::wrongtype(),
    }
}

pub fn hgetall(storage: &mut Storage, key: &[u8]) -> Reply {
    storage.touch(key);
    match storage.get_value(key) {
        None => Reply::Array(Vec::new()),
        Some(Value::Hash(h)) => {
            let mut out = Vec::with_capacity(h.len() * 2);
            for (f, v) in h.iter() {
                out.push(Reply::bulk_from(f.to_vec()));
                out.push(Reply::bulk_from(v.to_vec()));
            }
            Reply::Array(out)
        }
        Some(_) => reply::wrongtype(),
    }
}

pub fn hkeys(storage: &mut Storage, key: &[u8]) -> Reply {
    storage.touch(key);
    match storage.get_value(key) {
        None => Reply::Array(Vec::new()),
        Some(Value::Hash(h)) => Reply::Array(h.iter().map(|(f, _)| Reply::bulk_from(f.to_vec())).collect()),
        Some(_) => reply::wrongtype(),
    }
}

pub fn hvals(storage: &mut Storage, key: &[u8]) -> Reply {
    storage.touch(key);
    match storage.get_value(key) {
        None => Reply::Array(Vec::new()),
        Some(Value::Hash(h)) => Reply::Array(h.iter().map(|(_, v)| Reply::bulk_from(v.to_vec())).collect()),
        Some(_) => reply::wrongtype(),
    }
}

pub fn hincrby(storage: &mut Storage, key: &[u8], field: &[u8], delta: i64) -> Reply {
    let h = match with_hash(storage, key) {
        Ok(h) => h,
        Err(()) => return reply::wrongtype(),
    };
    let current = match h.get(field) {
        Some(v) => match std::str::from_utf8(v).ok().and_then(|s| s.parse::<i64>().ok()) {
            Some(n) => n,
            None => return reply::not_integer(),
        },
        None => 0,
    };
    let Some(next) = current.checked_add(delta) else {
        return reply::err("ERR", "increment or decrement would overflow");
    };
    h.set(field.to_vec(), next.to_string().into_bytes());
    storage.bump_version(key);
    Reply::Int(next)
}

pub fn hincrbyfloat(storage: &mut Storage, key: &[u8], field: &[u8], delta: f64) -> Reply {
    let h = match with_hash(storage, key) {
        Ok(h) => h,
        Err(()) => return reply::wrongtype(),
    };
    let current = match h.get(field) {
        Some(v) => match std::str::from_utf8(v).ok().and_then(|s| s.parse::<f64>().ok()) {
            Some(n) => n,
            None => return reply::not_float(),
        },
        None => 0.0,
    };
    let next = current + delta;
    let encoded = crate::protocol::encoder::format_double(next);
    h.set(field.to_vec(), encoded.clone().into_bytes());
    storage.bump_version(key);
    Reply::bulk_from(encoded.into_bytes())
}
