//! String operations (4.D.1): plain get/set plus the numeric and bitwise
//! operations that treat the string body as a byte array.

use crate::protocol::reply::{self, Reply};
use crate::storage::value::{TypeTag, Value};
use crate::storage::Storage;
use crate::util::now_ms;

fn as_str_mut<'a>(storage: &'a mut Storage, key: &[u8]) -> Result<Option<&'a mut Vec<u8>>, ()> {
    storage.touch(key);
    match storage.get_raw(key) {
        None => Ok(None),
        Some(Value::Str(_)) => {
            if let Some(Value::Str(s)) = storage_data_mut(storage, key) {
                Ok(Some(s))
            } else {
                unreachable!()
            }
        }
        Some(_) => Err(()),
    }
}

// Storage doesn't expose a raw `data` mutable getter on purpose (every
// mutation path is meant to go through its typed helpers); string ops are
// the one place that legitimately needs an in-place byte-level mutable
// view, so they reach through `get_mut_typed`.
fn storage_data_mut<'a>(storage: &'a mut Storage, key: &[u8]) -> Option<&'a mut Value> {
    storage
        .get_mut_typed(key, TypeTag::Str, || Value::Str(Vec::new()))
        .ok()
}

pub fn get(storage: &mut Storage, key: &[u8]) -> Reply {
    storage.touch(key);
    match storage.get_value(key) {
        None => Reply::Bulk(None),
        Some(Value::Str(s)) => Reply::bulk_from(s.clone()),
        Some(_) => reply::wrongtype(),
    }
}

pub struct SetOpts {
    pub nx: bool,
    pub xx: bool,
    pub expire_ms: Option<u64>,
    pub keep_ttl: bool,
}

impl Default for SetOpts {
    fn default() -> Self {
        Self {
            nx: false,
            xx: false,
            expire_ms: None,
            keep_ttl: false,
        }
    }
}

pub fn set(storage: &mut Storage, key: &[u8], value: Vec<u8>, opts: SetOpts) -> Reply {
    if opts.nx && opts.xx {
        return reply::syntax();
    }
    let exists = storage.exists(key);
    if opts.nx && exists {
        return Reply::Bulk(None);
    }
    if opts.xx && !exists {
        return Reply::Bulk(None);
    }
    let prior_deadline = if opts.keep_ttl {
        match storage.pttl(key) {
            n if n >= 0 => Some(now_ms() + n as u64),
            _ => None,
        }
    } else {
        None
    };
    if storage.insert_new(key, Value::Str(value)).is_err() {
        return reply::oom();
    }
    if !opts.keep_ttl {
        storage.persist(key);
    }
    if let Some(ms) = opts.expire_ms {
        storage.set_expire_at(key, now_ms() + ms);
    } else if let Some(deadline) = prior_deadline {
        storage.set_expire_at(key, deadline);
    }
    Reply::Ok
}

pub fn append(storage: &mut Storage, key: &[u8], suffix: &[u8]) -> Reply {
    match as_str_mut(storage, key) {
        Err(()) => reply::wrongtype(),
        Ok(slot) => {
            let len = match slot {
                Some(s) => {
                    s.extend_from_slice(suffix);
                    s.len()
                }
                None => {
                    storage.set_value(key, Value::Str(suffix.to_vec()));
                    suffix.len()
                }
            };
            storage.bump_version(key);
            Reply::Int(len as i64)
        }
    }
}

pub fn strlen(storage: &mut Storage, key: &[u8]) -> Reply {
    storage.touch(key);
    match storage.get_value(key) {
        None => Reply::Int(0),
        Some(Value::Str(s)) => Reply::Int(s.len() as i64),
        Some(_) => reply::wrongtype(),
    }
}

fn clamp_str_range(start: i64, end: i64, len: i64) -> (usize, usize) {
    let (lo, hi) = crate::storage::value::clamp_range(start, end, len);
    if hi < lo {
        (0, 0)
    } else {
        (lo as usize, hi as usize + 1)
    }
}

pub fn getrange(storage: &mut Storage, key: &[u8], start: i64, end: i64) -> Reply {
    storage.touch(key);
    match storage.get_value(key) {
        None => Reply::bulk_from(Vec::new()),
        Some(Value::Str(s)) => {
            let (lo, hi) = clamp_str_range(start, end, s.len() as i64);
            if lo >= hi || s.is_empty() {
                Reply::bulk_from(Vec::new())
            } else {
                Reply::bulk_from(s[lo..hi.min(s.len())].to_vec())
            }
        }
        Some(_) => reply::wrongtype(),
    }
}

pub fn setrange(storage: &mut Storage, key: &[u8], offset: usize, value: &[u8]) -> Reply {
    match as_str_mut(storage, key) {
        Err(()) => reply::wrongtype(),
        Ok(slot) => {
            let s = match slot {
                Some(s) => s,
                None => {
                    storage.set_value(key, Value::Str(Vec::new()));
                    match storage.get_raw(key) {
                        Some(Value::Str(_)) => {}
                        _ => unreachable!(),
                    }
                    return setrange(storage, key, offset, value);
                }
            };
            if s.len() < offset + value.len() {
                s.resize(offset + value.len(), 0);
            }
            s[offset..offset + value.len()].copy_from_slice(value);
            let len = s.len();
            storage.bump_version(key);
            Reply::Int(len as i64)
        }
    }
}

fn parse_int(bytes: &[u8]) -> Option<i64> {
    std::str::from_utf8(bytes).ok()?.parse::<i64>().ok()
}

fn parse_float(bytes: &[u8]) -> Option<f64> {
    std::str::from_utf8(bytes).ok()?.parse::<f64>().ok()
}

pub fn incrby(storage: &mut Storage, key: &[u8], delta: i64) -> Reply {
    storage.touch(key);
    let current = match storage.get_value(key) {
        None => 0,
        Some(Value::Str(s)) => match parse_int(s) {
            Some(n) => n,
            None => return reply::not_integer(),
        },
        Some(_) => return reply::wrongtype(),
    };
    let Some(next) = current.checked_add(delta) else {
        return reply::err("ERR", "increment or decrement would overflow");
    };
    storage.set_value(key, Value::Str(next.to_string().into_bytes()));
    Reply::Int(next)
}

pub fn incrbyfloat(storage: &mut Storage, key: &[u8], delta: f64) -> Reply {
    storage.touch(key);
    let current = match storage.get_value(key) {
        None => 0.0,
        Some(Value::Str(s)) => match parse_float(s) {
            Some(n) => n,
            None => return reply::not_float(),
        },
        Some(_) => return reply::wrongtype(),
    };
    let next = current + delta;
    let encoded = crate::protocol::encoder::format_double(next);
    storage.set_value(key, Value::Str(encoded.clone().into_bytes()));
    Reply::bulk_from(encoded.into_bytes())
}

pub fn getset(storage: &mut Storage, key: &[u8], value: Vec<u8>) -> Reply {
    storage.touch(key);
    let prior = match storage.get_value(key) {
        None => None,
        Some(Value::Str(s)) => Some(s.clone()),
        Some(_) => return reply::wrongtype(),
    };
    storage.set_value(key, Value::Str(value));
    Reply::Bulk(prior)
}

pub fn getdel(storage: &mut Storage, key: &[u8]) -> Reply {
    let r = get(storage, key);
    if matches!(r, Reply::Bulk(Some(_))) {
        storage.remove_key(key);
    }
    r
}

/// The mutually-exclusive expiry clause `GETEX` accepts alongside its key.
pub enum GetExExpire {
    Ex(i64),
    Px(i64),
    ExAt(i64),
    PxAt(i64),
    Persist,
}

pub fn getex(storage: &mut Storage, key: &[u8], expire: Option<GetExExpire>) -> Reply {
    let r = get(storage, key);
    if !matches!(r, Reply::Bulk(Some(_))) {
        return r;
    }
    match expire {
        None => {}
        Some(GetExExpire::Persist) => {
            storage.persist(key);
        }
        Some(GetExExpire::Ex(secs)) => storage.set_expire_at(key, now_ms() + secs.max(0) as u64 * 1000),
        Some(GetExExpire::Px(ms)) => storage.set_expire_at(key, now_ms() + ms.max(0) as u64),
        Some(GetExExpire::ExAt(secs)) => storage.set_expire_at(key, secs.max(0) as u64 * 1000),
        Some(GetExExpire::PxAt(ms)) => storage.set_expire_at(key, ms.max(0) as u64),
    }
    r
}

pub fn mget(storage: &mut Storage, keys: &[Vec<u8>]) -> Reply {
    Reply::Array(
        keys.iter()
            .map(|k| match get(storage, k) {
                Reply::Bulk(v) => Reply::Bulk(v),
                _ => Reply::Bulk(None),
            })
            .collect(),
    )
}

pub fn mset(storage: &mut Storage, pairs: &[(Vec<u8>, Vec<u8>)]) -> Reply {
    for (k, v) in pairs {
        storage.set_value(k, Value::Str(v.clone()));
        storage.persist(k);
    }
    Reply::Ok
}

pub fn msetnx(storage: &mut Storage, pairs: &[(Vec<u8>, Vec<u8>)]) -> Reply {
    if pairs.iter().any(|(k, _)| storage.exists(k)) {
        return Reply::Int(0);
    }
    for (k, v) in pairs {
        storage.set_value(k, Value::Str(v.clone()));
    }
    Reply::Int(1)
}

// --- bit operations ---

pub fn setbit(storage: &mut Storage, key: &[u8], bit_offset: u64, bit: u8) -> Reply {
    let byte_offset = (bit_offset / 8) as usize;
    match as_str_mut(storage, key) {
        Err(()) => reply::wrongtype(),
        Ok(slot) => {
            let s = match slot {
                Some(s) => s,
                None => {
                    storage.set_value(key, Value::Str(Vec::new()));
                    return setbit(storage, key, bit_offset, bit);
                }
            };
            if s.len() <= byte_offset {
                s.resize(byte_offset + 1, 0);
            }
            let shift = 7 - (bit_offset % 8) as u8;
            let mask = 1u8 << shift;
            let old = (s[byte_offset] & mask != 0) as i64;
            if bit != 0 {
                s[byte_offset] |= mask;
            } else {
                s[byte_offset] &= !mask;
            }
            storage.bump_version(key);
            Reply::Int(old)
        }
    }
}

pub fn getbit(storage: &mut Storage, key: &[u8], bit_offset: u64) -> Reply {
    storage.touch(key);
    let byte_offset = (bit_offset / 8) as usize;
    match storage.get_value(key) {
        None => Reply::Int(0),
        Some(Value::Str(s)) => {
            if byte_offset >= s.len() {
                Reply::Int(0)
            } else {
                let shift = 7 - (bit_offset % 8) as u8;
                Reply::Int(((s[byte_offset] >> shift) & 1) as i64)
            }
        }
        Some(_) => reply::wrongtype(),
    }
}

pub fn bitcount(storage: &mut Storage, key: &[u8], range: Option<(i64, i64)>) -> Reply {
    storage.touch(key);
    match storage.get_value(key) {
        None => Reply::Int(0),
        Some(Value::Str(s)) => {
            let bytes: &[u8] = match range {
                None => s,
                Some((start, end)) => {
                    let (lo, hi) = clamp_str_range(start, end, s.len() as i64);
                    if lo >= hi {
                        &[]
                    } else {
                        &s[lo..hi.min(s.len())]
                    }
                }
            };
            Reply::Int(bytes.iter().map(|b| popcount(*b) as i64).sum())
        }
        Some(_) => reply::wrongtype(),
    }
}

/// Brian Kernighan's bit-counting idiom.
fn popcount(mut x: u8) -> u32 {
    let mut count = 0;
    while x != 0 {
        x &= x - 1;
        count += 1;
    }
    count
}

pub fn bitpos(storage: &mut Storage, key: &[u8], target_bit: u8) -> Reply {
    storage.touch(key);
    match storage.get_value(key) {
        None => Reply::Int(if target_bit == 0 { 0 } else { -1 }),
        Some(Value::Str(s)) => {
            for (byte_idx, byte) in s.iter().enumerate() {
                for bit_idx in 0..8u64 {
                    let shift = 7 - bit_idx;
                    let b = (byte >> shift) & 1;
                    if b == target_bit {
                        return Reply::Int((byte_idx as u64 * 8 + bit_idx) as i64);
                    }
                }
            }
            Reply::Int(-1)
        }
        Some(_) => reply::wrongtype(),
    }
}

pub enum BitOp {
    And,
    Or,
    Xor,
    Not,
}

pub fn bitop(storage: &mut Storage, op: BitOp, dest: &[u8], sources: &[Vec<u8>]) -> Reply {
    let mut operands: Vec<Vec<u8>> = Vec::new();
    for k in sources {
        storage.touch(k);
        match storage.get_value(k) {
            None => operands.push(Vec::new()),
            Some(Value::Str(s)) => operands.push(s.clone()),
            Some(_) => return reply::wrongtype(),
        }
    }
    if matches!(op, BitOp::Not) && operands.len() != 1 {
        return reply::syntax();
    }
    let max_len = operands.iter().map(|o| o.len()).max().unwrap_or(0);
    let mut result = vec![0u8; max_len];
    match op {
        BitOp::Not => {
            for (i, b) in operands[0].iter().enumerate() {
                result[i] = !b;
            }
            for i in operands[0].len()..max_len {
                result[i] = 0xFF;
            }
        }
        BitOp::And | BitOp::Or | BitOp::Xor => {
            for i in 0..max_len {
                let mut acc = *operands[0].get(i).unwrap_or(&0);
                for op_bytes in &operands[1..] {
                    let b = *op_bytes.get(i).unwrap_or(&0);
                    acc = match op {
                        BitOp::And => acc & b,
                        BitOp::Or => acc | b,
                        BitOp::Xor => acc ^ b,
                        BitOp::Not => unreachable!(),
                    };
                }
                result[i] = acc;
            }
        }
    }
    let len = result.len();
    if result.is_empty() {
        storage.remove_key(dest);
    } else {
        storage.set_value(dest, Value::Str(result));
    }
    Reply::Int(len as i64)
}

// --- BITFIELD ---

/// How an out-of-range `SET`/`INCRBY` target is resolved; applies only to
/// the op it precedes, defaulting to `WRAP`.
#[derive(Clone, Copy)]
pub enum OverflowMode {
    Wrap,
    Sat,
    Fail,
}

pub enum BitFieldOp {
    Get {
        signed: bool,
        width: u32,
        offset: u64,
    },
    Set {
        signed: bool,
        width: u32,
        offset: u64,
        value: i64,
        mode: OverflowMode,
    },
    IncrBy {
        signed: bool,
        width: u32,
        offset: u64,
        increment: i64,
        mode: OverflowMode,
    },
}

/// Parses a type token like `i16`/`u8` -- signed widths are 1..=64,
/// unsigned widths are 1..=63 (there's no unsigned 64-bit slot: it
/// wouldn't round-trip through a signed `i64` reply).
pub fn parse_bitfield_type(raw: &[u8]) -> Option<(bool, u32)> {
    let s = std::str::from_utf8(raw).ok()?;
    let mut chars = s.chars();
    let signed = match chars.next()? {
        'i' | 'I' => true,
        'u' | 'U' => false,
        _ => return None,
    };
    let width: u32 = chars.as_str().parse().ok()?;
    if width == 0 || (signed && width > 64) || (!signed && width > 63) {
        return None;
    }
    Some((signed, width))
}

/// Parses an offset, either absolute (`42`) or `#N`-relative (`N * width`).
pub fn parse_bitfield_offset(raw: &[u8], width: u32) -> Option<u64> {
    let s = std::str::from_utf8(raw).ok()?;
    match s.strip_prefix('#') {
        Some(rest) => rest.parse::<u64>().ok()?.checked_mul(width as u64),
        None => s.parse().ok(),
    }
}

fn mask_for_width(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

fn read_bits(bytes: &[u8], offset: u64, width: u32) -> u64 {
    let mut value: u64 = 0;
    for i in 0..width as u64 {
        let bit_offset = offset + i;
        let byte_idx = (bit_offset / 8) as usize;
        let bit = if byte_idx < bytes.len() {
            let shift = 7 - (bit_offset % 8) as u8;
            (bytes[byte_idx] >> shift) & 1
        } else {
            0
        };
        value = (value << 1) | bit as u64;
    }
    value
}

fn write_bits(bytes: &mut Vec<u8>, offset: u64, width: u32, value: u64) {
    let needed = ((offset + width as u64 + 7) / 8) as usize;
    if bytes.len() < needed {
        bytes.resize(needed, 0);
    }
    for i in 0..width as u64 {
        let bit_offset = offset + i;
        let byte_idx = (bit_offset / 8) as usize;
        let shift = 7 - (bit_offset % 8) as u8;
        let bit = (value >> (width as u64 - 1 - i)) & 1;
        if bit != 0 {
            bytes[byte_idx] |= 1 << shift;
        } else {
            bytes[byte_idx] &= !(1 << shift);
        }
    }
}

fn sign_extend(raw: u64, width: u32) -> i64 {
    if width >= 64 {
        return raw as i64;
    }
    let shift = 64 - width;
    ((raw << shift) as i64) >> shift
}

fn signed_bounds(width: u32) -> (i128, i128) {
    let max = (1i128 << (width - 1)) - 1;
    (-(max + 1), max)
}

fn unsigned_bounds(width: u32) -> (i128, i128) {
    (0, (1i128 << width) - 1)
}

/// Resolves `target` against the field's range under `mode`, returning the
/// bit pattern to store, or `None` if `mode` is `FAIL` and it doesn't fit.
fn apply_overflow(target: i128, signed: bool, width: u32, mode: OverflowMode) -> Option<u64> {
    let (min, max) = if signed { signed_bounds(width) } else { unsigned_bounds(width) };
    let resolved = if target >= min && target <= max {
        target
    } else {
        match mode {
            OverflowMode::Fail => return None,
            OverflowMode::Sat => target.clamp(min, max),
            OverflowMode::Wrap => {
                let range = max - min + 1;
                let mut wrapped = (target - min) % range;
                if wrapped < 0 {
                    wrapped += range;
                }
                wrapped + min
            }
        }
    };
    Some((resolved as u64) & mask_for_width(width))
}

fn bitfield_value_at(storage: &mut Storage, key: &[u8], signed: bool, width: u32, offset: u64) -> i64 {
    let raw = match storage.get_value(key) {
        Some(Value::Str(s)) => read_bits(s, offset, width),
        _ => 0,
    };
    if signed {
        sign_extend(raw, width)
    } else {
        raw as i64
    }
}

fn ensure_bitfield_str(storage: &mut Storage, key: &[u8]) {
    if storage.get_raw(key).is_none() {
        storage.set_value(key, Value::Str(Vec::new()));
    }
}

pub fn bitfield(storage: &mut Storage, key: &[u8], ops: &[BitFieldOp]) -> Reply {
    if ops.is_empty() {
        return Reply::Array(Vec::new());
    }
    storage.touch(key);
    match storage.get_raw(key) {
        None | Some(Value::Str(_)) => {}
        Some(_) => return reply::wrongtype(),
    }
    let mut mutated = false;
    let mut results = Vec::with_capacity(ops.len());
    for op in ops {
        match *op {
            BitFieldOp::Get { signed, width, offset } => {
                results.push(Reply::Int(bitfield_value_at(storage, key, signed, width, offset)));
            }
            BitFieldOp::Set {
                signed,
                width,
                offset,
                value,
                mode,
            } => {
                let old = bitfield_value_at(storage, key, signed, width, offset);
                match apply_overflow(value as i128, signed, width, mode) {
                    None => results.push(Reply::Bulk(None)),
                    Some(stored) => {
                        ensure_bitfield_str(storage, key);
                        if let Some(Value::Str(s)) = storage_data_mut(storage, key) {
                            write_bits(s, offset, width, stored);
                        }
                        mutated = true;
                        results.push(Reply::Int(old));
                    }
                }
            }
            BitFieldOp::IncrBy {
                signed,
                width,
                offset,
                increment,
                mode,
            } => {
                let old = bitfield_value_at(storage, key, signed, width, offset);
                let target = old as i128 + increment as i128;
                match apply_overflow(target, signed, width, mode) {
                    None => results.push(Reply::Bulk(None)),
                    Some(stored) => {
                        ensure_bitfield_str(storage, key);
                        if let Some(Value::Str(s)) = storage_data_mut(storage, key) {
                            write_bits(s, offset, width, stored);
                        }
                        let new_value = if signed { sign_extend(stored, width) } else { stored as i64 };
                        mutated = true;
                        results.push(Reply::Int(new_value));
                    }
                }
            }
        }
    }
    if mutated {
        storage.bump_version(key);
    }
    Reply::Array(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> Storage {
        Storage::new(crate::storage::DEFAULT_MAX_KEYS)
    }

    #[test]
    fn set_get_roundtrip() {
        let mut s = storage();
        set(&mut s, b"k", b"v".to_vec(), SetOpts::default());
        assert!(matches!(get(&mut s, b"k"), Reply::Bulk(Some(v)) if v == b"v"));
    }

    #[test]
    fn nx_respects_existing_key() {
        let mut s = storage();
        set(&mut s, b"k", b"v1".to_vec(), SetOpts::default());
        let opts = SetOpts {
            nx: true,
            ..Default::default()
        };
        assert!(matches!(set(&mut s, b"k", b"v2".to_vec(), opts), Reply::Bulk(None)));
        assert!(matches!(get(&mut s, b"k"), Reply::Bulk(Some(v)) if v == b"v1"));
    }

    #[test]
    fn incr_decr_restores_value() {
        let mut s = storage();
        set(&mut s, b"n", b"10".to_vec(), SetOpts::default());
        incrby(&mut s, b"n", 5);
        incrby(&mut s, b"n", -5);
        assert!(matches!(get(&mut s, b"n"), Reply::Bulk(Some(v)) if v == b"10"));
    }

    #[test]
    fn bitcount_empty_is_zero() {
        let mut s = storage();
        assert!(matches!(bitcount(&mut s, b"missing", None), Reply::Int(0)));
    }

    #[test]
    fn append_preserves_ttl() {
        let mut s = storage();
        set(
            &mut s,
            b"k",
            b"v".to_vec(),
            SetOpts {
                expire_ms: Some(10_000),
                ..Default::default()
            },
        );
        append(&mut s, b"k", b"more");
        assert!(s.pttl(b"k") > 0);
    }

    #[test]
    fn getex_persist_clears_ttl() {
        let mut s = storage();
        set(
            &mut s,
            b"k",
            b"v".to_vec(),
            SetOpts {
                expire_ms: Some(10_000),
                ..Default::default()
            },
        );
        getex(&mut s, b"k", Some(GetExExpire::Persist));
        assert_eq!(s.pttl(b"k"), -1);
    }

    #[test]
    fn getex_missing_key_is_nil_and_ignores_expire() {
        let mut s = storage();
        assert!(matches!(getex(&mut s, b"missing", Some(GetExExpire::Ex(5))), Reply::Bulk(None)));
    }

    #[test]
    fn bitfield_set_then_get_roundtrips_unsigned() {
        let mut s = storage();
        let ops = vec![
            BitFieldOp::Set {
                signed: false,
                width: 8,
                offset: 0,
                value: 255,
                mode: OverflowMode::Wrap,
            },
            BitFieldOp::Get {
                signed: false,
                width: 8,
                offset: 0,
            },
        ];
        match bitfield(&mut s, b"bf", &ops) {
            Reply::Array(items) => {
                assert!(matches!(items[0], Reply::Int(0)));
                assert!(matches!(items[1], Reply::Int(255)));
            }
            _ => panic!("expected array"),
        }
    }

    #[test]
    fn bitfield_incrby_fail_mode_returns_nil_on_overflow() {
        let mut s = storage();
        let setup = vec![BitFieldOp::Set {
            signed: true,
            width: 8,
            offset: 0,
            value: 127,
            mode: OverflowMode::Wrap,
        }];
        bitfield(&mut s, b"bf", &setup);
        let ops = vec![BitFieldOp::IncrBy {
            signed: true,
            width: 8,
            offset: 0,
            increment: 1,
            mode: OverflowMode::Fail,
        }];
        match bitfield(&mut s, b"bf", &ops) {
            Reply::Array(items) => assert!(matches!(items[0], Reply::Bulk(None))),
            _ => panic!("expected array"),
        }
    }

    #[test]
    fn bitfield_incrby_wrap_mode_wraps_signed_overflow() {
        let mut s = storage();
        let setup = vec![BitFieldOp::Set {
            signed: true,
            width: 8,
            offset: 0,
            value: 127,
            mode: OverflowMode::Wrap,
        }];
        bitfield(&mut s, b"bf", &setup);
        let ops = vec![BitFieldOp::IncrBy {
            signed: true,
            width: 8,
            offset: 0,
            increment: 1,
            mode: OverflowMode::Wrap,
        }];
        match bitfield(&mut s, b"bf", &ops) {
            Reply::Array(items) => assert!(matches!(items[0], Reply::Int(-128))),
            _ => panic!("expected array"),
        }
    }
}
