//! The command router (4.G): a flat dispatch over uppercase command bytes.
//!
//! Arity and key-position metadata live next to each entry rather than in a
//! side table -- there's exactly one dispatch site, so a table indirection
//! would just be another thing to keep in sync.

use crate::protocol::reply::{self, Reply};
use crate::registry;
use crate::storage::ops::{hash, hyperloglog, list, set, stream, string, zset};
use crate::storage::Storage;
use crate::util::now_ms;

/// Commands that mutate the keyspace; gated on [`registry::state_okay`] so
/// a poisoned registry (a failed background save) stops writes before they
/// compound an on-disk state that's already out of sync.
fn is_write_command(cmd: &[u8]) -> bool {
    matches!(
        cmd,
        b"DEL" | b"UNLINK"
            | b"RENAME"
            | b"RENAMENX"
            | b"EXPIRE"
            | b"PEXPIRE"
            | b"EXPIREAT"
            | b"PEXPIREAT"
            | b"PERSIST"
            | b"FLUSHALL"
            | b"FLUSHDB"
            | b"SET"
            | b"SETNX"
            | b"SETEX"
            | b"PSETEX"
            | b"APPEND"
            | b"SETRANGE"
            | b"INCR"
            | b"DECR"
            | b"INCRBY"
            | b"DECRBY"
            | b"INCRBYFLOAT"
            | b"GETSET"
            | b"GETDEL"
            | b"GETEX"
            | b"MSET"
            | b"MSETNX"
            | b"SETBIT"
            | b"BITOP"
            | b"BITFIELD"
            | b"HSET"
            | b"HMSET"
            | b"HSETNX"
            | b"HDEL"
            | b"HINCRBY"
            | b"HINCRBYFLOAT"
            | b"LPUSH"
            | b"RPUSH"
            | b"LPOP"
            | b"RPOP"
            | b"LSET"
            | b"LTRIM"
            | b"LINSERT"
            | b"LREM"
            | b"SADD"
            | b"SREM"
            | b"SPOP"
            | b"SMOVE"
            | b"SINTERSTORE"
            | b"SUNIONSTORE"
            | b"SDIFFSTORE"
            | b"ZADD"
            | b"ZREM"
            | b"ZINCRBY"
            | b"XADD"
            | b"XTRIM"
            | b"PFADD"
            | b"PFMERGE"
    )
}

/// `true` if `arity` is satisfied by `argc` (the command token plus its
/// arguments). Positive arity is exact; negative is a minimum.
fn arity_ok(arity: i32, argc: usize) -> bool {
    if arity >= 0 {
        argc as i32 == arity
    } else {
        argc as i32 >= -arity
    }
}

fn int_arg(bytes: &[u8]) -> Result<i64, Reply> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(reply::not_integer)
}

fn float_arg(bytes: &[u8]) -> Result<f64, Reply> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(reply::not_float)
}

macro_rules! try_or_return {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(r) => return r,
        }
    };
}

/// Dispatches one already-queued-or-direct command. `cmd` must already be
/// uppercase (the parser guarantees this). Returns the reply to send; the
/// caller is responsible for anything connection-scoped (MULTI/SUBSCRIBE
/// interception happens before this is reached).
pub fn dispatch(storage: &mut Storage, cmd: &[u8], args: &[Vec<u8>]) -> Reply {
    if is_write_command(cmd) && !registry::state_okay() {
        return reply::oom();
    }

    let argc = args.len() + 1;
    let name = std::str::from_utf8(cmd).unwrap_or("");

    macro_rules! arity {
        ($min_or_exact:expr) => {
            if !arity_ok($min_or_exact, argc) {
                return reply::wrong_arity(name);
            }
        };
    }

    match cmd {
        b"PING" => {
            arity!(-1);
            match args.first() {
                Some(msg) => Reply::bulk_from(msg.clone()),
                None => Reply::Simple("PONG".to_string()),
            }
        }
        b"ECHO" => {
            arity!(2);
            Reply::bulk_from(args[0].clone())
        }

        // --- keyspace ---
        b"DEL" | b"UNLINK" => {
            arity!(-2);
            Reply::Int(args.iter().filter(|k| storage.remove_key(k)).count() as i64)
        }
        b"EXISTS" => {
            arity!(-2);
            Reply::Int(args.iter().filter(|k| storage.exists(k)).count() as i64)
        }
        b"TYPE" => {
            arity!(2);
            match storage.type_of(&args[0]) {
                Some(t) => Reply::Simple(t.name().to_string()),
                None => Reply::Simple("none".to_string()),
            }
        }
        b"KEYS" => {
            arity!(2);
            Reply::Array(
                storage
                    .keys_matching(&args[0])
                    .into_iter()
                    .map(Reply::bulk_from)
                    .collect(),
            )
        }
        b"RENAME" => {
            arity!(3);
            if storage.rename(&args[0], &args[1]) {
                Reply::Ok
            } else {
                reply::err("ERR", "no such key")
            }
        }
        b"RENAMENX" => {
            arity!(3);
            if storage.exists(&args[1]) {
                return Reply::Int(0);
            }
            if storage.rename(&args[0], &args[1]) {
                Reply::Int(1)
            } else {
                reply::err("ERR", "no such key")
            }
        }
        b"EXPIRE" => {
            arity!(-3);
            let secs = try_or_return!(int_arg(&args[1]));
            Reply::Int(storage.set_expire_at(&args[0], now_ms() + (secs.max(0) as u64) * 1000) as i64)
        }
        b"PEXPIRE" => {
            arity!(-3);
            let ms = try_or_return!(int_arg(&args[1]));
            Reply::Int(storage.set_expire_at(&args[0], now_ms() + ms.max(0) as u64) as i64)
        }
        b"EXPIREAT" => {
            arity!(-3);
            let secs = try_or_return!(int_arg(&args[1]));
            Reply::Int(storage.set_expire_at(&args[0], (secs.max(0) as u64) * 1000) as i64)
        }
        b"PEXPIREAT" => {
            arity!(-3);
            let ms = try_or_return!(int_arg(&args[1]));
            Reply::Int(storage.set_expire_at(&args[0], ms.max(0) as u64) as i64)
        }
        b"TTL" => {
            arity!(2);
            Reply::Int(storage.ttl(&args[0]))
        }
        b"PTTL" => {
            arity!(2);
            Reply::Int(storage.pttl(&args[0]))
        }
        b"PERSIST" => {
            arity!(2);
            Reply::Int(storage.persist(&args[0]) as i64)
        }
        b"FLUSHALL" | b"FLUSHDB" => {
            arity!(-1);
            storage.flush();
            Reply::Ok
        }
        b"DBSIZE" => {
            arity!(1);
            Reply::Int(storage.len() as i64)
        }

        // --- strings ---
        b"GET" => {
            arity!(2);
            string::get(storage, &args[0])
        }
        b"SET" => {
            arity!(-3);
            dispatch_set(storage, args)
        }
        b"SETNX" => {
            arity!(3);
            let mut opts = string::SetOpts::default();
            opts.nx = true;
            match string::set(storage, &args[0], args[1].clone(), opts) {
                Reply::Ok => Reply::Int(1),
                _ => Reply::Int(0),
            }
        }
        b"SETEX" => {
            arity!(4);
            let secs = try_or_return!(int_arg(&args[1]));
            if secs <= 0 {
                return reply::err("ERR", "invalid expire time in 'setex' command");
            }
            let opts = string::SetOpts {
                expire_ms: Some(secs as u64 * 1000),
                ..Default::default()
            };
            string::set(storage, &args[0], args[2].clone(), opts)
        }
        b"PSETEX" => {
            arity!(4);
            let ms = try_or_return!(int_arg(&args[1]));
            if ms <= 0 {
                return reply::err("ERR", "invalid expire time in 'psetex' command");
            }
            let opts = string::SetOpts {
                expire_ms: Some(ms as u64),
                ..Default::default()
            };
            string::set(storage, &args[0], args[2].clone(), opts)
        }
        b"APPEND" => {
            arity!(3);
            string::append(storage, &args[0], &args[1])
        }
        b"STRLEN" => {
            arity!(2);
            string::strlen(storage, &args[0])
        }
        b"GETRANGE" | b"SUBSTR" => {
            arity!(4);
            let start = try_or_return!(int_arg(&args[1]));
            let end = try_or_return!(int_arg(&args[2]));
            string::getrange(storage, &args[0], start, end)
        }
        b"SETRANGE" => {
            arity!(4);
            let offset = try_or_return!(int_arg(&args[1]));
            if offset < 0 {
                return reply::err("ERR", "offset is out of range");
            }
            string::setrange(storage, &args[0], offset as usize, &args[2])
        }
        b"INCR" => {
            arity!(2);
            string::incrby(storage, &args[0], 1)
        }
        b"DECR" => {
            arity!(2);
            string::incrby(storage, &args[0], -1)
        }
        b"INCRBY" => {
            arity!(3);
            let n = try_or_return!(int_arg(&args[1]));
            string::incrby(storage, &args[0], n)
        }
        b"DECRBY" => {
            arity!(3);
            let n = try_or_return!(int_arg(&args[1]));
            string::incrby(storage, &args[0], -n)
        }
        b"INCRBYFLOAT" => {
            arity!(3);
            let n = try_or_return!(float_arg(&args[1]));
            string::incrbyfloat(storage, &args[0], n)
        }
        b"GETSET" => {
            arity!(3);
            string::getset(storage, &args[0], args[1].clone())
        }
        b"GETDEL" => {
            arity!(2);
            string::getdel(storage, &args[0])
        }
        b"GETEX" => {
            arity!(-2);
            dispatch_getex(storage, args)
        }
        b"MGET" => {
            arity!(-2);
            string::mget(storage, args)
        }
        b"MSET" => {
            arity!(-3);
            if args.len() % 2 != 0 {
                return reply::wrong_arity(name);
            }
            string::mset(storage, &pair_up(args))
        }
        b"MSETNX" => {
            arity!(-3);
            if args.len() % 2 != 0 {
                return reply::wrong_arity(name);
            }
            string::msetnx(storage, &pair_up(args))
        }
        b"SETBIT" => {
            arity!(4);
            let offset = try_or_return!(int_arg(&args[1]));
            let bit = try_or_return!(int_arg(&args[2]));
            if offset < 0 || (bit != 0 && bit != 1) {
                return reply::err("ERR", "bit is not an integer or out of range");
            }
            string::setbit(storage, &args[0], offset as u64, bit as u8)
        }
        b"GETBIT" => {
            arity!(3);
            let offset = try_or_return!(int_arg(&args[1]));
            if offset < 0 {
                return reply::err("ERR", "bit offset is not an integer or out of range");
            }
            string::getbit(storage, &args[0], offset as u64)
        }
        b"BITCOUNT" => {
            arity!(-2);
            let range = if args.len() >= 3 {
                let start = try_or_return!(int_arg(&args[1]));
                let end = try_or_return!(int_arg(&args[2]));
                Some((start, end))
            } else {
                None
            };
            string::bitcount(storage, &args[0], range)
        }
        b"BITPOS" => {
            arity!(-3);
            let bit = try_or_return!(int_arg(&args[1]));
            if bit != 0 && bit != 1 {
                return reply::err("ERR", "the bit argument must be 1 or 0");
            }
            string::bitpos(storage, &args[0], bit as u8)
        }
        b"BITOP" => {
            arity!(-4);
            let op = match args[0].to_ascii_uppercase().as_slice() {
                b"AND" => string::BitOp::And,
                b"OR" => string::BitOp::Or,
                b"XOR" => string::BitOp::Xor,
                b"NOT" => string::BitOp::Not,
                _ => return reply::syntax(),
            };
            string::bitop(storage, op, &args[1], &args[2..])
        }
        b"BITFIELD" => {
            arity!(-2);
            dispatch_bitfield(storage, args)
        }

        // --- hashes ---
        b"HSET" | b"HMSET" => {
            arity!(-4);
            if (args.len() - 1) % 2 != 0 {
                return reply::wrong_arity(name);
            }
            let pairs = pair_up(&args[1..]);
            let r = hash::hset(storage, &args[0], &pairs);
            if cmd == b"HMSET" {
                match r {
                    Reply::Error(..) => r,
                    _ => Reply::Ok,
                }
            } else {
                r
            }
        }
        b"HSETNX" => {
            arity!(4);
            hash::hsetnx(storage, &args[0], &args[1], args[2].clone())
        }
        b"HGET" => {
            arity!(3);
            hash::hget(storage, &args[0], &args[1])
        }
        b"HMGET" => {
            arity!(-3);
            hash::hmget(storage, &args[0], &args[1..])
        }
        b"HDEL" => {
            arity!(-3);
            hash::hdel(storage, &args[0], &args[1..])
        }
        b"HEXISTS" => {
            arity!(3);
            hash::hexists(storage, &args[0], &args[1])
        }
        b"HLEN" => {
            arity!(2);
            hash::hlen(storage, &args[0])
        }
        b"HGETALL" => {
            arity!(2);
            hash::hgetall(storage, &args[0])
        }
        b"HKEYS" => {
            arity!(2);
            hash::hkeys(storage, &args[0])
        }
        b"HVALS" => {
            arity!(2);
            hash::hvals(storage, &args[0])
        }
        b"HINCRBY" => {
            arity!(4);
            let n = try_or_return!(int_arg(&args[2]));
            hash::hincrby(storage, &args[0], &args[1], n)
        }
        b"HINCRBYFLOAT" => {
            arity!(4);
            let n = try_or_return!(float_arg(&args[2]));
            hash::hincrbyfloat(storage, &args[0], &args[1], n)
        }

        // --- lists ---
        b"LPUSH" => {
            arity!(-3);
            list::lpush(storage, &args[0], &args[1..])
        }
        b"RPUSH" => {
            arity!(-3);
            list::rpush(storage, &args[0], &args[1..])
        }
        b"LPOP" => {
            arity!(-2);
            let count = try_or_return!(opt_count(&args[1..]));
            list::lpop(storage, &args[0], count)
        }
        b"RPOP" => {
            arity!(-2);
            let count = try_or_return!(opt_count(&args[1..]));
            list::rpop(storage, &args[0], count)
        }
        b"LLEN" => {
            arity!(2);
            list::llen(storage, &args[0])
        }
        b"LRANGE" => {
            arity!(4);
            let start = try_or_return!(int_arg(&args[1]));
            let stop = try_or_return!(int_arg(&args[2]));
            list::lrange(storage, &args[0], start, stop)
        }
        b"LINDEX" => {
            arity!(3);
            let idx = try_or_return!(int_arg(&args[1]));
            list::lindex(storage, &args[0], idx)
        }
        b"LSET" => {
            arity!(4);
            let idx = try_or_return!(int_arg(&args[1]));
            list::lset(storage, &args[0], idx, args[2].clone())
        }
        b"LTRIM" => {
            arity!(4);
            let start = try_or_return!(int_arg(&args[1]));
            let stop = try_or_return!(int_arg(&args[2]));
            list::ltrim(storage, &args[0], start, stop)
        }
        b"LINSERT" => {
            arity!(5);
            let where_ = match args[1].to_ascii_uppercase().as_slice() {
                b"BEFORE" => list::InsertWhere::Before,
                b"AFTER" => list::InsertWhere::After,
                _ => return reply::syntax(),
            };
            list::linsert(storage, &args[0], where_, &args[2], args[3].clone())
        }
        b"LREM" => {
            arity!(4);
            let count = try_or_return!(int_arg(&args[1]));
            list::lrem(storage, &args[0], count, &args[2])
        }

        // --- sets ---
        b"SADD" => {
            arity!(-3);
            set::sadd(storage, &args[0], &args[1..])
        }
        b"SREM" => {
            arity!(-3);
            set::srem(storage, &args[0], &args[1..])
        }
        b"SISMEMBER" => {
            arity!(3);
            set::sismember(storage, &args[0], &args[1])
        }
        b"SMEMBERS" => {
            arity!(2);
            set::smembers(storage, &args[0])
        }
        b"SCARD" => {
            arity!(2);
            set::scard(storage, &args[0])
        }
        b"SPOP" => {
            arity!(-2);
            let count = try_or_return!(opt_count(&args[1..]));
            set::spop(storage, &args[0], count)
        }
        b"SRANDMEMBER" => {
            arity!(-2);
            let count = if args.len() >= 2 {
                Some(try_or_return!(int_arg(&args[1])))
            } else {
                None
            };
            set::srandmember(storage, &args[0], count)
        }
        b"SMOVE" => {
            arity!(4);
            set::smove(storage, &args[0], &args[1], &args[2])
        }
        b"SINTER" => {
            arity!(-2);
            set::sinter(storage, args)
        }
        b"SUNION" => {
            arity!(-2);
            set::sunion(storage, args)
        }
        b"SDIFF" => {
            arity!(-2);
            set::sdiff(storage, args)
        }
        b"SINTERSTORE" => {
            arity!(-3);
            set::store_algebra(storage, set::SetOp::Inter, &args[0], &args[1..])
        }
        b"SUNIONSTORE" => {
            arity!(-3);
            set::store_algebra(storage, set::SetOp::Union, &args[0], &args[1..])
        }
        b"SDIFFSTORE" => {
            arity!(-3);
            set::store_algebra(storage, set::SetOp::Diff, &args[0], &args[1..])
        }

        // --- sorted sets ---
        b"ZADD" => {
            arity!(-4);
            dispatch_zadd(storage, &args[0], &args[1..])
        }
        b"ZSCORE" => {
            arity!(3);
            zset::zscore(storage, &args[0], &args[1])
        }
        b"ZCARD" => {
            arity!(2);
            zset::zcard(storage, &args[0])
        }
        b"ZREM" => {
            arity!(-3);
            zset::zrem(storage, &args[0], &args[1..])
        }
        b"ZRANK" => {
            arity!(3);
            zset::zrank(storage, &args[0], &args[1])
        }
        b"ZRANGE" => {
            arity!(-4);
            let start = try_or_return!(int_arg(&args[1]));
            let stop = try_or_return!(int_arg(&args[2]));
            let with_scores = has_flag(&args[3..], b"WITHSCORES");
            zset::zrange(storage, &args[0], start, stop, with_scores)
        }
        b"ZRANGEBYSCORE" | b"ZREVRANGEBYSCORE" => {
            arity!(-4);
            let (lo_raw, hi_raw) = if cmd == b"ZRANGEBYSCORE" {
                (&args[1], &args[2])
            } else {
                (&args[2], &args[1])
            };
            let min = match zset::parse_bound(lo_raw) {
                Some(b) => b,
                None => return reply::err("ERR", "min or max is not a float"),
            };
            let max = match zset::parse_bound(hi_raw) {
                Some(b) => b,
                None => return reply::err("ERR", "min or max is not a float"),
            };
            let with_scores = has_flag(&args[3..], b"WITHSCORES");
            let limit = try_or_return!(parse_limit(&args[3..]));
            if cmd == b"ZRANGEBYSCORE" {
                zset::zrangebyscore(storage, &args[0], min, max, with_scores, limit)
            } else {
                zset::zrevrangebyscore(storage, &args[0], min, max, with_scores, limit)
            }
        }
        b"ZINCRBY" => {
            arity!(4);
            let delta = try_or_return!(float_arg(&args[1]));
            zset::zincrby(storage, &args[0], delta, &args[2])
        }

        // --- streams ---
        b"XADD" => {
            arity!(-5);
            dispatch_xadd(storage, args)
        }
        b"XLEN" => {
            arity!(2);
            stream::xlen(storage, &args[0])
        }
        b"XRANGE" => {
            arity!(-4);
            dispatch_xrange(storage, args, false)
        }
        b"XREVRANGE" => {
            arity!(-4);
            dispatch_xrange(storage, args, true)
        }
        b"XTRIM" => {
            arity!(-4);
            dispatch_xtrim(storage, args)
        }
        b"XREAD" => {
            arity!(-4);
            dispatch_xread(storage, args)
        }

        // --- hyperloglog ---
        b"PFADD" => {
            arity!(-2);
            hyperloglog::pfadd(storage, &args[0], &args[1..])
        }
        b"PFCOUNT" => {
            arity!(-2);
            hyperloglog::pfcount(storage, args)
        }
        b"PFMERGE" => {
            arity!(-2);
            hyperloglog::pfmerge(storage, &args[0], &args[1..])
        }

        _ => reply::err("ERR", format!("unknown command '{}'", name.to_lowercase())),
    }
}

/// Mirrors each `arity!` call inside [`dispatch`]'s match, so a command can
/// be validated (existence + arity) before it's queued by a `MULTI` block,
/// without dispatching it. `None` means the command isn't recognized.
fn lookup_arity(cmd: &[u8]) -> Option<i32> {
    Some(match cmd {
        b"PING" => -1,
        b"ECHO" => 2,
        b"DEL" | b"UNLINK" => -2,
        b"EXISTS" => -2,
        b"TYPE" => 2,
        b"KEYS" => 2,
        b"RENAME" => 3,
        b"RENAMENX" => 3,
        b"EXPIRE" => -3,
        b"PEXPIRE" => -3,
        b"EXPIREAT" => -3,
        b"PEXPIREAT" => -3,
        b"TTL" => 2,
        b"PTTL" => 2,
        b"PERSIST" => 2,
        b"FLUSHALL" | b"FLUSHDB" => -1,
        b"DBSIZE" => 1,
        b"GET" => 2,
        b"SET" => -3,
        b"SETNX" => 3,
        b"SETEX" => 4,
        b"PSETEX" => 4,
        b"APPEND" => 3,
        b"STRLEN" => 2,
        b"GETRANGE" | b"SUBSTR" => 4,
        b"SETRANGE" => 4,
        b"INCR" => 2,
        b"DECR" => 2,
        b"INCRBY" => 3,
        b"DECRBY" => 3,
        b"INCRBYFLOAT" => 3,
        b"GETSET" => 3,
        b"GETDEL" => 2,
        b"GETEX" => -2,
        b"MGET" => -2,
        b"MSET" => -3,
        b"MSETNX" => -3,
        b"SETBIT" => 4,
        b"GETBIT" => 3,
        b"BITCOUNT" => -2,
        b"BITPOS" => -3,
        b"BITOP" => -4,
        b"BITFIELD" => -2,
        b"HSET" | b"HMSET" => -4,
        b"HSETNX" => 4,
        b"HGET" => 3,
        b"HMGET" => -3,
        b"HDEL" => -3,
        b"HEXISTS" => 3,
        b"HLEN" => 2,
        b"HGETALL" => 2,
        b"HKEYS" => 2,
        b"HVALS" => 2,
        b"HINCRBY" => 4,
        b"HINCRBYFLOAT" => 4,
        b"LPUSH" => -3,
        b"RPUSH" => -3,
        b"LPOP" => -2,
        b"RPOP" => -2,
        b"LLEN" => 2,
        b"LRANGE" => 4,
        b"LINDEX" => 3,
        b"LSET" => 4,
        b"LTRIM" => 4,
        b"LINSERT" => 5,
        b"LREM" => 4,
        b"SADD" => -3,
        b"SREM" => -3,
        b"SISMEMBER" => 3,
        b"SMEMBERS" => 2,
        b"SCARD" => 2,
        b"SPOP" => -2,
        b"SRANDMEMBER" => -2,
        b"SMOVE" => 4,
        b"SINTER" => -2,
        b"SUNION" => -2,
        b"SDIFF" => -2,
        b"SINTERSTORE" => -3,
        b"SUNIONSTORE" => -3,
        b"SDIFFSTORE" => -3,
        b"ZADD" => -4,
        b"ZSCORE" => 3,
        b"ZCARD" => 2,
        b"ZREM" => -3,
        b"ZRANK" => 3,
        b"ZRANGE" => -4,
        b"ZRANGEBYSCORE" | b"ZREVRANGEBYSCORE" => -4,
        b"ZINCRBY" => 4,
        b"XADD" => -5,
        b"XLEN" => 2,
        b"XRANGE" => -4,
        b"XREVRANGE" => -4,
        b"XTRIM" => -4,
        b"XREAD" => -4,
        b"PFADD" => -2,
        b"PFCOUNT" => -2,
        b"PFMERGE" => -2,
        _ => return None,
    })
}

/// Validates a command's existence and arity without dispatching it --
/// what a `MULTI` queue needs to check before accepting a command, since
/// the router itself only validates at the moment it's about to run.
pub fn validate(cmd: &[u8], args: &[Vec<u8>]) -> Result<(), Reply> {
    let name = std::str::from_utf8(cmd).unwrap_or("");
    match lookup_arity(cmd) {
        None => Err(reply::err("ERR", format!("unknown command '{}'", name.to_lowercase()))),
        Some(arity) if arity_ok(arity, args.len() + 1) => Ok(()),
        Some(_) => Err(reply::wrong_arity(name)),
    }
}

fn pair_up(args: &[Vec<u8>]) -> Vec<(Vec<u8>, Vec<u8>)> {
    args.chunks_exact(2)
        .map(|c| (c[0].clone(), c[1].clone()))
        .collect()
}

fn opt_count(rest: &[Vec<u8>]) -> Result<Option<usize>, Reply> {
    match rest.first() {
        None => Ok(None),
        Some(n) => match int_arg(n) {
            Ok(v) if v >= 0 => Ok(Some(v as usize)),
            Ok(_) => Err(reply::err("ERR", "value is out of range, must be positive")),
            Err(r) => Err(r),
        },
    }
}

fn has_flag(args: &[Vec<u8>], flag: &[u8]) -> bool {
    args.iter().any(|a| a.eq_ignore_ascii_case(flag))
}

fn parse_limit(args: &[Vec<u8>]) -> Result<Option<(usize, usize)>, Reply> {
    let mut i = 0;
    while i < args.len() {
        if args[i].eq_ignore_ascii_case(b"LIMIT") {
            if i + 2 >= args.len() {
                return Err(reply::syntax());
            }
            let offset = int_arg(&args[i + 1])?;
            let count = int_arg(&args[i + 2])?;
            if offset < 0 || count < 0 {
                return Err(reply::err("ERR", "LIMIT offset or count is negative"));
            }
            return Ok(Some((offset as usize, count as usize)));
        }
        i += 1;
    }
    Ok(None)
}

fn dispatch_set(storage: &mut Storage, args: &[Vec<u8>]) -> Reply {
    let mut opts = string::SetOpts::default();
    let mut i = 2;
    while i < args.len() {
        match args[i].to_ascii_uppercase().as_slice() {
            b"NX" => opts.nx = true,
            b"XX" => opts.xx = true,
            b"KEEPTTL" => opts.keep_ttl = true,
            b"EX" => {
                i += 1;
                let Some(raw) = args.get(i) else { return reply::syntax() };
                let secs = try_or_return!(int_arg(raw));
                opts.expire_ms = Some(secs.max(0) as u64 * 1000);
            }
            b"PX" => {
                i += 1;
                let Some(raw) = args.get(i) else { return reply::syntax() };
                let ms = try_or_return!(int_arg(raw));
                opts.expire_ms = Some(ms.max(0) as u64);
            }
            _ => return reply::syntax(),
        }
        i += 1;
    }
    string::set(storage, &args[0], args[1].clone(), opts)
}

fn dispatch_getex(storage: &mut Storage, args: &[Vec<u8>]) -> Reply {
    let key = &args[0];
    let rest = &args[1..];
    if rest.is_empty() {
        return string::getex(storage, key, None);
    }
    if rest.len() == 1 && rest[0].eq_ignore_ascii_case(b"PERSIST") {
        return string::getex(storage, key, Some(string::GetExExpire::Persist));
    }
    if rest.len() != 2 {
        return reply::syntax();
    }
    let n = try_or_return!(int_arg(&rest[1]));
    let expire = match rest[0].to_ascii_uppercase().as_slice() {
        b"EX" => string::GetExExpire::Ex(n),
        b"PX" => string::GetExExpire::Px(n),
        b"EXAT" => string::GetExExpire::ExAt(n),
        b"PXAT" => string::GetExExpire::PxAt(n),
        _ => return reply::syntax(),
    };
    string::getex(storage, key, Some(expire))
}

fn dispatch_bitfield(storage: &mut Storage, args: &[Vec<u8>]) -> Reply {
    let key = &args[0];
    let rest = &args[1..];
    let mut ops = Vec::new();
    let mut mode = string::OverflowMode::Wrap;
    let mut i = 0;
    while i < rest.len() {
        match rest[i].to_ascii_uppercase().as_slice() {
            b"GET" => {
                if i + 2 >= rest.len() {
                    return reply::syntax();
                }
                let Some((signed, width)) = string::parse_bitfield_type(&rest[i + 1]) else {
                    return reply::err("ERR", "Invalid bitfield type. Use something like i16 u8. Note that u64 is not supported but i64 is.");
                };
                let Some(offset) = string::parse_bitfield_offset(&rest[i + 2], width) else {
                    return reply::err("ERR", "bit offset is not an integer or out of range");
                };
                ops.push(string::BitFieldOp::Get { signed, width, offset });
                i += 3;
            }
            b"SET" => {
                if i + 3 >= rest.len() {
                    return reply::syntax();
                }
                let Some((signed, width)) = string::parse_bitfield_type(&rest[i + 1]) else {
                    return reply::err("ERR", "Invalid bitfield type. Use something like i16 u8. Note that u64 is not supported but i64 is.");
                };
                let Some(offset) = string::parse_bitfield_offset(&rest[i + 2], width) else {
                    return reply::err("ERR", "bit offset is not an integer or out of range");
                };
                let value = try_or_return!(int_arg(&rest[i + 3]));
                ops.push(string::BitFieldOp::Set {
                    signed,
                    width,
                    offset,
                    value,
                    mode,
                });
                i += 4;
            }
            b"INCRBY" => {
                if i + 3 >= rest.len() {
                    return reply::syntax();
                }
                let Some((signed, width)) = string::parse_bitfield_type(&rest[i + 1]) else {
                    return reply::err("ERR", "Invalid bitfield type. Use something like i16 u8. Note that u64 is not supported but i64 is.");
                };
                let Some(offset) = string::parse_bitfield_offset(&rest[i + 2], width) else {
                    return reply::err("ERR", "bit offset is not an integer or out of range");
                };
                let increment = try_or_return!(int_arg(&rest[i + 3]));
                ops.push(string::BitFieldOp::IncrBy {
                    signed,
                    width,
                    offset,
                    increment,
                    mode,
                });
                i += 4;
            }
            b"OVERFLOW" => {
                if i + 1 >= rest.len() {
                    return reply::syntax();
                }
                mode = match rest[i + 1].to_ascii_uppercase().as_slice() {
                    b"WRAP" => string::OverflowMode::Wrap,
                    b"SAT" => string::OverflowMode::Sat,
                    b"FAIL" => string::OverflowMode::Fail,
                    _ => return reply::err("ERR", "Invalid OVERFLOW type specified"),
                };
                i += 2;
            }
            _ => return reply::syntax(),
        }
    }
    string::bitfield(storage, key, &ops)
}

fn dispatch_xread(storage: &mut Storage, args: &[Vec<u8>]) -> Reply {
    let mut i = 0;
    let mut count = None;
    loop {
        let Some(tok) = args.get(i) else { return reply::syntax() };
        if tok.eq_ignore_ascii_case(b"COUNT") {
            i += 1;
            let Some(raw) = args.get(i) else { return reply::syntax() };
            let n = try_or_return!(int_arg(raw));
            if n < 0 {
                return reply::err("ERR", "value is out of range, must be positive");
            }
            count = Some(n as usize);
            i += 1;
        } else if tok.eq_ignore_ascii_case(b"STREAMS") {
            i += 1;
            break;
        } else {
            return reply::syntax();
        }
    }
    let rest = &args[i..];
    if rest.is_empty() || rest.len() % 2 != 0 {
        return reply::err(
            "ERR",
            "Unbalanced XREAD list of streams: for each stream key an ID or '$' must be specified.",
        );
    }
    let n = rest.len() / 2;
    let mut streams = Vec::with_capacity(n);
    for (key, id_raw) in rest[..n].iter().zip(rest[n..].iter()) {
        let after = match stream::parse_id(id_raw) {
            Some(Some(id)) => id,
            _ => return reply::err("ERR", "Invalid stream ID specified as stream command argument"),
        };
        streams.push((key.clone(), after));
    }
    stream::xread(storage, &streams, count)
}

fn dispatch_zadd(storage: &mut Storage, key: &[u8], rest: &[Vec<u8>]) -> Reply {
    let mut opts = zset::ZAddOpts::default();
    let mut i = 0;
    while i < rest.len() {
        match rest[i].to_ascii_uppercase().as_slice() {
            b"NX" => opts.nx = true,
            b"XX" => opts.xx = true,
            b"GT" => opts.gt = true,
            b"LT" => opts.lt = true,
            b"CH" => opts.ch = true,
            _ => break,
        }
        i += 1;
    }
    let score_member = &rest[i..];
    if score_member.is_empty() || score_member.len() % 2 != 0 {
        return reply::syntax();
    }
    let mut pairs = Vec::with_capacity(score_member.len() / 2);
    for chunk in score_member.chunks_exact(2) {
        let score = try_or_return!(float_arg(&chunk[0]));
        pairs.push((score, chunk[1].clone()));
    }
    zset::zadd(storage, key, &opts, &pairs)
}

fn dispatch_xadd(storage: &mut Storage, args: &[Vec<u8>]) -> Reply {
    let key = &args[0];
    let id_raw = &args[1];
    let id = match stream::parse_id(id_raw) {
        Some(id) => id,
        None => return reply::err("ERR", "Invalid stream ID specified as stream command argument"),
    };
    let field_args = &args[2..];
    if field_args.is_empty() || field_args.len() % 2 != 0 {
        return reply::wrong_arity("xadd");
    }
    stream::xadd(storage, key, id, pair_up(field_args))
}

fn parse_range_id(raw: &[u8]) -> Option<(u64, u64)> {
    if raw == b"-" {
        return Some((0, 0));
    }
    if raw == b"+" {
        return Some((u64::MAX, u64::MAX));
    }
    stream::parse_id(raw).flatten()
}

fn dispatch_xrange(storage: &mut Storage, args: &[Vec<u8>], rev: bool) -> Reply {
    let key = &args[0];
    let (lo_raw, hi_raw) = if rev { (&args[2], &args[1]) } else { (&args[1], &args[2]) };
    let Some(lo) = parse_range_id(lo_raw) else {
        return reply::err("ERR", "Invalid stream ID specified as stream command argument");
    };
    let Some(hi) = parse_range_id(hi_raw) else {
        return reply::err("ERR", "Invalid stream ID specified as stream command argument");
    };
    let count = if args.len() >= 5 && args[3].eq_ignore_ascii_case(b"COUNT") {
        match int_arg(&args[4]) {
            Ok(n) if n >= 0 => Some(n as usize),
            _ => return reply::not_integer(),
        }
    } else {
        None
    };
    if rev {
        stream::xrevrange(storage, key, Some(lo), Some(hi), count)
    } else {
        stream::xrange(storage, key, Some(lo), Some(hi), count)
    }
}

fn dispatch_xtrim(storage: &mut Storage, args: &[Vec<u8>]) -> Reply {
    let key = &args[0];
    if !args[1].eq_ignore_ascii_case(b"MAXLEN") {
        return reply::syntax();
    }
    let mut idx = 2;
    if args.get(idx).map(|a| a.as_slice()) == Some(b"~") || args.get(idx).map(|a| a.as_slice()) == Some(b"=") {
        idx += 1;
    }
    let Some(raw) = args.get(idx) else { return reply::syntax() };
    let maxlen = try_or_return!(int_arg(raw));
    if maxlen < 0 {
        return reply::err("ERR", "value is out of range, must be positive");
    }
    stream::xtrim_maxlen(storage, key, maxlen as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> Storage {
        Storage::new(crate::storage::DEFAULT_MAX_KEYS)
    }

    #[test]
    fn ping_without_arg() {
        let mut s = storage();
        let r = dispatch(&mut s, b"PING", &[]);
        assert!(matches!(r, Reply::Simple(ref m) if m == "PONG"));
    }

    #[test]
    fn set_and_get_roundtrip() {
        let mut s = storage();
        dispatch(&mut s, b"SET", &[b"k".to_vec(), b"v".to_vec()]);
        let r = dispatch(&mut s, b"GET", &[b"k".to_vec()]);
        assert!(matches!(r, Reply::Bulk(Some(ref v)) if v == b"v"));
    }

    #[test]
    fn unknown_command_errors() {
        let mut s = storage();
        let r = dispatch(&mut s, b"NOTACOMMAND", &[]);
        assert!(matches!(r, Reply::Error(..)));
    }

    #[test]
    fn wrong_arity_is_reported() {
        let mut s = storage();
        let r = dispatch(&mut s, b"GET", &[]);
        assert!(matches!(r, Reply::Error(..)));
    }

    #[test]
    fn expire_then_ttl_reports_seconds() {
        let mut s = storage();
        dispatch(&mut s, b"SET", &[b"k".to_vec(), b"v".to_vec()]);
        dispatch(&mut s, b"EXPIRE", &[b"k".to_vec(), b"100".to_vec()]);
        let r = dispatch(&mut s, b"TTL", &[b"k".to_vec()]);
        assert!(matches!(r, Reply::Int(n) if n > 0 && n <= 100));
    }
}
