//! An intermediate reply value.
//!
//! Data-type operations build one of these instead of writing RESP bytes
//! directly, so that the transaction engine can buffer and later flush a
//! batch of results (including nested arrays, e.g. `EXEC`'s own reply)
//! without duplicating every operation's encoding logic.

use super::encoder::Encoder;

#[derive(Debug, Clone)]
pub enum Reply {
    Ok,
    Simple(String),
    Int(i64),
    Double(f64),
    Bulk(Option<Vec<u8>>),
    Array(Vec<Reply>),
    NilArray,
    Error(String, String),
}

impl Reply {
    pub fn bulk_from(v: Vec<u8>) -> Reply {
        Reply::Bulk(Some(v))
    }

    pub fn encode(&self, enc: &mut Encoder) {
        match self {
            Reply::Ok => enc.simple_string("OK"),
            Reply::Simple(s) => enc.simple_string(s),
            Reply::Int(n) => enc.integer(*n),
            Reply::Double(d) => enc.double(*d),
            Reply::Bulk(b) => enc.bulk_or_nil(b.as_deref()),
            Reply::NilArray => enc.nil_array(),
            Reply::Error(prefix, msg) => enc.error(prefix, msg),
            Reply::Array(items) => {
                enc.array_header(items.len());
                for item in items {
                    item.encode(enc);
                }
            }
        }
    }
}

pub fn err(prefix: &str, msg: impl Into<String>) -> Reply {
    Reply::Error(prefix.to_string(), msg.into())
}

pub fn wrongtype() -> Reply {
    err(
        "WRONGTYPE",
        "Operation against a key holding the wrong kind of value",
    )
}

pub fn not_integer() -> Reply {
    err("ERR", "value is not an integer or out of range")
}

pub fn not_float() -> Reply {
    err("ERR", "value is not a valid float")
}

pub fn syntax() -> Reply {
    err("ERR", "syntax error")
}

pub fn wrong_arity(cmd: &str) -> Reply {
    err(
        "ERR",
        format!("wrong number of arguments for '{}' command", cmd.to_lowercase()),
    )
}

pub fn oom() -> Reply {
    err(
        "OOM",
        "command not allowed when used memory > 'maxmemory'",
    )
}
