//! Frozen RESP2 response constants.
//!
//! Under a few hundred KB of heap, re-encoding `+OK\r\n` on every `SET` is
//! the kind of allocation that actually shows up in a profile. Anything
//! that doesn't depend on request-specific data is pre-baked here and
//! written straight through.

/// Small, frequently-returned frames.
pub mod groups {
    pub const OKAY: &[u8] = b"+OK\r\n";
    pub const PONG: &[u8] = b"+PONG\r\n";
    pub const QUEUED: &[u8] = b"+QUEUED\r\n";
    pub const NIL: &[u8] = b"$-1\r\n";
    pub const NIL_ARRAY: &[u8] = b"*-1\r\n";
    pub const EMPTY_ARRAY: &[u8] = b"*0\r\n";
    pub const ZERO: &[u8] = b":0\r\n";
    pub const ONE: &[u8] = b":1\r\n";

    pub const ERR_WRONGTYPE: &[u8] =
        b"-WRONGTYPE Operation against a key holding the wrong kind of value\r\n";
    pub const ERR_SYNTAX: &[u8] = b"-ERR syntax error\r\n";
    pub const ERR_NOT_INTEGER: &[u8] = b"-ERR value is not an integer or out of range\r\n";
    pub const ERR_NOT_FLOAT: &[u8] = b"-ERR value is not a valid float\r\n";
    pub const ERR_NOAUTH: &[u8] = b"-NOAUTH Authentication required\r\n";
    pub const ERR_WRONGPASS: &[u8] = b"-WRONGPASS invalid password\r\n";
    pub const ERR_AUTH_NOT_SET: &[u8] = b"-ERR Client sent AUTH, but no password is set\r\n";
    pub const ERR_OOM: &[u8] = b"-OOM command not allowed when used memory > 'maxmemory'\r\n";
    pub const ERR_SUBSCRIBE_CONTEXT: &[u8] =
        b"-ERR only (P)SUBSCRIBE / (P)UNSUBSCRIBE / PING / QUIT allowed in this context\r\n";
}
