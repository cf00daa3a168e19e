//! The crate-internal error hierarchy.
//!
//! This is distinct from the RESP-level error *responses* a client sees
//! (see [`crate::protocol::responses`]): those are ordinary, expected
//! outcomes of a command and never unwind through this type. `Error` is
//! reserved for failures in the server's own plumbing -- binding a socket,
//! loading a snapshot, parsing configuration -- the kind of fault that is
//! fatal to the operation attempting it, not to the client that triggered it.

use std::fmt;
use std::io;

pub type NanodResult<T> = Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    /// A RESP-fatal parse failure; the connection that produced it is closed.
    Protocol(&'static str),
    /// A snapshot encode/decode/CRC failure.
    Storage(String),
    /// A configuration load or validation failure.
    Config(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "i/o error: {e}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Storage(msg) => write!(f, "storage error: {msg}"),
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Config(e.to_string())
    }
}
