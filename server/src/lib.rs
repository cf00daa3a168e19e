//! nanod: a memory-constrained, single-node, RESP2-speaking in-memory
//! key-value store. See each module for its own documentation; `main.rs`
//! is a thin binary wrapper around [`arbiter::run`].

pub mod arbiter;
pub mod config;
pub mod dbnet;
pub mod eviction;
pub mod expiry;
pub mod persistence;
pub mod protocol;
pub mod pubsub;
pub mod registry;
pub mod router;
pub mod services;
pub mod storage;
pub mod txn;
pub mod util;
