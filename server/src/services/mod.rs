//! Background services that run alongside the connection listener:
//! periodic snapshotting and active key expiry.

pub mod bgsave;
pub mod expiry_sweep;
