pub mod error;

pub use error::{Error, NanodResult};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time in milliseconds since the epoch, on the system clock.
///
/// The active-expiry engine and key TTLs are expressed against this clock;
/// callers must tolerate it going backwards across a host clock step since
/// nothing here assumes strict monotonicity beyond "mostly forward".
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
