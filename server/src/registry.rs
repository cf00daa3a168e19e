//! Global runtime state flags, checked by hot paths before touching storage.
//!
//! Mirrors the teacher's poison-flag pattern: a failed background save
//! poisons the registry so write commands start rejecting themselves
//! instead of compounding a corrupt on-disk state, until an operator
//! intervenes or a later save clears the flag.

use std::sync::atomic::{AtomicBool, Ordering};

static STATE_OKAY: AtomicBool = AtomicBool::new(true);

/// Returns `true` if the server is accepting writes.
pub fn state_okay() -> bool {
    STATE_OKAY.load(Ordering::Acquire)
}

/// Marks the server as unable to safely accept writes (e.g. a snapshot
/// write failed and left on-disk state unclear).
pub fn poison() {
    STATE_OKAY.store(false, Ordering::Release);
}

/// Clears the poison flag, allowing writes again.
pub fn unpoison() {
    STATE_OKAY.store(true, Ordering::Release);
}
