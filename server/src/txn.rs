//! The transaction engine (4.I): per-connection `MULTI`/`EXEC`/`WATCH`
//! state. Nothing here touches the socket; [`crate::dbnet::connection`]
//! intercepts these commands before they ever reach [`crate::router`].

use crate::protocol::reply::Reply;
use crate::protocol::responses::groups;
use crate::router;
use crate::storage::Storage;

#[derive(Debug, Clone)]
pub struct QueuedCommand {
    pub cmd: Vec<u8>,
    pub args: Vec<Vec<u8>>,
}

#[derive(Default)]
pub struct TxnState {
    pub in_multi: bool,
    pub queue: Vec<QueuedCommand>,
    pub watched: Vec<(Vec<u8>, u64)>,
    pub error_state: bool,
}

impl TxnState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.in_multi = false;
        self.queue.clear();
        self.watched.clear();
        self.error_state = false;
    }
}

pub enum TxnOutcome {
    /// Not a transaction-control command and not queued; dispatch normally.
    Passthrough,
    /// Handled here; send this frame straight to the client.
    Reply(Reply),
    /// Queued inside a MULTI block; send `+QUEUED\r\n`.
    Queued,
}

/// Intercepts `MULTI`/`EXEC`/`DISCARD`/`WATCH`/`UNWATCH`, and queues any
/// other command while `in_multi` is set. Returns `Passthrough` when the
/// caller should dispatch `cmd` via the router as usual.
pub fn intercept(
    state: &mut TxnState,
    storage: &mut Storage,
    cmd: &[u8],
    args: &[Vec<u8>],
) -> TxnOutcome {
    match cmd {
        b"MULTI" => {
            if state.in_multi {
                mark_error(state);
                return TxnOutcome::Reply(Reply::Error(
                    "ERR".to_string(),
                    "MULTI calls can not be nested".to_string(),
                ));
            }
            state.in_multi = true;
            TxnOutcome::Reply(Reply::Ok)
        }
        b"WATCH" => {
            if state.in_multi {
                mark_error(state);
                return TxnOutcome::Reply(Reply::Error(
                    "ERR".to_string(),
                    "WATCH inside MULTI is not allowed".to_string(),
                ));
            }
            for key in args {
                let version = storage.version_of(key);
                state.watched.push((key.clone(), version));
            }
            TxnOutcome::Reply(Reply::Ok)
        }
        b"UNWATCH" => {
            state.watched.clear();
            TxnOutcome::Reply(Reply::Ok)
        }
        b"DISCARD" => {
            if !state.in_multi {
                return TxnOutcome::Reply(Reply::Error(
                    "ERR".to_string(),
                    "DISCARD without MULTI".to_string(),
                ));
            }
            state.reset();
            TxnOutcome::Reply(Reply::Ok)
        }
        b"EXEC" => TxnOutcome::Reply(exec(state, storage)),
        _ if state.in_multi => {
            if let Err(reply) = router::validate(cmd, args) {
                mark_error(state);
                return TxnOutcome::Reply(reply);
            }
            state.queue.push(QueuedCommand {
                cmd: cmd.to_vec(),
                args: args.to_vec(),
            });
            TxnOutcome::Queued
        }
        _ => TxnOutcome::Passthrough,
    }
}

fn exec(state: &mut TxnState, storage: &mut Storage) -> Reply {
    if !state.in_multi {
        return Reply::Error("ERR".to_string(), "EXEC without MULTI".to_string());
    }
    let conflict = state
        .watched
        .iter()
        .any(|(key, version)| storage.version_of(key) != *version);
    if conflict {
        state.reset();
        return Reply::NilArray;
    }
    if state.error_state {
        state.reset();
        return Reply::Error(
            "EXECABORT".to_string(),
            "Transaction discarded because of previous errors".to_string(),
        );
    }
    let queued = std::mem::take(&mut state.queue);
    let results = queued
        .into_iter()
        .map(|q| router::dispatch(storage, &q.cmd, &q.args))
        .collect();
    state.reset();
    Reply::Array(results)
}

/// A known-bad queued command (unknown command name or wrong arity) sets
/// `error_state` so `EXEC` aborts without running anything, matching how
/// the router validates before queuing.
pub fn mark_error(state: &mut TxnState) {
    state.error_state = true;
}

/// Pre-encoded `+QUEUED\r\n`, written directly instead of going through
/// [`Reply::encode`] since it never carries request-specific data.
pub fn queued_frame() -> &'static [u8] {
    groups::QUEUED
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_without_multi_errors() {
        let mut state = TxnState::new();
        let mut storage = Storage::new(crate::storage::DEFAULT_MAX_KEYS);
        let r = exec(&mut state, &mut storage);
        assert!(matches!(r, Reply::Error(ref p, _) if p == "ERR"));
    }

    #[test]
    fn watch_conflict_aborts_with_nil_array() {
        let mut state = TxnState::new();
        let mut storage = Storage::new(crate::storage::DEFAULT_MAX_KEYS);
        storage.set_value(b"k", crate::storage::Value::Str(b"1".to_vec()));
        match intercept(&mut state, &mut storage, b"WATCH", &[b"k".to_vec()]) {
            TxnOutcome::Reply(Reply::Ok) => {}
            _ => panic!("expected OK"),
        }
        match intercept(&mut state, &mut storage, b"MULTI", &[]) {
            TxnOutcome::Reply(Reply::Ok) => {}
            _ => panic!("expected OK"),
        }
        // another client's write between WATCH and EXEC
        storage.set_value(b"k", crate::storage::Value::Str(b"2".to_vec()));
        let r = exec(&mut state, &mut storage);
        assert!(matches!(r, Reply::NilArray));
    }

    #[test]
    fn queued_commands_execute_in_order_on_exec() {
        let mut state = TxnState::new();
        let mut storage = Storage::new(crate::storage::DEFAULT_MAX_KEYS);
        intercept(&mut state, &mut storage, b"MULTI", &[]);
        intercept(&mut state, &mut storage, b"SET", &[b"k".to_vec(), b"v".to_vec()]);
        let r = exec(&mut state, &mut storage);
        assert!(matches!(r, Reply::Array(ref items) if items.len() == 1));
        assert!(!state.in_multi);
    }

    #[test]
    fn nested_multi_errors_and_aborts_exec() {
        let mut state = TxnState::new();
        let mut storage = Storage::new(crate::storage::DEFAULT_MAX_KEYS);
        intercept(&mut state, &mut storage, b"MULTI", &[]);
        match intercept(&mut state, &mut storage, b"MULTI", &[]) {
            TxnOutcome::Reply(Reply::Error(ref p, _)) if p == "ERR" => {}
            _ => panic!("expected nested MULTI error"),
        }
        assert!(state.error_state);
        let r = exec(&mut state, &mut storage);
        assert!(matches!(r, Reply::Error(ref p, _) if p == "EXECABORT"));
    }

    #[test]
    fn watch_inside_multi_errors_and_aborts_exec() {
        let mut state = TxnState::new();
        let mut storage = Storage::new(crate::storage::DEFAULT_MAX_KEYS);
        intercept(&mut state, &mut storage, b"MULTI", &[]);
        match intercept(&mut state, &mut storage, b"WATCH", &[b"k".to_vec()]) {
            TxnOutcome::Reply(Reply::Error(ref p, _)) if p == "ERR" => {}
            _ => panic!("expected WATCH-inside-MULTI error"),
        }
        assert!(state.error_state);
        let r = exec(&mut state, &mut storage);
        assert!(matches!(r, Reply::Error(ref p, _) if p == "EXECABORT"));
    }

    #[test]
    fn invalid_queued_command_aborts_exec_without_running_anything() {
        let mut state = TxnState::new();
        let mut storage = Storage::new(crate::storage::DEFAULT_MAX_KEYS);
        intercept(&mut state, &mut storage, b"MULTI", &[]);
        match intercept(&mut state, &mut storage, b"NOSUCHCOMMAND", &[]) {
            TxnOutcome::Reply(Reply::Error(ref p, _)) if p == "ERR" => {}
            _ => panic!("expected unknown-command error"),
        }
        match intercept(&mut state, &mut storage, b"SET", &[b"k".to_vec(), b"v".to_vec()]) {
            TxnOutcome::Queued => {}
            _ => panic!("expected subsequent valid command to still queue"),
        }
        let r = exec(&mut state, &mut storage);
        assert!(matches!(r, Reply::Error(ref p, _) if p == "EXECABORT"));
        assert!(!storage.exists(b"k"));
    }
}
