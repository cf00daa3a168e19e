//! Middleware run ahead of the router: auth gating and request validation.
//! Order matters -- auth first, since an unauthenticated connection
//! shouldn't even have its arg count or sizes inspected for a command it's
//! not allowed to run.

use crate::protocol::reply::{self, Reply};

pub const MAX_ARG_SIZE: usize = 512 * 1024;
pub const MAX_ARG_COUNT: usize = 100;

pub struct Auth {
    password: Option<String>,
    authenticated: bool,
}

impl Auth {
    pub fn new(password: Option<String>) -> Self {
        // no password configured means every connection starts authenticated
        let authenticated = password.is_none();
        Self {
            password,
            authenticated,
        }
    }

    pub fn required(&self) -> bool {
        self.password.is_some()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Handles `AUTH` itself; for any other command while unauthenticated,
    /// returns the `NOAUTH` error that should be sent instead of dispatching.
    pub fn check(&mut self, cmd: &[u8], args: &[Vec<u8>]) -> Result<(), Reply> {
        if cmd == b"AUTH" {
            return Ok(());
        }
        if matches!(cmd, b"PING" | b"QUIT") {
            return Ok(());
        }
        if !self.authenticated {
            return Err(reply::err("NOAUTH", "Authentication required"));
        }
        let _ = args;
        Ok(())
    }

    /// Runs `AUTH <password>` itself, returning the reply to send.
    pub fn handle_auth(&mut self, args: &[Vec<u8>]) -> Reply {
        let Some(password) = &self.password else {
            return reply::err("ERR", "Client sent AUTH, but no password is set");
        };
        if args.len() != 1 {
            return reply::wrong_arity("auth");
        }
        if args[0] == password.as_bytes() {
            self.authenticated = true;
            Reply::Ok
        } else {
            reply::err("WRONGPASS", "invalid password")
        }
    }
}

/// Per-arg size cap and per-request arg count cap. Runs after auth so a
/// still-unauthenticated client gets `NOAUTH` rather than a validator error.
pub fn validate_request(args: &[Vec<u8>]) -> Result<(), Reply> {
    if args.len() > MAX_ARG_COUNT {
        return Err(reply::err("ERR", "too many arguments"));
    }
    if args.iter().any(|a| a.len() > MAX_ARG_SIZE) {
        return Err(reply::err("ERR", "argument too large"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_password_starts_authenticated() {
        let auth = Auth::new(None);
        assert!(auth.is_authenticated());
    }

    #[test]
    fn wrong_password_rejected() {
        let mut auth = Auth::new(Some("secret".to_string()));
        let r = auth.handle_auth(&[b"nope".to_vec()]);
        assert!(matches!(r, Reply::Error(ref p, _) if p == "WRONGPASS"));
        assert!(!auth.is_authenticated());
    }

    #[test]
    fn correct_password_authenticates() {
        let mut auth = Auth::new(Some("secret".to_string()));
        let r = auth.handle_auth(&[b"secret".to_vec()]);
        assert!(matches!(r, Reply::Ok));
        assert!(auth.is_authenticated());
    }

    #[test]
    fn unauthenticated_command_other_than_ping_auth_quit_is_rejected() {
        let mut auth = Auth::new(Some("secret".to_string()));
        assert!(auth.check(b"GET", &[]).is_err());
        assert!(auth.check(b"PING", &[]).is_ok());
    }

    #[test]
    fn oversized_arg_rejected() {
        let args = vec![vec![0u8; MAX_ARG_SIZE + 1]];
        assert!(validate_request(&args).is_err());
    }
}
