//! The accept loop: binds the configured address, enforces `maxclients`
//! with a semaphore, and spawns a connection task (via `spawn_local`,
//! since everything here runs on the current-thread runtime) per socket.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::sync::Semaphore;

use crate::config::ConfigurationSet;
use crate::dbnet::connection::{self, Shared};
use crate::pubsub::PubSub;
use crate::storage::Storage;
use crate::util::NanodResult;

/// Backoff between `accept()` retries so a storm of transient errors
/// doesn't spin the loop hot.
async fn backoff_spin(attempt: u32) {
    let millis = 10u64.saturating_mul(1 << attempt.min(6));
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

pub async fn serve(
    config: Rc<ConfigurationSet>,
    storage: Rc<RefCell<Storage>>,
    pubsub: Rc<RefCell<PubSub>>,
    shutdown: broadcast::Receiver<()>,
) -> NanodResult<()> {
    let listener = TcpListener::bind((config.bind.as_str(), config.port)).await?;
    log::info!("listening on {}:{}", config.bind, config.port);
    run_accept_loop(listener, config, storage, pubsub, shutdown).await
}

/// The accept loop proper, split out from [`serve`] so tests can bind a
/// listener themselves (to discover an OS-assigned ephemeral port) and
/// hand it in directly.
pub async fn run_accept_loop(
    listener: TcpListener,
    config: Rc<ConfigurationSet>,
    storage: Rc<RefCell<Storage>>,
    pubsub: Rc<RefCell<PubSub>>,
    mut shutdown: broadcast::Receiver<()>,
) -> NanodResult<()> {
    let climit = Arc::new(Semaphore::new(config.maxclients.max(1)));
    let mut conn_id: u64 = 0;
    let mut attempt = 0u32;

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                log::info!("listener shutting down");
                return Ok(());
            }
            permit = climit.clone().acquire_owned() => {
                let permit = permit.expect("semaphore never closed");
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        attempt = 0;
                        conn_id += 1;
                        let shared = Shared {
                            storage: storage.clone(),
                            pubsub: pubsub.clone(),
                            config: config.clone(),
                        };
                        let id = conn_id;
                        tokio::task::spawn_local(async move {
                            connection::handle(stream, addr, id, shared).await;
                            drop(permit);
                        });
                    }
                    Err(e) => {
                        log::warn!("accept() failed: {e}");
                        attempt += 1;
                        drop(permit);
                        backoff_spin(attempt).await;
                    }
                }
            }
        }
    }
}
