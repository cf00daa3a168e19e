//! Startup and shutdown orchestration: loads any existing snapshot, spawns
//! the background services, runs the listener, and waits for a shutdown
//! signal to bring everything down in order.

use std::cell::RefCell;
use std::rc::Rc;

use tokio::sync::broadcast;

use crate::config::ConfigurationSet;
use crate::dbnet;
use crate::expiry::ExpiryHeap;
use crate::pubsub::PubSub;
use crate::services;
use crate::storage::{Storage, DEFAULT_MAX_KEYS};

#[cfg(unix)]
async fn wait_for_termination_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to bind SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Loads the on-disk snapshot if one exists, logging and starting empty on
/// any failure rather than refusing to boot.
async fn load_initial_storage(config: &ConfigurationSet) -> Storage {
    let path = config.dir.join(&config.dbfilename);
    let found = if config.dual_slot {
        crate::persistence::dual_slot_exists(&path)
    } else {
        path.exists()
    };
    if !found {
        log::info!("no snapshot found at {}, starting with an empty keyspace", path.display());
        return Storage::new(DEFAULT_MAX_KEYS);
    }
    let loaded = if config.dual_slot {
        crate::persistence::load_dual_slot(&path, DEFAULT_MAX_KEYS).await
    } else {
        crate::persistence::load(&path, DEFAULT_MAX_KEYS).await
    };
    match loaded {
        Ok(storage) => {
            log::info!("restored {} keys from {}", storage.len(), path.display());
            storage
        }
        Err(e) => {
            log::error!("failed to load snapshot from {}: {e}; starting empty", path.display());
            Storage::new(DEFAULT_MAX_KEYS)
        }
    }
}

pub async fn run(config: ConfigurationSet) {
    let config = Rc::new(config);
    let storage = Rc::new(RefCell::new(load_initial_storage(&config).await));
    let pubsub = Rc::new(RefCell::new(PubSub::new()));

    let mut expiry_heap = ExpiryHeap::new();
    expiry_heap.rebuild(&storage.borrow());

    let (shutdown_tx, _) = broadcast::channel(1);

    let bgsave_handle = tokio::task::spawn_local(services::bgsave::run(
        config.clone(),
        storage.clone(),
        shutdown_tx.subscribe(),
    ));
    let expiry_handle = tokio::task::spawn_local(services::expiry_sweep::run(
        storage.clone(),
        expiry_heap,
        shutdown_tx.subscribe(),
    ));

    tokio::select! {
        result = dbnet::serve(config.clone(), storage.clone(), pubsub.clone(), shutdown_tx.subscribe()) => {
            if let Err(e) = result {
                log::error!("listener exited with error: {e}");
            }
        }
        _ = wait_for_termination_signal() => {
            log::info!("received shutdown signal");
        }
    }

    log::info!("signalling background services to stop");
    let _ = shutdown_tx.send(());
    let _ = bgsave_handle.await;
    let _ = expiry_handle.await;

    let path = config.dir.join(&config.dbfilename);
    let saved = if config.dual_slot {
        crate::persistence::save_dual_slot(&storage.borrow(), &path).await
    } else {
        crate::persistence::save(&storage.borrow(), &path).await
    };
    match saved {
        Ok(count) => log::info!("final save wrote {count} keys to {}", path.display()),
        Err(e) => log::error!("final save failed: {e}"),
    }
}
