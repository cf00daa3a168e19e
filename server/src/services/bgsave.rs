//! Periodic auto-save: wakes once a minute, and if enough has changed and
//! enough time has passed, snapshots the keyspace to disk.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use tokio::sync::broadcast;
use tokio::time::{self, Duration};

use crate::config::ConfigurationSet;
use crate::registry;
use crate::storage::Storage;
use crate::util::now_ms;

const POLL_INTERVAL: Duration = Duration::from_secs(60);

pub async fn run(
    config: Rc<ConfigurationSet>,
    storage: Rc<RefCell<Storage>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let path: PathBuf = config.dir.join(&config.dbfilename);
    let mut last_save_ms = now_ms();

    loop {
        tokio::select! {
            _ = time::sleep(POLL_INTERVAL) => {
                let changes = storage.borrow().mutation_count();
                let elapsed_secs = now_ms().saturating_sub(last_save_ms) / 1000;
                if changes < config.min_changes || elapsed_secs < config.save_interval {
                    continue;
                }
                let outcome = {
                    let storage_ref = storage.borrow();
                    if config.dual_slot {
                        crate::persistence::save_dual_slot(&storage_ref, &path).await
                    } else {
                        crate::persistence::save(&storage_ref, &path).await
                    }
                };
                match outcome {
                    Ok(count) => {
                        log::info!("bgsave wrote {count} keys to {}", path.display());
                        storage.borrow_mut().reset_mutation_count();
                        last_save_ms = now_ms();
                        registry::unpoison();
                    }
                    Err(e) => {
                        log::error!("bgsave failed: {e}");
                        registry::poison();
                    }
                }
            }
            _ = shutdown.recv() => {
                log::info!("bgsave service shutting down");
                break;
            }
        }
    }
}
