//! Drives [`crate::expiry::ExpiryHeap`] on a fixed tick so TTL'd keys are
//! reclaimed even if nothing ever reads them again.

use std::cell::RefCell;
use std::rc::Rc;

use tokio::sync::broadcast;
use tokio::time;

use crate::expiry::{ExpiryHeap, TICK};
use crate::storage::Storage;

pub async fn run(
    storage: Rc<RefCell<Storage>>,
    mut heap: ExpiryHeap,
    mut shutdown: broadcast::Receiver<()>,
) {
    heap.rebuild(&storage.borrow());
    let mut ticker = time::interval(TICK);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let deleted = heap.sweep(&mut storage.borrow_mut());
                if deleted > 0 {
                    log::trace!("active expiry reclaimed {deleted} keys");
                }
            }
            _ = shutdown.recv() => {
                log::info!("expiry sweep shutting down");
                break;
            }
        }
    }
}
