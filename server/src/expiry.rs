//! The active-expiry engine (4.E): a min-heap of `(deadline, key)` pairs
//! sampled on a fixed tick so that keys with a TTL are reclaimed even if
//! nobody ever touches them again. Lazy expiry (in [`crate::storage::Storage::touch`])
//! handles the read path; this is the "nobody asked" path.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Duration;

use crate::storage::Storage;
use crate::util::now_ms;

pub const TICK: Duration = Duration::from_millis(100);
const SAMPLE_SIZE: usize = 20;
const MAX_DELETIONS_PER_TICK: usize = 100;
const EXPIRED_RATIO_CONTINUE: f64 = 0.25;

pub struct ExpiryHeap {
    heap: BinaryHeap<Reverse<(u64, Vec<u8>)>>,
}

impl ExpiryHeap {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    /// Rebuilds the heap from storage's current expiry map, e.g. right
    /// after a snapshot load.
    pub fn rebuild(&mut self, storage: &Storage) {
        self.heap.clear();
        for (key, &deadline) in storage.all_expiries() {
            self.heap.push(Reverse((deadline, key.clone())));
        }
    }

    pub fn push(&mut self, key: Vec<u8>, deadline: u64) {
        self.heap.push(Reverse((deadline, key)));
    }

    /// Runs one sampling pass, deleting whatever has actually expired and
    /// dropping stale heap entries along the way. Returns the number of
    /// keys deleted.
    pub fn sweep(&mut self, storage: &mut Storage) -> usize {
        let mut total_deleted = 0;
        loop {
            let mut examined = 0;
            let mut expired = 0;
            for _ in 0..SAMPLE_SIZE {
                if total_deleted >= MAX_DELETIONS_PER_TICK {
                    return total_deleted;
                }
                let Some(Reverse((deadline, key))) = self.heap.pop() else {
                    return total_deleted;
                };
                examined += 1;
                if storage.deadline_of(&key) == Some(deadline) {
                    if deadline <= now_ms() {
                        storage.remove_key(&key);
                        expired += 1;
                        total_deleted += 1;
                    } else {
                        // not yet due; this entry (and everything after it,
                        // since the heap is ordered) can wait
                        self.heap.push(Reverse((deadline, key)));
                        return total_deleted;
                    }
                }
                // else: stale entry (deadline was cleared/changed/deleted
                // and possibly re-set since), drop it
            }
            if examined == 0 || (expired as f64 / examined as f64) < EXPIRED_RATIO_CONTINUE {
                return total_deleted;
            }
        }
    }

    /// Milliseconds until the next live deadline, pruning stale entries at
    /// the top as it goes.
    pub fn next_deadline_ms(&mut self, storage: &Storage) -> Option<u64> {
        while let Some(Reverse((deadline, key))) = self.heap.peek() {
            if storage.deadline_of(key) == Some(*deadline) {
                return Some(deadline.saturating_sub(now_ms()));
            }
            self.heap.pop();
        }
        None
    }
}

impl Default for ExpiryHeap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_deletes_due_keys() {
        let mut storage = Storage::new(crate::storage::DEFAULT_MAX_KEYS);
        storage.set_value(b"k", crate::storage::Value::Str(b"v".to_vec()));
        storage.set_expire_at(b"k", 1);
        let mut heap = ExpiryHeap::new();
        heap.push(b"k".to_vec(), 1);
        let deleted = heap.sweep(&mut storage);
        assert_eq!(deleted, 1);
        assert!(!storage.exists(b"k"));
    }

    #[test]
    fn stale_entries_are_dropped_without_deleting() {
        let mut storage = Storage::new(crate::storage::DEFAULT_MAX_KEYS);
        storage.set_value(b"k", crate::storage::Value::Str(b"v".to_vec()));
        storage.set_expire_at(b"k", now_ms() + 60_000);
        let mut heap = ExpiryHeap::new();
        // push a stale deadline that no longer matches storage's record
        heap.push(b"k".to_vec(), 1);
        let deleted = heap.sweep(&mut storage);
        assert_eq!(deleted, 0);
        assert!(storage.exists(b"k"));
    }
}
