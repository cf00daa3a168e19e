//! Approximate LRU / random eviction (4.F) via reservoir sampling, so
//! choosing a victim never requires materializing the full key list.

use rand::Rng;

use crate::storage::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    NoEviction,
    AllKeysLru,
    VolatileLru,
    AllKeysRandom,
    VolatileRandom,
}

impl EvictionPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "noeviction" => Self::NoEviction,
            "allkeys-lru" => Self::AllKeysLru,
            "volatile-lru" => Self::VolatileLru,
            "allkeys-random" => Self::AllKeysRandom,
            "volatile-random" => Self::VolatileRandom,
            _ => return None,
        })
    }
}

const SAMPLE_SIZE: usize = 5;

/// Reservoir-samples up to `SAMPLE_SIZE` candidate keys from `pool`
/// (an iterator of unknown, possibly large, length) in one pass.
fn reservoir_sample<'a>(pool: impl Iterator<Item = &'a Vec<u8>>) -> Vec<Vec<u8>> {
    let mut rng = rand::thread_rng();
    let mut reservoir: Vec<Vec<u8>> = Vec::with_capacity(SAMPLE_SIZE);
    for (i, key) in pool.enumerate() {
        if reservoir.len() < SAMPLE_SIZE {
            reservoir.push(key.clone());
        } else {
            let j = rng.gen_range(0..=i);
            if j < SAMPLE_SIZE {
                reservoir[j] = key.clone();
            }
        }
    }
    reservoir
}

/// Picks one key to evict under `policy`, or `None` if there is nothing
/// eligible (e.g. a `volatile-*` policy with no keys carrying a TTL).
pub fn pick_victim(storage: &Storage, policy: EvictionPolicy) -> Option<Vec<u8>> {
    match policy {
        EvictionPolicy::NoEviction => None,
        EvictionPolicy::AllKeysRandom => {
            let all = storage.all_keys_vec();
            reservoir_sample(all.iter()).into_iter().next()
        }
        EvictionPolicy::VolatileRandom => {
            let volatile = storage.keys_with_expiry();
            reservoir_sample(volatile.iter()).into_iter().next()
        }
        EvictionPolicy::AllKeysLru => {
            let all = storage.all_keys_vec();
            oldest_by_access(storage, reservoir_sample(all.iter()))
        }
        EvictionPolicy::VolatileLru => {
            let volatile = storage.keys_with_expiry();
            oldest_by_access(storage, reservoir_sample(volatile.iter()))
        }
    }
}

fn oldest_by_access(storage: &Storage, candidates: Vec<Vec<u8>>) -> Option<Vec<u8>> {
    candidates
        .into_iter()
        .min_by_key(|k| storage.last_access_of(k).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Value;

    #[test]
    fn noeviction_never_picks() {
        let mut storage = Storage::new(crate::storage::DEFAULT_MAX_KEYS);
        storage.set_value(b"a", Value::Str(b"1".to_vec()));
        assert!(pick_victim(&storage, EvictionPolicy::NoEviction).is_none());
    }

    #[test]
    fn volatile_random_only_picks_keys_with_ttl() {
        let mut storage = Storage::new(crate::storage::DEFAULT_MAX_KEYS);
        storage.set_value(b"no_ttl", Value::Str(b"1".to_vec()));
        storage.set_value(b"has_ttl", Value::Str(b"2".to_vec()));
        storage.set_expire_at(b"has_ttl", crate::util::now_ms() + 60_000);
        let victim = pick_victim(&storage, EvictionPolicy::VolatileRandom);
        assert_eq!(victim, Some(b"has_ttl".to_vec()));
    }
}
