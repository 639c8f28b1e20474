//! Template store (C2): the atomic holder of the current `BlockTemplate`
//! plus the bounded job-id -> work cache used for `mining.submit` lookups.

use crate::model::{BlockTemplate, WorkEntry};

use lru::LruCache;

use std::num::NonZeroUsize;
use std::sync::{Arc, RwLock};

/// Atomic holder of the current template (I1) with strictly increasing job
/// IDs (I2) and a bounded job cache (I3).
pub struct TemplateStore {
    current: RwLock<Option<Arc<BlockTemplate>>>,
    cache: RwLock<LruCache<u64, WorkEntry>>,
    next_job_id: RwLock<u64>,
    last_dedup_key: RwLock<Option<u64>>,
}

impl TemplateStore {
    pub fn new(cache_size: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_size.max(1)).unwrap();
        Self {
            current: RwLock::new(None),
            cache: RwLock::new(LruCache::new(capacity)),
            next_job_id: RwLock::new(0),
            last_dedup_key: RwLock::new(None),
        }
    }

    /// Returns `true` if the dedup key differs from the last stored
    /// template; the ingest loop (C3) uses this to short-circuit before
    /// doing any of the coinbase/target computation.
    pub fn is_new(&self, dedup_key: u64) -> bool {
        *self.last_dedup_key.read().unwrap() != Some(dedup_key)
    }

    /// Assigns the next job ID, inserts the template as current, and caches
    /// it for lookup. Returns the job ID assigned.
    pub fn store(&self, mut template: BlockTemplate) -> u64 {
        let dedup_key = template.dedup_key();
        let job_id = {
            let mut next = self.next_job_id.write().unwrap();
            let job_id = *next;
            *next += 1;
            job_id
        };
        template.job_id = job_id;
        let template = Arc::new(template);

        self.cache
            .write()
            .unwrap()
            .put(job_id, WorkEntry::from(template.as_ref()));
        *self.current.write().unwrap() = Some(template);
        *self.last_dedup_key.write().unwrap() = Some(dedup_key);
        job_id
    }

    pub fn current(&self) -> Option<Arc<BlockTemplate>> {
        self.current.read().unwrap().clone()
    }

    pub fn lookup(&self, job_id: u64) -> Option<WorkEntry> {
        self.cache.write().unwrap().get(&job_id).cloned()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::SealHash;
    use ii_stratum::U256;

    fn sample_template(seal_byte: u8) -> BlockTemplate {
        BlockTemplate {
            work_object: None,
            target: U256::from(1u64),
            height: [0, 0, 0],
            prime_terminus_number: 0,
            custom_seal: SealHash([seal_byte; 32]),
            time: Some(1),
            job_id: 0,
        }
    }

    #[test]
    fn job_ids_increase_strictly_from_zero() {
        let store = TemplateStore::new(10);
        assert_eq!(store.store(sample_template(1)), 0);
        assert_eq!(store.store(sample_template(2)), 1);
        assert_eq!(store.store(sample_template(3)), 2);
    }

    #[test]
    fn current_template_always_has_nonzero_target_and_seal() {
        let store = TemplateStore::new(10);
        store.store(sample_template(9));
        let current = store.current().unwrap();
        assert_ne!(current.target, U256::zero());
        assert_ne!(current.custom_seal.0, [0u8; 32]);
    }

    #[test]
    fn cache_retains_most_recent_job_within_capacity() {
        let store = TemplateStore::new(2);
        store.store(sample_template(1));
        store.store(sample_template(2));
        store.store(sample_template(3));
        assert!(store.lookup(0).is_none());
        assert!(store.lookup(1).is_some());
        assert!(store.lookup(2).is_some());
    }

    #[test]
    fn is_new_detects_unchanged_dedup_key() {
        let store = TemplateStore::new(10);
        let template = sample_template(5);
        let dedup_key = template.dedup_key();
        assert!(store.is_new(dedup_key));
        store.store(template.clone());
        assert!(!store.is_new(dedup_key));
        assert!(store.is_new(sample_template(6).dedup_key()));
    }
}
