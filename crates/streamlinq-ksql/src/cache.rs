//! Caller-owned memo of rendered statements
//!
//! Keyed by (entity, plan fingerprint, topic). Each key renders at most once,
//! even under concurrent callers; later callers replay the stored result.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use streamlinq_ir::{QueryPlan, Result, TranslationError};
use tracing::{debug, trace};

use crate::statement::StatementGenerator;

type CacheKey = (String, String, String);
type Slot = Arc<OnceLock<Result<String, TranslationError>>>;

#[derive(Default)]
pub struct StatementCache {
    slots: Mutex<HashMap<CacheKey, Slot>>,
}

impl StatementCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render through `generator` unless this (entity, plan, topic) was seen before
    pub fn get_or_render(&self, generator: &StatementGenerator, plan: &QueryPlan, topic: &str) -> Result<String> {
        let key = (plan.source.clone(), plan.fingerprint(), topic.to_string());
        let slot = self.slot(key);

        let mut rendered_here = false;
        let result = slot.get_or_init(|| {
            rendered_here = true;
            generator.render(plan, topic)
        });

        if rendered_here {
            debug!(source = %plan.source, topic, "Statement cache miss");
        } else {
            trace!(source = %plan.source, topic, "Statement cache hit");
        }
        result.clone()
    }

    /// True once a successful render exists for this plan on `topic`
    pub fn is_registered(&self, plan: &QueryPlan, topic: &str) -> bool {
        let key = (plan.source.clone(), plan.fingerprint(), topic.to_string());
        self.lock()
            .get(&key)
            .and_then(|slot| slot.get())
            .is_some_and(|result| result.is_ok())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, key: CacheKey) -> Slot {
        // The map lock is only held to find the slot, never while rendering
        Arc::clone(self.lock().entry(key).or_default())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, Slot>> {
        // A poisoned map still holds fully initialized slots
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
