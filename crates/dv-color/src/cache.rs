use std::collections::HashMap;

use dv_expr::SemanticExpr;
use dv_runtime::{DecisionAction, EvidenceLedger, RuntimeConfig, RuntimePolicy, global_policy};

use crate::ColorAllocator;

/// Allocators built during one render pass, keyed by fill-rule expression.
///
/// Keys match structurally: a rule rebuilt by a later binding pass finds the
/// allocator registered for the earlier instance. At most one entry exists
/// per distinct rule, and entries are never evicted; the cache is dropped
/// with its pass.
#[derive(Debug)]
pub struct ColorAllocatorCache {
    index: HashMap<SemanticExpr, usize>,
    entries: Vec<CacheEntry>,
    policy: RuntimePolicy,
    ledger: EvidenceLedger,
}

#[derive(Debug)]
struct CacheEntry {
    key: SemanticExpr,
    allocator: Box<dyn ColorAllocator>,
}

impl Default for ColorAllocatorCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ColorAllocatorCache {
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(global_policy())
    }

    #[must_use]
    pub fn with_policy(policy: RuntimePolicy) -> Self {
        Self {
            index: HashMap::new(),
            entries: Vec::new(),
            policy,
            ledger: EvidenceLedger::new(),
        }
    }

    /// Presized for the configured number of rules, enforcing the
    /// configuration's policy. A capacity that fails validation falls back
    /// to the default.
    #[must_use]
    pub fn with_config(config: &RuntimeConfig) -> Self {
        let capacity = match config.validate() {
            Ok(()) => config.color_cache_capacity,
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    requested = config.color_cache_capacity,
                    error = %_err,
                    "ignoring invalid color cache capacity"
                );
                RuntimeConfig::default().color_cache_capacity
            }
        };
        Self {
            index: HashMap::with_capacity(capacity),
            entries: Vec::with_capacity(capacity),
            policy: config.policy(),
            ledger: EvidenceLedger::new(),
        }
    }

    #[must_use]
    pub fn get(&self, key: &SemanticExpr) -> Option<&dyn ColorAllocator> {
        let found = self
            .index
            .get(key)
            .map(|&slot| self.entries[slot].allocator.as_ref());
        #[cfg(feature = "tracing")]
        if found.is_none() {
            tracing::trace!(rule = %key, "color allocator cache miss");
        }
        found
    }

    /// Register `allocator` for `key`.
    ///
    /// `key` must be a fill-rule expression that is not yet registered. A
    /// violation is handled by the cache's policy; when tolerated, the
    /// existing entry is kept and `allocator` is dropped.
    pub fn register(&mut self, key: SemanticExpr, allocator: Box<dyn ColorAllocator>) -> &mut Self {
        let is_rule = self.policy.enforce(
            key.is_fill_rule(),
            "color_allocator_cache.register",
            || format!("key must be a fill rule, got {}", key.kind_name()),
            &mut self.ledger,
        );
        if is_rule == DecisionAction::Reject {
            return self;
        }
        let unique = self.policy.enforce(
            !self.index.contains_key(&key),
            "color_allocator_cache.register",
            || format!("an allocator is already registered for {key}"),
            &mut self.ledger,
        );
        if unique == DecisionAction::Reject {
            return self;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(rule = %key, slot = self.entries.len(), "registered color allocator");
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push(CacheEntry { key, allocator });
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered keys in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &SemanticExpr> {
        self.entries.iter().map(|entry| &entry.key)
    }

    #[must_use]
    pub fn policy(&self) -> RuntimePolicy {
        self.policy
    }

    /// Violations tolerated under a hardened policy.
    #[must_use]
    pub fn ledger(&self) -> &EvidenceLedger {
        &self.ledger
    }
}
