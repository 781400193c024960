//! Registration window for transform rules and class caches.
//!
//! A [`Registry`] moves through three states exactly once each:
//!
//! ```text
//! Unopened --open()--> Open --freeze()--> Frozen
//! ```
//!
//! Rules and caches can only be registered while the registry is `Open`; that window is
//! the time during which the launcher runs the [`crate::transform::Initializer`]s. Reading
//! the rule lists is only possible once the registry is `Frozen`, so every pipeline sees the
//! complete and final set. Calling an operation in the wrong state is a programming error
//! and panics.
//!
//! # Cache Selection
//!
//! At most one registered [`ClassCache`] is active. [`Registry::select_cache`] picks the one
//! named by the `cache` key of the [`Configuration`]; when that key is missing or names an
//! unknown cache, the first registered cache is chosen and its name is written back so that
//! later runs make the same choice. The selection is made once and then memoized.

use std::sync::{Arc, OnceLock};

use strum::Display;
use tracing::{debug, info, warn};

use crate::{
    config::Configuration,
    transform::{ClassCache, Identifier, TransformRule},
    utils::Locker,
};

/// Lifecycle state of a [`Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RegistryState {
    /// Created, registration not yet allowed
    Unopened,
    /// Registration window
    Open,
    /// Registration closed, rule lists readable
    Frozen,
}

struct Entries {
    state: RegistryState,
    early: Vec<Arc<dyn TransformRule>>,
    late: Vec<Arc<dyn TransformRule>>,
    caches: Vec<Arc<dyn ClassCache>>,
}

/// Ordered early and late rule lists plus the registered caches.
pub struct Registry {
    // state shares the lock with the lists it guards
    entries: Locker<Entries>,
    selected: OnceLock<Option<Arc<dyn ClassCache>>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create an unopened registry
    #[must_use]
    pub fn new() -> Self {
        Registry {
            entries: Locker::new(Entries {
                state: RegistryState::Unopened,
                early: Vec::new(),
                late: Vec::new(),
                caches: Vec::new(),
            }),
            selected: OnceLock::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> RegistryState {
        self.entries.read(|entries| entries.state)
    }

    /// Open the registration window.
    ///
    /// # Panics
    /// Panics unless the registry is [`RegistryState::Unopened`].
    pub fn open(&self) {
        self.transition(RegistryState::Unopened, RegistryState::Open);
    }

    /// Close the registration window.
    ///
    /// # Panics
    /// Panics unless the registry is [`RegistryState::Open`].
    pub fn freeze(&self) {
        self.transition(RegistryState::Open, RegistryState::Frozen);
        self.entries.read(|entries| {
            info!(
                early = entries.early.len(),
                late = entries.late.len(),
                caches = entries.caches.len(),
                "Transform registry frozen"
            );
        });
    }

    fn transition(&self, from: RegistryState, to: RegistryState) {
        let state = self.entries.write(|entries| {
            let state = entries.state;
            if state == from {
                entries.state = to;
            }
            state
        });
        assert!(
            state == from,
            "Registry can only move to {} from {}, but it is {}",
            to,
            from,
            state
        );
    }

    fn expect_state(state: RegistryState, expected: RegistryState, operation: &str) {
        assert!(
            state == expected,
            "Registry::{} requires the registry to be {}, but it is {}",
            operation,
            expected,
            state
        );
    }

    /// Run `action` if the registry is still open; the check and the update share one lock.
    fn register(&self, operation: &str, action: impl FnOnce(&mut Entries)) {
        let state = self.entries.write(|entries| {
            if entries.state == RegistryState::Open {
                action(entries);
            }
            entries.state
        });
        Self::expect_state(state, RegistryState::Open, operation);
    }

    fn frozen<R>(&self, operation: &str, action: impl FnOnce(&Entries) -> R) -> R {
        self.entries.read(|entries| {
            Self::expect_state(entries.state, RegistryState::Frozen, operation);
            action(entries)
        })
    }

    /// Append a rule to the early phase, which runs before the mandatory transform.
    ///
    /// # Panics
    /// Panics unless the registry is [`RegistryState::Open`].
    pub fn register_early(&self, rule: Arc<dyn TransformRule>) {
        self.register("register_early", |entries| entries.early.push(Arc::clone(&rule)));
        debug!(rule = %rule.name(), "Registered early rule");
    }

    /// Append a rule to the late phase, which runs after the mandatory transform.
    ///
    /// # Panics
    /// Panics unless the registry is [`RegistryState::Open`].
    pub fn register_late(&self, rule: Arc<dyn TransformRule>) {
        self.register("register_late", |entries| entries.late.push(Arc::clone(&rule)));
        debug!(rule = %rule.name(), "Registered late rule");
    }

    /// Add a class cache candidate.
    ///
    /// # Panics
    /// Panics unless the registry is [`RegistryState::Open`].
    pub fn register_cache(&self, cache: Arc<dyn ClassCache>) {
        self.register("register_cache", |entries| entries.caches.push(Arc::clone(&cache)));
        debug!(cache = %cache.name(), "Registered class cache");
    }

    /// Early rules in registration order.
    ///
    /// # Panics
    /// Panics unless the registry is [`RegistryState::Frozen`].
    pub fn early_rules(&self) -> Vec<Arc<dyn TransformRule>> {
        self.frozen("early_rules", |entries| entries.early.clone())
    }

    /// Late rules in registration order.
    ///
    /// # Panics
    /// Panics unless the registry is [`RegistryState::Frozen`].
    pub fn late_rules(&self) -> Vec<Arc<dyn TransformRule>> {
        self.frozen("late_rules", |entries| entries.late.clone())
    }

    /// Names of all registered caches, in registration order
    pub fn cache_names(&self) -> Vec<Identifier> {
        self.entries.read(|entries| {
            entries
                .caches
                .iter()
                .map(|cache| cache.name().clone())
                .collect()
        })
    }

    /// The active cache, if any was registered.
    ///
    /// The first call decides; `config` is updated (and marked dirty) when the stored
    /// preference had to be replaced.
    ///
    /// # Panics
    /// Panics unless the registry is [`RegistryState::Frozen`].
    pub fn select_cache(&self, config: &mut Configuration) -> Option<Arc<dyn ClassCache>> {
        self.frozen("select_cache", |_| ());
        self.selected
            .get_or_init(|| {
                self.entries.read(|entries| {
                    let first = entries.caches.first()?;

                    if let Some(preferred) = config.cache() {
                        let found = entries
                            .caches
                            .iter()
                            .find(|cache| cache.name().to_string() == preferred);
                        if let Some(cache) = found {
                            debug!(cache = %cache.name(), "Selected configured class cache");
                            return Some(Arc::clone(cache));
                        }
                        warn!(
                            preferred,
                            "Configured class cache is not registered, falling back to {}",
                            first.name()
                        );
                    }

                    config.set_cache(Some(first.name().to_string()));
                    Some(Arc::clone(first))
                })
            })
            .clone()
    }
}
