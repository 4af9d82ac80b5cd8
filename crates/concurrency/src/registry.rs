//! Process-wide lock strategy registry
//!
//! Strategies are registered by name so that configuration can refer to them
//! (`"memory"`, `"orders-db"`, ...). The shared in-memory strategy is always
//! available through `memory_strategy()`, even if its registry entry is replaced.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::memory::MemoryLockStrategy;
use crate::strategy::LockStrategy;

/// Registry name of the shared in-memory strategy
pub const MEMORY_STRATEGY: &str = "memory";

static DEFAULT_MEMORY: Lazy<Arc<MemoryLockStrategy>> =
    Lazy::new(|| Arc::new(MemoryLockStrategy::default()));

/// Registered strategies by name
static STRATEGIES: Lazy<Mutex<HashMap<String, Arc<dyn LockStrategy>>>> = Lazy::new(|| {
    let mut strategies: HashMap<String, Arc<dyn LockStrategy>> = HashMap::new();
    strategies.insert(MEMORY_STRATEGY.to_string(), memory_strategy());
    Mutex::new(strategies)
});

/// Register `strategy` under `name`, returning the strategy it replaces
pub fn register_strategy(
    name: impl Into<String>,
    strategy: Arc<dyn LockStrategy>,
) -> Option<Arc<dyn LockStrategy>> {
    let name = name.into();
    debug!(target: "tessera::lock", name = %name, "Registered lock strategy");
    STRATEGIES.lock().insert(name, strategy)
}

/// Strategy registered under `name`
pub fn strategy(name: &str) -> Option<Arc<dyn LockStrategy>> {
    STRATEGIES.lock().get(name).cloned()
}

/// Remove the strategy registered under `name`
pub fn unregister_strategy(name: &str) -> Option<Arc<dyn LockStrategy>> {
    STRATEGIES.lock().remove(name)
}

/// Shared in-memory strategy with default settings
pub fn memory_strategy() -> Arc<dyn LockStrategy> {
    DEFAULT_MEMORY.clone()
}
