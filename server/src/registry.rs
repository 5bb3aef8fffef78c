//! Process-wide mapping from ClientId to the live `Control` handle for it.

use crate::control::Control;
use dashmap::DashMap;
use std::sync::{Arc, OnceLock};

/// Thread-safe ClientId → Control table. Readers run concurrently with each
/// other; `dashmap` shards internally so writers only exclude the shard they
/// touch, not the whole table.
#[derive(Default)]
pub struct ControlRegistry {
    controls: DashMap<String, Arc<Control>>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-blocking lookup.
    pub fn get(&self, client_id: &str) -> Option<Arc<Control>> {
        self.controls.get(client_id).map(|entry| entry.clone())
    }

    /// Insert, returning any Control this ClientId previously pointed to.
    /// A collision does not cancel the new session — the old one is left
    /// orphaned, not closed, matching the displaced-registration scenario.
    pub fn add(&self, client_id: String, control: Arc<Control>) -> Option<Arc<Control>> {
        self.controls.insert(client_id, control)
    }

    /// Idempotent removal.
    pub fn del(&self, client_id: &str) {
        self.controls.remove(client_id);
    }

    /// Snapshot iteration. `visit` returning `true` halts iteration early.
    pub fn foreach(&self, mut visit: impl FnMut(&Arc<Control>) -> bool) {
        for entry in self.controls.iter() {
            if visit(entry.value()) {
                break;
            }
        }
    }
}

static REGISTRY: OnceLock<Arc<ControlRegistry>> = OnceLock::new();

/// The single process-wide registry instance, shared by the tunnel acceptor
/// and the SOCKS5 front door — each only ever needs a `get`/`add`/`del` view
/// of it, so a global avoids threading an `Arc` through every call site the
/// way the teacher's connection handlers reach `get_config()`.
pub fn global() -> Arc<ControlRegistry> {
    REGISTRY.get_or_init(|| Arc::new(ControlRegistry::new())).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::Control;

    fn dummy(id: &str) -> Arc<Control> {
        Arc::new(Control::new_for_test(id.to_string()))
    }

    #[test]
    fn add_returns_displaced_entry_and_get_sees_the_new_one() {
        let registry = ControlRegistry::new();
        let a = dummy("X");
        let b = dummy("X");
        assert!(registry.add("X".to_string(), a.clone()).is_none());
        let displaced = registry.add("X".to_string(), b.clone());
        assert!(Arc::ptr_eq(&displaced.unwrap(), &a));
        assert!(Arc::ptr_eq(&registry.get("X").unwrap(), &b));
    }

    #[test]
    fn del_is_idempotent() {
        let registry = ControlRegistry::new();
        registry.add("X".to_string(), dummy("X"));
        registry.del("X");
        registry.del("X");
        assert!(registry.get("X").is_none());
    }

    #[test]
    fn foreach_can_stop_early() {
        let registry = ControlRegistry::new();
        registry.add("A".to_string(), dummy("A"));
        registry.add("B".to_string(), dummy("B"));
        let mut seen = 0;
        registry.foreach(|_| {
            seen += 1;
            true
        });
        assert_eq!(seen, 1);
    }
}
