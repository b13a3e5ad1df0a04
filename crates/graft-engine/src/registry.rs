//! Mutation site registry.
//!
//! Append-only catalog of injection sites, shared by every rewritten unit
//! in the process. Slots are handed out in strictly increasing order from 0
//! with no gaps; each slot carries a descriptor fixed at injection time and
//! a current value updated by hook invocations at run time.

use crate::target::InstrKind;
use graft_bytecode::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Source position a site was injected at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteLocation {
    /// Source file of the containing unit.
    pub path: PathBuf,
    /// 1-based end line of the original load.
    pub line: u32,
    /// 1-based end column of the original load.
    pub col: u32,
}

impl fmt::Display for SiteLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.path.display(), self.line, self.col)
    }
}

/// Descriptor of one injection site. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationSite {
    /// Registry slot index.
    pub slot: u64,
    /// Kind of the instrumented instruction.
    pub kind: InstrKind,
    /// Operand identifier (slot name, constant repr, or global name).
    pub operand: String,
    /// Where the original instruction came from.
    pub location: SiteLocation,
}

impl fmt::Display for MutationSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, '{}', {})", self.kind, self.operand, self.location)
    }
}

/// One row of a registry snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteSnapshot {
    /// Registry slot index.
    pub slot: u64,
    /// Current value observed at the site.
    pub value: Value,
    /// The site descriptor.
    pub site: MutationSite,
}

#[derive(Debug, Default)]
struct RegistryState {
    sites: Vec<MutationSite>,
    values: Vec<Value>,
}

/// Process-wide, append-only site catalog.
///
/// `register` runs during the single-threaded rewrite phase; `record` and
/// `snapshot` may be called from concurrently executing instrumented code,
/// so all state sits behind one lock.
#[derive(Debug, Default)]
pub struct SiteRegistry {
    state: Mutex<RegistryState>,
}

impl SiteRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a site, returning its slot index. The slot's current value
    /// starts at the neutral default.
    pub fn register(&self, kind: InstrKind, operand: &str, location: SiteLocation) -> u64 {
        let mut state = self.lock();
        let slot = state.sites.len() as u64;
        state.sites.push(MutationSite {
            slot,
            kind,
            operand: operand.to_string(),
            location,
        });
        state.values.push(Value::default());
        slot
    }

    /// Update the current value for a slot. Unknown slots are ignored.
    pub fn record(&self, slot: u64, value: Value) {
        let mut state = self.lock();
        if let Some(entry) = state.values.get_mut(slot as usize) {
            *entry = value;
        }
    }

    /// Read-only copy of all rows, in slot order.
    pub fn snapshot(&self) -> Vec<SiteSnapshot> {
        let state = self.lock();
        state
            .sites
            .iter()
            .zip(state.values.iter())
            .map(|(site, value)| SiteSnapshot {
                slot: site.slot,
                value: value.clone(),
                site: site.clone(),
            })
            .collect()
    }

    /// Number of registered sites.
    pub fn len(&self) -> usize {
        self.lock().sites.len()
    }

    /// True if no site has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn loc(line: u32, col: u32) -> SiteLocation {
        SiteLocation {
            path: PathBuf::from("/proj/src/f.gasm"),
            line,
            col,
        }
    }

    #[test]
    fn test_slots_are_monotonic_from_zero() {
        let registry = SiteRegistry::new();
        assert_eq!(registry.register(InstrKind::LocalLoad, "x", loc(1, 1)), 0);
        assert_eq!(registry.register(InstrKind::LocalLoad, "y", loc(2, 1)), 1);
        assert_eq!(registry.register(InstrKind::LocalLoad, "z", loc(3, 1)), 2);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_values_start_neutral_and_record_updates() {
        let registry = SiteRegistry::new();
        let slot = registry.register(InstrKind::LocalLoad, "x", loc(1, 1));
        assert_eq!(registry.snapshot()[0].value, Value::Int(0));

        registry.record(slot, Value::Int(42));
        assert_eq!(registry.snapshot()[0].value, Value::Int(42));
    }

    #[test]
    fn test_record_ignores_unknown_slot() {
        let registry = SiteRegistry::new();
        registry.register(InstrKind::LocalLoad, "x", loc(1, 1));
        registry.record(99, Value::Int(1));
        assert_eq!(registry.snapshot()[0].value, Value::Int(0));
    }

    #[test]
    fn test_snapshot_is_in_slot_order() {
        let registry = SiteRegistry::new();
        registry.register(InstrKind::LocalLoad, "a", loc(1, 1));
        registry.register(InstrKind::LocalLoad, "b", loc(2, 1));
        let rows = registry.snapshot();
        assert_eq!(rows[0].site.operand, "a");
        assert_eq!(rows[1].site.operand, "b");
        assert_eq!(rows[0].slot, 0);
        assert_eq!(rows[1].slot, 1);
    }

    #[test]
    fn test_descriptor_display() {
        let registry = SiteRegistry::new();
        registry.register(InstrKind::LocalLoad, "x", loc(3, 9));
        let site = &registry.snapshot()[0].site;
        assert_eq!(site.to_string(), "(LocalLoad, 'x', /proj/src/f.gasm:3:9)");
    }

    #[test]
    fn test_concurrent_record() {
        let registry = Arc::new(SiteRegistry::new());
        for _ in 0..4 {
            registry.register(InstrKind::LocalLoad, "x", loc(1, 1));
        }

        let handles: Vec<_> = (0..4u64)
            .map(|slot| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        registry.record(slot, Value::Int(i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for row in registry.snapshot() {
            assert_eq!(row.value, Value::Int(99));
        }
    }
}
