//! Mutation hook contract and the reference mask hook.

use graft_bytecode::Value;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Run-time value perturbation.
///
/// A hook executes inside arbitrary instrumented call frames, so it must
/// never panic: any value kind an implementation cannot handle is returned
/// unchanged.
pub trait MutationHook: Send + Sync {
    /// Perturb `value` for the site at `slot`.
    fn mutate(&self, value: Value, slot: u64) -> Value;
}

impl<F> MutationHook for F
where
    F: Fn(Value, u64) -> Value + Send + Sync,
{
    fn mutate(&self, value: Value, slot: u64) -> Value {
        self(value, slot)
    }
}

/// Reference hook: per-slot XOR masks over integer and boolean values.
///
/// Slots without an installed mask are identity, so the empty default table
/// makes the whole hook a no-op. Text mutation is a reserved extension
/// point; unit and opaque values are always identity.
#[derive(Debug, Default)]
pub struct MaskHook {
    masks: RwLock<HashMap<u64, u64>>,
}

impl MaskHook {
    /// Create a hook with no masks installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the mask for a slot. Callable at any time,
    /// including while instrumented code is running.
    pub fn set_mask(&self, slot: u64, mask: u64) {
        self.masks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(slot, mask);
    }

    fn mask_for(&self, slot: u64) -> u64 {
        self.masks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&slot)
            .copied()
            .unwrap_or(0)
    }
}

impl MutationHook for MaskHook {
    fn mutate(&self, value: Value, slot: u64) -> Value {
        let mask = self.mask_for(slot);
        match value {
            Value::Int(v) => Value::Int(v ^ mask as i64),
            Value::Bool(b) => Value::Bool(b ^ (mask & 1 == 1)),
            // Reserved: no textual mutation scheme is defined yet.
            Value::Text(s) => Value::Text(s),
            Value::Unit => Value::Unit,
            Value::Opaque(h) => Value::Opaque(h),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_identity() {
        let hook = MaskHook::new();
        assert_eq!(hook.mutate(Value::Int(7), 0), Value::Int(7));
        assert_eq!(hook.mutate(Value::Bool(true), 0), Value::Bool(true));
    }

    #[test]
    fn test_int_mask_xors() {
        let hook = MaskHook::new();
        hook.set_mask(0, 0b101);
        assert_eq!(hook.mutate(Value::Int(0b011), 0), Value::Int(0b110));
        // Other slots stay identity.
        assert_eq!(hook.mutate(Value::Int(0b011), 1), Value::Int(0b011));
    }

    #[test]
    fn test_bool_mask_uses_low_bit() {
        let hook = MaskHook::new();
        hook.set_mask(0, 1);
        hook.set_mask(1, 2);
        assert_eq!(hook.mutate(Value::Bool(true), 0), Value::Bool(false));
        assert_eq!(hook.mutate(Value::Bool(true), 1), Value::Bool(true));
    }

    #[test]
    fn test_unknown_kinds_pass_through() {
        let hook = MaskHook::new();
        hook.set_mask(0, u64::MAX);
        assert_eq!(
            hook.mutate(Value::Text("s".to_string()), 0),
            Value::Text("s".to_string())
        );
        assert_eq!(hook.mutate(Value::Unit, 0), Value::Unit);
        assert_eq!(hook.mutate(Value::Opaque(3), 0), Value::Opaque(3));
    }

    #[test]
    fn test_closures_are_hooks() {
        let hook = |value: Value, slot: u64| match value {
            Value::Int(v) => Value::Int(v + slot as i64),
            other => other,
        };
        assert_eq!(MutationHook::mutate(&hook, Value::Int(1), 2), Value::Int(3));
    }
}
