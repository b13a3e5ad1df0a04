//! Host-environment wiring for instrumented units.
//!
//! Rewritten code reaches its engine through an explicit [`MutationEnv`]
//! handed to the executor, not through ambient process state: the spliced
//! call sequence loads [`HOOK_GLOBAL`], which this environment resolves to
//! an opaque handle routed back to [`Engine::mutate`](crate::Engine::mutate).

use crate::target::InstructionSet;
use crate::Engine;
use graft_bytecode::{ExecError, HostEnv, Value};
use std::collections::HashMap;

/// Global name rewritten units resolve the mutation hook through.
pub const HOOK_GLOBAL: &str = "graft_mutate";

/// Handle [`MutationEnv`] hands out for [`HOOK_GLOBAL`].
pub const HOOK_HANDLE: u64 = 0;

/// Host environment that routes the hook global back to an engine.
///
/// Extra globals can be layered on for the unit's own lookups; the hook
/// binding always wins.
pub struct MutationEnv<'a, S: InstructionSet> {
    engine: &'a Engine<S>,
    globals: HashMap<String, Value>,
}

impl<'a, S: InstructionSet> MutationEnv<'a, S> {
    /// Wrap an engine with no extra globals.
    pub fn new(engine: &'a Engine<S>) -> Self {
        Self {
            engine,
            globals: HashMap::new(),
        }
    }

    /// Add a global binding visible to executed units.
    pub fn with_global(mut self, name: &str, value: Value) -> Self {
        self.globals.insert(name.to_string(), value);
        self
    }
}

impl<S: InstructionSet> HostEnv for MutationEnv<'_, S> {
    fn load_global(&self, name: &str) -> Result<Value, ExecError> {
        if name == HOOK_GLOBAL {
            return Ok(Value::Opaque(HOOK_HANDLE));
        }
        self.globals
            .get(name)
            .cloned()
            .ok_or_else(|| ExecError::UnknownGlobal {
                name: name.to_string(),
            })
    }

    fn call(&self, handle: u64, mut args: Vec<Value>) -> Result<Value, ExecError> {
        if handle != HOOK_HANDLE {
            return Err(ExecError::UnknownHandle { handle });
        }
        if args.len() != 2 {
            return Err(ExecError::ArityMismatch {
                expected: 2,
                found: args.len(),
            });
        }
        // A slot outside the registry is harmless: the hook still applies
        // and the record is dropped, so the cast needs no range check.
        let slot = match &args[1] {
            Value::Int(slot) => *slot as u64,
            other => {
                return Err(ExecError::TypeMismatch {
                    expected: "Int",
                    found: other.kind(),
                });
            }
        };
        let value = args.swap_remove(0);
        Ok(self.engine.mutate(value, slot))
    }
}
