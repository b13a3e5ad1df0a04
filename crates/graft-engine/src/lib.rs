//! Graft engine - instruction-stream mutation injection
//!
//! Rewrites compiled function bodies so selected load instructions route
//! through a mutation hook before their value is used, recording a stable
//! slot index plus descriptive metadata for every rewritten site. The pass
//! is generic over a pluggable [`InstructionSet`]; [`StackVm`] binds it to
//! the graft bytecode VM.
//!
//! ## Design
//!
//! - One [`Engine`] per process, constructed explicitly by the owning
//!   application and passed wherever it is needed. There is no ambient
//!   global state; instrumented code reaches its engine through a
//!   [`MutationEnv`] installed at execution time.
//! - Injection is fail-open. Out-of-scope units, ineligible instructions,
//!   and value kinds the hook does not understand all pass through
//!   untouched, so the pass has no fatal error path.
//! - The site registry is append-only and shared; hook invocations from
//!   concurrently executing units synchronize behind its lock.

pub mod eligibility;
pub mod env;
pub mod hook;
pub mod registry;
mod rewrite;
pub mod scope;
pub mod stackvm;
pub mod target;

pub use env::{HOOK_GLOBAL, HOOK_HANDLE, MutationEnv};
pub use hook::{MaskHook, MutationHook};
pub use registry::{MutationSite, SiteLocation, SiteRegistry, SiteSnapshot};
pub use scope::ScopeFilter;
pub use stackvm::StackVm;
pub use target::{InstrClass, InstrKind, InstructionSet};

use graft_bytecode::Value;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Engine construction parameters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root directory instrumented code must live under.
    pub root: PathBuf,
}

/// The injection engine: scope filter, site registry, mutation hook, and
/// diagnostic sink, owned together.
pub struct Engine<S: InstructionSet> {
    set: S,
    scope: ScopeFilter,
    registry: SiteRegistry,
    hook: Arc<dyn MutationHook>,
    diag: Mutex<Box<dyn Write + Send>>,
}

impl<S: InstructionSet> Engine<S> {
    /// Create an engine with the reference [`MaskHook`] (identity until
    /// masks are installed) and stderr diagnostics.
    pub fn new(set: S, config: EngineConfig) -> Self {
        Self::with_hook(set, config, Arc::new(MaskHook::new()))
    }

    /// Create an engine with a caller-supplied hook. Keeping another clone
    /// of the `Arc` lets the caller reconfigure the hook while instrumented
    /// code runs.
    pub fn with_hook(set: S, config: EngineConfig, hook: Arc<dyn MutationHook>) -> Self {
        Self {
            set,
            scope: ScopeFilter::new(config.root),
            registry: SiteRegistry::new(),
            hook,
            diag: Mutex::new(Box::new(io::stderr())),
        }
    }

    /// Replace the diagnostic sink (stderr by default).
    pub fn with_diag_sink(mut self, sink: impl Write + Send + 'static) -> Self {
        self.diag = Mutex::new(Box::new(sink));
        self
    }

    /// Rewrite one code unit, or hand back an identical copy if its source
    /// file lies outside the configured root.
    ///
    /// Every injected site grows the shared registry and writes one
    /// diagnostic line; the returned unit is independent of the input.
    pub fn inject(&self, unit: &S::Unit) -> S::Unit {
        let path = self.set.unit_path(unit);
        if !self.scope.in_scope(path) {
            debug!(path = %path.display(), "unit out of scope, passing through");
            return unit.clone();
        }

        let mut diag = self.diag_lock();
        let (rewritten, injected) =
            rewrite::inject_unit(&self.set, unit, &self.registry, &mut **diag);
        drop(diag);

        debug!(
            path = %self.set.unit_path(unit).display(),
            sites = injected,
            "injected unit"
        );
        rewritten
    }

    /// Apply the hook to a value at run time and record the result under
    /// its slot. Called by [`MutationEnv`] from inside instrumented frames;
    /// infallible, like the hook contract it forwards to.
    pub fn mutate(&self, value: Value, slot: u64) -> Value {
        let mutated = self.hook.mutate(value, slot);
        self.registry.record(slot, mutated.clone());
        mutated
    }

    /// The engine's site registry.
    pub fn registry(&self) -> &SiteRegistry {
        &self.registry
    }

    /// Write the registry dump to the diagnostic sink, one row per site in
    /// slot order.
    pub fn dump(&self) {
        let rows = self.registry.snapshot();
        let mut diag = self.diag_lock();
        let _ = writeln!(diag, "INFO: dumping injector data len: {}", rows.len());
        for row in rows {
            let _ = writeln!(
                diag,
                "INFO: mutation_list[{}] = {}, tuple: {}",
                row.slot, row.value, row.site
            );
        }
    }

    fn diag_lock(&self) -> MutexGuard<'_, Box<dyn Write + Send>> {
        self.diag.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
