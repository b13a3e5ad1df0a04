//! The injection pass.
//!
//! Walks one unit's instruction stream in order, passing ineligible
//! instructions through untouched and replacing each eligible load with the
//! hook call sequence:
//!
//! 1. push the hook reference
//! 2. re-emit the original load
//! 3. push the site's registry slot index
//! 4. call the hook with (value, slot)
//! 5. for local loads, store the result back into the slot and re-load it
//!
//! Step 5 keeps the net stack effect equal to the bare load's and persists
//! the mutation for later, uninstrumented loads of the same slot. The pass
//! never fails on a well-formed stream: anything it does not recognize as
//! eligible is copied verbatim, labels and jump operands included.

use crate::eligibility::{Decision, Eligibility};
use crate::registry::{SiteLocation, SiteRegistry};
use crate::target::{InstrClass, InstructionSet};
use std::io::Write;

/// Rewrite one unit, splicing hook calls at eligible loads.
///
/// Returns the rewritten unit and the number of sites injected. `diag`
/// receives one injection line per site.
pub(crate) fn inject_unit<S: InstructionSet>(
    set: &S,
    unit: &S::Unit,
    registry: &SiteRegistry,
    diag: &mut dyn Write,
) -> (S::Unit, usize) {
    let mut eligibility = Eligibility::new(set.receiver(unit));
    let mut out = set.begin_rewrite(unit);
    let mut injected = 0;

    for instr in set.instructions(unit) {
        let class = set.classify(unit, instr);
        match eligibility.decide(&class) {
            Decision::Pass => set.pass_through(&mut out, instr),
            Decision::Inject => {
                splice(set, unit, instr, &class, registry, diag, &mut out);
                injected += 1;
            }
        }
    }

    (out, injected)
}

fn splice<S: InstructionSet>(
    set: &S,
    unit: &S::Unit,
    instr: &S::Instr,
    class: &InstrClass,
    registry: &SiteRegistry,
    diag: &mut dyn Write,
    out: &mut S::Unit,
) {
    let operand = match class.operand() {
        Some(name) => name.to_string(),
        None => panic!("injector bug: eligible instruction has no operand"),
    };
    let (line, col) = set.location(unit, instr);
    let location = SiteLocation {
        path: set.unit_path(unit).to_path_buf(),
        line,
        col,
    };
    let slot = registry.register(class.kind(), &operand, location.clone());

    let _ = writeln!(
        diag,
        "INFO: Injecting bytecode at {location} {} '{operand}'",
        class.kind()
    );

    let spliced_from = set.instructions(out).len();
    set.emit_hook_ref(out, instr);
    set.pass_through(out, instr);
    set.emit_slot_index(out, slot, instr);
    set.emit_hook_call(out, instr);
    if let InstrClass::LocalLoad(name) = class {
        set.emit_store_local(out, name, instr);
        set.emit_load_local(out, name, instr);
    }

    debug_assert_eq!(
        net_effect(set, out, spliced_from),
        set.stack_effect(unit, instr),
        "injector bug: splice changed the stack effect of a load"
    );
}

fn net_effect<S: InstructionSet>(set: &S, unit: &S::Unit, from: usize) -> i32 {
    set.instructions(unit)[from..]
        .iter()
        .map(|instr| set.stack_effect(unit, instr))
        .sum()
}
