//! Pluggable instruction-set interface.
//!
//! The eligibility and rewrite logic is generic over the target instruction
//! set: an adapter declares how instructions classify, what their stack
//! effects are, and how to emit the injected call sequence in its own
//! encoding. [`crate::StackVm`] is the adapter for the graft bytecode VM.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Classification of one instruction, with its operand rendered to the
/// identifier the site registry records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstrClass {
    /// Pushes a constant (operand: constant repr)
    ConstantLoad(String),
    /// Pushes a local slot value (operand: slot name)
    LocalLoad(String),
    /// Pops into a local slot (operand: slot name)
    LocalStore(String),
    /// Pushes a global (operand: global name)
    GlobalLoad(String),
    /// Invokes a callable
    Call,
    /// Anything else
    Other,
}

impl InstrClass {
    /// The fieldless kind tag for this classification.
    pub fn kind(&self) -> InstrKind {
        match self {
            InstrClass::ConstantLoad(_) => InstrKind::ConstantLoad,
            InstrClass::LocalLoad(_) => InstrKind::LocalLoad,
            InstrClass::LocalStore(_) => InstrKind::LocalStore,
            InstrClass::GlobalLoad(_) => InstrKind::GlobalLoad,
            InstrClass::Call => InstrKind::Call,
            InstrClass::Other => InstrKind::Other,
        }
    }

    /// The operand identifier, when the classification carries one.
    pub fn operand(&self) -> Option<&str> {
        match self {
            InstrClass::ConstantLoad(s)
            | InstrClass::LocalLoad(s)
            | InstrClass::LocalStore(s)
            | InstrClass::GlobalLoad(s) => Some(s),
            InstrClass::Call | InstrClass::Other => None,
        }
    }
}

/// Instruction kind recorded in mutation-site descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstrKind {
    ConstantLoad,
    LocalLoad,
    LocalStore,
    GlobalLoad,
    Call,
    Other,
}

impl fmt::Display for InstrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstrKind::ConstantLoad => "ConstantLoad",
            InstrKind::LocalLoad => "LocalLoad",
            InstrKind::LocalStore => "LocalStore",
            InstrKind::GlobalLoad => "GlobalLoad",
            InstrKind::Call => "Call",
            InstrKind::Other => "Other",
        };
        f.write_str(name)
    }
}

/// Adapter between the injection pass and one concrete instruction set.
///
/// `begin_rewrite` yields a unit with the original's tables and metadata but
/// an empty body; the pass then appends untouched instructions through
/// `pass_through` and spliced sequences through the `emit_*` methods. Every
/// `emit_*` takes the instruction being replaced so emitted code can inherit
/// its source position.
pub trait InstructionSet {
    /// One instruction in this encoding.
    type Instr: Clone;
    /// One function body in this encoding.
    type Unit: Clone;

    /// Source file the unit was compiled from.
    fn unit_path<'a>(&self, unit: &'a Self::Unit) -> &'a Path;

    /// Receiver slot name, when the unit's calling convention has one.
    fn receiver<'a>(&self, unit: &'a Self::Unit) -> Option<&'a str>;

    /// The unit's instruction sequence, in stream order.
    fn instructions<'a>(&self, unit: &'a Self::Unit) -> &'a [Self::Instr];

    /// Classify an instruction and render its operand.
    fn classify(&self, unit: &Self::Unit, instr: &Self::Instr) -> InstrClass;

    /// End line and column of the instruction's source token.
    fn location(&self, unit: &Self::Unit, instr: &Self::Instr) -> (u32, u32);

    /// Declared net stack effect of one instruction.
    fn stack_effect(&self, unit: &Self::Unit, instr: &Self::Instr) -> i32;

    /// Start a rewritten copy: same tables and metadata, empty body.
    fn begin_rewrite(&self, unit: &Self::Unit) -> Self::Unit;

    /// Append an untouched instruction.
    fn pass_through(&self, out: &mut Self::Unit, instr: &Self::Instr);

    /// Append a push of the mutation hook reference.
    fn emit_hook_ref(&self, out: &mut Self::Unit, at: &Self::Instr);

    /// Append a push of a registry slot index constant.
    fn emit_slot_index(&self, out: &mut Self::Unit, slot: u64, at: &Self::Instr);

    /// Append the two-argument hook invocation.
    fn emit_hook_call(&self, out: &mut Self::Unit, at: &Self::Instr);

    /// Append a store into a named local slot.
    fn emit_store_local(&self, out: &mut Self::Unit, name: &str, at: &Self::Instr);

    /// Append a load of a named local slot.
    fn emit_load_local(&self, out: &mut Self::Unit, name: &str, at: &Self::Instr);
}
