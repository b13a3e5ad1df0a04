//! Adapter binding the injection pass to the graft bytecode VM.

use crate::env::HOOK_GLOBAL;
use crate::target::{InstrClass, InstructionSet};
use graft_bytecode::{CodeUnit, Instr, Op, Value};
use std::path::Path;

/// The graft stack VM as an injection target.
///
/// Operands index the unit's interning tables; classification resolves them
/// to names (or constant reprs), and dangling indices classify as `Other`
/// so the pass stays fail-open on malformed streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct StackVm;

impl StackVm {
    /// Create the adapter.
    pub fn new() -> Self {
        Self
    }
}

impl InstructionSet for StackVm {
    type Instr = Instr;
    type Unit = CodeUnit;

    fn unit_path<'a>(&self, unit: &'a CodeUnit) -> &'a Path {
        &unit.path
    }

    fn receiver<'a>(&self, unit: &'a CodeUnit) -> Option<&'a str> {
        unit.receiver.as_deref()
    }

    fn instructions<'a>(&self, unit: &'a CodeUnit) -> &'a [Instr] {
        &unit.stream.code
    }

    fn classify(&self, unit: &CodeUnit, instr: &Instr) -> InstrClass {
        match instr.op {
            Op::Const(idx) => match unit.stream.consts.get(idx as usize) {
                Some(value) => InstrClass::ConstantLoad(value.literal()),
                None => InstrClass::Other,
            },
            Op::LoadLocal(slot) => match unit.stream.locals.get(slot as usize) {
                Some(name) => InstrClass::LocalLoad(name.clone()),
                None => InstrClass::Other,
            },
            Op::StoreLocal(slot) => match unit.stream.locals.get(slot as usize) {
                Some(name) => InstrClass::LocalStore(name.clone()),
                None => InstrClass::Other,
            },
            Op::LoadGlobal(idx) => match unit.stream.globals.get(idx as usize) {
                Some(name) => InstrClass::GlobalLoad(name.clone()),
                None => InstrClass::Other,
            },
            Op::Call { .. } => InstrClass::Call,
            _ => InstrClass::Other,
        }
    }

    fn location(&self, _unit: &CodeUnit, instr: &Instr) -> (u32, u32) {
        (instr.loc.line, instr.loc.col)
    }

    fn stack_effect(&self, _unit: &CodeUnit, instr: &Instr) -> i32 {
        instr.op.stack_effect()
    }

    fn begin_rewrite(&self, unit: &CodeUnit) -> CodeUnit {
        let mut out = unit.clone();
        out.stream.code.clear();
        out
    }

    fn pass_through(&self, out: &mut CodeUnit, instr: &Instr) {
        out.stream.push(*instr);
    }

    fn emit_hook_ref(&self, out: &mut CodeUnit, at: &Instr) {
        let idx = out.stream.add_global(HOOK_GLOBAL);
        out.stream.push(Instr::new(Op::LoadGlobal(idx), at.loc));
    }

    fn emit_slot_index(&self, out: &mut CodeUnit, slot: u64, at: &Instr) {
        let idx = out.stream.add_const(Value::Int(slot as i64));
        out.stream.push(Instr::new(Op::Const(idx), at.loc));
    }

    fn emit_hook_call(&self, out: &mut CodeUnit, at: &Instr) {
        out.stream.push(Instr::new(Op::Call { arity: 2 }, at.loc));
    }

    fn emit_store_local(&self, out: &mut CodeUnit, name: &str, at: &Instr) {
        let slot = out.stream.add_local(name);
        out.stream.push(Instr::new(Op::StoreLocal(slot), at.loc));
    }

    fn emit_load_local(&self, out: &mut CodeUnit, name: &str, at: &Instr) {
        let slot = out.stream.add_local(name);
        out.stream.push(Instr::new(Op::LoadLocal(slot), at.loc));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_bytecode::SourceLoc;

    fn instr(op: Op) -> Instr {
        Instr::new(op, SourceLoc::new(1, 1))
    }

    #[test]
    fn test_classification_resolves_table_operands() {
        let mut unit = CodeUnit::function("f", "/proj/src/f.gasm", &["x"]);
        let k = unit.stream.add_const(Value::Int(42));
        let g = unit.stream.add_global("print");

        let vm = StackVm::new();
        assert_eq!(
            vm.classify(&unit, &instr(Op::LoadLocal(0))),
            InstrClass::LocalLoad("x".to_string())
        );
        assert_eq!(
            vm.classify(&unit, &instr(Op::StoreLocal(0))),
            InstrClass::LocalStore("x".to_string())
        );
        assert_eq!(
            vm.classify(&unit, &instr(Op::Const(k))),
            InstrClass::ConstantLoad("42".to_string())
        );
        assert_eq!(
            vm.classify(&unit, &instr(Op::LoadGlobal(g))),
            InstrClass::GlobalLoad("print".to_string())
        );
        assert_eq!(vm.classify(&unit, &instr(Op::Call { arity: 1 })), InstrClass::Call);
        assert_eq!(vm.classify(&unit, &instr(Op::Add)), InstrClass::Other);
    }

    #[test]
    fn test_dangling_indices_classify_as_other() {
        let unit = CodeUnit::function("f", "/proj/src/f.gasm", &[]);
        let vm = StackVm::new();
        assert_eq!(vm.classify(&unit, &instr(Op::LoadLocal(7))), InstrClass::Other);
        assert_eq!(vm.classify(&unit, &instr(Op::Const(7))), InstrClass::Other);
    }

    #[test]
    fn test_begin_rewrite_keeps_tables_and_empties_code() {
        let mut unit = CodeUnit::function("f", "/proj/src/f.gasm", &["x"]);
        unit.stream.add_const(Value::Int(1));
        unit.stream.push(instr(Op::LoadLocal(0)));

        let vm = StackVm::new();
        let out = vm.begin_rewrite(&unit);
        assert!(out.stream.code.is_empty());
        assert_eq!(out.stream.locals, unit.stream.locals);
        assert_eq!(out.stream.consts, unit.stream.consts);
        assert_eq!(out.name, unit.name);
        assert_eq!(out.path, unit.path);
    }

    #[test]
    fn test_emitters_inherit_location_and_intern() {
        let unit = CodeUnit::function("f", "/proj/src/f.gasm", &["x"]);
        let vm = StackVm::new();
        let mut out = vm.begin_rewrite(&unit);
        let at = Instr::new(Op::LoadLocal(0), SourceLoc::new(3, 9));

        vm.emit_hook_ref(&mut out, &at);
        vm.emit_slot_index(&mut out, 5, &at);
        vm.emit_hook_call(&mut out, &at);
        vm.emit_store_local(&mut out, "x", &at);
        vm.emit_load_local(&mut out, "x", &at);

        let code = &out.stream.code;
        assert_eq!(code[0].op, Op::LoadGlobal(0));
        assert_eq!(out.stream.globals[0], HOOK_GLOBAL);
        assert_eq!(code[1].op, Op::Const(0));
        assert_eq!(out.stream.consts[0], Value::Int(5));
        assert_eq!(code[2].op, Op::Call { arity: 2 });
        assert_eq!(code[3].op, Op::StoreLocal(0));
        assert_eq!(code[4].op, Op::LoadLocal(0));
        assert!(code.iter().all(|i| i.loc == SourceLoc::new(3, 9)));
    }
}
