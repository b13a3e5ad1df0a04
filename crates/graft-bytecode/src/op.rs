//! Bytecode instruction set
//!
//! Flat, cache-friendly instruction encoding for stack-based execution.
//! Each instruction operates on an implicit operand stack plus named local
//! slots; `u16` operands index the owning stream's interning tables.

use serde::{Deserialize, Serialize};

/// Bytecode instruction.
///
/// Stack-based: operands are popped from the stack, results pushed back.
/// Jumps name in-stream [`Op::Label`] markers rather than raw offsets, so
/// instruction sequences can be spliced without re-patching targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    // === Loads and stores ===
    /// Push a constant value (index into the constant table)
    Const(u16),

    /// Push the value of a local slot (index into the local name table)
    LoadLocal(u16),

    /// Pop the top of stack into a local slot
    StoreLocal(u16),

    /// Push a global resolved by name through the host environment
    /// (index into the global name table)
    LoadGlobal(u16),

    // === Function calls ===
    /// Call the callable beneath the arguments with N arguments
    /// (pops N arguments plus the callee, pushes 1 result)
    Call {
        /// Number of arguments to pop
        arity: u8,
    },

    // === Arithmetic ===
    /// Add top two stack values (pop b, pop a, push a + b)
    Add,
    /// Subtract top two stack values (pop b, pop a, push a - b)
    Sub,
    /// Multiply top two stack values (pop b, pop a, push a * b)
    Mul,

    // === Comparison ===
    /// Check equality (pop b, pop a, push a == b)
    Eq,
    /// Check less than (pop b, pop a, push a < b)
    Lt,

    // === Control flow ===
    /// Jump to a label unconditionally
    Jump(u16),

    /// Pop the top of stack, jump to a label if it is false
    JumpIfFalse(u16),

    /// Jump target marker; executes as a no-op
    Label(u16),

    // === Stack manipulation ===
    /// Duplicate top of stack
    Dup,

    /// Pop and discard top of stack
    Pop,

    /// Pop the top of stack and return it to the caller
    Return,
}

impl Op {
    /// Net stack effect of executing this instruction (pushes minus pops).
    pub fn stack_effect(&self) -> i32 {
        match self {
            Op::Const(_) | Op::LoadLocal(_) | Op::LoadGlobal(_) | Op::Dup => 1,
            Op::StoreLocal(_) | Op::Pop | Op::JumpIfFalse(_) | Op::Return => -1,
            Op::Add | Op::Sub | Op::Mul | Op::Eq | Op::Lt => -1,
            Op::Call { arity } => -(*arity as i32),
            Op::Jump(_) | Op::Label(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_effects() {
        assert_eq!(Op::Const(0).stack_effect(), 1);
        assert_eq!(Op::LoadLocal(0).stack_effect(), 1);
        assert_eq!(Op::StoreLocal(0).stack_effect(), -1);
        assert_eq!(Op::LoadGlobal(0).stack_effect(), 1);
        assert_eq!(Op::Add.stack_effect(), -1);
        assert_eq!(Op::Label(0).stack_effect(), 0);
        assert_eq!(Op::Jump(0).stack_effect(), 0);
        assert_eq!(Op::JumpIfFalse(0).stack_effect(), -1);
    }

    #[test]
    fn test_call_stack_effect_pops_callee() {
        // Pops the callee plus two arguments, pushes one result.
        assert_eq!(Op::Call { arity: 2 }.stack_effect(), -2);
        assert_eq!(Op::Call { arity: 0 }.stack_effect(), 0);
    }
}
