//! Bytecode executor
//!
//! Stack-based VM that runs one code unit against a host environment.

use crate::op::Op;
use crate::unit::{CodeUnit, InstructionStream};
use crate::value::Value;
use std::collections::HashMap;

/// Host environment the executor resolves globals and callables through.
pub trait HostEnv {
    /// Resolve a global by name.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::UnknownGlobal`] if the name is not bound.
    fn load_global(&self, name: &str) -> Result<Value, ExecError>;

    /// Invoke the callable behind an opaque handle.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::UnknownHandle`] if the handle is not bound, or
    /// whatever error the callable itself produces.
    fn call(&self, handle: u64, args: Vec<Value>) -> Result<Value, ExecError>;
}

/// Bytecode execution error.
///
/// These errors represent runtime violations during interpretation, such as
/// stack mismatches, reads of unwritten slots, or invalid operand indices.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecError {
    /// Stack underflow: attempted to pop from an empty evaluation stack.
    #[error("Stack underflow: tried to pop from empty stack")]
    StackUnderflow,

    /// Read from a local slot that has not been written to.
    #[error("Uninitialized local '{name}'")]
    UninitializedLocal {
        /// Name of the unwritten slot.
        name: String,
    },

    /// Jump to a label that does not exist in the stream.
    #[error("Unknown label {label}")]
    UnknownLabel {
        /// The missing label identifier.
        label: u16,
    },

    /// An operation received a [`Value`] of an unexpected variant.
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// The expected value kind.
        expected: &'static str,
        /// The actual value kind received.
        found: &'static str,
    },

    /// Call target was not an opaque callable handle.
    #[error("Not callable: {found}")]
    NotCallable {
        /// The value kind found in the callee position.
        found: &'static str,
    },

    /// Global name not bound in the host environment.
    #[error("Unknown global '{name}'")]
    UnknownGlobal {
        /// The unresolved global name.
        name: String,
    },

    /// Callable handle not bound in the host environment.
    #[error("Unknown callable handle {handle}")]
    UnknownHandle {
        /// The unresolved handle.
        handle: u64,
    },

    /// Wrong number of call arguments for a unit.
    #[error("Arity mismatch: expected {expected} arguments, found {found}")]
    ArityMismatch {
        /// Arguments the unit expects, receiver included.
        expected: usize,
        /// Arguments actually supplied.
        found: usize,
    },

    /// A table operand pointed outside its interning table.
    #[error("Invalid {table} index {index}")]
    InvalidIndex {
        /// Which table was indexed.
        table: &'static str,
        /// The out-of-range index.
        index: u16,
    },
}

/// Execute a code unit with the given arguments and host environment.
///
/// Arguments bind to the receiver slot (if any) followed by the declared
/// parameters, in order. Falling off the end of the stream without a
/// `Return` yields [`Value::Unit`].
///
/// # Errors
///
/// Returns an [`ExecError`] on stack underflow, reads of unwritten locals,
/// bad table indices, type confusion, or host lookup failures.
pub fn execute(unit: &CodeUnit, args: &[Value], env: &dyn HostEnv) -> Result<Value, ExecError> {
    let stream = &unit.stream;
    let expected = unit.arg_count();
    if args.len() != expected {
        return Err(ExecError::ArityMismatch {
            expected,
            found: args.len(),
        });
    }
    if expected > stream.locals.len() {
        return Err(ExecError::InvalidIndex {
            table: "locals",
            index: stream.locals.len() as u16,
        });
    }

    // Labels resolve to instruction offsets in one prepass.
    let mut labels: HashMap<u16, usize> = HashMap::new();
    for (offset, instr) in stream.code.iter().enumerate() {
        if let Op::Label(id) = instr.op {
            labels.insert(id, offset);
        }
    }

    let mut stack: Vec<Value> = Vec::with_capacity(32);
    let mut locals: Vec<Option<Value>> = vec![None; stream.locals.len()];
    for (slot, value) in args.iter().enumerate() {
        locals[slot] = Some(value.clone());
    }

    let mut ip = 0;
    while ip < stream.code.len() {
        match stream.code[ip].op {
            Op::Const(idx) => {
                let value = stream.consts.get(idx as usize).ok_or(ExecError::InvalidIndex {
                    table: "consts",
                    index: idx,
                })?;
                stack.push(value.clone());
            }

            Op::LoadLocal(slot) => {
                let name = local_name(stream, slot)?;
                match &locals[slot as usize] {
                    Some(value) => stack.push(value.clone()),
                    None => {
                        return Err(ExecError::UninitializedLocal {
                            name: name.to_string(),
                        });
                    }
                }
            }

            Op::StoreLocal(slot) => {
                local_name(stream, slot)?;
                let value = pop(&mut stack)?;
                locals[slot as usize] = Some(value);
            }

            Op::LoadGlobal(idx) => {
                let name = stream.globals.get(idx as usize).ok_or(ExecError::InvalidIndex {
                    table: "globals",
                    index: idx,
                })?;
                stack.push(env.load_global(name)?);
            }

            Op::Call { arity } => {
                let start = stack
                    .len()
                    .checked_sub(arity as usize)
                    .ok_or(ExecError::StackUnderflow)?;
                let call_args: Vec<Value> = stack.drain(start..).collect();
                let handle = match pop(&mut stack)? {
                    Value::Opaque(handle) => handle,
                    other => return Err(ExecError::NotCallable { found: other.kind() }),
                };
                stack.push(env.call(handle, call_args)?);
            }

            Op::Add => {
                let (a, b) = pop_int_pair(&mut stack)?;
                stack.push(Value::Int(a + b));
            }

            Op::Sub => {
                let (a, b) = pop_int_pair(&mut stack)?;
                stack.push(Value::Int(a - b));
            }

            Op::Mul => {
                let (a, b) = pop_int_pair(&mut stack)?;
                stack.push(Value::Int(a * b));
            }

            Op::Eq => {
                let r = pop(&mut stack)?;
                let l = pop(&mut stack)?;
                stack.push(Value::Bool(l == r));
            }

            Op::Lt => {
                let (a, b) = pop_int_pair(&mut stack)?;
                stack.push(Value::Bool(a < b));
            }

            Op::Jump(label) => {
                ip = label_target(&labels, label)?;
            }

            Op::JumpIfFalse(label) => {
                let cond = match pop(&mut stack)? {
                    Value::Bool(b) => b,
                    other => {
                        return Err(ExecError::TypeMismatch {
                            expected: "Bool",
                            found: other.kind(),
                        });
                    }
                };
                if !cond {
                    ip = label_target(&labels, label)?;
                }
            }

            Op::Label(_) => {}

            Op::Dup => {
                let value = stack.last().cloned().ok_or(ExecError::StackUnderflow)?;
                stack.push(value);
            }

            Op::Pop => {
                pop(&mut stack)?;
            }

            Op::Return => {
                return pop(&mut stack);
            }
        }
        ip += 1;
    }

    Ok(Value::Unit)
}

fn pop(stack: &mut Vec<Value>) -> Result<Value, ExecError> {
    stack.pop().ok_or(ExecError::StackUnderflow)
}

fn pop_int_pair(stack: &mut Vec<Value>) -> Result<(i64, i64), ExecError> {
    let b = pop_int(stack)?;
    let a = pop_int(stack)?;
    Ok((a, b))
}

fn pop_int(stack: &mut Vec<Value>) -> Result<i64, ExecError> {
    match pop(stack)? {
        Value::Int(v) => Ok(v),
        other => Err(ExecError::TypeMismatch {
            expected: "Int",
            found: other.kind(),
        }),
    }
}

fn local_name(stream: &InstructionStream, slot: u16) -> Result<&str, ExecError> {
    stream
        .locals
        .get(slot as usize)
        .map(String::as_str)
        .ok_or(ExecError::InvalidIndex {
            table: "locals",
            index: slot,
        })
}

fn label_target(labels: &HashMap<u16, usize>, label: u16) -> Result<usize, ExecError> {
    labels
        .get(&label)
        .copied()
        .ok_or(ExecError::UnknownLabel { label })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loc::SourceLoc;
    use crate::unit::Instr;

    /// Host with one global callable "double" behind handle 1.
    struct TestEnv;

    impl HostEnv for TestEnv {
        fn load_global(&self, name: &str) -> Result<Value, ExecError> {
            match name {
                "double" => Ok(Value::Opaque(1)),
                _ => Err(ExecError::UnknownGlobal {
                    name: name.to_string(),
                }),
            }
        }

        fn call(&self, handle: u64, args: Vec<Value>) -> Result<Value, ExecError> {
            match handle {
                1 => {
                    let v = args.first().and_then(Value::as_int).unwrap_or(0);
                    Ok(Value::Int(v * 2))
                }
                _ => Err(ExecError::UnknownHandle { handle }),
            }
        }
    }

    fn unit_with(params: &[&str], build: impl FnOnce(&mut CodeUnit)) -> CodeUnit {
        let mut unit = CodeUnit::function("test_fn", "/proj/src/test_fn.gasm", params);
        build(&mut unit);
        unit
    }

    fn emit(unit: &mut CodeUnit, op: Op) {
        unit.stream.push(Instr::new(op, SourceLoc::new(1, 1)));
    }

    #[test]
    fn test_execute_arithmetic() {
        let unit = unit_with(&["x", "y"], |u| {
            emit(u, Op::LoadLocal(0));
            emit(u, Op::LoadLocal(1));
            emit(u, Op::Add);
            emit(u, Op::Return);
        });
        let result = execute(&unit, &[Value::Int(2), Value::Int(3)], &TestEnv).unwrap();
        assert_eq!(result, Value::Int(5));
    }

    #[test]
    fn test_store_then_load_round_trips() {
        let unit = unit_with(&[], |u| {
            let k = u.stream.add_const(Value::Int(7));
            let z = u.stream.add_local("z");
            emit(u, Op::Const(k));
            emit(u, Op::StoreLocal(z));
            emit(u, Op::LoadLocal(z));
            emit(u, Op::Return);
        });
        let result = execute(&unit, &[], &TestEnv).unwrap();
        assert_eq!(result, Value::Int(7));
    }

    #[test]
    fn test_store_local_pops() {
        // If StoreLocal left its operand on the stack, the Return after it
        // would still have something to pop.
        let unit = unit_with(&[], |u| {
            let k = u.stream.add_const(Value::Int(7));
            let z = u.stream.add_local("z");
            emit(u, Op::Const(k));
            emit(u, Op::StoreLocal(z));
            emit(u, Op::Return);
        });
        let result = execute(&unit, &[], &TestEnv);
        assert!(matches!(result, Err(ExecError::StackUnderflow)));
    }

    #[test]
    fn test_branch_through_labels() {
        let build = |u: &mut CodeUnit| {
            let one = u.stream.add_const(Value::Int(1));
            let zero = u.stream.add_const(Value::Int(0));
            emit(u, Op::LoadLocal(0));
            emit(u, Op::JumpIfFalse(0));
            emit(u, Op::Const(one));
            emit(u, Op::Return);
            emit(u, Op::Label(0));
            emit(u, Op::Const(zero));
            emit(u, Op::Return);
        };
        let unit = unit_with(&["flag"], build);
        assert_eq!(
            execute(&unit, &[Value::Bool(true)], &TestEnv).unwrap(),
            Value::Int(1)
        );
        assert_eq!(
            execute(&unit, &[Value::Bool(false)], &TestEnv).unwrap(),
            Value::Int(0)
        );
    }

    #[test]
    fn test_call_through_host() {
        let unit = unit_with(&["x"], |u| {
            let g = u.stream.add_global("double");
            emit(u, Op::LoadGlobal(g));
            emit(u, Op::LoadLocal(0));
            emit(u, Op::Call { arity: 1 });
            emit(u, Op::Return);
        });
        let result = execute(&unit, &[Value::Int(21)], &TestEnv).unwrap();
        assert_eq!(result, Value::Int(42));
    }

    #[test]
    fn test_uninitialized_local() {
        let unit = unit_with(&[], |u| {
            let z = u.stream.add_local("z");
            emit(u, Op::LoadLocal(z));
            emit(u, Op::Return);
        });
        let result = execute(&unit, &[], &TestEnv);
        assert!(matches!(
            result,
            Err(ExecError::UninitializedLocal { name }) if name == "z"
        ));
    }

    #[test]
    fn test_arity_mismatch() {
        let unit = unit_with(&["x"], |_| {});
        let result = execute(&unit, &[], &TestEnv);
        assert!(matches!(
            result,
            Err(ExecError::ArityMismatch {
                expected: 1,
                found: 0
            })
        ));
    }

    #[test]
    fn test_fall_off_end_yields_unit() {
        let unit = unit_with(&[], |_| {});
        assert_eq!(execute(&unit, &[], &TestEnv).unwrap(), Value::Unit);
    }

    #[test]
    fn test_unknown_label() {
        let unit = unit_with(&[], |u| {
            emit(u, Op::Jump(9));
        });
        let result = execute(&unit, &[], &TestEnv);
        assert!(matches!(result, Err(ExecError::UnknownLabel { label: 9 })));
    }

    #[test]
    fn test_add_rejects_non_int() {
        let unit = unit_with(&[], |u| {
            let t = u.stream.add_const(Value::Bool(true));
            let one = u.stream.add_const(Value::Int(1));
            emit(u, Op::Const(t));
            emit(u, Op::Const(one));
            emit(u, Op::Add);
            emit(u, Op::Return);
        });
        let result = execute(&unit, &[], &TestEnv);
        assert!(matches!(result, Err(ExecError::TypeMismatch { .. })));
    }

    #[test]
    fn test_call_rejects_non_callable() {
        let unit = unit_with(&[], |u| {
            let k = u.stream.add_const(Value::Int(3));
            emit(u, Op::Const(k));
            emit(u, Op::Call { arity: 0 });
            emit(u, Op::Return);
        });
        let result = execute(&unit, &[], &TestEnv);
        assert!(matches!(result, Err(ExecError::NotCallable { found: "Int" })));
    }

    #[test]
    fn test_method_binds_receiver_then_params() {
        let mut unit = CodeUnit::method("m", "/proj/src/m.gasm", "this", &["x"]);
        emit(&mut unit, Op::LoadLocal(0));
        emit(&mut unit, Op::LoadLocal(1));
        emit(&mut unit, Op::Sub);
        emit(&mut unit, Op::Return);
        let result = execute(&unit, &[Value::Int(10), Value::Int(4)], &TestEnv).unwrap();
        assert_eq!(result, Value::Int(6));
    }
}
