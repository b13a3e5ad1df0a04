//! Instruction streams and code units.

use crate::loc::SourceLoc;
use crate::op::Op;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One instruction plus the source position it was compiled from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Instr {
    /// The operation.
    pub op: Op,
    /// End position of the producing source token.
    pub loc: SourceLoc,
}

impl Instr {
    /// Create a new instruction.
    pub fn new(op: Op, loc: SourceLoc) -> Self {
        Self { op, loc }
    }
}

/// An ordered instruction sequence plus its interning tables.
///
/// Relative instruction order is significant and preserved by every pass
/// that touches the stream; tables only ever grow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstructionStream {
    /// The instruction sequence
    pub code: Vec<Instr>,

    /// Constant value table
    pub consts: Vec<Value>,

    /// Local slot name table
    pub locals: Vec<String>,

    /// Global name table
    pub globals: Vec<String>,
}

impl InstructionStream {
    /// Create a new, empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constant value, returning its index
    pub fn add_const(&mut self, value: Value) -> u16 {
        if let Some(idx) = self.consts.iter().position(|v| v == &value) {
            return idx as u16;
        }
        let idx = self.consts.len() as u16;
        self.consts.push(value);
        idx
    }

    /// Add a local slot name, returning its index
    pub fn add_local(&mut self, name: &str) -> u16 {
        if let Some(idx) = self.locals.iter().position(|s| s == name) {
            return idx as u16;
        }
        let idx = self.locals.len() as u16;
        self.locals.push(name.to_string());
        idx
    }

    /// Add a global name, returning its index
    pub fn add_global(&mut self, name: &str) -> u16 {
        if let Some(idx) = self.globals.iter().position(|s| s == name) {
            return idx as u16;
        }
        let idx = self.globals.len() as u16;
        self.globals.push(name.to_string());
        idx
    }

    /// Append an instruction
    pub fn push(&mut self, instr: Instr) {
        self.code.push(instr);
    }
}

/// One function or method body: a named, source-located instruction stream.
///
/// Owned by whatever loads it; the injection engine borrows a unit for the
/// duration of one pass and hands back a new, independent unit. The receiver
/// (if any) and the parameters occupy the leading local slots, in that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeUnit {
    /// Function or method name
    pub name: String,

    /// Source file the unit was compiled from
    pub path: PathBuf,

    /// Receiver slot name, when the calling convention defines one
    pub receiver: Option<String>,

    /// Parameter slot names in call order, receiver excluded
    pub params: Vec<String>,

    /// The compiled body
    pub stream: InstructionStream,
}

impl CodeUnit {
    /// Create a plain function unit.
    pub fn function(name: &str, path: impl Into<PathBuf>, params: &[&str]) -> Self {
        let mut stream = InstructionStream::new();
        for param in params {
            stream.add_local(param);
        }
        Self {
            name: name.to_string(),
            path: path.into(),
            receiver: None,
            params: params.iter().map(|p| p.to_string()).collect(),
            stream,
        }
    }

    /// Create a method unit whose first argument is the receiver.
    pub fn method(name: &str, path: impl Into<PathBuf>, receiver: &str, params: &[&str]) -> Self {
        let mut stream = InstructionStream::new();
        stream.add_local(receiver);
        for param in params {
            stream.add_local(param);
        }
        Self {
            name: name.to_string(),
            path: path.into(),
            receiver: Some(receiver.to_string()),
            params: params.iter().map(|p| p.to_string()).collect(),
            stream,
        }
    }

    /// Number of call arguments the unit expects, receiver included.
    pub fn arg_count(&self) -> usize {
        self.params.len() + usize::from(self.receiver.is_some())
    }
}
