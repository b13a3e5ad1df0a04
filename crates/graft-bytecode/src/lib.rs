//! Graft VM - stack-based bytecode instruction model
//!
//! Flat instruction streams over a value stack and named local slots, plus a
//! reference executor that runs them against a host environment. Jump targets
//! are in-stream labels, so streams can be spliced by instrumentation passes
//! without re-patching offsets.

pub mod executor;
pub mod loc;
pub mod op;
pub mod unit;
pub mod value;

pub use executor::{ExecError, HostEnv, execute};
pub use loc::SourceLoc;
pub use op::Op;
pub use unit::{CodeUnit, Instr, InstructionStream};
pub use value::Value;
