//! Loader support for the `graft-run` binary.

pub mod asm;
