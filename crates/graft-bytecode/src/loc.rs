use serde::{Deserialize, Serialize};
use std::fmt;

/// End position of the source token an instruction was compiled from.
///
/// Lines and columns are both 1-based. Instrumentation records the end
/// position, so diagnostics point at where a load finishes rather than where
/// its statement begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLoc {
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub col: u32,
}

impl SourceLoc {
    /// Create a new source location.
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}
