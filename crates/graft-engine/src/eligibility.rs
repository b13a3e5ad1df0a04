//! Injection eligibility rules.
//!
//! Only the lexically first load of each local slot within one body is a
//! candidate; the receiver slot never is. Constant loads are recognized but
//! disabled by policy, pending a defined constant-mutation scheme.

use crate::target::InstrClass;
use std::collections::HashSet;

/// Decision for one instruction occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Splice in the hook call sequence.
    Inject,
    /// Leave the instruction untouched.
    Pass,
}

/// Per-body classifier tracking which local names are already bound.
///
/// Decisions are taken in stream order, once per instruction; a local name
/// becomes bound after its first load whether or not that load was injected.
#[derive(Debug)]
pub struct Eligibility {
    bound: HashSet<String>,
}

impl Eligibility {
    /// Start a fresh pass. The receiver, if any, counts as already bound.
    pub fn new(receiver: Option<&str>) -> Self {
        let mut bound = HashSet::new();
        if let Some(name) = receiver {
            bound.insert(name.to_string());
        }
        Self { bound }
    }

    /// Decide one instruction.
    pub fn decide(&mut self, class: &InstrClass) -> Decision {
        match class {
            // Reserved for future constant mutation.
            InstrClass::ConstantLoad(_) => Decision::Pass,
            InstrClass::LocalLoad(name) => {
                if self.bound.insert(name.clone()) {
                    Decision::Inject
                } else {
                    Decision::Pass
                }
            }
            // Stores never bind a name.
            InstrClass::LocalStore(_)
            | InstrClass::GlobalLoad(_)
            | InstrClass::Call
            | InstrClass::Other => Decision::Pass,
        }
    }
}
