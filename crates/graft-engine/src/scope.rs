//! Scope filter: which code units get instrumented.

use std::path::{Path, PathBuf};

/// Boundary check limiting instrumentation to code units whose source file
/// lies under a configured root directory.
///
/// Containment is lexical: no filesystem access, no canonicalization.
/// Callers hand in the paths their units were compiled from.
#[derive(Debug, Clone)]
pub struct ScopeFilter {
    root: PathBuf,
}

impl ScopeFilter {
    /// Create a filter rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The configured root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// True iff `path` is a strict descendant of the root. The root itself
    /// is a directory, never a unit's source file, so equality is outside.
    pub fn in_scope(&self, path: &Path) -> bool {
        path != self.root && path.starts_with(&self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descendant_is_in_scope() {
        let filter = ScopeFilter::new("/proj");
        assert!(filter.in_scope(Path::new("/proj/src/f.gasm")));
        assert!(filter.in_scope(Path::new("/proj/f.gasm")));
    }

    #[test]
    fn test_outside_paths_are_rejected() {
        let filter = ScopeFilter::new("/proj");
        assert!(!filter.in_scope(Path::new("/lib/ext.gasm")));
        assert!(!filter.in_scope(Path::new("/f.gasm")));
    }

    #[test]
    fn test_root_itself_is_outside() {
        let filter = ScopeFilter::new("/proj");
        assert!(!filter.in_scope(Path::new("/proj")));
    }

    #[test]
    fn test_containment_is_by_component_not_prefix() {
        let filter = ScopeFilter::new("/proj");
        assert!(!filter.in_scope(Path::new("/proj-other/f.gasm")));
    }
}
