//! Source locations attached to every AST node and diagnostic.
//!
//! The lexer/parser are external collaborators (spec.md §1); this crate only
//! needs an opaque, orderable location to carry through resolution and to
//! report in diagnostics (spec.md §6.1, §7).

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Location {
    pub file: u32,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub const fn unknown() -> Self {
        Location { file: 0, line: 0, column: 0 }
    }

    pub const fn new(file: u32, line: u32, column: u32) -> Self {
        Location { file, line, column }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}
