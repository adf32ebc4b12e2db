//! The error sink (spec.md §6.4, §7).
//!
//! The teacher collects `DefDiagnostic`s into `DefMap` rather than returning
//! `Result`s from name resolution (see `hir_def::nameres::diagnostics`); this
//! crate keeps the same shape, generalized to the taxonomy spec.md §7 lists.

use crate::ast::FunctionId;
use crate::intern::Symbol;
use crate::location::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Debug,
}

#[derive(Debug, Clone)]
pub enum Diagnostic {
    UnresolvedSymbol { location: Location, name: Symbol },
    NoMatchingOverload { location: Location, name: Symbol },
    AmbiguousOverload { location: Location, name: Symbol, candidates: Vec<FunctionId> },
    TypeMismatch { location: Location, message: String },
    ConstnessViolation { location: Location, name: Symbol },
    ShapeMismatch { location: Location, message: String },
    MacroFailure { location: Location, name: Symbol },
    ConstraintFailure { location: Location, name: Symbol },
    PatternRedefinition { location: Location, name: Symbol },
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        Severity::Error
    }

    pub fn location(&self) -> Location {
        match self {
            Diagnostic::UnresolvedSymbol { location, .. }
            | Diagnostic::NoMatchingOverload { location, .. }
            | Diagnostic::AmbiguousOverload { location, .. }
            | Diagnostic::TypeMismatch { location, .. }
            | Diagnostic::ConstnessViolation { location, .. }
            | Diagnostic::ShapeMismatch { location, .. }
            | Diagnostic::MacroFailure { location, .. }
            | Diagnostic::ConstraintFailure { location, .. }
            | Diagnostic::PatternRedefinition { location, .. } => *location,
        }
    }
}

/// A single, process-wide error sink (spec.md §6.4): "receives (location,
/// severity, message)". Resolution continues after a push; nothing here is
/// fatal to the driver loop.
#[derive(Default)]
pub struct Sink {
    diagnostics: Vec<Diagnostic>,
}

impl Sink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    /// The §7 headline line: "Can't resolve N expressions".
    pub fn headline(&self, unresolved_count: u32) -> String {
        format!("Can't resolve {} expressions", unresolved_count)
    }
}
