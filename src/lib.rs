//! Semantic resolver core for a small expression-oriented language: type
//! registry, scope tree, pattern matcher, overload resolver, specializer,
//! CTFE engine and the fixpoint driver that ties them together.
//!
//! Grounded on the teacher's crate split (`hir_def`, `hir_ty`, `hir_expand`,
//! `hir`) collapsed into a single crate (SPEC_FULL.md §4): every module here
//! corresponds to one or more teacher crates, generalized to this language's
//! semantics rather than Rust's.

pub mod ast;
pub mod ctfe;
pub mod diagnostics;
pub mod driver;
pub mod intern;
pub mod location;
pub mod overload;
pub mod pattern;
pub mod scope;
pub mod specialize;
pub mod types;

use ast::Ast;
use ctfe::IntrinsicRegistry;
use diagnostics::Sink;
use intern::Interner;
use scope::ScopeTree;
use types::TypeRegistry;

/// Everything a single compilation unit's resolution passes operate on.
/// Plays the role the teacher splits across `dyn HirDatabase` (salsa query
/// storage) plus `Body`/`DefMap`; collapsed into one concrete struct since
/// there is no incremental recomputation to memoize (SPEC_FULL.md §4).
pub struct Session {
    pub interner: Interner,
    pub types: TypeRegistry,
    pub ast: Ast,
    pub scope_tree: ScopeTree,
    pub diagnostics: Sink,
    pub intrinsics: IntrinsicRegistry,
    /// Monotonic counter backing `ctfe::fresh_symbol` (spec.md §4.6 hygiene):
    /// mirrors `hir_expand::hygiene`'s globally unique `SyntaxContextId`, so
    /// two unrelated macro expansions never mint the same renamed symbol.
    hygiene_counter: u32,
}

impl Session {
    pub fn new() -> Self {
        Session {
            interner: Interner::new(),
            types: TypeRegistry::new(),
            ast: Ast::new(),
            scope_tree: ScopeTree::new(),
            diagnostics: Sink::new(),
            intrinsics: IntrinsicRegistry::with_builtins(),
            hygiene_counter: 0,
        }
    }

    /// Allocates the top-level module scope every resolution run starts
    /// from.
    pub fn new_module_scope(&mut self) -> scope::ScopeId {
        self.scope_tree.alloc(None)
    }

    /// Next globally-unique suffix for a hygienic rename.
    pub fn next_hygiene_id(&mut self) -> u32 {
        self.hygiene_counter += 1;
        self.hygiene_counter
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_starts_with_builtin_intrinsics() {
        let session = Session::new();
        assert!(session.intrinsics.lookup("add").is_some());
        assert!(session.intrinsics.lookup("nonexistent").is_none());
    }
}
