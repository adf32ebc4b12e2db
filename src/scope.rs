//! The Scope Tree (spec.md §4.2, component C2).
//!
//! Grounded on `hir_def::nameres`'s `DefMap`/`ItemScope` pair: a scope is a
//! map from name to definition plus a parent link and a list of imports. We
//! fold `DefMap` (one per module) and `ItemScope` (one per block) into a
//! single arena-indexed `ScopeData`, since this crate has no per-module
//! incremental recomputation to keep separate (SPEC_FULL.md §4).

use la_arena::{Arena, Idx};
use rustc_hash::FxHashMap;

use crate::ast::{FunctionId, OverloadSetId, RecordId, TraitId, TypeDeclId, VariableId, VariantId};
use crate::intern::Symbol;

pub type ScopeId = Idx<ScopeData>;

/// What a name in prefix position (an ordinary identifier) resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixDef {
    Variable(VariableId),
    Function(FunctionId),
    Overloadset(OverloadSetId),
    Record(RecordId),
    Variant(VariantId),
    Trait(TraitId),
    TypeDecl(TypeDeclId),
    ImportedScope(ScopeId),
}

#[derive(Debug, Clone, Copy)]
pub struct Import {
    pub scope: ScopeId,
    pub qualified: bool,
    pub reexport: bool,
}

#[derive(Debug, Default)]
pub struct ScopeData {
    pub parent: Option<ScopeId>,
    pub imports: Vec<Import>,
    pub prefix: FxHashMap<Symbol, PrefixDef>,
    pub infix: FxHashMap<Symbol, FunctionId>,
    /// The nearest enclosing function this scope is the body (or a nested
    /// block) of, if any (spec.md §3.3: "Scope owns ... an optional
    /// function-owner back-reference").
    pub owner_function: Option<FunctionId>,
}

/// Outcome of defining a name that collides with an existing prefix
/// definition in the *same* scope (spec.md §4.2: overload sets are created
/// lazily on the second definition).
#[derive(Debug)]
pub enum DefineOutcome {
    Fresh,
    /// The scope already held a single function under this name; the caller
    /// must promote it to an overload set (done in `driver.rs`, which alone
    /// has access to the `Ast` arenas needed to build the `OverloadSetData`).
    NeedsOverloadPromotion { existing: FunctionId, incoming: FunctionId },
    /// Two non-function definitions collided — a hard redefinition error.
    Conflict,
}

pub struct ScopeTree {
    pub scopes: Arena<ScopeData>,
}

impl ScopeTree {
    pub fn new() -> Self {
        ScopeTree { scopes: Arena::new() }
    }

    pub fn alloc(&mut self, parent: Option<ScopeId>) -> ScopeId {
        self.scopes.alloc(ScopeData { parent, ..ScopeData::default() })
    }

    pub fn alloc_function_body(&mut self, parent: Option<ScopeId>, owner: FunctionId) -> ScopeId {
        self.scopes.alloc(ScopeData {
            parent,
            owner_function: Some(owner),
            ..ScopeData::default()
        })
    }

    /// Attempts to insert `name -> def` into `scope`. Overload-set promotion
    /// itself is left to the caller (see [`DefineOutcome`]).
    pub fn try_define(&mut self, scope: ScopeId, name: Symbol, def: PrefixDef) -> DefineOutcome {
        match self.scopes[scope].prefix.get(&name).copied() {
            None => {
                self.scopes[scope].prefix.insert(name, def);
                DefineOutcome::Fresh
            }
            Some(PrefixDef::Function(existing)) => match def {
                PrefixDef::Function(incoming) => {
                    DefineOutcome::NeedsOverloadPromotion { existing, incoming }
                }
                _ => DefineOutcome::Conflict,
            },
            Some(PrefixDef::Overloadset(_)) => DefineOutcome::Fresh, // caller appends to the set
            Some(_) => DefineOutcome::Conflict,
        }
    }

    pub fn define_infix(&mut self, scope: ScopeId, name: Symbol, func: FunctionId) {
        self.scopes[scope].infix.insert(name, func);
    }

    pub fn import(&mut self, scope: ScopeId, other: ScopeId, qualified: bool, reexport: bool) {
        self.scopes[scope].imports.push(Import { scope: other, qualified, reexport });
    }

    /// spec.md §4.2: "searches self then parent then imports"; self wins
    /// ties among imports.
    pub fn lookup_prefix(&self, scope: ScopeId, name: Symbol) -> Vec<(ScopeId, PrefixDef)> {
        let mut results = Vec::new();
        self.lookup_prefix_into(scope, name, &mut results, &mut Vec::new());
        results
    }

    fn lookup_prefix_into(
        &self,
        scope: ScopeId,
        name: Symbol,
        results: &mut Vec<(ScopeId, PrefixDef)>,
        visited: &mut Vec<ScopeId>,
    ) {
        if visited.contains(&scope) {
            return;
        }
        visited.push(scope);
        let data = &self.scopes[scope];
        if let Some(def) = data.prefix.get(&name) {
            results.push((scope, *def));
            return; // self wins outright, spec.md §4.2
        }
        if let Some(parent) = data.parent {
            self.lookup_prefix_into(parent, name, results, visited);
            if !results.is_empty() {
                return;
            }
        }
        for import in &data.imports {
            if let Some(def) = self.scopes[import.scope].prefix.get(&name) {
                results.push((import.scope, *def));
            }
        }
    }

    pub fn lookup_infix(&self, scope: ScopeId, name: Symbol) -> Option<FunctionId> {
        let data = &self.scopes[scope];
        if let Some(f) = data.infix.get(&name) {
            return Some(*f);
        }
        if let Some(parent) = data.parent {
            if let Some(f) = self.lookup_infix(parent, name) {
                return Some(f);
            }
        }
        for import in &data.imports {
            if let Some(f) = self.scopes[import.scope].infix.get(&name) {
                return Some(*f);
            }
        }
        None
    }

    pub fn function_owner(&self, scope: ScopeId) -> Option<FunctionId> {
        let data = &self.scopes[scope];
        if let Some(f) = data.owner_function {
            return Some(f);
        }
        data.parent.and_then(|p| self.function_owner(p))
    }

    /// Is `defined_in` reachable from `usage` through the parent chain or
    /// import edges? Used by the specializer to decide whether a cached
    /// specialization is visible from a new usage site (spec.md §4.5 step 2).
    pub fn is_visible_from(&self, defined_in: ScopeId, usage: ScopeId) -> bool {
        if defined_in == usage {
            return true;
        }
        let mut stack = vec![usage];
        let mut visited = Vec::new();
        while let Some(s) = stack.pop() {
            if visited.contains(&s) {
                continue;
            }
            visited.push(s);
            if s == defined_in {
                return true;
            }
            let data = &self.scopes[s];
            if let Some(p) = data.parent {
                stack.push(p);
            }
            for import in &data.imports {
                stack.push(import.scope);
            }
        }
        false
    }
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_scope_wins_over_import() {
        let mut tree = ScopeTree::new();
        let mut interner = crate::intern::Interner::new();
        let foo = interner.intern("foo");

        let imported = tree.alloc(None);
        let v1 = VariableId::from_raw(0u32.into());
        tree.try_define(imported, foo, PrefixDef::Variable(v1));

        let root = tree.alloc(None);
        tree.import(root, imported, false, false);
        let v2 = VariableId::from_raw(1u32.into());
        tree.try_define(root, foo, PrefixDef::Variable(v2));

        let found = tree.lookup_prefix(root, foo);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1, PrefixDef::Variable(v2));
    }

    #[test]
    fn second_function_definition_requests_promotion() {
        let mut tree = ScopeTree::new();
        let mut interner = crate::intern::Interner::new();
        let add = interner.intern("add");
        let root = tree.alloc(None);
        let f1 = FunctionId::from_raw(0u32.into());
        let f2 = FunctionId::from_raw(1u32.into());
        assert!(matches!(tree.try_define(root, add, PrefixDef::Function(f1)), DefineOutcome::Fresh));
        match tree.try_define(root, add, PrefixDef::Function(f2)) {
            DefineOutcome::NeedsOverloadPromotion { existing, incoming } => {
                assert_eq!(existing, f1);
                assert_eq!(incoming, f2);
            }
            other => panic!("expected promotion request, got {:?}", other),
        }
    }
}
