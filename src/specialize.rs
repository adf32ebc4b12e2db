//! The Specializer (spec.md §4.5, component C6).
//!
//! Grounded on `hir_ty::infer`'s monomorphic instantiation plus
//! `hir_def::nameres::collector`'s per-module scope construction: a
//! specialization is built by deep-copying the generic function's body into
//! fresh arena slots and wrapping it in a new scope that imports both the
//! declaration site and the usage site, mirroring how the teacher re-lowers
//! a generic item's body under a substituted `Substitution` rather than
//! mutating the original.

use rustc_hash::FxHashMap;

use crate::ast::{
    ArgumentData, ArgumentId, FunctionData, FunctionId, NodeId, SpecializationEntry,
    SpecializationKey, TypeSlot, VariableId,
};
use crate::intern::Symbol;
use crate::location::Location;
use crate::scope::ScopeId;
use crate::types::TypeId;
use crate::Session;

/// Builds the cache key from an already-computed overload match (spec.md
/// §4.5 step 1): "the key is the ordered list of pattern bindings plus the
/// ordered list of expanded-argument type values".
pub fn key_from_match(
    pattern_bindings: &FxHashMap<Symbol, TypeId>,
    expanded_args: &[(Symbol, TypeId)],
) -> SpecializationKey {
    let mut bindings: Vec<(Symbol, TypeId)> = pattern_bindings.iter().map(|(&k, &v)| (k, v)).collect();
    bindings.sort_by_key(|(name, _)| *name);
    let mut expanded: Vec<(Symbol, TypeId)> = expanded_args.to_vec();
    expanded.sort_by_key(|(name, _)| *name);
    SpecializationKey { pattern_bindings: bindings, expanded_args: expanded }
}

/// Looks up an existing specialization of `generic` for `key`, visible from
/// `usage_scope` (spec.md §4.5 step 2: a cached specialization is reused only
/// if its usage scope is visible from the new call site — otherwise two
/// unrelated modules could observe each other's private specializations).
pub fn find_cached(
    session: &Session,
    generic: FunctionId,
    key: &SpecializationKey,
    usage_scope: ScopeId,
) -> Option<FunctionId> {
    let data = &session.ast.functions[generic];
    let hit = data.specializations.iter().find_map(|entry: &SpecializationEntry| {
        if &entry.key == key && session.scope_tree.is_visible_from(entry.usage_scope, usage_scope) {
            Some(entry.specialized)
        } else {
            None
        }
    });
    if hit.is_some() {
        cov_mark::hit!(specialization_cache_hit);
    }
    hit
}

/// Produces (and caches) a specialization of `generic` under `key`, used
/// from `usage_scope` (spec.md §4.5 steps 3-5).
///
/// 1. Deep-copies the function's arguments and body into fresh arena slots.
/// 2. Removes expandable (`Type`-typed) parameters from the specialized
///    signature, since their value is now baked in as a constant binding.
/// 3. Rewrites every pattern-typed parameter to its deduced concrete type.
/// 4. Wraps the copy in a new scope importing both the original declaration
///    scope (for recursive self-reference and sibling overloads) and the
///    usage scope (for names the pattern bindings depend on).
/// 5. Caches the result against `key` before returning it, so a second call
///    with the same bindings from a visible scope is a cache hit.
pub fn specialize(
    session: &mut Session,
    generic: FunctionId,
    key: SpecializationKey,
    usage_scope: ScopeId,
) -> FunctionId {
    if let Some(existing) = find_cached(session, generic, &key, usage_scope) {
        return existing;
    }

    let generic_data = session.ast.functions[generic].clone();

    let wrapper_scope = session.scope_tree.alloc(Some(generic_data.owner_scope));
    session.scope_tree.import(wrapper_scope, generic_data.owner_scope, true, false);
    session.scope_tree.import(wrapper_scope, usage_scope, true, false);

    let bindings_map: FxHashMap<Symbol, TypeId> = key.pattern_bindings.iter().copied().collect();
    crate::pattern::install_bindings(session, wrapper_scope, &bindings_map);

    let expanded_map: FxHashMap<Symbol, TypeId> = key.expanded_args.iter().copied().collect();

    let body_scope = session.scope_tree.alloc(Some(wrapper_scope));

    let mut new_arguments = Vec::with_capacity(generic_data.arguments.len());
    let mut var_rename: FxHashMap<VariableId, VariableId> = FxHashMap::default();
    for &arg in &generic_data.arguments {
        let arg_data = session.ast.arguments[arg].clone();
        if is_expandable(session, &arg_data) {
            // Expandable `Type`-typed parameters vanish from the specialized
            // signature: their value lives as a binding in `wrapper_scope`
            // instead of as a call-time argument (spec.md §4.5 step 3).
            continue;
        }
        let new_ty = deduce_argument_type(session, &arg_data, &bindings_map, &expanded_map);
        let copied_default = arg_data.default_value.map(|d| copy_subtree(session, d));
        new_arguments.push(session.ast.arguments.alloc(ArgumentData {
            name: arg_data.name,
            ty: new_ty,
            default_value: copied_default,
            location: arg_data.location,
            resolved: matches!(new_ty, TypeSlot::Resolved(_)),
        }));

        // The body refers to an argument by name through a mirror `Variable`
        // the declaring scope registered alongside the argument itself
        // (see `scope::PrefixDef::Variable`), not through the `ArgumentId`
        // directly. That mirror has to be re-minted per specialization with
        // the deduced concrete type, the same way a body-local `let` does in
        // `copy_subtree_rec` — otherwise every specialization's body would
        // keep referring to the generic's single unresolved (pattern-typed)
        // mirror variable and never resolve.
        if let Some((_, crate::scope::PrefixDef::Variable(old_var))) = session
            .scope_tree
            .lookup_prefix(generic_data.body_scope, arg_data.name)
            .into_iter()
            .find(|(scope, _)| *scope == generic_data.body_scope)
        {
            let old_var_data = session.ast.variables[old_var].clone();
            let new_var = session.ast.variables.alloc(crate::ast::VariableData {
                name: old_var_data.name,
                owner_scope: body_scope,
                mutable: old_var_data.mutable,
                ty: new_ty,
                constant_substitute: old_var_data.constant_substitute,
                initializer: None,
                resolved: matches!(new_ty, TypeSlot::Resolved(_)),
                location: old_var_data.location,
            });
            session.scope_tree.try_define(body_scope, arg_data.name, crate::scope::PrefixDef::Variable(new_var));
            var_rename.insert(old_var, new_var);
        }
    }

    let new_body = generic_data.body.map(|b| copy_subtree_with_renames(session, b, var_rename));

    let mut flags = generic_data.flags;
    flags.remove(crate::ast::FunctionFlags::HAS_EXPANDABLE_ARGUMENTS);
    flags.remove(crate::ast::FunctionFlags::HAS_PATTERN_ARGUMENTS);

    let specialized = session.ast.functions.alloc(FunctionData {
        name: generic_data.name,
        owner_scope: wrapper_scope,
        arguments: new_arguments,
        return_type: generic_data.return_type,
        body_scope,
        body: new_body,
        flags,
        intrinsic: generic_data.intrinsic,
        specializations: Vec::new(),
        specialized_from: Some(generic),
        resolved: false,
        location: generic_data.location,
    });

    session.scope_tree.scopes[body_scope].owner_function = Some(specialized);

    session.ast.functions[generic].specializations.push(SpecializationEntry {
        key,
        usage_scope,
        specialized,
    });

    specialized
}

fn is_expandable(session: &Session, arg: &ArgumentData) -> bool {
    matches!(arg.ty, TypeSlot::Resolved(t) if t == session.types.type_type)
}

/// Rewrites a pattern-typed parameter to the concrete type its pattern bound
/// (spec.md §4.5 step 3: "each pattern parameter is rewritten to the
/// concrete type the match deduced for it").
fn deduce_argument_type(
    session: &Session,
    arg: &ArgumentData,
    bindings: &FxHashMap<Symbol, TypeId>,
    expanded: &FxHashMap<Symbol, TypeId>,
) -> TypeSlot {
    match arg.ty {
        TypeSlot::Pattern(pattern_node) => {
            if let crate::ast::NodeKind::Wildcard = session.ast.nodes[pattern_node].kind {
                if let Some(label) = session.ast.nodes[pattern_node].label {
                    if let Some(&ty) = bindings.get(&label) {
                        return TypeSlot::Resolved(ty);
                    }
                }
            }
            if let Some(&ty) = expanded.get(&arg.name) {
                return TypeSlot::Resolved(ty);
            }
            arg.ty
        }
        other => other,
    }
}

/// Deep-copies `node` and everything it owns into fresh arena slots,
/// preserving `FunctionRef` targets that point outside the copied subtree
/// (spec.md §4.5 step 3: only the generic function's own body is duplicated,
/// never the things it merely refers to) while giving every `Variable`
/// declared *inside* the subtree a fresh [`VariableId`] — otherwise two
/// specializations of the same generic function would alias the same local
/// variable slot and stomp each other's resolved type.
fn copy_subtree(session: &mut Session, node: NodeId) -> NodeId {
    let mut rename = FxHashMap::default();
    copy_subtree_rec(session, node, &mut rename)
}

/// Like [`copy_subtree`], but seeded with renames already decided by the
/// caller (the argument-mirror variables specialize() re-minted above) so
/// references to them inside the body follow along too.
fn copy_subtree_with_renames(
    session: &mut Session,
    node: NodeId,
    mut rename: FxHashMap<VariableId, VariableId>,
) -> NodeId {
    copy_subtree_rec(session, node, &mut rename)
}

fn copy_subtree_rec(
    session: &mut Session,
    node: NodeId,
    rename: &mut FxHashMap<VariableId, VariableId>,
) -> NodeId {
    use crate::ast::NodeKind::*;
    let data = session.ast.duplicate_node(node);
    let new_kind = match data.kind {
        Variable(var) => {
            let mut var_data = session.ast.variables[var].clone();
            var_data.initializer = var_data.initializer.map(|i| copy_subtree_rec(session, i, rename));
            let new_var = session.ast.variables.alloc(var_data);
            rename.insert(var, new_var);
            Variable(new_var)
        }
        // A reference to a variable declared earlier in this same subtree
        // follows the rename; a reference to one declared outside it (an
        // argument, an enclosing scope's variable) passes through unchanged.
        VariableRef(var) => VariableRef(rename.get(&var).copied().unwrap_or(var)),
        Tuple(children) => {
            Tuple(children.into_iter().map(|c| copy_subtree_rec(session, c, rename)).collect())
        }
        Block { scope, children } => Block {
            scope,
            children: children.into_iter().map(|c| copy_subtree_rec(session, c, rename)).collect(),
        },
        FieldAccess { obj, index } => FieldAccess { obj: copy_subtree_rec(session, obj, rename), index },
        Call { callee, arg } => Call {
            callee: copy_subtree_rec(session, callee, rename),
            arg: copy_subtree_rec(session, arg, rename),
        },
        If { cond, then_branch, else_branch } => If {
            cond: copy_subtree_rec(session, cond, rename),
            then_branch: copy_subtree_rec(session, then_branch, rename),
            else_branch: else_branch.map(|e| copy_subtree_rec(session, e, rename)),
        },
        Loop { body } => Loop { body: copy_subtree_rec(session, body, rename) },
        Return(value) => Return(value.map(|v| copy_subtree_rec(session, v, rename))),
        Match { scrutinee, cases } => Match {
            scrutinee: copy_subtree_rec(session, scrutinee, rename),
            cases: cases
                .into_iter()
                .map(|c| crate::ast::MatchCase {
                    pattern: copy_subtree_rec(session, c.pattern, rename),
                    body: copy_subtree_rec(session, c.body, rename),
                })
                .collect(),
        },
        AccessExpression { obj, name } => {
            AccessExpression { obj: copy_subtree_rec(session, obj, rename), name }
        }
        UnaryOp { kind, operand } => UnaryOp { kind, operand: copy_subtree_rec(session, operand, rename) },
        BinaryOp { kind, lhs, rhs } => BinaryOp {
            kind,
            lhs: copy_subtree_rec(session, lhs, rename),
            rhs: copy_subtree_rec(session, rhs, rename),
        },
        PointerOp { kind, operand } => {
            PointerOp { kind, operand: copy_subtree_rec(session, operand, rename) }
        }
        Assignment { target, value, is_init } => Assignment {
            target: copy_subtree_rec(session, target, rename),
            value: copy_subtree_rec(session, value, rename),
            is_init,
        },
        Cast { expr, ty } => {
            Cast { expr: copy_subtree_rec(session, expr, rename), ty: copy_subtree_rec(session, ty, rename) }
        }
        other => other,
    };
    session.ast.nodes.alloc(crate::ast::NodeData {
        location: data.location,
        flags: crate::ast::NodeFlags::empty(),
        label: data.label,
        cached_type: None,
        kind: new_kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_from_match_sorts_bindings_deterministically() {
        let mut interner = crate::intern::Interner::new();
        let b = interner.intern("b");
        let a = interner.intern("a");
        let mut types = crate::types::TypeRegistry::new();
        let i32_ = types.get_integer_type(32, true);
        let mut bindings = FxHashMap::default();
        bindings.insert(b, i32_);
        bindings.insert(a, i32_);
        let key = key_from_match(&bindings, &[]);
        assert_eq!(key.pattern_bindings.len(), 2);
        assert!(key.pattern_bindings[0].0 < key.pattern_bindings[1].0);
    }

    #[test]
    fn specializing_twice_with_same_key_hits_cache() {
        let mut session = Session::new();
        let i32_ = session.types.get_integer_type(32, true);
        let decl_scope = session.scope_tree.alloc(None);
        let body_scope = session.scope_tree.alloc(Some(decl_scope));
        let generic = session.ast.functions.alloc(FunctionData {
            name: session.interner.intern("identity"),
            owner_scope: decl_scope,
            arguments: Vec::new(),
            return_type: TypeSlot::Resolved(i32_),
            body_scope,
            body: None,
            flags: crate::ast::FunctionFlags::HAS_EXPANDABLE_ARGUMENTS,
            intrinsic: None,
            specializations: Vec::new(),
            specialized_from: None,
            resolved: false,
            location: Location::unknown(),
        });
        session.scope_tree.scopes[body_scope].owner_function = Some(generic);

        let usage_scope = session.scope_tree.alloc(None);
        let t = session.interner.intern("T");
        let key = SpecializationKey { pattern_bindings: Vec::new(), expanded_args: vec![(t, i32_)] };
        let first = specialize(&mut session, generic, key.clone(), usage_scope);
        let second = specialize(&mut session, generic, key, usage_scope);
        assert_eq!(first, second);
    }
}
