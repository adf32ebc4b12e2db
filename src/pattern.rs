//! The Pattern Matcher (spec.md §4.3, component C4).
//!
//! A type pattern is just an ordinary [`NodeId`] subtree built by the parser
//! in type position; we classify it here rather than parsing a separate
//! pattern grammar, mirroring how `hir_ty::utils::generics` walks a `TypeRef`
//! tree looking for the shapes it understands instead of having its own
//! pattern AST.

use rustc_hash::FxHashMap;

use crate::ast::{Ast, NodeId, NodeKind};
use crate::intern::Symbol;
use crate::types::{TypeId, TypeKind, TypeRegistry};
use crate::Session;

/// Which structural generator a `Generator(P)` pattern segment refers to
/// (spec.md §3.1's generator list).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorKind {
    Pointer,
    BoundedPointer,
    BoundedConstantPointer,
    StaticArray,
    LinearSequence,
    Function,
}

#[derive(Debug, Default)]
pub struct PatternCheck {
    pub introduced: Vec<Symbol>,
    pub is_pattern: bool,
    /// Labels that `check_into` saw introduced more than once within the same
    /// pattern (spec.md §7's `PatternRedefinition`: two `_`/constraint
    /// segments in one pattern both claiming the same name).
    pub duplicates: Vec<Symbol>,
}

/// Phase 1: does `node` contain any pattern-only constructs (`_`, a
/// constraint reference, a generator call over a pattern)? Collects the
/// names any successful match would introduce, without attempting to bind
/// them to a concrete type yet.
pub fn check(ast: &Ast, node: NodeId, bound_so_far: &[Symbol]) -> PatternCheck {
    let mut out = PatternCheck::default();
    check_into(ast, node, bound_so_far, &mut out);
    out
}

fn check_into(ast: &Ast, node: NodeId, bound_so_far: &[Symbol], out: &mut PatternCheck) {
    match &ast.nodes[node].kind {
        NodeKind::Wildcard => {
            out.is_pattern = true;
            if let Some(label) = ast.nodes[node].label {
                introduce(out, label);
            }
        }
        NodeKind::UnresolvedSymbol { name, .. } if bound_so_far.contains(name) => {
            out.is_pattern = true;
        }
        NodeKind::FunctionRef(_) => {
            out.is_pattern = true;
            if let Some(label) = ast.nodes[node].label {
                introduce(out, label);
            }
        }
        NodeKind::Call { callee, arg } => {
            // A generator call like `Pointer(P)`: the callee names a
            // generator, the argument is itself a (possibly pattern) subtree.
            out.is_pattern = true;
            match &ast.nodes[*arg].kind {
                NodeKind::Tuple(children) => {
                    for child in children {
                        check_into(ast, *child, bound_so_far, out);
                    }
                }
                _ => check_into(ast, *arg, bound_so_far, out),
            }
            let _ = callee;
        }
        _ => {}
    }
}

fn introduce(out: &mut PatternCheck, label: Symbol) {
    if out.introduced.contains(&label) {
        out.duplicates.push(label);
    } else {
        out.introduced.push(label);
    }
}

/// Phase 2: match `node` (a pattern subtree) against the concrete `candidate`
/// type, recording introduced bindings. Returns `false` on a shape or
/// constraint mismatch.
pub fn match_pattern(
    session: &mut Session,
    node: NodeId,
    candidate: TypeId,
    bindings: &mut FxHashMap<Symbol, TypeId>,
) -> bool {
    let kind = session.ast.nodes[node].kind.clone();
    match kind {
        NodeKind::Wildcard => {
            if let Some(label) = session.ast.nodes[node].label {
                bindings.insert(label, candidate);
            }
            true
        }
        NodeKind::UnresolvedSymbol { name, .. } if bindings.contains_key(&name) => {
            bindings[&name] == candidate
        }
        NodeKind::TypeRef(expected) => expected == candidate,
        NodeKind::FunctionRef(function) => {
            let label = session.ast.nodes[node].label;
            let location = session.ast.nodes[node].location;
            let ok = crate::ctfe::call_constraint(session, function, candidate, location);
            if ok {
                if let Some(label) = label {
                    bindings.insert(label, candidate);
                }
            }
            ok
        }
        NodeKind::Call { callee, arg } => {
            let generator = match resolve_generator_callee(session, callee) {
                Some(g) => g,
                None => return false,
            };
            match_generator(session, generator, arg, candidate, bindings)
        }
        _ => {
            // A plain, already-resolved type expression used in pattern
            // position: matches only by identity.
            match session.ast.nodes[node].cached_type {
                Some(t) => t == candidate,
                None => false,
            }
        }
    }
}

fn resolve_generator_callee(session: &Session, callee: NodeId) -> Option<GeneratorKind> {
    if let NodeKind::UnresolvedSymbol { name, .. } = &session.ast.nodes[callee].kind {
        let text = session.interner.resolve(*name);
        return generator_by_name(text);
    }
    None
}

pub fn generator_by_name(text: &str) -> Option<GeneratorKind> {
    Some(match text {
        "Pointer" => GeneratorKind::Pointer,
        "BoundedPointer" => GeneratorKind::BoundedPointer,
        "BoundedConstantPointer" => GeneratorKind::BoundedConstantPointer,
        "Array" | "StaticArray" => GeneratorKind::StaticArray,
        "LinearSequence" => GeneratorKind::LinearSequence,
        "Function" => GeneratorKind::Function,
        _ => return None,
    })
}

fn match_generator(
    session: &mut Session,
    generator: GeneratorKind,
    pattern_arg: NodeId,
    candidate: TypeId,
    bindings: &mut FxHashMap<Symbol, TypeId>,
) -> bool {
    let inner = match (generator, session.types.kind(candidate).clone()) {
        (GeneratorKind::Pointer, TypeKind::Pointer(inner)) => inner,
        (GeneratorKind::BoundedPointer, TypeKind::BoundedPointer(inner)) => inner,
        (GeneratorKind::BoundedConstantPointer, TypeKind::BoundedConstantPointer(inner, _)) => inner,
        (GeneratorKind::StaticArray, TypeKind::StaticArray(inner, _)) => inner,
        (GeneratorKind::LinearSequence, TypeKind::LinearSequence(inner)) => inner,
        (GeneratorKind::Function, TypeKind::Function { ret, .. }) => ret,
        _ => return false,
    };
    match_pattern(session, pattern_arg, inner, bindings)
}

/// Produces the default concrete type for an unbound pattern wildcard by
/// examining the argument expression actually passed (e.g. an integer
/// literal defaults to the registry's default signed-32 integer). This is
/// how scenario S2 in spec.md §8 deduces `T = int32` from the literal `3`.
pub fn default_literal_type(types: &mut TypeRegistry, literal_kind: &NodeKind) -> Option<TypeId> {
    match literal_kind {
        NodeKind::IntLiteral(_) => Some(types.get_integer_type(32, true)),
        NodeKind::FloatLiteral(_) => Some(types.get_float_type(64)),
        NodeKind::CharLiteral(_) => Some(types.get_char_type(32)),
        NodeKind::BoolLiteral(_) => Some(types.bool_type),
        _ => None,
    }
}

/// Adds the pattern's introduced bindings into `target_scope` as immutable
/// variables whose constant substitute is the bound type (spec.md §4.3,
/// last paragraph).
pub fn install_bindings(
    session: &mut Session,
    target_scope: crate::scope::ScopeId,
    bindings: &FxHashMap<Symbol, TypeId>,
) {
    for (&name, &ty) in bindings {
        let var = session.ast.variables.alloc(crate::ast::VariableData {
            name,
            owner_scope: target_scope,
            mutable: false,
            ty: crate::ast::TypeSlot::Resolved(session.types.type_type),
            constant_substitute: Some(ty),
            initializer: None,
            resolved: true,
            location: crate::location::Location::unknown(),
        });
        session
            .scope_tree
            .try_define(target_scope, name, crate::scope::PrefixDef::Variable(var));
    }
}
