//! The Overload Resolver (spec.md §4.4, component C5).
//!
//! Grounded on `hir_ty::infer::expr`'s method/call resolution plus
//! `hir_def::nameres::collector`'s import-candidate collection: candidates
//! come from the current scope chain and from imported scopes, each is
//! scored independently, and only the maximum-weight set survives.

use rustc_hash::FxHashMap;

use crate::ast::{FunctionFlags, FunctionId, NodeId, NodeKind, TypeSlot};
use crate::intern::Symbol;
use crate::pattern;
use crate::scope::{PrefixDef, ScopeId};
use crate::types::{TypeId, Weight, WEIGHT_CONSTRAINED_WILDCARD, WEIGHT_WILDCARD};
use crate::Session;

#[derive(Debug, Clone)]
pub struct CandidateMatch {
    pub function: FunctionId,
    pub total_weight: u32,
    /// Pattern bindings gathered while matching `_`/constraint/generator
    /// parameters (feeds the specializer, spec.md §4.5 step 1).
    pub pattern_bindings: FxHashMap<Symbol, TypeId>,
    /// Concrete type values bound to expandable (`Type`-typed) parameters.
    pub expanded_args: Vec<(Symbol, TypeId)>,
    /// For each parameter, the (possibly coerced) argument expression that
    /// will be passed, in declaration order.
    pub arg_exprs: Vec<NodeId>,
}

#[derive(Debug)]
pub enum OverloadError {
    NoMatch,
    Ambiguous(Vec<FunctionId>),
}

/// Splits a (resolved) argument expression into its ordered sub-expressions
/// (spec.md §4.4 step 2: "a single expression is a one-element list; `unit`
/// is empty").
pub(crate) fn split_argument(session: &Session, arg: NodeId) -> Vec<(NodeId, Option<Symbol>)> {
    match &session.ast.nodes[arg].kind {
        NodeKind::Unit => Vec::new(),
        NodeKind::Tuple(children) => children
            .iter()
            .map(|&c| (c, session.ast.nodes[c].label))
            .collect(),
        _ => vec![(arg, session.ast.nodes[arg].label)],
    }
}

fn is_literal(session: &Session, expr: NodeId) -> bool {
    matches!(
        session.ast.nodes[expr].kind,
        NodeKind::IntLiteral(_)
            | NodeKind::FloatLiteral(_)
            | NodeKind::CharLiteral(_)
            | NodeKind::StringLiteral(_)
            | NodeKind::BoolLiteral(_)
    )
}

/// Attempts to match `function`'s parameter list against the already-split
/// argument slots. Returns `None` on any outright rejection.
fn match_candidate(
    session: &mut Session,
    function: FunctionId,
    slots: &[(NodeId, Option<Symbol>)],
) -> Option<CandidateMatch> {
    let arguments = session.ast.functions[function].arguments.clone();
    let n_params = arguments.len();

    let slots: Vec<(NodeId, Option<Symbol>)> = if slots.len() > n_params {
        // Overflow must be absorbed by a variadic last parameter or a
        // macro-style `NodePointer` parameter (spec.md §4.4 step 2).
        let last = *arguments.last()?;
        let last_data = session.ast.arguments[last].clone();
        let is_macro_style = matches!(
            last_data.ty,
            TypeSlot::Resolved(t) if matches!(session.types.kind(t), crate::types::TypeKind::Node(_))
        );
        if is_macro_style || !matches!(last_data.ty, TypeSlot::Pattern(_)) {
            return None;
        }
        // The tail beyond the last named parameter collapses into one
        // anonymous-record argument matched against the last parameter's
        // pattern (variadic absorption).
        let mut head: Vec<(NodeId, Option<Symbol>)> = slots[..n_params - 1].to_vec();
        let tail: Vec<NodeId> = slots[n_params - 1..].iter().map(|(e, _)| *e).collect();
        let mut fields = Vec::with_capacity(tail.len());
        for &child in &tail {
            let ty = session.ast.nodes[child].cached_type?;
            fields.push(crate::types::RecordField { name: None, ty, is_extending: false });
        }
        let tail_ty = session.types.get_anonymous_record(fields, false);
        let tail_tuple = session.ast.alloc_resolved(
            Default::default(),
            NodeKind::Tuple(tail),
            tail_ty,
        );
        head.push((tail_tuple, None));
        head
    } else {
        slots.to_vec()
    };

    let mut bindings: FxHashMap<Symbol, TypeId> = FxHashMap::default();
    let mut expanded: Vec<(Symbol, TypeId)> = Vec::new();
    let mut filled: Vec<Option<(NodeId, Weight)>> = vec![None; n_params];
    let mut last_non_labeled: usize = 0;

    // Positional / labeled assignment (spec.md §4.4 step 2, "labeled
    // expressions re-anchor ... unlabeled expressions fill the next
    // positional slot").
    let mut cursor = 0usize;
    for (expr, label) in &slots {
        let target_index = if let Some(label) = label {
            let name = *label;
            let found = (0..n_params)
                .skip(last_non_labeled)
                .chain(0..last_non_labeled)
                .find(|&i| session.ast.arguments[arguments[i]].name == name)?;
            found
        } else {
            let idx = cursor;
            cursor += 1;
            idx
        };
        if target_index >= n_params || filled[target_index].is_some() {
            // Overflow beyond declared parameters without a variadic tail is
            // handled in a second pass below; skip here.
            continue;
        }
        last_non_labeled = target_index.max(last_non_labeled);
        filled[target_index] = Some((*expr, Weight(0)));
    }

    // Two passes over parameters: independents first, dependents (whose
    // pattern references a name not yet bound) deferred to the second pass
    // (spec.md §4.4 step 2, "dependent parameters ... are deferred").
    let mut deferred: Vec<usize> = Vec::new();
    for (i, &param) in arguments.iter().enumerate() {
        let param_data = session.ast.arguments[param].clone();
        let references_unbound = matches!(&param_data.ty, TypeSlot::Pattern(node)
            if pattern_references_name_not_yet_bound(session, *node, &bindings));
        if references_unbound {
            deferred.push(i);
            continue;
        }
        let expr = filled[i].map(|(e, _)| e);
        match score_parameter(session, param, expr, &mut bindings, &mut expanded) {
            Some(weight) => {
                if let Some(e) = expr {
                    filled[i] = Some((e, weight));
                }
            }
            None => return None,
        }
    }
    for i in deferred {
        let param = arguments[i];
        let expr = filled[i].map(|(e, _)| e);
        match score_parameter(session, param, expr, &mut bindings, &mut expanded) {
            Some(weight) => {
                if let Some(e) = expr {
                    filled[i] = Some((e, weight));
                }
            }
            None => return None,
        }
    }

    // Every unfilled parameter must have a default (spec.md §4.4 step 2).
    let mut arg_exprs = Vec::with_capacity(n_params);
    let mut total_weight = 0u32;
    for (i, &param) in arguments.iter().enumerate() {
        match filled[i] {
            Some((expr, weight)) => {
                arg_exprs.push(expr);
                total_weight += weight.0;
            }
            None => {
                let default = session.ast.arguments[param].default_value?;
                arg_exprs.push(default);
            }
        }
    }

    Some(CandidateMatch {
        function,
        total_weight,
        pattern_bindings: bindings,
        expanded_args: expanded,
        arg_exprs,
    })
}

fn pattern_references_name_not_yet_bound(
    session: &Session,
    node: NodeId,
    bound: &FxHashMap<Symbol, TypeId>,
) -> bool {
    if let NodeKind::UnresolvedSymbol { name, .. } = &session.ast.nodes[node].kind {
        return !bound.contains_key(name) && session.ast.nodes[node].label.is_none();
    }
    false
}

/// Scores (and records bindings for) a single parameter slot. Returns the
/// weight the argument earned, or `None` to reject the whole candidate. A
/// missing `expr` is only acceptable when the parameter has a default.
fn score_parameter(
    session: &mut Session,
    param: crate::ast::ArgumentId,
    expr: Option<NodeId>,
    bindings: &mut FxHashMap<Symbol, TypeId>,
    expanded: &mut Vec<(Symbol, TypeId)>,
) -> Option<Weight> {
    let param_data = session.ast.arguments[param].clone();
    let expr = match expr {
        Some(e) => e,
        None => {
            return if param_data.default_value.is_some() { Some(Weight(0)) } else { None }
        }
    };

    match param_data.ty {
        TypeSlot::Pattern(pattern_node) => {
            let raw_ty = session.ast.nodes[expr].cached_type?;
            let literal_kind = session.ast.nodes[expr].kind.clone();
            let arg_ty = pattern::default_literal_type(&mut session.types, &literal_kind)
                .unwrap_or(raw_ty);
            let is_constrained =
                matches!(session.ast.nodes[pattern_node].kind, NodeKind::FunctionRef(_));
            if !pattern::match_pattern(session, pattern_node, arg_ty, bindings) {
                return None;
            }
            Some(if is_constrained { WEIGHT_CONSTRAINED_WILDCARD } else { WEIGHT_WILDCARD })
        }
        TypeSlot::Resolved(dst) => {
            let arg_ty = session.ast.nodes[expr].cached_type?;
            let literal = is_literal(session, expr);
            let weight = session.types.can_assign_from(dst, arg_ty, literal)?;
            if let crate::types::TypeKind::Type = session.types.kind(dst) {
                if let NodeKind::TypeRef(value) = session.ast.nodes[expr].kind {
                    expanded.push((param_data.name, value));
                }
            }
            Some(weight)
        }
        TypeSlot::Unresolved => None,
    }
}

/// Collects every candidate function visible for `symbol` at `scope`
/// (spec.md §4.4 step 1): the nearest enclosing scope that defines it, or
/// every imported scope that does (each requiring public visibility, which
/// this crate treats uniformly since there is no module-private/pub split
/// named in spec.md).
fn collect_candidates(session: &Session, scope: ScopeId, symbol: Symbol) -> Vec<FunctionId> {
    let mut out = Vec::new();
    for (_, def) in session.scope_tree.lookup_prefix(scope, symbol) {
        match def {
            PrefixDef::Function(f) => out.push(f),
            PrefixDef::Overloadset(set) => {
                out.extend(session.ast.overload_sets[set].functions.iter().copied())
            }
            _ => {}
        }
    }
    out
}

/// spec.md §4.2: "among sibling imports, ambiguity between 'type generator'
/// and 'normal function' overloads is a hard error" — checked independent of
/// (and prior to) ordinary weighted scoring, since a generator/plain clash
/// must be rejected even when one of the two would otherwise win outright.
/// Only fires when `symbol` isn't already settled by `self`/`parent` (those
/// always win outright over imports, spec.md §4.2), and only across two
/// *distinct* imported scopes — two generator overloads (or two plain ones)
/// imported from different scopes are ordinary overloading, not this.
fn type_generator_conflict(session: &Session, scope: ScopeId, symbol: Symbol) -> bool {
    let data = &session.scope_tree.scopes[scope];
    if data.prefix.contains_key(&symbol) {
        return false;
    }
    if let Some(parent) = data.parent {
        if !session.scope_tree.lookup_prefix(parent, symbol).is_empty() {
            return false;
        }
    }
    let mut saw_generator = false;
    let mut saw_plain = false;
    for import in &data.imports {
        if let Some(PrefixDef::Function(f)) = session.scope_tree.scopes[import.scope].prefix.get(&symbol) {
            if session.ast.functions[*f].flags.contains(FunctionFlags::TYPE_GENERATOR) {
                saw_generator = true;
            } else {
                saw_plain = true;
            }
        }
    }
    saw_generator && saw_plain
}

/// Entry point (spec.md §4.4): pick the best-weighted candidate for `symbol`
/// called with `arg` in `scope`.
pub fn resolve_call(
    session: &mut Session,
    scope: ScopeId,
    symbol: Symbol,
    arg: NodeId,
) -> Result<CandidateMatch, OverloadError> {
    if type_generator_conflict(session, scope, symbol) {
        return Err(OverloadError::Ambiguous(collect_candidates(session, scope, symbol)));
    }
    let candidates = collect_candidates(session, scope, symbol);
    let slots = split_argument(session, arg);

    let mut accepted: Vec<CandidateMatch> = Vec::new();
    for function in candidates {
        if let Some(m) = match_candidate(session, function, &slots) {
            accepted.push(m);
        } else {
            log::debug!("overload candidate {:?} rejected for {:?}", function, symbol);
        }
    }

    if accepted.is_empty() {
        return Err(OverloadError::NoMatch);
    }

    let max_weight = accepted.iter().map(|m| m.total_weight).max().unwrap();
    let mut winners: Vec<CandidateMatch> =
        accepted.into_iter().filter(|m| m.total_weight == max_weight).collect();

    if winners.len() == 1 {
        Ok(winners.pop().unwrap())
    } else {
        cov_mark::hit!(overload_resolution_ambiguous);
        Err(OverloadError::Ambiguous(winners.into_iter().map(|m| m.function).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_unit_argument_is_empty() {
        let mut session = Session::new();
        let arg = session.ast.alloc_resolved(Default::default(), NodeKind::Unit, session.types.void);
        assert!(split_argument(&session, arg).is_empty());
    }

    #[test]
    fn split_single_expression_is_one_slot() {
        let mut session = Session::new();
        let i32_ = session.types.get_integer_type(32, true);
        let lit = session.ast.alloc_resolved(Default::default(), NodeKind::IntLiteral(1), i32_);
        let slots = split_argument(&session, lit);
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].0, lit);
    }
}
