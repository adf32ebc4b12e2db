//! The Resolver Driver (spec.md §4.7, §8 property 2, component C8).
//!
//! Grounded on `hir_def::nameres::collector::DefCollector::collect`: a
//! fixpoint loop over a worklist, tracking how many items remain unresolved
//! each pass and stopping once two consecutive passes make no progress
//! (SPEC_FULL.md §2.3) — the teacher's collector loops the same way over
//! `unresolved_imports`/`unexpanded_macros` until neither shrinks.

use crate::ast::{BinaryOpKind, FunctionFlags, NodeId, NodeKind, TypeSlot};
use crate::diagnostics::Diagnostic;
use crate::location::Location;
use crate::overload::OverloadError;
use crate::scope::ScopeId;
use crate::types::TypeId;
use crate::Session;

/// Resolution policy knobs (SPEC_FULL.md §2.3). None of these change
/// semantics; they only bound how much work a pathological input can cause.
#[derive(Debug, Clone, Copy)]
pub struct DriverConfig {
    /// Hard ceiling on fixpoint passes, independent of the zero-progress
    /// termination rule below — a safety net against a driver bug turning
    /// "no progress" into an infinite loop.
    pub max_passes: u32,
    /// Real termination condition: this many consecutive passes resolving
    /// zero additional nodes ends the loop (stuck, not necessarily done).
    pub zero_progress_passes_to_stop: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig { max_passes: 256, zero_progress_passes_to_stop: 2 }
    }
}

pub struct ResolutionReport {
    pub passes_run: u32,
    pub unresolved_count: usize,
}

/// Runs the fixpoint resolver over every node reachable from `roots` in
/// `module_scope` (spec.md §4.7): repeatedly calls [`resolve_node`] over the
/// worklist until two passes in a row make no progress, or `max_passes` is
/// hit. On a stuck-but-nonempty worklist, re-runs one final pass with
/// `log::warn!` tracing so the diagnostics sink gets a location for every
/// surviving unresolved node (spec.md §4.7: "a final verbose pass explains
/// what's still blocked").
pub fn resolve_module(
    session: &mut Session,
    module_scope: ScopeId,
    roots: &[NodeId],
    config: DriverConfig,
) -> ResolutionReport {
    let mut worklist: Vec<NodeId> = roots.to_vec();
    let mut zero_progress_streak = 0;
    let mut passes_run = 0;

    loop {
        passes_run += 1;
        let before = worklist.len();
        let mut still_unresolved = Vec::with_capacity(worklist.len());
        for node in worklist.drain(..) {
            if session.ast.is_resolved(node) {
                continue;
            }
            if resolve_node(session, module_scope, node) {
                log::debug!("resolved node {:?} on pass {}", node, passes_run);
            } else {
                still_unresolved.push(node);
            }
        }
        worklist = still_unresolved;
        let progressed = worklist.len() < before;

        if worklist.is_empty() {
            break;
        }
        if !progressed {
            zero_progress_streak += 1;
        } else {
            zero_progress_streak = 0;
        }
        if zero_progress_streak >= config.zero_progress_passes_to_stop {
            log::warn!(
                "resolution stuck after {} passes, {} node(s) unresolved; running verbose pass",
                passes_run,
                worklist.len()
            );
            for &node in &worklist {
                log::warn!("unresolved: {:?} at {}", node, session.ast.nodes[node].location);
                if let Some(name) = unresolved_name(session, node) {
                    session.diagnostics.push(Diagnostic::UnresolvedSymbol {
                        location: session.ast.nodes[node].location,
                        name,
                    });
                }
            }
            break;
        }
        if passes_run >= config.max_passes {
            log::error!("resolver exceeded max_passes ({}) without converging", config.max_passes);
            break;
        }
    }

    ResolutionReport { passes_run, unresolved_count: worklist.len() }
}

fn unresolved_name(session: &Session, node: NodeId) -> Option<crate::intern::Symbol> {
    match &session.ast.nodes[node].kind {
        NodeKind::UnresolvedSymbol { name, .. } => Some(*name),
        NodeKind::AccessExpression { name, .. } => Some(*name),
        NodeKind::Call { callee, .. } => match &session.ast.nodes[*callee].kind {
            NodeKind::UnresolvedSymbol { name, .. } => Some(*name),
            _ => None,
        },
        _ => None,
    }
}

/// Attempts to resolve a single node in place. Returns `true` iff resolution
/// made progress on *this* node this pass (spec.md §4.7's per-`NodeKind`
/// dispatch table).
pub fn resolve_node(session: &mut Session, scope: ScopeId, node: NodeId) -> bool {
    let kind = session.ast.nodes[node].kind.clone();
    match kind {
        NodeKind::IntLiteral(_) => finish_const(session, node, session.types.literal_int),
        NodeKind::FloatLiteral(_) => finish_const(session, node, session.types.literal_float),
        NodeKind::CharLiteral(_) => finish_const(session, node, session.types.literal_char),
        NodeKind::StringLiteral(_) => finish_const(session, node, session.types.literal_string),
        NodeKind::BoolLiteral(_) => finish_const(session, node, session.types.bool_type),
        NodeKind::Unit => finish_const(session, node, session.types.void),
        NodeKind::TypeRef(_) => finish_const(session, node, session.types.type_type),
        NodeKind::Error => finish(session, node, session.types.error),

        NodeKind::VariableRef(var) => resolve_variable_ref(session, node, var),
        NodeKind::FunctionRef(func) => resolve_function_ref(session, node, func),

        NodeKind::UnresolvedSymbol { name, lookup_scope } => {
            resolve_symbol(session, scope, node, name, lookup_scope.unwrap_or(scope))
        }
        NodeKind::AccessExpression { obj, name } => resolve_access(session, scope, node, obj, name),

        NodeKind::Tuple(children) => resolve_tuple(session, node, &children),
        NodeKind::Block { scope: block_scope, children } => {
            resolve_block(session, node, block_scope, &children)
        }
        NodeKind::FieldAccess { obj, index } => resolve_field_access(session, node, obj, index),
        NodeKind::Call { callee, arg } => resolve_call(session, scope, node, callee, arg),

        NodeKind::If { cond, then_branch, else_branch } => {
            resolve_if(session, node, cond, then_branch, else_branch)
        }
        NodeKind::Loop { body } => resolve_loop(session, node, body),
        NodeKind::Return(value) => resolve_return(session, scope, node, value),
        NodeKind::Match { scrutinee, cases } => resolve_match(session, scope, node, scrutinee, &cases),
        NodeKind::ControlFlow(_) => finish(session, node, session.types.void),

        NodeKind::UnaryOp { operand, .. } => resolve_passthrough_unary(session, node, operand),
        NodeKind::BinaryOp { kind, lhs, rhs } => resolve_binary(session, node, kind, lhs, rhs),
        NodeKind::PointerOp { kind, operand } => resolve_pointer_op(session, node, kind, operand),
        NodeKind::Assignment { target, value, is_init } => {
            resolve_assignment(session, node, target, value, is_init)
        }
        NodeKind::Cast { expr, ty } => resolve_cast(session, node, expr, ty),

        NodeKind::NodeReference(inner) => resolve_node_reference(session, node, inner),

        NodeKind::Variable(var) => resolve_variable_decl(session, node, var),
        NodeKind::Argument(_) => finish(session, node, session.types.void),
        NodeKind::Function(func) => resolve_function_decl(session, node, func),
        NodeKind::Record(rec) => resolve_record_decl(session, node, rec),
        NodeKind::Variant(var) => resolve_variant_decl(session, node, var),
        NodeKind::Trait(_) | NodeKind::TypeDeclaration(_) => finish(session, node, session.types.void),
        NodeKind::PrefixMacro(_) | NodeKind::InfixMacro(_) => finish(session, node, session.types.void),
        NodeKind::Overloadset(_) => finish(session, node, session.types.void),

        NodeKind::Wildcard => false,
    }
}

fn finish(session: &mut Session, node: NodeId, ty: TypeId) -> bool {
    session.ast.nodes[node].cached_type = Some(ty);
    session.ast.mark_resolved(node);
    true
}

/// Like [`finish`], but also flags `node` as a constant expression (spec.md
/// §4.6 step 1): every literal leaf is trivially constant, and composite
/// nodes propagate it from their children (see `resolve_tuple`,
/// `resolve_passthrough_unary`, `resolve_binary`, `resolve_variable_ref`,
/// `resolve_cast`).
fn finish_const(session: &mut Session, node: NodeId, ty: TypeId) -> bool {
    finish(session, node, ty);
    session.ast.mark_constant(node);
    true
}

fn all_resolved(session: &Session, nodes: &[NodeId]) -> bool {
    nodes.iter().all(|&n| session.ast.is_resolved(n))
}

fn resolve_variable_ref(session: &mut Session, node: NodeId, var: crate::ast::VariableId) -> bool {
    let data = session.ast.variables[var].clone();
    if !data.resolved {
        return false;
    }
    let ty = data.constant_substitute.or_else(|| data.ty.resolved());
    let is_const = data.constant_substitute.is_some()
        || (!data.mutable && data.initializer.map_or(false, |i| session.ast.nodes[i].is_constant()));
    match ty {
        Some(t) if is_const => finish_const(session, node, t),
        Some(t) => finish(session, node, t),
        None => false,
    }
}

fn resolve_function_ref(session: &mut Session, node: NodeId, func: crate::ast::FunctionId) -> bool {
    let data = &session.ast.functions[func];
    if !data.resolved {
        return false;
    }
    let arg_ty = data
        .arguments
        .iter()
        .map(|&a| session.ast.arguments[a].ty.resolved())
        .collect::<Option<Vec<_>>>();
    let (Some(arg_ty), Some(ret_ty)) = (arg_ty, data.return_type.resolved()) else {
        return false;
    };
    let arg_tuple = if arg_ty.is_empty() {
        session.types.void
    } else if arg_ty.len() == 1 {
        arg_ty[0]
    } else {
        let fields = arg_ty
            .into_iter()
            .map(|ty| crate::types::RecordField { name: None, ty, is_extending: false })
            .collect();
        session.types.get_anonymous_record(fields, false)
    };
    let fn_ty = session.types.get_function(arg_tuple, ret_ty);
    finish(session, node, fn_ty)
}

/// spec.md §4.7: an unresolved symbol looks itself up in the scope chain;
/// a hit on a variable/function/record/etc. rewrites this node in place to
/// the corresponding reference `NodeKind` (spec.md §3.5's "replace in place"
/// contract) so the next pass resolves it like any other reference.
fn resolve_symbol(
    session: &mut Session,
    _scope: ScopeId,
    node: NodeId,
    name: crate::intern::Symbol,
    lookup_scope: ScopeId,
) -> bool {
    let hits = session.scope_tree.lookup_prefix(lookup_scope, name);
    if hits.is_empty() {
        return false;
    }
    if hits.len() > 1 {
        session.diagnostics.push(Diagnostic::AmbiguousOverload {
            location: session.ast.nodes[node].location,
            name,
            candidates: Vec::new(),
        });
        return false;
    }
    let (_, def) = hits[0];
    let new_kind = match def {
        crate::scope::PrefixDef::Variable(v) => NodeKind::VariableRef(v),
        crate::scope::PrefixDef::Function(f) => NodeKind::FunctionRef(f),
        crate::scope::PrefixDef::Overloadset(_) => {
            // An overload set alone isn't a value; it only resolves at a
            // call site, where `resolve_call` collects candidates directly.
            return false;
        }
        crate::scope::PrefixDef::Record(r) => {
            let ty = session.ast.records[r].self_type;
            match ty {
                Some(t) => NodeKind::TypeRef(t),
                None => return false,
            }
        }
        crate::scope::PrefixDef::Variant(v) => {
            let ty = session.ast.variants[v].self_type;
            match ty {
                Some(t) => NodeKind::TypeRef(t),
                None => return false,
            }
        }
        crate::scope::PrefixDef::Trait(t) => {
            let ty = session.ast.traits[t].self_type;
            match ty {
                Some(t) => NodeKind::TypeRef(t),
                None => return false,
            }
        }
        crate::scope::PrefixDef::TypeDecl(t) => {
            match session.ast.type_decls[t].aliased.resolved() {
                Some(ty) => NodeKind::TypeRef(ty),
                None => return false,
            }
        }
        crate::scope::PrefixDef::ImportedScope(s) => NodeKind::ImportedScopeRef(s),
    };
    session.ast.nodes[node].kind = new_kind;
    resolve_node(session, lookup_scope, node)
}

/// spec.md §4.7: `obj.name` collapses to a `FieldAccess` when `obj`'s type is
/// a record with a field named `name` (or reachable through an extender
/// field); otherwise it desugars to a call `name(obj, ...)` against the
/// scope's prefix definitions (uniform call syntax).
fn resolve_access(
    session: &mut Session,
    scope: ScopeId,
    node: NodeId,
    obj: NodeId,
    name: crate::intern::Symbol,
) -> bool {
    if !session.ast.is_resolved(obj) {
        return false;
    }
    let obj_ty = match session.ast.nodes[obj].cached_type {
        Some(t) => t,
        None => return false,
    };
    if let Some(index) = field_index(session, obj_ty, name) {
        session.ast.nodes[node].kind = NodeKind::FieldAccess { obj, index };
        return resolve_node(session, scope, node);
    }
    // Dot-call desugaring: `obj.f(rest)` already arrives here as `obj.f`
    // applied via an outer `Call`; as a bare access it means `f(obj)`.
    let callee = session.ast.alloc_node(
        session.ast.nodes[node].location,
        NodeKind::UnresolvedSymbol { name, lookup_scope: Some(scope) },
    );
    session.ast.nodes[node].kind = NodeKind::Call { callee, arg: obj };
    resolve_node(session, scope, node)
}

fn field_index(session: &Session, ty: TypeId, name: crate::intern::Symbol) -> Option<usize> {
    match session.types.kind(ty) {
        crate::types::TypeKind::AnonymousAggregate { fields, .. } => {
            fields.iter().position(|f| f.name == Some(name))
        }
        crate::types::TypeKind::Record(rec) => {
            session.ast.records[*rec].fields.iter().position(|f| f.name == Some(name))
        }
        _ => None,
    }
}

/// spec.md §4.7: `()` is the unit value; a single-child tuple collapses to
/// its child (mirrors the Type Registry's anonymous-record collapse); every
/// other tuple resolves only once all children do, and if every child's type
/// is itself `Type`, the tuple *value* denotes an anonymous record type.
fn resolve_tuple(session: &mut Session, node: NodeId, children: &[NodeId]) -> bool {
    if children.is_empty() {
        return finish(session, node, session.types.void);
    }
    if children.len() == 1 {
        let child = children[0];
        if !session.ast.is_resolved(child) {
            return false;
        }
        cov_mark::hit!(single_element_tuple_collapses);
        session.ast.replace_in_place(node, child);
        return true;
    }
    if !all_resolved(session, children) {
        return false;
    }
    let child_types: Vec<TypeId> =
        children.iter().map(|&c| session.ast.nodes[c].cached_type.unwrap()).collect();
    let all_are_type_values = child_types.iter().all(|&t| t == session.types.type_type)
        && children.iter().all(|&c| matches!(session.ast.nodes[c].kind, NodeKind::TypeRef(_)));
    if all_are_type_values {
        let fields = children
            .iter()
            .map(|&c| {
                let ty = match session.ast.nodes[c].kind {
                    NodeKind::TypeRef(t) => t,
                    _ => unreachable!(),
                };
                crate::types::RecordField { name: session.ast.nodes[c].label, ty, is_extending: false }
            })
            .collect();
        let record_ty = session.types.get_anonymous_record(fields, false);
        session.ast.nodes[node].kind = NodeKind::TypeRef(record_ty);
        return finish_const(session, node, session.types.type_type);
    }
    let fields = child_types
        .iter()
        .zip(children.iter())
        .map(|(&ty, &c)| crate::types::RecordField { name: session.ast.nodes[c].label, ty, is_extending: false })
        .collect();
    let tuple_ty = session.types.get_anonymous_record(fields, false);
    if children.iter().all(|&c| session.ast.nodes[c].is_constant()) {
        finish_const(session, node, tuple_ty)
    } else {
        finish(session, node, tuple_ty)
    }
}

fn resolve_block(session: &mut Session, node: NodeId, block_scope: ScopeId, children: &[NodeId]) -> bool {
    if children.is_empty() {
        return finish(session, node, session.types.void);
    }
    for &child in &children[..children.len() - 1] {
        if !session.ast.is_resolved(child) {
            resolve_node(session, block_scope, child);
        }
    }
    let last = *children.last().unwrap();
    if !session.ast.is_resolved(last) {
        resolve_node(session, block_scope, last);
    }
    if !all_resolved(session, children) {
        return false;
    }
    let ty = session.ast.nodes[last].cached_type.unwrap();
    finish(session, node, ty)
}

fn resolve_field_access(session: &mut Session, node: NodeId, obj: NodeId, index: usize) -> bool {
    if !session.ast.is_resolved(obj) {
        return false;
    }
    let obj_ty = session.ast.nodes[obj].cached_type.unwrap();
    let field_ty = match session.types.kind(obj_ty) {
        crate::types::TypeKind::AnonymousAggregate { fields, .. } => fields.get(index).map(|f| f.ty),
        crate::types::TypeKind::Record(rec) => {
            session.ast.records[*rec].fields.get(index).and_then(|f| f.ty.resolved())
        }
        _ => None,
    };
    match field_ty {
        Some(t) => finish(session, node, t),
        None => false,
    }
}

/// spec.md §4.4/§4.7: a `Call` whose callee is an unresolved/overloaded
/// symbol routes through the overload resolver; a call whose callee is
/// already a concrete `FunctionRef`/`TypeRef` is either a direct invocation
/// or, for `Type`-typed callees, a generator instantiation request.
fn resolve_call(
    session: &mut Session,
    scope: ScopeId,
    node: NodeId,
    callee: NodeId,
    arg: NodeId,
) -> bool {
    if let NodeKind::UnresolvedSymbol { name, lookup_scope } = session.ast.nodes[callee].kind {
        let lookup_scope = lookup_scope.unwrap_or(scope);
        if !session.ast.is_resolved(arg) {
            resolve_node(session, scope, arg);
            if !session.ast.is_resolved(arg) {
                return false;
            }
        }
        return match crate::overload::resolve_call(session, lookup_scope, name, arg) {
            Ok(matched) => apply_overload_match(session, node, scope, matched),
            Err(OverloadError::NoMatch) => {
                session.diagnostics.push(Diagnostic::NoMatchingOverload {
                    location: session.ast.nodes[node].location,
                    name,
                });
                false
            }
            Err(OverloadError::Ambiguous(candidates)) => {
                session.diagnostics.push(Diagnostic::AmbiguousOverload {
                    location: session.ast.nodes[node].location,
                    name,
                    candidates,
                });
                false
            }
        };
    }
    if !session.ast.is_resolved(callee) {
        if !resolve_node(session, scope, callee) {
            return false;
        }
    }
    if !session.ast.is_resolved(arg) && !resolve_node(session, scope, arg) {
        return false;
    }
    match session.ast.nodes[callee].kind.clone() {
        NodeKind::FunctionRef(func) => apply_direct_call(session, node, scope, func, arg),
        NodeKind::TypeRef(_) => {
            // A `Type(...)` call is a generator instantiation, handled
            // structurally by the pattern matcher's generator table; at the
            // value level this simply carries the argument's type through.
            let ty = session.ast.nodes[arg].cached_type;
            match ty {
                Some(t) => finish(session, node, t),
                None => false,
            }
        }
        _ => false,
    }
}

fn apply_overload_match(
    session: &mut Session,
    node: NodeId,
    scope: ScopeId,
    matched: crate::overload::CandidateMatch,
) -> bool {
    let function = if session.ast.functions[matched.function].needs_specialization() {
        let key = crate::specialize::key_from_match(&matched.pattern_bindings, &matched.expanded_args);
        let specialized = crate::specialize::specialize(session, matched.function, key, scope);
        ensure_specialized_function_resolved(session, specialized);
        specialized
    } else {
        matched.function
    };
    apply_direct_call(session, node, scope, function, arg_tuple(session, &matched.arg_exprs))
}

/// Drives a freshly specialized function's declaration to a fixed point
/// right away (spec.md §4.5 step 5). A specialization is allocated outside
/// the ordinary worklist (`specialize::specialize` hands back a bare
/// `FunctionId`, not a queued `Function` node), so nothing would otherwise
/// resolve its arguments and body before the call site that requested it
/// checks whether it's usable.
fn ensure_specialized_function_resolved(session: &mut Session, function: crate::ast::FunctionId) -> bool {
    if session.ast.functions[function].resolved {
        return true;
    }
    let owner_scope = session.ast.functions[function].owner_scope;
    let decl = session.ast.alloc_node(Location::unknown(), NodeKind::Function(function));
    for _ in 0..DriverConfig::default().max_passes {
        if resolve_node(session, owner_scope, decl) {
            return true;
        }
    }
    false
}

/// Builds the already-resolved argument tuple passed to a matched overload
/// (spec.md §4.4 step 3): every element was already resolved while scoring,
/// so unlike an ordinary source-level tuple this one never needs a fixpoint
/// pass of its own.
fn arg_tuple(session: &mut Session, exprs: &[NodeId]) -> NodeId {
    match exprs {
        [] => {
            let node = session.ast.alloc_resolved(Location::unknown(), NodeKind::Unit, session.types.void);
            session.ast.mark_constant(node);
            node
        }
        [single] => *single,
        many => {
            let fields = many
                .iter()
                .map(|&e| crate::types::RecordField {
                    name: session.ast.nodes[e].label,
                    ty: session.ast.nodes[e].cached_type.unwrap_or(session.types.error),
                    is_extending: false,
                })
                .collect();
            let ty = session.types.get_anonymous_record(fields, false);
            let node = session.ast.alloc_resolved(Location::unknown(), NodeKind::Tuple(many.to_vec()), ty);
            if many.iter().all(|&e| session.ast.nodes[e].is_constant()) {
                session.ast.mark_constant(node);
            }
            node
        }
    }
}

/// spec.md §4.7's `Call` contract: an ordinary (non-macro) call to a pure or
/// intrinsic function whose argument is fully constant gets CTFE-folded away
/// entirely, replacing the call node with its result (spec.md §4.6 step 1).
/// Anything that doesn't fold — an impure function, a non-constant argument,
/// or a tree-walker that simply can't evaluate this body — falls back to
/// building the ordinary `Call` node for the driver's runtime dispatch.
fn apply_direct_call(
    session: &mut Session,
    node: NodeId,
    scope: ScopeId,
    function: crate::ast::FunctionId,
    arg: NodeId,
) -> bool {
    let data = session.ast.functions[function].clone();
    if !data.resolved {
        return false;
    }
    if data.is_macro() {
        return expand_macro(session, node, scope, function, arg);
    }
    let foldable = (data.is_pure() || data.is_intrinsic()) && crate::ctfe::is_constant_expr(session, arg);
    if foldable {
        if let Some(value) = crate::ctfe::try_fold_call(session, function, arg) {
            let folded = crate::ctfe::splice_constant(session, value);
            session.ast.replace_in_place(node, folded);
            session.ast.mark_constant(node);
            return true;
        }
    }
    let ret = data.return_type.resolved();
    session.ast.nodes[node].kind = NodeKind::Call { callee: reference_node(session, function), arg };
    match ret {
        Some(t) => finish(session, node, t),
        None => false,
    }
}

fn reference_node(session: &mut Session, function: crate::ast::FunctionId) -> NodeId {
    session.ast.alloc_node(Location::unknown(), NodeKind::FunctionRef(function))
}

/// spec.md §4.6 step 3: a macro call is replaced in place by its expansion
/// — the macro is CTFE-evaluated with the unevaluated argument subtree
/// quoted in (`NodeReference`), and the `Node`-typed result is spliced in
/// with fresh names (hygiene).
fn expand_macro(
    session: &mut Session,
    node: NodeId,
    scope: ScopeId,
    function: crate::ast::FunctionId,
    arg: NodeId,
) -> bool {
    let quoted = crate::ctfe::ConstValue::Node(arg);
    let result = crate::ctfe::call_function(session, function, &[quoted]);
    match result {
        Some(crate::ctfe::ConstValue::Node(fragment)) => {
            let mut rename = crate::ctfe::HygieneRenames::default();
            let spliced = crate::ctfe::splice_mixin(session, fragment, &mut rename);
            session.ast.replace_in_place(node, spliced);
            // `node` now holds the macro's expansion, whose own children are
            // still the call site's unevaluated subtrees (spec.md §4.6 step
            // 3). Nothing else will ever revisit this worklist entry once
            // this call returns, so drive the spliced-in tree to a fixed
            // point right here — the same reasoning as
            // `ensure_specialized_function_resolved` for a fresh
            // specialization's body.
            let mut pending = Vec::new();
            collect_nodes(&session.ast, node, &mut pending);
            resolve_module(session, scope, &pending, DriverConfig::default());
            session.ast.is_resolved(node)
        }
        _ => {
            session.diagnostics.push(Diagnostic::MacroFailure {
                location: session.ast.nodes[node].location,
                name: session.ast.functions[function].name,
            });
            false
        }
    }
}

/// Collects every node reachable from `root` (root included), structurally,
/// for driving a freshly spliced-in fragment to resolution — several
/// `resolve_*` handlers (`resolve_if`, `resolve_loop`, `resolve_tuple`) check
/// their children's resolved state but don't recurse into them themselves.
fn collect_nodes(ast: &crate::ast::Ast, root: NodeId, out: &mut Vec<NodeId>) {
    out.push(root);
    match ast.nodes[root].kind.clone() {
        NodeKind::Tuple(children) => {
            for c in children {
                collect_nodes(ast, c, out);
            }
        }
        NodeKind::Block { children, .. } => {
            for c in children {
                collect_nodes(ast, c, out);
            }
        }
        NodeKind::FieldAccess { obj, .. } => collect_nodes(ast, obj, out),
        NodeKind::Call { callee, arg } => {
            collect_nodes(ast, callee, out);
            collect_nodes(ast, arg, out);
        }
        NodeKind::If { cond, then_branch, else_branch } => {
            collect_nodes(ast, cond, out);
            collect_nodes(ast, then_branch, out);
            if let Some(e) = else_branch {
                collect_nodes(ast, e, out);
            }
        }
        NodeKind::Loop { body } => collect_nodes(ast, body, out),
        NodeKind::Return(Some(value)) => collect_nodes(ast, value, out),
        NodeKind::Match { scrutinee, cases } => {
            collect_nodes(ast, scrutinee, out);
            for case in cases {
                collect_nodes(ast, case.pattern, out);
                collect_nodes(ast, case.body, out);
            }
        }
        NodeKind::AccessExpression { obj, .. } => collect_nodes(ast, obj, out),
        NodeKind::UnaryOp { operand, .. } | NodeKind::PointerOp { operand, .. } => {
            collect_nodes(ast, operand, out)
        }
        NodeKind::BinaryOp { lhs, rhs, .. } => {
            collect_nodes(ast, lhs, out);
            collect_nodes(ast, rhs, out);
        }
        NodeKind::Assignment { target, value, .. } => {
            collect_nodes(ast, target, out);
            collect_nodes(ast, value, out);
        }
        NodeKind::Cast { expr, ty } => {
            collect_nodes(ast, expr, out);
            collect_nodes(ast, ty, out);
        }
        NodeKind::Variable(var) => {
            if let Some(init) = ast.variables[var].initializer {
                collect_nodes(ast, init, out);
            }
        }
        _ => {}
    }
}

fn resolve_if(
    session: &mut Session,
    node: NodeId,
    cond: NodeId,
    then_branch: NodeId,
    else_branch: Option<NodeId>,
) -> bool {
    let branches_done = session.ast.is_resolved(cond)
        && session.ast.is_resolved(then_branch)
        && else_branch.map_or(true, |e| session.ast.is_resolved(e));
    if !branches_done {
        return false;
    }
    let then_ty = session.ast.nodes[then_branch].cached_type.unwrap();
    let ty = match else_branch {
        Some(e) => {
            let else_ty = session.ast.nodes[e].cached_type.unwrap();
            if else_ty == then_ty {
                then_ty
            } else {
                session.types.void
            }
        }
        None => session.types.void,
    };
    finish(session, node, ty)
}

fn resolve_loop(session: &mut Session, node: NodeId, body: NodeId) -> bool {
    if !session.ast.is_resolved(body) {
        return false;
    }
    finish(session, node, session.types.void)
}

fn resolve_return(session: &mut Session, scope: ScopeId, node: NodeId, value: Option<NodeId>) -> bool {
    let owner = match session.scope_tree.function_owner(scope) {
        Some(f) => f,
        None => return false,
    };
    match value {
        Some(v) => {
            if !session.ast.is_resolved(v) {
                return false;
            }
            let actual = session.ast.nodes[v].cached_type.unwrap();
            let declared = session.ast.functions[owner].return_type;
            if let TypeSlot::Unresolved = declared {
                session.ast.functions[owner].return_type = TypeSlot::Resolved(actual);
            } else if let Some(expected) = declared.resolved() {
                if session.types.can_assign_from(expected, actual, false).is_none() {
                    session.diagnostics.push(Diagnostic::TypeMismatch {
                        location: session.ast.nodes[node].location,
                        message: "return type does not match function signature".into(),
                    });
                }
            }
        }
        None => {
            if let TypeSlot::Unresolved = session.ast.functions[owner].return_type {
                session.ast.functions[owner].return_type = TypeSlot::Resolved(session.types.void);
            }
        }
    }
    finish(session, node, session.types.void)
}

/// spec.md §4.7: `match` over type patterns lowers like the overload
/// resolver's pattern phase (first matching case wins); `match` over a
/// concrete integer/bool/char scrutinee instead lowers to a chained
/// if/else by constant-folding each case's pattern and comparing.
fn resolve_match(
    session: &mut Session,
    scope: ScopeId,
    node: NodeId,
    scrutinee: NodeId,
    cases: &[crate::ast::MatchCase],
) -> bool {
    if !session.ast.is_resolved(scrutinee) {
        return false;
    }
    let scrutinee_ty = session.ast.nodes[scrutinee].cached_type.unwrap();
    if scrutinee_ty == session.types.type_type {
        let mut bindings = rustc_hash::FxHashMap::default();
        for case in cases {
            bindings.clear();
            if crate::pattern::match_pattern(session, case.pattern, scrutinee_ty, &mut bindings) {
                crate::pattern::install_bindings(session, scope, &bindings);
                if !session.ast.is_resolved(case.body) {
                    resolve_node(session, scope, case.body);
                }
                if !session.ast.is_resolved(case.body) {
                    return false;
                }
                let ty = session.ast.nodes[case.body].cached_type.unwrap();
                session.ast.replace_in_place(node, case.body);
                return finish(session, node, ty);
            }
        }
        session.diagnostics.push(Diagnostic::ShapeMismatch {
            location: session.ast.nodes[node].location,
            message: "no match arm's pattern matched the scrutinee type".into(),
        });
        return false;
    }

    // Value match: desugar to `if scrutinee == case0 { ... } else if ...`.
    let mut chain: Option<NodeId> = None;
    for case in cases.iter().rev() {
        let cmp = session.ast.alloc_node(
            Location::unknown(),
            NodeKind::BinaryOp { kind: BinaryOpKind::Eq, lhs: scrutinee, rhs: case.pattern },
        );
        let if_node = session.ast.alloc_node(
            Location::unknown(),
            NodeKind::If { cond: cmp, then_branch: case.body, else_branch: chain },
        );
        chain = Some(if_node);
    }
    match chain {
        Some(desugared) => {
            session.ast.replace_in_place(node, desugared);
            resolve_node(session, scope, node)
        }
        None => finish(session, node, session.types.void),
    }
}

fn resolve_passthrough_unary(session: &mut Session, node: NodeId, operand: NodeId) -> bool {
    if !session.ast.is_resolved(operand) {
        return false;
    }
    let ty = session.ast.nodes[operand].cached_type.unwrap();
    if session.ast.nodes[operand].is_constant() {
        finish_const(session, node, ty)
    } else {
        finish(session, node, ty)
    }
}

fn resolve_binary(
    session: &mut Session,
    node: NodeId,
    kind: BinaryOpKind,
    lhs: NodeId,
    rhs: NodeId,
) -> bool {
    if !session.ast.is_resolved(lhs) || !session.ast.is_resolved(rhs) {
        return false;
    }
    use BinaryOpKind::*;
    let is_comparison = matches!(kind, Eq | Ne | Lt | Le | Gt | Ge | And | Or);
    let ty = if is_comparison {
        session.types.bool_type
    } else {
        session.ast.nodes[lhs].cached_type.unwrap()
    };
    if session.ast.nodes[lhs].is_constant() && session.ast.nodes[rhs].is_constant() {
        finish_const(session, node, ty)
    } else {
        finish(session, node, ty)
    }
}

fn resolve_pointer_op(
    session: &mut Session,
    node: NodeId,
    kind: crate::ast::PointerOpKind,
    operand: NodeId,
) -> bool {
    if !session.ast.is_resolved(operand) {
        return false;
    }
    let operand_ty = session.ast.nodes[operand].cached_type.unwrap();
    let ty = match kind {
        crate::ast::PointerOpKind::Address => session.types.get_pointer(operand_ty),
        crate::ast::PointerOpKind::Dereference => match session.types.kind(operand_ty) {
            crate::types::TypeKind::Pointer(inner) => *inner,
            crate::types::TypeKind::BoundedPointer(inner) => *inner,
            _ => return false,
        },
    };
    finish(session, node, ty)
}

/// spec.md §4.7: an assignment whose target is a tuple splits element-wise;
/// assigning to an already-initialized immutable variable is rejected.
fn resolve_assignment(
    session: &mut Session,
    node: NodeId,
    target: NodeId,
    value: NodeId,
    is_init: bool,
) -> bool {
    if !session.ast.is_resolved(value) {
        return false;
    }
    if let NodeKind::Tuple(targets) = session.ast.nodes[target].kind.clone() {
        let value_children = match session.ast.nodes[value].kind.clone() {
            NodeKind::Tuple(c) => c,
            _ => vec![value],
        };
        if targets.len() != value_children.len() {
            session.diagnostics.push(Diagnostic::ShapeMismatch {
                location: session.ast.nodes[node].location,
                message: "tuple assignment arity mismatch".into(),
            });
            return false;
        }
        for (&t, &v) in targets.iter().zip(value_children.iter()) {
            if !check_assignment_target(session, node, t, is_init) {
                return false;
            }
            let _ = v;
        }
        return finish(session, node, session.types.void);
    }
    if !check_assignment_target(session, node, target, is_init) {
        return false;
    }
    finish(session, node, session.types.void)
}

/// Enforces the immutability rule for one assignment leaf (spec.md §4.7):
/// assigning to an already-initialized immutable variable is rejected,
/// unless this assignment *is* the initializer.
fn check_assignment_target(session: &mut Session, node: NodeId, target: NodeId, is_init: bool) -> bool {
    if let NodeKind::VariableRef(var) = session.ast.nodes[target].kind {
        let mutable = session.ast.variables[var].mutable;
        if !is_init && !mutable {
            session.diagnostics.push(Diagnostic::ConstnessViolation {
                location: session.ast.nodes[node].location,
                name: session.ast.variables[var].name,
            });
            return false;
        }
    }
    true
}

fn resolve_cast(session: &mut Session, node: NodeId, expr: NodeId, ty: NodeId) -> bool {
    if !session.ast.is_resolved(expr) || !session.ast.is_resolved(ty) {
        return false;
    }
    match session.ast.nodes[ty].kind {
        NodeKind::TypeRef(t) if session.ast.nodes[expr].is_constant() => finish_const(session, node, t),
        NodeKind::TypeRef(t) => finish(session, node, t),
        _ => false,
    }
}

fn resolve_node_reference(session: &mut Session, node: NodeId, inner: NodeId) -> bool {
    let ty = session.types.get_node_type(session.types.void);
    let _ = inner;
    finish(session, node, ty)
}

fn resolve_variable_decl(session: &mut Session, node: NodeId, var: crate::ast::VariableId) -> bool {
    let data = session.ast.variables[var].clone();
    let declared = match data.ty {
        TypeSlot::Resolved(t) => Some(t),
        TypeSlot::Unresolved => None,
        TypeSlot::Pattern(pattern_node) => {
            let init = match data.initializer {
                Some(i) => i,
                None => return false,
            };
            if !session.ast.is_resolved(init) {
                return false;
            }
            let init_ty = session.ast.nodes[init].cached_type.unwrap();
            let mut bindings = rustc_hash::FxHashMap::default();
            if !crate::pattern::match_pattern(session, pattern_node, init_ty, &mut bindings) {
                return false;
            }
            crate::pattern::install_bindings(session, data.owner_scope, &bindings);
            Some(init_ty)
        }
    };
    let ty = match declared {
        Some(t) => t,
        None => {
            let init = match data.initializer {
                Some(i) => i,
                None => return false,
            };
            if !session.ast.is_resolved(init) {
                return false;
            }
            session.ast.nodes[init].cached_type.unwrap()
        }
    };
    session.ast.variables[var].ty = TypeSlot::Resolved(ty);
    session.ast.variables[var].resolved = true;
    finish(session, node, session.types.void)
}

fn resolve_function_decl(session: &mut Session, node: NodeId, func: crate::ast::FunctionId) -> bool {
    let data = session.ast.functions[func].clone();
    for &arg in &data.arguments {
        let arg_data = session.ast.arguments[arg].clone();
        if let TypeSlot::Pattern(pattern_node) = arg_data.ty {
            let check = crate::pattern::check(&session.ast, pattern_node, &[]);
            for &name in &check.duplicates {
                session.diagnostics.push(Diagnostic::PatternRedefinition {
                    location: session.ast.nodes[pattern_node].location,
                    name,
                });
            }
            if !check.is_pattern {
                if let Some(t) = session.ast.nodes[pattern_node].cached_type {
                    session.ast.arguments[arg].ty = TypeSlot::Resolved(t);
                    session.ast.arguments[arg].resolved = true;
                }
            }
        }
    }
    let args_resolved = data.arguments.iter().all(|&a| session.ast.arguments[a].resolved);
    if !args_resolved {
        return false;
    }
    if let Some(body) = data.body {
        if !session.ast.is_resolved(body) {
            resolve_node(session, data.body_scope, body);
            if !session.ast.is_resolved(body) {
                return false;
            }
        }
    }
    if let TypeSlot::Unresolved = data.return_type {
        // No explicit `Return` fired while resolving the body above (those
        // already set `return_type` themselves, see `resolve_return`): the
        // function's value is its body's trailing expression.
        match data.body {
            Some(body) => {
                let inferred = session.ast.nodes[body].cached_type.unwrap();
                session.ast.functions[func].return_type = TypeSlot::Resolved(inferred);
            }
            None => return false,
        }
    }
    // spec.md §4.2: a function whose return type is `Type` is a "type
    // generator" — calling it produces a type value, and sibling-import
    // ambiguity against a plain function of the same name is a hard error
    // (enforced in `overload::type_generator_conflict`).
    if session.ast.functions[func].return_type.resolved() == Some(session.types.type_type) {
        session.ast.functions[func].flags.insert(FunctionFlags::TYPE_GENERATOR);
    }
    session.ast.functions[func].resolved = true;
    finish(session, node, session.types.void)
}

fn resolve_record_decl(session: &mut Session, node: NodeId, rec: crate::ast::RecordId) -> bool {
    let data = session.ast.records[rec].clone();
    let fields_resolved = data.fields.iter().all(|f| f.ty.resolved().is_some());
    if !fields_resolved {
        return false;
    }
    let ty = session.types.declare_record(rec);
    session.types.mark_resolved(ty);
    session.ast.records[rec].self_type = Some(ty);
    session.ast.records[rec].resolved = true;
    finish(session, node, session.types.void)
}

fn resolve_variant_decl(session: &mut Session, node: NodeId, var: crate::ast::VariantId) -> bool {
    let data = session.ast.variants[var].clone();
    let cases_resolved = data.cases.iter().all(|c| c.ty.as_ref().map_or(true, |t| t.resolved().is_some()));
    if !cases_resolved {
        return false;
    }
    let ty = session.types.declare_variant(var);
    session.types.mark_resolved(ty);
    session.ast.variants[var].self_type = Some(ty);
    session.ast.variants[var].resolved = true;
    finish(session, node, session.types.void)
}
