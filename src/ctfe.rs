//! The CTFE Engine (spec.md §4.6, component C7).
//!
//! Grounded on `hir_def::resolver`'s const-eval hooks plus `hir_expand`'s
//! macro expansion pipeline: intrinsics are native Rust closures keyed by
//! name (mirrors `hir_def`'s `find_builtin_macro` dispatch table) and a
//! user-written function is evaluated by walking its body directly rather
//! than lowering to a bytecode VM, since spec.md never asks for one.

use rustc_hash::FxHashMap;

use crate::ast::{ArgumentId, BinaryOpKind, FunctionFlags, FunctionId, NodeId, NodeKind, UnaryOpKind};
use crate::intern::Symbol;
use crate::location::Location;
use crate::scope::ScopeId;
use crate::types::TypeId;
use crate::Session;

/// A constant value produced by folding (spec.md §4.6: "constant folding
/// produces either a concrete value or a type").
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Int(i128),
    Float(u64),
    Char(char),
    Bool(bool),
    String(Symbol),
    Type(TypeId),
    Node(NodeId),
    Unit,
    Tuple(Vec<ConstValue>),
}

/// A native implementation bound to an intrinsic function (spec.md §6.3).
/// Stored as a plain function pointer, matching the teacher's
/// `find_builtin_macro`-style dispatch table rather than a `dyn Fn` trait
/// object, since intrinsics never capture state.
pub type IntrinsicFn = fn(&mut Session, &[ConstValue]) -> Result<ConstValue, String>;

#[derive(Clone, Copy)]
pub struct IntrinsicBinder {
    pub name: &'static str,
    pub implementation: IntrinsicFn,
}

impl std::fmt::Debug for IntrinsicBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntrinsicBinder").field("name", &self.name).finish()
    }
}

/// The registry of intrinsic implementations, looked up by name at the point
/// an `intrinsic` declaration is resolved (spec.md §6.3: "binding an
/// intrinsic by name is an outer-surface concern, not part of resolution
/// proper" — so the registry itself lives in `Session`, populated once by the
/// embedder, and `ctfe` only ever reads from it).
#[derive(Default)]
pub struct IntrinsicRegistry {
    table: FxHashMap<&'static str, IntrinsicBinder>,
}

impl IntrinsicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &'static str, implementation: IntrinsicFn) {
        self.table.insert(name, IntrinsicBinder { name, implementation });
    }

    pub fn lookup(&self, name: &str) -> Option<IntrinsicBinder> {
        self.table.get(name).copied()
    }

    /// The handful of arithmetic/comparison intrinsics every scenario in
    /// spec.md §8 depends on (constraint functions like `isTuple`, plus the
    /// operators used by constant folding in driver.rs).
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register("add", intrinsic_add);
        reg.register("sub", intrinsic_sub);
        reg.register("eq", intrinsic_eq);
        reg
    }
}

fn intrinsic_add(_session: &mut Session, args: &[ConstValue]) -> Result<ConstValue, String> {
    match (&args[0], &args[1]) {
        (ConstValue::Int(a), ConstValue::Int(b)) => Ok(ConstValue::Int(a + b)),
        _ => Err("add expects two integers".into()),
    }
}

fn intrinsic_sub(_session: &mut Session, args: &[ConstValue]) -> Result<ConstValue, String> {
    match (&args[0], &args[1]) {
        (ConstValue::Int(a), ConstValue::Int(b)) => Ok(ConstValue::Int(a - b)),
        _ => Err("sub expects two integers".into()),
    }
}

fn intrinsic_eq(_session: &mut Session, args: &[ConstValue]) -> Result<ConstValue, String> {
    Ok(ConstValue::Bool(args[0] == args[1]))
}

/// Is `node` a syntactically constant expression (spec.md §4.6 step 1:
/// "folding requires every argument to already be constant")?
pub fn is_constant_expr(session: &Session, node: NodeId) -> bool {
    session.ast.nodes[node].is_constant()
}

/// Evaluates `node` to a [`ConstValue`], walking the AST directly. Returns
/// `None` on anything this tree-walker does not (yet) understand — the
/// caller (driver.rs) treats that as "not foldable", never as an error.
pub fn evaluate(session: &mut Session, node: NodeId) -> Option<ConstValue> {
    let kind = session.ast.nodes[node].kind.clone();
    match kind {
        NodeKind::IntLiteral(v) => Some(ConstValue::Int(v)),
        NodeKind::FloatLiteral(bits) => Some(ConstValue::Float(bits)),
        NodeKind::CharLiteral(c) => Some(ConstValue::Char(c)),
        NodeKind::BoolLiteral(b) => Some(ConstValue::Bool(b)),
        NodeKind::StringLiteral(s) => Some(ConstValue::String(s)),
        NodeKind::Unit => Some(ConstValue::Unit),
        NodeKind::TypeRef(t) => Some(ConstValue::Type(t)),
        NodeKind::NodeReference(quoted) => Some(ConstValue::Node(quoted)),
        NodeKind::Tuple(children) => {
            let mut values = Vec::with_capacity(children.len());
            for child in children {
                values.push(evaluate(session, child)?);
            }
            Some(ConstValue::Tuple(values))
        }
        NodeKind::UnaryOp { kind, operand } => {
            let v = evaluate(session, operand)?;
            evaluate_unary(kind, v)
        }
        NodeKind::BinaryOp { kind, lhs, rhs } => {
            let a = evaluate(session, lhs)?;
            let b = evaluate(session, rhs)?;
            evaluate_binary(kind, a, b)
        }
        NodeKind::VariableRef(var) => {
            let data = session.ast.variables[var].clone();
            data.constant_substitute.map(ConstValue::Type).or_else(|| {
                let init = data.initializer?;
                evaluate(session, init)
            })
        }
        NodeKind::Call { callee, arg } => evaluate_call(session, callee, arg),
        _ => None,
    }
}

fn evaluate_unary(kind: UnaryOpKind, v: ConstValue) -> Option<ConstValue> {
    match (kind, v) {
        (UnaryOpKind::Neg, ConstValue::Int(i)) => Some(ConstValue::Int(-i)),
        (UnaryOpKind::Not, ConstValue::Bool(b)) => Some(ConstValue::Bool(!b)),
        (UnaryOpKind::BitNot, ConstValue::Int(i)) => Some(ConstValue::Int(!i)),
        _ => None,
    }
}

fn evaluate_binary(kind: BinaryOpKind, a: ConstValue, b: ConstValue) -> Option<ConstValue> {
    use BinaryOpKind::*;
    if let (ConstValue::Int(x), ConstValue::Int(y)) = (&a, &b) {
        let (x, y) = (*x, *y);
        return Some(match kind {
            Add => ConstValue::Int(x + y),
            Sub => ConstValue::Int(x - y),
            Mul => ConstValue::Int(x * y),
            Div if y != 0 => ConstValue::Int(x / y),
            Rem if y != 0 => ConstValue::Int(x % y),
            Eq => ConstValue::Bool(x == y),
            Ne => ConstValue::Bool(x != y),
            Lt => ConstValue::Bool(x < y),
            Le => ConstValue::Bool(x <= y),
            Gt => ConstValue::Bool(x > y),
            Ge => ConstValue::Bool(x >= y),
            BitAnd => ConstValue::Int(x & y),
            BitOr => ConstValue::Int(x | y),
            BitXor => ConstValue::Int(x ^ y),
            _ => return None,
        });
    }
    if let (ConstValue::Bool(x), ConstValue::Bool(y)) = (&a, &b) {
        return Some(match kind {
            And => ConstValue::Bool(*x && *y),
            Or => ConstValue::Bool(*x || *y),
            Eq => ConstValue::Bool(x == y),
            Ne => ConstValue::Bool(x != y),
            _ => return None,
        });
    }
    None
}

fn evaluate_call(session: &mut Session, callee: NodeId, arg: NodeId) -> Option<ConstValue> {
    let function = match &session.ast.nodes[callee].kind {
        NodeKind::FunctionRef(f) => *f,
        _ => return None,
    };
    let args = crate::overload::split_argument(session, arg);
    let mut values = Vec::with_capacity(args.len());
    for (expr, _) in &args {
        values.push(evaluate(session, *expr)?);
    }
    call_function(session, function, &values)
}

/// Evaluates a call to `function` with already-evaluated `args` (spec.md
/// §4.6 step 2): native intrinsics dispatch through [`IntrinsicRegistry`];
/// user-written functions get tree-walked body-first.
pub fn call_function(
    session: &mut Session,
    function: FunctionId,
    args: &[ConstValue],
) -> Option<ConstValue> {
    let data = session.ast.functions[function].clone();
    if data.flags.contains(FunctionFlags::INTERPRET_ONLY_INSIDE) {
        return None;
    }
    if let Some(binder) = data.intrinsic {
        return (binder.implementation)(session, args).ok();
    }
    let body = data.body?;
    let body_scope = data.body_scope;
    bind_arguments(session, &data.arguments, args, body_scope);
    evaluate_body(session, body)
}

fn bind_arguments(
    session: &mut Session,
    arguments: &[ArgumentId],
    values: &[ConstValue],
    scope: ScopeId,
) {
    for (arg, value) in arguments.iter().zip(values.iter()) {
        let name = session.ast.arguments[*arg].name;
        if let ConstValue::Type(ty) = value {
            let var = session.ast.variables.alloc(crate::ast::VariableData {
                name,
                owner_scope: scope,
                mutable: false,
                ty: crate::ast::TypeSlot::Resolved(session.types.type_type),
                constant_substitute: Some(*ty),
                initializer: None,
                resolved: true,
                location: Location::unknown(),
            });
            session.scope_tree.try_define(scope, name, crate::scope::PrefixDef::Variable(var));
        }
    }
}

fn evaluate_body(session: &mut Session, body: NodeId) -> Option<ConstValue> {
    match &session.ast.nodes[body].kind {
        NodeKind::Block { children, .. } => {
            let children = children.clone();
            let mut last = ConstValue::Unit;
            for child in children {
                if let NodeKind::Return(value) = session.ast.nodes[child].kind {
                    return match value {
                        Some(v) => evaluate(session, v),
                        None => Some(ConstValue::Unit),
                    };
                }
                last = evaluate(session, child)?;
            }
            Some(last)
        }
        _ => evaluate(session, body),
    }
}

/// Attempts to fold an ordinary (non-macro) call entirely away (spec.md
/// §4.7's `Call` contract): `arg` must already be a constant expression, each
/// of its split sub-expressions must itself evaluate, and the call result is
/// handed back as a [`ConstValue`] for the driver to splice in with
/// [`splice_constant`]. Returns `None` for anything this can't fold —
/// the caller falls back to building an ordinary runtime `Call` node.
pub fn try_fold_call(session: &mut Session, function: FunctionId, arg: NodeId) -> Option<ConstValue> {
    if !is_constant_expr(session, arg) {
        return None;
    }
    let slots = crate::overload::split_argument(session, arg);
    let mut values = Vec::with_capacity(slots.len());
    for (expr, _) in &slots {
        values.push(evaluate(session, *expr)?);
    }
    call_function(session, function, &values)
}

/// The inverse of `evaluate`: turns a folded [`ConstValue`] back into an
/// already-resolved, constant-flagged AST node the driver can splice in
/// place of the call it replaced (spec.md §4.6: "folding produces either a
/// concrete value or a type", and either is spliced back as a literal node).
pub fn splice_constant(session: &mut Session, value: ConstValue) -> NodeId {
    let node = match value {
        ConstValue::Node(n) => n,
        ConstValue::Int(v) => {
            session.ast.alloc_resolved(Location::unknown(), NodeKind::IntLiteral(v), session.types.literal_int)
        }
        ConstValue::Float(bits) => session.ast.alloc_resolved(
            Location::unknown(),
            NodeKind::FloatLiteral(bits),
            session.types.literal_float,
        ),
        ConstValue::Char(c) => {
            session.ast.alloc_resolved(Location::unknown(), NodeKind::CharLiteral(c), session.types.literal_char)
        }
        ConstValue::Bool(b) => {
            session.ast.alloc_resolved(Location::unknown(), NodeKind::BoolLiteral(b), session.types.bool_type)
        }
        ConstValue::String(s) => session.ast.alloc_resolved(
            Location::unknown(),
            NodeKind::StringLiteral(s),
            session.types.literal_string,
        ),
        ConstValue::Type(t) => {
            session.ast.alloc_resolved(Location::unknown(), NodeKind::TypeRef(t), session.types.type_type)
        }
        ConstValue::Unit => session.ast.alloc_resolved(Location::unknown(), NodeKind::Unit, session.types.void),
        ConstValue::Tuple(values) => {
            let children: Vec<NodeId> = values.into_iter().map(|v| splice_constant(session, v)).collect();
            let fields = children
                .iter()
                .map(|&c| crate::types::RecordField {
                    name: session.ast.nodes[c].label,
                    ty: session.ast.nodes[c].cached_type.unwrap_or(session.types.error),
                    is_extending: false,
                })
                .collect();
            let ty = session.types.get_anonymous_record(fields, false);
            session.ast.alloc_resolved(Location::unknown(), NodeKind::Tuple(children), ty)
        }
    };
    session.ast.mark_constant(node);
    node
}

/// Constraint-function invocation for pattern matching (spec.md §4.3: a
/// `FunctionRef` pattern segment calls its function with the candidate type
/// and accepts the match iff it folds to `true`). Used by `pattern.rs`.
///
/// Distinguishes the constraint actually folding to `false` (a definite
/// rejection, worth a `ConstraintFailure` diagnostic, spec.md §7) from the
/// fold simply not succeeding at all (treated as "not yet decidable", never
/// reported).
pub fn call_constraint(
    session: &mut Session,
    function: FunctionId,
    candidate: TypeId,
    location: Location,
) -> bool {
    match call_function(session, function, &[ConstValue::Type(candidate)]) {
        Some(ConstValue::Bool(true)) => true,
        Some(ConstValue::Bool(false)) => {
            session.diagnostics.push(crate::diagnostics::Diagnostic::ConstraintFailure {
                location,
                name: session.ast.functions[function].name,
            });
            false
        }
        _ => false,
    }
}

/// Bookkeeping threaded through a single [`splice_mixin`] call: a fragment
/// can both name something by symbol (`Wildcard`/`UnresolvedSymbol`, bound
/// lazily by whatever text it carries) and declare something by arena id
/// (`Variable`/`Function`), and a reference to a declaration elsewhere in
/// the same fragment (`VariableRef`/`FunctionRef`) must follow that
/// declaration to its fresh id, not just its fresh name.
#[derive(Default)]
pub struct HygieneRenames {
    symbols: FxHashMap<Symbol, Symbol>,
    variables: FxHashMap<crate::ast::VariableId, crate::ast::VariableId>,
    functions: FxHashMap<FunctionId, FunctionId>,
}

/// Hygienic mixin splicing (spec.md §4.6 step 3): a macro's quoted-fragment
/// result is spliced into the call site by copying its subtree wholesale,
/// renaming every name it introduces to a fresh symbol so it cannot capture
/// (or be captured by) names already visible at the call site.
pub fn splice_mixin(session: &mut Session, fragment: NodeId, rename: &mut HygieneRenames) -> NodeId {
    let data = session.ast.duplicate_node(fragment);
    let new_id = session.ast.nodes.alloc(data);
    rewrite_hygienically(session, new_id, rename);
    new_id
}

fn rewrite_hygienically(session: &mut Session, node: NodeId, rename: &mut HygieneRenames) {
    let kind = session.ast.nodes[node].kind.clone();
    match kind {
        NodeKind::Wildcard => {
            if let Some(label) = session.ast.nodes[node].label {
                let fresh = fresh_symbol(session, label, &mut rename.symbols);
                session.ast.set_label(node, fresh);
            }
        }
        NodeKind::UnresolvedSymbol { name, lookup_scope } => {
            if let Some(&fresh) = rename.symbols.get(&name) {
                session.ast.nodes[node].kind =
                    NodeKind::UnresolvedSymbol { name: fresh, lookup_scope };
            }
        }
        // A definition quoted inside the fragment gets cloned into a fresh
        // arena slot under a fresh name, so it can neither capture nor be
        // captured by anything already visible at the splice site (spec.md
        // §4.6: every name an expansion introduces gets a fresh identity).
        // The id mapping is recorded too, so a `VariableRef`/`FunctionRef`
        // to the same declaration elsewhere in this fragment follows along.
        NodeKind::Variable(var) => {
            let mut data = session.ast.variables[var].clone();
            data.name = fresh_symbol(session, data.name, &mut rename.symbols);
            let fresh_var = session.ast.variables.alloc(data);
            rename.variables.insert(var, fresh_var);
            session.ast.nodes[node].kind = NodeKind::Variable(fresh_var);
        }
        NodeKind::Function(func) => {
            let mut data = session.ast.functions[func].clone();
            data.name = fresh_symbol(session, data.name, &mut rename.symbols);
            let fresh_func = session.ast.functions.alloc(data);
            rename.functions.insert(func, fresh_func);
            session.ast.nodes[node].kind = NodeKind::Function(fresh_func);
        }
        NodeKind::Record(rec) => {
            let mut data = session.ast.records[rec].clone();
            if let Some(name) = data.name {
                data.name = Some(fresh_symbol(session, name, &mut rename.symbols));
            }
            let fresh_rec = session.ast.records.alloc(data);
            session.ast.nodes[node].kind = NodeKind::Record(fresh_rec);
        }
        NodeKind::VariableRef(var) => {
            if let Some(&fresh) = rename.variables.get(&var) {
                session.ast.nodes[node].kind = NodeKind::VariableRef(fresh);
            }
        }
        NodeKind::FunctionRef(func) => {
            if let Some(&fresh) = rename.functions.get(&func) {
                session.ast.nodes[node].kind = NodeKind::FunctionRef(fresh);
            }
        }
        NodeKind::Tuple(children) => {
            for child in children {
                rewrite_hygienically(session, child, rename);
            }
        }
        NodeKind::Block { children, .. } => {
            for child in children {
                rewrite_hygienically(session, child, rename);
            }
        }
        NodeKind::Call { callee, arg } => {
            rewrite_hygienically(session, callee, rename);
            rewrite_hygienically(session, arg, rename);
        }
        NodeKind::If { cond, then_branch, else_branch } => {
            rewrite_hygienically(session, cond, rename);
            rewrite_hygienically(session, then_branch, rename);
            if let Some(e) = else_branch {
                rewrite_hygienically(session, e, rename);
            }
        }
        NodeKind::Assignment { target, value, .. } => {
            rewrite_hygienically(session, target, rename);
            rewrite_hygienically(session, value, rename);
        }
        NodeKind::BinaryOp { lhs, rhs, .. } => {
            rewrite_hygienically(session, lhs, rename);
            rewrite_hygienically(session, rhs, rename);
        }
        NodeKind::UnaryOp { operand, .. } | NodeKind::PointerOp { operand, .. } => {
            rewrite_hygienically(session, operand, rename);
        }
        _ => {}
    }
}

fn fresh_symbol(
    session: &mut Session,
    original: Symbol,
    rename: &mut FxHashMap<Symbol, Symbol>,
) -> Symbol {
    if let Some(&existing) = rename.get(&original) {
        return existing;
    }
    cov_mark::hit!(macro_splice_renames_introduced_name);
    let base = session.interner.resolve(original).to_string();
    let fresh = session.interner.intern(&format!("{}#{}", base, session.next_hygiene_id()));
    rename.insert(original, fresh);
    fresh
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_integer_arithmetic() {
        let mut session = Session::new();
        let one = session.ast.alloc_node(Location::unknown(), NodeKind::IntLiteral(1));
        let two = session.ast.alloc_node(Location::unknown(), NodeKind::IntLiteral(2));
        let add = session.ast.alloc_node(
            Location::unknown(),
            NodeKind::BinaryOp { kind: BinaryOpKind::Add, lhs: one, rhs: two },
        );
        assert_eq!(evaluate(&mut session, add), Some(ConstValue::Int(3)));
    }

    #[test]
    fn division_by_zero_does_not_fold() {
        let mut session = Session::new();
        let one = session.ast.alloc_node(Location::unknown(), NodeKind::IntLiteral(1));
        let zero = session.ast.alloc_node(Location::unknown(), NodeKind::IntLiteral(0));
        let div = session.ast.alloc_node(
            Location::unknown(),
            NodeKind::BinaryOp { kind: BinaryOpKind::Div, lhs: one, rhs: zero },
        );
        assert_eq!(evaluate(&mut session, div), None);
    }

    /// A fragment that both declares a variable and refers back to it (`{
    /// let v = 1; v }`) must have the reference follow the declaration to
    /// its fresh post-splice id, not keep pointing at the pre-splice one.
    #[test]
    fn splice_mixin_rewrites_internal_variable_references() {
        cov_mark::check!(macro_splice_renames_introduced_name);
        let mut session = Session::new();
        let name = session.interner.intern("v");
        let init = session.ast.alloc_node(Location::unknown(), NodeKind::IntLiteral(1));
        let var = session.ast.variables.alloc(crate::ast::VariableData {
            name,
            owner_scope: session.scope_tree.alloc(None),
            mutable: false,
            ty: crate::ast::TypeSlot::Unresolved,
            constant_substitute: None,
            initializer: Some(init),
            resolved: false,
            location: Location::unknown(),
        });
        let decl = session.ast.alloc_node(Location::unknown(), NodeKind::Variable(var));
        let var_ref = session.ast.alloc_node(Location::unknown(), NodeKind::VariableRef(var));
        let block_scope = session.scope_tree.alloc(None);
        let fragment = session.ast.alloc_node(
            Location::unknown(),
            NodeKind::Block { scope: block_scope, children: vec![decl, var_ref] },
        );

        let mut rename = HygieneRenames::default();
        let spliced = splice_mixin(&mut session, fragment, &mut rename);

        match session.ast.nodes[spliced].kind.clone() {
            NodeKind::Block { children, .. } => {
                let fresh_decl_var = match session.ast.nodes[children[0]].kind {
                    NodeKind::Variable(v) => v,
                    ref other => panic!("expected a Variable decl, got {:?}", other),
                };
                assert_ne!(fresh_decl_var, var, "the declaration should get a fresh id");
                match session.ast.nodes[children[1]].kind {
                    NodeKind::VariableRef(v) => {
                        assert_eq!(v, fresh_decl_var, "the reference must follow the renamed declaration");
                    }
                    ref other => panic!("expected a VariableRef, got {:?}", other),
                }
            }
            ref other => panic!("expected a Block, got {:?}", other),
        }
    }
}
