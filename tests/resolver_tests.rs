//! End-to-end tests driving hand-built ASTs through the fixpoint driver.
//! The parser is out of scope, so every tree here is constructed directly
//! against the arenas, the way `hir_def::test_db`'s fixture helpers build a
//! `Body` by hand instead of going through `syntax::SourceFile`.

use semcheck::ast::{
    ArgumentData, BinaryOpKind, FunctionData, FunctionFlags, NodeKind, TypeSlot, VariableData,
};
use semcheck::ctfe::{ConstValue, IntrinsicBinder};
use semcheck::diagnostics::Diagnostic;
use semcheck::driver::{resolve_module, DriverConfig};
use semcheck::location::Location;
use semcheck::scope::PrefixDef;
use semcheck::Session;

fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn declare_add(session: &mut Session, module_scope: semcheck::scope::ScopeId) -> semcheck::ast::FunctionId {
    let i32_ = session.types.get_integer_type(32, true);
    let name = session.interner.intern("add");
    let a_name = session.interner.intern("a");
    let b_name = session.interner.intern("b");

    let body_scope = session.scope_tree.alloc(Some(module_scope));

    let a_var = session.ast.variables.alloc(VariableData {
        name: a_name,
        owner_scope: body_scope,
        mutable: false,
        ty: TypeSlot::Resolved(i32_),
        constant_substitute: None,
        initializer: None,
        resolved: true,
        location: Location::unknown(),
    });
    let b_var = session.ast.variables.alloc(VariableData {
        name: b_name,
        owner_scope: body_scope,
        mutable: false,
        ty: TypeSlot::Resolved(i32_),
        constant_substitute: None,
        initializer: None,
        resolved: true,
        location: Location::unknown(),
    });
    session.scope_tree.try_define(body_scope, a_name, PrefixDef::Variable(a_var));
    session.scope_tree.try_define(body_scope, b_name, PrefixDef::Variable(b_var));

    let a_arg = session.ast.arguments.alloc(ArgumentData {
        name: a_name,
        ty: TypeSlot::Resolved(i32_),
        default_value: None,
        location: Location::unknown(),
        resolved: true,
    });
    let b_arg = session.ast.arguments.alloc(ArgumentData {
        name: b_name,
        ty: TypeSlot::Resolved(i32_),
        default_value: None,
        location: Location::unknown(),
        resolved: true,
    });

    let a_ref = session.ast.alloc_resolved(Location::unknown(), NodeKind::VariableRef(a_var), i32_);
    let b_ref = session.ast.alloc_resolved(Location::unknown(), NodeKind::VariableRef(b_var), i32_);
    let sum = session.ast.alloc_node(
        Location::unknown(),
        NodeKind::BinaryOp { kind: BinaryOpKind::Add, lhs: a_ref, rhs: b_ref },
    );

    let function = session.ast.functions.alloc(FunctionData {
        name,
        owner_scope: module_scope,
        arguments: vec![a_arg, b_arg],
        return_type: TypeSlot::Resolved(i32_),
        body_scope,
        body: Some(sum),
        flags: FunctionFlags::empty(),
        intrinsic: None,
        specializations: Vec::new(),
        specialized_from: None,
        resolved: false,
        location: Location::unknown(),
    });
    session.scope_tree.scopes[body_scope].owner_function = Some(function);

    let decl_node = session.ast.alloc_node(Location::unknown(), NodeKind::Function(function));
    session.scope_tree.try_define(module_scope, name, PrefixDef::Function(function));
    resolve_module(session, module_scope, &[sum, decl_node], DriverConfig::default());
    function
}

fn build_call(
    session: &mut Session,
    module_scope: semcheck::scope::ScopeId,
    name: &str,
    args: Vec<(semcheck::ast::NodeKind, semcheck::types::TypeId)>,
) -> semcheck::ast::NodeId {
    let arg_nodes: Vec<_> = args
        .into_iter()
        .map(|(kind, ty)| session.ast.alloc_resolved(Location::unknown(), kind, ty))
        .collect();
    let tuple = session.ast.alloc_node(Location::unknown(), NodeKind::Tuple(arg_nodes));
    let symbol = session.interner.intern(name);
    let callee = session.ast.alloc_node(
        Location::unknown(),
        NodeKind::UnresolvedSymbol { name: symbol, lookup_scope: Some(module_scope) },
    );
    session.ast.alloc_node(Location::unknown(), NodeKind::Call { callee, arg: tuple })
}

/// S1: `def add(a int32, b int32) = a + b ; add(1, 2)` resolves to a `Call`
/// of the single `add`, with an `int32` result.
#[test]
fn s1_call_resolves_with_exact_weight_literals() {
    let mut session = Session::new();
    let module_scope = session.new_module_scope();
    declare_add(&mut session, module_scope);

    let i32_ = session.types.get_integer_type(32, true);
    let call = build_call(
        &mut session,
        module_scope,
        "add",
        vec![(NodeKind::IntLiteral(1), i32_), (NodeKind::IntLiteral(2), i32_)],
    );

    let report = resolve_module(&mut session, module_scope, &[call], DriverConfig::default());
    assert_eq!(report.unresolved_count, 0);
    assert_eq!(session.ast.nodes[call].cached_type, Some(i32_));
    assert!(matches!(session.ast.nodes[call].kind, NodeKind::Call { .. }));
}

/// Boundary case: an empty tuple is the unit value.
#[test]
fn empty_tuple_is_unit_end_to_end() {
    let mut session = Session::new();
    let scope = session.new_module_scope();
    let node = session.ast.alloc_node(Location::unknown(), NodeKind::Tuple(Vec::new()));
    resolve_module(&mut session, scope, &[node], DriverConfig::default());
    assert_eq!(session.ast.nodes[node].cached_type, Some(session.types.void));
}

/// Boundary case: a single-element tuple collapses to its element in place.
#[test]
fn single_element_tuple_collapses_to_child() {
    cov_mark::check!(single_element_tuple_collapses);
    let mut session = Session::new();
    let scope = session.new_module_scope();
    let i32_ = session.types.get_integer_type(32, true);
    let lit = session.ast.alloc_resolved(Location::unknown(), NodeKind::IntLiteral(7), i32_);
    let tuple = session.ast.alloc_node(Location::unknown(), NodeKind::Tuple(vec![lit]));
    resolve_module(&mut session, scope, &[tuple], DriverConfig::default());
    assert_eq!(session.ast.nodes[tuple].cached_type, Some(i32_));
    assert!(matches!(session.ast.nodes[tuple].kind, NodeKind::IntLiteral(7)));
}

/// Boundary case: a tuple whose every element is a `Type` value denotes an
/// anonymous record *type*, not a tuple value.
#[test]
fn tuple_of_types_denotes_anonymous_record_type() {
    let mut session = Session::new();
    let scope = session.new_module_scope();
    let i32_ = session.types.get_integer_type(32, true);
    let bool_ = session.types.bool_type;
    let t1 = session.ast.alloc_node(Location::unknown(), NodeKind::TypeRef(i32_));
    let t2 = session.ast.alloc_node(Location::unknown(), NodeKind::TypeRef(bool_));
    let tuple = session.ast.alloc_node(Location::unknown(), NodeKind::Tuple(vec![t1, t2]));
    resolve_module(&mut session, scope, &[tuple], DriverConfig::default());
    assert_eq!(session.ast.nodes[tuple].cached_type, Some(session.types.type_type));
    match session.ast.nodes[tuple].kind {
        NodeKind::TypeRef(record_ty) => {
            assert!(matches!(
                session.types.kind(record_ty),
                semcheck::types::TypeKind::AnonymousAggregate { .. }
            ));
        }
        ref other => panic!("expected a TypeRef, got {:?}", other),
    }
}

/// S3: two separate `pair(1, true)`-style call sites share the same
/// hash-consed anonymous record result type.
#[test]
fn s3_anonymous_record_result_is_shared_across_call_sites() {
    let mut session = Session::new();
    let scope = session.new_module_scope();
    let i32_ = session.types.get_integer_type(32, true);
    let bool_ = session.types.bool_type;

    let make_pair_tuple = |session: &mut Session| {
        let a = session.ast.alloc_resolved(Location::unknown(), NodeKind::IntLiteral(1), i32_);
        let b = session.ast.alloc_resolved(Location::unknown(), NodeKind::BoolLiteral(true), bool_);
        session.ast.alloc_node(Location::unknown(), NodeKind::Tuple(vec![a, b]))
    };
    let site1 = make_pair_tuple(&mut session);
    let site2 = make_pair_tuple(&mut session);
    resolve_module(&mut session, scope, &[site1, site2], DriverConfig::default());

    let ty1 = session.ast.nodes[site1].cached_type.unwrap();
    let ty2 = session.ast.nodes[site2].cached_type.unwrap();
    assert_eq!(ty1, ty2);
    assert!(matches!(
        session.types.kind(ty1),
        semcheck::types::TypeKind::AnonymousAggregate { .. }
    ));
}

/// S4: assigning to an immutable, already-initialized variable is rejected.
#[test]
fn s4_reassigning_an_immutable_variable_is_rejected() {
    let mut session = Session::new();
    let scope = session.new_module_scope();
    let i32_ = session.types.get_integer_type(32, true);
    let name = session.interner.intern("y");

    let init = session.ast.alloc_resolved(Location::unknown(), NodeKind::IntLiteral(3), i32_);
    let var = session.ast.variables.alloc(VariableData {
        name,
        owner_scope: scope,
        mutable: false,
        ty: TypeSlot::Resolved(i32_),
        constant_substitute: None,
        initializer: Some(init),
        resolved: true,
        location: Location::unknown(),
    });
    session.scope_tree.try_define(scope, name, PrefixDef::Variable(var));

    let target = session.ast.alloc_resolved(Location::unknown(), NodeKind::VariableRef(var), i32_);
    let value = session.ast.alloc_resolved(Location::unknown(), NodeKind::IntLiteral(4), i32_);
    let reassignment = session.ast.alloc_node(
        Location::unknown(),
        NodeKind::Assignment { target, value, is_init: false },
    );

    resolve_module(&mut session, scope, &[reassignment], DriverConfig::default());

    let found_violation = session.diagnostics.iter().any(|d| {
        matches!(d, Diagnostic::ConstnessViolation { name: n, .. } if *n == name)
    });
    assert!(found_violation, "expected a constness violation diagnostic");
}

/// Declares `def id(x T:_) = x` — a single pattern-typed argument whose
/// wildcard is labeled `T`, with no explicit return type (inferred from the
/// body once specialized).
fn declare_generic_id(session: &mut Session, module_scope: semcheck::scope::ScopeId) -> semcheck::ast::FunctionId {
    let name = session.interner.intern("id");
    let x_name = session.interner.intern("x");
    let t_name = session.interner.intern("T");

    let wildcard = session.ast.alloc_node(Location::unknown(), NodeKind::Wildcard);
    session.ast.set_label(wildcard, t_name);

    let body_scope = session.scope_tree.alloc(Some(module_scope));

    let x_var = session.ast.variables.alloc(VariableData {
        name: x_name,
        owner_scope: body_scope,
        mutable: false,
        ty: TypeSlot::Pattern(wildcard),
        constant_substitute: None,
        initializer: None,
        resolved: false,
        location: Location::unknown(),
    });
    session.scope_tree.try_define(body_scope, x_name, PrefixDef::Variable(x_var));

    let x_arg = session.ast.arguments.alloc(ArgumentData {
        name: x_name,
        ty: TypeSlot::Pattern(wildcard),
        default_value: None,
        location: Location::unknown(),
        resolved: false,
    });

    let body = session.ast.alloc_node(Location::unknown(), NodeKind::VariableRef(x_var));

    let function = session.ast.functions.alloc(FunctionData {
        name,
        owner_scope: module_scope,
        arguments: vec![x_arg],
        return_type: TypeSlot::Unresolved,
        body_scope,
        body: Some(body),
        flags: FunctionFlags::HAS_PATTERN_ARGUMENTS,
        intrinsic: None,
        specializations: Vec::new(),
        specialized_from: None,
        resolved: false,
        location: Location::unknown(),
    });
    session.scope_tree.scopes[body_scope].owner_function = Some(function);
    session.scope_tree.try_define(module_scope, name, PrefixDef::Function(function));
    function
}

fn call_function_ref(session: &Session, call: semcheck::ast::NodeId) -> semcheck::ast::FunctionId {
    match session.ast.nodes[call].kind {
        NodeKind::Call { callee, .. } => match session.ast.nodes[callee].kind {
            NodeKind::FunctionRef(f) => f,
            ref other => panic!("expected a FunctionRef callee, got {:?}", other),
        },
        ref other => panic!("expected a Call, got {:?}", other),
    }
}

/// S2: `def id(x T:_) = x ; id(3) ; id(3)` — the first call deduces `T =
/// int32` from the literal and specializes `id`; the second call, from a
/// scope that can see the first's usage scope, reuses the cached
/// specialization instead of building a second one.
#[test]
fn s2_pattern_deduced_specialization_is_cached() {
    init_log();
    cov_mark::check!(specialization_cache_hit);

    let mut session = Session::new();
    let module_scope = session.new_module_scope();
    declare_generic_id(&mut session, module_scope);

    let i32_ = session.types.get_integer_type(32, true);
    let call1 = build_call(&mut session, module_scope, "id", vec![(NodeKind::IntLiteral(3), i32_)]);
    let call2 = build_call(&mut session, module_scope, "id", vec![(NodeKind::IntLiteral(3), i32_)]);

    let report = resolve_module(&mut session, module_scope, &[call1, call2], DriverConfig::default());
    assert_eq!(report.unresolved_count, 0);

    assert_eq!(session.ast.nodes[call1].cached_type, Some(i32_));
    assert_eq!(session.ast.nodes[call2].cached_type, Some(i32_));

    let specialized1 = call_function_ref(&session, call1);
    let specialized2 = call_function_ref(&session, call2);
    assert_eq!(specialized1, specialized2, "second call should reuse the cached specialization");
    assert_eq!(session.ast.functions[specialized1].arguments.len(), 1);
    let specialized_arg = session.ast.functions[specialized1].arguments[0];
    assert!(matches!(session.ast.arguments[specialized_arg].ty, TypeSlot::Resolved(t) if t == i32_));
}

/// The native half of a `when(c, body) => if c then body`-style macro: it
/// receives its whole argument quoted (spec.md §4.6 step 3 — a macro's
/// single formal parameter is always `Node`-typed, never per-argument
/// quoting) and destructures the wrapped tuple itself. The expansion wraps
/// the condition in a macro-private `guard` binding purely to give hygienic
/// splicing (spec.md §4.6's "no identifier introduced by the expansion may
/// collide with one already in scope at the call site") something concrete
/// to rename.
fn when_macro(session: &mut Session, args: &[ConstValue]) -> Result<ConstValue, String> {
    let quoted = match args.first() {
        Some(ConstValue::Node(n)) => *n,
        _ => return Err("when: expected a quoted argument".to_string()),
    };
    let raw = match session.ast.nodes[quoted].kind {
        NodeKind::NodeReference(inner) => inner,
        ref other => return Err(format!("when: argument was not quoted, got {:?}", other)),
    };
    let (cond, body) = match session.ast.nodes[raw].kind.clone() {
        NodeKind::Tuple(children) if children.len() == 2 => (children[0], children[1]),
        ref other => return Err(format!("when: expected (condition, body), got {:?}", other)),
    };

    let guard_name = session.interner.intern("guard");
    let guard_scope = session.scope_tree.alloc(None);
    let guard_var = session.ast.variables.alloc(VariableData {
        name: guard_name,
        owner_scope: guard_scope,
        mutable: false,
        ty: TypeSlot::Unresolved,
        constant_substitute: None,
        initializer: Some(cond),
        resolved: false,
        location: Location::unknown(),
    });
    let decl = session.ast.alloc_node(Location::unknown(), NodeKind::Variable(guard_var));
    let guard_ref = session.ast.alloc_node(Location::unknown(), NodeKind::VariableRef(guard_var));
    let if_node = session.ast.alloc_node(
        Location::unknown(),
        NodeKind::If { cond: guard_ref, then_branch: body, else_branch: None },
    );
    let block_scope = session.scope_tree.alloc(None);
    let block = session.ast.alloc_node(
        Location::unknown(),
        NodeKind::Block { scope: block_scope, children: vec![decl, if_node] },
    );
    Ok(ConstValue::Node(block))
}

fn declare_print(session: &mut Session, module_scope: semcheck::scope::ScopeId) {
    let i32_ = session.types.get_integer_type(32, true);
    let name = session.interner.intern("print");
    let arg_name = session.interner.intern("v");
    let body_scope = session.scope_tree.alloc(Some(module_scope));
    let arg = session.ast.arguments.alloc(ArgumentData {
        name: arg_name,
        ty: TypeSlot::Resolved(i32_),
        default_value: None,
        location: Location::unknown(),
        resolved: true,
    });
    let function = session.ast.functions.alloc(FunctionData {
        name,
        owner_scope: module_scope,
        arguments: vec![arg],
        return_type: TypeSlot::Resolved(session.types.void),
        body_scope,
        body: None,
        flags: FunctionFlags::empty(),
        intrinsic: None,
        specializations: Vec::new(),
        specialized_from: None,
        resolved: true,
        location: Location::unknown(),
    });
    session.scope_tree.try_define(module_scope, name, PrefixDef::Function(function));
}

fn declare_when(session: &mut Session, module_scope: semcheck::scope::ScopeId) {
    let node_void_ty = session.types.get_node_type(session.types.void);
    let name = session.interner.intern("when");
    let arg_name = session.interner.intern("quoted");
    let body_scope = session.scope_tree.alloc(Some(module_scope));
    let arg = session.ast.arguments.alloc(ArgumentData {
        name: arg_name,
        ty: TypeSlot::Resolved(node_void_ty),
        default_value: None,
        location: Location::unknown(),
        resolved: true,
    });
    let function = session.ast.functions.alloc(FunctionData {
        name,
        owner_scope: module_scope,
        arguments: vec![arg],
        return_type: TypeSlot::Resolved(node_void_ty),
        body_scope,
        body: None,
        flags: FunctionFlags::MACRO,
        intrinsic: Some(IntrinsicBinder { name: "when", implementation: when_macro }),
        specializations: Vec::new(),
        specialized_from: None,
        resolved: true,
        location: Location::unknown(),
    });
    session.scope_tree.try_define(module_scope, name, PrefixDef::Function(function));
}

/// S5: `macro when(c, body) => [> if c then body <]` invoked as
/// `when(true, print(1))` — CTFE produces a quoted `if`, the splice inserts
/// it into the caller's scope with fresh identities for anything it
/// introduces, `true` then folds away and the call to `print(1)` is the only
/// surviving effect.
#[test]
fn s5_macro_mixin_splices_hygienically() {
    init_log();
    cov_mark::check!(macro_splice_renames_introduced_name);

    let mut session = Session::new();
    let module_scope = session.new_module_scope();
    declare_print(&mut session, module_scope);
    declare_when(&mut session, module_scope);

    let cond_raw = session.ast.alloc_node(Location::unknown(), NodeKind::BoolLiteral(true));
    let body_raw = build_call(&mut session, module_scope, "print", vec![(NodeKind::IntLiteral(1), session.types.get_integer_type(32, true))]);
    let raw_tuple = session.ast.alloc_node(Location::unknown(), NodeKind::Tuple(vec![cond_raw, body_raw]));
    let node_void_ty = session.types.get_node_type(session.types.void);

    let call = build_call(&mut session, module_scope, "when", vec![(NodeKind::NodeReference(raw_tuple), node_void_ty)]);

    let report = resolve_module(&mut session, module_scope, &[call], DriverConfig::default());
    assert_eq!(report.unresolved_count, 0);
    assert_eq!(session.ast.nodes[call].cached_type, Some(session.types.void));

    // The call site itself was rewritten into the spliced `if`; its own
    // condition is a *fresh* `guard` variable, never the macro's own
    // `guard_var` allocation (hygiene renamed it on the way in).
    match session.ast.nodes[call].kind {
        NodeKind::Block { ref children, .. } => {
            assert_eq!(children.len(), 2);
            match session.ast.nodes[children[1]].kind {
                NodeKind::If { cond, then_branch, .. } => {
                    assert!(matches!(session.ast.nodes[cond].kind, NodeKind::VariableRef(_)));
                    assert!(matches!(session.ast.nodes[then_branch].kind, NodeKind::Call { .. }));
                }
                ref other => panic!("expected the spliced If, got {:?}", other),
            }
        }
        ref other => panic!("expected the spliced Block, got {:?}", other),
    }
}

/// S6: two same-weight candidates for the same call is an ambiguous overload.
#[test]
fn s6_two_equally_weighted_candidates_is_ambiguous() {
    cov_mark::check!(overload_resolution_ambiguous);
    let mut session = Session::new();
    let module_scope = session.new_module_scope();
    let i32_ = session.types.get_integer_type(32, true);
    let name = session.interner.intern("foo");

    let declare_foo = |session: &mut Session, import_scope: semcheck::scope::ScopeId| {
        let body_scope = session.scope_tree.alloc(Some(import_scope));
        let arg_name = session.interner.intern("x");
        let arg = session.ast.arguments.alloc(ArgumentData {
            name: arg_name,
            ty: TypeSlot::Resolved(i32_),
            default_value: None,
            location: Location::unknown(),
            resolved: true,
        });
        let function = session.ast.functions.alloc(FunctionData {
            name,
            owner_scope: import_scope,
            arguments: vec![arg],
            return_type: TypeSlot::Resolved(i32_),
            body_scope,
            body: None,
            flags: FunctionFlags::empty(),
            intrinsic: None,
            specializations: Vec::new(),
            specialized_from: None,
            resolved: true,
            location: Location::unknown(),
        });
        session.scope_tree.try_define(import_scope, name, PrefixDef::Function(function));
        function
    };

    let import_a = session.scope_tree.alloc(None);
    let import_b = session.scope_tree.alloc(None);
    declare_foo(&mut session, import_a);
    declare_foo(&mut session, import_b);
    session.scope_tree.import(module_scope, import_a, false, false);
    session.scope_tree.import(module_scope, import_b, false, false);

    let arg = session.ast.alloc_resolved(Location::unknown(), NodeKind::IntLiteral(1), i32_);
    let result = semcheck::overload::resolve_call(&mut session, module_scope, name, arg);
    match result {
        Err(semcheck::overload::OverloadError::Ambiguous(candidates)) => {
            assert_eq!(candidates.len(), 2);
        }
        other => panic!("expected an ambiguous overload error, got {:?}", other),
    }
}
