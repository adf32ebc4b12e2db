//! The AST (spec.md §3.2, §3.3, component C3).
//!
//! A closed sum type over every node kind, stored in one arena and addressed
//! by [`NodeId`] — the "re-express the virtual visitor as a closed sum type"
//! design note of spec.md §9. Declarations (`Variable`, `Function`, `Record`,
//! ...) are *also* nodes, but their bulk data lives in their own arenas
//! (mirrors `hir_def::data::FunctionData` living apart from the `Expr` arena
//! in `body::Body`) and the `Node` variant just carries the id.

use bitflags::bitflags;
use la_arena::{Arena, Idx};

use crate::intern::Symbol;
use crate::location::Location;
use crate::scope::ScopeId;
use crate::types::TypeId;

pub type NodeId = Idx<NodeData>;
pub type VariableId = Idx<VariableData>;
pub type ArgumentId = Idx<ArgumentData>;
pub type FunctionId = Idx<FunctionData>;
pub type RecordId = Idx<RecordDeclData>;
pub type VariantId = Idx<VariantDeclData>;
pub type TraitId = Idx<TraitDeclData>;
pub type TypeDeclId = Idx<TypeDeclData>;
pub type OverloadSetId = Idx<OverloadSetData>;

bitflags! {
    #[derive(Default)]
    pub struct NodeFlags: u8 {
        const RESOLVED = 1 << 0;
        const CONSTANT = 1 << 1;
    }
}

#[derive(Debug, Clone)]
pub struct NodeData {
    pub location: Location,
    pub flags: NodeFlags,
    pub label: Option<Symbol>,
    pub cached_type: Option<TypeId>,
    pub kind: NodeKind,
}

impl NodeData {
    pub fn is_resolved(&self) -> bool {
        self.flags.contains(NodeFlags::RESOLVED)
    }
    pub fn is_constant(&self) -> bool {
        self.flags.contains(NodeFlags::CONSTANT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOpKind {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerOpKind {
    Address,
    Dereference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlowKind {
    Break,
    Continue,
    Fallthrough,
}

#[derive(Debug, Clone)]
pub struct MatchCase {
    pub pattern: NodeId,
    pub body: NodeId,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    // --- Literals ---
    IntLiteral(i128),
    FloatLiteral(u64), // bit pattern, to keep NodeKind: Eq-free but hashable-free is fine; we never hash nodes
    CharLiteral(char),
    StringLiteral(Symbol),
    BoolLiteral(bool),
    Unit,
    Wildcard,
    Error,

    // --- References ---
    TypeRef(TypeId),
    VariableRef(VariableId),
    FunctionRef(FunctionId),
    ImportedScopeRef(ScopeId),

    // --- Composites ---
    Tuple(Vec<NodeId>),
    Block { scope: ScopeId, children: Vec<NodeId> },
    FieldAccess { obj: NodeId, index: usize },
    Call { callee: NodeId, arg: NodeId },

    // --- Control ---
    If { cond: NodeId, then_branch: NodeId, else_branch: Option<NodeId> },
    Loop { body: NodeId },
    Return(Option<NodeId>),
    Match { scrutinee: NodeId, cases: Vec<MatchCase> },
    ControlFlow(ControlFlowKind),

    // --- Unresolved ---
    UnresolvedSymbol { name: Symbol, lookup_scope: Option<ScopeId> },
    AccessExpression { obj: NodeId, name: Symbol },

    // --- Operators ---
    UnaryOp { kind: UnaryOpKind, operand: NodeId },
    BinaryOp { kind: BinaryOpKind, lhs: NodeId, rhs: NodeId },
    PointerOp { kind: PointerOpKind, operand: NodeId },
    Assignment { target: NodeId, value: NodeId, is_init: bool },
    Cast { expr: NodeId, ty: NodeId },

    // --- Quotation ---
    NodeReference(NodeId),

    // --- Declarations (also nodes) ---
    Variable(VariableId),
    Argument(ArgumentId),
    Function(FunctionId),
    Record(RecordId),
    Variant(VariantId),
    Trait(TraitId),
    TypeDeclaration(TypeDeclId),
    PrefixMacro(FunctionId),
    InfixMacro(FunctionId),
    Overloadset(OverloadSetId),
}

/// A variable's or argument's declared type: either not yet known, a pattern
/// subtree to be matched by C4, or a fully resolved type (spec.md §3.3, §4.3).
#[derive(Debug, Clone, Copy)]
pub enum TypeSlot {
    Unresolved,
    Pattern(NodeId),
    Resolved(TypeId),
}

impl TypeSlot {
    pub fn resolved(&self) -> Option<TypeId> {
        match self {
            TypeSlot::Resolved(t) => Some(*t),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VariableData {
    pub name: Symbol,
    pub owner_scope: ScopeId,
    pub mutable: bool,
    pub ty: TypeSlot,
    /// Bound by the pattern matcher (spec.md §4.3): "introducedDefinitions are
    /// added into the target scope as immutable variables whose constant
    /// substitute is the bound type reference."
    pub constant_substitute: Option<TypeId>,
    pub initializer: Option<NodeId>,
    pub resolved: bool,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub struct ArgumentData {
    pub name: Symbol,
    pub ty: TypeSlot,
    pub default_value: Option<NodeId>,
    pub location: Location,
    /// True once this argument's type pattern has bound its introduced names
    /// (the names live in the callee's body scope, spec.md §4.3).
    pub resolved: bool,
}

bitflags! {
    #[derive(Default)]
    pub struct FunctionFlags: u16 {
        const MACRO = 1 << 0;
        const TYPE_GENERATOR = 1 << 1;
        const CONSTRAINT = 1 << 2;
        const FIELD_ACCESS = 1 << 3;
        const INTRINSIC = 1 << 4;
        const PURE = 1 << 5;
        const CONTAINS_RETURN = 1 << 6;
        const HAS_EXPANDABLE_ARGUMENTS = 1 << 7;
        const HAS_PATTERN_ARGUMENTS = 1 << 8;
        /// Later `evaluate.cpp` guard (spec.md's Open Questions, resolved in
        /// SPEC_FULL.md §3): an intrinsic marked this way is never folded by
        /// CTFE even on constant arguments, only interpreted inline.
        const INTERPRET_ONLY_INSIDE = 1 << 9;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpecializationKey {
    pub pattern_bindings: Vec<(Symbol, TypeId)>,
    pub expanded_args: Vec<(Symbol, TypeId)>,
}

#[derive(Debug, Clone)]
pub struct SpecializationEntry {
    pub key: SpecializationKey,
    pub usage_scope: ScopeId,
    pub specialized: FunctionId,
}

#[derive(Debug, Clone)]
pub struct FunctionData {
    pub name: Symbol,
    /// Scope the function is declared *in* (used for lookup of the function
    /// itself and for specialization's "declaration scope" import, spec.md
    /// §4.5 step 3).
    pub owner_scope: ScopeId,
    pub arguments: Vec<ArgumentId>,
    pub return_type: TypeSlot,
    /// The function's own body scope, which owns `arguments` (spec.md §3.4:
    /// cyclic ownership broken by non-owning child→parent links).
    pub body_scope: ScopeId,
    pub body: Option<NodeId>,
    pub flags: FunctionFlags,
    pub intrinsic: Option<crate::ctfe::IntrinsicBinder>,
    pub specializations: Vec<SpecializationEntry>,
    /// `None` for an original (non-specialized) function.
    pub specialized_from: Option<FunctionId>,
    pub resolved: bool,
    pub location: Location,
}

impl FunctionData {
    pub fn is_macro(&self) -> bool {
        self.flags.contains(FunctionFlags::MACRO)
    }
    pub fn is_pure(&self) -> bool {
        self.flags.contains(FunctionFlags::PURE)
    }
    pub fn is_intrinsic(&self) -> bool {
        self.flags.contains(FunctionFlags::INTRINSIC)
    }
    pub fn needs_specialization(&self) -> bool {
        self.flags.intersects(
            FunctionFlags::HAS_EXPANDABLE_ARGUMENTS | FunctionFlags::HAS_PATTERN_ARGUMENTS,
        )
    }
}

#[derive(Debug, Clone)]
pub struct RecordField {
    pub name: Option<Symbol>,
    pub ty: TypeSlot,
    pub is_extending: bool,
    pub initializer: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct RecordDeclData {
    pub name: Option<Symbol>,
    pub fields: Vec<RecordField>,
    pub owner_scope: ScopeId,
    pub self_type: Option<TypeId>,
    pub resolved: bool,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub struct VariantCase {
    pub name: Symbol,
    pub ty: Option<TypeSlot>,
}

#[derive(Debug, Clone)]
pub struct VariantDeclData {
    pub name: Option<Symbol>,
    pub cases: Vec<VariantCase>,
    pub owner_scope: ScopeId,
    pub self_type: Option<TypeId>,
    pub resolved: bool,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub struct TraitDeclData {
    pub name: Option<Symbol>,
    pub methods: Vec<FunctionId>,
    pub owner_scope: ScopeId,
    pub self_type: Option<TypeId>,
    pub resolved: bool,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub struct TypeDeclData {
    pub name: Symbol,
    pub owner_scope: ScopeId,
    pub aliased: TypeSlot,
    pub resolved: bool,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub struct OverloadSetData {
    pub name: Symbol,
    pub owner_scope: ScopeId,
    pub functions: Vec<FunctionId>,
}

/// Owns every AST node and declaration arena. One `Ast` per compilation
/// (spec.md §3.4: "The AST is a tree of uniquely-owned nodes; declarations
/// are owned by their enclosing scope" — here the scope only holds ids, the
/// arenas hold the data, exactly as `hir_def`'s per-kind arenas do).
#[derive(Default)]
pub struct Ast {
    pub nodes: Arena<NodeData>,
    pub variables: Arena<VariableData>,
    pub arguments: Arena<ArgumentData>,
    pub functions: Arena<FunctionData>,
    pub records: Arena<RecordDeclData>,
    pub variants: Arena<VariantDeclData>,
    pub traits: Arena<TraitDeclData>,
    pub type_decls: Arena<TypeDeclData>,
    pub overload_sets: Arena<OverloadSetData>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_node(&mut self, location: Location, kind: NodeKind) -> NodeId {
        self.nodes.alloc(NodeData {
            location,
            flags: NodeFlags::empty(),
            label: None,
            cached_type: None,
            kind,
        })
    }

    pub fn alloc_resolved(&mut self, location: Location, kind: NodeKind, ty: TypeId) -> NodeId {
        self.nodes.alloc(NodeData {
            location,
            flags: NodeFlags::RESOLVED,
            label: None,
            cached_type: Some(ty),
            kind,
        })
    }

    pub fn mark_resolved(&mut self, id: NodeId) {
        self.nodes[id].flags.insert(NodeFlags::RESOLVED);
    }

    pub fn mark_constant(&mut self, id: NodeId) {
        self.nodes[id].flags.insert(NodeFlags::CONSTANT);
    }

    pub fn is_resolved(&self, id: NodeId) -> bool {
        self.nodes[id].is_resolved()
    }

    pub fn set_label(&mut self, id: NodeId, label: Symbol) {
        self.nodes[id].label = Some(label);
    }

    /// Copies `source`'s data into `target`'s slot, preserving `target`'s
    /// identity for anything that already references it (spec.md §3.5: "A
    /// replacement transfers ownership: the returned node supersedes the
    /// input"; we implement that by overwriting in place instead of
    /// returning a new id, so parent pointers never need to be patched).
    pub fn replace_in_place(&mut self, target: NodeId, source: NodeId) {
        let data = self.nodes[source].clone();
        self.nodes[target] = data;
    }

    pub fn duplicate_node(&mut self, id: NodeId) -> NodeData {
        self.nodes[id].clone()
    }
}
