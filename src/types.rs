//! The Type Registry (spec.md §4.1, component C1).
//!
//! Hash-conses structural types (pointers, arrays, function types, anonymous
//! records) so that two constructions with equal arguments produce the exact
//! same [`TypeId`]. Declared types (records, variants, traits) are identified
//! by declaration identity instead: the `TypeId` handed out at declaration
//! time *is* the identity, so no consing is needed for them.
//!
//! Grounded on `hir_ty`'s `Ty`/`TyKind` (see `infer.rs`, `utils.rs`): like the
//! teacher we represent a type as a small tagged enum interned behind an
//! arena, and look identity up through a side-table keyed on a structural
//! fingerprint (the teacher does this implicitly via chalk's interner; we do
//! not need chalk since this language has no unification variables over
//! types — types are either fully known or are patterns, never inference
//! variables, so the Type Registry is pure hash-consing, not unification).

use la_arena::{Arena, Idx};
use rustc_hash::FxHashMap;

use crate::intern::Symbol;

pub type TypeId = Idx<TypeData>;

#[derive(Debug, Clone)]
pub struct TypeData {
    pub kind: TypeKind,
    /// Set once every type this one refers to is itself `Resolved` (spec.md §3.1).
    pub resolved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordField {
    pub name: Option<Symbol>,
    pub ty: TypeId,
    pub is_extending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Void,
    Type,
    Bool,
    Integer { bits: u32, signed: bool },
    Float { bits: u32 },
    Char { bits: u32 },
    /// A user-declared record; identity is the declaration id itself, so two
    /// `Record(id)` values are equal iff `id` is equal — no consing needed.
    Record(crate::ast::RecordId),
    /// A hash-consed anonymous aggregate. `labels[i]` is `Some` iff the
    /// field at position `i` was named; the whole vector is `None` for every
    /// entry for a plain tuple head record (spec.md §4.1).
    AnonymousAggregate { fields: Vec<RecordField>, is_variant: bool },
    Variant(crate::ast::VariantId),
    Trait(crate::ast::TraitId),
    Pointer(TypeId),
    BoundedPointer(TypeId),
    BoundedConstantPointer(TypeId, u64),
    StaticArray(TypeId, u64),
    LinearSequence(TypeId),
    Function { arg: TypeId, ret: TypeId },
    LiteralInt,
    LiteralFloat,
    LiteralChar,
    LiteralString,
    /// The type of a quoted AST fragment (spec.md §3.1, §4.6).
    Node(TypeId),
    /// Placeholder used while a declaration's type is still being computed.
    Error,
}

/// A positive match weight; higher wins in overload resolution (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Weight(pub u32);

pub const WEIGHT_WILDCARD: Weight = Weight(1);
pub const WEIGHT_CONSTRAINED_WILDCARD: Weight = Weight(2);
pub const WEIGHT_LITERAL: Weight = Weight(4);
pub const WEIGHT_SUBTYPE: Weight = Weight(5);
pub const WEIGHT_EXACT: Weight = Weight(6);

/// Structural fingerprint used as the hash-consing key. Declared types never
/// appear here; only the generator/aggregate shapes spec.md §3.1 calls out as
/// hash-consed do.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum StructuralKey {
    Pointer(TypeId),
    BoundedPointer(TypeId),
    BoundedConstantPointer(TypeId, u64),
    StaticArray(TypeId, u64),
    LinearSequence(TypeId),
    Function(TypeId, TypeId),
    Integer(u32, bool),
    Float(u32),
    Char(u32),
    Node(TypeId),
    /// The "head" anonymous record: all fields unlabeled, keyed purely by the
    /// type sequence (spec.md §4.1: "if all field names are null, returns the
    /// unique head record for the field-type sequence").
    AnonymousHead(Vec<TypeId>, bool),
    /// A "sub-record" under a head, keyed by both types and names. This is
    /// the later/canonical `type.cpp` variant per spec.md's Open Questions:
    /// named anonymous records hash on the full (name, type) sequence rather
    /// than being merged with the head by type alone.
    AnonymousNamed(Vec<(Option<Symbol>, TypeId)>, bool),
}

pub struct TypeRegistry {
    arena: Arena<TypeData>,
    structural: FxHashMap<StructuralKey, TypeId>,
    pub void: TypeId,
    pub type_type: TypeId,
    pub bool_type: TypeId,
    pub error: TypeId,
    pub literal_int: TypeId,
    pub literal_float: TypeId,
    pub literal_char: TypeId,
    pub literal_string: TypeId,
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let void = arena.alloc(TypeData { kind: TypeKind::Void, resolved: true });
        let type_type = arena.alloc(TypeData { kind: TypeKind::Type, resolved: true });
        let bool_type = arena.alloc(TypeData { kind: TypeKind::Bool, resolved: true });
        let error = arena.alloc(TypeData { kind: TypeKind::Error, resolved: true });
        let literal_int = arena.alloc(TypeData { kind: TypeKind::LiteralInt, resolved: true });
        let literal_float = arena.alloc(TypeData { kind: TypeKind::LiteralFloat, resolved: true });
        let literal_char = arena.alloc(TypeData { kind: TypeKind::LiteralChar, resolved: true });
        let literal_string = arena.alloc(TypeData { kind: TypeKind::LiteralString, resolved: true });
        TypeRegistry {
            arena,
            structural: FxHashMap::default(),
            void,
            type_type,
            bool_type,
            error,
            literal_int,
            literal_float,
            literal_char,
            literal_string,
        }
    }

    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.arena[id].kind
    }

    pub fn is_resolved(&self, id: TypeId) -> bool {
        self.arena[id].resolved
    }

    fn intern(&mut self, key: StructuralKey, kind: TypeKind, resolved: bool) -> TypeId {
        if let Some(&id) = self.structural.get(&key) {
            return id;
        }
        let id = self.arena.alloc(TypeData { kind, resolved });
        self.structural.insert(key, id);
        id
    }

    pub fn get_integer_type(&mut self, bits: u32, signed: bool) -> TypeId {
        self.intern(
            StructuralKey::Integer(bits, signed),
            TypeKind::Integer { bits, signed },
            true,
        )
    }

    pub fn get_float_type(&mut self, bits: u32) -> TypeId {
        self.intern(StructuralKey::Float(bits), TypeKind::Float { bits }, true)
    }

    pub fn get_char_type(&mut self, bits: u32) -> TypeId {
        self.intern(StructuralKey::Char(bits), TypeKind::Char { bits }, true)
    }

    pub fn get_pointer(&mut self, inner: TypeId) -> TypeId {
        let resolved = self.is_resolved(inner);
        self.intern(StructuralKey::Pointer(inner), TypeKind::Pointer(inner), resolved)
    }

    pub fn get_bounded_pointer(&mut self, inner: TypeId) -> TypeId {
        let resolved = self.is_resolved(inner);
        self.intern(
            StructuralKey::BoundedPointer(inner),
            TypeKind::BoundedPointer(inner),
            resolved,
        )
    }

    pub fn get_bounded_constant_pointer(&mut self, inner: TypeId, n: u64) -> TypeId {
        let resolved = self.is_resolved(inner);
        self.intern(
            StructuralKey::BoundedConstantPointer(inner, n),
            TypeKind::BoundedConstantPointer(inner, n),
            resolved,
        )
    }

    pub fn get_static_array(&mut self, inner: TypeId, n: u64) -> TypeId {
        let resolved = self.is_resolved(inner);
        self.intern(StructuralKey::StaticArray(inner, n), TypeKind::StaticArray(inner, n), resolved)
    }

    pub fn get_linear_sequence(&mut self, inner: TypeId) -> TypeId {
        let resolved = self.is_resolved(inner);
        self.intern(
            StructuralKey::LinearSequence(inner),
            TypeKind::LinearSequence(inner),
            resolved,
        )
    }

    pub fn get_function(&mut self, arg: TypeId, ret: TypeId) -> TypeId {
        let resolved = self.is_resolved(arg) && self.is_resolved(ret);
        self.intern(StructuralKey::Function(arg, ret), TypeKind::Function { arg, ret }, resolved)
    }

    pub fn get_node_type(&mut self, subtype: TypeId) -> TypeId {
        let resolved = self.is_resolved(subtype);
        self.intern(StructuralKey::Node(subtype), TypeKind::Node(subtype), resolved)
    }

    /// spec.md §4.1: anonymous records with >= 2 fields are required; a
    /// 1-field "tuple" collapses to the field itself.
    pub fn get_anonymous_record(&mut self, fields: Vec<RecordField>, is_variant: bool) -> TypeId {
        assert!(!fields.is_empty(), "anonymous record must have at least one field");
        if fields.len() == 1 {
            return fields[0].ty;
        }
        let all_unlabeled = fields.iter().all(|f| f.name.is_none());
        let resolved = fields.iter().all(|f| self.is_resolved(f.ty));
        if all_unlabeled {
            let types: Vec<TypeId> = fields.iter().map(|f| f.ty).collect();
            self.intern(
                StructuralKey::AnonymousHead(types, is_variant),
                TypeKind::AnonymousAggregate { fields, is_variant },
                resolved,
            )
        } else {
            let named: Vec<(Option<Symbol>, TypeId)> =
                fields.iter().map(|f| (f.name, f.ty)).collect();
            self.intern(
                StructuralKey::AnonymousNamed(named, is_variant),
                TypeKind::AnonymousAggregate { fields, is_variant },
                resolved,
            )
        }
    }

    pub fn declare_record(&mut self, id: crate::ast::RecordId) -> TypeId {
        self.arena.alloc(TypeData { kind: TypeKind::Record(id), resolved: false })
    }

    pub fn declare_variant(&mut self, id: crate::ast::VariantId) -> TypeId {
        self.arena.alloc(TypeData { kind: TypeKind::Variant(id), resolved: false })
    }

    pub fn declare_trait(&mut self, id: crate::ast::TraitId) -> TypeId {
        self.arena.alloc(TypeData { kind: TypeKind::Trait(id), resolved: false })
    }

    pub fn mark_resolved(&mut self, id: TypeId) {
        self.arena[id].resolved = true;
    }

    /// Structural subtyping via extender fields: `src` is a record with an
    /// extending field of type `dst` (possibly transitively).
    pub fn has_extender_path(&self, src: TypeId, dst: TypeId) -> bool {
        if src == dst {
            return true;
        }
        if let TypeKind::AnonymousAggregate { fields, .. } = self.kind(src) {
            return fields
                .iter()
                .any(|f| f.is_extending && self.has_extender_path(f.ty, dst));
        }
        false
    }

    /// spec.md §3.1: `canAssignFrom(dst, src, expr)` returns either nothing
    /// (reject) or a replacement expression plus a positive weight. The
    /// actual expression rewriting (literal narrowing, auto-ref, etc.) is the
    /// caller's job (driver.rs); here we only decide identity/subtype/literal
    /// eligibility and the weight it earns.
    pub fn can_assign_from(&self, dst: TypeId, src: TypeId, src_is_literal: bool) -> Option<Weight> {
        if dst == src {
            return Some(WEIGHT_EXACT);
        }
        if src_is_literal && self.literal_convertible(dst, src) {
            return Some(WEIGHT_LITERAL);
        }
        if self.has_extender_path(src, dst) {
            return Some(WEIGHT_SUBTYPE);
        }
        None
    }

    fn literal_convertible(&self, dst: TypeId, src: TypeId) -> bool {
        match (self.kind(dst), self.kind(src)) {
            (TypeKind::Integer { .. }, TypeKind::LiteralInt) => true,
            (TypeKind::Float { .. }, TypeKind::LiteralFloat) => true,
            (TypeKind::Float { .. }, TypeKind::LiteralInt) => true,
            (TypeKind::Char { .. }, TypeKind::LiteralChar) => true,
            (TypeKind::LinearSequence(_), TypeKind::LiteralString) => true,
            (TypeKind::Pointer(_), TypeKind::LiteralString) => true,
            _ => false,
        }
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_types_are_hash_consed() {
        let mut r = TypeRegistry::new();
        let i32_a = r.get_integer_type(32, true);
        let i32_b = r.get_integer_type(32, true);
        assert_eq!(i32_a, i32_b);

        let p1 = r.get_pointer(i32_a);
        let p2 = r.get_pointer(i32_b);
        assert_eq!(p1, p2);

        let i64_ = r.get_integer_type(64, true);
        let p3 = r.get_pointer(i64_);
        assert_ne!(p1, p3);
    }

    #[test]
    fn single_field_anonymous_record_collapses() {
        let mut r = TypeRegistry::new();
        let i32_ = r.get_integer_type(32, true);
        let rec = r.get_anonymous_record(
            vec![RecordField { name: None, ty: i32_, is_extending: false }],
            false,
        );
        assert_eq!(rec, i32_);
    }

    #[test]
    fn two_tuple_constructions_share_identity() {
        let mut r = TypeRegistry::new();
        let i32_ = r.get_integer_type(32, true);
        let bool_ = r.bool_type;
        let mk = |r: &mut TypeRegistry| {
            r.get_anonymous_record(
                vec![
                    RecordField { name: None, ty: i32_, is_extending: false },
                    RecordField { name: None, ty: bool_, is_extending: false },
                ],
                false,
            )
        };
        let a = mk(&mut r);
        let b = mk(&mut r);
        assert_eq!(a, b);
    }

    #[test]
    fn named_and_unlabeled_records_of_same_types_differ() {
        let mut r = TypeRegistry::new();
        let i32_ = r.get_integer_type(32, true);
        let bool_ = r.bool_type;
        let head = r.get_anonymous_record(
            vec![
                RecordField { name: None, ty: i32_, is_extending: false },
                RecordField { name: None, ty: bool_, is_extending: false },
            ],
            false,
        );
        let mut interner = crate::intern::Interner::new();
        let x = interner.intern("x");
        let y = interner.intern("y");
        let named = r.get_anonymous_record(
            vec![
                RecordField { name: Some(x), ty: i32_, is_extending: false },
                RecordField { name: Some(y), ty: bool_, is_extending: false },
            ],
            false,
        );
        assert_ne!(head, named);
    }
}
