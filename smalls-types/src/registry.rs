use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::interner::{InternedString, StringInterner};

/// Dense 32-bit id identifying a type in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl TypeId {
    pub const INVALID: TypeId = TypeId(0);
    pub const BOOL: TypeId = TypeId(1);
    pub const INT: TypeId = TypeId(2);
    pub const FLOAT: TypeId = TypeId(3);
    pub const STRING: TypeId = TypeId(4);
    pub const VOID: TypeId = TypeId(5);
    pub const ANY: TypeId = TypeId(6);
    pub const ANY_ARRAY: TypeId = TypeId(7);
    pub const ANY_MAP: TypeId = TypeId(8);
    pub const MODULE: TypeId = TypeId(9);
    pub const VEC3: TypeId = TypeId(10);

    /// One past the highest reserved well-known id; the registry hands out
    /// fresh ids starting here.
    const FIRST_DYNAMIC: u32 = 11;

    pub fn is_valid(self) -> bool {
        self != TypeId::INVALID
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Primitive,
    Struct,
    Sum,
    Tuple,
    Newtype,
    TypeAlias,
    Opaque,
    Array,
    Map,
    FixedArray,
    Function,
    AnyArray,
    AnyMap,
    Module,
}

/// One slot of a compound or generic type's parameter list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeArg {
    Type(TypeId),
    Size(u64),
}

#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub name: InternedString,
    pub kind: TypeKind,
    pub type_params: Vec<TypeArg>,
    pub size: u32,
    pub align: u32,
    pub contains_heap_refs: bool,
}

#[derive(Debug, Clone)]
pub struct StructField {
    pub name: InternedString,
    pub ty: TypeId,
    pub offset: u32,
}

#[derive(Debug, Clone)]
pub struct StructDef {
    pub fields: Vec<StructField>,
    pub generic_param_count: usize,
    pub is_value_type: bool,
}

#[derive(Debug, Clone)]
pub struct VariantDef {
    pub name: InternedString,
    /// Payloads of two-or-more elements are represented as a tuple type id.
    pub payload: Option<TypeId>,
}

#[derive(Debug, Clone)]
pub struct SumDef {
    pub variants: Vec<VariantDef>,
    pub generic_param_count: usize,
}

/// `operator(name[, commutative])` overload names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    Plus,
    Minus,
    Times,
    Div,
    Eq,
    Lt,
    Str,
    Hash,
}

/// Per-type summary the validator consults for operator-consistency checks.
#[derive(Debug, Clone, Default)]
pub struct OperatorAliasSummary {
    pub has_eq: bool,
    pub has_explicit_eq: bool,
    pub has_lt: bool,
    pub has_hash: bool,
    pub has_str: bool,
}

#[derive(Debug, Clone)]
pub struct ScriptOpBinding {
    pub result_type: TypeId,
    pub module: String,
    pub func_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CompoundKey {
    Array(TypeId),
    FixedArray(TypeId, u64),
    Map(TypeId, TypeId),
    Tuple(Vec<TypeId>),
    Function(Vec<TypeId>, TypeId),
}

#[derive(thiserror::Error, Debug)]
pub enum TypeRegistryError {
    #[error("type id {0:?} was never reserved")]
    UnknownId(TypeId),
    #[error("type id {0:?} is already defined")]
    AlreadyDefined(TypeId),
}

/// Process-wide registry of type ids, canonicalized compound types, and
/// operator-alias metadata. Written only by the resolver passes; read-only
/// once compilation finishes (see the concurrency model in the runtime
/// facade).
pub struct TypeRegistry {
    interner: Arc<StringInterner>,
    descriptors: DashMap<TypeId, TypeDescriptor>,
    by_name: DashMap<InternedString, TypeId>,
    compound_cache: DashMap<CompoundKey, TypeId>,
    instantiation_cache: DashMap<(TypeId, Vec<TypeArg>), TypeId>,
    struct_defs: DashMap<TypeId, StructDef>,
    sum_defs: DashMap<TypeId, SumDef>,
    operator_aliases: DashMap<TypeId, OperatorAliasSummary>,
    binary_ops: DashMap<(OperatorKind, TypeId, TypeId), ScriptOpBinding>,
    unary_ops: DashMap<(OperatorKind, TypeId), ScriptOpBinding>,
    next_id: AtomicU32,
}

impl TypeRegistry {
    pub fn new(interner: Arc<StringInterner>) -> Self {
        let registry = Self {
            interner,
            descriptors: DashMap::new(),
            by_name: DashMap::new(),
            compound_cache: DashMap::new(),
            instantiation_cache: DashMap::new(),
            struct_defs: DashMap::new(),
            sum_defs: DashMap::new(),
            operator_aliases: DashMap::new(),
            binary_ops: DashMap::new(),
            unary_ops: DashMap::new(),
            next_id: AtomicU32::new(TypeId::FIRST_DYNAMIC),
        };
        registry.seed_well_known();
        registry
    }

    fn seed_well_known(&self) {
        let primitives = [
            (TypeId::BOOL, "bool", 1, 1),
            (TypeId::INT, "int", 8, 8),
            (TypeId::FLOAT, "float", 8, 8),
            (TypeId::STRING, "string", 4, 4),
            (TypeId::VOID, "void", 0, 1),
            (TypeId::ANY, "any", 8, 8),
        ];
        for (id, name, size, align) in primitives {
            let interned = self.interner.intern(name);
            self.descriptors.insert(
                id,
                TypeDescriptor {
                    name: interned.clone(),
                    kind: TypeKind::Primitive,
                    type_params: vec![],
                    size,
                    align,
                    contains_heap_refs: id == TypeId::STRING,
                },
            );
            self.by_name.insert(interned, id);
        }
        for (id, name, kind) in [
            (TypeId::ANY_ARRAY, "any_array", TypeKind::AnyArray),
            (TypeId::ANY_MAP, "any_map", TypeKind::AnyMap),
            (TypeId::MODULE, "module", TypeKind::Module),
        ] {
            let interned = self.interner.intern(name);
            self.descriptors.insert(
                id,
                TypeDescriptor {
                    name: interned.clone(),
                    kind,
                    type_params: vec![],
                    size: 4,
                    align: 4,
                    contains_heap_refs: true,
                },
            );
            self.by_name.insert(interned, id);
        }
        let vec3 = self.interner.intern("vec3");
        self.descriptors.insert(
            TypeId::VEC3,
            TypeDescriptor {
                name: vec3.clone(),
                kind: TypeKind::Primitive,
                type_params: vec![],
                size: 12,
                align: 4,
                contains_heap_refs: false,
            },
        );
        self.by_name.insert(vec3, TypeId::VEC3);
    }

    fn fresh_id(&self) -> TypeId {
        TypeId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Pre-declares a slot under `qualified_name`, for use during name
    /// resolution before the declaration's body has been resolved.
    pub fn reserve(&self, qualified_name: &str) -> TypeId {
        let interned = self.interner.intern(qualified_name);
        if let Some(existing) = self.by_name.get(&interned) {
            return *existing;
        }
        let id = self.fresh_id();
        self.by_name.insert(interned, id);
        id
    }

    /// Attaches a descriptor to a previously reserved id.
    pub fn define(&self, type_id: TypeId, descriptor: TypeDescriptor) {
        self.descriptors.insert(type_id, descriptor);
    }

    pub fn define_struct(&self, type_id: TypeId, def: StructDef) {
        self.struct_defs.insert(type_id, def);
    }

    pub fn define_sum(&self, type_id: TypeId, def: SumDef) {
        self.sum_defs.insert(type_id, def);
    }

    pub fn struct_def(&self, type_id: TypeId) -> Option<StructDef> {
        self.struct_defs.get(&type_id).map(|d| d.clone())
    }

    pub fn sum_def(&self, type_id: TypeId) -> Option<SumDef> {
        self.sum_defs.get(&type_id).map(|d| d.clone())
    }

    /// Interned-name lookup. Returns `None` if `name` was never reserved.
    pub fn type_id(&self, name: &str) -> Option<TypeId> {
        let interned = self.interner.intern(name);
        self.by_name.get(&interned).map(|id| *id)
    }

    pub fn descriptor(&self, type_id: TypeId) -> Option<TypeDescriptor> {
        self.descriptors.get(&type_id).map(|d| d.clone())
    }

    pub fn kind_of(&self, type_id: TypeId) -> Option<TypeKind> {
        self.descriptors.get(&type_id).map(|d| d.kind)
    }

    fn intern_compound(&self, key: CompoundKey, kind: TypeKind, params: Vec<TypeArg>) -> TypeId {
        if let Some(existing) = self.compound_cache.get(&key) {
            return *existing;
        }
        let id = self.fresh_id();
        let contains_heap_refs = params.iter().any(|p| match p {
            TypeArg::Type(t) => self.type_contains_heap_refs(*t),
            TypeArg::Size(_) => false,
        });
        self.descriptors.insert(
            id,
            TypeDescriptor {
                name: self.interner.intern(&format!("{:?}", key)),
                kind,
                type_params: params,
                size: 4,
                align: 4,
                contains_heap_refs: contains_heap_refs || matches!(kind, TypeKind::Array | TypeKind::Map),
            },
        );
        self.compound_cache.insert(key, id);
        id
    }

    fn type_contains_heap_refs(&self, id: TypeId) -> bool {
        self.descriptors
            .get(&id)
            .map(|d| d.contains_heap_refs)
            .unwrap_or(false)
    }

    /// Canonicalizes a compound type by kind and parameter list: equal
    /// parameter lists always produce the same id (P2 in the testable
    /// properties).
    pub fn register_compound(&self, kind: TypeKind, params: Vec<TypeArg>) -> TypeId {
        match kind {
            TypeKind::Array => {
                let elem = expect_single_type(&params);
                self.intern_compound(CompoundKey::Array(elem), TypeKind::Array, params)
            }
            TypeKind::FixedArray => {
                let (elem, size) = expect_type_and_size(&params);
                self.intern_compound(
                    CompoundKey::FixedArray(elem, size),
                    TypeKind::FixedArray,
                    params,
                )
            }
            TypeKind::Map => {
                let (key, value) = expect_pair(&params);
                self.intern_compound(CompoundKey::Map(key, value), TypeKind::Map, params)
            }
            TypeKind::Tuple => {
                let elems = expect_types(&params);
                self.intern_compound(CompoundKey::Tuple(elems), TypeKind::Tuple, params)
            }
            other => panic!("register_compound called with non-compound kind {:?}", other),
        }
    }

    pub fn register_function_type(&self, params: Vec<TypeId>, ret: TypeId) -> TypeId {
        let key = CompoundKey::Function(params.clone(), ret);
        let mut args: Vec<TypeArg> = params.into_iter().map(TypeArg::Type).collect();
        args.push(TypeArg::Type(ret));
        self.intern_compound(key, TypeKind::Function, args)
    }

    pub fn register_tuple_type(&self, elems: Vec<TypeId>) -> TypeId {
        self.register_compound(
            TypeKind::Tuple,
            elems.into_iter().map(TypeArg::Type).collect(),
        )
    }

    /// Looks up the cached instantiation of `generic_id` at `args`; if
    /// absent, calls `build` to construct the descriptor, inserts the
    /// result, and caches it under `(generic_id, args)` so that repeated
    /// calls return the same id (P3).
    pub fn get_or_instantiate(
        &self,
        generic_id: TypeId,
        args: Vec<TypeArg>,
        build: impl FnOnce() -> TypeDescriptor,
    ) -> TypeId {
        let key = (generic_id, args);
        if let Some(existing) = self.instantiation_cache.get(&key) {
            return *existing;
        }
        let id = self.fresh_id();
        self.descriptors.insert(id, build());
        self.instantiation_cache.insert(key, id);
        id
    }

    pub fn register_operator_alias_info(&self, type_id: TypeId, op: OperatorKind) {
        let mut summary = self.operator_aliases.entry(type_id).or_default();
        match op {
            OperatorKind::Eq => {
                summary.has_eq = true;
                summary.has_explicit_eq = true;
            }
            OperatorKind::Lt => summary.has_lt = true,
            OperatorKind::Hash => summary.has_hash = true,
            OperatorKind::Str => summary.has_str = true,
            _ => {}
        }
    }

    pub fn operator_alias_summary(&self, type_id: TypeId) -> OperatorAliasSummary {
        self.operator_aliases
            .get(&type_id)
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Every type with at least one explicit operator alias registered.
    /// Used by whole-program consistency checks that can't be scoped to a
    /// single function's owner type.
    pub fn operator_alias_entries(&self) -> Vec<(TypeId, OperatorAliasSummary)> {
        self.operator_aliases
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn register_script_binary_op(
        &self,
        op: OperatorKind,
        lhs: TypeId,
        rhs: TypeId,
        result: TypeId,
        module: &str,
        func_name: &str,
    ) {
        self.binary_ops.insert(
            (op, lhs, rhs),
            ScriptOpBinding {
                result_type: result,
                module: module.to_string(),
                func_name: func_name.to_string(),
            },
        );
    }

    pub fn register_script_unary_op(
        &self,
        op: OperatorKind,
        operand: TypeId,
        result: TypeId,
        module: &str,
        func_name: &str,
    ) {
        self.unary_ops.insert(
            (op, operand),
            ScriptOpBinding {
                result_type: result,
                module: module.to_string(),
                func_name: func_name.to_string(),
            },
        );
    }

    pub fn script_binary_op(&self, op: OperatorKind, lhs: TypeId, rhs: TypeId) -> Option<ScriptOpBinding> {
        self.binary_ops.get(&(op, lhs, rhs)).map(|b| b.clone())
    }

    pub fn script_unary_op(&self, op: OperatorKind, operand: TypeId) -> Option<ScriptOpBinding> {
        self.unary_ops.get(&(op, operand)).map(|b| b.clone())
    }

    /// `is_type_convertible(expected, actual)` per the rules in the data
    /// model: identical ids, any-type wildcards, any-array/any-map
    /// variance, and pointwise function-type convertibility.
    pub fn is_type_convertible(&self, expected: TypeId, actual: TypeId) -> bool {
        if expected == actual {
            return true;
        }
        if expected == TypeId::ANY {
            return true;
        }
        let expected_kind = self.kind_of(expected);
        let actual_kind = self.kind_of(actual);

        if expected == TypeId::ANY_ARRAY
            && matches!(actual_kind, Some(TypeKind::Array) | Some(TypeKind::FixedArray))
        {
            return true;
        }
        if expected == TypeId::ANY_MAP && matches!(actual_kind, Some(TypeKind::Map)) {
            return true;
        }

        match (expected_kind, actual_kind) {
            (Some(TypeKind::Function), Some(TypeKind::Function)) => {
                let expected_desc = self.descriptor(expected);
                let actual_desc = self.descriptor(actual);
                match (expected_desc, actual_desc) {
                    (Some(e), Some(a)) if e.type_params.len() == a.type_params.len() => e
                        .type_params
                        .iter()
                        .zip(a.type_params.iter())
                        .all(|(e, a)| match (e, a) {
                            (TypeArg::Type(e), TypeArg::Type(a)) => {
                                self.is_type_convertible(*e, *a)
                            }
                            _ => false,
                        }),
                    _ => false,
                }
            }
            (Some(TypeKind::Array), Some(TypeKind::Array)) | (Some(TypeKind::Map), Some(TypeKind::Map)) => {
                let expected_desc = self.descriptor(expected);
                match expected_desc {
                    Some(d) => d.type_params.iter().any(|p| matches!(p, TypeArg::Type(t) if *t == TypeId::ANY)),
                    None => false,
                }
            }
            _ => false,
        }
    }
}

fn expect_single_type(params: &[TypeArg]) -> TypeId {
    match params.first() {
        Some(TypeArg::Type(t)) => *t,
        _ => TypeId::INVALID,
    }
}

fn expect_pair(params: &[TypeArg]) -> (TypeId, TypeId) {
    let mut iter = params.iter();
    let key = match iter.next() {
        Some(TypeArg::Type(t)) => *t,
        _ => TypeId::INVALID,
    };
    let value = match iter.next() {
        Some(TypeArg::Type(t)) => *t,
        _ => TypeId::INVALID,
    };
    (key, value)
}

fn expect_type_and_size(params: &[TypeArg]) -> (TypeId, u64) {
    let mut iter = params.iter();
    let elem = match iter.next() {
        Some(TypeArg::Type(t)) => *t,
        _ => TypeId::INVALID,
    };
    let size = match iter.next() {
        Some(TypeArg::Size(n)) => *n,
        _ => 0,
    };
    (elem, size)
}

fn expect_types(params: &[TypeArg]) -> Vec<TypeId> {
    params
        .iter()
        .filter_map(|p| match p {
            TypeArg::Type(t) => Some(*t),
            TypeArg::Size(_) => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_registry() -> TypeRegistry {
        TypeRegistry::new(Arc::new(StringInterner::new()))
    }

    #[test]
    fn well_known_ids_resolve_by_name() {
        let reg = new_registry();
        assert_eq!(reg.type_id("int"), Some(TypeId::INT));
        assert_eq!(reg.type_id("any"), Some(TypeId::ANY));
    }

    #[test]
    fn tuple_canonicalization_is_structural() {
        let reg = new_registry();
        let a = reg.register_tuple_type(vec![TypeId::INT, TypeId::STRING]);
        let b = reg.register_tuple_type(vec![TypeId::INT, TypeId::STRING]);
        assert_eq!(a, b);

        let c = reg.register_tuple_type(vec![TypeId::STRING, TypeId::INT]);
        assert_ne!(a, c);
    }

    #[test]
    fn function_canonicalization_is_structural() {
        let reg = new_registry();
        let a = reg.register_function_type(vec![TypeId::INT, TypeId::INT], TypeId::INT);
        let b = reg.register_function_type(vec![TypeId::INT, TypeId::INT], TypeId::INT);
        assert_eq!(a, b);
    }

    #[test]
    fn generic_instantiation_is_cached() {
        let reg = new_registry();
        let generic = reg.reserve("mod.List");
        let args = vec![TypeArg::Type(TypeId::INT)];

        let a = reg.get_or_instantiate(generic, args.clone(), || TypeDescriptor {
            name: reg_interner_probe(&reg, "mod.List<int>"),
            kind: TypeKind::Sum,
            type_params: vec![TypeArg::Type(TypeId::INT)],
            size: 8,
            align: 8,
            contains_heap_refs: true,
        });
        let mut build_called = false;
        let b = reg.get_or_instantiate(generic, args, || {
            build_called = true;
            unreachable!("cache hit should not rebuild")
        });
        assert_eq!(a, b);
        assert!(!build_called);
    }

    fn reg_interner_probe(reg: &TypeRegistry, name: &str) -> InternedString {
        reg.interner.intern(name)
    }

    #[test]
    fn convertibility_is_reflexive_for_every_well_known_id() {
        let reg = new_registry();
        for id in [
            TypeId::BOOL,
            TypeId::INT,
            TypeId::FLOAT,
            TypeId::STRING,
            TypeId::VOID,
            TypeId::ANY,
        ] {
            assert!(reg.is_type_convertible(id, id));
        }
    }

    #[test]
    fn any_array_accepts_any_array_kind() {
        let reg = new_registry();
        let array_of_int = reg.register_compound(TypeKind::Array, vec![TypeArg::Type(TypeId::INT)]);
        assert!(reg.is_type_convertible(TypeId::ANY_ARRAY, array_of_int));
        assert!(!reg.is_type_convertible(TypeId::ANY_MAP, array_of_int));
    }

    #[test]
    fn operator_alias_registration_tracks_eq_before_lt() {
        let reg = new_registry();
        let point = reg.reserve("mod.Point");
        reg.register_operator_alias_info(point, OperatorKind::Lt);
        let summary = reg.operator_alias_summary(point);
        assert!(summary.has_lt);
        assert!(!summary.has_eq);
    }
}
