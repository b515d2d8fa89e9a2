//! Type registry and string interner for the Smalls language core.
//!
//! These are the two leaf components: every other crate in the workspace
//! (heap, collector, resolver) reads type ids and interned names from here,
//! but this crate depends on nothing else in the workspace.

pub mod interner;
pub mod registry;

pub use interner::{InternedString, StringInterner};
pub use registry::{
    OperatorAliasSummary, OperatorKind, ScriptOpBinding, StructDef, StructField, SumDef, TypeArg,
    TypeDescriptor, TypeId, TypeKind, TypeRegistry, TypeRegistryError, VariantDef,
};
