//! Facade crate wiring the Smalls language core together: the compile-time
//! [`Context`]/[`compile`] entry points and the mutator-side [`Runtime`]
//! ([`create_runtime`], native module registration).
//!
//! Everything this crate re-exports is implemented in `smalls-ast`,
//! `smalls-diagnostics`, `smalls-types`, `smalls-heap`, `smalls-gc` and
//! `smalls-resolver`; this crate only assembles them into the two entry
//! points an embedder actually calls.

mod compile;
mod context;
mod native;
mod runtime;

pub use compile::{compile, CompiledModule};
pub use context::Context;
pub use native::{NativeFunctionSignature, NativeModule, NativeModuleRegistry};
pub use runtime::{create_runtime, Runtime};

pub use smalls_diagnostics::{DebugLevel, DiagnosticEngine, DiagnosticSink, Limits};
