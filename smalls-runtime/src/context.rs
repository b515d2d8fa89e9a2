use std::sync::Arc;

use smalls_ast::arena::ScriptArena;
use smalls_diagnostics::{DebugLevel, DiagnosticSink, Limits};
use smalls_types::{StringInterner, TypeRegistry};

/// Everything one compilation session shares across every module it
/// compiles: the interner and type registry (both process-wide and never
/// torn down), the arena owning every parsed AST handed to `compile`, the
/// configured resource limits, how much of the AST to retain after
/// analysis, and where diagnostics go.
pub struct Context {
    pub interner: Arc<StringInterner>,
    pub types: Arc<TypeRegistry>,
    pub arena: ScriptArena,
    pub limits: Limits,
    pub debug_level: DebugLevel,
    diagnostics: Box<dyn DiagnosticSink>,
}

impl Context {
    pub fn new(limits: Limits, debug_level: DebugLevel, diagnostics: Box<dyn DiagnosticSink>) -> Self {
        let interner = Arc::new(StringInterner::new());
        let types = Arc::new(TypeRegistry::new(interner.clone()));
        Self {
            interner,
            types,
            arena: ScriptArena::new(),
            limits,
            debug_level,
            diagnostics,
        }
    }

    pub fn diagnostics_mut(&mut self) -> &mut dyn DiagnosticSink {
        self.diagnostics.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smalls_diagnostics::{DiagnosticEngine, SourceRange};

    #[test]
    fn fresh_context_shares_well_known_types_with_the_registry() {
        let ctx = Context::new(Limits::default(), DebugLevel::Full, Box::new(DiagnosticEngine::new()));
        assert!(ctx.types.type_id("int").is_some());
    }

    #[test]
    fn diagnostics_mut_forwards_to_the_boxed_sink() {
        let mut ctx = Context::new(Limits::default(), DebugLevel::None, Box::new(DiagnosticEngine::new()));
        ctx.diagnostics_mut()
            .semantic_diagnostic("m", "[E0101] test", false, SourceRange::unknown());
    }
}
