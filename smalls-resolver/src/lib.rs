//! Semantic analysis for the Smalls language core: binds names, resolves
//! types, and validates control-flow/operator/switch invariants over an
//! already-parsed [`smalls_ast::Program`].
//!
//! The three passes run in a fixed order -- [`NameResolver`] before
//! [`TypeResolver`] before [`Validator`] -- because each later pass assumes
//! the invariants the earlier one established (every name reachable before
//! types are resolved, every type resolved before control-flow shapes are
//! checked against them). [`resolve_module`] runs all three and hands back
//! whatever the [`ResolutionContext`] accumulated.

pub mod config_arena;
pub mod const_eval;
pub mod context;
pub mod environment;
pub mod name_resolver;
pub mod type_resolver;
pub mod validator;

use std::collections::HashMap;
use std::sync::Arc;

use smalls_ast::Program;
use smalls_diagnostics::{DiagnosticSink, Limits};
use smalls_types::{StringInterner, TypeRegistry};

pub use config_arena::ConfigArena;
pub use const_eval::ConstEvaluator;
pub use context::{CaptureInfo, ResolutionContext};
pub use environment::{Environment, Export};
pub use name_resolver::NameResolver;
pub use type_resolver::TypeResolver;
pub use validator::Validator;

/// What a module contributes to the rest of the runtime once analysis
/// finishes: every top-level name other modules are allowed to import, and
/// how many errors were reported along the way.
pub struct ModuleAnalysis {
    pub error_count: usize,
    pub exports: HashMap<String, Export>,
}

/// Runs name resolution, type resolution and validation over `program` in
/// one call.
pub fn resolve_module(
    program: &Program,
    interner: Arc<StringInterner>,
    types: Arc<TypeRegistry>,
    limits: Limits,
    diagnostics: &mut dyn DiagnosticSink,
) -> ModuleAnalysis {
    log::debug!("resolving module `{}`", program.module_name);
    let mut ctx = ResolutionContext::new(program.module_name.clone(), interner, types, limits, diagnostics);

    NameResolver::new(&mut ctx).resolve_program(program);
    TypeResolver::new(&mut ctx).resolve_program(program);
    Validator::new(&mut ctx).validate_program(program);

    let error_count = ctx.error_count();
    if error_count > 0 {
        log::warn!("module `{}` resolved with {error_count} error(s)", program.module_name);
    } else {
        log::debug!("module `{}` resolved cleanly", program.module_name);
    }

    ModuleAnalysis {
        error_count,
        exports: ctx.env.snapshot(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smalls_ast::{FunctionDecl, Item};
    use smalls_diagnostics::SourceRange;

    struct CollectingSink {
        messages: Vec<String>,
    }
    impl DiagnosticSink for CollectingSink {
        fn lexical_diagnostic(&mut self, _s: &str, _m: &str, _w: bool, _r: SourceRange) {}
        fn parse_diagnostic(&mut self, _s: &str, _m: &str, _w: bool, _r: SourceRange) {}
        fn semantic_diagnostic(&mut self, _script: &str, message: &str, _is_warning: bool, _range: SourceRange) {
            self.messages.push(message.to_string());
        }
    }

    fn r() -> SourceRange {
        SourceRange::unknown()
    }

    #[test]
    fn clean_program_resolves_with_no_errors() {
        let interner = Arc::new(StringInterner::new());
        let types = Arc::new(TypeRegistry::new(interner.clone()));
        let mut sink = CollectingSink { messages: vec![] };

        let program = Program {
            module_name: "m".to_string(),
            imports: vec![],
            items: vec![Item::Function(FunctionDecl {
                name: "main".to_string(),
                type_params: vec![],
                params: vec![],
                return_type: None,
                body: Some(smalls_ast::Block { statements: vec![], range: r() }),
                is_native: false,
                is_intrinsic: false,
                operator_alias: None,
                range: r(),
            })],
            range: r(),
        };

        let analysis = resolve_module(&program, interner, types, Limits::default(), &mut sink);
        assert_eq!(analysis.error_count, 0);
        assert!(sink.messages.is_empty());
        assert!(analysis.exports.contains_key("main"));
    }

    #[test]
    fn undefined_reference_is_reported_end_to_end() {
        let interner = Arc::new(StringInterner::new());
        let types = Arc::new(TypeRegistry::new(interner.clone()));
        let mut sink = CollectingSink { messages: vec![] };

        let program = Program {
            module_name: "m".to_string(),
            imports: vec![],
            items: vec![Item::Function(FunctionDecl {
                name: "main".to_string(),
                type_params: vec![],
                params: vec![],
                return_type: None,
                body: Some(smalls_ast::Block {
                    statements: vec![smalls_ast::Statement::Expr(smalls_ast::ExprStatement {
                        expr: smalls_ast::Expression::Identifier { name: "missing".to_string(), range: r() },
                        range: r(),
                    })],
                    range: r(),
                }),
                is_native: false,
                is_intrinsic: false,
                operator_alias: None,
                range: r(),
            })],
            range: r(),
        };

        let analysis = resolve_module(&program, interner, types, Limits::default(), &mut sink);
        assert_eq!(analysis.error_count, 1);
        assert!(sink.messages[0].contains("E0101"));
    }
}
