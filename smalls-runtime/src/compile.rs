use std::collections::HashMap;

use smalls_ast::Program;
use smalls_diagnostics::DebugLevel;
use smalls_resolver::Export;

use crate::context::Context;

/// What one module contributed after its AST passed through the three
/// resolver stages: its exports, how many diagnostics were errors, and --
/// governed by the context's [`DebugLevel`] -- either the full resolved
/// tree or nothing (module-global storage holds everything downstream
/// passes still need; the tree itself is tooling-only past this point).
pub struct CompiledModule<'ctx> {
    pub module_name: String,
    pub exports: HashMap<String, Export>,
    pub error_count: usize,
    pub ast: Option<&'ctx Program>,
}

impl<'ctx> CompiledModule<'ctx> {
    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }
}

/// Moves `program` into the context's arena, runs name resolution, type
/// resolution and validation over it, and returns what the module exposes.
///
/// The lexer and parser that would normally turn source text into `program`
/// are external collaborators this core doesn't implement; callers already
/// hold a parsed [`Program`] by the time they reach this entry point.
pub fn compile<'ctx>(program: Program, context: &'ctx mut Context) -> CompiledModule<'ctx> {
    let module_name = program.module_name.clone();
    let stored: &'ctx Program = context.arena.alloc_program(program);

    let analysis = smalls_resolver::resolve_module(
        stored,
        context.interner.clone(),
        context.types.clone(),
        context.limits,
        context.diagnostics_mut(),
    );

    let ast = match context.debug_level {
        DebugLevel::Full => Some(stored),
        DebugLevel::SourceMap | DebugLevel::None => None,
    };

    CompiledModule {
        module_name,
        exports: analysis.exports,
        error_count: analysis.error_count,
        ast,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smalls_ast::{Block, FunctionDecl, Item};
    use smalls_diagnostics::{DiagnosticEngine, Limits, SourceRange};

    fn r() -> SourceRange {
        SourceRange::unknown()
    }

    fn sample_program() -> Program {
        Program {
            module_name: "m".to_string(),
            imports: vec![],
            items: vec![Item::Function(FunctionDecl {
                name: "main".to_string(),
                type_params: vec![],
                params: vec![],
                return_type: None,
                body: Some(Block { statements: vec![], range: r() }),
                is_native: false,
                is_intrinsic: false,
                operator_alias: None,
                range: r(),
            })],
            range: r(),
        }
    }

    #[test]
    fn compile_exposes_top_level_function_as_an_export() {
        let mut context = Context::new(Limits::default(), DebugLevel::Full, Box::new(DiagnosticEngine::new()));
        let module = compile(sample_program(), &mut context);
        assert!(!module.has_errors());
        assert!(module.exports.contains_key("main"));
        assert!(module.ast.is_some());
    }

    #[test]
    fn debug_level_none_discards_the_ast() {
        let mut context = Context::new(Limits::default(), DebugLevel::None, Box::new(DiagnosticEngine::new()));
        let module = compile(sample_program(), &mut context);
        assert!(module.ast.is_none());
    }
}
