use std::collections::HashMap;
use std::sync::Arc;

use smalls_diagnostics::{DiagnosticSink, Limits, SourceRange};
use smalls_types::{StringInterner, TypeId, TypeRegistry};

use crate::environment::Environment;

/// One free variable a lambda reaches into an enclosing scope for.
/// `declaring_depth` is the environment frame index the name was declared
/// in; `is_upvalue_of_parent` is set when the capturing lambda is itself
/// nested inside another lambda that also has to forward the same name.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureInfo {
    pub name: String,
    pub declaring_depth: usize,
    pub is_upvalue_of_parent: bool,
}

/// Shared, mutable state threaded through the name resolver, type resolver
/// and validator passes for one compilation unit. Not `Sync` -- passes run
/// one after another over a single-mutator pipeline, never concurrently.
pub struct ResolutionContext<'a> {
    pub module_name: String,
    pub interner: Arc<StringInterner>,
    pub types: Arc<TypeRegistry>,
    pub env: Environment,
    pub limits: Limits,
    pub const_ints: HashMap<String, i64>,
    pub type_instantiation_count: usize,
    /// Resolved `(param_types, return_type)` for every function seen so
    /// far, keyed by both its bare and module-qualified name.
    pub function_sigs: HashMap<String, (Vec<TypeId>, TypeId)>,
    /// Captures recorded per lambda literal (keyed by its own range) during
    /// the type resolver's bodies pass.
    lambda_captures: Vec<(SourceRange, Vec<CaptureInfo>)>,
    diagnostics: &'a mut dyn DiagnosticSink,
    error_count: usize,
}

impl<'a> ResolutionContext<'a> {
    pub fn new(
        module_name: impl Into<String>,
        interner: Arc<StringInterner>,
        types: Arc<TypeRegistry>,
        limits: Limits,
        diagnostics: &'a mut dyn DiagnosticSink,
    ) -> Self {
        Self {
            module_name: module_name.into(),
            interner,
            types,
            env: Environment::new(),
            limits,
            const_ints: HashMap::new(),
            type_instantiation_count: 0,
            function_sigs: HashMap::new(),
            lambda_captures: Vec::new(),
            diagnostics,
            error_count: 0,
        }
    }

    /// Records `capture` against the lambda at `lambda_range`, deduplicating
    /// by name -- an identifier referenced more than once inside the same
    /// lambda is still one capture.
    pub fn record_lambda_capture(&mut self, lambda_range: SourceRange, capture: CaptureInfo) {
        match self.lambda_captures.iter_mut().find(|(r, _)| *r == lambda_range) {
            Some((_, captures)) => {
                if !captures.iter().any(|c| c.name == capture.name) {
                    captures.push(capture);
                }
            }
            None => self.lambda_captures.push((lambda_range, vec![capture])),
        }
    }

    pub fn lambda_captures(&self, lambda_range: SourceRange) -> &[CaptureInfo] {
        self.lambda_captures
            .iter()
            .find(|(r, _)| *r == lambda_range)
            .map(|(_, c)| c.as_slice())
            .unwrap_or(&[])
    }

    pub fn error(&mut self, code: &str, range: SourceRange, message: impl AsRef<str>) {
        self.error_count += 1;
        let module_name = self.module_name.clone();
        self.diagnostics.semantic_diagnostic(
            &module_name,
            &format!("[{}] {}", code, message.as_ref()),
            false,
            range,
        );
    }

    pub fn warn(&mut self, code: &str, range: SourceRange, message: impl AsRef<str>) {
        let module_name = self.module_name.clone();
        self.diagnostics.semantic_diagnostic(
            &module_name,
            &format!("[{}] {}", code, message.as_ref()),
            true,
            range,
        );
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Suggestion list for an unresolved name, drawn from everything
    /// currently in scope.
    pub fn suggest_names(&self, target: &str) -> Vec<String> {
        smalls_diagnostics::fuzzy::nearest_by_edit_distance(target, &self.env.visible_names(), 3, 3)
    }

    /// Checks a generic instantiation against the configured limit (0 means
    /// unlimited), bumping the counter either way.
    pub fn check_type_instantiation_limit(&mut self, range: SourceRange) -> bool {
        self.type_instantiation_count += 1;
        if self.limits.max_type_instantiations != 0
            && self.type_instantiation_count > self.limits.max_type_instantiations
        {
            self.error(
                smalls_diagnostics::error_codes::TYPE_INSTANTIATION_LIMIT_EXCEEDED,
                range,
                "too many generic type instantiations in this module",
            );
            return false;
        }
        true
    }

    pub fn resolve_type_by_name(&self, name: &str) -> Option<TypeId> {
        self.types.type_id(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smalls_diagnostics::DiagnosticSink as _;

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

    #[test]
    fn error_increments_count_and_forwards_to_sink() {
        let mut sink = CollectingSink { messages: vec![] };
        let interner = Arc::new(StringInterner::new());
        let types = Arc::new(TypeRegistry::new(interner.clone()));
        let mut ctx = ResolutionContext::new("m", interner, types, Limits::default(), &mut sink);
        ctx.error("E0101", SourceRange::unknown(), "cannot find `x`");
        assert_eq!(ctx.error_count(), 1);
        assert!(ctx.has_errors());
        drop(ctx);
        assert_eq!(sink.messages.len(), 1);
        assert!(sink.messages[0].contains("E0101"));
    }
}
