use std::collections::HashSet;

use smalls_ast::{
    Block, Expression, FunctionDecl, Item, JumpStatement, Program, Statement, SwitchLabel,
    SwitchStatement, TypeExpr,
};
use smalls_diagnostics::{error_codes, SourceRange};
use smalls_types::{TypeId, TypeKind};

use crate::context::ResolutionContext;

/// Pass 3: structural checks that need the shapes resolved by the previous
/// two passes but no data-flow analysis -- jump placement, switch
/// exhaustiveness/duplication, map key types, and operator-overload
/// consistency.
pub struct Validator<'ctx, 'a> {
    ctx: &'ctx mut ResolutionContext<'a>,
    loop_depth: u32,
    switch_depth: u32,
    function_depth: u32,
}

impl<'ctx, 'a> Validator<'ctx, 'a> {
    pub fn new(ctx: &'ctx mut ResolutionContext<'a>) -> Self {
        Self {
            ctx,
            loop_depth: 0,
            switch_depth: 0,
            function_depth: 0,
        }
    }

    pub fn validate_program(&mut self, program: &Program) {
        for item in &program.items {
            self.validate_item(item);
        }
        self.validate_operator_consistency();
    }

    fn validate_item(&mut self, item: &Item) {
        match item {
            Item::Function(f) => {
                self.function_depth += 1;
                if let Some(body) = &f.body {
                    for stmt in &body.statements {
                        self.validate_statement(stmt);
                    }
                }
                self.function_depth -= 1;
                self.validate_return_coverage(f);
            }
            Item::Var(v) => {
                if let Some(ty) = &v.ty {
                    self.validate_type_expr(ty);
                }
            }
            Item::DeclList(list) => {
                for decl in &list.decls {
                    if let Some(ty) = &decl.ty {
                        self.validate_type_expr(ty);
                    }
                }
            }
            Item::Struct(_) | Item::Sum(_) | Item::TypeAlias(_) | Item::Newtype(_) | Item::Opaque(_) => {}
        }
    }

    /// Every type with an explicit `hash` or `lt` alias must also define
    /// `==` -- checked once over the whole registry rather than per
    /// function, since the condition depends on a type's full set of
    /// overloads, not on whichever overload happens to be visited first.
    fn validate_operator_consistency(&mut self) {
        for (type_id, summary) in self.ctx.types.operator_alias_entries() {
            if (summary.has_hash || summary.has_lt) && !summary.has_eq {
                let name = self
                    .ctx
                    .types
                    .descriptor(type_id)
                    .map(|d| d.name.to_string())
                    .unwrap_or_else(|| "<unknown>".to_string());
                self.ctx.error(
                    error_codes::OPERATOR_CONSISTENCY,
                    SourceRange::unknown(),
                    format!("type `{}` overloads `hash` or `lt` without also overloading `==`", name),
                );
            }
        }
    }

    /// Spec's return coverage rule: a non-void function's body must
    /// terminate in `return` along every control-flow path.
    fn validate_return_coverage(&mut self, f: &FunctionDecl) {
        if f.return_type.is_none() {
            return;
        }
        let Some(body) = &f.body else { return };
        if !self.block_always_returns(body) {
            self.ctx.error(
                error_codes::MISSING_RETURN,
                f.range,
                format!("function `{}` does not return on every path", f.name),
            );
        }
    }

    fn block_always_returns(&self, block: &Block) -> bool {
        block.statements.iter().any(|s| self.stmt_always_returns(s))
    }

    fn stmt_always_returns(&self, stmt: &Statement) -> bool {
        match stmt {
            Statement::Jump(JumpStatement::Return { .. }) => true,
            Statement::Block(b) => self.block_always_returns(b),
            Statement::If(s) => match &s.else_branch {
                Some(else_branch) => {
                    self.stmt_always_returns(&s.then_branch) && self.stmt_always_returns(else_branch)
                }
                None => false,
            },
            Statement::Switch(s) => self.switch_always_returns(s),
            // A loop may execute zero times, so its body never guarantees a return.
            Statement::For(_) | Statement::ForEach(_) => false,
            Statement::Jump(_) | Statement::Expr(_) | Statement::Decl(_) | Statement::Empty(_) => false,
        }
    }

    /// A switch closes a path only if every case body returns and either a
    /// `default` arm also returns, or the cases exhaust every variant of a
    /// sum-typed scrutinee.
    fn switch_always_returns(&self, s: &SwitchStatement) -> bool {
        if s.cases.is_empty() {
            return false;
        }
        if !s.cases.iter().all(|case| self.block_always_returns(&case.body)) {
            return false;
        }
        if let Some(default) = &s.default {
            return self.block_always_returns(default);
        }
        let Some(sum_type) = self.scrutinee_sum_type(s) else {
            return false;
        };
        let Some(def) = self.ctx.types.sum_def(sum_type) else {
            return false;
        };
        let covered: HashSet<&str> = s
            .cases
            .iter()
            .filter_map(|case| match &case.label {
                SwitchLabel::Variant { variant_name, .. } => Some(variant_name.as_str()),
                SwitchLabel::Literal(_) => None,
            })
            .collect();
        def.variants.iter().all(|v| covered.contains(v.name.as_str()))
    }

    fn ctx_type_of(&self, texpr: &TypeExpr) -> TypeId {
        match texpr {
            TypeExpr::Named { name, .. } => self.ctx.resolve_type_by_name(name).unwrap_or(TypeId::INVALID),
            _ => TypeId::INVALID,
        }
    }

    fn validate_type_expr(&mut self, texpr: &TypeExpr) {
        if let TypeExpr::Map { key, range, .. } = texpr {
            let key_id = self.ctx_type_of(key);
            if !self.is_valid_map_key(key_id) {
                self.ctx.error(
                    error_codes::INVALID_MAP_KEY_TYPE,
                    *range,
                    "map keys must be int, string, or a newtype over one of those",
                );
            }
            self.validate_type_expr(key);
            self.validate_type_expr(&texpr_value(texpr));
        }
    }

    /// Map-key admissibility deliberately excludes user `hash`-overloading
    /// types: only the runtime's intrinsic int/string hash is trusted for
    /// key stability, so a newtype is only valid if its underlying type
    /// bottoms out at int or string.
    fn is_valid_map_key(&self, type_id: TypeId) -> bool {
        if type_id == TypeId::INT || type_id == TypeId::STRING {
            return true;
        }
        match self.ctx.types.descriptor(type_id) {
            Some(d) if d.kind == TypeKind::Newtype => match d.type_params.first() {
                Some(smalls_types::TypeArg::Type(underlying)) => self.is_valid_map_key(*underlying),
                _ => false,
            },
            _ => false,
        }
    }

    fn validate_statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Block(b) => {
                for s in &b.statements {
                    self.validate_statement(s);
                }
            }
            Statement::If(s) => {
                self.validate_statement(&s.then_branch);
                if let Some(e) = &s.else_branch {
                    self.validate_statement(e);
                }
            }
            Statement::For(s) => {
                self.loop_depth += 1;
                self.validate_statement(&s.body);
                self.loop_depth -= 1;
            }
            Statement::ForEach(s) => {
                self.loop_depth += 1;
                self.validate_statement(&s.body);
                self.loop_depth -= 1;
            }
            Statement::Switch(s) => {
                self.switch_depth += 1;
                self.validate_switch(s);
                for case in &s.cases {
                    for stmt in &case.body.statements {
                        self.validate_statement(stmt);
                    }
                }
                if let Some(default) = &s.default {
                    for stmt in &default.statements {
                        self.validate_statement(stmt);
                    }
                }
                self.switch_depth -= 1;
            }
            Statement::Jump(j) => self.validate_jump(j),
            Statement::Decl(item) => self.validate_item(item),
            Statement::Expr(_) | Statement::Empty(_) => {}
        }
    }

    fn validate_jump(&mut self, jump: &JumpStatement) {
        match jump {
            JumpStatement::Break(range) | JumpStatement::Continue(range) => {
                if self.loop_depth == 0 && self.switch_depth == 0 {
                    self.ctx.error(
                        error_codes::BREAK_OUTSIDE_LOOP,
                        *range,
                        "`break`/`continue` outside of a loop or switch",
                    );
                }
            }
            JumpStatement::Return { range, .. } => {
                if self.function_depth == 0 {
                    self.ctx.error(
                        error_codes::RETURN_OUTSIDE_FUNCTION,
                        *range,
                        "`return` outside of a function body",
                    );
                }
            }
        }
    }

    /// Checks duplicate `case` labels unconditionally, and sum-type variant
    /// exhaustiveness when the scrutinee's type is a known sum with no
    /// `default` arm.
    fn validate_switch(&mut self, s: &SwitchStatement) {
        let mut seen_literals: HashSet<String> = HashSet::new();
        let mut seen_variants: HashSet<String> = HashSet::new();
        for case in &s.cases {
            match &case.label {
                SwitchLabel::Literal(exprs) => {
                    for expr in exprs {
                        let key = literal_key(expr);
                        if let Some(key) = key {
                            if !seen_literals.insert(key.clone()) {
                                self.ctx.error(
                                    error_codes::DUPLICATE_CASE_LABEL,
                                    case.range,
                                    format!("duplicate case label `{}`", key),
                                );
                            }
                        }
                    }
                }
                SwitchLabel::Variant { variant_name, .. } => {
                    if !seen_variants.insert(variant_name.clone()) {
                        self.ctx.error(
                            error_codes::DUPLICATE_CASE_LABEL,
                            case.range,
                            format!("duplicate case label `.{}`", variant_name),
                        );
                    }
                }
            }
        }

        if s.default.is_some() || seen_variants.is_empty() {
            return;
        }
        if let Some(sum_type) = self.scrutinee_sum_type(s) {
            if let Some(def) = self.ctx.types.sum_def(sum_type) {
                let covered: HashSet<&str> = seen_variants.iter().map(|s| s.as_str()).collect();
                let missing: Vec<String> = def
                    .variants
                    .iter()
                    .map(|v| v.name.as_str().to_string())
                    .filter(|name| !covered.contains(name.as_str()))
                    .collect();
                if !missing.is_empty() {
                    self.ctx.error(
                        error_codes::NON_EXHAUSTIVE_SWITCH,
                        s.range,
                        format!("non-exhaustive switch, missing variant(s): {}", missing.join(", ")),
                    );
                }
            }
        }
    }

    fn scrutinee_sum_type(&self, s: &SwitchStatement) -> Option<TypeId> {
        if let Expression::Identifier { name, .. } = &s.scrutinee {
            let type_id = self.ctx.env.resolve(name)?.type_id;
            if self.ctx.types.kind_of(type_id) == Some(TypeKind::Sum) {
                return Some(type_id);
            }
        }
        None
    }
}

fn texpr_value(texpr: &TypeExpr) -> TypeExpr {
    match texpr {
        TypeExpr::Map { value, .. } => (**value).clone(),
        other => other.clone(),
    }
}

fn literal_key(expr: &Expression) -> Option<String> {
    match expr {
        Expression::Literal(lit, _) => Some(format!("{:?}", lit)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smalls_ast::Block;
    use smalls_diagnostics::{DiagnosticSink, Limits, SourceRange};
    use smalls_types::{OperatorKind as Op, StringInterner, StructField, SumDef, TypeRegistry, VariantDef};
    use std::sync::Arc;

    struct NullSink;
    impl DiagnosticSink for NullSink {
        fn lexical_diagnostic(&mut self, _s: &str, _m: &str, _w: bool, _r: SourceRange) {}
        fn parse_diagnostic(&mut self, _s: &str, _m: &str, _w: bool, _r: SourceRange) {}
        fn semantic_diagnostic(&mut self, _s: &str, _m: &str, _w: bool, _r: SourceRange) {}
    }

    fn r() -> SourceRange {
        SourceRange::unknown()
    }

    fn fresh_ctx(sink: &mut NullSink) -> ResolutionContext<'_> {
        let interner = Arc::new(StringInterner::new());
        let types = Arc::new(TypeRegistry::new(interner.clone()));
        ResolutionContext::new("m", interner, types, Limits::default(), sink)
    }

    #[test]
    fn break_outside_loop_is_reported() {
        let mut sink = NullSink;
        let mut ctx = fresh_ctx(&mut sink);
        let mut validator = Validator::new(&mut ctx);
        validator.validate_statement(&Statement::Jump(JumpStatement::Break(r())));
        assert!(ctx.has_errors());
    }

    #[test]
    fn break_inside_for_is_accepted() {
        let mut sink = NullSink;
        let mut ctx = fresh_ctx(&mut sink);
        let body = Statement::Block(Block {
            statements: vec![Statement::Jump(JumpStatement::Break(r()))],
            range: r(),
        });
        let stmt = Statement::For(smalls_ast::ForStatement {
            init: None,
            condition: None,
            increment: None,
            body: Box::new(body),
            range: r(),
        });
        let mut validator = Validator::new(&mut ctx);
        validator.validate_statement(&stmt);
        assert!(!ctx.has_errors());
    }

    #[test]
    fn return_outside_function_is_reported() {
        let mut sink = NullSink;
        let mut ctx = fresh_ctx(&mut sink);
        let mut validator = Validator::new(&mut ctx);
        validator.validate_statement(&Statement::Jump(JumpStatement::Return { value: None, range: r() }));
        assert!(ctx.has_errors());
    }

    #[test]
    fn duplicate_literal_case_is_reported() {
        let mut sink = NullSink;
        let mut ctx = fresh_ctx(&mut sink);
        let switch = SwitchStatement {
            scrutinee: Expression::Literal(smalls_ast::LiteralExpr::Int(0), r()),
            cases: vec![
                smalls_ast::SwitchCase {
                    label: SwitchLabel::Literal(vec![Expression::Literal(smalls_ast::LiteralExpr::Int(1), r())]),
                    body: Block { statements: vec![], range: r() },
                    range: r(),
                },
                smalls_ast::SwitchCase {
                    label: SwitchLabel::Literal(vec![Expression::Literal(smalls_ast::LiteralExpr::Int(1), r())]),
                    body: Block { statements: vec![], range: r() },
                    range: r(),
                },
            ],
            default: None,
            range: r(),
        };
        let mut validator = Validator::new(&mut ctx);
        validator.validate_switch(&switch);
        assert!(ctx.has_errors());
    }

    #[test]
    fn non_exhaustive_sum_switch_is_reported() {
        let mut sink = NullSink;
        let mut ctx = fresh_ctx(&mut sink);
        let sum_id = ctx.types.reserve("m.Opt");
        ctx.types.define_sum(
            sum_id,
            SumDef {
                variants: vec![
                    VariantDef { name: ctx.interner.intern("some"), payload: None },
                    VariantDef { name: ctx.interner.intern("none"), payload: None },
                ],
                generic_param_count: 0,
            },
        );
        ctx.env.declare(crate::environment::Export::new("x", sum_id));

        let switch = SwitchStatement {
            scrutinee: Expression::Identifier { name: "x".to_string(), range: r() },
            cases: vec![smalls_ast::SwitchCase {
                label: SwitchLabel::Variant { variant_name: "some".to_string(), bindings: vec![] },
                body: Block { statements: vec![], range: r() },
                range: r(),
            }],
            default: None,
            range: r(),
        };
        let mut validator = Validator::new(&mut ctx);
        validator.validate_switch(&switch);
        assert!(ctx.has_errors());
    }

    #[test]
    fn struct_map_key_is_rejected() {
        let mut sink = NullSink;
        let mut ctx = fresh_ctx(&mut sink);
        let owner = ctx.types.reserve("m.Key");
        ctx.types.define(
            owner,
            smalls_types::TypeDescriptor {
                name: ctx.interner.intern("m.Key"),
                kind: TypeKind::Struct,
                type_params: vec![],
                size: 8,
                align: 8,
                contains_heap_refs: false,
            },
        );
        let texpr = TypeExpr::Map {
            key: Box::new(TypeExpr::Named { name: "Key".to_string(), args: vec![], range: r() }),
            value: Box::new(TypeExpr::Named { name: "int".to_string(), args: vec![], range: r() }),
            range: r(),
        };
        let mut validator = Validator::new(&mut ctx);
        validator.validate_type_expr(&texpr);
        assert!(ctx.has_errors());
    }

    #[test]
    fn newtype_over_string_is_a_valid_map_key() {
        let mut sink = NullSink;
        let mut ctx = fresh_ctx(&mut sink);
        let owner = ctx.types.reserve("m.UserId");
        ctx.types.define(
            owner,
            smalls_types::TypeDescriptor {
                name: ctx.interner.intern("m.UserId"),
                kind: TypeKind::Newtype,
                type_params: vec![smalls_types::TypeArg::Type(TypeId::STRING)],
                size: 4,
                align: 4,
                contains_heap_refs: true,
            },
        );
        let texpr = TypeExpr::Map {
            key: Box::new(TypeExpr::Named { name: "UserId".to_string(), args: vec![], range: r() }),
            value: Box::new(TypeExpr::Named { name: "int".to_string(), args: vec![], range: r() }),
            range: r(),
        };
        let mut validator = Validator::new(&mut ctx);
        validator.validate_type_expr(&texpr);
        assert!(!ctx.has_errors());
    }

    #[test]
    fn operator_overload_requires_eq_alongside_hash() {
        let mut sink = NullSink;
        let mut ctx = fresh_ctx(&mut sink);
        let owner = ctx.types.reserve("m.Key");
        ctx.types.register_operator_alias_info(owner, Op::Hash);
        let mut validator = Validator::new(&mut ctx);
        validator.validate_operator_consistency();
        assert!(ctx.has_errors());
        let _ = StructField { name: ctx.interner.intern("x"), ty: TypeId::INT, offset: 0 };
    }

    #[test]
    fn operator_overload_requires_eq_alongside_lt() {
        let mut sink = NullSink;
        let mut ctx = fresh_ctx(&mut sink);
        let owner = ctx.types.reserve("m.Key");
        ctx.types.register_operator_alias_info(owner, Op::Lt);
        let mut validator = Validator::new(&mut ctx);
        validator.validate_operator_consistency();
        assert!(ctx.has_errors());
    }

    #[test]
    fn operator_overload_with_eq_and_hash_is_accepted() {
        let mut sink = NullSink;
        let mut ctx = fresh_ctx(&mut sink);
        let owner = ctx.types.reserve("m.Key");
        ctx.types.register_operator_alias_info(owner, Op::Hash);
        ctx.types.register_operator_alias_info(owner, Op::Eq);
        let mut validator = Validator::new(&mut ctx);
        validator.validate_operator_consistency();
        assert!(!ctx.has_errors());
    }

    fn non_void_fn(body: Block) -> smalls_ast::FunctionDecl {
        smalls_ast::FunctionDecl {
            name: "f".to_string(),
            type_params: vec![],
            params: vec![],
            return_type: Some(TypeExpr::Named { name: "int".to_string(), args: vec![], range: r() }),
            body: Some(body),
            is_native: false,
            is_intrinsic: false,
            operator_alias: None,
            range: r(),
        }
    }

    fn return_stmt() -> Statement {
        Statement::Jump(JumpStatement::Return {
            value: Some(Expression::Literal(smalls_ast::LiteralExpr::Int(0), r())),
            range: r(),
        })
    }

    #[test]
    fn missing_return_on_non_void_path_is_reported() {
        let mut sink = NullSink;
        let mut ctx = fresh_ctx(&mut sink);
        let f = non_void_fn(Block {
            statements: vec![Statement::If(smalls_ast::IfStatement {
                condition: Expression::Literal(smalls_ast::LiteralExpr::Bool(true), r()),
                then_branch: Box::new(return_stmt()),
                else_branch: None,
                range: r(),
            })],
            range: r(),
        });
        let mut validator = Validator::new(&mut ctx);
        validator.validate_item(&Item::Function(f));
        assert!(ctx.has_errors());
    }

    #[test]
    fn return_on_every_if_branch_is_accepted() {
        let mut sink = NullSink;
        let mut ctx = fresh_ctx(&mut sink);
        let f = non_void_fn(Block {
            statements: vec![Statement::If(smalls_ast::IfStatement {
                condition: Expression::Literal(smalls_ast::LiteralExpr::Bool(true), r()),
                then_branch: Box::new(return_stmt()),
                else_branch: Some(Box::new(return_stmt())),
                range: r(),
            })],
            range: r(),
        });
        let mut validator = Validator::new(&mut ctx);
        validator.validate_item(&Item::Function(f));
        assert!(!ctx.has_errors());
    }

    #[test]
    fn exhaustive_variant_switch_without_default_satisfies_return_coverage() {
        let mut sink = NullSink;
        let mut ctx = fresh_ctx(&mut sink);
        let sum_id = ctx.types.reserve("m.Opt");
        ctx.types.define_sum(
            sum_id,
            SumDef {
                variants: vec![
                    VariantDef { name: ctx.interner.intern("some"), payload: None },
                    VariantDef { name: ctx.interner.intern("none"), payload: None },
                ],
                generic_param_count: 0,
            },
        );
        ctx.env.declare(crate::environment::Export::new("x", sum_id));

        let switch = Statement::Switch(SwitchStatement {
            scrutinee: Expression::Identifier { name: "x".to_string(), range: r() },
            cases: vec![
                smalls_ast::SwitchCase {
                    label: SwitchLabel::Variant { variant_name: "some".to_string(), bindings: vec![] },
                    body: Block { statements: vec![return_stmt()], range: r() },
                    range: r(),
                },
                smalls_ast::SwitchCase {
                    label: SwitchLabel::Variant { variant_name: "none".to_string(), bindings: vec![] },
                    body: Block { statements: vec![return_stmt()], range: r() },
                    range: r(),
                },
            ],
            default: None,
            range: r(),
        });
        let f = non_void_fn(Block { statements: vec![switch], range: r() });
        let mut validator = Validator::new(&mut ctx);
        validator.validate_item(&Item::Function(f));
        assert!(!ctx.has_errors());
    }
}
