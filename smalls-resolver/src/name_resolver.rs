use smalls_ast::{
    BraceInitFields, Expression, FStringPart, Import, Item, JumpStatement, LambdaBody, LiteralExpr,
    Program, Statement, SwitchLabel,
};
use smalls_diagnostics::error_codes;
use smalls_types::TypeId;

use crate::context::ResolutionContext;
use crate::environment::Export;

/// Pass 1: binds every name a script introduces (imports, top-level items,
/// locals, lambda/loop/switch bindings) and flags uses of names that never
/// resolve. Runs before the type resolver, which relies on every `Export`
/// already being reachable by name even if its `type_id` is still a
/// placeholder.
///
/// Hand-rolled recursive descent rather than `smalls_ast::visit::Visitor`:
/// scope push/pop has to bracket exactly the nodes that introduce a scope
/// (blocks, for/foreach, switch cases, lambdas), which the no-op-default
/// visitor doesn't model.
pub struct NameResolver<'ctx, 'a> {
    ctx: &'ctx mut ResolutionContext<'a>,
}

impl<'ctx, 'a> NameResolver<'ctx, 'a> {
    pub fn new(ctx: &'ctx mut ResolutionContext<'a>) -> Self {
        Self { ctx }
    }

    pub fn resolve_program(&mut self, program: &Program) {
        for import in &program.imports {
            self.declare_import(import);
        }
        for item in &program.items {
            self.predeclare_item(item);
        }
        for item in &program.items {
            self.resolve_item_body(item);
        }
    }

    fn declare_import(&mut self, import: &Import) {
        match import {
            Import::Aliased(decl) => {
                if !self.ctx.env.declare(Export::new(decl.alias.clone(), TypeId::MODULE)) {
                    self.ctx
                        .error(error_codes::DUPLICATE_DEFINITION, decl.range, format!("`{}` is already defined", decl.alias));
                }
            }
            Import::Selective(decl) => {
                for symbol in &decl.symbols {
                    let local_name = symbol.alias.clone().unwrap_or_else(|| symbol.name.clone());
                    if !self.ctx.env.declare(Export::new(local_name.clone(), TypeId::INVALID)) {
                        self.ctx.error(
                            error_codes::DUPLICATE_DEFINITION,
                            decl.range,
                            format!("`{}` is already defined", local_name),
                        );
                    }
                }
            }
        }
    }

    fn predeclare_item(&mut self, item: &Item) {
        match item {
            Item::Function(f) => {
                if !self.ctx.env.declare(export_fn(&f.name)) {
                    self.ctx.error(
                        error_codes::DUPLICATE_DEFINITION,
                        f.range,
                        format!("function `{}` is already defined", f.name),
                    );
                }
            }
            Item::Struct(s) => self.predeclare_type(&s.name, s.range),
            Item::Sum(s) => self.predeclare_type(&s.name, s.range),
            Item::TypeAlias(t) => self.predeclare_type(&t.name, t.range),
            Item::Newtype(t) => self.predeclare_type(&t.name, t.range),
            Item::Opaque(t) => self.predeclare_type(&t.name, t.range),
            Item::Var(v) => {
                if !self
                    .ctx
                    .env
                    .declare(export_var(&v.name, v.is_const))
                {
                    self.ctx.error(
                        error_codes::DUPLICATE_DEFINITION,
                        v.range,
                        format!("`{}` is already defined", v.name),
                    );
                }
            }
            Item::DeclList(list) => {
                for decl in &list.decls {
                    if !self.ctx.env.declare(export_var(&decl.name, decl.is_const)) {
                        self.ctx.error(
                            error_codes::DUPLICATE_DEFINITION,
                            decl.range,
                            format!("`{}` is already defined", decl.name),
                        );
                    }
                }
            }
        }
    }

    fn predeclare_type(&mut self, name: &str, range: smalls_diagnostics::SourceRange) {
        let qualified = format!("{}.{}", self.ctx.module_name, name);
        let id = self.ctx.types.reserve(&qualified);
        if !self.ctx.env.declare(Export::new(name.to_string(), id)) {
            self.ctx
                .error(error_codes::DUPLICATE_DEFINITION, range, format!("`{}` is already defined", name));
        }
    }

    fn resolve_item_body(&mut self, item: &Item) {
        match item {
            Item::Function(f) => {
                self.ctx.env.begin_scope();
                for param in &f.params {
                    self.ctx.env.declare(Export::new(param.name.clone(), TypeId::INVALID));
                }
                if let Some(body) = &f.body {
                    for stmt in &body.statements {
                        self.resolve_statement(stmt);
                    }
                }
                self.ctx.env.end_scope();
            }
            Item::Var(v) => {
                if let Some(init) = &v.init {
                    self.resolve_expr(init);
                }
            }
            Item::DeclList(list) => {
                for decl in &list.decls {
                    if let Some(init) = &decl.init {
                        self.resolve_expr(init);
                    }
                }
            }
            Item::Struct(_) | Item::Sum(_) | Item::TypeAlias(_) | Item::Newtype(_) | Item::Opaque(_) => {}
        }
    }

    fn resolve_statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Expr(s) => self.resolve_expr(&s.expr),
            Statement::Block(b) => {
                self.ctx.env.begin_scope();
                for s in &b.statements {
                    self.resolve_statement(s);
                }
                self.ctx.env.end_scope();
            }
            Statement::If(s) => {
                self.resolve_expr(&s.condition);
                self.resolve_statement(&s.then_branch);
                if let Some(else_branch) = &s.else_branch {
                    self.resolve_statement(else_branch);
                }
            }
            Statement::For(s) => {
                self.ctx.env.begin_scope();
                if let Some(init) = &s.init {
                    self.resolve_statement(init);
                }
                if let Some(cond) = &s.condition {
                    self.resolve_expr(cond);
                }
                if let Some(inc) = &s.increment {
                    self.resolve_expr(inc);
                }
                self.resolve_statement(&s.body);
                self.ctx.env.end_scope();
            }
            Statement::ForEach(s) => {
                self.resolve_expr(&s.iterable);
                self.ctx.env.begin_scope();
                self.ctx.env.declare(Export::new(s.binding.clone(), TypeId::INVALID));
                self.resolve_statement(&s.body);
                self.ctx.env.end_scope();
            }
            Statement::Switch(s) => {
                self.resolve_expr(&s.scrutinee);
                for case in &s.cases {
                    self.ctx.env.begin_scope();
                    match &case.label {
                        SwitchLabel::Literal(exprs) => {
                            for e in exprs {
                                self.resolve_expr(e);
                            }
                        }
                        SwitchLabel::Variant { bindings, .. } => {
                            for binding in bindings {
                                self.ctx.env.declare(Export::new(binding.clone(), TypeId::INVALID));
                            }
                        }
                    }
                    for stmt in &case.body.statements {
                        self.resolve_statement(stmt);
                    }
                    self.ctx.env.end_scope();
                }
                if let Some(default) = &s.default {
                    self.ctx.env.begin_scope();
                    for stmt in &default.statements {
                        self.resolve_statement(stmt);
                    }
                    self.ctx.env.end_scope();
                }
            }
            Statement::Jump(JumpStatement::Return { value: Some(value), .. }) => {
                self.resolve_expr(value);
            }
            Statement::Jump(_) => {}
            Statement::Decl(item) => self.resolve_local_decl(item),
            Statement::Empty(_) => {}
        }
    }

    fn resolve_local_decl(&mut self, item: &Item) {
        match item {
            Item::Var(v) => {
                if let Some(init) = &v.init {
                    self.resolve_expr(init);
                }
                if !self.ctx.env.declare(export_var(&v.name, v.is_const)) {
                    self.ctx.error(
                        error_codes::DUPLICATE_DEFINITION,
                        v.range,
                        format!("`{}` is already defined in this scope", v.name),
                    );
                }
            }
            Item::DeclList(list) => {
                for decl in &list.decls {
                    if let Some(init) = &decl.init {
                        self.resolve_expr(init);
                    }
                    if !self.ctx.env.declare(export_var(&decl.name, decl.is_const)) {
                        self.ctx.error(
                            error_codes::DUPLICATE_DEFINITION,
                            decl.range,
                            format!("`{}` is already defined in this scope", decl.name),
                        );
                    }
                }
            }
            Item::Function(f) => {
                if !self.ctx.env.declare(export_fn(&f.name)) {
                    self.ctx.error(
                        error_codes::DUPLICATE_DEFINITION,
                        f.range,
                        format!("function `{}` is already defined in this scope", f.name),
                    );
                }
                self.resolve_item_body(item);
            }
            Item::Struct(_) | Item::Sum(_) | Item::TypeAlias(_) | Item::Newtype(_) | Item::Opaque(_) => {
                self.predeclare_item(item);
            }
        }
    }

    fn resolve_expr(&mut self, expr: &Expression) {
        match expr {
            Expression::Identifier { name, range } => {
                if self.ctx.env.resolve(name).is_none() {
                    let suggestions = self.ctx.suggest_names(name);
                    let range = *range;
                    let hint = if suggestions.is_empty() {
                        String::new()
                    } else {
                        format!(" (did you mean `{}`?)", suggestions.join("`, `"))
                    };
                    self.ctx.error(
                        error_codes::UNDEFINED_NAME,
                        range,
                        format!("cannot find `{}` in this scope{}", name, hint),
                    );
                }
            }
            Expression::Path { .. } | Expression::Literal(..) | Expression::Empty(_) => {}
            Expression::Assign { target, value, .. } => {
                self.resolve_expr(target);
                self.resolve_expr(value);
            }
            Expression::Binary { lhs, rhs, .. }
            | Expression::Comparison { lhs, rhs, .. }
            | Expression::Logical { lhs, rhs, .. } => {
                self.resolve_expr(lhs);
                self.resolve_expr(rhs);
            }
            Expression::Unary { operand, .. } => self.resolve_expr(operand),
            Expression::Conditional { condition, then_expr, else_expr, .. } => {
                self.resolve_expr(condition);
                self.resolve_expr(then_expr);
                self.resolve_expr(else_expr);
            }
            Expression::Call { callee, args, .. } => {
                self.resolve_expr(callee);
                for arg in args {
                    self.resolve_expr(arg);
                }
            }
            Expression::Index { target, index, .. } => {
                self.resolve_expr(target);
                self.resolve_expr(index);
            }
            Expression::Cast { expr, .. } => self.resolve_expr(expr),
            Expression::Grouping { inner, .. } => self.resolve_expr(inner),
            Expression::Tuple { elements, .. } => {
                for e in elements {
                    self.resolve_expr(e);
                }
            }
            Expression::BraceInit { fields, .. } => match fields {
                BraceInitFields::Positional(exprs) => exprs.iter().for_each(|e| self.resolve_expr(e)),
                BraceInitFields::Named(pairs) => pairs.iter().for_each(|(_, e)| self.resolve_expr(e)),
                BraceInitFields::KeyValue(pairs) => pairs.iter().for_each(|(k, v)| {
                    self.resolve_expr(k);
                    self.resolve_expr(v);
                }),
            },
            Expression::Lambda(l) => {
                self.ctx.env.begin_scope();
                for param in &l.params {
                    self.ctx.env.declare(Export::new(param.name.clone(), TypeId::INVALID));
                }
                match &l.body {
                    LambdaBody::Expr(e) => self.resolve_expr(e),
                    LambdaBody::Block(b) => {
                        for stmt in &b.statements {
                            self.resolve_statement(stmt);
                        }
                    }
                }
                self.ctx.env.end_scope();
            }
            Expression::FString { parts, .. } => {
                for part in parts {
                    if let FStringPart::Expr(e) = part {
                        self.resolve_expr(e);
                    }
                }
            }
        }

        if let Expression::Literal(LiteralExpr::Array(exprs), _) = expr {
            for e in exprs {
                self.resolve_expr(e);
            }
        }
    }
}

fn export_fn(name: &str) -> Export {
    let mut export = Export::new(name.to_string(), TypeId::INVALID);
    export.is_function = true;
    export
}

fn export_var(name: &str, is_const: bool) -> Export {
    let mut export = Export::new(name.to_string(), TypeId::INVALID);
    export.is_const = is_const;
    export
}

#[cfg(test)]
mod tests {
    use super::*;
    use smalls_diagnostics::{DiagnosticSink, Limits, SourceRange};
    use smalls_types::StringInterner;
    use smalls_types::TypeRegistry;
    use std::sync::Arc;

    struct CollectingSink {
        errors: Vec<String>,
    }
    impl DiagnosticSink for CollectingSink {
        fn lexical_diagnostic(&mut self, _s: &str, _m: &str, _w: bool, _r: SourceRange) {}
        fn parse_diagnostic(&mut self, _s: &str, _m: &str, _w: bool, _r: SourceRange) {}
        fn semantic_diagnostic(&mut self, _script: &str, message: &str, is_warning: bool, _range: SourceRange) {
            if !is_warning {
                self.errors.push(message.to_string());
            }
        }
    }

    fn r() -> SourceRange {
        SourceRange::unknown()
    }

    fn fresh_ctx(sink: &mut CollectingSink) -> ResolutionContext<'_> {
        let interner = Arc::new(StringInterner::new());
        let types = Arc::new(TypeRegistry::new(interner.clone()));
        ResolutionContext::new("m", interner, types, Limits::default(), sink)
    }

    #[test]
    fn undefined_identifier_is_reported() {
        let mut sink = CollectingSink { errors: vec![] };
        let mut ctx = fresh_ctx(&mut sink);
        let program = Program {
            module_name: "m".to_string(),
            imports: vec![],
            items: vec![Item::Var(smalls_ast::VarDecl {
                name: "x".to_string(),
                ty: None,
                init: Some(Expression::Identifier { name: "y".to_string(), range: r() }),
                is_const: false,
                range: r(),
            })],
            range: r(),
        };
        NameResolver::new(&mut ctx).resolve_program(&program);
        assert!(ctx.has_errors());
        drop(ctx);
        assert!(sink.errors[0].contains("E0101"));
    }

    #[test]
    fn duplicate_top_level_name_is_reported() {
        let mut sink = CollectingSink { errors: vec![] };
        let mut ctx = fresh_ctx(&mut sink);
        let var = |name: &str| {
            Item::Var(smalls_ast::VarDecl {
                name: name.to_string(),
                ty: None,
                init: None,
                is_const: false,
                range: r(),
            })
        };
        let program = Program {
            module_name: "m".to_string(),
            imports: vec![],
            items: vec![var("x"), var("x")],
            range: r(),
        };
        NameResolver::new(&mut ctx).resolve_program(&program);
        assert_eq!(ctx.error_count(), 1);
    }

    #[test]
    fn function_parameter_is_visible_in_body() {
        let mut sink = CollectingSink { errors: vec![] };
        let mut ctx = fresh_ctx(&mut sink);
        let program = Program {
            module_name: "m".to_string(),
            imports: vec![],
            items: vec![Item::Function(smalls_ast::FunctionDecl {
                name: "f".to_string(),
                type_params: vec![],
                params: vec![smalls_ast::Param {
                    name: "x".to_string(),
                    ty: smalls_ast::TypeExpr::Named { name: "int".to_string(), args: vec![], range: r() },
                    range: r(),
                }],
                return_type: None,
                body: Some(smalls_ast::Block {
                    statements: vec![Statement::Expr(smalls_ast::ExprStatement {
                        expr: Expression::Identifier { name: "x".to_string(), range: r() },
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
        NameResolver::new(&mut ctx).resolve_program(&program);
        assert!(!ctx.has_errors());
    }
}
