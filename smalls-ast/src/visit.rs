//! Visitor over the AST, in the no-op-default style the resolver passes
//! build on: override the methods you care about, the rest walk children.

use crate::*;

pub trait Visitor {
    fn visit_program(&mut self, node: &Program) {
        walk_program(self, node);
    }

    fn visit_item(&mut self, node: &Item) {
        walk_item(self, node);
    }

    fn visit_function(&mut self, node: &FunctionDecl) {
        walk_function(self, node);
    }

    fn visit_struct(&mut self, _node: &StructDecl) {}

    fn visit_sum(&mut self, _node: &SumDecl) {}

    fn visit_var_decl(&mut self, node: &VarDecl) {
        walk_var_decl(self, node);
    }

    fn visit_decl_list(&mut self, node: &DeclList) {
        for decl in &node.decls {
            self.visit_var_decl(decl);
        }
    }

    fn visit_block(&mut self, node: &Block) {
        walk_block(self, node);
    }

    fn visit_statement(&mut self, node: &Statement) {
        walk_statement(self, node);
    }

    fn visit_expression(&mut self, node: &Expression) {
        walk_expression(self, node);
    }

    fn visit_aliased_import(&mut self, _node: &AliasedImportDecl) {}

    fn visit_selective_import(&mut self, _node: &SelectiveImportDecl) {}
}

pub fn walk_program<V: Visitor + ?Sized>(visitor: &mut V, node: &Program) {
    for import in &node.imports {
        match import {
            Import::Aliased(d) => visitor.visit_aliased_import(d),
            Import::Selective(d) => visitor.visit_selective_import(d),
        }
    }
    for item in &node.items {
        visitor.visit_item(item);
    }
}

pub fn walk_item<V: Visitor + ?Sized>(visitor: &mut V, node: &Item) {
    match node {
        Item::Function(f) => visitor.visit_function(f),
        Item::Struct(s) => visitor.visit_struct(s),
        Item::Sum(s) => visitor.visit_sum(s),
        Item::Var(v) => visitor.visit_var_decl(v),
        Item::DeclList(d) => visitor.visit_decl_list(d),
        Item::TypeAlias(_) | Item::Newtype(_) | Item::Opaque(_) => {}
    }
}

pub fn walk_function<V: Visitor + ?Sized>(visitor: &mut V, node: &FunctionDecl) {
    if let Some(body) = &node.body {
        visitor.visit_block(body);
    }
}

pub fn walk_var_decl<V: Visitor + ?Sized>(visitor: &mut V, node: &VarDecl) {
    if let Some(init) = &node.init {
        visitor.visit_expression(init);
    }
}

pub fn walk_block<V: Visitor + ?Sized>(visitor: &mut V, node: &Block) {
    for stmt in &node.statements {
        visitor.visit_statement(stmt);
    }
}

pub fn walk_statement<V: Visitor + ?Sized>(visitor: &mut V, node: &Statement) {
    match node {
        Statement::Expr(s) => visitor.visit_expression(&s.expr),
        Statement::Block(b) => visitor.visit_block(b),
        Statement::If(s) => {
            visitor.visit_expression(&s.condition);
            visitor.visit_statement(&s.then_branch);
            if let Some(else_branch) = &s.else_branch {
                visitor.visit_statement(else_branch);
            }
        }
        Statement::For(s) => {
            if let Some(init) = &s.init {
                visitor.visit_statement(init);
            }
            if let Some(cond) = &s.condition {
                visitor.visit_expression(cond);
            }
            if let Some(inc) = &s.increment {
                visitor.visit_expression(inc);
            }
            visitor.visit_statement(&s.body);
        }
        Statement::ForEach(s) => {
            visitor.visit_expression(&s.iterable);
            visitor.visit_statement(&s.body);
        }
        Statement::Switch(s) => {
            visitor.visit_expression(&s.scrutinee);
            for case in &s.cases {
                if let SwitchLabel::Literal(exprs) = &case.label {
                    for e in exprs {
                        visitor.visit_expression(e);
                    }
                }
                visitor.visit_block(&case.body);
            }
            if let Some(default) = &s.default {
                visitor.visit_block(default);
            }
        }
        Statement::Jump(JumpStatement::Return {
            value: Some(value), ..
        }) => visitor.visit_expression(value),
        Statement::Jump(_) => {}
        Statement::Decl(item) => visitor.visit_item(item),
        Statement::Empty(_) => {}
    }
}

pub fn walk_expression<V: Visitor + ?Sized>(visitor: &mut V, node: &Expression) {
    match node {
        Expression::Assign { target, value, .. } => {
            visitor.visit_expression(target);
            visitor.visit_expression(value);
        }
        Expression::Binary { lhs, rhs, .. }
        | Expression::Comparison { lhs, rhs, .. }
        | Expression::Logical { lhs, rhs, .. } => {
            visitor.visit_expression(lhs);
            visitor.visit_expression(rhs);
        }
        Expression::Unary { operand, .. } => visitor.visit_expression(operand),
        Expression::Conditional {
            condition,
            then_expr,
            else_expr,
            ..
        } => {
            visitor.visit_expression(condition);
            visitor.visit_expression(then_expr);
            visitor.visit_expression(else_expr);
        }
        Expression::Call { callee, args, .. } => {
            visitor.visit_expression(callee);
            for a in args {
                visitor.visit_expression(a);
            }
        }
        Expression::Index { target, index, .. } => {
            visitor.visit_expression(target);
            visitor.visit_expression(index);
        }
        Expression::Cast { expr, .. } => visitor.visit_expression(expr),
        Expression::Grouping { inner, .. } => visitor.visit_expression(inner),
        Expression::Tuple { elements, .. } => {
            for e in elements {
                visitor.visit_expression(e);
            }
        }
        Expression::BraceInit { fields, .. } => match fields {
            BraceInitFields::Positional(exprs) => {
                for e in exprs {
                    visitor.visit_expression(e);
                }
            }
            BraceInitFields::Named(pairs) => {
                for (_, e) in pairs {
                    visitor.visit_expression(e);
                }
            }
            BraceInitFields::KeyValue(pairs) => {
                for (k, v) in pairs {
                    visitor.visit_expression(k);
                    visitor.visit_expression(v);
                }
            }
        },
        Expression::Lambda(l) => match &l.body {
            LambdaBody::Expr(e) => visitor.visit_expression(e),
            LambdaBody::Block(b) => visitor.visit_block(b),
        },
        Expression::FString { parts, .. } => {
            for part in parts {
                if let FStringPart::Expr(e) = part {
                    visitor.visit_expression(e);
                }
            }
        }
        Expression::Literal(LiteralExpr::Array(exprs), _) => {
            for e in exprs {
                visitor.visit_expression(e);
            }
        }
        Expression::Literal(..) | Expression::Identifier { .. } | Expression::Path { .. } => {}
        Expression::Empty(_) => {}
    }
}
