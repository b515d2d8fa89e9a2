use std::collections::HashMap;

use smalls_ast::{BinaryOp, Expression, LiteralExpr, UnaryOp};

/// Folds the constant-integer subset of expressions: literals, named
/// constants already resolved to a value, unary negation, and the four
/// arithmetic binary operators plus modulo. Used for fixed-array sizes and
/// `const` initializers, where the value must be known during resolution
/// rather than at runtime.
pub struct ConstEvaluator<'a> {
    consts: &'a HashMap<String, i64>,
}

impl<'a> ConstEvaluator<'a> {
    pub fn new(consts: &'a HashMap<String, i64>) -> Self {
        Self { consts }
    }

    pub fn eval(&self, expr: &Expression) -> Option<i64> {
        match expr {
            Expression::Literal(LiteralExpr::Int(n), _) => Some(*n),
            Expression::Literal(LiteralExpr::Bool(b), _) => Some(if *b { 1 } else { 0 }),
            Expression::Identifier { name, .. } => self.consts.get(name).copied(),
            Expression::Grouping { inner, .. } => self.eval(inner),
            Expression::Unary { op, operand, .. } => {
                let value = self.eval(operand)?;
                match op {
                    UnaryOp::Neg => value.checked_neg(),
                    UnaryOp::Not => None,
                }
            }
            Expression::Binary { op, lhs, rhs, .. } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                match op {
                    BinaryOp::Add => lhs.checked_add(rhs),
                    BinaryOp::Sub => lhs.checked_sub(rhs),
                    BinaryOp::Mul => lhs.checked_mul(rhs),
                    BinaryOp::Div => lhs.checked_div(rhs),
                    BinaryOp::Mod => lhs.checked_rem(rhs),
                }
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smalls_diagnostics::SourceRange;

    fn r() -> SourceRange {
        SourceRange::unknown()
    }

    #[test]
    fn folds_nested_arithmetic() {
        let consts = HashMap::new();
        let evaluator = ConstEvaluator::new(&consts);
        // (2 + 3) * 4
        let expr = Expression::Binary {
            op: BinaryOp::Mul,
            lhs: Box::new(Expression::Grouping {
                inner: Box::new(Expression::Binary {
                    op: BinaryOp::Add,
                    lhs: Box::new(Expression::Literal(LiteralExpr::Int(2), r())),
                    rhs: Box::new(Expression::Literal(LiteralExpr::Int(3), r())),
                    range: r(),
                }),
                range: r(),
            }),
            rhs: Box::new(Expression::Literal(LiteralExpr::Int(4), r())),
            range: r(),
        };
        assert_eq!(evaluator.eval(&expr), Some(20));
    }

    #[test]
    fn named_constant_resolves_through_map() {
        let mut consts = HashMap::new();
        consts.insert("SIZE".to_string(), 16);
        let evaluator = ConstEvaluator::new(&consts);
        let expr = Expression::Identifier {
            name: "SIZE".to_string(),
            range: r(),
        };
        assert_eq!(evaluator.eval(&expr), Some(16));
    }

    #[test]
    fn division_by_zero_is_not_const() {
        let consts = HashMap::new();
        let evaluator = ConstEvaluator::new(&consts);
        let expr = Expression::Binary {
            op: BinaryOp::Div,
            lhs: Box::new(Expression::Literal(LiteralExpr::Int(1), r())),
            rhs: Box::new(Expression::Literal(LiteralExpr::Int(0), r())),
            range: r(),
        };
        assert_eq!(evaluator.eval(&expr), None);
    }

    #[test]
    fn non_const_expression_is_none() {
        let consts = HashMap::new();
        let evaluator = ConstEvaluator::new(&consts);
        let expr = Expression::Call {
            callee: Box::new(Expression::Identifier {
                name: "f".to_string(),
                range: r(),
            }),
            args: vec![],
            range: r(),
        };
        assert_eq!(evaluator.eval(&expr), None);
    }
}
