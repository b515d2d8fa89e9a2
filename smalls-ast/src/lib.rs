//! Abstract syntax tree for the Smalls embedded scripting language.
//!
//! This crate only defines the tree shape and source-range bookkeeping.
//! Nodes are produced by an external lexer/parser (out of scope here) and
//! consumed by the name resolver, type resolver, validator and const
//! evaluator in `smalls-resolver`. No semantic analysis happens here.
//!
//! One parsed script is one `Program`. The `arena` module provides a
//! per-script owner for that tree so a whole compilation unit can be
//! dropped in one move once analysis finishes.

pub mod arena;
pub mod visit;

use serde::{Deserialize, Serialize};
use smalls_diagnostics::SourceRange;

pub type Ident = String;

/// A single compilation unit: one script file after parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub module_name: Ident,
    pub imports: Vec<Import>,
    pub items: Vec<Item>,
    pub range: SourceRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Import {
    Aliased(AliasedImportDecl),
    Selective(SelectiveImportDecl),
}

/// `import a.b.c as name;`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasedImportDecl {
    pub module_path: Vec<Ident>,
    pub alias: Ident,
    pub range: SourceRange,
}

/// `from a.b import {f, T as U};`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectiveImportDecl {
    pub module_path: Vec<Ident>,
    pub symbols: Vec<ImportedSymbol>,
    pub range: SourceRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedSymbol {
    pub name: Ident,
    pub alias: Option<Ident>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Item {
    Function(FunctionDecl),
    Struct(StructDecl),
    Sum(SumDecl),
    TypeAlias(TypeAliasDecl),
    Newtype(NewtypeDecl),
    Opaque(OpaqueTypeDecl),
    Var(VarDecl),
    DeclList(DeclList),
}

impl Item {
    pub fn range(&self) -> SourceRange {
        match self {
            Item::Function(d) => d.range,
            Item::Struct(d) => d.range,
            Item::Sum(d) => d.range,
            Item::TypeAlias(d) => d.range,
            Item::Newtype(d) => d.range,
            Item::Opaque(d) => d.range,
            Item::Var(d) => d.range,
            Item::DeclList(d) => d.range,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Item::Function(d) => Some(&d.name),
            Item::Struct(d) => Some(&d.name),
            Item::Sum(d) => Some(&d.name),
            Item::TypeAlias(d) => Some(&d.name),
            Item::Newtype(d) => Some(&d.name),
            Item::Opaque(d) => Some(&d.name),
            Item::Var(d) => Some(&d.name),
            Item::DeclList(_) => None,
        }
    }
}

/// `$T`, `$U`, ... generic type parameters declared on a struct/sum/function.
pub type TypeParam = Ident;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: Ident,
    pub type_params: Vec<TypeParam>,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    /// `None` for native/intrinsic declarations that only describe a signature.
    pub body: Option<Block>,
    pub is_native: bool,
    pub is_intrinsic: bool,
    pub operator_alias: Option<OperatorAlias>,
    pub range: SourceRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: Ident,
    pub ty: TypeExpr,
    pub range: SourceRange,
}

/// `operator(+)`, `operator(==)`, ... overload annotation on a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatorAlias {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Hash,
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructDecl {
    pub name: Ident,
    pub type_params: Vec<TypeParam>,
    pub fields: Vec<FieldDecl>,
    pub range: SourceRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: Ident,
    pub ty: TypeExpr,
    pub default: Option<Expression>,
    pub range: SourceRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SumDecl {
    pub name: Ident,
    pub type_params: Vec<TypeParam>,
    pub variants: Vec<VariantDecl>,
    pub range: SourceRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantDecl {
    pub name: Ident,
    /// `None` for a unit variant, `Some(fields)` for a payload-carrying one.
    pub payload: Option<Vec<FieldDecl>>,
    pub range: SourceRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeAliasDecl {
    pub name: Ident,
    pub type_params: Vec<TypeParam>,
    pub aliased: TypeExpr,
    pub range: SourceRange,
}

/// A distinct nominal type backed by the same representation as
/// `underlying`, with no implicit conversion either way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewtypeDecl {
    pub name: Ident,
    pub underlying: TypeExpr,
    pub range: SourceRange,
}

/// A type whose representation is only known to the native bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpaqueTypeDecl {
    pub name: Ident,
    pub range: SourceRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDecl {
    pub name: Ident,
    pub ty: Option<TypeExpr>,
    pub init: Option<Expression>,
    pub is_const: bool,
    pub range: SourceRange,
}

/// `var a, b, c: int;` -- multiple bindings sharing one declaration site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclList {
    pub decls: Vec<VarDecl>,
    pub range: SourceRange,
}

// ---------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeExpr {
    Named {
        name: Ident,
        args: Vec<TypeExpr>,
        range: SourceRange,
    },
    TypeParam {
        name: Ident,
        range: SourceRange,
    },
    Tuple {
        elements: Vec<TypeExpr>,
        range: SourceRange,
    },
    Array {
        element: Box<TypeExpr>,
        size: Option<Box<Expression>>,
        range: SourceRange,
    },
    Map {
        key: Box<TypeExpr>,
        value: Box<TypeExpr>,
        range: SourceRange,
    },
    Function {
        params: Vec<TypeExpr>,
        ret: Box<TypeExpr>,
        range: SourceRange,
    },
    Optional {
        inner: Box<TypeExpr>,
        range: SourceRange,
    },
}

impl TypeExpr {
    pub fn range(&self) -> SourceRange {
        match self {
            TypeExpr::Named { range, .. }
            | TypeExpr::TypeParam { range, .. }
            | TypeExpr::Tuple { range, .. }
            | TypeExpr::Array { range, .. }
            | TypeExpr::Map { range, .. }
            | TypeExpr::Function { range, .. }
            | TypeExpr::Optional { range, .. } => *range,
        }
    }
}

// ---------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub statements: Vec<Statement>,
    pub range: SourceRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Expr(ExprStatement),
    Block(Block),
    If(IfStatement),
    For(ForStatement),
    ForEach(ForEachStatement),
    Switch(SwitchStatement),
    Jump(JumpStatement),
    /// A local declaration nested inside a block (var, decl-list, nested fn).
    Decl(Item),
    Empty(SourceRange),
}

impl Statement {
    pub fn range(&self) -> SourceRange {
        match self {
            Statement::Expr(s) => s.range,
            Statement::Block(b) => b.range,
            Statement::If(s) => s.range,
            Statement::For(s) => s.range,
            Statement::ForEach(s) => s.range,
            Statement::Switch(s) => s.range,
            Statement::Jump(j) => j.range(),
            Statement::Decl(i) => i.range(),
            Statement::Empty(r) => *r,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExprStatement {
    pub expr: Expression,
    pub range: SourceRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfStatement {
    pub condition: Expression,
    pub then_branch: Box<Statement>,
    pub else_branch: Option<Box<Statement>>,
    pub range: SourceRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForStatement {
    pub init: Option<Box<Statement>>,
    pub condition: Option<Expression>,
    pub increment: Option<Expression>,
    pub body: Box<Statement>,
    pub range: SourceRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForEachStatement {
    pub binding: Ident,
    pub iterable: Expression,
    pub body: Box<Statement>,
    pub range: SourceRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchStatement {
    pub scrutinee: Expression,
    pub cases: Vec<SwitchCase>,
    pub default: Option<Block>,
    pub range: SourceRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    pub label: SwitchLabel,
    pub body: Block,
    pub range: SourceRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SwitchLabel {
    /// `case 1, 2, 3:` over ints/strings/enum constants -- the "basic" switch.
    Literal(Vec<Expression>),
    /// `case .some(x):` sum-type variant destructuring, exhaustiveness-checked.
    Variant {
        variant_name: Ident,
        bindings: Vec<Ident>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JumpStatement {
    Break(SourceRange),
    Continue(SourceRange),
    Return {
        value: Option<Expression>,
        range: SourceRange,
    },
}

impl JumpStatement {
    pub fn range(&self) -> SourceRange {
        match self {
            JumpStatement::Break(r) | JumpStatement::Continue(r) => *r,
            JumpStatement::Return { range, .. } => *range,
        }
    }
}

// ---------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Literal(LiteralExpr, SourceRange),
    Identifier {
        name: Ident,
        range: SourceRange,
    },
    /// `module.sub.name`
    Path {
        segments: Vec<Ident>,
        range: SourceRange,
    },
    Assign {
        target: Box<Expression>,
        value: Box<Expression>,
        range: SourceRange,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
        range: SourceRange,
    },
    Comparison {
        op: ComparisonOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
        range: SourceRange,
    },
    Logical {
        op: LogicalOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
        range: SourceRange,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
        range: SourceRange,
    },
    Conditional {
        condition: Box<Expression>,
        then_expr: Box<Expression>,
        else_expr: Box<Expression>,
        range: SourceRange,
    },
    Call {
        callee: Box<Expression>,
        args: Vec<Expression>,
        range: SourceRange,
    },
    Index {
        target: Box<Expression>,
        index: Box<Expression>,
        range: SourceRange,
    },
    Cast {
        expr: Box<Expression>,
        target_type: TypeExpr,
        range: SourceRange,
    },
    Grouping {
        inner: Box<Expression>,
        range: SourceRange,
    },
    Tuple {
        elements: Vec<Expression>,
        range: SourceRange,
    },
    BraceInit {
        type_name: Option<Ident>,
        fields: BraceInitFields,
        range: SourceRange,
    },
    Lambda(LambdaExpr),
    FString {
        parts: Vec<FStringPart>,
        range: SourceRange,
    },
    Empty(SourceRange),
}

impl Expression {
    pub fn range(&self) -> SourceRange {
        match self {
            Expression::Literal(_, r) => *r,
            Expression::Identifier { range, .. }
            | Expression::Path { range, .. }
            | Expression::Assign { range, .. }
            | Expression::Binary { range, .. }
            | Expression::Comparison { range, .. }
            | Expression::Logical { range, .. }
            | Expression::Unary { range, .. }
            | Expression::Conditional { range, .. }
            | Expression::Call { range, .. }
            | Expression::Index { range, .. }
            | Expression::Cast { range, .. }
            | Expression::Grouping { range, .. }
            | Expression::Tuple { range, .. }
            | Expression::BraceInit { range, .. }
            | Expression::FString { range, .. } => *range,
            Expression::Lambda(l) => l.range,
            Expression::Empty(r) => *r,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BraceInitFields {
    /// `Point{1, 2}`
    Positional(Vec<Expression>),
    /// `Point{x: 1, y: 2}`
    Named(Vec<(Ident, Expression)>),
    /// `{"a": 1, "b": 2}` map literal
    KeyValue(Vec<(Expression, Expression)>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FStringPart {
    Text(String),
    Expr(Expression),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LambdaExpr {
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    pub body: LambdaBody,
    pub range: SourceRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LambdaBody {
    Expr(Box<Expression>),
    Block(Block),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiteralExpr {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    Array(Vec<Expression>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}
