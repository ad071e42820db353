//! expression tree
//!
//! [Expr] is a closed union over every expression kind the evaluator and the token
//! re-serializer understand. Both match on it exhaustively, so a new kind does not build until
//! every consumer handles it.
//!
//! Expressions are produced by lowering parsed HCL ([hcl::Expression]) in [convert] and are never
//! mutated afterwards; evaluation builds new trees. A resolved value is [Expr::Literal].
mod convert;

pub use convert::{lower, ParseError};
pub(crate) use convert::{push_literal, push_step};

use crate::value::Value;

/// Parses a single expression from source text
pub fn parse_expression(source: &str) -> Result<Expr, ParseError> {
    let expr: hcl_edit::expr::Expression = source.parse()?;
    lower(expr.into())
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A resolved value (scalar or collection)
    Literal(Value),
    /// String template; literal parts are [Expr::Literal] strings
    Template(Vec<Expr>),
    /// A template consisting of a single interpolation: `"${expr}"`
    TemplateWrap(Box<Expr>),
    Unary(Box<Unary>),
    Binary(Box<Binary>),
    Tuple(Vec<Expr>),
    Object(Vec<ObjectItem>),
    Conditional(Box<Conditional>),
    FuncCall(FuncCall),
    Index(Box<Index>),
    Splat(Box<Splat>),
    ScopeTraversal(Traversal),
    RelativeTraversal(Box<RelativeTraversal>),
    Parens(Box<Expr>),
    For(Box<ForExpr>),
    /// The current element inside the `each` part of a [Splat]
    AnonSymbol,
}

impl Expr {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Expr::Literal(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_value(self) -> Result<Value, Expr> {
        match self {
            Expr::Literal(value) => Ok(value),
            other => Err(other),
        }
    }

    pub fn variable(name: impl Into<String>) -> Expr {
        Expr::ScopeTraversal(Traversal::root(name))
    }

    /// Wraps operations and conditionals in parenthesis so the expression can be spliced into
    /// any operand position without changing its meaning.
    pub fn into_operand(self) -> Expr {
        match self {
            Expr::Binary(_) | Expr::Unary(_) | Expr::Conditional(_) => Expr::Parens(Box::new(self)),
            other => other,
        }
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Literal(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    And,
    Or,
}

impl BinaryOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOperator::Eq => "==",
            BinaryOperator::NotEq => "!=",
            BinaryOperator::Less => "<",
            BinaryOperator::LessEq => "<=",
            BinaryOperator::Greater => ">",
            BinaryOperator::GreaterEq => ">=",
            BinaryOperator::Plus => "+",
            BinaryOperator::Minus => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
            BinaryOperator::And => "&&",
            BinaryOperator::Or => "||",
        }
    }
}

impl UnaryOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOperator::Not => "!",
            UnaryOperator::Neg => "-",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unary {
    pub operator: UnaryOperator,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binary {
    pub lhs: Expr,
    pub operator: BinaryOperator,
    pub rhs: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectItem {
    pub key: ObjectKey,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKey {
    /// A bare identifier key, always taken literally
    Ident(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    pub condition: Expr,
    pub true_expr: Expr,
    pub false_expr: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncCall {
    pub name: String,
    pub args: Vec<Expr>,
    /// final argument is expanded (`f(list...)`)
    pub expand_final: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    pub collection: Expr,
    pub key: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Splat {
    pub source: Expr,
    /// applied to every element, refers to it via [Expr::AnonSymbol]
    pub each: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelativeTraversal {
    pub source: Expr,
    pub traversal: Traversal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForExpr {
    pub key_var: Option<String>,
    pub value_var: String,
    pub collection: Expr,
    /// present for object comprehensions (`{for ... : key => value}`)
    pub key_expr: Option<Expr>,
    pub value_expr: Expr,
    pub grouping: bool,
    pub condition: Option<Expr>,
}

/// A static name path such as `global.a.b[0]`
///
/// A scope traversal starts with a [Traverser::Root] step, a relative traversal never contains
/// one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Traversal(pub Vec<Traverser>);

#[derive(Debug, Clone, PartialEq)]
pub enum Traverser {
    Root(String),
    Attr(String),
    Index(Value),
}

impl Traversal {
    pub fn root(name: impl Into<String>) -> Self {
        Self(vec![Traverser::Root(name.into())])
    }

    pub fn attr(mut self, name: impl Into<String>) -> Self {
        self.0.push(Traverser::Attr(name.into()));
        self
    }

    pub fn root_name(&self) -> Option<&str> {
        match self.0.first() {
            Some(Traverser::Root(name)) => Some(name),
            _ => None,
        }
    }

    /// Steps after the root
    pub fn steps(&self) -> &[Traverser] {
        match self.0.first() {
            Some(Traverser::Root(_)) => &self.0[1..],
            _ => &self.0,
        }
    }

    /// The name selected by the first step after the root (`global.<name>` or `global["<name>"]`)
    pub fn first_key(&self) -> Option<&str> {
        match self.steps().first() {
            Some(Traverser::Attr(name)) => Some(name),
            Some(Traverser::Index(Value::String(name))) => Some(name),
            _ => None,
        }
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&crate::tokens::tokens_for_expr(self), f)
    }
}
