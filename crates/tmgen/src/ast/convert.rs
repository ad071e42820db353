//! lowering of parsed HCL ([hcl::Expression]) into [Expr]
use super::{
    Binary, BinaryOperator, Conditional, Expr, ForExpr, FuncCall, Index, ObjectItem, ObjectKey,
    RelativeTraversal, Splat, Traversal, Traverser, Unary, UnaryOperator,
};
use crate::value::Value;
use hcl::{
    expr::TemplateExpr,
    template::Element,
    Expression, Operation, TraversalOperator,
};
use std::iter::Peekable;
use std::str::FromStr;

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("Unable to parse hcl expression")]
    HclParseFailed(#[from] hcl_edit::parser::Error),
    #[error("Unable to parse template")]
    TemplateParseFailed(#[from] hcl::Error),
    #[error("template directives (%{{if}}, %{{for}}) are not supported")]
    UnsupportedDirective,
    #[error("unsupported expression: {0}")]
    Unsupported(String),
}

pub fn lower(expr: Expression) -> Result<Expr, ParseError> {
    let lowered = match expr {
        Expression::Null => Expr::Literal(Value::Null),
        Expression::Bool(bool) => Expr::Literal(bool.into()),
        Expression::Number(num) => Expr::Literal(num.into()),
        Expression::String(s) => Expr::Literal(s.into()),
        Expression::Array(array) => Expr::Tuple(lower_all(array)?),
        Expression::Object(object) => {
            let mut items = Vec::with_capacity(object.len());
            for (key, value) in object {
                items.push(ObjectItem {
                    key: lower_object_key(key)?,
                    value: lower(value)?,
                });
            }
            Expr::Object(items)
        }
        Expression::TemplateExpr(template_expr) => lower_template(&template_expr)?,
        Expression::Variable(variable) => Expr::variable(variable.as_str()),
        Expression::Traversal(traversal) => {
            let mut traversal = *traversal;
            // the parser attaches a unary operator to the term only, `!a.b` arrives as `(!a).b`
            if let Expression::Operation(operation) = traversal.expr {
                match *operation {
                    Operation::Unary(unop) => {
                        traversal.expr = unop.expr;
                        return lower(Expression::Operation(Box::new(Operation::Unary(
                            hcl::expr::UnaryOp::new(
                                unop.operator,
                                Expression::Traversal(Box::new(traversal)),
                            ),
                        ))));
                    }
                    binary => traversal.expr = Expression::Operation(Box::new(binary)),
                }
            }
            let base = lower(traversal.expr)?;
            apply_operators(base, &mut traversal.operators.into_iter().peekable())?
        }
        Expression::FuncCall(func_call) => {
            let func_call = *func_call;
            Expr::FuncCall(FuncCall {
                name: func_call.name.to_string(),
                args: lower_all(func_call.args)?,
                expand_final: func_call.expand_final,
            })
        }
        Expression::Parenthesis(expr) => Expr::Parens(Box::new(lower(*expr)?)),
        Expression::Conditional(cond) => {
            let cond = *cond;
            Expr::Conditional(Box::new(Conditional {
                condition: lower(cond.cond_expr)?,
                true_expr: lower(cond.true_expr)?,
                false_expr: lower(cond.false_expr)?,
            }))
        }
        Expression::Operation(operation) => match *operation {
            Operation::Unary(unop) => Expr::Unary(Box::new(Unary {
                operator: match unop.operator {
                    hcl::expr::UnaryOperator::Neg => UnaryOperator::Neg,
                    hcl::expr::UnaryOperator::Not => UnaryOperator::Not,
                },
                expr: lower(unop.expr)?,
            })),
            Operation::Binary(binop) => lower_binary(binop)?,
        },
        Expression::ForExpr(forexpr) => {
            let forexpr = *forexpr;
            Expr::For(Box::new(ForExpr {
                key_var: forexpr.key_var.map(|ident| ident.to_string()),
                value_var: forexpr.value_var.to_string(),
                collection: lower(forexpr.collection_expr)?,
                key_expr: forexpr.key_expr.map(lower).transpose()?,
                value_expr: lower(forexpr.value_expr)?,
                grouping: forexpr.grouping,
                condition: forexpr.cond_expr.map(lower).transpose()?,
            }))
        }
        #[allow(unreachable_patterns)]
        other => return Err(ParseError::Unsupported(format!("{other:?}"))),
    };

    Ok(lowered)
}

fn lower_all(exprs: Vec<Expression>) -> Result<Vec<Expr>, ParseError> {
    exprs.into_iter().map(lower).collect()
}

/// Rebuilds a binary chain by operator precedence
///
/// The parser produces right leaning chains: `a * b + c` arrives as `a * (b + c)` and a trailing
/// conditional is taken by the last operand, `a > b ? c : d` arrives as `a > (b ? c : d)`.
/// Operators of equal precedence associate to the left. Parenthesized operands are kept as they
/// are.
fn lower_binary(binop: hcl::expr::BinaryOp) -> Result<Expr, ParseError> {
    let first = lower(binop.lhs_expr)?;
    let mut chain = vec![];
    let mut operator = binop.operator;
    let mut branches = None;
    let mut rest = binop.rhs_expr;

    loop {
        rest = match rest {
            Expression::Operation(operation) => match *operation {
                Operation::Binary(next) => {
                    chain.push((operator, lower(next.lhs_expr)?));
                    operator = next.operator;
                    next.rhs_expr
                }
                unary => {
                    chain.push((operator, lower(Expression::Operation(Box::new(unary)))?));
                    break;
                }
            },
            // the whole chain is the condition
            Expression::Conditional(cond) if branches.is_none() => {
                let cond = *cond;
                branches = Some((lower(cond.true_expr)?, lower(cond.false_expr)?));
                cond.cond_expr
            }
            operand => {
                chain.push((operator, lower(operand)?));
                break;
            }
        };
    }

    let folded = fold_by_precedence(first, chain);
    Ok(match branches {
        Some((true_expr, false_expr)) => Expr::Conditional(Box::new(Conditional {
            condition: folded,
            true_expr,
            false_expr,
        })),
        None => folded,
    })
}

/// `first op1 e1 op2 e2 ...` into a tree, tighter binding operators deeper
fn fold_by_precedence(first: Expr, chain: Vec<(hcl::expr::BinaryOperator, Expr)>) -> Expr {
    fn reduce(operands: &mut Vec<Expr>, operators: &mut Vec<hcl::expr::BinaryOperator>) {
        if let (Some(operator), Some(rhs), Some(lhs)) =
            (operators.pop(), operands.pop(), operands.pop())
        {
            operands.push(Expr::Binary(Box::new(Binary {
                lhs,
                operator: lower_binary_operator(operator),
                rhs,
            })));
        }
    }

    let mut operands = vec![first];
    let mut operators: Vec<hcl::expr::BinaryOperator> = vec![];
    for (operator, operand) in chain {
        while operators
            .last()
            .is_some_and(|pending| pending.precedence() >= operator.precedence())
        {
            reduce(&mut operands, &mut operators);
        }
        operators.push(operator);
        operands.push(operand);
    }
    while !operators.is_empty() {
        reduce(&mut operands, &mut operators);
    }

    operands
        .pop()
        .expect("a chain reduces to a single operand")
}

fn lower_binary_operator(operator: hcl::expr::BinaryOperator) -> BinaryOperator {
    use hcl::expr::BinaryOperator as Op;

    match operator {
        Op::Eq => BinaryOperator::Eq,
        Op::NotEq => BinaryOperator::NotEq,
        Op::LessEq => BinaryOperator::LessEq,
        Op::GreaterEq => BinaryOperator::GreaterEq,
        Op::Less => BinaryOperator::Less,
        Op::Greater => BinaryOperator::Greater,
        Op::Mul => BinaryOperator::Mul,
        Op::Div => BinaryOperator::Div,
        Op::Mod => BinaryOperator::Mod,
        Op::Plus => BinaryOperator::Plus,
        Op::Minus => BinaryOperator::Minus,
        Op::And => BinaryOperator::And,
        Op::Or => BinaryOperator::Or,
    }
}

fn lower_object_key(key: hcl::ObjectKey) -> Result<ObjectKey, ParseError> {
    match key {
        hcl::ObjectKey::Identifier(ident) => Ok(ObjectKey::Ident(ident.to_string())),
        hcl::ObjectKey::Expression(expr) => Ok(ObjectKey::Expr(lower(expr)?)),
        #[allow(unreachable_patterns)]
        other => Err(ParseError::Unsupported(format!("{other:?}"))),
    }
}

fn lower_template(template_expr: &TemplateExpr) -> Result<Expr, ParseError> {
    let (source, quoted) = match template_expr {
        TemplateExpr::QuotedString(source) => (source.clone(), true),
        // `<<-` indentation is already stripped by the parser
        TemplateExpr::Heredoc(heredoc) => (heredoc.template.clone(), false),
        #[allow(unreachable_patterns)]
        other => return Err(ParseError::Unsupported(format!("{other:?}"))),
    };

    let template = hcl::Template::from_str(&source)?;

    let mut parts: Vec<Expr> = vec![];
    for element in template.elements() {
        match element {
            Element::Literal(literal) => {
                let literal = if quoted {
                    unescape(literal)
                } else {
                    literal.clone()
                };
                push_literal(&mut parts, literal);
            }
            Element::Interpolation(interpolation) => parts.push(lower(interpolation.expr.clone())?),
            Element::Directive(_) => return Err(ParseError::UnsupportedDirective),
            #[allow(unreachable_patterns)]
            other => return Err(ParseError::Unsupported(format!("{other:?}"))),
        }
    }

    Ok(collapse_template(parts))
}

/// Appends literal text, merging it with a preceding literal part
pub(crate) fn push_literal(parts: &mut Vec<Expr>, literal: String) {
    if let Some(Expr::Literal(Value::String(previous))) = parts.last_mut() {
        previous.push_str(&literal);
        return;
    }
    parts.push(Expr::Literal(Value::String(literal)));
}

/// Simplest expression for the given template parts
fn collapse_template(mut parts: Vec<Expr>) -> Expr {
    parts.retain(|part| !matches!(part, Expr::Literal(Value::String(s)) if s.is_empty()));

    match parts.len() {
        0 => Expr::Literal(Value::String(String::new())),
        1 => match parts.remove(0) {
            literal @ Expr::Literal(Value::String(_)) => literal,
            wrapped => Expr::TemplateWrap(Box::new(wrapped)),
        },
        _ => Expr::Template(parts),
    }
}

fn apply_operators<I>(mut current: Expr, operators: &mut Peekable<I>) -> Result<Expr, ParseError>
where
    I: Iterator<Item = TraversalOperator>,
{
    while let Some(operator) = operators.next() {
        current = match operator {
            TraversalOperator::GetAttr(ident) => push_step(current, Traverser::Attr(ident.to_string())),
            TraversalOperator::LegacyIndex(index) => {
                push_step(current, Traverser::Index(Value::Integer(index as i64)))
            }
            TraversalOperator::Index(expr) => match lower(expr)? {
                Expr::Literal(key @ (Value::Integer(_) | Value::String(_))) => {
                    push_step(current, Traverser::Index(key))
                }
                key => Expr::Index(Box::new(Index {
                    collection: current,
                    key,
                })),
            },
            // a full splat applies every following operator to each element
            TraversalOperator::FullSplat => {
                let each = apply_operators(Expr::AnonSymbol, operators)?;
                Expr::Splat(Box::new(Splat {
                    source: current,
                    each,
                }))
            }
            // an attribute splat only takes the attribute accesses directly following it
            TraversalOperator::AttrSplat => {
                let mut each = Expr::AnonSymbol;
                while let Some(TraversalOperator::GetAttr(_)) = operators.peek() {
                    if let Some(TraversalOperator::GetAttr(ident)) = operators.next() {
                        each = push_step(each, Traverser::Attr(ident.to_string()));
                    }
                }
                Expr::Splat(Box::new(Splat {
                    source: current,
                    each,
                }))
            }
            #[allow(unreachable_patterns)]
            other => return Err(ParseError::Unsupported(format!("{other:?}"))),
        };
    }

    Ok(current)
}

pub(crate) fn push_step(current: Expr, step: Traverser) -> Expr {
    match current {
        Expr::ScopeTraversal(mut traversal) => {
            traversal.0.push(step);
            Expr::ScopeTraversal(traversal)
        }
        Expr::RelativeTraversal(mut relative) => {
            relative.traversal.0.push(step);
            Expr::RelativeTraversal(relative)
        }
        source => Expr::RelativeTraversal(Box::new(RelativeTraversal {
            source,
            traversal: Traversal(vec![step]),
        })),
    }
}

/// Resolves the escape sequences of a quoted template literal
///
/// Unknown sequences are kept as they are.
fn unescape(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    let mut chars = literal.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.peek().copied() {
                Some('n') => {
                    chars.next();
                    out.push('\n');
                }
                Some('r') => {
                    chars.next();
                    out.push('\r');
                }
                Some('t') => {
                    chars.next();
                    out.push('\t');
                }
                Some('"') => {
                    chars.next();
                    out.push('"');
                }
                Some('\\') => {
                    chars.next();
                    out.push('\\');
                }
                Some(kind @ ('u' | 'U')) => {
                    let len = if kind == 'u' { 4 } else { 8 };
                    let lookahead: String = chars.clone().skip(1).take(len).collect();
                    match u32::from_str_radix(&lookahead, 16)
                        .ok()
                        .filter(|_| lookahead.len() == len)
                        .and_then(char::from_u32)
                    {
                        Some(decoded) => {
                            chars.nth(len);
                            out.push(decoded);
                        }
                        None => out.push('\\'),
                    }
                }
                _ => out.push('\\'),
            },
            '$' | '%' if chars.peek() == Some(&c) => {
                // `$${` and `%%{` are escaped template sequences
                let mut lookahead = chars.clone();
                lookahead.next();
                if lookahead.peek() == Some(&'{') {
                    chars.next();
                }
                out.push(c);
            }
            c => out.push(c),
        }
    }

    out
}
