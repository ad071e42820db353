use super::Visit;
use crate::ast::{Expr, ObjectKey, Traversal};

/// Recursively visit all scope [Traversal]s (`global.a`, `terramate.stack.name`, ...)
pub trait VisitTraversals {
    fn visit_traversals(&self, visitor: &mut dyn Visit<Traversal>);
}

impl VisitTraversals for Expr {
    fn visit_traversals(&self, visitor: &mut dyn Visit<Traversal>) {
        match self {
            Expr::Literal(_) | Expr::AnonSymbol => {}
            Expr::ScopeTraversal(traversal) => visitor.visit(traversal),
            Expr::Template(parts) | Expr::Tuple(parts) => {
                for part in parts {
                    part.visit_traversals(visitor);
                }
            }
            Expr::TemplateWrap(expr) | Expr::Parens(expr) => expr.visit_traversals(visitor),
            Expr::Unary(unary) => unary.expr.visit_traversals(visitor),
            Expr::Binary(binary) => {
                binary.lhs.visit_traversals(visitor);
                binary.rhs.visit_traversals(visitor);
            }
            Expr::Object(items) => {
                for item in items {
                    if let ObjectKey::Expr(key) = &item.key {
                        key.visit_traversals(visitor);
                    }
                    item.value.visit_traversals(visitor);
                }
            }
            Expr::Conditional(cond) => {
                cond.condition.visit_traversals(visitor);
                cond.true_expr.visit_traversals(visitor);
                cond.false_expr.visit_traversals(visitor);
            }
            Expr::FuncCall(call) => {
                for arg in &call.args {
                    arg.visit_traversals(visitor);
                }
            }
            Expr::Index(index) => {
                index.collection.visit_traversals(visitor);
                index.key.visit_traversals(visitor);
            }
            Expr::Splat(splat) => {
                splat.source.visit_traversals(visitor);
                splat.each.visit_traversals(visitor);
            }
            Expr::RelativeTraversal(relative) => relative.source.visit_traversals(visitor),
            Expr::For(forexpr) => {
                forexpr.collection.visit_traversals(visitor);
                forexpr
                    .key_expr
                    .iter()
                    .for_each(|e| e.visit_traversals(visitor));
                forexpr.value_expr.visit_traversals(visitor);
                forexpr
                    .condition
                    .iter()
                    .for_each(|e| e.visit_traversals(visitor));
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::parse_expression;
    use pretty_assertions::assert_eq;

    #[test]
    fn finds_nested_traversals() {
        let expr = parse_expression(
            r#"{ (global.key) = "${a.b}-${f(global.c[0])}", list = [for x in global.d : x if c] }"#,
        )
        .unwrap();

        let mut found = vec![];
        expr.visit_traversals(&mut |traversal: &Traversal| {
            found.push(traversal.root_name().unwrap_or_default().to_string())
        });

        assert_eq!(found, vec!["global", "a", "global", "global", "x", "c"]);
    }
}
