//! globals resolution
//!
//! Globals declared in a directory are visible in that directory and every directory below it.
//! A redefinition in a subdirectory shadows the outer definition within that subtree.
//!
//! Resolving the globals of a directory happens in two phases:
//! 1. collect the definitions of the directory and its ancestors, root first, the deepest
//!    definition of each name wins ([overlay])
//! 2. evaluate the definitions in dependency order ([resolve]). Dependencies are found by
//!    looking for `global.<name>` traversals in the expression. A bare `global` depends on every
//!    global.
//!
//! The dependency walk uses an explicit stack and a per-name marker, so a cycle is reported as
//! [CyclicReferenceError] naming every global in it and deep dependency chains do not grow the
//! call stack.
use crate::ast::{Expr, Traversal};
use crate::config::{ProjectTree, SourceLocation};
use crate::eval::{Context, EvalError, Functions};
use crate::project_path::ProjectPath;
use crate::tokens::Tokens;
use crate::value::Value;
use crate::visit::VisitTraversals;
use indexmap::IndexMap;
use std::collections::HashMap;

/// A `global.<name>` reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference(pub String);

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "global.{}", self.0)
    }
}

/// A single `globals { name = expr }` attribute
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalDef {
    pub name: String,
    pub expr: Expr,
    /// directory the definition was declared in
    pub scope: ProjectPath,
    pub origin: SourceLocation,
}

/// Resolved globals
///
/// A global that could not be fully resolved (it refers to names unknown to this tool) is kept as
/// a partially evaluated expression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Globals(IndexMap<String, Expr>);

impl Globals {
    pub fn get(&self, name: &str) -> Option<&Expr> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Expr)> {
        self.0.iter().map(|(name, expr)| (name.as_str(), expr))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn insert(&mut self, name: impl Into<String>, expr: Expr) {
        self.0.insert(name.into(), expr);
    }
}

impl<K: Into<String>> FromIterator<(K, Expr)> for Globals {
    fn from_iter<T: IntoIterator<Item = (K, Expr)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// `global.<name> = <expr>`, one per line
impl std::fmt::Display for Globals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tokens = Tokens::new();
        for (name, expr) in self.iter() {
            tokens.push(crate::tokens::TokenKind::Ident, format!("global.{name}"));
            tokens.write_assign();
            tokens.write_expr(expr);
            tokens.end_line();
        }
        std::fmt::Display::fmt(&tokens, f)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("cycle detected: {}", .cycle.iter().map(ToString::to_string).collect::<Vec<_>>().join(" -> "))]
pub struct CyclicReferenceError {
    /// starts and ends with the same reference
    pub cycle: Vec<Reference>,
}

#[derive(thiserror::Error, Debug)]
pub enum GlobalsError {
    #[error(transparent)]
    Cycle(#[from] CyclicReferenceError),
    #[error("evaluating {reference} defined at {origin}")]
    Eval {
        reference: Reference,
        origin: SourceLocation,
        #[source]
        source: EvalError,
    },
}

/// Definitions visible at `scope`, in declaration order (root first)
pub fn overlay<'t>(tree: &'t ProjectTree, scope: &ProjectPath) -> IndexMap<&'t str, &'t GlobalDef> {
    let mut definitions = IndexMap::new();
    for dir in tree.ancestors_or_self(scope) {
        for global in &dir.globals {
            if let Some(shadowed) = definitions.insert(global.name.as_str(), global) {
                tracing::trace!(name = %global.name, shadowed = %shadowed.scope, by = %global.scope, "global shadowed");
            }
        }
    }
    definitions
}

/// Resolves the globals visible at `scope`
#[tracing::instrument(skip(tree, functions, metadata))]
pub fn resolve_globals(
    tree: &ProjectTree,
    scope: &ProjectPath,
    functions: &Functions,
    metadata: Option<&Value>,
) -> Result<Globals, GlobalsError> {
    resolve(&overlay(tree, scope), functions, metadata)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

struct Frame<'d> {
    name: &'d str,
    dependencies: Vec<String>,
    next: usize,
}

/// Evaluates definitions in dependency order
pub fn resolve(
    definitions: &IndexMap<&str, &GlobalDef>,
    functions: &Functions,
    metadata: Option<&Value>,
) -> Result<Globals, GlobalsError> {
    let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(definitions.len());
    let mut resolved = Globals::default();

    let frame = |name: &'_ str| {
        let definition = definitions[name];
        Frame {
            name: definition.name.as_str(),
            dependencies: dependencies(&definition.expr, definitions),
            next: 0,
        }
    };

    for start in definitions.keys().copied() {
        if marks.contains_key(start) {
            continue;
        }

        marks.insert(start, Mark::InProgress);
        let mut stack = vec![frame(start)];

        while let Some(top) = stack.last_mut() {
            if let Some(dependency) = top.dependencies.get(top.next) {
                top.next += 1;

                let Some((&dependency, _)) = definitions.get_key_value(dependency.as_str()) else {
                    // undefined, reported when evaluating the reference
                    continue;
                };

                match marks.get(dependency) {
                    Some(Mark::Done) => {}
                    Some(Mark::InProgress) => {
                        let position = stack
                            .iter()
                            .position(|frame| frame.name == dependency)
                            .unwrap_or_default();
                        let mut cycle: Vec<Reference> = stack[position..]
                            .iter()
                            .map(|frame| Reference(frame.name.to_string()))
                            .collect();
                        cycle.push(Reference(dependency.to_string()));
                        return Err(CyclicReferenceError { cycle }.into());
                    }
                    None => {
                        tracing::trace!(name = dependency, "resolving dependency");
                        marks.insert(dependency, Mark::InProgress);
                        stack.push(frame(dependency));
                    }
                }
                continue;
            }

            let Some(done) = stack.pop() else { break };
            let definition = definitions[done.name];

            let mut ctx = Context::new(functions).with_globals(&resolved);
            if let Some(metadata) = metadata {
                ctx = ctx.with_metadata(metadata);
            }

            let expr = ctx
                .partial_eval(&definition.expr)
                .map_err(|source| GlobalsError::Eval {
                    reference: Reference(definition.name.clone()),
                    origin: definition.origin.clone(),
                    source,
                })?;
            tracing::trace!(name = done.name, resolved = %expr, "global resolved");

            resolved.insert(done.name, expr);
            marks.insert(done.name, Mark::Done);
        }
    }

    // declaration order, not resolution order
    Ok(definitions
        .keys()
        .filter_map(|name| resolved.get(name).map(|expr| (*name, expr.clone())))
        .collect())
}

/// Names of the globals an expression refers to
///
/// The scan is syntactic: references in conditional branches count even when the
/// condition is constant, so `a = true ? 1 : global.b` with `b = global.a` is a cycle.
fn dependencies(expr: &Expr, definitions: &IndexMap<&str, &GlobalDef>) -> Vec<String> {
    let mut names = vec![];
    expr.visit_traversals(&mut |traversal: &Traversal| {
        if traversal.root_name() != Some("global") {
            return;
        }
        match traversal.first_key() {
            Some(name) => names.push(name.to_string()),
            None => names.extend(definitions.keys().map(|name| name.to_string())),
        }
    });
    names.dedup();
    names
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::parse_expression;
    use crate::hcl_documents;
    use pretty_assertions::assert_eq;

    fn project(dirs: &[(&str, &str)]) -> ProjectTree {
        ProjectTree::from_documents(
            "/project",
            dirs.iter().map(|(path, source)| {
                (
                    ProjectPath::new(path),
                    hcl_documents!(*source),
                )
            }),
        )
        .expect("valid configuration")
    }

    fn globals_at(tree: &ProjectTree, path: &str) -> Result<Globals, GlobalsError> {
        resolve_globals(tree, &ProjectPath::new(path), &Functions::standard(), None)
    }

    fn expr(source: &str) -> Expr {
        parse_expression(source).unwrap()
    }

    #[test]
    fn resolves_in_dependency_order() {
        let tree = project(&[(
            "/",
            r#"globals {
              c = "${global.b}-c"
              b = global.a * 2
              a = 1
            }"#,
        )]);

        let globals = globals_at(&tree, "/").unwrap();
        assert_eq!(
            globals.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            vec!["c", "b", "a"]
        );
        assert_eq!(globals.get("c"), Some(&Expr::Literal("2-c".into())));
    }

    #[test]
    fn shadowing_by_directory() {
        let tree = project(&[
            ("/", "globals {\n g = 1\n}"),
            ("/sub", "globals {\n g = 2\n}"),
            ("/sub/nested", "stack {}"),
            ("/other", "stack {}"),
        ]);

        let one = Some(Expr::Literal(Value::Integer(1)));
        let two = Some(Expr::Literal(Value::Integer(2)));
        assert_eq!(globals_at(&tree, "/other").unwrap().get("g").cloned(), one);
        assert_eq!(globals_at(&tree, "/sub").unwrap().get("g").cloned(), two);
        assert_eq!(globals_at(&tree, "/sub/nested").unwrap().get("g").cloned(), two);
    }

    #[test]
    fn shadowed_definitions_are_evaluated_where_used() {
        // `b` is defined at the root but sees the redefinition of `a`
        let tree = project(&[
            ("/", "globals {\n a = 1\n b = global.a + 1\n}"),
            ("/sub", "globals {\n a = 10\n}"),
        ]);

        let globals = globals_at(&tree, "/sub").unwrap();
        assert_eq!(globals.get("b"), Some(&Expr::Literal(Value::Integer(11))));
    }

    #[test]
    fn cycle_detection() {
        let tree = project(&[("/", "globals {\n x = global.y\n y = global.x\n}")]);

        let Err(GlobalsError::Cycle(err)) = globals_at(&tree, "/") else {
            panic!("cycle must be detected");
        };
        assert_eq!(
            err.cycle,
            vec![
                Reference("x".into()),
                Reference("y".into()),
                Reference("x".into())
            ]
        );
        assert_eq!(err.to_string(), "cycle detected: global.x -> global.y -> global.x");
    }

    #[test]
    fn untaken_branches_still_form_cycles() {
        let tree = project(&[("/", "globals {\n a = true ? 1 : global.b\n b = global.a\n}")]);
        assert!(matches!(globals_at(&tree, "/"), Err(GlobalsError::Cycle(_))));
    }

    #[test]
    fn self_reference_through_bare_global() {
        let tree = project(&[("/", "globals {\n all = global\n}")]);
        assert!(matches!(globals_at(&tree, "/"), Err(GlobalsError::Cycle(_))));
    }

    #[test]
    fn long_chains_do_not_recurse() {
        let mut source = String::from("globals {\n g0 = 0\n");
        for i in 1..2000 {
            source.push_str(&format!(" g{i} = global.g{} + 1\n", i - 1));
        }
        source.push('}');

        let tree = project(&[("/", source.as_str())]);
        let globals = globals_at(&tree, "/").unwrap();
        assert_eq!(globals.get("g1999"), Some(&Expr::Literal(Value::Integer(1999))));
    }

    #[test]
    fn unresolvable_parts_are_kept() {
        let tree = project(&[(
            "/",
            r#"globals {
              region = "eu"
              bucket = "${var.prefix}-${global.region}"
              vendored = tm_vendor("github.com/org/repo?ref=v1")
            }"#,
        )]);

        let globals = globals_at(&tree, "/").unwrap();
        assert_eq!(globals.get("bucket"), Some(&expr(r#""${var.prefix}-eu""#)));
        assert_eq!(
            globals.get("vendored"),
            Some(&expr(r#"tm_vendor("github.com/org/repo?ref=v1")"#))
        );
    }

    #[test]
    fn evaluation_errors_name_the_global() {
        let tree = project(&[("/", "globals {\n bad = global.missing\n}")]);

        let err = globals_at(&tree, "/").unwrap_err();
        assert_eq!(
            err.to_string(),
            "evaluating global.bad defined at /<inline> (global.bad)"
        );
        assert!(matches!(
            err,
            GlobalsError::Eval {
                source: EvalError::UnknownGlobal(name),
                ..
            } if name == "missing"
        ));
    }

    #[test]
    fn display() {
        let globals: Globals = [("a", Expr::Literal(Value::Integer(1))), ("b", expr("var.x"))]
            .into_iter()
            .collect();
        assert_eq!(globals.to_string(), "global.a = 1\nglobal.b = var.x\n");
    }
}
