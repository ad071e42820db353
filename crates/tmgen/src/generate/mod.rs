//! code generation
//!
//! [run] walks every stack of a [ProjectTree] (sorted by path) and materializes the
//! `generate_hcl` / `generate_file` blocks declared in the stack directory and its ancestors.
//! `generate_file` blocks with `context = root` form one additional unit reported under `/`.
//!
//! Each unit is planned completely before anything is written: a failure in any block fails the
//! unit without touching its files, other units continue. Generated files start with [HEADER];
//! files without it are never overwritten or deleted.
//!
//! Classification per target file:
//! - created: the file does not exist
//! - changed: the file exists with different content
//! - unchanged: same content, not reported
//! - deleted: a managed file in the unit's directories that no block produced
mod report;

pub use report::{DirResult, FailureResult, Report};

use crate::config::{DirConfig, GenContext, HclBody, BodyItem, ProjectTree, SourceLocation};
use crate::eval::{Context, EvalError, Functions};
use crate::globals::{resolve_globals, Globals, GlobalsError};
use crate::metadata::{root_metadata, stack_metadata};
use crate::project_path::ProjectPath;
use crate::tokens::Tokens;
use crate::value::Value;
use crate::vendor::{VendorDir, VendorError, VendorResolver};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

/// First line of every generated file
pub const HEADER: &str = "// TERRAMATE: GENERATED AUTOMATICALLY DO NOT EDIT";

#[derive(Debug, Clone, Default)]
pub struct Options {
    /// compute the report without writing
    pub dry_run: bool,
    /// only generate for stacks at or below this directory
    pub dir: Option<ProjectPath>,
    /// units not started by then fail with [GenerateError::DeadlineExceeded]
    pub deadline: Option<Instant>,
}

#[derive(thiserror::Error, Debug)]
pub enum GenerateError {
    #[error("refusing to overwrite {path}: file was not generated (header missing)")]
    Collision { path: ProjectPath },
    #[error("{origin}: resolving vendor reference `{reference}`")]
    Vendor {
        origin: SourceLocation,
        reference: String,
        #[source]
        source: VendorError,
    },
    #[error("{origin}: evaluation failed")]
    Eval {
        origin: SourceLocation,
        #[source]
        source: EvalError,
    },
    #[error("resolving globals")]
    Globals(#[from] GlobalsError),
    #[error("{origin}: invalid label `{label}`: {reason}")]
    InvalidLabel {
        origin: SourceLocation,
        label: String,
        reason: String,
    },
    #[error("{path} is generated by both {first} and {second}")]
    ConflictingTargets {
        path: ProjectPath,
        first: SourceLocation,
        second: SourceLocation,
    },
    #[error("deadline exceeded before generation started")]
    DeadlineExceeded,
    #[error("io error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GenerateError {
    fn eval(origin: &SourceLocation, error: EvalError) -> Self {
        match error {
            EvalError::Vendor { reference, source } => GenerateError::Vendor {
                origin: origin.clone(),
                reference,
                source,
            },
            source => GenerateError::Eval {
                origin: origin.clone(),
                source,
            },
        }
    }

    fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| GenerateError::Io { path, source }
    }
}

/// Generates into `<vendor_dir>` relative vendor paths for `tm_vendor`
pub fn run(tree: &ProjectTree, vendor_dir: &ProjectPath, options: &Options) -> Report {
    run_with_resolver(tree, &VendorDir::new(vendor_dir.clone()), options)
}

#[tracing::instrument(skip_all, fields(root = %tree.root_dir().display(), dry_run = options.dry_run))]
pub fn run_with_resolver(
    tree: &ProjectTree,
    vendor: &dyn VendorResolver,
    options: &Options,
) -> Report {
    let functions = Functions::standard();
    let generator = Generator {
        tree,
        vendor,
        functions: &functions,
    };

    let mut units = vec![];
    let filter = options.dir.clone().unwrap_or_else(ProjectPath::root);
    // a stack at `/` owns the whole project, its unit takes the root blocks too
    if filter.is_root() && !tree.is_stack(&ProjectPath::root()) {
        units.push(Unit::Root);
    }
    units.extend(
        tree.stacks()
            .filter(|stack| filter.is_ancestor_or_self_of(&stack.path))
            .map(Unit::Stack),
    );

    let mut report = Report::default();
    for unit in units {
        let dir = unit.dir();

        if options.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            report.push_failure(dir, GenerateError::DeadlineExceeded);
            continue;
        }

        tracing::info!(%dir, "generating");
        let result = generator
            .plan(&unit)
            .and_then(|plan| plan.apply(tree, options.dry_run));
        match result {
            Ok(result) => report.push_success(result),
            Err(error) => report.push_failure(dir, error),
        }
    }

    report.sort();
    report
}

enum Unit<'t> {
    Stack(&'t DirConfig),
    /// `generate_file` blocks with `context = root`
    Root,
}

impl Unit<'_> {
    fn dir(&self) -> ProjectPath {
        match self {
            Unit::Stack(stack) => stack.path.clone(),
            Unit::Root => ProjectPath::root(),
        }
    }
}

struct Generator<'g> {
    tree: &'g ProjectTree,
    vendor: &'g dyn VendorResolver,
    functions: &'g Functions,
}

/// A generated file
struct Generated {
    target: ProjectPath,
    content: String,
    origin: SourceLocation,
}

impl<'g> Generator<'g> {
    fn plan(&self, unit: &Unit) -> Result<Plan, GenerateError> {
        let generated = match unit {
            Unit::Stack(stack) if stack.path.is_root() => {
                let mut generated = self.generate_stack(stack)?;
                generated.extend(self.generate_root()?);
                generated
            }
            Unit::Stack(stack) => self.generate_stack(stack)?,
            Unit::Root => self.generate_root()?,
        };

        let dir = unit.dir();
        let mut targets: BTreeMap<ProjectPath, Generated> = BTreeMap::new();
        for file in generated {
            if let Some(first) = targets.get(&file.target) {
                return Err(GenerateError::ConflictingTargets {
                    path: file.target,
                    first: first.origin.clone(),
                    second: file.origin,
                });
            }
            targets.insert(file.target.clone(), file);
        }

        let managed = self.managed_files(unit)?;
        Plan::new(self.tree, dir, targets, managed)
    }

    fn generate_stack(&self, stack: &DirConfig) -> Result<Vec<Generated>, GenerateError> {
        let metadata = stack_metadata(self.tree, stack);
        let globals = resolve_globals(self.tree, &stack.path, self.functions, Some(&metadata))?;

        let mut generated = vec![];
        for dir in self.tree.ancestors_or_self(&stack.path) {
            for block in &dir.generate_hcl {
                let target = self.stack_target(stack, &block.label, &block.origin)?;
                let ctx = self.context(&metadata, Some(&globals), &target);

                if !condition(&ctx, block.condition.as_ref(), &block.origin)? {
                    tracing::debug!(label = %block.label, origin = %block.origin, "condition is false, skipping");
                    continue;
                }

                let body = render_body(&ctx, &block.content)
                    .map_err(|e| GenerateError::eval(&block.origin, e))?;
                generated.push(Generated {
                    target,
                    content: format!("{HEADER}\n\n{body}"),
                    origin: block.origin.clone(),
                });
            }

            for block in &dir.generate_file {
                if block.context != GenContext::Stack {
                    continue;
                }

                let target = self.stack_target(stack, &block.label, &block.origin)?;
                let ctx = self.context(&metadata, Some(&globals), &target);

                if !condition(&ctx, block.condition.as_ref(), &block.origin)? {
                    tracing::debug!(label = %block.label, origin = %block.origin, "condition is false, skipping");
                    continue;
                }

                let content = string_content(&ctx, &block.content, &block.origin)?;
                generated.push(Generated {
                    target,
                    content: format!("{HEADER}\n{content}"),
                    origin: block.origin.clone(),
                });
            }
        }

        Ok(generated)
    }

    fn generate_root(&self) -> Result<Vec<Generated>, GenerateError> {
        let metadata = root_metadata(self.tree);

        let mut generated = vec![];
        for dir in self.tree.dirs() {
            for block in &dir.generate_file {
                if block.context != GenContext::Root {
                    continue;
                }

                let target = self.root_target(&block.label, &block.origin)?;
                let ctx = self.context(&metadata, None, &target);

                if !condition(&ctx, block.condition.as_ref(), &block.origin)? {
                    tracing::debug!(label = %block.label, origin = %block.origin, "condition is false, skipping");
                    continue;
                }

                let content = string_content(&ctx, &block.content, &block.origin)?;
                generated.push(Generated {
                    target,
                    content: format!("{HEADER}\n{content}"),
                    origin: block.origin.clone(),
                });
            }
        }

        Ok(generated)
    }

    fn context<'c>(
        &'c self,
        metadata: &'c Value,
        globals: Option<&'c Globals>,
        target: &ProjectPath,
    ) -> Context<'c> {
        let mut ctx = Context::new(self.functions)
            .with_metadata(metadata)
            .with_vendor(self.vendor, target.parent().unwrap_or_else(ProjectPath::root));
        if let Some(globals) = globals {
            ctx = ctx.with_globals(globals);
        }
        ctx
    }

    /// Target of a stack block: relative to the stack, outside of child stacks
    fn stack_target(
        &self,
        stack: &DirConfig,
        label: &str,
        origin: &SourceLocation,
    ) -> Result<ProjectPath, GenerateError> {
        let invalid = |reason: &str| GenerateError::InvalidLabel {
            origin: origin.clone(),
            label: label.to_string(),
            reason: reason.to_string(),
        };

        check_label(label).map_err(invalid)?;
        if label.starts_with('/') {
            return Err(invalid("must be relative to the stack"));
        }

        let target = stack.path.join(label);
        if let Some(child) = self.enclosing_stack(&target) {
            if child.path != stack.path {
                return Err(invalid(&format!("inside child stack {}", child.path)));
            }
        }
        Ok(target)
    }

    /// Target of a root block: absolute, outside of every stack
    fn root_target(&self, label: &str, origin: &SourceLocation) -> Result<ProjectPath, GenerateError> {
        let invalid = |reason: &str| GenerateError::InvalidLabel {
            origin: origin.clone(),
            label: label.to_string(),
            reason: reason.to_string(),
        };

        check_label(label).map_err(invalid)?;
        if !label.starts_with('/') {
            return Err(invalid("must be absolute for context root"));
        }

        let target = ProjectPath::new(label);
        if target.is_root() {
            return Err(invalid("must name a file"));
        }
        if let Some(stack) = self.enclosing_stack(&target) {
            return Err(invalid(&format!("inside stack {}", stack.path)));
        }
        Ok(target)
    }

    /// Deepest stack containing `path`
    fn enclosing_stack(&self, path: &ProjectPath) -> Option<&'g DirConfig> {
        let dir = path.parent()?;
        self.tree
            .ancestors_or_self(&dir)
            .filter(|dir| dir.is_stack())
            .last()
    }

    /// Generated files currently on disk that belong to the unit
    fn managed_files(&self, unit: &Unit) -> Result<Vec<ProjectPath>, GenerateError> {
        let start = unit.dir();
        let mut managed = vec![];
        if matches!(unit, Unit::Root) && self.tree.is_stack(&start) {
            return Ok(managed);
        }
        let mut pending = vec![start.clone()];

        while let Some(dir) = pending.pop() {
            let fs_dir = dir.to_fs_path(self.tree.root_dir());
            let entries = match std::fs::read_dir(&fs_dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(GenerateError::io(&fs_dir)(e)),
            };

            for entry in entries {
                let entry = entry.map_err(GenerateError::io(&fs_dir))?;
                let name = entry.file_name().to_string_lossy().to_string();
                if name.starts_with('.') {
                    continue;
                }

                let path = dir.join(&name);
                let file_type = entry.file_type().map_err(GenerateError::io(entry.path()))?;
                if file_type.is_dir() {
                    // child stacks (and for the root unit every stack) manage their own files
                    if self.tree.is_stack(&path) {
                        continue;
                    }
                    pending.push(path);
                } else if file_type.is_file() && is_managed(&entry.path())? {
                    managed.push(path);
                }
            }
        }

        Ok(managed)
    }
}

/// Label rules shared by every context
fn check_label(label: &str) -> Result<(), &'static str> {
    if label.is_empty() {
        return Err("must not be empty");
    }
    if label.split('/').any(|component| component == "..") {
        return Err("must not contain `..`");
    }
    if label.ends_with('/') {
        return Err("must name a file");
    }
    Ok(())
}

fn condition(
    ctx: &Context,
    condition: Option<&crate::ast::Expr>,
    origin: &SourceLocation,
) -> Result<bool, GenerateError> {
    let Some(condition) = condition else {
        return Ok(true);
    };

    match ctx.eval_value(condition) {
        Ok(Value::Boolean(enabled)) => Ok(enabled),
        Ok(other) => Err(GenerateError::eval(
            origin,
            EvalError::TypeMismatch {
                expected: "bool",
                found: other.type_name(),
            },
        )),
        Err(e) => Err(GenerateError::eval(origin, e)),
    }
}

fn string_content(
    ctx: &Context,
    content: &crate::ast::Expr,
    origin: &SourceLocation,
) -> Result<String, GenerateError> {
    match ctx.eval_value(content) {
        Ok(Value::String(content)) => Ok(content),
        Ok(other) => Err(GenerateError::eval(
            origin,
            EvalError::TypeMismatch {
                expected: "string",
                found: other.type_name(),
            },
        )),
        Err(e) => Err(GenerateError::eval(origin, e)),
    }
}

/// Partially evaluates and re-serializes a `generate_hcl` content body
pub fn render_body(ctx: &Context, body: &HclBody) -> Result<String, EvalError> {
    let mut tokens = Tokens::new();
    write_body(&mut tokens, ctx, body)?;
    Ok(tokens.to_string())
}

fn write_body(tokens: &mut Tokens, ctx: &Context, body: &HclBody) -> Result<(), EvalError> {
    for item in &body.0 {
        match item {
            BodyItem::Attribute { key, expr } => {
                let expr = ctx.partial_eval(expr)?;
                tokens.write_key(key);
                tokens.write_assign();
                tokens.write_expr(&expr);
                tokens.end_line();
            }
            BodyItem::Block(block) => {
                tokens.write_block_open(&block.ident, &block.labels);
                write_body(tokens, ctx, &block.body)?;
                tokens.write_block_close();
            }
        }
    }
    Ok(())
}

fn is_managed(path: &std::path::Path) -> Result<bool, GenerateError> {
    let content = std::fs::read(path).map_err(GenerateError::io(path))?;
    Ok(has_header(&content))
}

fn has_header(content: &[u8]) -> bool {
    content
        .strip_prefix(HEADER.as_bytes())
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(b"\n") || rest.starts_with(b"\r\n"))
}

/// File operations of a unit, decided before anything is written
struct Plan {
    result: DirResult,
    writes: Vec<(ProjectPath, String)>,
    deletes: Vec<ProjectPath>,
}

impl Plan {
    fn new(
        tree: &ProjectTree,
        dir: ProjectPath,
        targets: BTreeMap<ProjectPath, Generated>,
        managed: Vec<ProjectPath>,
    ) -> Result<Self, GenerateError> {
        let mut plan = Plan {
            result: DirResult::new(dir.clone()),
            writes: vec![],
            deletes: vec![],
        };

        for (target, file) in &targets {
            let fs_path = target.to_fs_path(tree.root_dir());
            let name = target.relative_to(&dir);

            match std::fs::read(&fs_path) {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(%target, "created");
                    plan.result.created.push(name);
                }
                Err(e) => return Err(GenerateError::io(fs_path)(e)),
                Ok(current) if !has_header(&current) => {
                    return Err(GenerateError::Collision {
                        path: target.clone(),
                    })
                }
                Ok(current) if current == file.content.as_bytes() => {
                    tracing::debug!(%target, "unchanged");
                    continue;
                }
                Ok(_) => {
                    tracing::debug!(%target, "changed");
                    plan.result.changed.push(name);
                }
            }
            plan.writes.push((target.clone(), file.content.clone()));
        }

        for path in managed {
            if !targets.contains_key(&path) {
                tracing::debug!(%path, "deleted");
                plan.result.deleted.push(path.relative_to(&dir));
                plan.deletes.push(path);
            }
        }

        Ok(plan)
    }

    fn apply(self, tree: &ProjectTree, dry_run: bool) -> Result<DirResult, GenerateError> {
        if dry_run {
            return Ok(self.result);
        }

        for (target, content) in &self.writes {
            write_atomic(&target.to_fs_path(tree.root_dir()), content)?;
        }
        for path in &self.deletes {
            let fs_path = path.to_fs_path(tree.root_dir());
            std::fs::remove_file(&fs_path).map_err(GenerateError::io(fs_path))?;
        }

        Ok(self.result)
    }
}

/// Replaces the content of `path` in one step (temporary file + rename)
fn write_atomic(path: &std::path::Path, content: &str) -> Result<(), GenerateError> {
    let dir = path.parent().unwrap_or(std::path::Path::new("."));
    std::fs::create_dir_all(dir).map_err(GenerateError::io(dir))?;

    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(GenerateError::io(dir))?;
    file.write_all(content.as_bytes())
        .map_err(GenerateError::io(file.path()))?;
    file.persist(path)
        .map_err(|e| GenerateError::io(path)(e.error))?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hcl_documents;
    use pretty_assertions::assert_eq;

    fn tree(root: &std::path::Path, dirs: &[(&str, &str)]) -> ProjectTree {
        ProjectTree::from_documents(
            root,
            dirs.iter()
                .map(|(path, source)| (ProjectPath::new(path), hcl_documents!(*source))),
        )
        .expect("valid configuration")
    }

    fn read(root: &std::path::Path, path: &str) -> String {
        std::fs::read_to_string(ProjectPath::new(path).to_fs_path(root)).unwrap()
    }

    #[test]
    fn renders_hcl_bodies() {
        let sandbox = tempfile::tempdir().unwrap();
        let tree = tree(
            sandbox.path(),
            &[
                ("/", "globals {\n region = \"eu-west-1\"\n}"),
                (
                    "/stack",
                    r#"
                    stack {}
                    generate_hcl "backend.tf" {
                      content {
                        terraform {
                          backend "s3" {
                            region = global.region
                            key    = "${terramate.stack.path.relative}/state"
                          }
                        }
                        name = var.name
                      }
                    }
                    "#,
                ),
            ],
        );

        let report = run(&tree, &ProjectPath::new("/modules"), &Options::default());
        assert!(!report.has_failures(), "{report}");

        insta::assert_snapshot!(read(sandbox.path(), "/stack/backend.tf"), @r###"
// TERRAMATE: GENERATED AUTOMATICALLY DO NOT EDIT

terraform {
  backend "s3" {
    region = "eu-west-1"
    key = "stack/state"
  }
}
name = var.name
"###);
    }

    #[test]
    fn conditions() {
        let sandbox = tempfile::tempdir().unwrap();
        let tree = tree(
            sandbox.path(),
            &[
                ("/", "globals {\n env = \"dev\"\n}"),
                (
                    "/stack",
                    r#"
                    stack {}
                    generate_file "prod.txt" {
                      condition = global.env == "prod"
                      content   = "prod"
                    }
                    generate_file "dev.txt" {
                      condition = global.env == "dev"
                      content   = "dev"
                    }
                    generate_file "broken.txt" {
                      condition = global.env
                      content   = "never"
                    }
                    "#,
                ),
            ],
        );

        let report = run(&tree, &ProjectPath::new("/modules"), &Options::default());
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            &report.failures[0].error,
            GenerateError::Eval {
                source: EvalError::TypeMismatch { expected: "bool", found: "string" },
                ..
            }
        ));
        assert!(!ProjectPath::new("/stack/dev.txt").to_fs_path(sandbox.path()).exists());
    }

    #[test]
    fn conflicting_targets() {
        let sandbox = tempfile::tempdir().unwrap();
        let tree = tree(
            sandbox.path(),
            &[
                ("/", "generate_file \"a.txt\" {\n content = \"root\"\n}"),
                ("/stack", "stack {}\ngenerate_file \"a.txt\" {\n content = \"stack\"\n}"),
            ],
        );

        let report = run(&tree, &ProjectPath::new("/modules"), &Options::default());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(
            report.failures[0].error.to_string(),
            r#"/stack/a.txt is generated by both /<inline> (generate_file "a.txt") and /stack/<inline> (generate_file "a.txt")"#
        );
    }

    #[test]
    fn invalid_labels() {
        let sandbox = tempfile::tempdir().unwrap();
        let tree = tree(
            sandbox.path(),
            &[
                ("/", "generate_file \"../escape.txt\" {\n content = \"x\"\n}"),
                ("/a", "stack {}\ngenerate_file \"b/file.txt\" {\n content = \"x\"\n}"),
                ("/a/b", "stack {}"),
            ],
        );

        let report = run(&tree, &ProjectPath::new("/modules"), &Options::default());
        let errors: Vec<_> = report
            .failures
            .iter()
            .map(|failure| (failure.dir.to_string(), failure.error.to_string()))
            .collect();
        assert_eq!(
            errors,
            vec![
                (
                    "/a".to_string(),
                    r#"/<inline> (generate_file "../escape.txt"): invalid label `../escape.txt`: must not contain `..`"#.to_string()
                ),
                (
                    "/a/b".to_string(),
                    r#"/<inline> (generate_file "../escape.txt"): invalid label `../escape.txt`: must not contain `..`"#.to_string()
                ),
            ]
        );
    }

    #[test]
    fn child_stack_targets_are_rejected() {
        let sandbox = tempfile::tempdir().unwrap();
        let tree = tree(
            sandbox.path(),
            &[
                ("/a", "stack {}\ngenerate_file \"b/file.txt\" {\n content = \"x\"\n}"),
                ("/a/b", "stack {}"),
            ],
        );

        let report = run(&tree, &ProjectPath::new("/modules"), &Options::default());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].dir, ProjectPath::new("/a"));
        assert!(matches!(
            &report.failures[0].error,
            GenerateError::InvalidLabel { reason, .. } if reason == "inside child stack /a/b"
        ));

        // the same block applies to the child stack, relative to it
        assert_eq!(
            report.successes,
            vec![DirResult {
                dir: ProjectPath::new("/a/b"),
                created: vec!["b/file.txt".into()],
                ..DirResult::default()
            }]
        );
    }

    #[test]
    fn root_context() {
        let sandbox = tempfile::tempdir().unwrap();
        let tree = tree(
            sandbox.path(),
            &[
                (
                    "/",
                    r#"
                    generate_file "/stacks.txt" {
                      context = root
                      content = tm_join(",", terramate.stacks.list)
                    }
                    "#,
                ),
                ("/stacks/a", "stack {}"),
                ("/stacks/b", "stack {}"),
            ],
        );

        let report = run(&tree, &ProjectPath::new("/modules"), &Options::default());
        assert_eq!(
            report.successes,
            vec![DirResult {
                dir: ProjectPath::root(),
                created: vec!["stacks.txt".into()],
                ..DirResult::default()
            }]
        );
        assert_eq!(
            read(sandbox.path(), "/stacks.txt"),
            format!("{HEADER}\n/stacks/a,/stacks/b")
        );
    }

    #[test]
    fn root_context_has_no_globals() {
        let sandbox = tempfile::tempdir().unwrap();
        let tree = tree(
            sandbox.path(),
            &[(
                "/",
                r#"
                globals {
                  a = 1
                }
                generate_file "/a.txt" {
                  context = root
                  content = "${global.a}"
                }
                "#,
            )],
        );

        let report = run(&tree, &ProjectPath::new("/modules"), &Options::default());
        assert!(matches!(
            &report.failures[0].error,
            GenerateError::Eval {
                source: EvalError::UnavailableNamespace("global"),
                ..
            }
        ));
    }

    #[test]
    fn vendor_paths_are_relative_to_the_generated_file() {
        let sandbox = tempfile::tempdir().unwrap();
        let tree = tree(
            sandbox.path(),
            &[
                (
                    "/",
                    r#"
                    globals {
                      module = tm_vendor("github.com/org/repo?ref=v1")
                    }
                    "#,
                ),
                (
                    "/stacks/app",
                    r#"
                    stack {}
                    generate_hcl "main.tf" {
                      content {
                        module "repo" {
                          source = global.module
                        }
                      }
                    }
                    generate_file "nested/source.txt" {
                      content = global.module
                    }
                    "#,
                ),
            ],
        );

        let report = run(&tree, &ProjectPath::new("/vendor"), &Options::default());
        assert!(!report.has_failures(), "{report}");
        assert_eq!(
            read(sandbox.path(), "/stacks/app/main.tf"),
            format!("{HEADER}\n\nmodule \"repo\" {{\n  source = \"../../vendor/github.com/org/repo/v1\"\n}}\n")
        );
        assert_eq!(
            read(sandbox.path(), "/stacks/app/nested/source.txt"),
            format!("{HEADER}\n../../../vendor/github.com/org/repo/v1")
        );
    }

    #[test]
    fn vendor_errors() {
        let sandbox = tempfile::tempdir().unwrap();
        let tree = tree(
            sandbox.path(),
            &[(
                "/stack",
                "stack {}\ngenerate_file \"a.txt\" {\n content = tm_vendor(\"./local\")\n}",
            )],
        );

        let report = run(&tree, &ProjectPath::new("/modules"), &Options::default());
        assert!(matches!(
            &report.failures[0].error,
            GenerateError::Vendor {
                source: VendorError::MissingRef(_),
                ..
            }
        ));
    }

    #[test]
    fn dry_run_and_dir_filter() {
        let sandbox = tempfile::tempdir().unwrap();
        let tree = tree(
            sandbox.path(),
            &[
                ("/", "generate_file \"a.txt\" {\n content = \"a\"\n}"),
                ("/one", "stack {}"),
                ("/two", "stack {}"),
            ],
        );

        let dry_run = Options {
            dry_run: true,
            ..Options::default()
        };
        let report = run(&tree, &ProjectPath::new("/modules"), &dry_run);
        assert_eq!(report.successes.len(), 2);
        assert!(!ProjectPath::new("/one/a.txt").to_fs_path(sandbox.path()).exists());

        let only_two = Options {
            dir: Some(ProjectPath::new("/two")),
            ..Options::default()
        };
        let report = run(&tree, &ProjectPath::new("/modules"), &only_two);
        assert_eq!(
            report
                .successes
                .iter()
                .map(|success| success.dir.to_string())
                .collect::<Vec<_>>(),
            vec!["/two"]
        );
    }

    #[test]
    fn deadline_keeps_nothing_started() {
        let sandbox = tempfile::tempdir().unwrap();
        let tree = tree(
            sandbox.path(),
            &[
                ("/", "generate_file \"a.txt\" {\n content = \"a\"\n}"),
                ("/one", "stack {}"),
            ],
        );

        let expired = Options {
            deadline: Some(Instant::now()),
            ..Options::default()
        };
        let report = run(&tree, &ProjectPath::new("/modules"), &expired);
        assert!(report.successes.is_empty());
        assert!(report
            .failures
            .iter()
            .all(|failure| matches!(failure.error, GenerateError::DeadlineExceeded)));
    }

    #[test]
    fn header_detection() {
        assert!(has_header(format!("{HEADER}\n\na = 1\n").as_bytes()));
        assert!(has_header(HEADER.as_bytes()));
        assert!(!has_header(b"a = 1\n"));
        assert!(!has_header(format!("{HEADER} and more").as_bytes()));
    }
}
