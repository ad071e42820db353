//! project configuration tree
//!
//! Every directory of the project may contain configuration files (`*.tm`, `*.tm.hcl`, see
//! [crate::hcl_documents]). Their root blocks are checked and turned into a [DirConfig]:
//!
//! ```hcl
//! stack {
//!   name        = "app"
//!   description = "the app stack"
//! }
//!
//! globals {
//!   env = "prod"
//! }
//!
//! generate_hcl "backend.tf" {
//!   condition = global.env == "prod"
//!   content {
//!     terraform {
//!       backend "s3" { key = terramate.stack.path.relative }
//!     }
//!   }
//! }
//!
//! generate_file "/stacks.txt" {
//!   context = root
//!   content = tm_join("\n", terramate.stacks.list)
//! }
//! ```
//!
//! Problems are not reported one at a time: every [Issue] of every directory is collected into
//! [ConfigErrors].
use crate::ast::{self, Expr, ParseError};
use crate::globals::GlobalDef;
use crate::hcl_documents::{HclDocuments, LoadError, Source};
use crate::project_path::ProjectPath;
use crate::value::Value;
use hcl_edit::structure::{Block, Structure};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// All directories of a project with their configuration
#[derive(Debug)]
pub struct ProjectTree {
    root_dir: PathBuf,
    dirs: BTreeMap<ProjectPath, DirConfig>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirConfig {
    pub path: ProjectPath,
    pub stack: Option<StackConfig>,
    pub globals: Vec<GlobalDef>,
    pub generate_hcl: Vec<GenerateHcl>,
    pub generate_file: Vec<GenerateFile>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StackConfig {
    pub name: Option<String>,
    pub description: Option<String>,
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateHcl {
    pub label: String,
    pub condition: Option<Expr>,
    pub content: HclBody,
    pub origin: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateFile {
    pub label: String,
    pub condition: Option<Expr>,
    pub content: Expr,
    pub context: GenContext,
    pub origin: SourceLocation,
}

/// Where a `generate_file` block is evaluated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GenContext {
    /// once per stack at or below the declaring directory
    #[default]
    Stack,
    /// once for the whole project, with only project metadata bound
    Root,
}

/// Body of a `generate_hcl` content block
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HclBody(pub Vec<BodyItem>);

#[derive(Debug, Clone, PartialEq)]
pub enum BodyItem {
    Attribute { key: String, expr: Expr },
    Block(HclBlock),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HclBlock {
    pub ident: String,
    pub labels: Vec<String>,
    pub body: HclBody,
}

/// Where something was declared, for error messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: ProjectPath,
    pub item: String,
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.file, self.item)
    }
}

impl ProjectTree {
    /// Loads the configuration of every directory below `root_dir`. Hidden directories are
    /// skipped.
    pub fn load(root_dir: &Path) -> Result<Self, ConfigError> {
        let mut documents = vec![];
        let mut pending = vec![(ProjectPath::root(), root_dir.to_path_buf())];

        while let Some((path, fs_path)) = pending.pop() {
            let mut dir_documents = HclDocuments::default();
            dir_documents.load_directory(&fs_path)?;

            for dir_entry in std::fs::read_dir(&fs_path).map_err(LoadError::from)? {
                let dir_entry = dir_entry.map_err(LoadError::from)?;
                let name = dir_entry.file_name().to_string_lossy().to_string();
                if name.starts_with('.') || !dir_entry.file_type().map_err(LoadError::from)?.is_dir() {
                    continue;
                }
                pending.push((path.join(&name), dir_entry.path()));
            }

            documents.push((path, dir_documents));
        }

        // issues are reported in path order
        documents.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(Self::from_documents(root_dir, documents)?)
    }

    /// Builds the tree from already loaded documents, keyed by directory
    pub fn from_documents(
        root_dir: impl Into<PathBuf>,
        documents: impl IntoIterator<Item = (ProjectPath, HclDocuments)>,
    ) -> Result<Self, ConfigErrors> {
        let mut errors = ConfigErrors::new();
        let mut dirs = BTreeMap::new();

        for (path, documents) in documents {
            let config = DirConfig::parse(&path, &documents, &mut errors);
            dirs.insert(path, config);
        }

        if !errors.issues.is_empty() {
            return Err(errors);
        }

        // every ancestor exists, even without configuration
        let paths: Vec<ProjectPath> = dirs.keys().cloned().collect();
        for path in paths {
            for ancestor in path.ancestors_or_self() {
                dirs.entry(ancestor.clone())
                    .or_insert_with(|| DirConfig::empty(ancestor));
            }
        }
        dirs.entry(ProjectPath::root())
            .or_insert_with(|| DirConfig::empty(ProjectPath::root()));

        Ok(Self {
            root_dir: root_dir.into(),
            dirs,
        })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn dir(&self, path: &ProjectPath) -> Option<&DirConfig> {
        self.dirs.get(path)
    }

    /// All directories, sorted by path
    pub fn dirs(&self) -> impl Iterator<Item = &DirConfig> {
        self.dirs.values()
    }

    /// All stacks, sorted by path
    pub fn stacks(&self) -> impl Iterator<Item = &DirConfig> {
        self.dirs.values().filter(|dir| dir.is_stack())
    }

    pub fn is_stack(&self, path: &ProjectPath) -> bool {
        self.dir(path).is_some_and(DirConfig::is_stack)
    }

    /// Configuration of `path` and all its ancestors, root first
    pub fn ancestors_or_self(&self, path: &ProjectPath) -> impl Iterator<Item = &DirConfig> {
        path.ancestors_or_self()
            .into_iter()
            .filter_map(|ancestor| self.dirs.get(&ancestor))
    }
}

impl DirConfig {
    fn empty(path: ProjectPath) -> Self {
        Self {
            path,
            stack: None,
            globals: vec![],
            generate_hcl: vec![],
            generate_file: vec![],
        }
    }

    pub fn is_stack(&self) -> bool {
        self.stack.is_some()
    }

    fn parse(path: &ProjectPath, documents: &HclDocuments, e: &mut ConfigErrors) -> Self {
        let mut config = Self::empty(path.clone());

        for (_index, source, attribute) in documents.attributes() {
            e.log(Issue::RootAttribute(location(
                path,
                source,
                attribute.key.value().as_str(),
            )));
        }

        for (_index, source, block) in documents.blocks() {
            let ident = block.ident.value().as_str();
            let at = location(path, source, &block_name(block));

            match ident {
                "stack" => {
                    if config.stack.is_some() {
                        e.log(Issue::DuplicateStack(at));
                        continue;
                    }
                    if check_labels(block, 0, &at, e) {
                        config.stack = Some(parse_stack(block, &at, e));
                    }
                }
                "globals" => {
                    if check_labels(block, 0, &at, e) {
                        parse_globals(&mut config, block, &at, e);
                    }
                }
                "generate_hcl" => {
                    if check_labels(block, 1, &at, e) {
                        if let Some(generate) = parse_generate_hcl(block, &at, e) {
                            config.generate_hcl.push(generate);
                        }
                    }
                }
                "generate_file" => {
                    if check_labels(block, 1, &at, e) {
                        if let Some(generate) = parse_generate_file(block, &at, e) {
                            config.generate_file.push(generate);
                        }
                    }
                }
                // project wide settings, not used by code generation
                "terramate" => {}
                _ => e.log(Issue::UnknownBlockType(at)),
            }
        }

        config
    }
}

fn location(dir: &ProjectPath, source: &Source, item: &str) -> SourceLocation {
    let file = source
        .as_ref()
        .and_then(|path| path.file_name())
        .map(|name| dir.join(&name.to_string_lossy()))
        .unwrap_or_else(|| dir.join("<inline>"));

    SourceLocation {
        file,
        item: item.to_string(),
    }
}

fn block_name(block: &Block) -> String {
    let mut name = block.ident.value().as_str().to_string();
    for label in block.labels.iter() {
        name.push_str(&format!(" \"{}\"", label.as_str()));
    }
    name
}

fn check_labels(block: &Block, expected: usize, at: &SourceLocation, e: &mut ConfigErrors) -> bool {
    if block.labels.len() == expected {
        return true;
    }

    e.log(Issue::LabelCount {
        location: at.clone(),
        expected,
        found: block.labels.len(),
    });
    false
}

fn parse_expr(
    value: &hcl_edit::expr::Expression,
    at: &SourceLocation,
    e: &mut ConfigErrors,
) -> Option<Expr> {
    match ast::lower(value.clone().into()) {
        Ok(expr) => Some(expr),
        Err(err) => {
            e.log(Issue::Expression {
                location: at.clone(),
                message: error_chain(&err),
            });
            None
        }
    }
}

fn error_chain(err: &ParseError) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(&format!(": {cause}"));
        source = cause.source();
    }
    message
}

fn parse_stack(block: &Block, at: &SourceLocation, e: &mut ConfigErrors) -> StackConfig {
    let mut stack = StackConfig::default();

    for structure in block.body.iter() {
        let Structure::Attribute(attribute) = structure else {
            e.log(Issue::UnknownBlockType(at.clone()));
            continue;
        };

        let key = attribute.key.value().as_str();
        let slot = match key {
            "name" => &mut stack.name,
            "description" => &mut stack.description,
            "id" => &mut stack.id,
            _ => {
                e.log(Issue::UnknownAttribute {
                    location: at.clone(),
                    name: key.to_string(),
                });
                continue;
            }
        };

        match parse_expr(&attribute.value, at, e) {
            Some(Expr::Literal(Value::String(value))) => *slot = Some(value),
            Some(_) => e.log(Issue::ExpectedString {
                location: at.clone(),
                name: key.to_string(),
            }),
            None => {}
        }
    }

    stack
}

fn parse_globals(config: &mut DirConfig, block: &Block, at: &SourceLocation, e: &mut ConfigErrors) {
    for structure in block.body.iter() {
        let Structure::Attribute(attribute) = structure else {
            e.log(Issue::UnknownBlockType(at.clone()));
            continue;
        };

        let name = attribute.key.value().as_str().to_string();
        if config.globals.iter().any(|global| global.name == name) {
            e.log(Issue::DuplicateGlobal {
                location: at.clone(),
                name,
            });
            continue;
        }

        if let Some(expr) = parse_expr(&attribute.value, at, e) {
            config.globals.push(GlobalDef {
                origin: SourceLocation {
                    file: at.file.clone(),
                    item: format!("global.{name}"),
                },
                name,
                expr,
                scope: config.path.clone(),
            });
        }
    }
}

fn parse_generate_hcl(block: &Block, at: &SourceLocation, e: &mut ConfigErrors) -> Option<GenerateHcl> {
    let mut condition = None;
    let mut content = None;

    for structure in block.body.iter() {
        match structure {
            Structure::Attribute(attribute) if attribute.key.value().as_str() == "condition" => {
                condition = Some(parse_expr(&attribute.value, at, e)?);
            }
            Structure::Attribute(attribute) => e.log(Issue::UnknownAttribute {
                location: at.clone(),
                name: attribute.key.value().as_str().to_string(),
            }),
            Structure::Block(inner) if inner.ident.value().as_str() == "content" => {
                if content.is_some() {
                    e.log(Issue::DuplicateContent(at.clone()));
                    return None;
                }
                if !check_labels(inner, 0, at, e) {
                    return None;
                }
                content = Some(parse_body(&inner.body, at, e)?);
            }
            Structure::Block(_) => e.log(Issue::UnknownBlockType(at.clone())),
        }
    }

    let Some(content) = content else {
        e.log(Issue::MissingContent(at.clone()));
        return None;
    };

    Some(GenerateHcl {
        label: block.labels[0].as_str().to_string(),
        condition,
        content,
        origin: at.clone(),
    })
}

fn parse_body(body: &hcl_edit::structure::Body, at: &SourceLocation, e: &mut ConfigErrors) -> Option<HclBody> {
    let mut items = vec![];
    for structure in body.iter() {
        match structure {
            Structure::Attribute(attribute) => items.push(BodyItem::Attribute {
                key: attribute.key.value().as_str().to_string(),
                expr: parse_expr(&attribute.value, at, e)?,
            }),
            Structure::Block(block) => items.push(BodyItem::Block(HclBlock {
                ident: block.ident.value().as_str().to_string(),
                labels: block.labels.iter().map(|label| label.as_str().to_string()).collect(),
                body: parse_body(&block.body, at, e)?,
            })),
        }
    }
    Some(HclBody(items))
}

fn parse_generate_file(block: &Block, at: &SourceLocation, e: &mut ConfigErrors) -> Option<GenerateFile> {
    let mut condition = None;
    let mut content = None;
    let mut context = GenContext::default();

    for structure in block.body.iter() {
        let Structure::Attribute(attribute) = structure else {
            e.log(Issue::UnknownBlockType(at.clone()));
            continue;
        };

        match attribute.key.value().as_str() {
            "condition" => condition = Some(parse_expr(&attribute.value, at, e)?),
            "content" => content = Some(parse_expr(&attribute.value, at, e)?),
            "context" => {
                let expr = parse_expr(&attribute.value, at, e)?;
                // both `context = root` and `context = "root"` are accepted
                let name = match &expr {
                    Expr::ScopeTraversal(traversal) if traversal.steps().is_empty() => {
                        traversal.root_name().map(str::to_string)
                    }
                    Expr::Literal(Value::String(name)) => Some(name.clone()),
                    _ => None,
                };
                context = match name.as_deref() {
                    Some("stack") => GenContext::Stack,
                    Some("root") => GenContext::Root,
                    _ => {
                        e.log(Issue::InvalidContext {
                            location: at.clone(),
                            value: expr.to_string(),
                        });
                        return None;
                    }
                };
            }
            other => e.log(Issue::UnknownAttribute {
                location: at.clone(),
                name: other.to_string(),
            }),
        }
    }

    let Some(content) = content else {
        e.log(Issue::MissingContent(at.clone()));
        return None;
    };

    Some(GenerateFile {
        label: block.labels[0].as_str().to_string(),
        condition,
        content,
        context,
        origin: at.clone(),
    })
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Unable to load configuration")]
    Load(#[from] LoadError),
    #[error(transparent)]
    Invalid(#[from] ConfigErrors),
}

#[derive(derive_new::new, Debug)]
pub struct ConfigErrors {
    #[new(default)]
    issues: Vec<Issue>,
}

impl ConfigErrors {
    pub fn log(&mut self, issue: Issue) {
        tracing::trace!(?issue, "issue found");
        self.issues.push(issue);
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }
}

impl std::error::Error for ConfigErrors {}

impl std::fmt::Display for ConfigErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "invalid configuration:")?;
        for issue in &self.issues {
            writeln!(f, "- {issue}")?;
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Issue {
    #[error("{0}: attributes are not allowed outside of blocks")]
    RootAttribute(SourceLocation),
    #[error("{0}: unknown block type")]
    UnknownBlockType(SourceLocation),
    #[error("{0}: a directory can only declare one stack")]
    DuplicateStack(SourceLocation),
    #[error("{location}: expected {expected} label(s), found {found}")]
    LabelCount {
        location: SourceLocation,
        expected: usize,
        found: usize,
    },
    #[error("{location}: unknown attribute `{name}`")]
    UnknownAttribute {
        location: SourceLocation,
        name: String,
    },
    #[error("{location}: `{name}` must be a string literal")]
    ExpectedString {
        location: SourceLocation,
        name: String,
    },
    #[error("{location}: global `{name}` is defined more than once")]
    DuplicateGlobal {
        location: SourceLocation,
        name: String,
    },
    #[error("{0}: missing content")]
    MissingContent(SourceLocation),
    #[error("{0}: content must only be defined once")]
    DuplicateContent(SourceLocation),
    #[error("{location}: invalid context `{value}`, expected `root` or `stack`")]
    InvalidContext {
        location: SourceLocation,
        value: String,
    },
    #[error("{location}: {message}")]
    Expression {
        location: SourceLocation,
        message: String,
    },
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hcl_documents;
    use pretty_assertions::assert_eq;

    fn tree(documents: HclDocuments) -> Result<ProjectTree, ConfigErrors> {
        ProjectTree::from_documents("/project", [(ProjectPath::new("/stack"), documents)])
    }

    fn issues_for(documents: HclDocuments) -> Vec<Issue> {
        tree(documents).expect_err("must error").issues
    }

    fn inline(item: &str) -> SourceLocation {
        SourceLocation {
            file: ProjectPath::new("/stack/<inline>"),
            item: item.to_string(),
        }
    }

    #[test]
    fn root_attribute_errors() {
        let issues = issues_for(hcl_documents! {"root_attr = 1"});
        assert_eq!(issues, vec![Issue::RootAttribute(inline("root_attr"))]);
    }

    #[test]
    fn unknown_block_type_errors() {
        let issues = issues_for(hcl_documents! {"unknown_block_type {}"});
        assert_eq!(issues, vec![Issue::UnknownBlockType(inline("unknown_block_type"))]);
    }

    #[test]
    fn collects_all_issues() {
        let issues = issues_for(hcl_documents! {r#"
            stack "labelled" {}
            generate_file "a" "b" { content = "" }
            generate_file "c" { condition = true }
            globals {
              a = 1
            }
            globals {
              a = 2
            }
        "#});

        assert_eq!(
            issues,
            vec![
                Issue::LabelCount {
                    location: inline("stack \"labelled\""),
                    expected: 0,
                    found: 1
                },
                Issue::LabelCount {
                    location: inline("generate_file \"a\" \"b\""),
                    expected: 1,
                    found: 2
                },
                Issue::MissingContent(inline("generate_file \"c\"")),
                Issue::DuplicateGlobal {
                    location: inline("globals"),
                    name: "a".into()
                },
            ]
        );
    }

    #[test]
    fn parses_stack_and_generate_blocks() {
        let tree = tree(hcl_documents! {
            "stack.tm" => r#"
                stack {
                  name = "app"
                  id   = "app-id"
                }
                terramate {
                  required_version = "> 0.1"
                }
            "#,
            "gen.tm.hcl" => r#"
                globals {
                  env = "prod"
                }
                generate_hcl "backend.tf" {
                  condition = global.env == "prod"
                  content {
                    terraform {
                      backend "s3" { key = "a" }
                    }
                  }
                }
                generate_file "/list.txt" {
                  context = root
                  content = "x"
                }
            "#
        })
        .unwrap();

        let stack = tree.dir(&ProjectPath::new("/stack")).unwrap();
        assert_eq!(
            stack.stack,
            Some(StackConfig {
                name: Some("app".into()),
                description: None,
                id: Some("app-id".into()),
            })
        );
        assert_eq!(stack.globals[0].name, "env");
        assert_eq!(stack.globals[0].origin.to_string(), "/stack/gen.tm.hcl (global.env)");
        assert_eq!(stack.generate_hcl[0].label, "backend.tf");
        assert!(stack.generate_hcl[0].condition.is_some());
        assert!(matches!(
            &stack.generate_hcl[0].content.0[0],
            BodyItem::Block(HclBlock { ident, .. }) if ident == "terraform"
        ));
        assert_eq!(stack.generate_file[0].context, GenContext::Root);

        // ancestors are part of the tree even without configuration
        assert!(tree.dir(&ProjectPath::root()).is_some());
        assert_eq!(
            tree.stacks().map(|dir| dir.path.as_str()).collect::<Vec<_>>(),
            vec!["/stack"]
        );
    }

    #[test]
    fn invalid_context() {
        let issues = issues_for(hcl_documents! {r#"
            generate_file "a" {
              context = other
              content = ""
            }
        "#});
        assert_eq!(
            issues,
            vec![Issue::InvalidContext {
                location: inline("generate_file \"a\""),
                value: "other".into()
            }]
        );
    }

    #[test]
    fn loads_directory_tree() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("stacks/a")).unwrap();
        std::fs::create_dir_all(dir.path().join(".git/stack")).unwrap();
        std::fs::write(dir.path().join("globals.tm"), "globals { a = 1 }").unwrap();
        std::fs::write(dir.path().join("stacks/a/stack.tm"), "stack {}").unwrap();
        std::fs::write(dir.path().join(".git/stack/stack.tm"), "stack {}").unwrap();

        let tree = ProjectTree::load(dir.path()).unwrap();
        assert_eq!(
            tree.dirs().map(|dir| dir.path.as_str()).collect::<Vec<_>>(),
            vec!["/", "/stacks", "/stacks/a"]
        );
        assert!(tree.is_stack(&ProjectPath::new("/stacks/a")));
        assert_eq!(tree.dir(&ProjectPath::root()).unwrap().globals.len(), 1);
    }
}
