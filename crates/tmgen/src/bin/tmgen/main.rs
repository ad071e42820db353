mod cli;

use std::path::{Path, PathBuf};
use tmgen::config::ProjectTree;
use tmgen::project_path::ProjectPath;
use tmgen::value::Value;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("TMGEN_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Generate(generate_cli) => generate(generate_cli),
        cli::Command::Eval(eval_cli) => eval(eval_cli),
        cli::Command::Globals => globals(),
        cli::Command::Dev(dev_cli) => dev(dev_cli),
    };

    match command_result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            for error in e.chain() {
                eprintln!("{error}")
            }
            std::process::exit(1);
        }
    }
}

/// Runs code generation for the whole project, `Ok(false)` when any stack failed
pub fn generate(cli: cli::GenerateCommand) -> anyhow::Result<bool> {
    let project = Project::discover()?;
    let tree = ProjectTree::load(&project.root)?;

    let options = tmgen::generate::Options {
        dry_run: cli.dry_run,
        dir: cli.dir.map(ProjectPath::new),
        deadline: cli
            .timeout
            .map(|secs| std::time::Instant::now() + std::time::Duration::from_secs(secs)),
    };
    let report = tmgen::generate::run(&tree, &ProjectPath::new(&cli.vendor_dir), &options);

    println!("{report}");
    Ok(!report.has_failures())
}

pub fn eval(cli: cli::EvalCommand) -> anyhow::Result<bool> {
    let project = Project::discover()?;
    let tree = ProjectTree::load(&project.root)?;
    let scope = Scope::new(&tree, &project.work_dir);

    let expr = tmgen::ast::parse_expression(&cli.expression)?;
    let globals = scope.globals()?;
    let result = scope.context(&globals).partial_eval(&expr)?;

    match result.into_value() {
        Ok(value) => output(&cli.output, &value)?,
        Err(partial) => println!("{partial}"),
    }
    Ok(true)
}

pub fn globals() -> anyhow::Result<bool> {
    let project = Project::discover()?;
    let tree = ProjectTree::load(&project.root)?;
    let scope = Scope::new(&tree, &project.work_dir);

    print!("{}", scope.globals()?);
    Ok(true)
}

fn output(output: &cli::OutputArgs, value: &Value) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
        cli::OutputFormat::Json => {
            serde_json::to_writer_pretty(std::io::stdout(), value)?;
            println!();
        }
    };

    Ok(())
}

/// (tmgen-)developer utilities
///
/// A quick way to expose internal structures for debugging purposes
pub fn dev(cli: cli::DevCommand) -> anyhow::Result<bool> {
    use cli::DevSubCommand::*;

    let project = Project::discover()?;
    let tree = ProjectTree::load(&project.root)?;

    match cli.command {
        Tree => println!("{tree:#?}"),
    }

    Ok(true)
}

/// Project root and the work directory inside it
struct Project {
    root: PathBuf,
    work_dir: ProjectPath,
}

impl Project {
    /// The project root is the nearest directory (work directory or above) containing `.git`,
    /// the work directory itself otherwise
    fn discover() -> anyhow::Result<Self> {
        let cwd = std::env::current_dir()?;
        let root = cwd
            .ancestors()
            .find(|dir| dir.join(".git").exists())
            .unwrap_or(cwd.as_path())
            .to_path_buf();

        let work_dir = project_path(&root, &cwd);
        tracing::info!(root = %root.display(), %work_dir, "project discovered");
        Ok(Self { root, work_dir })
    }
}

fn project_path(root: &Path, dir: &Path) -> ProjectPath {
    let relative = dir.strip_prefix(root).unwrap_or(Path::new(""));
    let components: Vec<_> = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect();
    ProjectPath::new(components.join("/"))
}

/// Evaluation bindings of a project directory
struct Scope<'t> {
    tree: &'t ProjectTree,
    path: ProjectPath,
    functions: tmgen::eval::Functions,
    metadata: Value,
}

impl<'t> Scope<'t> {
    fn new(tree: &'t ProjectTree, path: &ProjectPath) -> Self {
        let metadata = match tree.dir(path).filter(|dir| dir.is_stack()) {
            Some(stack) => tmgen::metadata::stack_metadata(tree, stack),
            None => tmgen::metadata::root_metadata(tree),
        };

        Self {
            tree,
            path: path.clone(),
            functions: tmgen::eval::Functions::standard(),
            metadata,
        }
    }

    fn globals(&self) -> anyhow::Result<tmgen::globals::Globals> {
        Ok(tmgen::globals::resolve_globals(
            self.tree,
            &self.path,
            &self.functions,
            Some(&self.metadata),
        )?)
    }

    fn context<'s>(&'s self, globals: &'s tmgen::globals::Globals) -> tmgen::eval::Context<'s> {
        tmgen::eval::Context::new(&self.functions)
            .with_globals(globals)
            .with_metadata(&self.metadata)
    }
}
