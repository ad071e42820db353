//! tmgen cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; tmgen ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate code for all stacks of the project
    ///
    /// Exits with status 1 when generation failed for any stack.
    Generate(GenerateCommand),

    /// Evaluate an expression in the context of the work directory
    ///
    /// Globals (and stack metadata when the work directory is a stack) are available.
    /// Parts that cannot be resolved are printed as HCL.
    #[command(alias = "evaluate")]
    Eval(EvalCommand),

    /// Print the globals visible in the work directory
    Globals,

    /// Print debug information for development
    Dev(DevCommand),
}

#[derive(Parser, Debug)]
pub struct GenerateCommand {
    /// Compute the report without writing any files
    #[clap(long)]
    pub dry_run: bool,

    /// Only generate for stacks at or below this project directory (e.g. `/stacks`)
    #[clap(long)]
    pub dir: Option<String>,

    /// Project directory modules are vendored into
    #[clap(long, default_value = "/modules")]
    pub vendor_dir: String,

    /// Give up on stacks not started within this many seconds
    #[clap(long)]
    pub timeout: Option<u64>,
}

#[derive(Parser, Debug)]
pub struct EvalCommand {
    #[clap(flatten)]
    pub output: OutputArgs,

    /// HCL expression to evaluate
    pub expression: String,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

#[derive(Parser, Debug)]
pub struct DevCommand {
    #[command(subcommand)]
    pub command: DevSubCommand,
}

#[derive(Subcommand, Debug)]
pub enum DevSubCommand {
    /// Loaded configuration of every project directory
    Tree,
}
