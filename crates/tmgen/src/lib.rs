//! # tmgen - stack code generation
//!
//! Generates files inside infrastructure *stacks* from HCL configuration, resolving a shared
//! `global` namespace along the way.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `tmgen` works internally.
//!
//! ### Terms
//!
//! - **project**: a directory tree, its root is the nearest directory containing `.git`
//! - **stack**: a project directory whose configuration contains a `stack {}` block
//! - **global**: a named expression declared in a `globals {}` block. It is visible in the declaring
//!   directory and all directories below it and can be shadowed further down
//! - **generation block**: `generate_hcl "<file>" { content { ... } }` or
//!   `generate_file "<file>" { content = ... }`. A block applies to every stack at or below the
//!   directory it is declared in
//!
//! ```hcl
//! globals {
//!   region = "eu-west-1"
//!   bucket = "state-${global.region}"
//! }
//!
//! generate_hcl "backend.tf" {
//!   content {
//!     terraform {
//!       backend "s3" {
//!         bucket = global.bucket
//!         key    = "${terramate.stack.path.relative}/terraform.tfstate"
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! ### Loading files
//!
//! Every directory's `*.tm` / `*.tm.hcl` files are parsed into [hcl_documents::HclDocuments] (at this
//! point they only have to be valid HCL) and then validated into a [config::DirConfig]. Issues of
//! all directories are collected and reported together ([config::ConfigErrors]).
//!
//! Expressions are lowered from [hcl::Expression] into the crate's own [ast::Expr] right away.
//!
//! ### Partial evaluation
//!
//! [eval::Context::partial_eval] resolves what it can (`global.*`, `terramate.*`, `tm_*` functions,
//! literals and operators on them) and keeps the rest as expression. `var.name`, `local.x` or a call
//! to a Terraform function are left for Terraform to evaluate:
//!
//! ```text
//! "${var.prefix}-${global.region}"  =>  "${var.prefix}-eu-west-1"
//! ```
//!
//! [tokens::Tokens] turns the result back into HCL text.
//!
//! ### Globals
//!
//! see [globals]
//!
//! ### Generation
//!
//! see [generate]. The result is a [generate::Report] listing created, changed and deleted files
//! per stack.
pub mod ast;
pub mod config;
pub mod eval;
pub mod generate;
pub mod globals;
pub mod hcl_documents;
pub mod metadata;
pub mod project_path;
pub mod tokens;
pub mod value;
pub mod vendor;
pub mod visit;
