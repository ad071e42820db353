//! Generation scenarios
//!
//! Each test builds a project in a temporary directory, loads it from disk and runs generation
//! (possibly several times, editing the configuration in between).

use pretty_assertions::assert_eq;
use std::path::Path;
use tmgen::config::ProjectTree;
use tmgen::generate::{run, GenerateError, Options, Report, HEADER};
use tmgen::project_path::ProjectPath;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("TMGEN_LOG"))
        .with_test_writer()
        .try_init();
}

fn write(root: &Path, path: &str, content: &str) {
    let path = ProjectPath::new(path).to_fs_path(root);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn read(root: &Path, path: &str) -> String {
    std::fs::read_to_string(ProjectPath::new(path).to_fs_path(root)).unwrap()
}

fn exists(root: &Path, path: &str) -> bool {
    ProjectPath::new(path).to_fs_path(root).exists()
}

fn generate(root: &Path) -> Report {
    let tree = ProjectTree::load(root).expect("valid project");
    run(&tree, &ProjectPath::new("/modules"), &Options::default())
}

#[test]
fn created_changed_deleted() {
    init_logging();
    let sandbox = tempfile::tempdir().unwrap();
    let root = sandbox.path();

    write(root, "/stack/stack.tm", "stack {}");
    write(
        root,
        "/stack/gen.tm",
        r#"generate_file "file.txt" { content = "hi" }"#,
    );

    insta::assert_snapshot!(generate(root).to_string(), @r###"
Code generation report

Successes:

- /stack
	[+] file.txt

Hint: '+', '~' and '-' means the file was created, changed and deleted, respectively.
"###);
    assert_eq!(read(root, "/stack/file.txt"), format!("{HEADER}\nhi"));

    write(
        root,
        "/stack/gen.tm",
        r#"generate_file "file.txt" { content = "hi2" }"#,
    );
    insta::assert_snapshot!(generate(root).to_string(), @r###"
Code generation report

Successes:

- /stack
	[~] file.txt

Hint: '+', '~' and '-' means the file was created, changed and deleted, respectively.
"###);

    write(root, "/stack/gen.tm", "");
    insta::assert_snapshot!(generate(root).to_string(), @r###"
Code generation report

Successes:

- /stack
	[-] file.txt

Hint: '+', '~' and '-' means the file was created, changed and deleted, respectively.
"###);
    assert!(!exists(root, "/stack/file.txt"));
}

#[test]
fn second_run_has_nothing_to_do() {
    init_logging();
    let sandbox = tempfile::tempdir().unwrap();
    let root = sandbox.path();

    write(root, "/stacks/a/stack.tm", "stack {}");
    write(root, "/stacks/b/stack.tm", "stack {\n name = \"bee\"\n}");
    write(
        root,
        "/config.tm",
        r#"
        globals {
          prefix = "tm"
          tags   = { owner = "platform", stack = terramate.stack.name }
        }

        generate_hcl "main.tf" {
          content {
            locals {
              name = "${global.prefix}-${terramate.stack.name}"
              tags = global.tags
              env  = var.env
            }
          }
        }

        generate_file "name.txt" {
          content = terramate.stack.name
        }

        generate_file "/stacks.txt" {
          context = root
          content = tm_join("\n", terramate.stacks.list)
        }
        "#,
    );

    let first = generate(root);
    assert!(!first.has_failures(), "{first}");
    insta::assert_snapshot!(first.to_string(), @r###"
Code generation report

Successes:

- /
	[+] stacks.txt

- /stacks/a
	[+] main.tf
	[+] name.txt

- /stacks/b
	[+] main.tf
	[+] name.txt

Hint: '+', '~' and '-' means the file was created, changed and deleted, respectively.
"###);

    insta::assert_snapshot!(read(root, "/stacks/b/main.tf"), @r###"
// TERRAMATE: GENERATED AUTOMATICALLY DO NOT EDIT

locals {
  name = "tm-bee"
  tags = {
    owner = "platform"
    stack = "bee"
  }
  env = var.env
}
"###);
    assert_eq!(
        read(root, "/stacks.txt"),
        format!("{HEADER}\n/stacks/a\n/stacks/b")
    );

    assert_eq!(
        generate(root).to_string(),
        "Nothing to do, generated code is up to date"
    );
}

#[test]
fn collision_leaves_file_untouched() {
    init_logging();
    let sandbox = tempfile::tempdir().unwrap();
    let root = sandbox.path();

    write(root, "/stack/stack.tm", "stack {}");
    write(root, "/stack/file.txt", "hand written");
    write(
        root,
        "/stack/gen.tm",
        r#"
        generate_file "file.txt" { content = "generated" }
        generate_file "other.txt" { content = "generated" }
        "#,
    );

    let report = generate(root);
    assert_eq!(report.successes, vec![]);
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(
        &report.failures[0].error,
        GenerateError::Collision { path } if path.as_str() == "/stack/file.txt"
    ));

    assert_eq!(read(root, "/stack/file.txt"), "hand written");
    // the stack is the unit, nothing of it is written
    assert!(!exists(root, "/stack/other.txt"));
}

#[test]
fn failures_are_scoped_to_the_stack() {
    init_logging();
    let sandbox = tempfile::tempdir().unwrap();
    let root = sandbox.path();

    write(root, "/good/stack.tm", "stack {}");
    write(
        root,
        "/bad/stack.tm",
        "stack {}\nglobals {\n x = global.y\n y = global.x\n}",
    );
    write(
        root,
        "/gen.tm",
        r#"generate_file "out.txt" { content = "ok" }"#,
    );

    let report = generate(root);
    insta::assert_snapshot!(report.to_string(), @r###"
Code generation report

Successes:

- /good
	[+] out.txt

Failures:

- /bad
	error: resolving globals: cycle detected: global.x -> global.y -> global.x

Hint: '+', '~' and '-' means the file was created, changed and deleted, respectively.
"###);
    assert!(!exists(root, "/bad/out.txt"));
}

#[test]
fn orphans_of_child_stacks_are_kept() {
    init_logging();
    let sandbox = tempfile::tempdir().unwrap();
    let root = sandbox.path();

    write(root, "/parent/stack.tm", "stack {}");
    write(root, "/parent/child/stack.tm", "stack {}");
    write(
        root,
        "/parent/child/gen.tm",
        r#"generate_file "child.txt" { content = "child" }"#,
    );
    // managed but produced by nobody
    write(root, "/parent/sub/stale.txt", &format!("{HEADER}\nstale"));
    // hidden directories are never looked at
    write(root, "/parent/.cache/hidden.txt", &format!("{HEADER}\nhidden"));

    let report = generate(root);
    let summary: Vec<_> = report
        .successes
        .iter()
        .map(|success| {
            (
                success.dir.to_string(),
                success.created.clone(),
                success.deleted.clone(),
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            (
                "/parent".to_string(),
                vec![],
                vec!["sub/stale.txt".to_string()]
            ),
            (
                "/parent/child".to_string(),
                vec!["child.txt".to_string()],
                vec![]
            ),
        ]
    );
    assert!(exists(root, "/parent/child/child.txt"));
    assert!(exists(root, "/parent/.cache/hidden.txt"));
}

#[test]
fn invalid_configuration_is_reported_before_generation() {
    init_logging();
    let sandbox = tempfile::tempdir().unwrap();
    let root = sandbox.path();

    write(root, "/stack/stack.tm", "stack {}\nstray = 1");
    write(root, "/other/config.tm.hcl", "unknown_block {}");

    let err = ProjectTree::load(root).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @r###"
invalid configuration:
- /other/config.tm.hcl (unknown_block): unknown block type
- /stack/stack.tm (stray): attributes are not allowed outside of blocks
"###);
}

#[test]
fn root_stack_settles() {
    init_logging();
    let sandbox = tempfile::tempdir().unwrap();
    let root = sandbox.path();

    write(
        root,
        "/stack.tm",
        r#"
        stack {}

        generate_file "file.txt" {
          content = "root"
        }

        generate_hcl "nested/main.tf" {
          content {
            name = terramate.stack.path.absolute
          }
        }
        "#,
    );

    insta::assert_snapshot!(generate(root).to_string(), @r###"
Code generation report

Successes:

- /
	[+] file.txt
	[+] nested/main.tf

Hint: '+', '~' and '-' means the file was created, changed and deleted, respectively.
"###);
    assert_eq!(read(root, "/file.txt"), format!("{HEADER}\nroot"));

    for _ in 0..2 {
        assert_eq!(
            generate(root).to_string(),
            "Nothing to do, generated code is up to date"
        );
    }
    assert!(exists(root, "/nested/main.tf"));
}

#[test]
fn root_context_inside_root_stack_is_one_failure() {
    init_logging();
    let sandbox = tempfile::tempdir().unwrap();
    let root = sandbox.path();

    write(
        root,
        "/stack.tm",
        r#"
        stack {}

        generate_file "file.txt" {
          content = "root"
        }

        generate_file "/list.txt" {
          context = root
          content = "list"
        }
        "#,
    );

    let report = generate(root);
    assert_eq!(report.successes, vec![]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].dir, ProjectPath::root());
    assert!(matches!(
        &report.failures[0].error,
        GenerateError::InvalidLabel { label, .. } if label == "/list.txt"
    ));
    assert!(!exists(root, "/file.txt"));
}
