//! `terramate.*` namespace
//!
//! ```text
//! terramate.stack.name / description / id
//! terramate.stack.path.absolute / relative / basename / to_root
//! terramate.root.path.fs.absolute / basename
//! terramate.stacks.list
//! ```
//!
//! `stack` is only bound while evaluating for a stack.
use crate::config::{DirConfig, ProjectTree};
use crate::project_path::ProjectPath;
use crate::value::Value;
use indexmap::IndexMap;

/// Metadata bound while evaluating for the stack at `stack.path`
pub fn stack_metadata(tree: &ProjectTree, stack: &DirConfig) -> Value {
    let mut metadata = root_metadata(tree);
    if let Value::Object(namespace) = &mut metadata {
        namespace.insert("stack".to_string(), stack_object(stack));
    }
    metadata
}

/// Metadata bound while evaluating outside of any stack
pub fn root_metadata(tree: &ProjectTree) -> Value {
    let root_dir = tree.root_dir();
    let fs = object([
        ("absolute", root_dir.to_string_lossy().to_string().into()),
        (
            "basename",
            root_dir
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default()
                .into(),
        ),
    ]);

    let list: Vec<Value> = tree
        .stacks()
        .map(|stack| stack.path.to_string().into())
        .collect();

    object([
        ("root", object([("path", object([("fs", fs)]))])),
        ("stacks", object([("list", Value::Array(list))])),
    ])
}

fn stack_object(stack: &DirConfig) -> Value {
    let config = stack.stack.clone().unwrap_or_default();
    let path = &stack.path;

    let mut fields: Vec<(&str, Value)> = vec![
        (
            "name",
            config
                .name
                .unwrap_or_else(|| path.basename().to_string())
                .into(),
        ),
        ("description", config.description.unwrap_or_default().into()),
    ];
    if let Some(id) = config.id {
        fields.push(("id", id.into()));
    }
    fields.push((
        "path",
        object([
            ("absolute", path.to_string().into()),
            ("relative", path.relative().into()),
            ("basename", path.basename().into()),
            ("to_root", ProjectPath::root().relative_to(path).into()),
        ]),
    ));

    object(fields)
}

fn object<'k>(fields: impl IntoIterator<Item = (&'k str, Value)>) -> Value {
    Value::Object(
        fields
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect::<IndexMap<_, _>>(),
    )
}
