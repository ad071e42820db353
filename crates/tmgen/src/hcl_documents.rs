//! collection of hcl documents ([Body] and path to source file) of a single directory
//!
//! [HclDocuments] tracks
//! - the source path
//! - the root blocks
//! - the root attributes
//! and defines a numeric index for each. Once added those indices are stable (removal is not possible)
use hcl_edit::structure::{Attribute, Block, Body, Structure};
use std::path::{Path, PathBuf};

#[derive(Default, Debug)]
pub struct HclDocuments {
    sources: Vec<Source>,
    root_attributes: Vec<(usize, Attribute)>,
    root_blocks: Vec<(usize, Block)>,
}

impl HclDocuments {
    /// Inserts and indexes an hcl document
    pub fn insert(&mut self, document: Body, path: impl Into<Option<PathBuf>>) {
        let source_index = self.sources.len();
        self.sources.push(path.into());

        for structure in document.into_iter() {
            match structure {
                Structure::Block(block) => self.root_blocks.push((source_index, block)),
                Structure::Attribute(attribute) => {
                    self.root_attributes.push((source_index, attribute))
                }
            }
        }
    }

    pub fn attributes(&self) -> impl Iterator<Item = SourceAttribute> {
        self.root_attributes
            .iter()
            .enumerate()
            .map(|(index, (source_index, attribute))| {
                (index, &self.sources[*source_index], attribute)
            })
    }

    pub fn blocks(&self) -> impl Iterator<Item = SourceBlock> {
        self.root_blocks
            .iter()
            .enumerate()
            .map(|(index, (source_index, block))| (index, &self.sources[*source_index], block))
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }
}

impl HclDocuments {
    pub fn load_file(&mut self, file_path: &Path) -> Result<(), LoadError> {
        tracing::info!(path=%file_path.display(), "loading file");

        let file_contents = std::fs::read_to_string(file_path)?;
        let body = hcl_edit::parser::parse_body(&file_contents).map_err(|source| {
            LoadError::HclParseFailed {
                path: file_path.to_path_buf(),
                source,
            }
        })?;

        self.insert(body, Some(file_path.to_path_buf()));
        Ok(())
    }

    /// Loads every configuration file (`*.tm`, `*.tm.hcl`) of a directory, in file name order
    ///
    /// A directory without configuration files is not an error.
    pub fn load_directory(&mut self, dir_path: &Path) -> Result<(), LoadError> {
        let mut file_paths = vec![];

        for dir_entry in std::fs::read_dir(dir_path)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }

            if is_config_file(&dir_entry.file_name().to_string_lossy()) {
                file_paths.push(dir_entry.path());
            }
        }

        file_paths.sort();
        for file_path in file_paths {
            self.load_file(&file_path)?;
        }

        Ok(())
    }
}

pub fn is_config_file(file_name: &str) -> bool {
    !file_name.starts_with('.') && (file_name.ends_with(".tm") || file_name.ends_with(".tm.hcl"))
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error("Unable to parse hcl file {}", path.display())]
    HclParseFailed {
        path: PathBuf,
        #[source]
        source: hcl_edit::parser::Error,
    },
}

impl From<Body> for HclDocuments {
    fn from(value: Body) -> Self {
        let mut tree = HclDocuments::default();
        tree.insert(value, None);
        tree
    }
}

/// Utility macro to create [HclDocuments]
///
/// Create from a single document
/// ```
/// # use tmgen::hcl_documents;
/// hcl_documents!("globals { a = 42 }");
/// ```
///
/// Create from multiple documents (path required)
/// ```
/// # use tmgen::hcl_documents;
/// hcl_documents! {
///   "stack.tm" => "stack {}",
///   "globals.tm.hcl" => "globals { b = 2 }"
/// };
/// ```
///
/// # Panic
/// Panics on invalid input
///
/// ```should_panic
/// # use tmgen::hcl_documents;
/// hcl_documents!("not = valid = hcl");
/// ```
#[macro_export]
macro_rules! hcl_documents {
    // single document without source
    { $expr:expr } => {
        $crate::hcl_documents::HclDocuments::from(hcl_edit::parser::parse_body($expr).expect("body must parse"))
    };
    // multi document with sources
    { $($source:expr => $expr:expr),+ } => {{
        let mut docs = $crate::hcl_documents::HclDocuments::default();
        $(
            docs.insert(hcl_edit::parser::parse_body($expr).expect("body must parse"), Some(std::path::PathBuf::from($source)));
        )+

        docs
    }};
}

pub type Source = Option<PathBuf>;
pub type SourceAttribute<'a> = (usize, &'a Source, &'a Attribute);
pub type SourceBlock<'a> = (usize, &'a Source, &'a Block);

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    #[test]
    fn iterators() {
        let hcl_documents = hcl_documents! {r#"
        attr_1 = 1
        stack {}
        generate_file "a.txt" { content = "a" }
        attr_2 = 2
        attr_3 = 3
        "#};

        assert_eq!(hcl_documents.attributes().count(), 3);
        assert_eq!(hcl_documents.blocks().count(), 2);
    }

    #[test]
    fn config_file_names() {
        assert!(is_config_file("stack.tm"));
        assert!(is_config_file("globals.tm.hcl"));
        assert!(!is_config_file("main.tf"));
        assert!(!is_config_file(".hidden.tm"));
    }

    #[test]
    fn loads_config_files_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.tm"), "globals { b = 1 }").unwrap();
        std::fs::write(dir.path().join("a.tm.hcl"), "stack {}").unwrap();
        std::fs::write(dir.path().join("main.tf"), "not = valid = hcl").unwrap();

        let mut documents = HclDocuments::default();
        documents.load_directory(dir.path()).unwrap();

        assert_eq!(documents.source_count(), 2);
        let idents: Vec<_> = documents
            .blocks()
            .map(|(_, _, block)| block.ident.value().as_str().to_string())
            .collect();
        assert_eq!(idents, vec!["stack", "globals"]);
    }

    #[test]
    fn empty_directories_are_fine() {
        let dir = tempfile::tempdir().unwrap();
        let mut documents = HclDocuments::default();
        documents.load_directory(dir.path()).unwrap();
        assert_eq!(documents.source_count(), 0);
    }
}
