//! project relative paths
//!
//! A [ProjectPath] is an absolute path inside the project, rooted at `/` (the project root
//! directory). It uses `/` as separator on every platform and never has a trailing separator
//! (except for the root itself).
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProjectPath(String);

impl ProjectPath {
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Creates a normalized project path
    ///
    /// `.` components are dropped and `..` climbs up, but never above the root.
    pub fn new(path: impl AsRef<str>) -> Self {
        Self::root().join(path.as_ref())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|c| !c.is_empty())
    }

    /// Joins a path onto this one. An absolute `path` replaces `self`.
    pub fn join(&self, path: &str) -> Self {
        let mut components: Vec<&str> = if path.starts_with('/') {
            vec![]
        } else {
            self.components().collect()
        };

        for component in path.split('/') {
            match component {
                "" | "." => {}
                ".." => {
                    components.pop();
                }
                component => components.push(component),
            }
        }

        Self(format!("/{}", components.join("/")))
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }

        let mut components: Vec<&str> = self.components().collect();
        components.pop();
        Some(Self(format!("/{}", components.join("/"))))
    }

    pub fn basename(&self) -> &str {
        self.components().last().unwrap_or("")
    }

    /// All paths from the root down to (and including) `self`
    pub fn ancestors_or_self(&self) -> Vec<Self> {
        let mut paths = vec![Self::root()];
        let mut current = Self::root();
        for component in self.components() {
            current = current.join(component);
            paths.push(current.clone());
        }
        paths
    }

    pub fn is_ancestor_or_self_of(&self, other: &ProjectPath) -> bool {
        if self.is_root() || self == other {
            return true;
        }

        other
            .0
            .strip_prefix(&self.0)
            .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Path of `self` relative to `base`, `.` when both are equal
    pub fn relative_to(&self, base: &ProjectPath) -> String {
        let target: Vec<&str> = self.components().collect();
        let base: Vec<&str> = base.components().collect();

        let common = target
            .iter()
            .zip(base.iter())
            .take_while(|(a, b)| a == b)
            .count();

        let mut parts: Vec<&str> = std::iter::repeat("..").take(base.len() - common).collect();
        parts.extend(&target[common..]);

        if parts.is_empty() {
            return ".".to_string();
        }
        parts.join("/")
    }

    /// Path relative to the root, without the leading `/`
    pub fn relative(&self) -> &str {
        &self.0[1..]
    }

    pub fn to_fs_path(&self, root_dir: &Path) -> PathBuf {
        let mut path = root_dir.to_path_buf();
        path.extend(self.components());
        path
    }
}

impl Default for ProjectPath {
    fn default() -> Self {
        Self::root()
    }
}

impl std::fmt::Display for ProjectPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProjectPath {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl serde::Serialize for ProjectPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalizes() {
        assert_eq!(ProjectPath::new("").as_str(), "/");
        assert_eq!(ProjectPath::new("a/./b/").as_str(), "/a/b");
        assert_eq!(ProjectPath::new("/a/../../b").as_str(), "/b");
    }

    #[test]
    fn join_and_parent() {
        let stack = ProjectPath::new("/stacks/one");
        assert_eq!(stack.join("gen/file.hcl").as_str(), "/stacks/one/gen/file.hcl");
        assert_eq!(stack.join("/abs.txt").as_str(), "/abs.txt");
        assert_eq!(stack.parent(), Some(ProjectPath::new("/stacks")));
        assert_eq!(ProjectPath::root().parent(), None);
        assert_eq!(stack.basename(), "one");
    }

    #[test]
    fn ancestry() {
        let stack = ProjectPath::new("/stacks/one");
        assert_eq!(
            stack.ancestors_or_self(),
            vec![
                ProjectPath::root(),
                ProjectPath::new("/stacks"),
                ProjectPath::new("/stacks/one")
            ]
        );
        assert!(ProjectPath::new("/stacks").is_ancestor_or_self_of(&stack));
        assert!(!ProjectPath::new("/stack").is_ancestor_or_self_of(&stack));
        assert!(ProjectPath::root().is_ancestor_or_self_of(&stack));
    }

    #[test]
    fn relative_paths() {
        let vendored = ProjectPath::new("/modules/github.com/org/repo/main");
        assert_eq!(
            vendored.relative_to(&ProjectPath::new("/stack")),
            "../modules/github.com/org/repo/main"
        );
        assert_eq!(ProjectPath::root().relative_to(&ProjectPath::new("/a/b")), "../..");
        assert_eq!(ProjectPath::new("/a").relative_to(&ProjectPath::new("/a")), ".");
        assert_eq!(ProjectPath::new("/a/b").relative(), "a/b");
    }
}
