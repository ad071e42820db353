//! vendor reference resolution
//!
//! `tm_vendor(source)` maps a remote module source to the project directory the module is (or
//! will be) vendored at. Downloading is out of scope, only the path mapping lives here.
use crate::project_path::ProjectPath;

/// Resolves a module source to its vendored location
pub trait VendorResolver {
    fn resolve_vendor_ref(&self, source: &str) -> Result<ProjectPath, VendorError>;
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum VendorError {
    #[error("unsupported module source `{0}`")]
    UnsupportedSource(String),
    #[error("module source `{0}` has no `ref` query parameter")]
    MissingRef(String),
    #[error("module source `{module}` has an invalid {part}")]
    InvalidSource { module: String, part: &'static str },
}

/// Vendors every module below a single project directory: `<dir>/<host>/<path>/<ref>`
#[derive(Debug, Clone, PartialEq)]
pub struct VendorDir(ProjectPath);

impl VendorDir {
    pub fn new(dir: ProjectPath) -> Self {
        Self(dir)
    }

    pub fn dir(&self) -> &ProjectPath {
        &self.0
    }
}

impl Default for VendorDir {
    fn default() -> Self {
        Self(ProjectPath::new("/modules"))
    }
}

impl VendorResolver for VendorDir {
    fn resolve_vendor_ref(&self, source: &str) -> Result<ProjectPath, VendorError> {
        let module = ModuleSource::parse(source)?;
        tracing::trace!(source, host = module.host, path = module.path, reference = module.reference, "vendor reference parsed");

        Ok(self
            .0
            .join(module.host)
            .join(module.path)
            .join(module.reference))
    }
}

/// A remote git module source
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleSource<'s> {
    pub host: &'s str,
    pub path: &'s str,
    pub reference: &'s str,
}

impl<'s> ModuleSource<'s> {
    /// Parses the git module source forms
    /// - `github.com/org/repo?ref=v1`
    /// - `git::https://host/org/repo?ref=v1`
    /// - `git@host:org/repo.git?ref=v1`
    pub fn parse(source: &'s str) -> Result<Self, VendorError> {
        let (location, query) = source
            .split_once('?')
            .ok_or_else(|| VendorError::MissingRef(source.to_string()))?;

        let reference = query
            .split('&')
            .find_map(|pair| pair.strip_prefix("ref="))
            .filter(|reference| !reference.is_empty())
            .ok_or_else(|| VendorError::MissingRef(source.to_string()))?;

        let (host, path) = if let Some(url) = location.strip_prefix("git::") {
            let Some(rest) = url
                .strip_prefix("https://")
                .or_else(|| url.strip_prefix("http://"))
                .or_else(|| url.strip_prefix("ssh://"))
            else {
                return Err(VendorError::UnsupportedSource(source.to_string()));
            };
            let rest = rest.split_once('@').map_or(rest, |(_user, rest)| rest);
            rest.split_once('/').unwrap_or((rest, ""))
        } else if let Some(rest) = location.strip_prefix("git@") {
            rest.split_once(':').unwrap_or((rest, ""))
        } else if location.starts_with("github.com/") {
            location.split_once('/').unwrap_or((location, ""))
        } else {
            return Err(VendorError::UnsupportedSource(source.to_string()));
        };

        let path = path.trim_end_matches('/');
        let path = path.strip_suffix(".git").unwrap_or(path);

        let invalid = |part| VendorError::InvalidSource {
            module: source.to_string(),
            part,
        };
        if host.is_empty() || host.contains('/') {
            return Err(invalid("host"));
        }
        // refs such as `feature/x` nest below the module directory
        let is_relative_path =
            |s: &str| !s.split('/').any(|c| c.is_empty() || c == "." || c == "..");
        if path.is_empty() || !is_relative_path(path) {
            return Err(invalid("path"));
        }
        if !is_relative_path(reference) {
            return Err(invalid("ref"));
        }

        Ok(Self {
            host,
            path,
            reference,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn resolve(source: &str) -> Result<String, VendorError> {
        VendorDir::default()
            .resolve_vendor_ref(source)
            .map(|path| path.to_string())
    }

    #[test]
    fn source_forms() {
        assert_eq!(
            resolve("github.com/org/repo?ref=v1.0.0").unwrap(),
            "/modules/github.com/org/repo/v1.0.0"
        );
        assert_eq!(
            resolve("git::https://gitlab.com/group/sub/repo.git?ref=main").unwrap(),
            "/modules/gitlab.com/group/sub/repo/main"
        );
        assert_eq!(
            resolve("git@github.com:org/repo.git?ref=abc123").unwrap(),
            "/modules/github.com/org/repo/abc123"
        );
        assert_eq!(
            resolve("github.com/org/repo?ref=feature/x").unwrap(),
            "/modules/github.com/org/repo/feature/x"
        );
    }

    #[test]
    fn custom_vendor_dir() {
        let vendor = VendorDir::new(ProjectPath::new("/vendor"));
        assert_eq!(
            vendor
                .resolve_vendor_ref("github.com/org/repo?ref=v1")
                .unwrap()
                .to_string(),
            "/vendor/github.com/org/repo/v1"
        );
    }

    #[test]
    fn invalid_sources() {
        assert_eq!(
            resolve("github.com/org/repo"),
            Err(VendorError::MissingRef("github.com/org/repo".into()))
        );
        assert_eq!(
            resolve("github.com/org/repo?depth=1"),
            Err(VendorError::MissingRef("github.com/org/repo?depth=1".into()))
        );
        assert_eq!(
            resolve("./local/module?ref=v1"),
            Err(VendorError::UnsupportedSource("./local/module?ref=v1".into()))
        );
        assert_eq!(
            resolve("github.com/org/../repo?ref=v1"),
            Err(VendorError::InvalidSource {
                module: "github.com/org/../repo?ref=v1".into(),
                part: "path"
            })
        );
        assert_eq!(
            resolve("github.com/org/repo?ref=feature/../x"),
            Err(VendorError::InvalidSource {
                module: "github.com/org/repo?ref=feature/../x".into(),
                part: "ref"
            })
        );
    }
}
