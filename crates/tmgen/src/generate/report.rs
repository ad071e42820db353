use super::GenerateError;
use crate::project_path::ProjectPath;

/// Outcome of a generation run
///
/// Entries are sorted by directory, file names within an entry are sorted too, so the text form
/// is stable for identical inputs.
#[derive(Debug, Default)]
pub struct Report {
    pub successes: Vec<DirResult>,
    pub failures: Vec<FailureResult>,
}

/// Files touched in a single directory, names relative to `dir`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirResult {
    pub dir: ProjectPath,
    pub created: Vec<String>,
    pub changed: Vec<String>,
    pub deleted: Vec<String>,
}

#[derive(Debug)]
pub struct FailureResult {
    pub dir: ProjectPath,
    pub error: GenerateError,
}

impl Report {
    /// Nothing created, changed, deleted and nothing failed
    pub fn is_empty(&self) -> bool {
        self.successes.is_empty() && self.failures.is_empty()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub(super) fn push_success(&mut self, mut result: DirResult) {
        if result.is_empty() {
            return;
        }
        result.created.sort();
        result.changed.sort();
        result.deleted.sort();
        self.successes.push(result);
    }

    pub(super) fn push_failure(&mut self, dir: ProjectPath, error: GenerateError) {
        tracing::debug!(%dir, %error, "generation failed");
        self.failures.push(FailureResult { dir, error });
    }

    pub(super) fn sort(&mut self) {
        self.successes.sort_by(|a, b| a.dir.cmp(&b.dir));
        self.failures.sort_by(|a, b| a.dir.cmp(&b.dir));
    }
}

impl DirResult {
    pub fn new(dir: ProjectPath) -> Self {
        Self {
            dir,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.changed.is_empty() && self.deleted.is_empty()
    }
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return f.write_str("Nothing to do, generated code is up to date");
        }

        let mut lines = vec!["Code generation report".to_string(), String::new()];

        if !self.successes.is_empty() {
            lines.extend(["Successes:".to_string(), String::new()]);
            for success in &self.successes {
                lines.push(format!("- {}", success.dir));
                lines.extend(success.created.iter().map(|file| format!("\t[+] {file}")));
                lines.extend(success.changed.iter().map(|file| format!("\t[~] {file}")));
                lines.extend(success.deleted.iter().map(|file| format!("\t[-] {file}")));
                lines.push(String::new());
            }
        }

        if !self.failures.is_empty() {
            lines.extend(["Failures:".to_string(), String::new()]);
            for failure in &self.failures {
                lines.push(format!("- {}", failure.dir));
                lines.push(format!("\terror: {}", error_chain(&failure.error)));
                lines.push(String::new());
            }
        }

        lines.push(
            "Hint: '+', '~' and '-' means the file was created, changed and deleted, respectively."
                .to_string(),
        );

        f.write_str(&lines.join("\n"))
    }
}

/// `error: cause: cause`
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
