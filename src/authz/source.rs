//! Where policy, entity and overlay configuration files come from.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::LoadError;
use crate::dispatch::Cancellation;
use crate::github::{GithubClient, Repository};

/// Configuration directory inside a repository.
pub const DEFAULT_CONFIG_DIR: &str = ".github/octoslash";

/// A read-only configuration directory. Paths are relative and `/`-separated.
///
/// A missing file or directory is `Ok(None)`, never an error.
pub trait ConfigSource: Send + Sync {
    fn read(&self, path: &str) -> Result<Option<String>, LoadError>;

    /// Names of the regular files directly inside `dir`.
    fn list(&self, dir: &str) -> Result<Option<Vec<String>>, LoadError>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

/// A directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalDir {
    root: PathBuf,
}

impl LocalDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }
}

fn io_error(path: &Path, source: std::io::Error) -> LoadError {
    LoadError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl ConfigSource for LocalDir {
    fn read(&self, path: &str) -> Result<Option<String>, LoadError> {
        let full = self.root.join(path);
        match std::fs::read_to_string(&full) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&full, e)),
        }
    }

    fn list(&self, dir: &str) -> Result<Option<Vec<String>>, LoadError> {
        let full = self.root.join(dir);
        let entries = match std::fs::read_dir(&full) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&full, e)),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_error(&full, e))?;
            let is_file = entry
                .file_type()
                .map_err(|e| io_error(&entry.path(), e))?
                .is_file();
            if is_file && let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(Some(names))
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

/// A directory in a GitHub repository, read through the contents API.
pub struct GithubContents {
    client: GithubClient,
    repo: Repository,
    base: String,
    cancel: Cancellation,
}

impl GithubContents {
    pub fn new(client: GithubClient, repo: Repository, base: impl Into<String>) -> Self {
        Self {
            client,
            repo,
            base: base.into().trim_matches('/').to_string(),
            cancel: Cancellation::new(),
        }
    }

    /// Abort outstanding reads when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    /// Whether the base directory exists in the repository.
    pub fn exists(&self) -> Result<bool, LoadError> {
        Ok(self.list("")?.is_some())
    }

    fn path(&self, relative: &str) -> String {
        match relative.trim_matches('/') {
            "" => self.base.clone(),
            relative => format!("{}/{relative}", self.base),
        }
    }
}

impl ConfigSource for GithubContents {
    fn read(&self, path: &str) -> Result<Option<String>, LoadError> {
        Ok(self
            .client
            .file_contents(&self.cancel, &self.repo, &self.path(path))?)
    }

    fn list(&self, dir: &str) -> Result<Option<Vec<String>>, LoadError> {
        Ok(self
            .client
            .directory_files(&self.cancel, &self.repo, &self.path(dir))?)
    }

    fn describe(&self) -> String {
        format!("{}:{}", self.repo.full_name(), self.base)
    }
}
