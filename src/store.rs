//! Filesystem collaborator: locked environment documents and the
//! latest-version allowlist.
use crate::error::{Collaborator, LockError};
use crate::model::Environment;
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Destination for locked environment documents.
pub trait EnvironmentStore {
    /// Persist `environment` and return where it was written.
    fn write_environment(&mut self, environment: &Environment) -> Result<PathBuf, LockError>;
}

/// Writes `<dir>/<environment-name>.json`.
#[derive(Debug, Clone)]
pub struct DirEnvironmentStore {
    dir: PathBuf,
}

impl DirEnvironmentStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn environment_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

impl EnvironmentStore for DirEnvironmentStore {
    fn write_environment(&mut self, environment: &Environment) -> Result<PathBuf, LockError> {
        let path = self.environment_path(&environment.name);
        let text = render_environment(environment)?;
        let fs_err = |source: std::io::Error| {
            LockError::unreachable(
                Collaborator::Filesystem,
                format!("write {}", path.display()),
                source,
            )
        };
        fs::create_dir_all(&self.dir).map_err(fs_err)?;
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(fs_err)?;
        tmp.write_all(text.as_bytes()).map_err(fs_err)?;
        tmp.persist(&path).map_err(|err| fs_err(err.error))?;
        tracing::debug!(path = %path.display(), "environment written");
        Ok(path)
    }
}

/// Stable pretty JSON rendering of an environment document.
pub fn render_environment(environment: &Environment) -> Result<String, LockError> {
    let mut text = serde_json::to_string_pretty(environment).map_err(|err| {
        LockError::contract("environment document", err.to_string(), &environment.name)
    })?;
    text.push('\n');
    Ok(text)
}

/// Appliance references (`name-version`) eligible for locking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LatestAllowlist {
    references: BTreeSet<String>,
}

impl LatestAllowlist {
    /// Parse newline-delimited references; blank lines and `#` comments are ignored.
    pub fn parse(text: &str) -> Self {
        let references = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();
        Self { references }
    }

    pub fn load(path: &Path) -> Result<Self, LockError> {
        let text = fs::read_to_string(path).map_err(|source| {
            LockError::unreachable(
                Collaborator::Filesystem,
                format!("read {}", path.display()),
                source,
            )
        })?;
        Ok(Self::parse(&text))
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.references.contains(reference)
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}
