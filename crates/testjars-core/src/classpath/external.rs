//! Classpath entries backed by an external artifact resolver.
//!
//! The harness does not know how artifacts are found; it only asks an
//! [`ArtifactResolver`] for the absolute paths behind a coordinate such as
//! `org.example:greeting-service:1.2.0`.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use super::ClasspathEntry;
use crate::error::{BoxError, HarnessError, Result};

/// Resolves an artifact coordinate to absolute filesystem paths.
///
/// Implementations may block on I/O. Errors are wrapped by
/// [`ExternalResolvedEntry`] together with the coordinate.
pub trait ArtifactResolver: Send + Sync + fmt::Debug {
    fn resolve(&self, coordinate: &str) -> std::result::Result<Vec<PathBuf>, BoxError>;
}

/// A classpath entry whose paths come from an [`ArtifactResolver`].
#[derive(Debug, Clone)]
pub struct ExternalResolvedEntry {
    coordinate: String,
    resolver: Arc<dyn ArtifactResolver>,
    resolved: Option<Vec<PathBuf>>,
}

impl ExternalResolvedEntry {
    pub fn new(coordinate: impl Into<String>, resolver: Arc<dyn ArtifactResolver>) -> Self {
        Self {
            coordinate: coordinate.into(),
            resolver,
            resolved: None,
        }
    }

    pub fn coordinate(&self) -> &str {
        &self.coordinate
    }
}

impl ClasspathEntry for ExternalResolvedEntry {
    fn resolve(&mut self) -> Result<Vec<PathBuf>> {
        if let Some(paths) = &self.resolved {
            return Ok(paths.clone());
        }
        let paths = self
            .resolver
            .resolve(&self.coordinate)
            .map_err(|source| {
                debug!(coordinate = %self.coordinate, error = %source, "artifact resolution failed");
                HarnessError::Resolution {
                    coordinate: self.coordinate.clone(),
                    source,
                }
            })?;
        debug!(coordinate = %self.coordinate, count = paths.len(), "resolved artifact");
        self.resolved = Some(paths.clone());
        Ok(paths)
    }
}

/// Resolves `group:artifact:version` coordinates from a local repository
/// laid out the Maven way (`<root>/<group path>/<artifact>/<version>/`).
///
/// Only the artifact's own jar is returned; transitive dependencies are not
/// followed and nothing is downloaded.
#[derive(Debug, Clone)]
pub struct LocalRepositoryResolver {
    root: PathBuf,
}

impl LocalRepositoryResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Use `~/.m2/repository`.
    pub fn user_default() -> Option<Self> {
        dirs::home_dir().map(|home| Self::new(home.join(".m2").join("repository")))
    }

    /// Compute the jar path for `coordinate` without checking existence.
    pub fn artifact_path(&self, coordinate: &str) -> std::result::Result<PathBuf, BoxError> {
        let parts: Vec<&str> = coordinate.split(':').collect();
        let (group, artifact, version, classifier) = match parts.as_slice() {
            [g, a, v] => (*g, *a, *v, None),
            [g, a, v, c] => (*g, *a, *v, Some(*c)),
            _ => {
                return Err(format!(
                    "expected group:artifact:version[:classifier], got '{coordinate}'"
                )
                .into());
            }
        };
        if [group, artifact, version].iter().any(|p| p.trim().is_empty()) {
            return Err(format!("coordinate '{coordinate}' has an empty component").into());
        }

        let file_name = match classifier {
            Some(c) => format!("{artifact}-{version}-{c}.jar"),
            None => format!("{artifact}-{version}.jar"),
        };
        let mut path = self.root.clone();
        path.extend(group.split('.'));
        Ok(path.join(artifact).join(version).join(file_name))
    }
}

impl ArtifactResolver for LocalRepositoryResolver {
    fn resolve(&self, coordinate: &str) -> std::result::Result<Vec<PathBuf>, BoxError> {
        let path = self.artifact_path(coordinate)?;
        if !path.is_file() {
            return Err(format!("artifact not found at {}", path.display()).into());
        }
        Ok(vec![std::path::absolute(&path)?])
    }
}
