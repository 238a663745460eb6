//! Access to the program's own bundled resources.
//!
//! Resources are addressed by `/`-separated names relative to the bundle
//! root (e.g. `app/config.yml`). A bundle is either embedded into the binary
//! at compile time with [`include_dir::include_dir!`] or read from a resource
//! directory on disk.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use include_dir::{Dir, DirEntry};
use walkdir::WalkDir;

use crate::error::{HarnessError, IoContext, Result};

/// A root from which named resources can be read and scanned.
#[derive(Clone)]
pub enum ResourceBundle {
    /// Resources compiled into the binary.
    Embedded(&'static Dir<'static>),
    /// Resources read from a directory at runtime.
    Directory(PathBuf),
}

impl fmt::Debug for ResourceBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Embedded(dir) => f
                .debug_tuple("Embedded")
                .field(&dir.path())
                .finish(),
            Self::Directory(root) => f.debug_tuple("Directory").field(root).finish(),
        }
    }
}

impl ResourceBundle {
    pub fn embedded(dir: &'static Dir<'static>) -> Self {
        Self::Embedded(dir)
    }

    pub fn directory(root: impl Into<PathBuf>) -> Self {
        Self::Directory(root.into())
    }

    /// Return `true` if a readable resource named `name` exists.
    pub fn exists(&self, name: &str) -> bool {
        let name = normalize(name);
        match self {
            Self::Embedded(dir) => dir.get_file(name).is_some(),
            Self::Directory(root) => root.join(name).is_file(),
        }
    }

    /// Read the full contents of the resource named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::ResourceNotFound`] if the resource is absent.
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        let normalized = normalize(name);
        match self {
            Self::Embedded(dir) => dir
                .get_file(normalized)
                .map(|file| file.contents().to_vec())
                .ok_or_else(|| HarnessError::ResourceNotFound(name.to_string())),
            Self::Directory(root) => {
                let path = root.join(normalized);
                if !path.is_file() {
                    return Err(HarnessError::ResourceNotFound(name.to_string()));
                }
                std::fs::read(&path).io_context(|| format!("failed to read resource {}", path.display()))
            }
        }
    }

    /// List every resource below `base`, recursively.
    ///
    /// Names are relative to the bundle root. Directory nodes are included
    /// and carry a trailing `/` so callers can tell them apart from files.
    /// An absent `base` yields an empty list.
    pub fn scan(&self, base: &str) -> Result<Vec<String>> {
        let base = normalize(base).trim_end_matches('/');
        let mut names = match self {
            Self::Embedded(dir) => scan_embedded(dir, base)?,
            Self::Directory(root) => scan_directory(root, base)?,
        };
        names.sort();
        Ok(names)
    }
}

fn normalize(name: &str) -> &str {
    name.trim_start_matches('/')
}

fn scan_embedded(dir: &'static Dir<'static>, base: &str) -> Result<Vec<String>> {
    let pattern = if base.is_empty() {
        "**".to_string()
    } else {
        format!("{base}/**")
    };
    let entries = dir
        .find(&pattern)
        .map_err(|e| HarnessError::InvalidArgument(format!("bad resource pattern {pattern:?}: {e}")))?;

    Ok(entries
        .map(|entry| match entry {
            DirEntry::Dir(d) => format!("{}/", to_resource_name(d.path())),
            DirEntry::File(f) => to_resource_name(f.path()),
        })
        .collect())
}

fn scan_directory(root: &Path, base: &str) -> Result<Vec<String>> {
    let start = root.join(base);
    if !start.is_dir() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in WalkDir::new(&start).min_depth(1) {
        let entry = entry.map_err(|e| {
            let context = format!("failed to scan resources under {}", start.display());
            match e.into_io_error() {
                Some(source) => HarnessError::io(context, source),
                None => HarnessError::InvalidArgument(context),
            }
        })?;
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let mut name = to_resource_name(relative);
        if entry.file_type().is_dir() {
            name.push('/');
        }
        names.push(name);
    }
    Ok(names)
}

fn to_resource_name(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
