use std::path::{Path, PathBuf};

use super::ClasspathEntry;
use crate::error::{HarnessError, IoContext, Result};

/// Archive extensions accepted for file entries that are not directories.
const ARCHIVE_EXTENSIONS: &[&str] = &["jar", "zip"];

/// A jar, zip or directory already on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    path: PathBuf,
}

impl FileEntry {
    /// Create an entry for `path`.
    ///
    /// The path does not need to exist yet, but it must either be a
    /// directory or carry an archive extension.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::InvalidArgument`] for anything else.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_dir() && !is_archive(&path) {
            return Err(HarnessError::InvalidArgument(format!(
                "file must be a jar file or directory '{}'",
                std::path::absolute(&path).unwrap_or(path).display()
            )));
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Return `true` if `path` ends with a recognized archive extension.
pub fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            ARCHIVE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

impl ClasspathEntry for FileEntry {
    fn resolve(&mut self) -> Result<Vec<PathBuf>> {
        if !self.path.exists() {
            return Err(HarnessError::MissingFile(
                std::path::absolute(&self.path).unwrap_or_else(|_| self.path.clone()),
            ));
        }
        let canonical = self
            .path
            .canonicalize()
            .io_context(|| format!("failed to canonicalize {}", self.path.display()))?;
        Ok(vec![canonical])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_jar_resolves_to_canonical_path() {
        let tmp = tempfile::tempdir().unwrap();
        let jar = tmp.path().join("app.jar");
        std::fs::write(&jar, b"PK").unwrap();

        let mut entry = FileEntry::new(&jar).unwrap();
        assert_eq!(entry.resolve().unwrap(), vec![jar.canonicalize().unwrap()]);
    }

    #[test]
    fn existing_directory_resolves() {
        let tmp = tempfile::tempdir().unwrap();
        let mut entry = FileEntry::new(tmp.path()).unwrap();
        let resolved = entry.resolve().unwrap();
        assert_eq!(resolved.len(), 1);
        assert!(resolved[0].is_absolute());
        assert_eq!(resolved[0], tmp.path().canonicalize().unwrap());
    }

    #[test]
    fn missing_jar_fails_at_resolve() {
        let tmp = tempfile::tempdir().unwrap();
        let jar = tmp.path().join("later.jar");
        let mut entry = FileEntry::new(&jar).unwrap();
        match entry.resolve() {
            Err(HarnessError::MissingFile(path)) => assert!(path.ends_with("later.jar")),
            other => panic!("expected MissingFile, got {other:?}"),
        }
    }

    #[test]
    fn non_archive_file_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let txt = tmp.path().join("readme.txt");
        std::fs::write(&txt, b"hello").unwrap();
        assert!(matches!(
            FileEntry::new(&txt),
            Err(HarnessError::InvalidArgument(_))
        ));
    }

    #[test]
    fn archive_extension_is_case_insensitive() {
        assert!(is_archive(Path::new("lib/App.JAR")));
        assert!(is_archive(Path::new("bundle.zip")));
        assert!(!is_archive(Path::new("classes")));
        assert!(!is_archive(Path::new("jar")));
    }
}
