//! Classpath assembly for the child process.
//!
//! A [`Classpath`] is an ordered list of [`ClasspathEntry`] values. Each
//! entry resolves to one or more absolute paths; the classpath flattens them
//! in insertion order and joins the result with the platform path separator.
//!
//! # Architecture
//!
//! ```text
//! Classpath
//!     |
//!     +-- FileEntry               (jar or directory on disk)
//!     +-- ExtractedResourceEntry  (one bundled resource -> temp dir)
//!     +-- RecursiveScanEntry      (bundled resource tree -> temp dir)
//!     +-- ExternalResolvedEntry   (paths from an ArtifactResolver)
//!     |
//!     v
//! build() --> "a.jar:/tmp/classpath-x:/tmp/classpath-y"
//! ```

pub mod external;
pub mod file;
pub mod resource;
pub mod scan;

use std::ffi::OsString;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{HarnessError, IoContext, Result};

pub use external::{ArtifactResolver, ExternalResolvedEntry, LocalRepositoryResolver};
pub use file::FileEntry;
pub use resource::ExtractedResourceEntry;
pub use scan::RecursiveScanEntry;

/// One source of runnable material contributing paths to the classpath.
pub trait ClasspathEntry: Send + fmt::Debug {
    /// Resolve the entry to an ordered list of absolute paths.
    ///
    /// Implementations that materialize files do so on the first call and
    /// return the cached result afterwards.
    fn resolve(&mut self) -> Result<Vec<PathBuf>>;

    /// Release any temporary resources created by [`resolve`](Self::resolve).
    fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Ordered collection of classpath entries.
///
/// Insertion order is the load order: an entry added first wins over later
/// entries that contain a resource at the same relative path.
#[derive(Debug, Default)]
pub struct Classpath {
    entries: Vec<Box<dyn ClasspathEntry>>,
}

impl Classpath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a single entry.
    pub fn entry(&mut self, entry: impl ClasspathEntry + 'static) -> &mut Self {
        self.entries.push(Box::new(entry));
        self
    }

    /// Append boxed entries in iteration order.
    pub fn entries(&mut self, entries: impl IntoIterator<Item = Box<dyn ClasspathEntry>>) -> &mut Self {
        self.entries.extend(entries);
        self
    }

    /// Append a [`FileEntry`] for each path.
    ///
    /// # Errors
    ///
    /// Fails on the first path that is neither a directory nor an archive;
    /// entries before it remain added.
    pub fn files<P: AsRef<Path>>(&mut self, paths: impl IntoIterator<Item = P>) -> Result<&mut Self> {
        for path in paths {
            self.entries.push(Box::new(FileEntry::new(path.as_ref())?));
        }
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve every entry in order and flatten the results.
    ///
    /// Stops at the first entry that fails to resolve.
    pub fn resolve(&mut self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in &mut self.entries {
            let resolved = entry.resolve()?;
            debug!(entry = ?entry, paths = resolved.len(), "resolved classpath entry");
            paths.extend(resolved);
        }
        Ok(paths)
    }

    /// Resolve the classpath and join it with the platform path separator.
    pub fn build(&mut self) -> Result<String> {
        let paths = self.resolve()?;
        join(&paths)
    }

    /// Clean up every entry, in order.
    ///
    /// A failing entry does not stop the loop; all failures are logged and
    /// returned together as [`HarnessError::Cleanup`].
    pub fn cleanup(&mut self) -> Result<()> {
        let mut failures = Vec::new();
        for entry in &mut self.entries {
            if let Err(e) = entry.cleanup() {
                warn!(entry = ?entry, error = %e, "failed to clean up classpath entry");
                failures.push(format!("{entry:?}: {e}"));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(HarnessError::Cleanup(failures))
        }
    }
}

/// Join resolved paths with the platform path separator.
pub fn join(paths: &[PathBuf]) -> Result<String> {
    let joined: OsString = std::env::join_paths(paths)
        .map_err(|e| HarnessError::InvalidArgument(format!("cannot join classpath: {e}")))?;
    joined
        .into_string()
        .map_err(|raw| HarnessError::InvalidArgument(format!("classpath is not valid UTF-8: {raw:?}")))
}

/// Create a fresh temp directory owned by a classpath entry.
///
/// The directory is detached from [`tempfile::TempDir`]'s drop handling; the
/// owning entry removes it in `cleanup()`.
pub(crate) fn create_temp_dir() -> Result<PathBuf> {
    let dir = tempfile::Builder::new()
        .prefix("classpath-")
        .tempdir()
        .io_context(|| "failed to create classpath temp directory")?;
    Ok(dir.keep())
}

/// Remove a temp directory created by [`create_temp_dir`]. Missing
/// directories are not an error.
pub(crate) fn remove_temp_dir(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {
            debug!(path = %dir.display(), "removed classpath temp directory");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(HarnessError::io(
            format!("failed to remove {}", dir.display()),
            e,
        )),
    }
}

/// Copy `contents` to `root/relative`, creating parent directories.
///
/// `relative` must stay below `root`: a leading `/` is ignored, `..` and
/// empty paths are rejected.
pub(crate) fn write_below(root: &Path, relative: &str, contents: &[u8]) -> Result<PathBuf> {
    let relative = Path::new(relative.trim_start_matches('/'));
    let mut normal = 0;
    for component in relative.components() {
        match component {
            Component::Normal(_) => normal += 1,
            Component::CurDir => {}
            _ => {
                return Err(HarnessError::InvalidArgument(format!(
                    "destination '{}' escapes the classpath directory",
                    relative.display()
                )));
            }
        }
    }
    if normal == 0 {
        return Err(HarnessError::InvalidArgument(format!(
            "destination '{}' does not name a file",
            relative.display()
        )));
    }
    let destination = root.join(relative);
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent)
            .io_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(&destination, contents)
        .io_context(|| format!("failed to write {}", destination.display()))?;
    Ok(destination)
}
