use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{ClasspathEntry, create_temp_dir, remove_temp_dir, write_below};
use crate::error::{HarnessError, Result};
use crate::resources::ResourceBundle;

type RenameFn = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Every bundled resource below a base namespace, copied into a temp dir.
///
/// Each matched resource name is passed through a rename function to get its
/// classpath-relative destination. The default strips everything up to and
/// including the last occurrence of `<base>/`, so `app/static/css/site.css`
/// scanned from `app/static` lands at `css/site.css`.
pub struct RecursiveScanEntry {
    bundle: ResourceBundle,
    base: String,
    rename: RenameFn,
    scanned: bool,
    dir: Option<PathBuf>,
}

impl fmt::Debug for RecursiveScanEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecursiveScanEntry")
            .field("bundle", &self.bundle)
            .field("base", &self.base)
            .field("dir", &self.dir)
            .finish()
    }
}

impl RecursiveScanEntry {
    pub fn new(bundle: ResourceBundle, base: impl Into<String>) -> Self {
        let base = base.into().trim_matches('/').to_string();
        let rename = strip_base(base.clone());
        Self {
            bundle,
            base,
            rename,
            scanned: false,
            dir: None,
        }
    }

    /// Replace the rename function applied to each matched resource name.
    pub fn with_rename(mut self, rename: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.rename = Box::new(rename);
        self
    }

    /// The populated temp directory, if anything matched.
    pub fn scanned_dir(&self) -> Option<&PathBuf> {
        self.dir.as_ref()
    }

    fn populate(&self, dir: &Path, names: &[String]) -> Result<()> {
        for name in names {
            let destination = (self.rename)(name);
            if destination.is_empty() || destination.ends_with('/') || name.ends_with('/') {
                continue;
            }
            let contents = match self.bundle.read(name) {
                Ok(contents) => contents,
                Err(HarnessError::ResourceNotFound(_)) => {
                    debug!(resource = %name, "skipping unreadable resource");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let written = write_below(dir, &destination, &contents)?;
            debug!(resource = %name, destination = %written.display(), "copied scanned resource");
        }
        Ok(())
    }
}

fn strip_base(base: String) -> RenameFn {
    if base.is_empty() {
        return Box::new(|name: &str| name.to_string());
    }
    let prefix = format!("{base}/");
    Box::new(move |name: &str| match name.rfind(&prefix) {
        Some(index) => name[index + prefix.len()..].to_string(),
        None => name.to_string(),
    })
}

impl ClasspathEntry for RecursiveScanEntry {
    fn resolve(&mut self) -> Result<Vec<PathBuf>> {
        if self.scanned {
            return Ok(self.dir.iter().cloned().collect());
        }

        let names = self.bundle.scan(&self.base)?;
        if names.is_empty() {
            debug!(base = %self.base, "no resources found to scan");
            self.scanned = true;
            return Ok(Vec::new());
        }

        debug!(base = %self.base, count = names.len(), "found resources for pattern");
        let dir = create_temp_dir()?;
        if let Err(e) = self.populate(&dir, &names) {
            let _ = remove_temp_dir(&dir);
            return Err(e);
        }
        self.scanned = true;
        self.dir = Some(dir.clone());
        Ok(vec![dir])
    }

    fn cleanup(&mut self) -> Result<()> {
        if let Some(dir) = self.dir.take() {
            remove_temp_dir(&dir)?;
        }
        Ok(())
    }
}
