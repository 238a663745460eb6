use std::path::PathBuf;

use tracing::debug;

use super::{ClasspathEntry, create_temp_dir, remove_temp_dir, write_below};
use crate::error::Result;
use crate::resources::ResourceBundle;

/// A single bundled resource copied into its own temp directory.
///
/// The temp directory becomes the classpath root, so the resource is visible
/// to the child at `destination`.
#[derive(Debug)]
pub struct ExtractedResourceEntry {
    bundle: ResourceBundle,
    source: String,
    destination: String,
    extracted: Option<PathBuf>,
}

impl ExtractedResourceEntry {
    /// Copy `source` from `bundle` to `destination` (relative to the new
    /// classpath root).
    pub fn new(bundle: ResourceBundle, source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            bundle,
            source: source.into(),
            destination: destination.into(),
            extracted: None,
        }
    }

    /// Copy `name` to the same relative path on the classpath.
    pub fn for_same_path(bundle: ResourceBundle, name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(bundle, name.clone(), name)
    }

    /// Return `true` if the source resource is present. Does not extract.
    pub fn exists(&self) -> bool {
        self.bundle.exists(&self.source)
    }

    /// The temp directory, once resolved.
    pub fn extracted_dir(&self) -> Option<&PathBuf> {
        self.extracted.as_ref()
    }
}

impl ClasspathEntry for ExtractedResourceEntry {
    fn resolve(&mut self) -> Result<Vec<PathBuf>> {
        if let Some(dir) = &self.extracted {
            return Ok(vec![dir.clone()]);
        }

        // Read first so a missing resource never leaves an empty temp dir behind.
        let contents = self.bundle.read(&self.source)?;
        let dir = create_temp_dir()?;
        if let Err(e) = write_below(&dir, &self.destination, &contents) {
            let _ = remove_temp_dir(&dir);
            return Err(e);
        }
        debug!(
            source = %self.source,
            destination = %self.destination,
            dir = %dir.display(),
            "extracted bundled resource"
        );
        self.extracted = Some(dir.clone());
        Ok(vec![dir])
    }

    fn cleanup(&mut self) -> Result<()> {
        if let Some(dir) = self.extracted.take() {
            remove_temp_dir(&dir)?;
        }
        Ok(())
    }
}
