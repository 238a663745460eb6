//! Main entry point detection.
//!
//! Packaged applications use different launcher classes depending on how
//! (and with which version of the packaging plugin) they were built. The
//! [`LauncherDetector`] tries a prioritized list of [`LaunchStrategy`]
//! values against the resolved classpath and falls back to a generic main
//! class when none of them is available.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::ZipArchive;

use crate::classpath::file::is_archive;

/// Launcher used by fat archives built with packaging plugin 3.2 and later.
pub const LAUNCHER_32_PLUS: &str = "org.springframework.boot.loader.launch.JarLauncher";

/// Launcher used by fat archives built before 3.2.
pub const LAUNCHER_PRE_32: &str = "org.springframework.boot.loader.JarLauncher";

/// Main class used when no launcher is present on the classpath.
pub const GENERIC_MAIN: &str = "org.springframework.experimental.boot.server.exec.imports.GenericSpringBootApplicationMain";

/// One way of launching the child, independently queryable for availability.
pub trait LaunchStrategy: Send + Sync + fmt::Debug {
    /// Short description used in logs (e.g. "fat jar >= 3.2").
    fn name(&self) -> &str;

    /// The main class passed as the final argument when this strategy wins.
    fn main_class(&self) -> &str;

    /// Return `true` if this strategy can launch from `classpath`.
    fn is_available(&self, classpath: &[PathBuf]) -> bool;
}

/// Available when a given class file is present in any classpath directory
/// or archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassPresence {
    name: String,
    class_name: String,
}

impl ClassPresence {
    pub fn new(name: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class_name: class_name.into(),
        }
    }

    /// `com.example.Main` -> `com/example/Main.class`
    fn resource_name(&self) -> String {
        format!("{}.class", self.class_name.replace('.', "/"))
    }
}

impl LaunchStrategy for ClassPresence {
    fn name(&self) -> &str {
        &self.name
    }

    fn main_class(&self) -> &str {
        &self.class_name
    }

    fn is_available(&self, classpath: &[PathBuf]) -> bool {
        let resource = self.resource_name();
        classpath.iter().any(|entry| {
            if entry.is_dir() {
                entry.join(&resource).is_file()
            } else if is_archive(entry) {
                archive_contains(entry, &resource)
            } else {
                false
            }
        })
    }
}

fn archive_contains(archive: &Path, resource: &str) -> bool {
    let Ok(file) = File::open(archive) else {
        return false;
    };
    let zip = match ZipArchive::new(file) {
        Ok(zip) => zip,
        Err(e) => {
            debug!(archive = %archive.display(), error = %e, "not a readable archive");
            return false;
        }
    };
    zip.file_names().any(|name| name == resource)
}

/// Picks the main class for a classpath.
#[derive(Debug)]
pub struct LauncherDetector {
    strategies: Vec<Box<dyn LaunchStrategy>>,
    fallback: String,
}

impl Default for LauncherDetector {
    fn default() -> Self {
        Self::new(GENERIC_MAIN)
            .with_strategy(ClassPresence::new("fat jar >= 3.2", LAUNCHER_32_PLUS))
            .with_strategy(ClassPresence::new("fat jar < 3.2", LAUNCHER_PRE_32))
    }
}

impl LauncherDetector {
    /// A detector with no strategies that always answers `fallback`.
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            strategies: Vec::new(),
            fallback: fallback.into(),
        }
    }

    /// Append a strategy. Strategies are tried in the order they were added.
    pub fn with_strategy(mut self, strategy: impl LaunchStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Return the main class of the first available strategy, or the
    /// fallback.
    pub fn detect(&self, classpath: &[PathBuf]) -> String {
        for strategy in &self.strategies {
            if strategy.is_available(classpath) {
                debug!(strategy = strategy.name(), main_class = strategy.main_class(), "launcher detected");
                return strategy.main_class().to_string();
            }
            debug!(strategy = strategy.name(), "launcher not available");
        }
        debug!(main_class = %self.fallback, "no launcher detected, using fallback");
        self.fallback.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_jar(path: &Path, entries: &[&str]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for entry in entries {
            zip.start_file(*entry, SimpleFileOptions::default()).unwrap();
            zip.write_all(b"\xca\xfe\xba\xbe").unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn resource_name_from_class_name() {
        let s = ClassPresence::new("x", "com.example.Main");
        assert_eq!(s.resource_name(), "com/example/Main.class");
    }

    #[test]
    fn empty_classpath_uses_fallback() {
        let detector = LauncherDetector::default();
        assert_eq!(detector.detect(&[]), GENERIC_MAIN);
    }

    #[test]
    fn detects_new_launcher_in_jar() {
        let tmp = tempfile::tempdir().unwrap();
        let jar = tmp.path().join("app.jar");
        write_jar(&jar, &["org/springframework/boot/loader/launch/JarLauncher.class"]);

        let detector = LauncherDetector::default();
        assert_eq!(detector.detect(&[jar]), LAUNCHER_32_PLUS);
    }

    #[test]
    fn detects_old_launcher_in_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let class = tmp.path().join("org/springframework/boot/loader/JarLauncher.class");
        std::fs::create_dir_all(class.parent().unwrap()).unwrap();
        std::fs::write(&class, b"\xca\xfe\xba\xbe").unwrap();

        let detector = LauncherDetector::default();
        assert_eq!(detector.detect(&[tmp.path().to_path_buf()]), LAUNCHER_PRE_32);
    }

    #[test]
    fn first_available_strategy_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let jar = tmp.path().join("both.jar");
        write_jar(
            &jar,
            &[
                "org/springframework/boot/loader/JarLauncher.class",
                "org/springframework/boot/loader/launch/JarLauncher.class",
            ],
        );
        assert_eq!(LauncherDetector::default().detect(&[jar]), LAUNCHER_32_PLUS);
    }

    #[test]
    fn corrupt_archive_is_not_available() {
        let tmp = tempfile::tempdir().unwrap();
        let jar = tmp.path().join("broken.jar");
        std::fs::write(&jar, b"definitely not a zip").unwrap();
        assert_eq!(LauncherDetector::default().detect(&[jar]), GENERIC_MAIN);
    }

    #[test]
    fn custom_strategies_and_fallback() {
        let tmp = tempfile::tempdir().unwrap();
        let class = tmp.path().join("com/acme/Main.class");
        std::fs::create_dir_all(class.parent().unwrap()).unwrap();
        std::fs::write(&class, b"").unwrap();

        let detector = LauncherDetector::new("com.acme.Fallback")
            .with_strategy(ClassPresence::new("acme", "com.acme.Main"));
        assert_eq!(detector.fallback(), "com.acme.Fallback");
        assert_eq!(detector.detect(&[tmp.path().to_path_buf()]), "com.acme.Main");
        assert_eq!(detector.detect(&[]), "com.acme.Fallback");
    }
}
