//! Command line assembly for the child process.
//!
//! The resulting invocation always has the shape
//!
//! ```text
//! <executable> [debug agent] -D<key>=<value>... -classpath <classpath> <main class>
//! ```
//!
//! and always carries the port file location plus an ephemeral port request.

pub mod launcher;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::classpath;
use crate::error::{HarnessError, IoContext, Result};

pub use launcher::{ClassPresence, LaunchStrategy, LauncherDetector};

/// System property naming the file the child writes its port to.
pub const PORT_FILE_PROPERTY: &str = "PORTFILE";

/// System property requesting the server port; `0` asks the OS for an
/// ephemeral port.
pub const SERVER_PORT_PROPERTY: &str = "server.port";

/// Remote debug agent settings for the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugConfig {
    /// Port the debug agent listens on.
    pub port: u16,
    /// Whether the child waits for a debugger before running `main`.
    pub suspend: bool,
}

impl DebugConfig {
    pub const DEFAULT_PORT: u16 = 5005;

    /// Render the `-agentlib:jdwp=...` argument.
    pub fn agent_arg(&self) -> String {
        format!(
            "-agentlib:jdwp=transport=dt_socket,server=y,suspend={},address=*:{}",
            if self.suspend { "y" } else { "n" },
            self.port
        )
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            port: Self::DEFAULT_PORT,
            suspend: false,
        }
    }
}

/// An executable plus its ordered arguments. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLineSpec {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandLineSpec {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The main class, which is always the final argument.
    pub fn main_class(&self) -> Option<&str> {
        self.args.last().map(String::as_str)
    }

    /// Value of the argument following `flag`, if any.
    pub fn arg_after(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

impl fmt::Display for CommandLineSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote(&self.program.to_string_lossy()))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

fn quote(s: &str) -> String {
    if s.is_empty() || s.contains(char::is_whitespace) {
        format!("'{}'", s.replace('\'', r"'\''"))
    } else {
        s.to_string()
    }
}

/// Builds a [`CommandLineSpec`] from harness settings and a resolved
/// classpath.
#[derive(Debug, Default)]
pub struct CommandLineBuilder {
    executable: Option<PathBuf>,
    system_properties: BTreeMap<String, String>,
    debug: Option<DebugConfig>,
    main_class: Option<String>,
    detector: LauncherDetector,
}

impl CommandLineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Program to run. Defaults to the currently running executable.
    pub fn executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = Some(executable.into());
        self
    }

    pub fn system_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.system_properties.insert(key.into(), value.into());
        self
    }

    pub fn system_properties<K, V>(mut self, properties: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.system_properties
            .extend(properties.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn debug(mut self, debug: Option<DebugConfig>) -> Self {
        self.debug = debug;
        self
    }

    /// Use an explicit main class instead of launcher detection.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::InvalidArgument`] if `main_class` is blank.
    pub fn main_class(mut self, main_class: impl Into<String>) -> Result<Self> {
        let main_class = main_class.into();
        if main_class.trim().is_empty() {
            return Err(HarnessError::InvalidArgument(
                "main class cannot be empty".to_string(),
            ));
        }
        self.main_class = Some(main_class);
        Ok(self)
    }

    pub fn launcher_detector(mut self, detector: LauncherDetector) -> Self {
        self.detector = detector;
        self
    }

    /// Assemble the invocation.
    ///
    /// `classpath` must already be resolved; it is used both for the
    /// `-classpath` argument and for launcher detection.
    pub fn build(&self, port_file: &Path, classpath: &[PathBuf]) -> Result<CommandLineSpec> {
        let program = match &self.executable {
            Some(p) => p.clone(),
            None => std::env::current_exe().io_context(|| "failed to locate the current executable")?,
        };

        let port_file = std::path::absolute(port_file)
            .io_context(|| format!("failed to make {} absolute", port_file.display()))?;

        let mut properties = self.system_properties.clone();
        properties.insert(
            PORT_FILE_PROPERTY.to_string(),
            port_file.to_string_lossy().into_owned(),
        );
        properties
            .entry(SERVER_PORT_PROPERTY.to_string())
            .or_insert_with(|| "0".to_string());

        let mut args = Vec::with_capacity(properties.len() + 4);
        if let Some(debug) = &self.debug {
            args.push(debug.agent_arg());
        }
        args.extend(properties.iter().map(|(k, v)| format!("-D{k}={v}")));
        args.push("-classpath".to_string());
        args.push(classpath::join(classpath)?);
        args.push(match &self.main_class {
            Some(main) => main.clone(),
            None => self.detector.detect(classpath),
        });

        Ok(CommandLineSpec::new(program, args))
    }
}

/// Locate a `java` executable: `$JAVA_HOME/bin/java` when present, else
/// `java` resolved through `PATH` by the OS at spawn time.
pub fn find_java_executable() -> PathBuf {
    find_java_in(std::env::var_os("JAVA_HOME").map(PathBuf::from))
}

fn find_java_in(java_home: Option<PathBuf>) -> PathBuf {
    let binary = if cfg!(windows) { "java.exe" } else { "java" };
    if let Some(home) = java_home {
        let candidate = home.join("bin").join(binary);
        if candidate.is_file() {
            return candidate;
        }
    }
    PathBuf::from(binary)
}
