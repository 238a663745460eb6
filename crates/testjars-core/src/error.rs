//! Error taxonomy for the harness.

use std::path::PathBuf;

use thiserror::Error;

/// Boxed error returned by external collaborators such as artifact resolvers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convenience alias used throughout the crate.
pub type Result<T, E = HarnessError> = std::result::Result<T, E>;

/// Errors raised while assembling, launching or observing a child process.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A literal file classpath entry does not exist at resolve time.
    #[error("could not find file to add to the classpath '{}'", .0.display())]
    MissingFile(PathBuf),

    /// A named bundled resource to extract is absent.
    #[error("bundled resource not found: {0}")]
    ResourceNotFound(String),

    /// The port file holds non-blank content that is not a port number.
    #[error("port file {} contains {content:?}, expected a port number", path.display())]
    PortFileCorrupt { path: PathBuf, content: String },

    /// The operating system failed to launch the child process.
    #[error("failed to spawn '{}'", program.display())]
    ProcessSpawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The child exited, crashed or never launched before a port was available.
    #[error("process failed before writing a port: {0}")]
    ProcessFailure(String),

    /// Invalid configuration supplied by the caller.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An externally resolved classpath entry failed to resolve.
    #[error("error resolving artifact {coordinate}")]
    Resolution {
        coordinate: String,
        #[source]
        source: BoxError,
    },

    /// Filesystem operation failed.
    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The filesystem change subscription failed.
    #[error("port file watch failed")]
    Watch(#[from] notify::Error),

    /// No port appeared within the configured timeout.
    #[error("timed out after {0:?} waiting for the port file")]
    Timeout(std::time::Duration),

    /// The port wait was cancelled before a port became available.
    #[error("port wait cancelled")]
    Cancelled,

    /// A port was requested from a harness that was never started.
    #[error("the process has not been started")]
    NotStarted,

    /// The harness was stopped and its port file removed.
    #[error("the harness has been stopped")]
    Stopped,

    /// One or more classpath entries failed to clean up.
    #[error("cleanup failed for {} classpath entries: {}", .0.len(), .0.join("; "))]
    Cleanup(Vec<String>),
}

impl HarnessError {
    /// Wrap an I/O error with a human-readable description of the operation.
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Attach operation context to I/O results, in the spirit of
/// `anyhow::Context` but producing a typed [`HarnessError::Io`].
pub(crate) trait IoContext<T> {
    fn io_context<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|source| HarnessError::io(f(), source))
    }
}
