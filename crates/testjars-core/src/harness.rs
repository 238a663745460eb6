//! The harness facade: configure, build, start, discover the port, stop.
//!
//! ```text
//!   HarnessBuilder --build()--> ExecHarness --start()--> child running
//!        |                           |
//!        | classpath entries         | port().await
//!        | system properties         |   PortFileWatcher, cancelled
//!        | debug / main class        |   when the child completes
//!        v                           v
//!   PortFile + resolved classpath    DynamicProperty("server.url", ...)
//!   + CommandLineSpec
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::classpath::{
    ArtifactResolver, Classpath, ClasspathEntry, ExternalResolvedEntry, ExtractedResourceEntry,
    FileEntry, RecursiveScanEntry,
};
use crate::command::{CommandLineBuilder, CommandLineSpec, DebugConfig, LauncherDetector};
use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use crate::port::{PortFile, PortFileWatcher};
use crate::process::{ProcessRegistry, ProcessState, ProcessSupervisor};
use crate::resources::ResourceBundle;

/// Application configuration file extensions picked up by
/// [`HarnessBuilder::default_configuration`], in classpath order.
const CONFIG_EXTENSIONS: [&str; 3] = ["yml", "yaml", "properties"];

// ---------------------------------------------------------------------------
// DynamicProperty
// ---------------------------------------------------------------------------

type Supplier = Arc<dyn Fn() -> String + Send + Sync>;

/// A named property whose value is computed on demand, typically from the
/// discovered port.
#[derive(Clone)]
pub struct DynamicProperty {
    name: String,
    supplier: Supplier,
}

impl DynamicProperty {
    pub fn new(name: impl Into<String>, supplier: impl Fn() -> String + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            supplier: Arc::new(supplier),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> String {
        (self.supplier)()
    }
}

impl fmt::Debug for DynamicProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicProperty")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// HarnessBuilder
// ---------------------------------------------------------------------------

/// Collects everything needed to launch one child.
#[derive(Debug)]
pub struct HarnessBuilder {
    classpath: Classpath,
    command: CommandLineBuilder,
    config: HarnessConfig,
    registry: Option<Arc<ProcessRegistry>>,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HarnessBuilder {
    /// A builder configured from the environment ([`HarnessConfig::from_env`]).
    pub fn new() -> Self {
        Self::with_config(HarnessConfig::from_env())
    }

    pub fn with_config(config: HarnessConfig) -> Self {
        Self {
            classpath: Classpath::new(),
            command: CommandLineBuilder::new(),
            config,
            registry: None,
        }
    }

    /// Append an arbitrary classpath entry.
    pub fn entry(mut self, entry: impl ClasspathEntry + 'static) -> Self {
        self.classpath.entry(entry);
        self
    }

    /// Append a directory or archive.
    pub fn file(self, path: impl Into<PathBuf>) -> Result<Self> {
        Ok(self.entry(FileEntry::new(path)?))
    }

    /// Append several directories or archives, in order.
    pub fn files<P: AsRef<Path>>(mut self, paths: impl IntoIterator<Item = P>) -> Result<Self> {
        self.classpath.files(paths)?;
        Ok(self)
    }

    /// Append a bundled resource copied to `destination` inside its own
    /// temp directory.
    pub fn resource(
        self,
        bundle: &ResourceBundle,
        source: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        self.entry(ExtractedResourceEntry::new(bundle.clone(), source, destination))
    }

    /// Append every bundled resource below `base`.
    pub fn scan(self, bundle: &ResourceBundle, base: impl Into<String>) -> Self {
        self.entry(RecursiveScanEntry::new(bundle.clone(), base))
    }

    /// Append the paths an [`ArtifactResolver`] returns for `coordinate`.
    pub fn artifact(self, coordinate: impl Into<String>, resolver: Arc<dyn ArtifactResolver>) -> Self {
        self.entry(ExternalResolvedEntry::new(coordinate, resolver))
    }

    /// Append `testjars/<name>/application.{yml,yaml,properties}` from
    /// `bundle` as `application.<ext>`, for each one that exists.
    pub fn default_configuration(mut self, bundle: &ResourceBundle, name: &str) -> Self {
        for ext in CONFIG_EXTENSIONS {
            let source = format!("testjars/{name}/application.{ext}");
            if bundle.exists(&source) {
                debug!(resource = %source, "adding default configuration");
                self = self.resource(bundle, source, format!("application.{ext}"));
            }
        }
        self
    }

    pub fn system_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.command = self.command.system_property(key, value);
        self
    }

    pub fn system_properties<K, V>(mut self, properties: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.command = self.command.system_properties(properties);
        self
    }

    /// Attach a debug agent, overriding the environment configuration.
    pub fn debug(mut self, debug: Option<DebugConfig>) -> Self {
        self.config.debug = debug;
        self
    }

    /// # Errors
    ///
    /// [`HarnessError::InvalidArgument`] if `main_class` is blank.
    pub fn main_class(mut self, main_class: impl Into<String>) -> Result<Self> {
        self.command = self.command.main_class(main_class)?;
        Ok(self)
    }

    pub fn launcher_detector(mut self, detector: LauncherDetector) -> Self {
        self.command = self.command.launcher_detector(detector);
        self
    }

    pub fn executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.config.executable = Some(executable.into());
        self
    }

    /// Bound [`ExecHarness::port`]. `None` waits indefinitely.
    pub fn port_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.port_timeout = timeout;
        self
    }

    /// Track the child in `registry` instead of [`ProcessRegistry::shared`].
    pub fn registry(mut self, registry: Arc<ProcessRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Create the port file, resolve the classpath and assemble the command
    /// line. Everything created so far is cleaned up if any step fails.
    pub fn build(self) -> Result<ExecHarness> {
        let Self {
            mut classpath,
            mut command,
            config,
            registry,
        } = self;

        if let Some(executable) = config.executable {
            command = command.executable(executable);
        }
        command = command.debug(config.debug);

        let port_file = match PortFile::create() {
            Ok(port_file) => port_file,
            Err(e) => {
                discard(&mut classpath, None);
                return Err(e);
            }
        };

        let assembled = classpath
            .resolve()
            .and_then(|paths| Ok((command.build(port_file.path(), &paths)?, paths)));
        let (spec, resolved) = match assembled {
            Ok(assembled) => assembled,
            Err(e) => {
                discard(&mut classpath, Some(&port_file));
                return Err(e);
            }
        };

        debug!(command = %spec, port_file = %port_file.path().display(), "harness built");
        let registry = registry.unwrap_or_else(ProcessRegistry::shared);
        Ok(ExecHarness {
            classpath,
            resolved,
            port_file,
            supervisor: ProcessSupervisor::new(spec, registry),
            port_timeout: config.port_timeout,
            port: None,
            stopped: false,
        })
    }
}

fn discard(classpath: &mut Classpath, port_file: Option<&PortFile>) {
    if let Err(e) = classpath.cleanup() {
        warn!(error = %e, "classpath cleanup failed");
    }
    if let Some(port_file) = port_file {
        if let Err(e) = port_file.remove() {
            warn!(error = %e, "port file removal failed");
        }
    }
}

// ---------------------------------------------------------------------------
// ExecHarness
// ---------------------------------------------------------------------------

/// One child process plus everything generated to run it.
///
/// Call [`stop`](Self::stop) when done. Dropping without stopping requests
/// termination and removes generated files on a best-effort basis.
#[derive(Debug)]
pub struct ExecHarness {
    classpath: Classpath,
    resolved: Vec<PathBuf>,
    port_file: PortFile,
    supervisor: ProcessSupervisor,
    port_timeout: Option<Duration>,
    port: Option<u16>,
    stopped: bool,
}

impl ExecHarness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::new()
    }

    pub fn command(&self) -> &CommandLineSpec {
        self.supervisor.command()
    }

    pub fn port_file(&self) -> &Path {
        self.port_file.path()
    }

    /// The resolved classpath, in order.
    pub fn classpath(&self) -> &[PathBuf] {
        &self.resolved
    }

    /// Launch the child. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`HarnessError::Stopped`] after [`stop`](Self::stop), since the
    /// generated classpath entries are gone.
    pub fn start(&mut self) -> Result<()> {
        if self.stopped {
            return Err(HarnessError::Stopped);
        }
        self.supervisor.start()
    }

    pub fn state(&self) -> ProcessState {
        self.supervisor.state()
    }

    /// Wait for the child to complete.
    pub async fn wait(&self) -> ProcessState {
        self.supervisor.wait().await
    }

    /// The port the child bound to, waiting for it if necessary.
    ///
    /// The first successful result is cached.
    ///
    /// # Errors
    ///
    /// - [`HarnessError::NotStarted`] before [`start`](Self::start).
    /// - [`HarnessError::Stopped`] after [`stop`](Self::stop).
    /// - [`HarnessError::ProcessFailure`] if the child completes without
    ///   writing a port.
    /// - [`HarnessError::Timeout`] / [`HarnessError::PortFileCorrupt`] from
    ///   the watcher.
    pub async fn port(&mut self) -> Result<u16> {
        if self.stopped {
            return Err(HarnessError::Stopped);
        }
        if let Some(port) = self.port {
            return Ok(port);
        }
        if self.supervisor.state() == ProcessState::NotStarted {
            return Err(HarnessError::NotStarted);
        }

        let watcher = PortFileWatcher::new(self.port_file.path()).with_timeout(self.port_timeout);
        let cancel = CancellationToken::new();
        let mut states = self.supervisor.subscribe();
        let completed = async move {
            let _ = states.wait_for(ProcessState::is_completed).await;
        };

        let wait = watcher.wait_for_port_until(&cancel);
        tokio::pin!(wait);
        let result = tokio::select! {
            result = &mut wait => result,
            _ = completed => {
                cancel.cancel();
                wait.await
            }
        };

        match result {
            Ok(port) => {
                debug!(port, "port discovered");
                self.port = Some(port);
                Ok(port)
            }
            Err(HarnessError::Cancelled) => Err(HarnessError::ProcessFailure(
                match self.supervisor.state() {
                    ProcessState::Failed(failure) => failure.to_string(),
                    ProcessState::Succeeded => "exited successfully without writing a port".to_string(),
                    other => format!("stopped waiting in state {other:?}"),
                },
            )),
            Err(e) => Err(e),
        }
    }

    /// A property named `name` whose value is `render(port)`.
    ///
    /// Waits for the port like [`port`](Self::port).
    pub async fn port_property(
        &mut self,
        name: impl Into<String>,
        render: impl Fn(u16) -> String + Send + Sync + 'static,
    ) -> Result<DynamicProperty> {
        let port = self.port().await?;
        Ok(DynamicProperty::new(name, move || render(port)))
    }

    /// Terminate the child, then remove the generated classpath entries and
    /// the port file. Every step is attempted; failures are logged.
    pub async fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        self.supervisor.stop().await;
        discard(&mut self.classpath, Some(&self.port_file));
        debug!("harness stopped");
    }
}

impl Drop for ExecHarness {
    fn drop(&mut self) {
        if self.stopped {
            return;
        }
        self.supervisor.cancel();
        discard(&mut self.classpath, Some(&self.port_file));
    }
}
