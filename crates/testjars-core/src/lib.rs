//! Run an independently packaged application as a subprocess during
//! integration tests and discover the ephemeral port it bound to.
//!
//! ```text
//!   classpath entries ---> Classpath::resolve() ---> CommandLineBuilder
//!                                                        |
//!   PortFile (temp dir) ------ -DPORTFILE=<path> --------+
//!                                                        v
//!                                   ProcessSupervisor / ProcessRegistry
//!                                                        |
//!                           child writes port -----------+
//!                                                        v
//!                                   PortFileWatcher ---> port
//! ```
//!
//! Most callers only need [`HarnessBuilder`] and [`ExecHarness`]:
//!
//! ```no_run
//! # async fn run() -> testjars_core::Result<()> {
//! use testjars_core::HarnessBuilder;
//!
//! let mut harness = HarnessBuilder::new()
//!     .file("target/greeting-service.jar")?
//!     .build()?;
//! harness.start()?;
//! let port = harness.port().await?;
//! println!("listening on {port}");
//! harness.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod classpath;
pub mod command;
pub mod config;
pub mod error;
pub mod harness;
pub mod port;
pub mod process;
pub mod resources;

pub use classpath::{
    ArtifactResolver, Classpath, ClasspathEntry, ExternalResolvedEntry, ExtractedResourceEntry,
    FileEntry, LocalRepositoryResolver, RecursiveScanEntry,
};
pub use command::{
    CommandLineBuilder, CommandLineSpec, DebugConfig, LauncherDetector, find_java_executable,
};
pub use config::HarnessConfig;
pub use error::{BoxError, HarnessError, Result};
pub use harness::{DynamicProperty, ExecHarness, HarnessBuilder};
pub use port::{PortFile, PortFileState, PortFileWatcher};
pub use process::{ProcessFailure, ProcessRegistry, ProcessState, ProcessSupervisor};
pub use resources::ResourceBundle;
