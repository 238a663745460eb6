//! Child process supervision.
//!
//! ```text
//!   ProcessSupervisor::start()
//!       |
//!       v
//!   ProcessRegistry::launch()  -- spawn + register under one lock
//!       |
//!       v
//!   observer task ---- exit ----> publish Succeeded / Failed, deregister
//!       ^
//!       |
//!   destroy(id) ---- SIGTERM, grace, SIGKILL
//! ```

pub mod registry;

use std::fmt;
use std::process::ExitStatus;
use std::sync::Arc;

use tokio::sync::watch;

use crate::command::CommandLineSpec;
use crate::error::{HarnessError, Result};

pub use registry::ProcessRegistry;

/// Why a child did not complete successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessFailure {
    /// The OS could not launch the program.
    Spawn(String),
    /// The program exited non-zero, or was killed by a signal (`code` is
    /// `None`).
    Exit { code: Option<i32> },
}

impl fmt::Display for ProcessFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn(reason) => write!(f, "failed to launch: {reason}"),
            Self::Exit { code: Some(code) } => write!(f, "exited with status {code}"),
            Self::Exit { code: None } => write!(f, "terminated by signal"),
        }
    }
}

/// Lifecycle of a supervised child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessState {
    NotStarted,
    Running { pid: Option<u32> },
    Succeeded,
    Failed(ProcessFailure),
}

impl ProcessState {
    pub(crate) fn from_exit(status: ExitStatus) -> Self {
        if status.success() {
            Self::Succeeded
        } else {
            Self::Failed(ProcessFailure::Exit {
                code: status.code(),
            })
        }
    }

    /// `true` once the child can no longer run.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_))
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    pub fn pid(&self) -> Option<u32> {
        match self {
            Self::Running { pid } => *pid,
            _ => None,
        }
    }
}

/// Owns the lifecycle of one child process.
#[derive(Debug)]
pub struct ProcessSupervisor {
    command: CommandLineSpec,
    registry: Arc<ProcessRegistry>,
    pending: Option<watch::Sender<ProcessState>>,
    state: watch::Receiver<ProcessState>,
    id: Option<u64>,
}

impl ProcessSupervisor {
    pub fn new(command: CommandLineSpec, registry: Arc<ProcessRegistry>) -> Self {
        let (tx, rx) = watch::channel(ProcessState::NotStarted);
        Self {
            command,
            registry,
            pending: Some(tx),
            state: rx,
            id: None,
        }
    }

    pub fn command(&self) -> &CommandLineSpec {
        &self.command
    }

    /// Launch the child. Only the first call has any effect.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`HarnessError::ProcessSpawn`](crate::HarnessError::ProcessSpawn) if
    /// the OS cannot launch the program; the state becomes
    /// `Failed(Spawn)`. [`HarnessError::InvalidArgument`] outside a tokio
    /// runtime; the supervisor stays startable.
    pub fn start(&mut self) -> Result<()> {
        if self.pending.is_some() && tokio::runtime::Handle::try_current().is_err() {
            return Err(HarnessError::InvalidArgument(
                "start() must be called within a tokio runtime".to_string(),
            ));
        }
        let Some(tx) = self.pending.take() else {
            return Ok(());
        };
        self.id = Some(self.registry.launch(&self.command, tx)?);
        Ok(())
    }

    pub fn state(&self) -> ProcessState {
        self.state.borrow().clone()
    }

    /// Receive every state transition.
    pub fn subscribe(&self) -> watch::Receiver<ProcessState> {
        self.state.clone()
    }

    /// Wait for the child to complete. Returns immediately if it was never
    /// started.
    pub async fn wait(&self) -> ProcessState {
        let mut rx = self.state.clone();
        match rx
            .wait_for(|s| s.is_completed() || *s == ProcessState::NotStarted)
            .await
        {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }

    /// Terminate the child if it is running and wait for its final state.
    pub async fn stop(&self) {
        if let Some(id) = self.id {
            self.registry.destroy(id).await;
        }
    }

    /// Request termination without waiting.
    pub(crate) fn cancel(&self) {
        if let Some(id) = self.id {
            self.registry.cancel(id);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use testjars_test_utils::write_script;

    fn supervisor(script: &std::path::Path) -> ProcessSupervisor {
        ProcessSupervisor::new(
            CommandLineSpec::new(script, Vec::new()),
            Arc::new(ProcessRegistry::new()),
        )
    }

    #[tokio::test]
    async fn lifecycle_to_success() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(tmp.path(), "ok.sh", "exit 0\n");
        let mut sup = supervisor(&script);
        assert_eq!(sup.state(), ProcessState::NotStarted);

        sup.start().unwrap();
        assert!(sup.state().is_running() || sup.state().is_completed());
        assert_eq!(sup.wait().await, ProcessState::Succeeded);
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(tmp.path(), "sleepy.sh", "exec sleep 3600\n");
        let mut sup = supervisor(&script);

        sup.start().unwrap();
        let pid = sup.state().pid();
        assert!(pid.is_some());
        sup.start().unwrap();
        assert_eq!(sup.state().pid(), pid);
        assert_eq!(sup.registry.len(), 1);

        sup.stop().await;
        assert!(sup.state().is_completed());
    }

    #[test]
    fn start_outside_runtime_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(tmp.path(), "ok.sh", "exit 0\n");
        let mut sup = supervisor(&script);

        let err = sup.start().unwrap_err();
        assert!(matches!(err, HarnessError::InvalidArgument(_)), "{err:?}");
        assert_eq!(sup.state(), ProcessState::NotStarted);
        assert!(sup.registry.is_empty());

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            sup.start().unwrap();
            assert_eq!(sup.wait().await, ProcessState::Succeeded);
        });
    }

    #[tokio::test]
    async fn wait_without_start_returns_immediately() {
        let sup = ProcessSupervisor::new(
            CommandLineSpec::new("/bin/true", Vec::new()),
            Arc::new(ProcessRegistry::new()),
        );
        assert_eq!(sup.wait().await, ProcessState::NotStarted);
        sup.stop().await;
    }

    #[tokio::test]
    async fn subscribers_see_completion() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(tmp.path(), "fail.sh", "exit 2\n");
        let mut sup = supervisor(&script);
        let mut rx = sup.subscribe();

        sup.start().unwrap();
        let state = rx.wait_for(ProcessState::is_completed).await.unwrap().clone();
        assert_eq!(state, ProcessState::Failed(ProcessFailure::Exit { code: Some(2) }));
    }

    #[test]
    fn failure_display() {
        assert_eq!(
            ProcessFailure::Exit { code: Some(1) }.to_string(),
            "exited with status 1"
        );
        assert_eq!(
            ProcessFailure::Exit { code: None }.to_string(),
            "terminated by signal"
        );
    }
}
