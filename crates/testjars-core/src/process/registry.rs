//! Shared registry of live child processes.
//!
//! Every child is spawned and registered under the same lock, so no process
//! is ever running untracked. Each child gets an observer task that waits for
//! it to exit (or for a kill request), publishes the final [`ProcessState`]
//! and removes the registration.

use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{ProcessFailure, ProcessState};
use crate::command::CommandLineSpec;
use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};

struct Registered {
    pid: Option<u32>,
    kill: CancellationToken,
    done: watch::Receiver<ProcessState>,
}

/// Tracks every child launched through it and terminates survivors.
///
/// Share it between harnesses with an `Arc`; [`ProcessRegistry::shared`]
/// returns the process-wide default.
pub struct ProcessRegistry {
    processes: Mutex<HashMap<u64, Registered>>,
    next_id: AtomicU64,
    grace: Duration,
}

impl std::fmt::Debug for ProcessRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessRegistry")
            .field("live", &self.len())
            .field("grace", &self.grace)
            .finish()
    }
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::with_grace_period(HarnessConfig::DEFAULT_SHUTDOWN_GRACE)
    }

    /// A registry that waits `grace` between SIGTERM and SIGKILL.
    pub fn with_grace_period(grace: Duration) -> Self {
        Self {
            processes: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            grace,
        }
    }

    /// The process-wide registry, created on first use with the grace period
    /// from [`HarnessConfig::from_env`].
    pub fn shared() -> Arc<Self> {
        static SHARED: OnceLock<Arc<ProcessRegistry>> = OnceLock::new();
        SHARED
            .get_or_init(|| {
                Arc::new(Self::with_grace_period(
                    HarnessConfig::from_env().shutdown_grace,
                ))
            })
            .clone()
    }

    pub fn grace_period(&self) -> Duration {
        self.grace
    }

    /// Number of children currently alive.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Registered>> {
        self.processes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn `spec`, register it and start its observer.
    ///
    /// Must be called from within a tokio runtime. The new state is published
    /// on `state` before returning: `Running` on success, `Failed(Spawn)` on
    /// failure.
    pub(crate) fn launch(
        self: &Arc<Self>,
        spec: &CommandLineSpec,
        state: watch::Sender<ProcessState>,
    ) -> Result<u64> {
        let mut command = to_command(spec);

        let mut processes = self.lock();
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                warn!(program = %spec.program().display(), error = %source, "failed to spawn process");
                state.send_replace(ProcessState::Failed(ProcessFailure::Spawn(source.to_string())));
                return Err(HarnessError::ProcessSpawn {
                    program: spec.program().to_path_buf(),
                    source,
                });
            }
        };

        let pid = child.id();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let kill = CancellationToken::new();
        processes.insert(
            id,
            Registered {
                pid,
                kill: kill.clone(),
                done: state.subscribe(),
            },
        );
        drop(processes);

        state.send_replace(ProcessState::Running { pid });
        debug!(id, ?pid, program = %spec.program().display(), "process started");

        let registry = Arc::downgrade(self);
        let grace = self.grace;
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill.cancelled() => terminate(&mut child, pid, grace).await,
            };
            let final_state = match status {
                Ok(status) => ProcessState::from_exit(status),
                Err(e) => {
                    warn!(id, ?pid, error = %e, "failed to wait for process");
                    ProcessState::Failed(ProcessFailure::Exit { code: None })
                }
            };
            debug!(id, ?pid, state = ?final_state, "process completed");

            if let Some(registry) = registry.upgrade() {
                registry.lock().remove(&id);
            }
            state.send_replace(final_state);
        });

        Ok(id)
    }

    /// Request termination of `id` without waiting for it.
    pub fn cancel(&self, id: u64) {
        if let Some(registered) = self.lock().get(&id) {
            registered.kill.cancel();
        }
    }

    /// Terminate `id`: SIGTERM, up to the grace period, then SIGKILL.
    /// Returns once the observer has published the final state.
    pub async fn destroy(&self, id: u64) {
        let entry = self
            .lock()
            .get(&id)
            .map(|r| (r.pid, r.kill.clone(), r.done.clone()));

        let Some((pid, kill, mut done)) = entry else {
            debug!(id, "destroy called but process not registered (already exited?)");
            return;
        };

        debug!(id, ?pid, "destroying process");
        kill.cancel();
        let _ = done.wait_for(ProcessState::is_completed).await;
    }

    /// Destroy every live child concurrently.
    pub async fn shutdown_all(&self) {
        let ids: Vec<u64> = self.lock().keys().copied().collect();
        if ids.is_empty() {
            return;
        }
        debug!(count = ids.len(), "shutting down all processes");
        futures::future::join_all(ids.into_iter().map(|id| self.destroy(id))).await;
    }
}

impl Drop for ProcessRegistry {
    fn drop(&mut self) {
        let processes = self
            .processes
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for (id, registered) in processes.drain() {
            warn!(id, pid = ?registered.pid, "killing process left running at registry drop");
            registered.kill.cancel();
            #[cfg(unix)]
            if let Some(pid) = registered.pid {
                // SAFETY: pid belongs to a child we spawned that is still registered.
                unsafe {
                    libc::kill(pid as libc::pid_t, libc::SIGKILL);
                }
            }
        }
    }
}

fn to_command(spec: &CommandLineSpec) -> Command {
    let mut command = Command::new(spec.program());
    command
        .args(spec.args())
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    command
}

async fn terminate(
    child: &mut Child,
    pid: Option<u32>,
    grace: Duration,
) -> std::io::Result<ExitStatus> {
    #[cfg(unix)]
    if let Some(pid) = pid {
        // SAFETY: pid is a child we spawned and have not reaped yet.
        let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if ret != 0 {
            warn!(pid, "SIGTERM failed, proceeding to SIGKILL");
        }
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            debug!(?pid, "process exited after SIGTERM");
            Ok(status)
        }
        _ => {
            debug!(?pid, "process did not exit after SIGTERM, sending SIGKILL");
            child.kill().await?;
            child.wait().await
        }
    }
}
