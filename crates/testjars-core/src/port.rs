//! Port discovery through a write-once port file.
//!
//! The child writes the decimal port it bound to into a file whose path it
//! received on the command line. [`PortFileWatcher`] waits for that content
//! using filesystem change notification:
//!
//! ```text
//! subscribe(parent dir) --> read --> Available? --yes--> return port
//!                             ^          |
//!                             |          no (missing / empty)
//!                             |          v
//!                             +---- next create/modify event
//! ```
//!
//! The subscription is opened before the first read, so a write racing with
//! the subscription is seen either by the read or by an event.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{HarnessError, IoContext, Result};

/// File name used for port files created by [`PortFile::create`].
pub const PORT_FILE_NAME: &str = "application.port";

/// What a port file currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortFileState {
    /// The file does not exist yet.
    Missing,
    /// The file exists but is blank.
    Empty,
    /// The file holds a port.
    Available(u16),
}

/// Location of the port file for one harness.
#[derive(Debug)]
pub struct PortFile {
    path: PathBuf,
    /// Private temp directory holding the file, removed with it.
    owned_dir: Option<PathBuf>,
}

impl PortFile {
    /// Reserve a port file path inside a fresh private temp directory.
    ///
    /// The file itself is not created; the child creates it.
    pub fn create() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("testjars-port-")
            .tempdir()
            .io_context(|| "failed to create port file directory")?
            .keep();
        Ok(Self {
            path: dir.join(PORT_FILE_NAME),
            owned_dir: Some(dir),
        })
    }

    /// Use an existing location. [`remove`](Self::remove) only deletes the
    /// file, not its directory.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            owned_dir: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the file.
    ///
    /// # Errors
    ///
    /// [`HarnessError::PortFileCorrupt`] for non-blank content that is not a
    /// port number.
    pub fn state(&self) -> Result<PortFileState> {
        read_state(&self.path)
    }

    /// Delete the port file (and its private directory, if owned).
    pub fn remove(&self) -> Result<()> {
        let (target, is_dir) = match &self.owned_dir {
            Some(dir) => (dir.as_path(), true),
            None => (self.path.as_path(), false),
        };
        let res = if is_dir {
            std::fs::remove_dir_all(target)
        } else {
            std::fs::remove_file(target)
        };
        match res {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(HarnessError::io(
                format!("failed to remove port file {}", target.display()),
                e,
            )),
        }
    }
}

fn read_state(path: &Path) -> Result<PortFileState> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(PortFileState::Missing),
        Err(e) => {
            return Err(HarnessError::io(
                format!("failed to read port file {}", path.display()),
                e,
            ));
        }
    };
    match String::from_utf8(bytes) {
        Ok(content) => parse_port(path, &content),
        Err(e) => Err(HarnessError::PortFileCorrupt {
            path: path.to_path_buf(),
            content: String::from_utf8_lossy(e.as_bytes()).trim().to_string(),
        }),
    }
}

/// Parse port file content. Blank content means "not written yet".
pub fn parse_port(path: &Path, content: &str) -> Result<PortFileState> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Ok(PortFileState::Empty);
    }
    trimmed
        .parse::<u16>()
        .map(PortFileState::Available)
        .map_err(|_| HarnessError::PortFileCorrupt {
            path: path.to_path_buf(),
            content: trimmed.to_string(),
        })
}

/// Filesystem change subscription on a single directory.
///
/// Dropping it closes the underlying watch.
struct Subscription {
    _watcher: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
}

impl Subscription {
    fn open(dir: &Path) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }
}

/// Rescan events mean others were dropped, so the file must be re-read.
fn is_relevant(event: &Event) -> bool {
    event.need_rescan()
        || matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any
        )
}

/// Blocks until a port file holds a port.
#[derive(Debug, Clone)]
pub struct PortFileWatcher {
    path: PathBuf,
    timeout: Option<Duration>,
}

impl PortFileWatcher {
    /// Watch `path` with no timeout.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timeout: None,
        }
    }

    /// Bound the whole wait. `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Wait for the port with no external cancellation.
    pub async fn wait_for_port(&self) -> Result<u16> {
        self.wait_for_port_until(&CancellationToken::new()).await
    }

    /// Wait for the port until it appears, `cancel` fires or the timeout
    /// elapses.
    ///
    /// On cancellation the file is read one last time, so a port written
    /// just before the canceller fired is still returned.
    ///
    /// # Errors
    ///
    /// - [`HarnessError::PortFileCorrupt`] as soon as malformed content is seen.
    /// - [`HarnessError::Cancelled`] if `cancel` fires first.
    /// - [`HarnessError::Timeout`] if the timeout elapses first.
    pub async fn wait_for_port_until(&self, cancel: &CancellationToken) -> Result<u16> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.watch(cancel))
                .await
                .map_err(|_| HarnessError::Timeout(limit))?,
            None => self.watch(cancel).await,
        }
    }

    async fn watch(&self, cancel: &CancellationToken) -> Result<u16> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut subscription = Subscription::open(&dir)?;
        debug!(path = %self.path.display(), "watching for port file");

        let mut state = read_state(&self.path)?;
        debug!(path = %self.path.display(), ?state, "initial port file state");

        loop {
            if let PortFileState::Available(port) = state {
                debug!(path = %self.path.display(), port, "port available");
                return Ok(port);
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    return match read_state(&self.path)? {
                        PortFileState::Available(port) => Ok(port),
                        _ => Err(HarnessError::Cancelled),
                    };
                }

                event = subscription.rx.recv() => match event {
                    Some(Ok(event)) if is_relevant(&event) => {
                        let next = read_state(&self.path)?;
                        if next != state {
                            debug!(path = %self.path.display(), from = ?state, to = ?next, "port file changed");
                        }
                        state = next;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(HarnessError::Cancelled),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn watcher(path: &Path) -> PortFileWatcher {
        PortFileWatcher::new(path).with_timeout(Some(Duration::from_secs(10)))
    }

    #[test]
    fn parse_rules() {
        let p = Path::new("x.port");
        assert_eq!(parse_port(p, "").unwrap(), PortFileState::Empty);
        assert_eq!(parse_port(p, "  \n").unwrap(), PortFileState::Empty);
        assert_eq!(parse_port(p, "9000\n").unwrap(), PortFileState::Available(9000));
        assert!(matches!(
            parse_port(p, "not-a-number"),
            Err(HarnessError::PortFileCorrupt { .. })
        ));
        assert!(matches!(
            parse_port(p, "70000"),
            Err(HarnessError::PortFileCorrupt { .. })
        ));
    }

    #[test]
    fn created_port_file_does_not_exist_yet() {
        let port_file = PortFile::create().unwrap();
        assert!(!port_file.path().exists());
        assert!(port_file.path().parent().unwrap().is_dir());
        assert_eq!(port_file.state().unwrap(), PortFileState::Missing);

        std::fs::write(port_file.path(), "8080").unwrap();
        assert_eq!(port_file.state().unwrap(), PortFileState::Available(8080));

        let dir = port_file.path().parent().unwrap().to_path_buf();
        port_file.remove().unwrap();
        assert!(!dir.exists());
        port_file.remove().unwrap();
    }

    #[test]
    fn remove_at_path_keeps_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("app.port");
        std::fs::write(&path, "1").unwrap();
        let port_file = PortFile::at(&path);
        port_file.remove().unwrap();
        assert!(!path.exists());
        assert!(tmp.path().is_dir());
    }

    #[tokio::test]
    async fn pre_written_file_returns_immediately() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("app.port");
        std::fs::write(&path, "9000").unwrap();

        let started = Instant::now();
        assert_eq!(watcher(&path).wait_for_port().await.unwrap(), 9000);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn delayed_write_to_empty_file_is_seen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("app.port");
        std::fs::write(&path, "").unwrap();

        let writer_path = path.clone();
        let writer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            std::fs::write(writer_path, "9000").unwrap();
        });

        assert_eq!(watcher(&path).wait_for_port().await.unwrap(), 9000);
        writer.join().unwrap();
    }

    #[tokio::test]
    async fn delayed_creation_is_seen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("app.port");

        let writer_path = path.clone();
        let writer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            std::fs::write(writer_path, "4242\n").unwrap();
        });

        assert_eq!(watcher(&path).wait_for_port().await.unwrap(), 4242);
        writer.join().unwrap();
    }

    #[tokio::test]
    async fn corrupt_content_fails_fast() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("app.port");
        std::fs::write(&path, "not-a-number").unwrap();

        let err = watcher(&path).wait_for_port().await.unwrap_err();
        match err {
            HarnessError::PortFileCorrupt { content, .. } => assert_eq!(content, "not-a-number"),
            other => panic!("expected PortFileCorrupt, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_utf8_content_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("app.port");
        std::fs::write(&path, [0xff, 0xfe, 0x39]).unwrap();

        let err = watcher(&path).wait_for_port().await.unwrap_err();
        match err {
            HarnessError::PortFileCorrupt { content, .. } => assert!(content.ends_with('9')),
            other => panic!("expected PortFileCorrupt, got {other:?}"),
        }
    }

    #[test]
    fn rescan_and_change_events_trigger_a_read() {
        use notify::event::{CreateKind, Flag, ModifyKind};

        assert!(is_relevant(&Event::new(EventKind::Create(CreateKind::File))));
        assert!(is_relevant(&Event::new(EventKind::Modify(ModifyKind::Any))));
        assert!(is_relevant(&Event::new(EventKind::Other).set_flag(Flag::Rescan)));
        assert!(!is_relevant(&Event::new(EventKind::Other)));
    }

    #[tokio::test]
    async fn times_out_when_nothing_is_written() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("app.port");

        let err = PortFileWatcher::new(&path)
            .with_timeout(Some(Duration::from_millis(200)))
            .wait_for_port()
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Timeout(_)));
    }

    #[tokio::test]
    async fn cancellation_unblocks_the_wait() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("app.port");
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let err = watcher(&path).wait_for_port_until(&cancel).await.unwrap_err();
        assert!(matches!(err, HarnessError::Cancelled));
    }

    #[tokio::test]
    async fn pre_check_wins_over_cancellation() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("app.port");
        std::fs::write(&path, "7001").unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(watcher(&path).wait_for_port_until(&cancel).await.unwrap(), 7001);
    }

    #[tokio::test]
    async fn missing_parent_directory_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("gone").join("app.port");
        assert!(watcher(&path).wait_for_port().await.is_err());
    }
}
