//! Channel listener.
//!
//! Owns one channel socket and runs its accept loop. Every accepted
//! connection is handed to the worker pool and the loop goes straight back
//! to accepting.

use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::channel::ChannelKind;
use crate::error::ServerError;
use crate::handler::{serve_connection, HandlerLimits};
use crate::pool::WorkerPool;

/// Pause after a failed accept so persistent errors don't spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// A bound channel endpoint.
#[derive(Debug)]
pub struct ChannelListener {
    kind: ChannelKind,
    path: PathBuf,
    listener: UnixListener,
}

impl ChannelListener {
    /// Bind the socket for `kind` inside `dir`.
    ///
    /// A leftover socket from a dead server is replaced; a socket with a
    /// live server behind it is reported as in use.
    pub fn bind(kind: ChannelKind, dir: &Path) -> Result<Self, ServerError> {
        let path = kind.socket_path(dir);
        clear_stale_socket(kind, &path)?;

        let listener = UnixListener::bind(&path).map_err(|source| ServerError::Bind {
            channel: kind,
            path: path.clone(),
            source,
        })?;

        Ok(Self {
            kind,
            path,
            listener,
        })
    }

    /// Channel served by this listener.
    #[cfg(test)]
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Socket path clients connect to.
    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept connections until `shutdown` is cancelled or the pool closes.
    pub async fn run(self, pool: WorkerPool, limits: HandlerLimits, shutdown: CancellationToken) {
        info!(
            channel = %self.kind,
            path = %self.path.display(),
            "Channel listening"
        );

        loop {
            trace!(channel = %self.kind, "Waiting for connection");
            let accepted = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            let stream = match accepted {
                Ok((stream, _addr)) => stream,
                Err(e) => {
                    error!(channel = %self.kind, error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    continue;
                }
            };
            debug!(channel = %self.kind, "New connection");

            // Held until a pool slot frees up; the accept loop of other
            // channels is unaffected.
            let slot = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                slot = pool.reserve() => match slot {
                    Ok(slot) => slot,
                    Err(_) => break,
                },
            };

            pool.submit(slot, serve_connection(stream, self.kind, limits));
        }

        info!(channel = %self.kind, "Channel listener stopped");
    }
}

impl Drop for ChannelListener {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                debug!(path = %self.path.display(), error = %e, "Failed to remove socket");
            }
        }
    }
}

/// Remove a socket file left behind by a server that is no longer running.
fn clear_stale_socket(kind: ChannelKind, path: &Path) -> Result<(), ServerError> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(ServerError::Io(e)),
    };

    if !metadata.file_type().is_socket() {
        return Err(ServerError::NotASocket {
            channel: kind,
            path: path.to_path_buf(),
        });
    }

    match std::os::unix::net::UnixStream::connect(path) {
        Ok(_) => Err(ServerError::ChannelInUse {
            channel: kind,
            path: path.to_path_buf(),
        }),
        Err(e)
            if e.kind() == io::ErrorKind::ConnectionRefused
                || e.kind() == io::ErrorKind::NotFound =>
        {
            debug!(path = %path.display(), "Removing stale socket");
            std::fs::remove_file(path)?;
            Ok(())
        }
        Err(e) => Err(ServerError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::UnixStream;

    const LIMITS: HandlerLimits = HandlerLimits {
        timeout: Duration::from_secs(5),
        max_line_length: 1024,
    };

    async fn roundtrip(path: &Path, request: &str) -> String {
        let mut stream = UnixStream::connect(path).await.unwrap();
        stream
            .write_all(format!("{request}\n").as_bytes())
            .await
            .unwrap();
        let mut line = String::new();
        BufReader::new(stream).read_line(&mut line).await.unwrap();
        line
    }

    #[tokio::test]
    async fn test_bind_creates_socket() {
        let dir = tempfile::tempdir().unwrap();
        let listener = ChannelListener::bind(ChannelKind::String, dir.path()).unwrap();

        assert_eq!(listener.kind(), ChannelKind::String);
        assert_eq!(listener.path(), dir.path().join("string-channel.sock"));
        assert!(listener.path().exists());
    }

    #[tokio::test]
    async fn test_bind_in_use() {
        let dir = tempfile::tempdir().unwrap();
        let _first = ChannelListener::bind(ChannelKind::Number, dir.path()).unwrap();

        let err = ChannelListener::bind(ChannelKind::Number, dir.path()).unwrap_err();
        assert!(matches!(
            err,
            ServerError::ChannelInUse {
                channel: ChannelKind::Number,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_other_channel_unaffected_by_bind_failure() {
        let dir = tempfile::tempdir().unwrap();
        let _first = ChannelListener::bind(ChannelKind::Number, dir.path()).unwrap();

        assert!(ChannelListener::bind(ChannelKind::Number, dir.path()).is_err());
        assert!(ChannelListener::bind(ChannelKind::String, dir.path()).is_ok());
    }

    #[tokio::test]
    async fn test_bind_replaces_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = ChannelKind::String.socket_path(dir.path());
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        assert!(ChannelListener::bind(ChannelKind::String, dir.path()).is_ok());
    }

    #[tokio::test]
    async fn test_bind_refuses_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = ChannelKind::String.socket_path(dir.path());
        std::fs::write(&path, b"not a socket").unwrap();

        let err = ChannelListener::bind(ChannelKind::String, dir.path()).unwrap_err();
        assert!(matches!(err, ServerError::NotASocket { .. }));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_drop_removes_socket() {
        let dir = tempfile::tempdir().unwrap();
        let listener = ChannelListener::bind(ChannelKind::String, dir.path()).unwrap();
        let path = listener.path().to_path_buf();

        drop(listener);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_accept_loop_serves_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let listener = ChannelListener::bind(ChannelKind::Number, dir.path()).unwrap();
        let path = listener.path().to_path_buf();
        let pool = WorkerPool::new(1, 4).unwrap();
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(listener.run(pool, LIMITS, shutdown.clone()));

        assert_eq!(roundtrip(&path, "5").await, "Number squared: 25\n");
        assert_eq!(roundtrip(&path, "x").await, "Error: invalid input\n");

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_failed_connection_does_not_stop_listener() {
        let dir = tempfile::tempdir().unwrap();
        let listener = ChannelListener::bind(ChannelKind::String, dir.path()).unwrap();
        let path = listener.path().to_path_buf();
        let pool = WorkerPool::new(1, 4).unwrap();
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(listener.run(pool, LIMITS, shutdown.clone()));

        // Connect and hang up without sending anything.
        drop(UnixStream::connect(&path).await.unwrap());

        assert_eq!(roundtrip(&path, "still up").await, "String response: STILL UP\n");

        shutdown.cancel();
        task.await.unwrap();
    }
}
