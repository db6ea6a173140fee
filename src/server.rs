//! Server for the string and number channels.
//!
//! Binds one listener per channel, each on its own task, sharing a single
//! worker pool. Runs until the shutdown token is cancelled, then stops the
//! listeners and gives in-flight connections a grace period to finish.

use std::path::PathBuf;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::channel::ChannelKind;
use crate::config::ServeSettings;
use crate::error::ServerError;
use crate::handler::HandlerLimits;
use crate::listener::ChannelListener;
use crate::pool::WorkerPool;

/// Server instance
pub struct Server {
    socket_dir: PathBuf,
    settings: ServeSettings,
    pool: WorkerPool,
}

impl Server {
    /// Create a new server instance
    pub fn new(socket_dir: PathBuf, settings: ServeSettings) -> Result<Self, ServerError> {
        let pool = WorkerPool::new(settings.min_workers, settings.max_workers)?;

        Ok(Server {
            socket_dir,
            settings,
            pool,
        })
    }

    /// Get a reference to the worker pool for testing
    #[cfg(test)]
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Serve every channel until `shutdown` is cancelled.
    ///
    /// A channel that fails to bind is reported and skipped; the call only
    /// fails if no channel could be bound at all.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), ServerError> {
        std::fs::create_dir_all(&self.socket_dir)?;

        let limits = HandlerLimits {
            timeout: self.settings.timeout,
            max_line_length: self.settings.max_line_length,
        };

        let mut listeners = JoinSet::new();
        for kind in ChannelKind::ALL {
            match ChannelListener::bind(kind, &self.socket_dir) {
                Ok(listener) => {
                    listeners.spawn(listener.run(self.pool.clone(), limits, shutdown.clone()));
                }
                Err(e) => error!(channel = %kind, error = %e, "Failed to bind channel"),
            }
        }

        if listeners.is_empty() {
            return Err(ServerError::NoChannels);
        }

        info!(
            socket_dir = %self.socket_dir.display(),
            channels = listeners.len(),
            min_workers = self.pool.min(),
            max_workers = self.pool.max(),
            "Server started"
        );

        shutdown.cancelled().await;
        info!("Shutting down");

        while let Some(joined) = listeners.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Listener task failed");
            }
        }

        self.pool.close();
        if self.pool.drain(self.settings.shutdown_grace).await {
            info!("All connections finished");
        } else {
            warn!(
                active = self.pool.active(),
                "Grace period elapsed with connections still open"
            );
        }

        Ok(())
    }
}
