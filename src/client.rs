//! Client sessions.
//!
//! A session connects to a channel, sends one request line, waits for one
//! response line and disconnects. Several sessions can run concurrently
//! against the same channel; each one owns its connection.

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::channel::ChannelKind;
use crate::error::ClientError;

/// Result of one labelled session.
#[derive(Debug)]
pub struct SessionOutcome {
    /// 1-based session number.
    pub session: usize,
    /// Request text sent.
    pub request: String,
    /// Response line, or why none was received.
    pub result: Result<String, ClientError>,
}

/// Send `request` on `kind` and return the response line.
///
/// The whole exchange, connecting included, must finish within `timeout`.
pub async fn send_request(
    dir: &Path,
    kind: ChannelKind,
    request: &str,
    timeout: Duration,
) -> Result<String, ClientError> {
    if request.contains(['\n', '\r']) {
        return Err(ClientError::MultiLineRequest);
    }

    tokio::time::timeout(timeout, exchange(dir, kind, request))
        .await
        .map_err(|_| ClientError::Timeout(timeout))?
}

async fn exchange(dir: &Path, kind: ChannelKind, request: &str) -> Result<String, ClientError> {
    let path = kind.socket_path(dir);
    let stream = UnixStream::connect(&path)
        .await
        .map_err(|source| ClientError::Connect {
            channel: kind,
            path: path.clone(),
            source,
        })?;
    debug!(channel = %kind, "Connected");

    let mut stream = BufReader::new(stream);
    stream.write_all(request.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    stream.flush().await?;

    let mut line = String::new();
    if stream.read_line(&mut line).await? == 0 {
        return Err(ClientError::ConnectionClosed);
    }

    let response = line.trim_end_matches(['\r', '\n']);
    Ok(response.to_string())
}

/// Request text for session `session` of `total`.
pub fn session_request(total: usize, session: usize, message: Option<&str>) -> String {
    match message {
        Some(message) => message.to_string(),
        None if total == 1 => "single request".to_string(),
        None => format!("Thread-{session} request"),
    }
}

/// Launch `sessions` concurrent sessions against `kind`.
///
/// Every session reports its own outcome; a failing session never affects
/// the others. Outcomes are returned in session order.
pub async fn run_sessions(
    dir: &Path,
    kind: ChannelKind,
    sessions: usize,
    message: Option<&str>,
    timeout: Duration,
) -> Vec<SessionOutcome> {
    let mut set = JoinSet::new();

    for session in 1..=sessions {
        let request = session_request(sessions, session, message);
        let dir = dir.to_path_buf();

        set.spawn(async move {
            info!(session, channel = %kind, request = %request, "Sending request");
            let result = send_request(&dir, kind, &request, timeout).await;
            match &result {
                Ok(response) => info!(session, response = %response, "Response received"),
                Err(e) => error!(session, error = %e, "Session failed"),
            }
            SessionOutcome {
                session,
                request,
                result,
            }
        });
    }

    let mut outcomes = Vec::with_capacity(sessions);
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => error!(error = %e, "Session task failed"),
        }
    }
    outcomes.sort_by_key(|outcome| outcome.session);
    outcomes
}
