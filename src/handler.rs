//! Connection handler.
//!
//! Performs exactly one request/response exchange on an accepted
//! connection:
//!
//! ```text
//! Request:  <text>\n
//! Response: <dispatcher output>\n
//! ```
//!
//! The connection is closed when the handler returns, whatever the outcome.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, trace, warn};

use crate::channel::ChannelKind;
use crate::dispatcher::dispatch;
use crate::error::HandlerError;

/// Per-connection limits applied by every handler.
#[derive(Debug, Clone, Copy)]
pub struct HandlerLimits {
    /// Deadline for the whole exchange.
    pub timeout: Duration,
    /// Longest accepted request line, excluding the line terminator.
    pub max_line_length: usize,
}

/// Handle one connection, logging any failure.
///
/// Never returns an error: failures end this connection only.
pub async fn serve_connection<S>(stream: S, kind: ChannelKind, limits: HandlerLimits)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match handle_connection(stream, kind, limits).await {
        Ok(()) => trace!(channel = %kind, "Connection done"),
        Err(HandlerError::ClosedEarly) => {
            debug!(channel = %kind, "Connection closed before request")
        }
        Err(e) => warn!(channel = %kind, error = %e, "Connection failed"),
    }
}

/// Handle one connection: read a line, dispatch it, write the reply.
pub async fn handle_connection<S>(
    stream: S,
    kind: ChannelKind,
    limits: HandlerLimits,
) -> Result<(), HandlerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // BufReader passes writes through to the inner stream.
    let mut stream = BufReader::new(stream);

    tokio::time::timeout(limits.timeout, exchange(&mut stream, kind, limits.max_line_length))
        .await
        .map_err(|_| HandlerError::Timeout(limits.timeout))?
}

async fn exchange<S>(
    stream: &mut BufReader<S>,
    kind: ChannelKind,
    max_line_length: usize,
) -> Result<(), HandlerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = read_request(stream, max_line_length).await?;
    debug!(channel = %kind, request = %request, "Request received");

    let mut response = dispatch(kind, &request);
    response.push('\n');

    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    stream.shutdown().await?;
    Ok(())
}

/// Read a single request line, without its terminator.
///
/// A final line ended by EOF instead of a newline is accepted.
pub(crate) async fn read_request<R>(reader: &mut R, limit: usize) -> Result<String, HandlerError>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut line = Vec::with_capacity(limit.min(1024));
    // Room for the line, an optional `\r` and the `\n`.
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(2);

    let n = reader.take(cap).read_until(b'\n', &mut line).await?;
    if n == 0 {
        return Err(HandlerError::ClosedEarly);
    }

    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
    }
    if line.len() > limit {
        return Err(HandlerError::LineTooLong { limit });
    }

    Ok(String::from_utf8_lossy(&line).into_owned())
}
