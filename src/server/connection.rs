//! Connection handling for individual client connections

use super::Server;
use super::handler::Session;
use crate::ProtocolError;
use crate::protocol::ResponseWriter;
use bytes::BytesMut;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, warn};

/// Handle a single client connection until it closes
pub async fn handle<S>(
    server: Arc<Server>,
    mut stream: S,
    _permit: OwnedSemaphorePermit,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let result = serve(&server, &mut stream).await;
    server.metrics.active_connections.dec();
    result
}

/// Run the read / dispatch / write loop over `stream`
pub(crate) async fn serve<S>(server: &Server, stream: &mut S) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut read_buf = BytesMut::with_capacity(server.config.read_buffer_size);
    let mut response = ResponseWriter::new(server.config.write_buffer_size);
    let mut session = Session::new(
        Arc::clone(&server.store),
        Arc::clone(&server.metrics),
        server.zero_exptime,
    );
    let idle_timeout = (server.config.connection_timeout_secs > 0)
        .then(|| Duration::from_secs(server.config.connection_timeout_secs));
    let max_line_length = server.config.max_line_length;

    loop {
        let result = tokio::select! {
            _ = server.cancel_token.cancelled() => {
                break;
            }
            result = read_some(stream, &mut read_buf, idle_timeout) => result,
        };

        let closed = match result {
            Ok(Some(0)) => true,
            Ok(Some(n)) => {
                server.metrics.bytes_read.inc_by(n as u64);
                false
            }
            Ok(None) => {
                debug!("Idle timeout, closing connection");
                break;
            }
            Err(e) => {
                debug!("Read error: {}", e);
                break;
            }
        };

        let framing = if closed {
            // A final line without a delimiter still counts
            if !read_buf.is_empty() {
                let line = read_buf.split();
                session.handle_line(strip_line_ending(&line), &mut response);
            }
            Ok(())
        } else {
            process_lines(&mut read_buf, &mut session, &mut response, max_line_length)
        };

        if let Err(e) = &framing {
            server.metrics.protocol_errors.inc();
            warn!("Closing connection: {}", e);
            response.client_error(&e.to_string());
        }

        if !response.is_empty() {
            let buf = response.take();
            server.metrics.bytes_written.inc_by(buf.len() as u64);
            stream.write_all(&buf).await?;
        }

        if closed || framing.is_err() {
            break;
        }
    }

    if session.is_awaiting_payload() {
        debug!("Connection closed with a storage command awaiting its payload");
    }
    stream.shutdown().await.ok();
    Ok(())
}

/// Read more bytes, giving up after `idle_timeout` if one is set.
///
/// `Ok(None)` means the timeout elapsed.
async fn read_some<S>(
    stream: &mut S,
    buf: &mut BytesMut,
    idle_timeout: Option<Duration>,
) -> std::io::Result<Option<usize>>
where
    S: AsyncRead + Unpin,
{
    match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, stream.read_buf(buf)).await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        },
        None => stream.read_buf(buf).await.map(Some),
    }
}

/// Feed every complete line in `read_buf` to the session.
///
/// With `max_line_length > 0`, a line (delimiter included) longer than the
/// limit, or a partial line that can no longer fit, is a framing error.
fn process_lines(
    read_buf: &mut BytesMut,
    session: &mut Session,
    response: &mut ResponseWriter,
    max_line_length: usize,
) -> Result<(), ProtocolError> {
    while let Some(pos) = memchr::memchr(b'\n', read_buf) {
        if max_line_length > 0 && pos + 1 > max_line_length {
            return Err(ProtocolError::LineTooLong);
        }
        let line = read_buf.split_to(pos + 1);
        session.handle_line(strip_line_ending(&line), response);
    }

    if max_line_length > 0 && read_buf.len() >= max_line_length {
        return Err(ProtocolError::LineTooLong);
    }
    Ok(())
}

/// Strip a trailing `\n` and at most one `\r` before it
#[inline]
fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
