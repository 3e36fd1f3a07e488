use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::NotifySection;
use crate::engine::member_engine::MemberListEngine;

/// Keepalive line written to the stream.
pub const KEEPALIVE: &[u8] = b"PING\n";

/// Read one newline-terminated line into `buf`, failing once it grows past
/// `max_len` bytes. Returns 0 on EOF.
async fn read_bounded_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max_len: usize,
) -> std::io::Result<usize> {
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(0);
        }
        if let Some(pos) = available.iter().position(|&b| b == b'\n') {
            if buf.len() + pos + 1 > max_len {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "notification line exceeds maximum length",
                ));
            }
            buf.extend_from_slice(&available[..=pos]);
            reader.consume(pos + 1);
            return Ok(buf.len());
        }
        let len = available.len();
        buf.extend_from_slice(available);
        reader.consume(len);
        if buf.len() > max_len {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "notification line exceeds maximum length",
            ));
        }
    }
}

/// Pump notifications from `reader` into the engine and write keepalives to
/// `writer`, until the stream fails or `cancel` fires.
///
/// Any stream failure is returned as an error: the view can no longer be
/// trusted to follow the source store.
pub async fn pump<R, W>(
    reader: R,
    mut writer: W,
    engine: Arc<MemberListEngine>,
    keepalive: Duration,
    max_line_bytes: usize,
    cancel: CancellationToken,
) -> anyhow::Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + keepalive, keepalive);
    let mut line = Vec::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("notification stream shutting down");
                return Ok(());
            }
            _ = ticker.tick() => {
                writer
                    .write_all(KEEPALIVE)
                    .await
                    .context("keepalive write failed")?;
                writer.flush().await.context("keepalive flush failed")?;
                debug!("keepalive sent");
            }
            result = read_bounded_line(&mut reader, &mut line, max_line_bytes) => {
                let n = result.context("notification stream read failed")?;
                if n == 0 {
                    bail!("notification stream closed by peer");
                }
                match std::str::from_utf8(&line) {
                    Ok(text) => {
                        let payload = text.trim();
                        if !payload.is_empty() {
                            engine.enqueue_raw(payload);
                        }
                    }
                    Err(e) => warn!(error = %e, "dropping non-UTF-8 notification"),
                }
                line.clear();
            }
        }
    }
}

/// Connect to the change-notification stream and start pumping it.
///
/// Returns once the connection is established, so callers can subscribe
/// before bootstrapping and lose nothing in between. The returned task
/// resolves with the stream's terminal error.
pub async fn subscribe(
    config: &NotifySection,
    engine: Arc<MemberListEngine>,
    cancel: CancellationToken,
) -> anyhow::Result<tokio::task::JoinHandle<anyhow::Result<()>>> {
    let stream = TcpStream::connect(&config.address)
        .await
        .with_context(|| format!("failed to connect to notification stream at {}", config.address))?;
    info!(address = %config.address, "subscribed to change notifications");

    let (reader, writer) = stream.into_split();
    let keepalive = Duration::from_secs(config.keepalive_secs.max(1));
    let max_line_bytes = config.max_line_bytes;
    Ok(tokio::spawn(pump(
        reader,
        writer,
        engine,
        keepalive,
        max_line_bytes,
        cancel,
    )))
}
