//! Bidirectional relay between a client and its tunneled target.
//!
//! Each direction runs as its own task. When one direction finishes, for
//! any reason, it shuts down its writer and cancels the shared token so
//! the twin's blocked read or write unblocks immediately. Cancelling the
//! parent token tears down both directions the same way.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const BUFFER_SIZE: usize = 16 * 1024;

/// Bytes moved in each direction during one relay session.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelayStats {
    pub client_to_target: u64,
    pub target_to_client: u64,
}

/// Relays bytes both ways until both directions complete.
///
/// Byte counts and the first error per direction are logged at debug and
/// never surfaced.
pub async fn relay<A, B>(client: A, target: B, token: &CancellationToken) -> RelayStats
where
    A: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    let stop = token.child_token();
    let (client_read, client_write) = tokio::io::split(client);
    let (target_read, target_write) = tokio::io::split(target);

    let up = tokio::spawn(copy_direction(
        client_read,
        target_write,
        stop.clone(),
        "client->target",
    ));
    let down = tokio::spawn(copy_direction(
        target_read,
        client_write,
        stop,
        "target->client",
    ));

    let client_to_target = up.await.unwrap_or_default();
    let target_to_client = down.await.unwrap_or_default();
    RelayStats {
        client_to_target,
        target_to_client,
    }
}

async fn copy_direction<R, W>(
    mut reader: R,
    mut writer: W,
    stop: CancellationToken,
    direction: &'static str,
) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; BUFFER_SIZE];
    let mut written: u64 = 0;

    loop {
        let read = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            r = reader.read(&mut buf) => r,
        };
        let n = match read {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(direction, error = %e, "relay read failed");
                break;
            }
        };
        let write = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            r = writer.write_all(&buf[..n]) => r,
        };
        if let Err(e) = write {
            debug!(direction, error = %e, "relay write failed");
            break;
        }
        written += n as u64;
    }

    let _ = writer.shutdown().await;
    stop.cancel();
    debug!(direction, bytes = written, "relay direction finished");
    written
}
