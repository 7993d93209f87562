//! Client end of the rendezvous, run by rsync as its remote shell.
//!
//! rsync invokes `<helper> netcat <endpoint> <name> -- <host> rsync --server ...`
//! and talks its protocol over the helper's stdin/stdout; the helper splices
//! both onto the rendezvous socket and ignores the trailing arguments.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::bridge::forward::forward;
use crate::errors::{Direction, Result, TransferError};
use crate::rendezvous;

/// Splice `input` → endpoint and endpoint → `output` until the endpoint
/// closes. `name` only labels log output.
pub async fn netcat<R, W>(endpoint: &str, name: &str, input: R, output: W) -> Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    let conn = rendezvous::connect(endpoint)
        .await
        .map_err(|err| TransferError::io(format!("connecting to {endpoint}"), err))?;
    log::debug!("netcat {name}: connected to {endpoint}");

    let (conn_read, conn_write) = conn.into_split();
    let upstream = tokio::spawn(forward(input, conn_write, Direction::Outbound));
    let downstream = forward(conn_read, output, Direction::Inbound).await;

    // Once the bridge hangs up there is nobody left to write to, even if
    // rsync still holds our stdin open.
    if !upstream.is_finished() {
        upstream.abort();
    }
    match upstream.await {
        Ok(Err(err)) => log::debug!("netcat {name}: {err}"),
        Ok(Ok(bytes)) => log::debug!("netcat {name}: forwarded {bytes} bytes upstream"),
        Err(_) => {}
    }

    downstream.map(|_| ())
}
