use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::errors::{Direction, Result, TransferError};

/// Copy `reader` into `writer` until end of stream, then shut the writer
/// down so the far side sees end of stream as well.
///
/// Both ends are consumed: the writer is closed (and its descriptor released)
/// when this returns, whatever the outcome.
pub(crate) async fn forward<R, W>(mut reader: R, mut writer: W, direction: Direction) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let copied = tokio::io::copy(&mut reader, &mut writer).await;
    if let Err(err) = writer.shutdown().await {
        log::debug!("closing {direction}: {err}");
    }
    match copied {
        Ok(bytes) => {
            log::debug!("{direction} finished after {bytes} bytes");
            Ok(bytes)
        }
        Err(source) => Err(TransferError::Forwarding { direction, source }),
    }
}
