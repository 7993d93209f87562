use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// `bytes` more bytes crossed the bridge; `total` is the running sum.
    Transferred { bytes: u64, total: u64 },
    /// The observed direction reached end of stream.
    Finished { total: u64 },
}

/// Sink for byte counts, owned by whoever wants to observe the transfer.
///
/// The engine only ever sends; a dropped receiver is not an error.
#[derive(Clone)]
pub struct TransferProgress {
    sender: UnboundedSender<ProgressEvent>,
}

impl TransferProgress {
    pub fn new(sender: UnboundedSender<ProgressEvent>) -> Self {
        Self { sender }
    }

    pub fn report_transferred(&self, bytes: u64, total: u64) {
        let _ = self.sender.send(ProgressEvent::Transferred { bytes, total });
    }

    pub fn report_finished(&self, total: u64) {
        let _ = self.sender.send(ProgressEvent::Finished { total });
    }
}

/// Reader decorator reporting the cumulative number of bytes read.
pub struct ProgressReader<R> {
    inner: R,
    progress: Option<TransferProgress>,
    total: u64,
    finished: bool,
}

impl<R> ProgressReader<R> {
    pub fn new(inner: R, progress: Option<TransferProgress>) -> Self {
        Self {
            inner,
            progress,
            total: 0,
            finished: false,
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ProgressReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let this = &mut *self;
        let result = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &result {
            let read = (buf.filled().len() - before) as u64;
            if read > 0 {
                this.total = this.total.saturating_add(read);
                if let Some(progress) = &this.progress {
                    progress.report_transferred(read, this.total);
                }
            } else if !this.finished {
                this.finished = true;
                if let Some(progress) = &this.progress {
                    progress.report_finished(this.total);
                }
            }
        }
        result
    }
}
