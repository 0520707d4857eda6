//! Byte-counting write adapter.

use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::io::AsyncWrite;

/// Callback invoked with the exact number of bytes of each successful write.
pub(crate) type ProgressFn = Box<dyn Fn(u64) + Send + Sync>;

/// Forwards writes to the underlying sink unchanged and reports the byte
/// delta of every successful write. With no callback installed it behaves
/// exactly like the bare sink.
pub(crate) struct ProgressSink<W> {
    inner: W,
    callback: Option<ProgressFn>,
}

impl<W> ProgressSink<W> {
    pub(crate) fn new(inner: W, callback: Option<ProgressFn>) -> Self {
        Self { inner, callback }
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for ProgressSink<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let result = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(written)) = &result {
            if *written > 0 {
                if let Some(callback) = &this.callback {
                    callback(*written as u64);
                }
            }
        }
        result
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
