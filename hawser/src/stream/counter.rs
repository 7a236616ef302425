use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use futures::{AsyncBufRead, AsyncRead, AsyncWrite};

/// A transparent wrapper around an I/O object counting the bytes
/// flowing through it, to trigger re-keying.
pub struct IoCounter<S> {
    inner: S,
    count: usize,
}

impl<S> IoCounter<S> {
    pub fn new(stream: S) -> Self {
        Self {
            inner: stream,
            count: 0,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for IoCounter<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        let size = futures::ready!(Pin::new(&mut self.inner).poll_read(cx, buf))?;
        self.count = self.count.saturating_add(size);

        Poll::Ready(Ok(size))
    }
}

impl<S: AsyncBufRead + Unpin> AsyncBufRead for IoCounter<S> {
    fn poll_fill_buf(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<&[u8]>> {
        Pin::new(&mut self.get_mut().inner).poll_fill_buf(cx)
    }

    fn consume(mut self: Pin<&mut Self>, amt: usize) {
        self.count = self.count.saturating_add(amt);

        Pin::new(&mut self.inner).consume(amt)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for IoCounter<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let size = futures::ready!(Pin::new(&mut self.inner).poll_write(cx, buf))?;
        self.count = self.count.saturating_add(size);

        Poll::Ready(Ok(size))
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_close(cx)
    }
}
