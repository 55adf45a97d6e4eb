use pin_project_lite::pin_project;
use std::{
    future::Future,
    io::{self, ErrorKind},
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    time::{sleep_until, Instant, Sleep},
};

pin_project! {
    /// A stream with absolute read and write deadlines.
    ///
    /// Both deadlines are fixed when the stream is wrapped and are never
    /// pushed back by activity. Once a deadline has passed, every read (or
    /// write) fails with `TimedOut`.
    pub struct DeadlineStream<S> {
        #[pin]
        inner: S,
        read_deadline: Pin<Box<Sleep>>,
        write_deadline: Pin<Box<Sleep>>,
    }
}

impl<S> DeadlineStream<S> {
    pub fn new(inner: S, read_timeout: Duration, write_timeout: Duration) -> Self {
        let now = Instant::now();
        DeadlineStream {
            inner,
            read_deadline: Box::pin(sleep_until(now + read_timeout)),
            write_deadline: Box::pin(sleep_until(now + write_timeout)),
        }
    }

    /// Drops the deadlines and returns the wrapped stream.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[inline]
fn expired(kind: &str) -> io::Error {
    io::Error::new(ErrorKind::TimedOut, format!("{kind} deadline exceeded"))
}

impl<S: AsyncRead> AsyncRead for DeadlineStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        if this.read_deadline.as_mut().poll(cx).is_ready() {
            return Poll::Ready(Err(expired("read")));
        }
        this.inner.poll_read(cx, buf)
    }
}

impl<S: AsyncWrite> AsyncWrite for DeadlineStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        if this.write_deadline.as_mut().poll(cx).is_ready() {
            return Poll::Ready(Err(expired("write")));
        }
        this.inner.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.project();
        if this.write_deadline.as_mut().poll(cx).is_ready() {
            return Poll::Ready(Err(expired("write")));
        }
        this.inner.poll_flush(cx)
    }

    // Closing is always allowed.
    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn wrap() -> (tokio::io::DuplexStream, DeadlineStream<tokio::io::DuplexStream>) {
        let (client, server) = tokio::io::duplex(64);
        (
            client,
            DeadlineStream::new(server, Duration::from_secs(10), Duration::from_secs(30)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_read_times_out_at_deadline() {
        let (_client, mut stream) = wrap();
        let start = Instant::now();

        let mut buf = [0u8; 8];
        let err = stream.read(&mut buf).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TimedOut);
        assert!(start.elapsed() >= Duration::from_secs(10));
        assert!(start.elapsed() < Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_is_not_refreshed_by_activity() {
        let (mut client, mut stream) = wrap();
        let mut buf = [0u8; 8];

        tokio::time::advance(Duration::from_secs(6)).await;
        client.write_all(b"hi").await.unwrap();
        assert_eq!(stream.read(&mut buf).await.unwrap(), 2);

        tokio::time::advance(Duration::from_secs(5)).await;
        client.write_all(b"again").await.unwrap();
        let err = stream.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_deadline_is_independent() {
        let (mut client, mut stream) = wrap();

        tokio::time::advance(Duration::from_secs(20)).await;
        stream.write_all(b"late but allowed").await.unwrap();

        let mut buf = [0u8; 16];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"late but allowed");

        tokio::time::advance(Duration::from_secs(11)).await;
        let err = stream.write_all(b"too late").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_into_inner_drops_deadlines() {
        let (mut client, stream) = wrap();
        tokio::time::advance(Duration::from_secs(60)).await;

        let mut inner = stream.into_inner();
        client.write_all(b"ok").await.unwrap();
        let mut buf = [0u8; 2];
        inner.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ok");
    }
}
