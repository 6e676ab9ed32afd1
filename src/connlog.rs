//! Connection logging.
//!
//! With `--conn-log` set, every byte read from and written to a connection
//! is teed into one shared append-only file. This is a debugging aid for
//! protocol traces; log write failures never disturb the connection.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

#[derive(Clone, Debug, Default)]
pub struct ConnectionLogger {
    sink: Option<Arc<Mutex<File>>>,
}

impl ConnectionLogger {
    /// A logger writing to `path`, or a no-op logger for `None`.
    pub fn open(path: Option<&Path>) -> std::io::Result<Self> {
        let sink = match path {
            Some(path) => Some(Arc::new(Mutex::new(
                OpenOptions::new().append(true).create(true).open(path)?,
            ))),
            None => None,
        };

        Ok(Self { sink })
    }

    pub fn wrap<S>(&self, inner: S) -> LoggedStream<S> {
        LoggedStream {
            inner,
            sink: self.sink.clone(),
        }
    }

    fn log(sink: &Option<Arc<Mutex<File>>>, data: &[u8]) {
        if let Some(sink) = sink {
            if let Ok(mut file) = sink.lock() {
                let _ = file.write_all(data);
            }
        }
    }
}

/// A stream teeing all traffic into the connection log.
#[derive(Debug)]
pub struct LoggedStream<S> {
    inner: S,
    sink: Option<Arc<Mutex<File>>>,
}

impl<S: AsyncRead + Unpin> AsyncRead for LoggedStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);

        if let Poll::Ready(Ok(())) = &poll {
            ConnectionLogger::log(&self.sink, &buf.filled()[before..]);
        }

        poll
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for LoggedStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write(cx, data);

        if let Poll::Ready(Ok(written)) = &poll {
            ConnectionLogger::log(&self.sink, &data[..*written]);
        }

        poll
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn test_tees_reads_and_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conn.log");
        let logger = ConnectionLogger::open(Some(&path)).unwrap();

        let (client, server) = tokio::io::duplex(64);
        let mut client = client;
        let mut server = logger.wrap(server);

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();

        server.write_all(b"pong").await.unwrap();
        client.read_exact(&mut buf).await.unwrap();

        let logged = std::fs::read(&path).unwrap();
        assert_eq!(logged, b"pingpong");
    }

    #[tokio::test]
    async fn test_noop_logger() {
        let logger = ConnectionLogger::open(None).unwrap();
        let (client, server) = tokio::io::duplex(64);
        let mut client = client;
        let mut server = logger.wrap(server);

        client.write_all(b"x").await.unwrap();
        let mut buf = [0u8; 1];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"x");
    }
}
