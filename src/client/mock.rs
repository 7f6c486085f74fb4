//! A scripted stream standing in for the server in tests.
//!
//! Reads drain a script of "server" bytes; writes land in a log. All
//! clones share both sides, so a test keeps one handle to inspect what
//! the client sent and to [`MockStream::feed`] further server lines
//! mid-conversation. Once the script is drained, reads report EOF, so
//! feed anything the test still needs before the client reads that far.

use std::{
    io::{self, Read, Write},
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

struct Shared {
    /// Bytes the "server" has queued; `pos` marks how far the client
    /// has read.
    script: Vec<u8>,
    pos: usize,
    /// Everything the client wrote.
    written: Vec<u8>,
}

/// A scripted stream for driving the client without a network.
#[derive(Clone)]
pub struct MockStream {
    shared: Arc<Mutex<Shared>>,
}

impl MockStream {
    /// A stream with nothing scripted; the first read is EOF.
    pub fn empty() -> MockStream {
        MockStream::new(&[])
    }

    /// A stream scripted with the given server bytes.
    pub fn new(script: &[u8]) -> MockStream {
        MockStream {
            shared: Arc::new(Mutex::new(Shared {
                script: script.to_owned(),
                pos: 0,
                written: Vec::new(),
            })),
        }
    }

    /// Appends server bytes behind whatever is still unread.
    pub fn feed(&self, bytes: &[u8]) {
        if let Ok(mut shared) = self.shared.lock() {
            shared.script.extend_from_slice(bytes);
        }
    }

    /// A snapshot of the bytes written so far.
    pub fn written(&self) -> Vec<u8> {
        self.shared
            .lock()
            .map(|s| s.written.clone())
            .unwrap_or_default()
    }

    /// The written bytes as UTF-8 text.
    pub fn written_text(&self) -> String {
        String::from_utf8_lossy(&self.written()).into_owned()
    }
}

fn poisoned() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "mock stream lock poisoned")
}

impl AsyncRead for MockStream {
    fn poll_read(
        self: Pin<&mut Self>,
        _: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut shared = match self.shared.lock() {
            Ok(shared) => shared,
            Err(_) => return Poll::Ready(Err(poisoned())),
        };
        let pos = shared.pos;
        // Reading past the script is a clean EOF (zero bytes filled).
        let n = (&shared.script[pos..]).read(buf.initialize_unfilled())?;
        shared.pos += n;
        buf.advance(n);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, io::Error>> {
        let mut shared = match self.shared.lock() {
            Ok(shared) => shared,
            Err(_) => return Poll::Ready(Err(poisoned())),
        };
        Poll::Ready(shared.written.write(buf))
    }

    fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn clones_share_both_sides() {
        let mut stream = MockStream::new(b"abc");
        let handle = stream.clone();

        let mut buf = [0u8; 3];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"abc");

        stream.write_all(b"reply").await.unwrap();
        assert_eq!(handle.written_text(), "reply");
    }

    #[tokio::test]
    async fn feed_extends_the_script() {
        let mut stream = MockStream::new(b"one");
        let handle = stream.clone();

        let mut buf = [0u8; 3];
        stream.read_exact(&mut buf).await.unwrap();

        handle.feed(b"two");
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"two");

        // Drained and nothing more fed: EOF.
        assert_eq!(stream.read(&mut buf).await.unwrap(), 0);
    }
}
