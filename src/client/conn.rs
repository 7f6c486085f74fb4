//! The connection: transport establishment with soft/hard timeouts,
//! proxy and TLS handshakes, and framed message read/write.

use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures_util::{sink::Sink, sink::SinkExt, stream::Stream, stream::StreamExt};
use log::{debug, info, warn};
use tokio::net::{self, TcpSocket, TcpStream};
use tokio::time;
use tokio_native_tls::TlsStream;
use tokio_util::codec::{Decoder, Framed, FramedParts};

use sirc_proto::error::ProtocolError;
use sirc_proto::{IrcCodec, Message};

use crate::client::data::Config;
use crate::client::mock::MockStream;
use crate::client::proxy;
use crate::error::{Error, Result};

/// The one live transport a connection owns, if any.
enum Transport {
    Plain(Framed<TcpStream, IrcCodec>),
    Tls(Framed<TlsStream<TcpStream>, IrcCodec>),
    Mock(Framed<MockStream, IrcCodec>),
}

impl Stream for Transport {
    type Item = ::std::result::Result<Message, ProtocolError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match &mut *self {
            Transport::Plain(inner) => Pin::new(inner).poll_next(cx),
            Transport::Tls(inner) => Pin::new(inner).poll_next(cx),
            Transport::Mock(inner) => Pin::new(inner).poll_next(cx),
        }
    }
}

impl Sink<String> for Transport {
    type Error = ProtocolError;

    fn poll_ready(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<::std::result::Result<(), Self::Error>> {
        match &mut *self {
            Transport::Plain(inner) => Pin::new(inner).poll_ready(cx),
            Transport::Tls(inner) => Pin::new(inner).poll_ready(cx),
            Transport::Mock(inner) => Pin::new(inner).poll_ready(cx),
        }
    }

    fn start_send(
        mut self: Pin<&mut Self>,
        item: String,
    ) -> ::std::result::Result<(), Self::Error> {
        match &mut *self {
            Transport::Plain(inner) => Pin::new(inner).start_send(item),
            Transport::Tls(inner) => Pin::new(inner).start_send(item),
            Transport::Mock(inner) => Pin::new(inner).start_send(item),
        }
    }

    fn poll_flush(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<::std::result::Result<(), Self::Error>> {
        match &mut *self {
            Transport::Plain(inner) => Pin::new(inner).poll_flush(cx),
            Transport::Tls(inner) => Pin::new(inner).poll_flush(cx),
            Transport::Mock(inner) => Pin::new(inner).poll_flush(cx),
        }
    }

    fn poll_close(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<::std::result::Result<(), Self::Error>> {
        match &mut *self {
            Transport::Plain(inner) => Pin::new(inner).poll_close(cx),
            Transport::Tls(inner) => Pin::new(inner).poll_close(cx),
            Transport::Mock(inner) => Pin::new(inner).poll_close(cx),
        }
    }
}

/// A connection to an IRC server. Owns at most one transport at a time;
/// any read or write failure that is not a timeout drops the transport
/// and leaves the connection offline.
#[derive(Default)]
pub struct Connection {
    transport: Option<Transport>,
    eof: bool,
    colon_trail: bool,
}

impl Connection {
    /// Creates an offline connection.
    pub fn new() -> Connection {
        Connection::default()
    }

    /// Whether a transport is up.
    pub fn online(&self) -> bool {
        self.transport.is_some()
    }

    /// Whether the last disconnect was a clean EOF from the peer.
    pub fn eof(&self) -> bool {
        self.eof
    }

    /// Whether the last read line's final argument used the `:` trailing
    /// syntax.
    pub fn colon_trail(&self) -> bool {
        self.colon_trail
    }

    /// The raw fd of the underlying socket, when there is a real one.
    #[cfg(unix)]
    pub fn sockfd(&self) -> Option<std::os::unix::io::RawFd> {
        use std::os::unix::io::AsRawFd;
        match self.transport.as_ref()? {
            Transport::Plain(framed) => Some(framed.get_ref().as_raw_fd()),
            Transport::Tls(framed) => {
                Some(framed.get_ref().get_ref().get_ref().get_ref().as_raw_fd())
            }
            Transport::Mock(_) => None,
        }
    }

    /// Drops the transport and resets the read state. Idempotent.
    pub fn reset(&mut self) {
        if self.transport.is_some() {
            debug!("resetting connection");
        }
        self.transport = None;
        self.colon_trail = false;
    }

    /// Establishes the transport: resolve, candidate-connect under the
    /// soft/hard budget, then the proxy handshake and the TLS handshake
    /// as configured.
    pub(crate) async fn connect(&mut self, config: &Config) -> Result<()> {
        if self.online() {
            return Err(Error::AlreadyConnected);
        }
        self.eof = false;
        self.colon_trail = false;

        let server = config.server().to_owned();
        let port = config.port();
        let soft_us = config.soft_timeout_us();
        let hard_us = config.hard_timeout_us();
        let deadline = (hard_us > 0).then(|| Instant::now() + Duration::from_micros(hard_us));

        // With a proxy configured, the transport goes to the proxy and the
        // server endpoint only appears inside the handshake.
        let (dest_host, dest_port) = match config.proxy() {
            Some(px) => (px.host.clone(), px.port),
            None => (server.clone(), port),
        };

        info!(
            "connecting to {}:{}{}",
            server,
            port,
            match config.proxy() {
                Some(px) => format!(" via {}:{}:{}", px.kind, px.host, px.port),
                None => String::new(),
            }
        );

        let mut stream = connect_sock(
            &dest_host,
            dest_port,
            config.local_addr(),
            soft_us,
            hard_us,
            deadline,
        )
        .await?;

        if let Some(px) = config.proxy() {
            let handshake = proxy::handshake(&mut stream, px.kind, &server, port);
            match remaining_us(deadline)? {
                0 => handshake.await?,
                rem => time::timeout(Duration::from_micros(rem), handshake)
                    .await
                    .map_err(|_| Error::Timeout)??,
            }
            debug!("proxy handshake complete");
        }

        let codec = IrcCodec::new(config.encoding())?;
        if config.use_ssl() {
            let tls = tls_handshake(&server, stream).await?;
            self.transport = Some(Transport::Tls(codec.framed(tls)));
        } else {
            self.transport = Some(Transport::Plain(codec.framed(stream)));
        }

        debug!("connection to ircd established");
        Ok(())
    }

    /// Attaches a scripted stream in place of a real transport. Used by
    /// tests and offline tools.
    pub(crate) fn attach_mock(&mut self, stream: MockStream, encoding: &str) -> Result<()> {
        if self.online() {
            return Err(Error::AlreadyConnected);
        }
        self.eof = false;
        self.colon_trail = false;
        let codec = IrcCodec::new(encoding)?;
        self.transport = Some(Transport::Mock(codec.framed(stream)));
        Ok(())
    }

    /// Upgrades the plain transport to TLS in place (STARTTLS). Bytes
    /// already buffered by the framer survive the swap.
    pub(crate) async fn upgrade_tls(&mut self, domain: &str) -> Result<()> {
        let transport = self.transport.take().ok_or(Error::NotConnected)?;
        let framed = match transport {
            Transport::Plain(framed) => framed,
            other => {
                self.transport = Some(other);
                return Err(Error::Tls(
                    "STARTTLS on a transport that is not a plain socket".to_owned(),
                ));
            }
        };

        let parts = framed.into_parts();
        let tls = match tls_handshake(domain, parts.io).await {
            Ok(tls) => tls,
            Err(e) => {
                // The socket is gone; the connection is dead either way.
                self.reset();
                return Err(e);
            }
        };
        let mut new_parts = FramedParts::new::<String>(tls, parts.codec);
        new_parts.read_buf = parts.read_buf;
        new_parts.write_buf = parts.write_buf;
        self.transport = Some(Transport::Tls(Framed::from_parts(new_parts)));
        info!("transport upgraded to TLS");
        Ok(())
    }

    /// Reads one message. `to_us` of zero means no timeout. `Ok(None)`
    /// is a timeout; any other failure resets the connection, recording
    /// EOF when the peer closed cleanly.
    pub(crate) async fn read(&mut self, to_us: u64) -> Result<Option<Message>> {
        let transport = self.transport.as_mut().ok_or(Error::NotConnected)?;

        let item = if to_us == 0 {
            transport.next().await
        } else {
            match time::timeout(Duration::from_micros(to_us), transport.next()).await {
                Ok(item) => item,
                Err(_) => return Ok(None),
            }
        };

        match item {
            Some(Ok(msg)) => {
                self.colon_trail = msg.has_trailing();
                Ok(Some(msg))
            }
            Some(Err(e)) => {
                warn!("read failed: {}", e);
                self.reset();
                Err(e.into())
            }
            None => {
                warn!("read: EOF");
                self.reset();
                self.eof = true;
                Err(Error::Eof)
            }
        }
    }

    /// Writes one line; the codec appends `\r\n` iff missing. A failure
    /// resets the connection.
    pub(crate) async fn write_line(&mut self, line: &str) -> Result<()> {
        let transport = self.transport.as_mut().ok_or(Error::NotConnected)?;
        match transport.send(line.to_owned()).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("failed to write '{}'", line.trim_end());
                self.reset();
                self.eof = false;
                Err(e.into())
            }
        }
    }
}

/// Microseconds left until `deadline`, `Ok(0)` for "no deadline", or
/// `Err(Timeout)` when it has passed.
pub(crate) fn remaining_us(deadline: Option<Instant>) -> Result<u64> {
    match deadline {
        None => Ok(0),
        Some(d) => {
            let now = Instant::now();
            if now >= d {
                Err(Error::Timeout)
            } else {
                // A budget that rounds down to zero still means "almost
                // out of time", not "no timeout".
                Ok(((d - now).as_micros() as u64).max(1))
            }
        }
    }
}

async fn tls_handshake(domain: &str, stream: TcpStream) -> Result<TlsStream<TcpStream>> {
    let bare = domain.trim_start_matches('[').trim_end_matches(']');
    let connector = native_tls::TlsConnector::builder().build()?;
    let connector = tokio_native_tls::TlsConnector::from(connector);
    let tls = connector
        .connect(bare, stream)
        .await
        .map_err(|e| Error::Tls(e.to_string()))?;
    Ok(tls)
}

/// Resolves `host:port` and walks the candidate list until one address
/// connects. Each candidate gets `min(soft, hard-remaining)`; when both
/// budgets are set and the soft budget cannot cover all candidates
/// within the hard one, it is raised to `hard / count`.
async fn connect_sock(
    host: &str,
    port: u16,
    local: Option<(String, u16)>,
    mut soft_us: u64,
    hard_us: u64,
    deadline: Option<Instant>,
) -> Result<TcpStream> {
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    let addrs: Vec<SocketAddr> = net::lookup_host((bare, port))
        .await
        .map_err(|e| {
            warn!("failed to resolve {}: {}", host, e);
            Error::Resolve {
                host: host.to_owned(),
            }
        })?
        .collect();
    if addrs.is_empty() {
        return Err(Error::Resolve {
            host: host.to_owned(),
        });
    }

    let count = addrs.len() as u64;
    if soft_us > 0 && hard_us > 0 && soft_us.saturating_mul(count) < hard_us {
        soft_us = hard_us / count;
    }

    for addr in addrs {
        let rem_us = remaining_us(deadline)?;
        let per_us = match (soft_us, rem_us) {
            (0, rem) => rem,
            (soft, 0) => soft,
            (soft, rem) => soft.min(rem),
        };

        debug!("trying {} (budget: {}us)", addr, per_us);
        match try_addr(addr, local.as_ref(), per_us).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("candidate {} failed: {}", addr, e);
            }
        }
    }

    Err(Error::Connect {
        host: host.to_owned(),
        port,
    })
}

async fn try_addr(
    addr: SocketAddr,
    local: Option<&(String, u16)>,
    to_us: u64,
) -> Result<TcpStream> {
    let socket = if addr.is_ipv6() {
        TcpSocket::new_v6()?
    } else {
        TcpSocket::new_v4()?
    };

    if let Some((lhost, lport)) = local {
        let laddr = resolve_local(lhost, *lport, addr.is_ipv6()).await?;
        socket.bind(laddr)?;
    }

    let connect = socket.connect(addr);
    let stream = if to_us == 0 {
        connect.await?
    } else {
        time::timeout(Duration::from_micros(to_us), connect)
            .await
            .map_err(|_| Error::Timeout)??
    };
    Ok(stream)
}

/// Finds a same-family local address for binding.
async fn resolve_local(host: &str, port: u16, want_v6: bool) -> Result<SocketAddr> {
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    net::lookup_host((bare, port))
        .await
        .map_err(|_| Error::Resolve {
            host: host.to_owned(),
        })?
        .find(|a| a.is_ipv6() == want_v6)
        .ok_or(Error::Resolve {
            host: host.to_owned(),
        })
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn read_through_mock() {
        let mut conn = Connection::new();
        let stream = MockStream::new(b":srv 001 me :hello\r\nPING :tok\r\n");
        conn.attach_mock(stream, "UTF-8").unwrap();
        assert!(conn.online());

        let msg = conn.read(0).await.unwrap().unwrap();
        assert_eq!(msg.command(), "001");
        assert!(conn.colon_trail());

        let msg = conn.read(0).await.unwrap().unwrap();
        assert_eq!(msg.command(), "PING");

        // Script exhausted: EOF resets the connection.
        let err = conn.read(0).await.unwrap_err();
        assert!(matches!(err, Error::Eof));
        assert!(!conn.online());
        assert!(conn.eof());
    }

    #[tokio::test]
    async fn write_appends_crlf() {
        let mut conn = Connection::new();
        conn.attach_mock(MockStream::empty(), "UTF-8").unwrap();
        conn.write_line("NICK bob").await.unwrap();
        conn.write_line("USER b 0 * :Bob\r\n").await.unwrap();
        assert!(conn.online());
    }

    #[tokio::test]
    async fn double_connect_rejected() {
        let mut conn = Connection::new();
        conn.attach_mock(MockStream::empty(), "UTF-8").unwrap();
        let err = conn.attach_mock(MockStream::empty(), "UTF-8").unwrap_err();
        assert!(matches!(err, Error::AlreadyConnected));
    }

    #[test]
    fn remaining_budget() {
        assert_eq!(remaining_us(None).unwrap(), 0);
        let soon = Instant::now() + Duration::from_secs(5);
        let rem = remaining_us(Some(soon)).unwrap();
        assert!(rem > 0 && rem <= 5_000_000);
        let past = Instant::now() - Duration::from_millis(1);
        assert!(matches!(remaining_us(Some(past)), Err(Error::Timeout)));
    }
}
