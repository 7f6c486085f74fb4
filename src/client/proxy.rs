//! Proxy handshakes: HTTP CONNECT, SOCKS4 and SOCKS5.
//!
//! Each handshake is a short request/response exchange performed on the
//! already-connected stream before any IRC bytes flow. The caller is
//! expected to wrap the whole exchange in its remaining connect budget.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Which kind of proxy to speak through.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProxyType {
    /// HTTP CONNECT.
    Http = 0,
    /// SOCKS4 (IPv4 destinations only).
    Socks4 = 1,
    /// SOCKS5.
    Socks5 = 2,
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ProxyType::Http => "HTTP",
            ProxyType::Socks4 => "SOCKS4",
            ProxyType::Socks5 => "SOCKS5",
        })
    }
}

impl FromStr for ProxyType {
    type Err = Error;

    fn from_str(s: &str) -> Result<ProxyType> {
        if s.eq_ignore_ascii_case("http") {
            Ok(ProxyType::Http)
        } else if s.eq_ignore_ascii_case("socks4") {
            Ok(ProxyType::Socks4)
        } else if s.eq_ignore_ascii_case("socks5") {
            Ok(ProxyType::Socks5)
        } else {
            Err(Error::Proxy(format!("unknown proxy type '{}'", s)))
        }
    }
}

/// A proxy descriptor: where the proxy is and how to talk to it.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Proxy {
    /// The proxy protocol.
    pub kind: ProxyType,
    /// The proxy host.
    pub host: String,
    /// The proxy port.
    pub port: u16,
}

/// Parses the `TYPE:HOST[:PORT]` proxy spec syntax, e.g.
/// `SOCKS5:127.0.0.1:1080`.
impl FromStr for Proxy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Proxy> {
        let (kind, rest) = s
            .split_once(':')
            .ok_or_else(|| Error::Proxy(format!("malformed proxy spec '{}'", s)))?;
        let kind: ProxyType = kind.parse()?;
        let (host, port, _ssl) = crate::util::parse_hostspec(rest);
        if host.is_empty() || port == 0 {
            return Err(Error::Proxy(format!(
                "proxy spec '{}' needs a host and a port",
                s
            )));
        }
        Ok(Proxy { kind, host, port })
    }
}

/// Runs the handshake for `kind` on `stream`, asking the proxy to patch
/// us through to `host:port`.
pub(crate) async fn handshake<S>(
    stream: &mut S,
    kind: ProxyType,
    host: &str,
    port: u16,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match kind {
        ProxyType::Http => http_connect(stream, host, port).await,
        ProxyType::Socks4 => socks4(stream, host, port).await,
        ProxyType::Socks5 => socks5(stream, host, port).await,
    }
}

/// Reads exactly `buf.len()` bytes, turning a premature EOF into a proxy
/// failure.
async fn read_full<S>(stream: &mut S, buf: &mut [u8]) -> Result<()>
where
    S: AsyncRead + Unpin,
{
    match stream.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(Error::Proxy("unexpected EOF in handshake".to_owned()))
        }
        Err(e) => Err(e.into()),
    }
}

async fn http_connect<S>(stream: &mut S, host: &str, port: u16) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let req = format!(
        "CONNECT {host}:{port} HTTP/1.0\r\nHost: {host}:{port}\r\n\r\n",
        host = host,
        port = port
    );
    stream.write_all(req.as_bytes()).await?;

    // Read one byte at a time until the response headers end.
    let mut buf = Vec::with_capacity(256);
    while !buf.ends_with(b"\r\n\r\n") {
        if buf.len() >= 256 {
            return Err(Error::Proxy("oversized HTTP CONNECT response".to_owned()));
        }
        let mut byte = [0u8; 1];
        read_full(stream, &mut byte).await?;
        buf.push(byte[0]);
    }

    let head = String::from_utf8_lossy(&buf);
    let status = head
        .split(' ')
        .nth(1)
        .ok_or_else(|| Error::Proxy(format!("malformed HTTP CONNECT response: {}", head)))?;

    debug!("http response status: '{}' (want '200')", status);
    if status == "200" {
        Ok(())
    } else {
        Err(Error::Proxy(format!("HTTP CONNECT refused: {}", status)))
    }
}

/// A short throwaway alphabetic ident for the SOCKS4 userid field.
fn socks4_ident() -> String {
    let mut x = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0)
        | 1;
    (0..5)
        .map(|_| {
            x = x.wrapping_mul(1103515245).wrapping_add(12345);
            (b'a' + ((x >> 16) % 26) as u8) as char
        })
        .collect()
}

async fn socks4<S>(stream: &mut S, host: &str, port: u16) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // SOCKS4 knows neither names nor IPv6.
    let ip: Ipv4Addr = host
        .parse()
        .map_err(|_| Error::Proxy(format!("SOCKS4 needs an IPv4 destination, got '{}'", host)))?;

    let mut req = vec![0x04, 0x01];
    req.extend_from_slice(&port.to_be_bytes());
    req.extend_from_slice(&ip.octets());
    req.extend_from_slice(socks4_ident().as_bytes());
    req.push(0);
    stream.write_all(&req).await?;

    let mut resp = [0u8; 8];
    read_full(stream, &mut resp).await?;
    debug!(
        "socks4 response: {:#04x} {:#04x} (want 0x00 0x5a)",
        resp[0], resp[1]
    );
    if resp[0] == 0x00 && resp[1] == 0x5a {
        Ok(())
    } else {
        Err(Error::Proxy(format!(
            "SOCKS4 refused request ({:#04x} {:#04x})",
            resp[0], resp[1]
        )))
    }
}

async fn socks5<S>(stream: &mut S, host: &str, port: u16) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Method negotiation: exactly one method, no authentication.
    stream.write_all(&[0x05, 0x01, 0x00]).await?;
    let mut resp = [0u8; 2];
    read_full(stream, &mut resp).await?;
    if resp[0] != 0x05 {
        return Err(Error::Proxy(format!(
            "not a SOCKS5 proxy ({:#04x} {:#04x})",
            resp[0], resp[1]
        )));
    }
    if resp[1] != 0x00 {
        return Err(Error::Proxy(format!(
            "SOCKS5 refused no-auth ({:#04x})",
            resp[1]
        )));
    }

    let bare = host.trim_start_matches('[').trim_end_matches(']');
    let mut req = vec![0x05, 0x01, 0x00];
    if let Ok(v4) = bare.parse::<Ipv4Addr>() {
        req.push(0x01);
        req.extend_from_slice(&v4.octets());
    } else if let Ok(v6) = bare.parse::<Ipv6Addr>() {
        req.push(0x04);
        req.extend_from_slice(&v6.octets());
    } else {
        if bare.len() > 255 {
            return Err(Error::Proxy(format!("hostname too long: '{}'", bare)));
        }
        req.push(0x03);
        req.push(bare.len() as u8);
        req.extend_from_slice(bare.as_bytes());
    }
    req.extend_from_slice(&port.to_be_bytes());
    stream.write_all(&req).await?;

    let mut head = [0u8; 4];
    read_full(stream, &mut head).await?;
    if head[0] != 0x05 || head[1] != 0x00 {
        return Err(Error::Proxy(format!(
            "SOCKS5 refused connect ({:#04x} {:#04x})",
            head[0], head[1]
        )));
    }

    // The bound address is read to keep the stream in sync, then
    // discarded.
    let addr_len = match head[3] {
        0x01 => 4,
        0x04 => 16,
        0x03 => {
            let mut len = [0u8; 1];
            read_full(stream, &mut len).await?;
            len[0] as usize
        }
        other => {
            return Err(Error::Proxy(format!(
                "SOCKS5 reply with illegal address type {:#04x}",
                other
            )))
        }
    };
    let mut bound = vec![0u8; addr_len + 2];
    read_full(stream, &mut bound).await?;

    debug!("socks5 handshake complete");
    Ok(())
}
