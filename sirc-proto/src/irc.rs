//! Implementation of the IRC codec for Tokio.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error;
use crate::line::LineCodec;
use crate::message::Message;

/// An IRC codec built around an inner line codec.
pub struct IrcCodec {
    inner: LineCodec,
}

impl IrcCodec {
    /// Creates a new instance of IrcCodec wrapping a LineCodec with the
    /// specified encoding.
    pub fn new(label: &str) -> error::Result<IrcCodec> {
        LineCodec::new(label).map(|codec| IrcCodec { inner: codec })
    }

    /// Creates a new instance of IrcCodec with an explicit maximum line
    /// length.
    pub fn with_max_length(label: &str, max_length: usize) -> error::Result<IrcCodec> {
        LineCodec::with_max_length(label, max_length).map(|codec| IrcCodec { inner: codec })
    }
}

impl Decoder for IrcCodec {
    type Item = Message;
    type Error = error::ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> error::Result<Option<Message>> {
        self.inner.decode(src).and_then(|res| {
            res.map_or(Ok(None), |line| {
                line.parse::<Message>().map(Some)
            })
        })
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> error::Result<Option<Message>> {
        self.inner.decode_eof(src).and_then(|res| {
            res.map_or(Ok(None), |line| {
                line.parse::<Message>().map(Some)
            })
        })
    }
}

/// Outbound frames are raw lines; a [`Message`] goes out through
/// [`Message::to_wire`].
impl Encoder<String> for IrcCodec {
    type Error = error::ProtocolError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> error::Result<()> {
        self.inner.encode(line, dst)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decodes_messages() {
        let mut c = IrcCodec::new("UTF-8").unwrap();
        let mut buf = BytesMut::from(&b":srv 001 me :hi\r\nPING :x\r\n"[..]);
        let m = c.decode(&mut buf).unwrap().unwrap();
        assert_eq!(m.command(), "001");
        let m = c.decode(&mut buf).unwrap().unwrap();
        assert_eq!(m.command(), "PING");
        assert_eq!(m.param(0), Some("x"));
    }

    #[test]
    fn encodes_lines_and_messages() {
        let mut c = IrcCodec::new("UTF-8").unwrap();
        let mut buf = BytesMut::new();
        c.encode("NICK bob".to_string(), &mut buf).unwrap();
        let m = Message::new(None, "JOIN", &["#chan"]).unwrap();
        c.encode(m.to_wire(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"NICK bob\r\nJOIN #chan\r\n" as &[u8]);
    }
}
