//! Implementation of the line-delimiting codec for Tokio.

use std::io;

use bytes::{Buf, BytesMut};
use encoding::label::encoding_from_whatwg_label;
use encoding::{DecoderTrap, EncoderTrap, EncodingRef};
use tokio_util::codec::{Decoder, Encoder};

use crate::error;

/// The recommended maximum length of an incoming line, matching a
/// 4096-byte receive buffer.
pub const DEFAULT_MAX_LINE_LEN: usize = 4096;

/// A line-based codec parameterised by an encoding and a maximum line
/// length. Lines are delimited by `\r\n` on the way out; on the way in,
/// any run of `\r`/`\n` bytes terminates a line and empty lines are
/// swallowed.
pub struct LineCodec {
    encoding: EncodingRef,
    max_length: usize,
}

impl LineCodec {
    /// Creates a new instance of LineCodec from the specified encoding.
    pub fn new(label: &str) -> error::Result<LineCodec> {
        LineCodec::with_max_length(label, DEFAULT_MAX_LINE_LEN)
    }

    /// Creates a new instance of LineCodec with an explicit line-length
    /// bound.
    pub fn with_max_length(label: &str, max_length: usize) -> error::Result<LineCodec> {
        encoding_from_whatwg_label(label)
            .map(|encoding| LineCodec {
                encoding,
                max_length,
            })
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Attempted to use unknown codec {}.", label),
                )
                .into()
            })
    }

    /// The name of the in-use encoding.
    pub fn name(&self) -> &str {
        self.encoding.name()
    }

    fn decode_line(&self, line: &[u8]) -> error::Result<String> {
        self.encoding
            .decode(line, DecoderTrap::Replace)
            .map_err(|data| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Failed to decode {} as {}.", data, self.encoding.name()),
                )
                .into()
            })
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = error::ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> error::Result<Option<String>> {
        // Delimiters left over from the previous line are skipped before
        // anything else, so a lone `\r` or `\n` never produces a frame.
        let lead = src
            .iter()
            .take_while(|&&b| b == b'\r' || b == b'\n')
            .count();
        src.advance(lead);

        match src.iter().position(|&b| b == b'\r' || b == b'\n') {
            Some(offset) => {
                let line = src.split_to(offset);
                src.advance(1);
                self.decode_line(&line).map(Some)
            }
            None => {
                if src.len() >= self.max_length {
                    return Err(error::ProtocolError::LineTooLong {
                        max: self.max_length,
                    });
                }
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> error::Result<Option<String>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                // An unterminated final line is still a line.
                if src.is_empty() {
                    Ok(None)
                } else {
                    let line = src.split_to(src.len());
                    self.decode_line(&line).map(Some)
                }
            }
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = error::ProtocolError;

    fn encode(&mut self, msg: String, dst: &mut BytesMut) -> error::Result<()> {
        let data: error::Result<Vec<u8>> = self
            .encoding
            .encode(&msg, EncoderTrap::Replace)
            .map_err(|data| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Failed to encode {} as {}.", data, self.encoding.name()),
                )
                .into()
            });

        dst.extend(&data?);
        if !msg.ends_with("\r\n") {
            dst.extend(b"\r\n");
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn codec() -> LineCodec {
        LineCodec::new("UTF-8").unwrap()
    }

    #[test]
    fn splits_on_crlf() {
        let mut c = codec();
        let mut buf = BytesMut::from(&b"PING :a\r\nPONG :b\r\n"[..]);
        assert_eq!(c.decode(&mut buf).unwrap(), Some("PING :a".to_string()));
        assert_eq!(c.decode(&mut buf).unwrap(), Some("PONG :b".to_string()));
        assert_eq!(c.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn accepts_bare_delimiters() {
        let mut c = codec();
        let mut buf = BytesMut::from(&b"one\ntwo\rthree\r\n"[..]);
        assert_eq!(c.decode(&mut buf).unwrap(), Some("one".to_string()));
        assert_eq!(c.decode(&mut buf).unwrap(), Some("two".to_string()));
        assert_eq!(c.decode(&mut buf).unwrap(), Some("three".to_string()));
    }

    #[test]
    fn swallows_empty_lines() {
        let mut c = codec();
        let mut buf = BytesMut::from(&b"\r\n\r\n\nreal\r\n"[..]);
        assert_eq!(c.decode(&mut buf).unwrap(), Some("real".to_string()));
        assert_eq!(c.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn partial_line_waits_for_more() {
        let mut c = codec();
        let mut buf = BytesMut::from(&b"PRIVMSG #c :hal"[..]);
        assert_eq!(c.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"f\r\n");
        assert_eq!(
            c.decode(&mut buf).unwrap(),
            Some("PRIVMSG #c :half".to_string())
        );
    }

    #[test]
    fn line_one_short_of_max_still_tokenises() {
        let mut c = LineCodec::with_max_length("UTF-8", 16).unwrap();
        let mut buf = BytesMut::from(&[b'a'; 15][..]);
        assert_eq!(c.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"\r\n");
        assert_eq!(c.decode(&mut buf).unwrap(), Some("a".repeat(15)));
    }

    #[test]
    fn line_at_max_without_delimiter_fails() {
        let mut c = LineCodec::with_max_length("UTF-8", 16).unwrap();
        let mut buf = BytesMut::from(&[b'a'; 16][..]);
        assert!(matches!(
            c.decode(&mut buf),
            Err(error::ProtocolError::LineTooLong { max: 16 })
        ));
    }

    #[test]
    fn eof_flushes_unterminated_line() {
        let mut c = codec();
        let mut buf = BytesMut::from(&b"tail"[..]);
        assert_eq!(c.decode_eof(&mut buf).unwrap(), Some("tail".to_string()));
        assert_eq!(c.decode_eof(&mut buf).unwrap(), None);
    }

    #[test]
    fn encode_appends_crlf_once() {
        let mut c = codec();
        let mut buf = BytesMut::new();
        c.encode("NICK bob".to_string(), &mut buf).unwrap();
        c.encode("USER b 0 * :Bob\r\n".to_string(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"NICK bob\r\nUSER b 0 * :Bob\r\n" as &[u8]);
    }
}
