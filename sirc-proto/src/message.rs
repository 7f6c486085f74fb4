//! A data structure for messages to and from IRC servers.
//!
//! A [`Message`] owns one line (without its CRLF) and records byte offsets
//! for the individual parts, so the parts are handed out as borrowed
//! slices of a single buffer. Tags and parameters have parser-iterators
//! and are never materialised up front.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::error::{MessageParseError, ProtocolError};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
struct Part {
    start: u16,
    end: u16,
}

impl Part {
    fn new(start: usize, end: usize) -> Part {
        Part {
            start: start as u16,
            end: end as u16,
        }
    }

    fn index<'a>(&self, s: &'a str) -> &'a str {
        &s[self.start as usize..self.end as usize]
    }
}

/// The maximum number of bytes in a message this representation can index.
/// The wire protocol is far stricter (the framer bounds lines at its
/// receive-buffer size), so this is never the binding limit in practice.
pub const MAX_BYTES: usize = u16::MAX as usize;

/// A parsed IRC message, containing a buffer with pointers to the
/// individual parts.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Message {
    buf: String,
    tags: Option<Part>,
    prefix: Option<Part>,
    command: Part,
    middle_params: Part,
    trailing_param: Option<Part>,
}

impl Message {
    /// Parses the given line into a message, copying it into an owned
    /// buffer. Trailing `\r`/`\n` bytes are accepted and stripped.
    ///
    /// # Errors
    ///
    /// Fails on an empty line, a line starting with whitespace, a line
    /// with no command after the prefix, or a line longer than
    /// [`MAX_BYTES`].
    ///
    /// # Examples
    ///
    /// ```
    /// use sirc_proto::Message;
    ///
    /// let message = Message::parse("PRIVMSG #rust :Hello Rustaceans!").unwrap();
    /// assert_eq!(message.command(), "PRIVMSG");
    /// ```
    pub fn parse(line: &str) -> Result<Message, MessageParseError> {
        Message::parse_string(line.to_owned())
    }

    /// Takes ownership of the given line and parses it into a message.
    pub fn parse_string(mut line: String) -> Result<Message, MessageParseError> {
        while line.ends_with('\r') || line.ends_with('\n') {
            line.pop();
        }

        if line.is_empty() || line.len() > MAX_BYTES {
            return Err(MessageParseError::EmptyMessage);
        }

        let bytes = line.as_bytes();
        let len = bytes.len();
        let mut i = 0;

        // Tags block: everything between '@' and the next space.
        let tags = if bytes[0] == b'@' {
            let start = 1;
            while i < len && bytes[i] != b' ' {
                i += 1;
            }
            let t = Part::new(start, i);
            while i < len && bytes[i] == b' ' {
                i += 1;
            }
            Some(t)
        } else {
            if bytes[0] == b' ' {
                return Err(MessageParseError::LeadingWhitespace);
            }
            None
        };

        if i >= len {
            return Err(MessageParseError::MissingCommand);
        }

        // Prefix: everything between ':' and the next space.
        let prefix = if bytes[i] == b':' {
            i += 1;
            let start = i;
            while i < len && bytes[i] != b' ' {
                i += 1;
            }
            let p = Part::new(start, i);
            while i < len && bytes[i] == b' ' {
                i += 1;
            }
            Some(p)
        } else {
            None
        };

        // Command: the next run of non-space bytes. Mandatory.
        let start = i;
        while i < len && bytes[i] != b' ' {
            i += 1;
        }
        if start == i {
            return Err(MessageParseError::MissingCommand);
        }
        let command = Part::new(start, i);

        while i < len && bytes[i] == b' ' {
            i += 1;
        }

        // Parameters: space-separated runs until a token introduced by
        // ':' swallows the rest of the line.
        let params_start = i;
        let mut middle_end = i;
        let mut trailing_param = None;
        while i < len {
            if bytes[i] == b':' {
                trailing_param = Some(Part::new(i + 1, len));
                break;
            }
            while i < len && bytes[i] != b' ' {
                i += 1;
            }
            middle_end = i;
            while i < len && bytes[i] == b' ' {
                i += 1;
            }
        }
        let middle_params = Part::new(params_start, middle_end);

        Ok(Message {
            buf: line,
            tags,
            prefix,
            command,
            middle_params,
            trailing_param,
        })
    }

    /// Builds an outbound message from parts. The last parameter becomes a
    /// trailing argument when it needs to be (contains a space, is empty,
    /// or starts with `:`); `Display` then reconstructs the wire form.
    pub fn new(
        prefix: Option<&str>,
        command: &str,
        params: &[&str],
    ) -> Result<Message, MessageParseError> {
        let mut line = String::new();
        if let Some(pfx) = prefix {
            line.push(':');
            line.push_str(pfx);
            line.push(' ');
        }
        line.push_str(command);
        for (n, param) in params.iter().enumerate() {
            line.push(' ');
            if n + 1 == params.len()
                && (param.is_empty() || param.contains(' ') || param.starts_with(':'))
            {
                line.push(':');
            }
            line.push_str(param);
        }
        Message::parse_string(line)
    }

    /// The raw line (without CRLF).
    pub fn as_str(&self) -> &str {
        &self.buf
    }

    /// The raw line with CRLF appended, ready to be sent.
    pub fn to_wire(&self) -> String {
        let mut s = String::with_capacity(self.buf.len() + 2);
        s.push_str(&self.buf);
        s.push_str("\r\n");
        s
    }

    /// A parser-iterator over the message's IRCv3 tags, yielding
    /// `(key, value)` pairs in order. Escape sequences in values are only
    /// decoded when a value is actually produced, and only allocate when
    /// an escape occurs.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::borrow::Cow;
    /// use sirc_proto::Message;
    ///
    /// let m = Message::parse("@aaa=b\\sb;ccc :n!u@h PRIVMSG #c :hi").unwrap();
    /// let mut tags = m.tags();
    /// assert_eq!(tags.next(), Some(("aaa", Some(Cow::Owned("b b".to_string())))));
    /// assert_eq!(tags.next(), Some(("ccc", None)));
    /// assert_eq!(tags.next(), None);
    /// ```
    pub fn tags(&self) -> Tags {
        Tags {
            remaining: self
                .tags
                .as_ref()
                .map(|part| part.index(&self.buf))
                .unwrap_or(""),
        }
    }

    /// Looks up a tag by key (ASCII case-insensitive). Returns
    /// `Some(value)` when the tag is present; the value itself may be
    /// `None` for valueless tags.
    pub fn tag(&self, key: &str) -> Option<Option<Cow<'_, str>>> {
        self.tags()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    /// The message's prefix without its leading colon, if present.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_ref().map(|part| part.index(&self.buf))
    }

    /// The message's command.
    pub fn command(&self) -> &str {
        self.command.index(&self.buf)
    }

    /// A parser-iterator over the message's parameters, borrowing each
    /// parameter slice directly from the message buffer.
    ///
    /// # Examples
    ///
    /// ```
    /// use sirc_proto::Message;
    ///
    /// let m = Message::parse("USER guest 0 * :Ronnie Reagan").unwrap();
    /// let params: Vec<&str> = m.params().collect();
    /// assert_eq!(params, ["guest", "0", "*", "Ronnie Reagan"]);
    /// ```
    pub fn params(&self) -> Params {
        Params {
            remaining: self.middle_params.index(&self.buf),
            trailing: self.trailing_param.map(|part| part.index(&self.buf)),
        }
    }

    /// The `n`th parameter, counting from zero.
    pub fn param(&self, n: usize) -> Option<&str> {
        self.params().nth(n)
    }

    /// The number of parameters.
    pub fn arg_count(&self) -> usize {
        self.params().count()
    }

    /// Whether the final argument was introduced by the `:` trailing
    /// syntax.
    pub fn has_trailing(&self) -> bool {
        self.trailing_param.is_some()
    }
}

impl FromStr for Message {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Message::parse(s).map_err(|cause| ProtocolError::InvalidMessage {
            string: s.to_string(),
            cause,
        })
    }
}

impl AsRef<str> for Message {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.buf)
    }
}

/// A parser-iterator over a message's tags. See [`Message::tags`].
pub struct Tags<'a> {
    remaining: &'a str,
}

impl<'a> Iterator for Tags<'a> {
    type Item = (&'a str, Option<Cow<'a, str>>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() {
            return None;
        }

        let tag = match self.remaining.find(';') {
            Some(i) => {
                let t = &self.remaining[..i];
                self.remaining = &self.remaining[i + 1..];
                t
            }
            None => {
                let t = self.remaining;
                self.remaining = "";
                t
            }
        };

        match tag.find('=') {
            Some(eq) => {
                let key = &tag[..eq];
                let raw = &tag[eq + 1..];
                Some((key, Some(decode_tag_value(raw))))
            }
            None => Some((tag, None)),
        }
    }
}

impl<'a> ExactSizeIterator for Tags<'a> {
    fn len(&self) -> usize {
        if self.remaining.is_empty() {
            0
        } else {
            self.remaining.chars().filter(|&c| c == ';').count() + 1
        }
    }
}

/// Decodes the IRCv3 tag-value escapes: `\s` space, `\:` semicolon, `\r`,
/// `\n`, `\\`, and any other `\X` as plain `X`. Borrows when nothing is
/// escaped.
fn decode_tag_value(raw: &str) -> Cow<'_, str> {
    if !raw.contains('\\') {
        return Cow::Borrowed(raw);
    }

    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(other) => out.push(other),
            // A lone trailing backslash decodes to nothing.
            None => {}
        }
    }
    Cow::Owned(out)
}

/// An iterator over a message's parameters. See [`Message::params`].
pub struct Params<'a> {
    remaining: &'a str,
    trailing: Option<&'a str>,
}

impl<'a> Iterator for Params<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.remaining.is_empty() {
            let end = self.remaining.find(' ').unwrap_or(self.remaining.len());
            let param = &self.remaining[..end];
            self.remaining = self.remaining[end..].trim_start_matches(' ');
            Some(param)
        } else {
            self.trailing.take()
        }
    }
}

/// Reconstructs the wire form of a tokenised message: `:prefix`, command,
/// space-joined arguments, with the last argument re-introduced by `:`
/// when `colon_trail` is set or when it needs the trailing syntax to
/// survive re-tokenisation. CRLF is appended.
pub fn rebuild(
    prefix: Option<&str>,
    command: &str,
    params: &[&str],
    colon_trail: bool,
) -> String {
    let mut out = String::new();
    if let Some(pfx) = prefix {
        out.push(':');
        out.push_str(pfx);
        out.push(' ');
    }
    out.push_str(command);
    for (n, param) in params.iter().enumerate() {
        out.push(' ');
        if n + 1 == params.len()
            && (colon_trail || param.is_empty() || param.contains(' ') || param.starts_with(':'))
        {
            out.push(':');
        }
        out.push_str(param);
    }
    out.push_str("\r\n");
    out
}
