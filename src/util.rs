//! Small caller-facing helpers: endpoint spec parsing, the default nick
//! mutator, and the SASL PLAIN payload builder.

pub use crate::client::v3::sasl_plain_blob;

/// Parses the `HOST[:PORT][/ssl]` endpoint syntax. `HOST` may be a DNS
/// name, an IPv4 literal, or a bracketed IPv6 literal (returned without
/// its brackets). A missing port comes back as 0.
///
/// # Examples
///
/// ```
/// use sirc::util::parse_hostspec;
///
/// assert_eq!(
///     parse_hostspec("irc.example.org:6697/ssl"),
///     ("irc.example.org".to_string(), 6697, true)
/// );
/// assert_eq!(parse_hostspec("[::1]:6667"), ("::1".to_string(), 6667, false));
/// ```
pub fn parse_hostspec(spec: &str) -> (String, u16, bool) {
    let mut s = spec;
    let mut ssl = false;
    if let Some(stripped) = s.strip_suffix("/ssl").or_else(|| s.strip_suffix("/SSL")) {
        ssl = true;
        s = stripped;
    }

    if let Some(rest) = s.strip_prefix('[') {
        if let Some(close) = rest.find(']') {
            let host = &rest[..close];
            let port = rest[close + 1..]
                .strip_prefix(':')
                .and_then(|p| p.parse().ok())
                .unwrap_or(0);
            return (host.to_owned(), port, ssl);
        }
    }

    match s.split_once(':') {
        Some((host, port)) => (host.to_owned(), port.parse().unwrap_or(0), ssl),
        None => (s.to_owned(), 0, ssl),
    }
}

/// The default nick mutator for 432/433/436/437: append `_` while the
/// nick is short, then bump a trailing counter. Always proposes a nick
/// different from the input; returns `None` only for an empty input.
pub fn mutate_nick(nick: &str) -> Option<String> {
    if nick.is_empty() {
        return None;
    }
    if nick.len() < 9 {
        return Some(format!("{}_", nick));
    }

    let digits_at = nick.len()
        - nick
            .bytes()
            .rev()
            .take_while(|b| b.is_ascii_digit())
            .count();
    let (stem, digits) = nick.split_at(digits_at);
    if digits.is_empty() {
        let mut next = nick[..nick.len() - 1].to_owned();
        next.push('0');
        return Some(next);
    }

    let n: u64 = digits.parse().ok()?;
    Some(format!("{}{}", stem, n + 1))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hostspec_forms() {
        assert_eq!(
            parse_hostspec("irc.example.org"),
            ("irc.example.org".to_string(), 0, false)
        );
        assert_eq!(
            parse_hostspec("irc.example.org:6667"),
            ("irc.example.org".to_string(), 6667, false)
        );
        assert_eq!(
            parse_hostspec("irc.example.org/SSL"),
            ("irc.example.org".to_string(), 0, true)
        );
        assert_eq!(
            parse_hostspec("10.0.0.1:7000/ssl"),
            ("10.0.0.1".to_string(), 7000, true)
        );
        assert_eq!(
            parse_hostspec("[2001:db8::1]:6697/ssl"),
            ("2001:db8::1".to_string(), 6697, true)
        );
        assert_eq!(
            parse_hostspec("[2001:db8::1]"),
            ("2001:db8::1".to_string(), 0, false)
        );
    }

    #[test]
    fn nick_mutation_walk() {
        assert_eq!(mutate_nick("bob").as_deref(), Some("bob_"));
        assert_eq!(mutate_nick("bob_").as_deref(), Some("bob__"));
        assert_eq!(mutate_nick("verylong99").as_deref(), Some("verylong100"));
        assert_eq!(mutate_nick("verylongnick").as_deref(), Some("verylongnic0"));
        assert_eq!(mutate_nick(""), None);
        // Never report success without changing the nick.
        for nick in ["a", "abcdefgh", "abcdefghi", "n12345678"] {
            assert_ne!(mutate_nick(nick).as_deref(), Some(nick));
        }
    }
}
