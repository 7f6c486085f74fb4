//! State advertised by the server through 005 ISUPPORT.

use std::fmt;

use crate::casemap::CaseMapping;
use crate::namemap::NameMap;

/// Channel-mode argument classes from `CHANMODES=a,b,c,d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChanModeClass {
    /// List modes; always carry an argument.
    A,
    /// Always carry an argument.
    B,
    /// Carry an argument only when being set.
    C,
    /// Never carry an argument.
    D,
}

/// A malformed ISUPPORT token (currently only `PREFIX` can be malformed
/// enough to matter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidIsupport {
    token: String,
}

impl fmt::Display for InvalidIsupport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "malformed ISUPPORT token: {}", self.token)
    }
}

impl std::error::Error for InvalidIsupport {}

/// The 005-derived tables: casemapping, channel types, channel-mode
/// classes, mode prefixes, and a map of every KEY\[=VAL\] seen.
///
/// Before any 005 arrives this carries the RFC 1459 baseline.
#[derive(Debug, Clone)]
pub struct Isupport {
    /// The negotiated casemapping.
    pub casemapping: CaseMapping,
    chantypes: String,
    chanmodes: [String; 4],
    prefix_modes: String,
    prefix_symbols: String,
    attrs: NameMap<String>,
}

impl Default for Isupport {
    fn default() -> Isupport {
        Isupport {
            casemapping: CaseMapping::Rfc1459,
            chantypes: "#&".to_owned(),
            chanmodes: [
                "b".to_owned(),
                "k".to_owned(),
                "l".to_owned(),
                "psitnm".to_owned(),
            ],
            prefix_modes: "ov".to_owned(),
            prefix_symbols: "@+".to_owned(),
            // Attribute names compare ASCII-insensitively regardless of
            // the server casemapping.
            attrs: NameMap::new(CaseMapping::Ascii),
        }
    }
}

impl Isupport {
    pub fn new() -> Isupport {
        Isupport::default()
    }

    /// Applies one 005 token (`KEY` or `KEY=VAL`). Every token lands in
    /// the attribute map; the specially-interpreted keys additionally
    /// update their typed fields. Returns whether this token was a
    /// `CASEMAPPING` (the caller arms tracking off the first one).
    pub fn apply_token(&mut self, token: &str) -> Result<bool, InvalidIsupport> {
        let (key, val) = match token.find('=') {
            Some(eq) => (&token[..eq], &token[eq + 1..]),
            None => (token, ""),
        };
        if key.is_empty() {
            return Ok(false);
        }
        self.attrs.insert(key, val.to_owned());

        if key.eq_ignore_ascii_case("CASEMAPPING") {
            // Unknown values fall back to rfc1459.
            self.casemapping = val.parse().unwrap_or(CaseMapping::Rfc1459);
            return Ok(true);
        } else if key.eq_ignore_ascii_case("PREFIX") {
            self.set_prefix(val)
                .map_err(|_| InvalidIsupport {
                    token: token.to_owned(),
                })?;
        } else if key.eq_ignore_ascii_case("CHANMODES") {
            self.set_chanmodes(val);
        } else if key.eq_ignore_ascii_case("CHANTYPES") {
            self.chantypes = val.to_owned();
        }
        Ok(false)
    }

    /// `PREFIX=(modes)symbols`, both halves nonempty and the same length.
    fn set_prefix(&mut self, val: &str) -> Result<(), ()> {
        let rest = val.strip_prefix('(').ok_or(())?;
        let close = rest.find(')').ok_or(())?;
        let modes = &rest[..close];
        let symbols = &rest[close + 1..];
        if modes.is_empty() || modes.len() != symbols.len() {
            return Err(());
        }
        self.prefix_modes = modes.to_owned();
        self.prefix_symbols = symbols.to_owned();
        Ok(())
    }

    /// `CHANMODES=a,b,c,d`; missing classes are left empty.
    fn set_chanmodes(&mut self, val: &str) {
        for m in self.chanmodes.iter_mut() {
            m.clear();
        }
        for (n, class) in val.split(',').take(4).enumerate() {
            self.chanmodes[n] = class.to_owned();
        }
    }

    /// The channel-type characters (`CHANTYPES`).
    pub fn chantypes(&self) -> &str {
        &self.chantypes
    }

    /// The mode letters of one `CHANMODES` class.
    pub fn chanmodes(&self, class: ChanModeClass) -> &str {
        match class {
            ChanModeClass::A => &self.chanmodes[0],
            ChanModeClass::B => &self.chanmodes[1],
            ChanModeClass::C => &self.chanmodes[2],
            ChanModeClass::D => &self.chanmodes[3],
        }
    }

    /// The `PREFIX` mode letters, in descending order of power.
    pub fn prefix_modes(&self) -> &str {
        &self.prefix_modes
    }

    /// The `PREFIX` symbols, parallel to [`Isupport::prefix_modes`].
    pub fn prefix_symbols(&self) -> &str {
        &self.prefix_symbols
    }

    /// A raw attribute value. Flag-style keys map to the empty string.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(|s| s.as_str())
    }

    /// Whether `name` starts with one of the channel-type characters.
    pub fn is_channel(&self, name: &str) -> bool {
        name.chars()
            .next()
            .map(|c| self.chantypes.contains(c))
            .unwrap_or(false)
    }

    /// Classifies a channel-mode letter, or `None` for unknown letters.
    pub fn classify_chanmode(&self, mode: char) -> Option<ChanModeClass> {
        use ChanModeClass::*;
        for (n, class) in [A, B, C, D].into_iter().enumerate() {
            if self.chanmodes[n].contains(mode) {
                return Some(class);
            }
        }
        None
    }

    /// Whether `mode` is one of the member-prefix mode letters (`o`, `v`,
    /// ...).
    pub fn is_prefix_mode(&self, mode: char) -> bool {
        self.prefix_modes.contains(mode)
    }

    /// Whether `sym` is one of the member-prefix symbols (`@`, `+`, ...).
    pub fn is_prefix_symbol(&self, sym: char) -> bool {
        self.prefix_symbols.contains(sym)
    }

    /// The prefix symbol for a prefix-mode letter.
    pub fn mode_to_symbol(&self, mode: char) -> Option<char> {
        let pos = self.prefix_modes.find(mode)?;
        self.prefix_symbols.chars().nth(pos)
    }

    /// The power of a prefix symbol: 0 is the strongest. `None` for
    /// non-prefix characters.
    pub fn prefix_power(&self, sym: char) -> Option<usize> {
        self.prefix_symbols.find(sym)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let i = Isupport::new();
        assert_eq!(i.casemapping, CaseMapping::Rfc1459);
        assert_eq!(i.chantypes(), "#&");
        assert_eq!(i.chanmodes(ChanModeClass::A), "b");
        assert_eq!(i.chanmodes(ChanModeClass::D), "psitnm");
        assert_eq!(i.prefix_modes(), "ov");
        assert_eq!(i.prefix_symbols(), "@+");
    }

    #[test]
    fn casemapping_token() {
        let mut i = Isupport::new();
        assert_eq!(i.apply_token("CASEMAPPING=ascii"), Ok(true));
        assert_eq!(i.casemapping, CaseMapping::Ascii);
        assert_eq!(i.apply_token("CASEMAPPING=bogus"), Ok(true));
        assert_eq!(i.casemapping, CaseMapping::Rfc1459);
    }

    #[test]
    fn prefix_token() {
        let mut i = Isupport::new();
        i.apply_token("PREFIX=(qaohv)~&@%+").unwrap();
        assert_eq!(i.prefix_modes(), "qaohv");
        assert_eq!(i.prefix_symbols(), "~&@%+");
        assert_eq!(i.mode_to_symbol('h'), Some('%'));
        assert_eq!(i.prefix_power('~'), Some(0));
        assert_eq!(i.prefix_power('+'), Some(4));
        assert!(i.is_prefix_symbol('&'));
        assert!(!i.is_prefix_symbol('o'));

        assert!(i.apply_token("PREFIX=(ov)@").is_err());
        assert!(i.apply_token("PREFIX=ov@+").is_err());
        assert!(i.apply_token("PREFIX=()").is_err());
    }

    #[test]
    fn chanmodes_token() {
        let mut i = Isupport::new();
        i.apply_token("CHANMODES=eIbq,k,flj,CFLMPQcgimnprstz").unwrap();
        assert_eq!(i.chanmodes(ChanModeClass::A), "eIbq");
        assert_eq!(i.chanmodes(ChanModeClass::B), "k");
        assert_eq!(i.chanmodes(ChanModeClass::C), "flj");
        assert_eq!(i.classify_chanmode('q'), Some(ChanModeClass::A));
        assert_eq!(i.classify_chanmode('k'), Some(ChanModeClass::B));
        assert_eq!(i.classify_chanmode('j'), Some(ChanModeClass::C));
        assert_eq!(i.classify_chanmode('t'), Some(ChanModeClass::D));
        assert_eq!(i.classify_chanmode('X'), None);
    }

    #[test]
    fn chantypes_and_is_channel() {
        let mut i = Isupport::new();
        i.apply_token("CHANTYPES=#").unwrap();
        assert!(i.is_channel("#rust"));
        assert!(!i.is_channel("&local"));
        assert!(!i.is_channel("bob"));
        assert!(!i.is_channel(""));
    }

    #[test]
    fn attrs_keep_everything() {
        let mut i = Isupport::new();
        i.apply_token("NETWORK=ExampleNet").unwrap();
        i.apply_token("WHOX").unwrap();
        i.apply_token("CHANTYPES=#").unwrap();
        assert_eq!(i.attr("network"), Some("ExampleNet"));
        assert_eq!(i.attr("whox"), Some(""));
        assert_eq!(i.attr("CHANTYPES"), Some("#"));
        assert_eq!(i.attr("MONITOR"), None);
    }
}
