//! The originator field of an IRC line.
//!
//! A prefix is either a server name or a `nick[!user][@host]` ident.
//! The free functions slice the individual parts out of a raw prefix;
//! [`Prefix`] classifies a whole one.

use std::fmt;

/// The nick part of a `nick[!user][@host]` prefix: everything up to the
/// first `!` or `@`. A bare servername comes back whole.
pub fn prefix_nick(pfx: &str) -> &str {
    let end = pfx.find(['!', '@']).unwrap_or(pfx.len());
    &pfx[..end]
}

/// The user part of a `nick!user@host` prefix, or `None` when the prefix
/// carries no `!`.
pub fn prefix_user(pfx: &str) -> Option<&str> {
    let cut = match pfx.find('@') {
        Some(at) => &pfx[..at],
        None => pfx,
    };
    cut.find('!').map(|bang| &cut[bang + 1..])
}

/// The host part of a `nick!user@host` prefix, or `None` when the prefix
/// carries no `@`.
pub fn prefix_host(pfx: &str) -> Option<&str> {
    pfx.find('@').map(|at| &pfx[at + 1..])
}

/// A classified message origin.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Prefix {
    /// The server itself spoke: a bare name containing a dot, with no
    /// user or host parts.
    ServerName(String),
    /// A user spoke: `nick[!user][@host]`.
    Nickname {
        /// The nick.
        nick: String,
        /// The ident, when the prefix carried `!user`.
        user: Option<String>,
        /// The displayed host, when the prefix carried `@host`.
        host: Option<String>,
    },
}

impl Prefix {
    /// Splits and classifies a raw prefix. A bare dotted word is a
    /// server; anything else is a user, however partial.
    pub fn parse(pfx: &str) -> Prefix {
        let nick = prefix_nick(pfx);
        let user = prefix_user(pfx);
        let host = prefix_host(pfx);

        if user.is_none() && host.is_none() && nick.contains('.') {
            return Prefix::ServerName(nick.to_owned());
        }

        Prefix::Nickname {
            nick: nick.to_owned(),
            user: user.map(str::to_owned),
            host: host.map(str::to_owned),
        }
    }

    /// The nick, when a user spoke.
    pub fn nick(&self) -> Option<&str> {
        match self {
            Prefix::ServerName(_) => None,
            Prefix::Nickname { nick, .. } => Some(nick),
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Prefix::ServerName(name) => f.write_str(name),
            Prefix::Nickname { nick, user, host } => {
                f.write_str(nick)?;
                if let Some(user) = user {
                    write!(f, "!{}", user)?;
                }
                if let Some(host) = host {
                    write!(f, "@{}", host)?;
                }
                Ok(())
            }
        }
    }
}
