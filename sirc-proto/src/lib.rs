//! # sirc-proto
//!
//! The IRC client protocol distilled: line framing, message tokenising,
//! IRCv3 tags, case mappings and the case-insensitive name map, 005
//! ISUPPORT tables, capability negotiation records, and mode-string
//! parsing.
//!
//! ## Parsing IRC messages
//!
//! ```
//! use sirc_proto::Message;
//!
//! let raw = "@time=2023-01-01T12:00:00Z :nick!user@host PRIVMSG #chan :Hello!";
//! let message: Message = raw.parse().expect("valid IRC message");
//!
//! assert_eq!(message.prefix(), Some("nick!user@host"));
//! assert_eq!(message.command(), "PRIVMSG");
//! assert_eq!(message.params().count(), 2);
//! assert_eq!(message.tags().len(), 1);
//! ```

pub mod caps;
pub mod casemap;
pub mod error;
#[cfg(feature = "tokio")]
pub mod irc;
pub mod isupport;
#[cfg(feature = "tokio")]
pub mod line;
pub mod message;
pub mod mode;
pub mod namemap;
pub mod prefix;
pub mod response;

pub use self::caps::{CapSet, CapUpdate, Capability};
pub use self::casemap::CaseMapping;
#[cfg(feature = "tokio")]
pub use self::irc::IrcCodec;
pub use self::isupport::{ChanModeClass, Isupport};
#[cfg(feature = "tokio")]
pub use self::line::LineCodec;
pub use self::message::{Message, Params, Tags};
pub use self::mode::{parse_mode_changes, ModeChange};
pub use self::namemap::NameMap;
pub use self::prefix::{prefix_host, prefix_nick, prefix_user, Prefix};
