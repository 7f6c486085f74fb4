//! The per-command message-handler registry and dispatch.
//!
//! Handlers fire in the order user-pre, built-in (registration order),
//! user-post, and each returns an [`Outcome`]. A terminal failure stops
//! dispatch; informational outcomes drive the logon state machine.

use sirc_proto::Message;

use super::Core;

/// Terminal handler failures. Each maps onto a library error and aborts
/// the containing `connect` or `read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fail {
    /// All nick variants exhausted (432/433/436/437 walk).
    OutOfNicks,
    /// Credentials rejected (464, or must-have SASL failure).
    Auth,
    /// The message violated the protocol badly enough to stop.
    Proto,
    /// A handler-level I/O problem.
    Io,
    /// Capability negotiation failed.
    Cap,
    /// The TLS layer cannot be brought up.
    Tls,
}

/// What a handler (or a whole dispatch) concluded. At most one terminal
/// outcome survives; informational outcomes never combine with a
/// failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing of note.
    None,
    /// More CAP LS lines are coming; hold the CAP REQ transition.
    MoreCaps,
    /// The server said 670: upgrade the transport to TLS now.
    StartTls,
    /// STARTTLS failed non-fatally (691 without must-have); the paused
    /// flow resumes in plaintext.
    StarttlsFailed,
    /// SASL finished.
    SaslOver,
    /// The logon conversation is complete (004 or 383).
    LogonOver,
    /// Dispatch cannot proceed.
    Failed(Fail),
}

impl Outcome {
    fn rank(self) -> u8 {
        match self {
            Outcome::None => 0,
            Outcome::MoreCaps => 1,
            Outcome::StarttlsFailed => 2,
            Outcome::StartTls => 3,
            Outcome::SaslOver => 4,
            Outcome::LogonOver => 5,
            Outcome::Failed(_) => 6,
        }
    }

    /// Combines the outcomes of several handlers for one message: a
    /// failure dominates, otherwise the most significant outcome wins.
    pub fn merge(self, other: Outcome) -> Outcome {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }

    /// Whether this outcome aborts the containing operation.
    pub fn is_fatal(self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

/// Who installed a handler. Built-in handlers are bulk-unregistered by
/// origin on every connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Protocol essentials (logon, PING, nick management).
    Irc,
    /// The IRCv3 subset (CAP, SASL, STARTTLS).
    V3,
    /// Channel/user tracking.
    Track,
    /// Installed by the library user.
    User,
}

/// A message handler. `logon` is true while the logon conversation is
/// still running.
pub type Handler = Box<dyn FnMut(&mut Core, &Message, bool) -> Outcome + Send>;

struct Registration {
    cmd: String,
    origin: Origin,
    handler: Handler,
}

/// The three parallel handler tables.
#[derive(Default)]
pub(crate) struct Dispatcher {
    user_pre: Vec<Registration>,
    builtin: Vec<Registration>,
    user_post: Vec<Registration>,
}

impl Dispatcher {
    pub(crate) fn new() -> Dispatcher {
        Dispatcher::default()
    }

    /// Installs a built-in handler for `cmd` (uppercased).
    pub(crate) fn register_builtin(&mut self, cmd: &str, origin: Origin, handler: Handler) {
        self.builtin.push(Registration {
            cmd: cmd.to_ascii_uppercase(),
            origin,
            handler,
        });
    }

    /// Installs a user handler that runs before the built-ins.
    pub(crate) fn register_pre(&mut self, cmd: &str, handler: Handler) {
        self.user_pre.push(Registration {
            cmd: cmd.to_ascii_uppercase(),
            origin: Origin::User,
            handler,
        });
    }

    /// Installs a user handler that runs after the built-ins.
    pub(crate) fn register_post(&mut self, cmd: &str, handler: Handler) {
        self.user_post.push(Registration {
            cmd: cmd.to_ascii_uppercase(),
            origin: Origin::User,
            handler,
        });
    }

    /// Removes the built-in handlers of one origin.
    pub(crate) fn unregister_origin(&mut self, origin: Origin) {
        self.builtin.retain(|r| r.origin != origin);
    }

    /// Removes every user handler (pre and post) for `cmd`.
    pub(crate) fn unregister_user(&mut self, cmd: &str) {
        let cmd = cmd.to_ascii_uppercase();
        self.user_pre.retain(|r| r.cmd != cmd);
        self.user_post.retain(|r| r.cmd != cmd);
    }

    /// Runs every handler registered for the message's command, in
    /// user-pre, built-in, user-post order, merging their outcomes.
    pub(crate) fn dispatch(&mut self, core: &mut Core, msg: &Message, logon: bool) -> Outcome {
        let cmd = msg.command().to_ascii_uppercase();
        let mut out = Outcome::None;

        let regs = self
            .user_pre
            .iter_mut()
            .chain(self.builtin.iter_mut())
            .chain(self.user_post.iter_mut());

        for reg in regs {
            if reg.cmd != cmd {
                continue;
            }
            log::trace!("dispatching '{}' to {:?} handler", cmd, reg.origin);
            out = out.merge((reg.handler)(core, msg, logon));
            if out.is_fatal() {
                log::warn!("handler for '{}' cannot proceed: {:?}", cmd, out);
                return out;
            }
        }

        out
    }
}
