//! The IRC client: connection management, the logon state machine,
//! message dispatch, and the public [`Irc`] object.

use std::collections::VecDeque;
use std::io;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use sirc_proto::{CapSet, CaseMapping, ChanModeClass, Isupport, Message};

use crate::error::{Error, Result};

pub mod conn;
pub mod data;
pub mod dispatch;
mod handlers;
pub mod mock;
pub mod proxy;
pub mod track;
pub(crate) mod v3;

pub mod prelude {
    //! A client-side IRC prelude, re-exporting all the necessary basics.
    pub use crate::client::data::{Config, StarttlsMode};
    pub use crate::client::dispatch::{Fail, Outcome};
    pub use crate::client::proxy::{Proxy, ProxyType};
    pub use crate::client::{Core, Irc};
    pub use crate::error::Error;
    pub use sirc_proto::{CaseMapping, Message, Prefix};
}

use conn::Connection;
use data::{Config, StarttlsMode};
use dispatch::{Dispatcher, Fail, Outcome};
use mock::MockStream;
use track::Tracker;

/// The state a connection accumulates between logon and reset.
pub(crate) struct Session {
    pub(crate) mynick: String,
    pub(crate) myhost: String,
    pub(crate) umodes: String,
    pub(crate) cmodes: String,
    pub(crate) ver: String,
    pub(crate) lasterr: Option<String>,
    pub(crate) banmsg: Option<String>,
    pub(crate) banned: bool,
    pub(crate) restricted: bool,
    pub(crate) service: bool,
    pub(crate) isupport: Isupport,
    /// The 001–004 messages, cloned as they arrive.
    pub(crate) logonconv: [Option<Message>; 4],
    /// The cap list we sent in CAP REQ, for the ACK echo check.
    pub(crate) capreq: Option<String>,
    // Settings snapshotted at connect so that setter calls during a
    // session only affect the next one.
    pub(crate) server_host: String,
    pub(crate) track: bool,
    pub(crate) starttls_first: bool,
    pub(crate) starttls_must_have: bool,
    pub(crate) sasl_mech: Option<String>,
    pub(crate) sasl_blob: Option<String>,
    pub(crate) sasl_must_have: bool,
}

impl Session {
    fn begin(config: &Config) -> Session {
        Session {
            mynick: config.nickname().to_owned(),
            myhost: String::new(),
            umodes: String::new(),
            cmodes: String::new(),
            ver: String::new(),
            lasterr: None,
            banmsg: None,
            banned: false,
            restricted: false,
            service: false,
            isupport: Isupport::new(),
            logonconv: [None, None, None, None],
            capreq: None,
            server_host: config.server().to_owned(),
            track: config.tracking(),
            starttls_first: config.starttls() == StarttlsMode::Immediate,
            starttls_must_have: config.starttls_must_have(),
            sasl_mech: config.sasl_mech().map(str::to_owned),
            sasl_blob: config.sasl_blob().map(str::to_owned),
            sasl_must_have: config.sasl_must_have(),
        }
    }
}

/// What a message handler gets to work with: the session state, the
/// tracker, the capability table, and an outbound queue. Lines queued
/// with [`Core::send`] are flushed to the socket, in order, as soon as
/// dispatch returns to the driving `connect`/`read`/`write` call.
pub struct Core {
    pub(crate) config: Config,
    pub(crate) conn: Connection,
    pub(crate) caps: CapSet,
    pub(crate) state: Session,
    pub(crate) tracker: Option<Tracker>,
    pub(crate) outq: VecDeque<String>,
    pub(crate) cb_conread: Option<Box<dyn FnMut(&Message) -> bool + Send>>,
    pub(crate) cb_mutnick: Box<dyn FnMut(&str) -> Option<String> + Send>,
}

impl Core {
    fn new(config: Config) -> Core {
        let state = Session::begin(&config);
        Core {
            config,
            conn: Connection::new(),
            caps: CapSet::new(),
            state,
            tracker: None,
            outq: VecDeque::new(),
            cb_conread: None,
            cb_mutnick: Box::new(|nick| crate::util::mutate_nick(nick)),
        }
    }

    /// Queues one outbound line (CRLF optional; several CRLF-separated
    /// lines go out as one write).
    pub fn send(&mut self, line: impl Into<String>) {
        self.outq.push_back(line.into());
    }

    /// The nick the server currently knows us by.
    pub fn mynick(&self) -> &str {
        &self.state.mynick
    }

    /// The negotiated casemapping.
    pub fn casemap(&self) -> CaseMapping {
        self.state.isupport.casemapping
    }

    /// The 005-derived tables.
    pub fn isupport(&self) -> &Isupport {
        &self.state.isupport
    }

    /// The tracker, once armed.
    pub fn tracker(&self) -> Option<&Tracker> {
        self.tracker.as_ref()
    }
}

/// An IRC client object: configure it, `connect()`, then `read()` and
/// `write()` until done; `reset()` returns it to the configured state.
///
/// ```no_run
/// use sirc::client::prelude::*;
///
/// # async fn run() -> Result<(), Error> {
/// let mut irc = Irc::new();
/// irc.set_server("irc.example.org", 0);
/// irc.set_nick("mynick");
/// irc.connect().await?;
/// irc.write("JOIN #rust").await?;
/// while let Some(msg) = irc.read(0).await.ok().flatten() {
///     println!("<- {}", msg);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Irc {
    core: Core,
    dispatcher: Dispatcher,
}

impl Default for Irc {
    fn default() -> Irc {
        Irc::new()
    }
}

impl Irc {
    /// Creates an unconfigured client.
    pub fn new() -> Irc {
        Irc::from_config(Config::default())
    }

    /// Creates a client from an existing configuration.
    pub fn from_config(config: Config) -> Irc {
        let mut irc = Irc {
            core: Core::new(config),
            dispatcher: Dispatcher::new(),
        };
        // set_sasl/set_starttls keep these in sync later; seed them for
        // configs built by hand.
        if irc.core.config.sasl_mech().is_some() {
            irc.core.caps.want("sasl", irc.core.config.sasl_must_have());
        }
        if irc.core.config.starttls() == StarttlsMode::Cap {
            irc.core
                .caps
                .want("tls", irc.core.config.starttls_must_have());
        }
        irc
    }

    //
    // Setters. None takes effect before the next `connect`.
    //

    /// Sets the server endpoint. A port of 0 picks 6667/6697 by TLS.
    pub fn set_server(&mut self, host: &str, port: u16) {
        self.core.config.server = Some(host.to_owned());
        self.core.config.port = Some(port);
    }

    /// Sets the server password (PASS). Empty disables.
    pub fn set_pass(&mut self, pass: &str) {
        self.core.config.password = Some(pass.to_owned());
    }

    /// Sets the nickname to log on with.
    pub fn set_nick(&mut self, nick: &str) {
        self.core.config.nickname = Some(nick.to_owned());
    }

    /// Sets the username (USER).
    pub fn set_uname(&mut self, uname: &str) {
        self.core.config.username = Some(uname.to_owned());
    }

    /// Sets the full name (USER trailing argument).
    pub fn set_fname(&mut self, fname: &str) {
        self.core.config.realname = Some(fname.to_owned());
    }

    /// Sets the USER mode flags.
    pub fn set_conflags(&mut self, flags: u8) {
        self.core.config.user_flags = Some(flags);
    }

    /// Routes the connection through a proxy.
    pub fn set_px(&mut self, host: &str, port: u16, kind: proxy::ProxyType) {
        self.core.config.proxy = Some(proxy::Proxy {
            kind,
            host: host.to_owned(),
            port,
        });
    }

    /// Removes the proxy.
    pub fn clear_px(&mut self) {
        self.core.config.proxy = None;
    }

    /// Binds a local address before connecting.
    pub fn set_localaddr(&mut self, host: &str, port: u16) {
        self.core.config.local_host = Some(host.to_owned());
        self.core.config.local_port = Some(port);
    }

    /// Sets the soft (per-candidate) and hard (overall) connect
    /// timeouts, in microseconds. Zero disables a timeout.
    pub fn set_connect_timeout(&mut self, soft_us: u64, hard_us: u64) {
        self.core.config.soft_timeout_us = Some(soft_us);
        self.core.config.hard_timeout_us = Some(hard_us);
    }

    /// Enables TLS from the first byte. Mutually exclusive with
    /// STARTTLS.
    pub fn set_ssl(&mut self, on: bool) -> Result<()> {
        if on && self.core.config.starttls() != StarttlsMode::Off {
            return Err(Error::Tls(
                "cannot enable TLS together with STARTTLS".to_owned(),
            ));
        }
        self.core.config.use_ssl = Some(on);
        Ok(())
    }

    /// Selects the STARTTLS mode; `must_have` makes a failed upgrade
    /// abort the connect. Mutually exclusive with `set_ssl`.
    pub fn set_starttls(&mut self, mode: StarttlsMode, must_have: bool) -> Result<()> {
        if mode != StarttlsMode::Off && self.core.config.use_ssl() {
            return Err(Error::Tls(
                "cannot enable STARTTLS on a TLS connection".to_owned(),
            ));
        }
        self.core.caps.clear("tls");
        if mode == StarttlsMode::Cap {
            self.core.caps.want("tls", must_have);
        }
        self.core.config.starttls = Some(mode);
        self.core.config.starttls_must_have = Some(must_have);
        Ok(())
    }

    /// Configures SASL: the mechanism name and the ready-made
    /// AUTHENTICATE payload (see [`crate::util::sasl_plain_blob`] for
    /// PLAIN).
    pub fn set_sasl(&mut self, mech: &str, blob: &str, must_have: bool) {
        self.core.config.sasl_mech = Some(mech.to_owned());
        self.core.config.sasl_blob = Some(blob.to_owned());
        self.core.config.sasl_must_have = Some(must_have);
        self.core.caps.want("sasl", must_have);
    }

    /// Removes the SASL configuration.
    pub fn clear_sasl(&mut self) {
        self.core.config.sasl_mech = None;
        self.core.config.sasl_blob = None;
        self.core.config.sasl_must_have = None;
        self.core.caps.clear("sasl");
    }

    /// Asks for an IRCv3 capability at the next connect.
    pub fn want_cap(&mut self, name: &str, must_have: bool) {
        self.core.caps.want(name, must_have);
    }

    /// Logs on as a service (SERVICE) instead of a user.
    pub fn set_service_connect(&mut self, on: bool) {
        self.core.config.service = Some(on);
    }

    /// Sets the service distribution mask.
    pub fn set_service_dist(&mut self, dist: &str) {
        self.core.config.service_dist = Some(dist.to_owned());
    }

    /// Sets the service type.
    pub fn set_service_type(&mut self, ty: i64) {
        self.core.config.service_type = Some(ty);
    }

    /// Sets the service info string.
    pub fn set_service_info(&mut self, info: &str) {
        self.core.config.service_info = Some(info.to_owned());
    }

    /// Enables channel/user tracking (armed by the first 005
    /// CASEMAPPING).
    pub fn set_track(&mut self, on: bool) {
        self.core.config.tracking = Some(on);
    }

    /// Dumb mode: no built-in handlers, no logon conversation, just
    /// framing.
    pub fn set_dumb(&mut self, on: bool) {
        self.core.config.dumb = Some(on);
    }

    /// Sets the connection's text encoding (a WHATWG label, e.g.
    /// `UTF-8`).
    pub fn set_encoding(&mut self, label: &str) {
        self.core.config.encoding = Some(label.to_owned());
    }

    //
    // Callbacks and handlers.
    //

    /// Installs a callback invoked for every message received before the
    /// logon completes; returning false aborts the connect.
    pub fn regcb_conread<F>(&mut self, cb: F)
    where
        F: FnMut(&Message) -> bool + Send + 'static,
    {
        self.core.cb_conread = Some(Box::new(cb));
    }

    /// Installs the nick mutator used on 432/433/436/437. Returning
    /// `None`, an empty string, or the unchanged nick gives up with
    /// [`Error::OutOfNicks`].
    pub fn regcb_mutnick<F>(&mut self, cb: F)
    where
        F: FnMut(&str) -> Option<String> + Send + 'static,
    {
        self.core.cb_mutnick = Box::new(cb);
    }

    /// Registers a user handler for `cmd`, invoked before the built-in
    /// handlers.
    pub fn register_pre<F>(&mut self, cmd: &str, handler: F)
    where
        F: FnMut(&mut Core, &Message, bool) -> Outcome + Send + 'static,
    {
        self.dispatcher.register_pre(cmd, Box::new(handler));
    }

    /// Registers a user handler for `cmd`, invoked after the built-in
    /// handlers.
    pub fn register_post<F>(&mut self, cmd: &str, handler: F)
    where
        F: FnMut(&mut Core, &Message, bool) -> Outcome + Send + 'static,
    {
        self.dispatcher.register_post(cmd, Box::new(handler));
    }

    /// Removes every user handler for `cmd`.
    pub fn unregister_user_handlers(&mut self, cmd: &str) {
        self.dispatcher.unregister_user(cmd);
    }

    //
    // Readers.
    //

    /// Whether a connection is up.
    pub fn online(&self) -> bool {
        self.core.conn.online()
    }

    /// Whether the last disconnect was a clean EOF.
    pub fn eof(&self) -> bool {
        self.core.conn.eof()
    }

    /// The nick the server last addressed us by.
    pub fn mynick(&self) -> &str {
        &self.core.state.mynick
    }

    /// Our server's name, from 004 (or the prefix of 383).
    pub fn myhost(&self) -> &str {
        &self.core.state.myhost
    }

    /// The user mode letters the server supports, from 004.
    pub fn umodes(&self) -> &str {
        &self.core.state.umodes
    }

    /// The channel mode letters the server supports, from 004.
    pub fn cmodes(&self) -> &str {
        &self.core.state.cmodes
    }

    /// The server version, from 004.
    pub fn version(&self) -> &str {
        &self.core.state.ver
    }

    /// Whether we logged on as a service (383).
    pub fn service(&self) -> bool {
        self.core.state.service
    }

    /// The negotiated casemapping.
    pub fn casemap(&self) -> CaseMapping {
        self.core.state.isupport.casemapping
    }

    /// The payload of the last ERROR from the server.
    pub fn lasterror(&self) -> Option<&str> {
        self.core.state.lasterr.as_deref()
    }

    /// Whether a 465 announced a ban. Cleared by the next connect.
    pub fn banned(&self) -> bool {
        self.core.state.banned
    }

    /// The ban message from 465.
    pub fn banmsg(&self) -> Option<&str> {
        self.core.state.banmsg.as_deref()
    }

    /// Whether a 484 marked the connection restricted.
    pub fn restricted(&self) -> bool {
        self.core.state.restricted
    }

    /// Whether the final argument of the last read line used the `:`
    /// trailing syntax.
    pub fn colon_trail(&self) -> bool {
        self.core.conn.colon_trail()
    }

    /// The `n`th captured message of the logon conversation (001–004).
    pub fn logonconv(&self, n: usize) -> Option<&Message> {
        self.core.state.logonconv.get(n).and_then(|m| m.as_ref())
    }

    /// The 005-derived tables.
    pub fn isupport(&self) -> &Isupport {
        &self.core.state.isupport
    }

    /// The mode letters of one 005 CHANMODES class.
    pub fn chanmodes(&self, class: ChanModeClass) -> &str {
        self.core.state.isupport.chanmodes(class)
    }

    /// The 005 PREFIX table: mode letters (`false`) or symbols (`true`).
    pub fn modepfx(&self, symbols: bool) -> &str {
        if symbols {
            self.core.state.isupport.prefix_symbols()
        } else {
            self.core.state.isupport.prefix_modes()
        }
    }

    /// A raw 005 attribute value.
    pub fn attr005(&self, key: &str) -> Option<&str> {
        self.core.state.isupport.attr(key)
    }

    /// The raw fd of the underlying socket, when online over a real one.
    #[cfg(unix)]
    pub fn sockfd(&self) -> Option<std::os::unix::io::RawFd> {
        self.core.conn.sockfd()
    }

    /// The pending configuration (as of the next connect).
    pub fn config(&self) -> &Config {
        &self.core.config
    }

    /// The tracker, once tracking has been armed by a 005 CASEMAPPING.
    pub fn tracker(&self) -> Option<&Tracker> {
        self.core.tracker.as_ref()
    }

    /// Whether tracking is live on this connection.
    pub fn tracking(&self) -> bool {
        self.core.tracker.is_some()
    }

    /// A tracked channel by name.
    pub fn channel(&self, name: &str) -> Option<&track::Channel> {
        self.core.tracker.as_ref()?.chan(name)
    }

    /// The names of every tracked channel.
    pub fn channels(&self) -> Vec<String> {
        self.core
            .tracker
            .as_ref()
            .map(|t| t.chan_names())
            .unwrap_or_default()
    }

    /// A tracked user by nick.
    pub fn user(&self, nick: &str) -> Option<&track::User> {
        self.core.tracker.as_ref()?.user(nick)
    }

    //
    // The lifecycle: connect, read, write, reset.
    //

    /// Connects and logs on: transport (+proxy, +TLS), optional
    /// immediate STARTTLS, CAP/SASL negotiation, the logon conversation
    /// until 004/383. On failure the object is left configured but
    /// offline.
    pub async fn connect(&mut self) -> Result<()> {
        if self.core.conn.online() {
            return Err(Error::AlreadyConnected);
        }

        let config = self.core.config.clone();
        let hard_us = config.hard_timeout_us();
        let deadline = (hard_us > 0).then(|| Instant::now() + Duration::from_micros(hard_us));

        self.prepare(&config);
        self.core.conn.connect(&config).await?;

        match self.logon(&config, deadline).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.core.conn.reset();
                Err(e)
            }
        }
    }

    /// Like [`Irc::connect`], but over a scripted [`MockStream`] instead
    /// of a real transport. Intended for tests and offline tooling.
    pub async fn connect_mock(&mut self, stream: MockStream) -> Result<()> {
        if self.core.conn.online() {
            return Err(Error::AlreadyConnected);
        }

        let config = self.core.config.clone();
        let hard_us = config.hard_timeout_us();
        let deadline = (hard_us > 0).then(|| Instant::now() + Duration::from_micros(hard_us));

        self.prepare(&config);
        self.core.conn.attach_mock(stream, config.encoding())?;

        match self.logon(&config, deadline).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.core.conn.reset();
                Err(e)
            }
        }
    }

    /// Reads one message, dispatching it through the handler tables.
    /// `to_us` of zero blocks without a timeout; `Ok(None)` is a
    /// timeout. Errors reset the connection.
    pub async fn read(&mut self, to_us: u64) -> Result<Option<Message>> {
        let msg = match self.core.conn.read(to_us).await? {
            Some(msg) => msg,
            None => return Ok(None),
        };

        let out = self.dispatcher.dispatch(&mut self.core, &msg, false);
        self.flush().await?;
        if let Outcome::Failed(fail) = out {
            self.core.conn.reset();
            return Err(fail_error(fail));
        }

        Ok(Some(msg))
    }

    /// Sends one line (CRLF appended if missing). Failures reset the
    /// connection.
    pub async fn write(&mut self, line: &str) -> Result<()> {
        self.core.send(line);
        self.flush().await
    }

    /// Drops the connection, returning the object to its configured
    /// state.
    pub fn reset(&mut self) {
        self.core.conn.reset();
        self.core.outq.clear();
    }

    //
    // Internals.
    //

    /// Per-connect state reset and built-in handler registration.
    fn prepare(&mut self, config: &Config) {
        for origin in [
            dispatch::Origin::Irc,
            dispatch::Origin::V3,
            dispatch::Origin::Track,
        ] {
            self.dispatcher.unregister_origin(origin);
        }
        if !config.dumb() {
            handlers::register_all(&mut self.dispatcher);
            v3::register_all(&mut self.dispatcher);
            if config.tracking() {
                track::register_all(&mut self.dispatcher);
            }
        }

        self.core.caps.reset_negotiation();
        self.core.tracker = None;
        self.core.outq.clear();
        self.core.state = Session::begin(config);
    }

    /// The logon conversation (§everything after the transport is up).
    async fn logon(&mut self, config: &Config, deadline: Option<Instant>) -> Result<()> {
        if config.dumb() {
            info!("connected (dumb mode), skipping logon");
            return Ok(());
        }

        // Immediate STARTTLS upgrades before a single cleartext IRC
        // line. With SASL configured the `tls` capability path is used
        // instead.
        if self.core.state.starttls_first && self.core.state.sasl_mech.is_none() {
            self.core.send("STARTTLS");
            self.flush().await?;
            loop {
                match self.logon_step(deadline).await? {
                    Outcome::StartTls => {
                        self.core.conn.upgrade_tls(config.server()).await?;
                        break;
                    }
                    Outcome::StarttlsFailed => break,
                    _ => {}
                }
            }
        }

        if !self.core.caps.is_empty() {
            self.core.send("CAP LS");
        }
        self.core.send(logon_lines(config));
        self.flush().await?;
        debug!("logon sequence sent");

        loop {
            match self.logon_step(deadline).await? {
                Outcome::LogonOver => break,
                Outcome::StartTls => {
                    // 670 from the `tls` capability path: upgrade, then
                    // continue with SASL or CAP END.
                    self.core.conn.upgrade_tls(config.server()).await?;
                    v3::conclude_sasl_cap(&mut self.core);
                    self.flush().await?;
                }
                _ => {}
            }
        }

        info!("logged on as '{}'", self.core.state.mynick);
        Ok(())
    }

    /// One read-and-dispatch round of the logon loop.
    async fn logon_step(&mut self, deadline: Option<Instant>) -> Result<Outcome> {
        let remaining = conn::remaining_us(deadline)?;
        let msg = match self.core.conn.read(remaining).await? {
            Some(msg) => msg,
            // This slice timed out; the next remaining_us call turns an
            // expired deadline into the Timeout error.
            None => return Ok(Outcome::None),
        };

        if let Some(cb) = self.core.cb_conread.as_mut() {
            if !cb(&msg) {
                warn!("further logon prohibited by conread");
                return Err(Error::Proto("logon aborted by conread callback".to_owned()));
            }
        }

        let out = self.dispatcher.dispatch(&mut self.core, &msg, true);
        self.flush().await?;
        if let Outcome::Failed(fail) = out {
            return Err(fail_error(fail));
        }
        Ok(out)
    }

    /// Delivers queued lines to the socket in call order.
    async fn flush(&mut self) -> Result<()> {
        while let Some(line) = self.core.outq.pop_front() {
            self.core.conn.write_line(&line).await?;
        }
        Ok(())
    }
}

/// The PASS/NICK/USER (or SERVICE) block, sent as one write.
fn logon_lines(config: &Config) -> String {
    let mut lines = String::new();
    if !config.password().is_empty() {
        lines.push_str(&format!("PASS :{}\r\n", config.password()));
    }
    if config.service_connect() {
        lines.push_str(&format!(
            "SERVICE {} 0 {} {} 0 :{}\r\n",
            config.nickname(),
            config.service_dist(),
            config.service_type(),
            config.service_info()
        ));
    } else {
        lines.push_str(&format!(
            "NICK {}\r\nUSER {} {} * :{}\r\n",
            config.nickname(),
            config.username(),
            config.user_flags(),
            config.realname()
        ));
    }
    lines
}

fn fail_error(fail: Fail) -> Error {
    match fail {
        Fail::OutOfNicks => Error::OutOfNicks,
        Fail::Auth => Error::Auth,
        Fail::Proto => Error::Proto("message handler flagged a protocol error".to_owned()),
        Fail::Io => Error::Io(io::Error::new(
            io::ErrorKind::Other,
            "handler reported an i/o failure",
        )),
        Fail::Cap => Error::Cap("capability negotiation failed".to_owned()),
        Fail::Tls => Error::Tls("STARTTLS failed".to_owned()),
    }
}

#[cfg(test)]
pub(crate) fn test_core() -> Core {
    Core::new(Config::default())
}
