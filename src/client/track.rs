//! Reactive channel and user tracking.
//!
//! Once armed (tracking configured and the first 005 CASEMAPPING seen),
//! the tracker keeps a model of every joined channel and its members
//! coherent with JOIN/PART/KICK/NICK/QUIT/MODE and the NAMES and TOPIC
//! numerics. Members reference users through the global user map by
//! nick; a user disappears when its last channel reference does.

use log::warn;

use sirc_proto::prefix::{prefix_host, prefix_nick, prefix_user};
use sirc_proto::response::*;
use sirc_proto::{parse_mode_changes, CaseMapping, Isupport, Message, NameMap};

use super::dispatch::{Dispatcher, Fail, Origin, Outcome};
use super::{Core, Session};

/// A user known through at least one tracked channel.
#[derive(Debug, Clone)]
pub struct User {
    nick: String,
    uname: Option<String>,
    host: Option<String>,
    nchans: usize,
}

impl User {
    /// The user's nick, in the case it was last seen with.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// The user's username, once a full prefix has been seen.
    pub fn uname(&self) -> Option<&str> {
        self.uname.as_deref()
    }

    /// The user's host, once a full prefix has been seen.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// How many tracked channels this user is in.
    pub fn num_chans(&self) -> usize {
        self.nchans
    }
}

/// One channel membership: the member's nick and its mode-prefix string,
/// strongest first.
#[derive(Debug, Clone)]
pub struct Member {
    nick: String,
    modepfx: String,
}

impl Member {
    /// The member's nick (the key into the user map).
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// The member's prefix symbols in descending order of power, e.g.
    /// `@+`.
    pub fn modepfx(&self) -> &str {
        &self.modepfx
    }
}

/// A tracked channel.
#[derive(Debug)]
pub struct Channel {
    name: String,
    topic: Option<String>,
    topic_nick: Option<String>,
    topic_ts: u64,
    desync: bool,
    modes: Vec<String>,
    members: NameMap<Member>,
}

impl Channel {
    fn new(name: &str, casemap: CaseMapping) -> Channel {
        Channel {
            name: name.to_owned(),
            topic: None,
            topic_nick: None,
            topic_ts: 0,
            desync: false,
            modes: Vec::new(),
            members: NameMap::new(casemap),
        }
    }

    /// The channel name in original case.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The topic, if one has been seen.
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    /// Who set the topic (from 333).
    pub fn topic_nick(&self) -> Option<&str> {
        self.topic_nick.as_deref()
    }

    /// When the topic was set (from 333), seconds since the epoch.
    pub fn topic_ts(&self) -> u64 {
        self.topic_ts
    }

    /// Whether the membership model may have diverged from the server's
    /// view; a fresh NAMES clears it.
    pub fn desync(&self) -> bool {
        self.desync
    }

    /// The channel modes as `X` or `X value` strings.
    pub fn modes(&self) -> &[String] {
        &self.modes
    }

    /// The number of members.
    pub fn num_members(&self) -> usize {
        self.members.len()
    }

    /// Looks up one member by nick.
    pub fn member(&self, nick: &str) -> Option<&Member> {
        self.members.get(nick)
    }

    /// Iterates over the members.
    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.iter().map(|(_, m)| m)
    }

    fn add_mode(&mut self, isupport: &Isupport, mode: char, arg: Option<&str>) {
        self.drop_mode(isupport, mode, arg);
        match arg {
            Some(arg) => self.modes.push(format!("{} {}", mode, arg)),
            None => self.modes.push(mode.to_string()),
        }
    }

    fn drop_mode(&mut self, isupport: &Isupport, mode: char, arg: Option<&str>) {
        use sirc_proto::ChanModeClass::A;
        // List modes are identified by letter and argument; everything
        // else by letter alone.
        let full = arg.map(|a| format!("{} {}", mode, a));
        self.modes.retain(|m| {
            if isupport.classify_chanmode(mode) == Some(A) {
                full.as_deref() != Some(m.as_str())
            } else {
                !m.starts_with(mode)
            }
        });
    }
}

/// The channel/user model.
pub struct Tracker {
    casemap: CaseMapping,
    chans: NameMap<Channel>,
    users: NameMap<User>,
    endofnames: bool,
}

impl Tracker {
    pub(crate) fn new(casemap: CaseMapping) -> Tracker {
        Tracker {
            casemap,
            chans: NameMap::new(casemap),
            users: NameMap::new(casemap),
            endofnames: true,
        }
    }

    /// The casemapping the maps were built with.
    pub fn casemap(&self) -> CaseMapping {
        self.casemap
    }

    /// The number of tracked channels.
    pub fn num_chans(&self) -> usize {
        self.chans.len()
    }

    /// The number of known users across all tracked channels.
    pub fn num_users(&self) -> usize {
        self.users.len()
    }

    /// Looks up one channel by name.
    pub fn chan(&self, name: &str) -> Option<&Channel> {
        self.chans.get(name)
    }

    /// The names of every tracked channel, in original case.
    pub fn chan_names(&self) -> Vec<String> {
        self.chans.keys().map(|k| k.to_owned()).collect()
    }

    /// Looks up one user by nick.
    pub fn user(&self, nick: &str) -> Option<&User> {
        self.users.get(nick)
    }

    fn add_chan(&mut self, name: &str) {
        self.chans.insert(name, Channel::new(name, self.casemap));
    }

    fn drop_chan(&mut self, name: &str) {
        if let Some(chan) = self.chans.remove(name) {
            for (_, member) in chan.members.iter() {
                Tracker::unref_user(&mut self.users, &member.nick);
            }
        }
    }

    /// Creates or refreshes a user from a `nick` or `nick!user@host`
    /// ident; a fuller ident fills in missing fields.
    fn touch_user(&mut self, ident: &str) {
        let nick = prefix_nick(ident);
        match self.users.get_mut(nick) {
            Some(user) => {
                if user.uname.is_none() {
                    user.uname = prefix_user(ident).map(str::to_owned);
                }
                if user.host.is_none() {
                    user.host = prefix_host(ident).map(str::to_owned);
                }
            }
            None => {
                self.users.insert(
                    nick,
                    User {
                        nick: nick.to_owned(),
                        uname: prefix_user(ident).map(str::to_owned),
                        host: prefix_host(ident).map(str::to_owned),
                        nchans: 0,
                    },
                );
            }
        }
    }

    /// Adds (or re-prefixes) a member; the user is created on first
    /// sight.
    fn add_memb(&mut self, chan: &str, ident: &str, modepfx: &str) {
        let nick = prefix_nick(ident).to_owned();
        self.touch_user(ident);

        let Some(c) = self.chans.get_mut(chan) else {
            return;
        };
        if let Some(member) = c.members.get_mut(&nick) {
            member.modepfx = modepfx.to_owned();
            return;
        }
        c.members.insert(
            &nick,
            Member {
                nick: nick.clone(),
                modepfx: modepfx.to_owned(),
            },
        );
        if let Some(user) = self.users.get_mut(&nick) {
            user.nchans += 1;
        }
    }

    fn unref_user(users: &mut NameMap<User>, nick: &str) {
        let gone = match users.get_mut(nick) {
            Some(user) => {
                user.nchans = user.nchans.saturating_sub(1);
                user.nchans == 0
            }
            None => false,
        };
        if gone {
            users.remove(nick);
        }
    }

    /// Drops a member from one channel, dropping the user with its last
    /// channel reference.
    fn drop_memb(&mut self, chan: &str, nick: &str) {
        let Some(c) = self.chans.get_mut(chan) else {
            return;
        };
        if c.members.remove(nick).is_some() {
            Tracker::unref_user(&mut self.users, nick);
        }
    }

    /// Empties a channel's member map, releasing every user reference.
    fn clear_memb(&mut self, chan: &str) {
        let Some(c) = self.chans.get_mut(chan) else {
            return;
        };
        let nicks: Vec<String> = c.members.keys().map(|k| k.to_owned()).collect();
        c.members.clear();
        for nick in nicks {
            Tracker::unref_user(&mut self.users, &nick);
        }
    }

    /// Drops `nick` from every channel (QUIT).
    fn drop_everywhere(&mut self, nick: &str) {
        let chans: Vec<String> = self.chans.keys().map(|k| k.to_owned()).collect();
        for chan in chans {
            self.drop_memb(&chan, nick);
        }
    }

    /// Re-keys a user and all its memberships from `old` to `new`.
    fn rename_user(&mut self, old: &str, new: &str) {
        if let Some(mut user) = self.users.remove(old) {
            user.nick = new.to_owned();
            self.users.insert(new, user);
        }
        for (_, chan) in self.chans.iter_mut() {
            if let Some(mut member) = chan.members.remove(old) {
                member.nick = new.to_owned();
                chan.members.insert(new, member);
            }
        }
    }

    /// Adds or removes one prefix symbol on a member, keeping the prefix
    /// string sorted by descending power. Enabling a present symbol or
    /// disabling an absent one is reported as a tracker error, not a
    /// stream error.
    fn update_modepfx(
        &mut self,
        isupport: &Isupport,
        chan: &str,
        nick: &str,
        sym: char,
        enable: bool,
    ) -> bool {
        let Some(c) = self.chans.get_mut(chan) else {
            warn!("we don't know channel '{}'!", chan);
            return false;
        };
        let Some(member) = c.members.get_mut(nick) else {
            warn!("no such member '{}' in channel '{}'", nick, chan);
            return false;
        };

        let present = member.modepfx.contains(sym);
        if enable == present {
            warn!(
                "modepfx desync on '{}' in '{}': '{}' already {}",
                nick,
                chan,
                sym,
                if present { "set" } else { "unset" }
            );
            return false;
        }

        if enable {
            let power = isupport.prefix_power(sym).unwrap_or(usize::MAX);
            let at = member
                .modepfx
                .chars()
                .position(|c| isupport.prefix_power(c).unwrap_or(usize::MAX) > power)
                .unwrap_or(member.modepfx.len());
            member.modepfx.insert(at, sym);
        } else {
            member.modepfx.retain(|c| c != sym);
        }

        true
    }
}

type BuiltinFn = fn(&mut Core, &Message, bool) -> Outcome;

pub(crate) fn register_all(dispatcher: &mut Dispatcher) {
    let table: &[(&str, BuiltinFn)] = &[
        ("JOIN", h_join),
        (RPL_TOPIC, h_332),
        (RPL_TOPICWHOTIME, h_333),
        (RPL_NAMREPLY, h_353),
        (RPL_ENDOFNAMES, h_366),
        ("PART", h_part),
        ("QUIT", h_quit),
        ("NICK", h_nick),
        ("KICK", h_kick),
        ("MODE", h_mode),
        (RPL_CHANNELMODEIS, h_324),
    ];
    for (cmd, f) in table {
        dispatcher.register_builtin(cmd, Origin::Track, Box::new(*f));
    }
}

/// Splits the tracker out of the core, skipping dispatch until it has
/// been armed by the first 005 CASEMAPPING.
fn parts(core: &mut Core) -> Option<(&mut Tracker, &mut Session)> {
    let Core { tracker, state, .. } = core;
    tracker.as_mut().map(|t| (t, state))
}

fn is_self(state: &Session, nick: &str) -> bool {
    state.isupport.casemapping.eq(nick, &state.mynick)
}

fn h_join(core: &mut Core, msg: &Message, _logon: bool) -> Outcome {
    let Some((tracker, state)) = parts(core) else {
        return Outcome::None;
    };
    let (Some(pfx), Some(chan)) = (msg.prefix(), msg.param(0)) else {
        return Outcome::Failed(Fail::Proto);
    };

    let nick = prefix_nick(pfx);
    if is_self(state, nick) {
        if tracker.chan(chan).is_none() {
            tracker.add_chan(chan);
        }
    } else {
        if tracker.chan(chan).is_none() {
            warn!("we don't know channel '{}'!", chan);
            return Outcome::None;
        }
        tracker.add_memb(chan, pfx, "");
    }

    Outcome::None
}

fn h_332(core: &mut Core, msg: &Message, _logon: bool) -> Outcome {
    let Some((tracker, _)) = parts(core) else {
        return Outcome::None;
    };
    let (Some(chan), Some(topic)) = (msg.param(1), msg.param(2)) else {
        return Outcome::Failed(Fail::Proto);
    };

    match tracker.chans.get_mut(chan) {
        Some(c) => c.topic = Some(topic.to_owned()),
        None => warn!("we don't know channel '{}'!", chan),
    }
    Outcome::None
}

fn h_333(core: &mut Core, msg: &Message, _logon: bool) -> Outcome {
    let Some((tracker, _)) = parts(core) else {
        return Outcome::None;
    };
    let (Some(chan), Some(nick)) = (msg.param(1), msg.param(2)) else {
        return Outcome::Failed(Fail::Proto);
    };

    match tracker.chans.get_mut(chan) {
        Some(c) => {
            c.topic_nick = Some(prefix_nick(nick).to_owned());
            c.topic_ts = msg.param(3).and_then(|t| t.parse().ok()).unwrap_or(0);
        }
        None => warn!("we don't know channel '{}'!", chan),
    }
    Outcome::None
}

fn h_353(core: &mut Core, msg: &Message, _logon: bool) -> Outcome {
    let Some((tracker, state)) = parts(core) else {
        return Outcome::None;
    };
    let (Some(chan), Some(names)) = (msg.param(2), msg.param(3)) else {
        return Outcome::Failed(Fail::Proto);
    };

    if tracker.chan(chan).is_none() {
        warn!("we don't know channel '{}'!", chan);
        return Outcome::None;
    }

    // A names list following a completed one replaces the membership.
    if tracker.endofnames {
        tracker.clear_memb(chan);
        tracker.endofnames = false;
    }

    for name in names.split(' ').filter(|n| !n.is_empty()) {
        let mut chars = name.chars();
        let (pfx, ident) = match chars.next() {
            Some(sym) if state.isupport.is_prefix_symbol(sym) => {
                (sym.to_string(), chars.as_str())
            }
            _ => (String::new(), name),
        };
        tracker.add_memb(chan, ident, &pfx);
    }

    Outcome::None
}

fn h_366(core: &mut Core, msg: &Message, _logon: bool) -> Outcome {
    let Some((tracker, _)) = parts(core) else {
        return Outcome::None;
    };
    tracker.endofnames = true;

    let Some(chan) = msg.param(1) else {
        return Outcome::Failed(Fail::Proto);
    };
    match tracker.chans.get_mut(chan) {
        Some(c) => c.desync = false,
        None => warn!("we don't know channel '{}'!", chan),
    }
    Outcome::None
}

fn h_part(core: &mut Core, msg: &Message, _logon: bool) -> Outcome {
    let Some((tracker, state)) = parts(core) else {
        return Outcome::None;
    };
    let (Some(pfx), Some(chan)) = (msg.prefix(), msg.param(0)) else {
        return Outcome::Failed(Fail::Proto);
    };

    let nick = prefix_nick(pfx);
    if is_self(state, nick) {
        // Our own PART drops the whole channel.
        tracker.drop_chan(chan);
        return Outcome::None;
    }

    if tracker.chan(chan).is_none() {
        warn!("we don't know channel '{}'!", chan);
        return Outcome::None;
    }
    tracker.drop_memb(chan, nick);

    Outcome::None
}

fn h_quit(core: &mut Core, msg: &Message, _logon: bool) -> Outcome {
    let Some((tracker, _)) = parts(core) else {
        return Outcome::None;
    };
    let Some(pfx) = msg.prefix() else {
        return Outcome::Failed(Fail::Proto);
    };

    tracker.drop_everywhere(prefix_nick(pfx));
    Outcome::None
}

fn h_kick(core: &mut Core, msg: &Message, _logon: bool) -> Outcome {
    let Some((tracker, state)) = parts(core) else {
        return Outcome::None;
    };
    let (Some(_), Some(chan), Some(target)) = (msg.prefix(), msg.param(0), msg.param(1)) else {
        return Outcome::Failed(Fail::Proto);
    };

    if is_self(state, target) {
        tracker.drop_chan(chan);
        return Outcome::None;
    }

    if tracker.chan(chan).is_none() {
        warn!("we don't know channel '{}'!", chan);
        return Outcome::None;
    }
    tracker.drop_memb(chan, target);

    Outcome::None
}

fn h_nick(core: &mut Core, msg: &Message, _logon: bool) -> Outcome {
    let Some((tracker, _)) = parts(core) else {
        return Outcome::None;
    };
    let (Some(pfx), Some(new)) = (msg.prefix(), msg.param(0)) else {
        return Outcome::Failed(Fail::Proto);
    };

    tracker.rename_user(prefix_nick(pfx), new);
    Outcome::None
}

fn h_mode(core: &mut Core, msg: &Message, _logon: bool) -> Outcome {
    apply_mode(core, msg, 0)
}

/// 324 carries the same shape shifted by the leading target nick.
fn h_324(core: &mut Core, msg: &Message, _logon: bool) -> Outcome {
    apply_mode(core, msg, 1)
}

fn apply_mode(core: &mut Core, msg: &Message, skip: usize) -> Outcome {
    let Some((tracker, state)) = parts(core) else {
        return Outcome::None;
    };
    let (Some(chan), Some(modes)) = (msg.param(skip), msg.param(skip + 1)) else {
        return Outcome::Failed(Fail::Proto);
    };

    if !state.isupport.is_channel(chan) {
        return Outcome::None;
    }
    if tracker.chan(chan).is_none() {
        warn!("we don't know channel '{}'!", chan);
        return Outcome::None;
    }

    let args: Vec<&str> = msg.params().skip(skip + 2).collect();
    for change in parse_mode_changes(&state.isupport, modes, &args) {
        if state.isupport.is_prefix_mode(change.mode) {
            let (Some(sym), Some(nick)) = (
                state.isupport.mode_to_symbol(change.mode),
                change.arg.as_deref(),
            ) else {
                continue;
            };
            tracker.update_modepfx(&state.isupport, chan, nick, sym, change.set);
        } else if let Some(c) = tracker.chans.get_mut(chan) {
            if change.set {
                c.add_mode(&state.isupport, change.mode, change.arg.as_deref());
            } else {
                c.drop_mode(&state.isupport, change.mode, change.arg.as_deref());
            }
        }
    }

    Outcome::None
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::client::test_core;

    fn msg(s: &str) -> Message {
        Message::parse(s).unwrap()
    }

    fn tracked_core() -> Core {
        let mut core = test_core();
        core.state.mynick = "bob".to_owned();
        core.tracker = Some(Tracker::new(CaseMapping::Rfc1459));
        core
    }

    fn feed(core: &mut Core, lines: &[&str]) {
        for line in lines {
            let m = msg(line);
            let out = match m.command() {
                "JOIN" => h_join(core, &m, false),
                "PART" => h_part(core, &m, false),
                "QUIT" => h_quit(core, &m, false),
                "NICK" => h_nick(core, &m, false),
                "KICK" => h_kick(core, &m, false),
                "MODE" => h_mode(core, &m, false),
                "324" => h_324(core, &m, false),
                "332" => h_332(core, &m, false),
                "333" => h_333(core, &m, false),
                "353" => h_353(core, &m, false),
                "366" => h_366(core, &m, false),
                other => panic!("unrouted test command {}", other),
            };
            assert!(!out.is_fatal(), "line failed: {}", line);
        }
    }

    #[test]
    fn join_names_quit() {
        let mut core = tracked_core();
        feed(
            &mut core,
            &[
                ":bob!b@h JOIN #c",
                ":srv 353 bob = #c :bob @alice +carol",
                ":srv 366 bob #c :end",
                ":alice!a@h QUIT :bye",
            ],
        );

        let tracker = core.tracker.as_ref().unwrap();
        let chan = tracker.chan("#c").unwrap();
        assert_eq!(chan.num_members(), 2);
        assert!(chan.member("bob").is_some());
        assert!(chan.member("alice").is_none());
        assert_eq!(chan.member("carol").unwrap().modepfx(), "+");
        assert!(tracker.user("alice").is_none());
        assert!(tracker.user("carol").is_some());
        assert!(!chan.desync());
    }

    #[test]
    fn names_after_end_replaces_membership() {
        let mut core = tracked_core();
        feed(
            &mut core,
            &[
                ":bob!b@h JOIN #c",
                ":srv 353 bob = #c :bob alice",
                ":srv 366 bob #c :end",
                ":srv 353 bob = #c :bob carol",
                ":srv 366 bob #c :end",
            ],
        );
        let tracker = core.tracker.as_ref().unwrap();
        let chan = tracker.chan("#c").unwrap();
        assert!(chan.member("alice").is_none());
        assert!(chan.member("carol").is_some());
        assert!(tracker.user("alice").is_none());
    }

    #[test]
    fn multi_line_names_accumulate() {
        let mut core = tracked_core();
        feed(
            &mut core,
            &[
                ":bob!b@h JOIN #c",
                ":srv 353 bob = #c :bob alice",
                ":srv 353 bob = #c :carol",
                ":srv 366 bob #c :end",
            ],
        );
        let chan = core.tracker.as_ref().unwrap().chan("#c").unwrap();
        assert_eq!(chan.num_members(), 3);
    }

    #[test]
    fn foreign_join_and_part() {
        let mut core = tracked_core();
        feed(
            &mut core,
            &[
                ":bob!b@h JOIN #c",
                ":srv 353 bob = #c :bob",
                ":srv 366 bob #c :end",
                ":alice!al@host.example JOIN #c",
            ],
        );
        {
            let tracker = core.tracker.as_ref().unwrap();
            assert!(tracker.chan("#c").unwrap().member("alice").is_some());
            let alice = tracker.user("alice").unwrap();
            assert_eq!(alice.uname(), Some("al"));
            assert_eq!(alice.host(), Some("host.example"));
        }

        feed(&mut core, &[":alice!al@host.example PART #c :bye"]);
        let tracker = core.tracker.as_ref().unwrap();
        assert!(tracker.chan("#c").unwrap().member("alice").is_none());
        assert!(tracker.user("alice").is_none());
    }

    #[test]
    fn self_part_drops_channel() {
        let mut core = tracked_core();
        feed(
            &mut core,
            &[
                ":bob!b@h JOIN #c",
                ":srv 353 bob = #c :bob alice",
                ":srv 366 bob #c :end",
                ":bob!b@h PART #c",
            ],
        );
        let tracker = core.tracker.as_ref().unwrap();
        assert!(tracker.chan("#c").is_none());
        assert_eq!(tracker.num_users(), 0);
    }

    #[test]
    fn kick_of_self_drops_channel() {
        let mut core = tracked_core();
        feed(
            &mut core,
            &[
                ":bob!b@h JOIN #c",
                ":srv 353 bob = #c :bob alice",
                ":srv 366 bob #c :end",
                ":alice!a@h KICK #c bob :begone",
            ],
        );
        assert!(core.tracker.as_ref().unwrap().chan("#c").is_none());
    }

    #[test]
    fn quit_shared_between_channels() {
        let mut core = tracked_core();
        feed(
            &mut core,
            &[
                ":bob!b@h JOIN #a",
                ":srv 353 bob = #a :bob alice",
                ":srv 366 bob #a :end",
                ":bob!b@h JOIN #b",
                ":srv 353 bob = #b :bob alice",
                ":srv 366 bob #b :end",
            ],
        );
        assert_eq!(core.tracker.as_ref().unwrap().user("alice").unwrap().num_chans(), 2);

        feed(&mut core, &[":alice!a@h QUIT :gone"]);
        let tracker = core.tracker.as_ref().unwrap();
        assert!(tracker.chan("#a").unwrap().member("alice").is_none());
        assert!(tracker.chan("#b").unwrap().member("alice").is_none());
        assert!(tracker.user("alice").is_none());
    }

    #[test]
    fn nick_rename_rekeys_everywhere() {
        let mut core = tracked_core();
        feed(
            &mut core,
            &[
                ":bob!b@h JOIN #a",
                ":srv 353 bob = #a :bob @alice",
                ":srv 366 bob #a :end",
                ":alice!a@h NICK :eve",
            ],
        );
        let tracker = core.tracker.as_ref().unwrap();
        let chan = tracker.chan("#a").unwrap();
        assert!(chan.member("alice").is_none());
        let eve = chan.member("eve").unwrap();
        assert_eq!(eve.modepfx(), "@");
        assert!(tracker.user("eve").is_some());
        assert!(tracker.user("alice").is_none());
    }

    #[test]
    fn topic_numerics() {
        let mut core = tracked_core();
        feed(
            &mut core,
            &[
                ":bob!b@h JOIN #c",
                ":srv 332 bob #c :all about rust",
                ":srv 333 bob #c alice!a@h 1401460661",
            ],
        );
        let chan = core.tracker.as_ref().unwrap().chan("#c").unwrap();
        assert_eq!(chan.topic(), Some("all about rust"));
        assert_eq!(chan.topic_nick(), Some("alice"));
        assert_eq!(chan.topic_ts(), 1401460661);
    }

    #[test]
    fn mode_updates_member_prefixes_in_power_order() {
        let mut core = tracked_core();
        core.state
            .isupport
            .apply_token("PREFIX=(qov)~@+")
            .unwrap();
        feed(
            &mut core,
            &[
                ":bob!b@h JOIN #c",
                ":srv 353 bob = #c :bob +alice",
                ":srv 366 bob #c :end",
                ":x!x@h MODE #c +o alice",
                ":x!x@h MODE #c +q alice",
            ],
        );
        let chan = core.tracker.as_ref().unwrap().chan("#c").unwrap();
        // Strongest first, regardless of arrival order.
        assert_eq!(chan.member("alice").unwrap().modepfx(), "~@+");

        feed(&mut core, &[":x!x@h MODE #c -o alice"]);
        let chan = core.tracker.as_ref().unwrap().chan("#c").unwrap();
        assert_eq!(chan.member("alice").unwrap().modepfx(), "~+");
    }

    #[test]
    fn redundant_prefix_change_is_not_fatal() {
        let mut core = tracked_core();
        feed(
            &mut core,
            &[
                ":bob!b@h JOIN #c",
                ":srv 353 bob = #c :bob @alice",
                ":srv 366 bob #c :end",
            ],
        );
        // Enabling an already-present prefix: logged, nothing changes.
        feed(&mut core, &[":x!x@h MODE #c +o alice"]);
        let chan = core.tracker.as_ref().unwrap().chan("#c").unwrap();
        assert_eq!(chan.member("alice").unwrap().modepfx(), "@");
    }

    #[test]
    fn channel_modes_tracked() {
        let mut core = tracked_core();
        feed(
            &mut core,
            &[
                ":bob!b@h JOIN #c",
                ":srv 324 bob #c +sk sekrit",
                ":x!x@h MODE #c +b *!*@spam",
                ":x!x@h MODE #c -s",
            ],
        );
        let chan = core.tracker.as_ref().unwrap().chan("#c").unwrap();
        let modes = chan.modes();
        assert!(modes.iter().any(|m| m == "k sekrit"));
        assert!(modes.iter().any(|m| m == "b *!*@spam"));
        assert!(!modes.iter().any(|m| m == "s"));
    }

    #[test]
    fn unknown_channel_events_are_harmless() {
        let mut core = tracked_core();
        feed(
            &mut core,
            &[
                ":alice!a@h JOIN #nowhere",
                ":alice!a@h PART #nowhere",
                ":srv 366 bob #nowhere :end",
            ],
        );
        assert_eq!(core.tracker.as_ref().unwrap().num_chans(), 0);
    }

    #[test]
    fn member_count_covers_users() {
        let mut core = tracked_core();
        feed(
            &mut core,
            &[
                ":bob!b@h JOIN #a",
                ":srv 353 bob = #a :bob alice carol",
                ":srv 366 bob #a :end",
                ":bob!b@h JOIN #b",
                ":srv 353 bob = #b :bob alice",
                ":srv 366 bob #b :end",
            ],
        );
        let tracker = core.tracker.as_ref().unwrap();
        let total_members: usize = tracker
            .chan_names()
            .iter()
            .map(|c| tracker.chan(c).unwrap().num_members())
            .sum();
        assert!(total_members >= tracker.num_users());
        assert_eq!(tracker.num_users(), 3);
    }
}
