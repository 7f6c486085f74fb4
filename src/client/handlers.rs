//! Built-in handlers for the protocol essentials: the logon
//! conversation, PING, nick management and the ban/auth numerics.

use log::{info, warn};

use sirc_proto::prefix::prefix_nick;
use sirc_proto::response::*;
use sirc_proto::{Message, Prefix};

use super::dispatch::{Dispatcher, Fail, Origin, Outcome};
use super::Core;

/// Mode letters assumed until 004 says otherwise.
const FALLBACK_UMODES: &str = "iswo";
const FALLBACK_CMODES: &str = "opsitnml";

type BuiltinFn = fn(&mut Core, &Message, bool) -> Outcome;

pub(crate) fn register_all(dispatcher: &mut Dispatcher) {
    let table: &[(&str, BuiltinFn)] = &[
        ("PING", handle_ping),
        (ERR_ERRONEUSNICKNAME, handle_nick_unavailable),
        (ERR_NICKNAMEINUSE, handle_nick_unavailable),
        (ERR_NICKCOLLISION, handle_nick_unavailable),
        (ERR_UNAVAILRESOURCE, handle_nick_unavailable),
        (ERR_PASSWDMISMATCH, handle_464),
        ("NICK", handle_nick),
        ("ERROR", handle_error),
        (RPL_WELCOME, handle_001),
        (RPL_YOURHOST, handle_002),
        (RPL_CREATED, handle_003),
        (RPL_MYINFO, handle_004),
        (RPL_YOURESERVICE, handle_383),
        (ERR_RESTRICTED, handle_484),
        (ERR_YOUREBANNEDCREEP, handle_465),
        (ERR_YOUWILLBEBANNED, handle_466),
        (RPL_ISUPPORT, handle_005),
    ];
    for (cmd, f) in table {
        dispatcher.register_builtin(cmd, Origin::Irc, Box::new(*f));
    }
}

fn handle_ping(core: &mut Core, msg: &Message, logon: bool) -> Outcome {
    let Some(token) = msg.param(0) else {
        return Outcome::Failed(Fail::Proto);
    };
    if !logon {
        return Outcome::None;
    }
    core.send(format!("PONG :{}", token));
    Outcome::None
}

/// 432/433/436/437: ask the nick mutator for another try.
fn handle_nick_unavailable(core: &mut Core, _msg: &Message, logon: bool) -> Outcome {
    if !logon {
        return Outcome::None;
    }

    let current = core.state.mynick.clone();
    match (core.cb_mutnick)(&current) {
        Some(next) if !next.is_empty() && next != current => {
            info!("nick '{}' unavailable, trying '{}'", current, next);
            core.state.mynick = next.clone();
            core.send(format!("NICK {}", next));
            Outcome::None
        }
        _ => Outcome::Failed(Fail::OutOfNicks),
    }
}

fn handle_464(_core: &mut Core, _msg: &Message, _logon: bool) -> Outcome {
    warn!("wrong server password");
    Outcome::Failed(Fail::Auth)
}

fn handle_nick(core: &mut Core, msg: &Message, _logon: bool) -> Outcome {
    let (Some(pfx), Some(new)) = (msg.prefix(), msg.param(0)) else {
        return Outcome::Failed(Fail::Proto);
    };

    // Only users rename; a NICK with a server origin is noise.
    let who = match Prefix::parse(pfx) {
        Prefix::Nickname { nick, .. } => nick,
        Prefix::ServerName(_) => return Outcome::None,
    };

    if core
        .state
        .isupport
        .casemapping
        .eq(&who, &core.state.mynick)
    {
        core.state.mynick = new.to_owned();
        info!("my nick is now '{}'", new);
    }

    Outcome::None
}

fn handle_error(core: &mut Core, msg: &Message, _logon: bool) -> Outcome {
    let text = msg.param(0).unwrap_or("");
    warn!("server said ERROR: '{}'", text);
    core.state.lasterr = Some(text.to_owned());
    Outcome::None
}

fn handle_001(core: &mut Core, msg: &Message, _logon: bool) -> Outcome {
    let Some(me) = msg.param(0) else {
        return Outcome::Failed(Fail::Proto);
    };

    core.state.logonconv[0] = Some(msg.clone());
    core.state.mynick = prefix_nick(me).to_owned();
    core.state.umodes = FALLBACK_UMODES.to_owned();
    core.state.cmodes = FALLBACK_CMODES.to_owned();
    core.state.ver.clear();
    core.state.service = false;

    Outcome::None
}

fn handle_002(core: &mut Core, msg: &Message, _logon: bool) -> Outcome {
    core.state.logonconv[1] = Some(msg.clone());
    Outcome::None
}

fn handle_003(core: &mut Core, msg: &Message, _logon: bool) -> Outcome {
    core.state.logonconv[2] = Some(msg.clone());
    Outcome::None
}

fn handle_004(core: &mut Core, msg: &Message, _logon: bool) -> Outcome {
    let params: Vec<&str> = msg.params().collect();
    if params.len() < 5 {
        return Outcome::Failed(Fail::Proto);
    }

    core.state.logonconv[3] = Some(msg.clone());
    core.state.myhost = params[1].to_owned();
    core.state.ver = params[2].to_owned();
    core.state.umodes = params[3].to_owned();
    core.state.cmodes = params[4].to_owned();

    Outcome::LogonOver
}

fn handle_383(core: &mut Core, msg: &Message, _logon: bool) -> Outcome {
    let Some(me) = msg.param(0) else {
        return Outcome::Failed(Fail::Proto);
    };

    core.state.mynick = prefix_nick(me).to_owned();
    core.state.myhost = msg
        .prefix()
        .unwrap_or(&core.state.server_host)
        .to_owned();
    core.state.umodes = FALLBACK_UMODES.to_owned();
    core.state.cmodes = FALLBACK_CMODES.to_owned();
    core.state.ver.clear();
    core.state.service = true;

    Outcome::LogonOver
}

fn handle_484(core: &mut Core, _msg: &Message, _logon: bool) -> Outcome {
    core.state.restricted = true;
    info!("we're 'restricted'");
    Outcome::None
}

fn handle_465(core: &mut Core, msg: &Message, _logon: bool) -> Outcome {
    // The server decides when to close; the flag just records why.
    warn!("we're banned");
    core.state.banned = true;
    core.state.banmsg = Some(msg.param(1).unwrap_or("").to_owned());
    Outcome::None
}

fn handle_466(_core: &mut Core, _msg: &Message, _logon: bool) -> Outcome {
    warn!("we will be banned");
    Outcome::None
}

fn handle_005(core: &mut Core, msg: &Message, _logon: bool) -> Outcome {
    let params: Vec<&str> = msg.params().collect();
    if params.len() < 2 {
        return Outcome::None;
    }

    // The trailing "are supported by this server" is not a token.
    let end = if msg.has_trailing() {
        params.len() - 1
    } else {
        params.len()
    };

    let mut saw_casemap = false;
    for token in &params[1..end] {
        match core.state.isupport.apply_token(token) {
            Ok(true) => saw_casemap = true,
            Ok(false) => {}
            Err(e) => {
                warn!("{}", e);
                return Outcome::Failed(Fail::Proto);
            }
        }
    }

    if saw_casemap && core.state.track && core.tracker.is_none() {
        let casemap = core.state.isupport.casemapping;
        core.tracker = Some(super::track::Tracker::new(casemap));
        info!("tracking enabled ({} casemapping)", casemap);
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

    #[test]
    fn ping_answered_during_logon_only() {
        let mut core = test_core();
        assert_eq!(
            handle_ping(&mut core, &msg("PING :token"), true),
            Outcome::None
        );
        assert_eq!(core.outq.pop_front().as_deref(), Some("PONG :token"));

        assert_eq!(
            handle_ping(&mut core, &msg("PING :token"), false),
            Outcome::None
        );
        assert!(core.outq.is_empty());
    }

    #[test]
    fn empty_ping_is_a_protocol_error() {
        let mut core = test_core();
        assert_eq!(
            handle_ping(&mut core, &msg("PING"), true),
            Outcome::Failed(Fail::Proto)
        );
    }

    #[test]
    fn logon_conversation_capture() {
        let mut core = test_core();
        core.state.mynick = "bob".into();
        assert_eq!(
            handle_001(&mut core, &msg(":srv 001 bob :welcome"), true),
            Outcome::None
        );
        assert_eq!(core.state.mynick, "bob");
        assert_eq!(core.state.umodes, FALLBACK_UMODES);
        handle_002(&mut core, &msg(":srv 002 bob :your host"), true);
        handle_003(&mut core, &msg(":srv 003 bob :created"), true);
        assert_eq!(
            handle_004(&mut core, &msg(":srv 004 bob srv ircd-1 iowsz ntml"), true),
            Outcome::LogonOver
        );
        assert_eq!(core.state.myhost, "srv");
        assert_eq!(core.state.ver, "ircd-1");
        assert_eq!(core.state.umodes, "iowsz");
        assert_eq!(core.state.cmodes, "ntml");
        assert!(core.state.logonconv.iter().all(|m| m.is_some()));
    }

    #[test]
    fn welcome_strips_userhost_from_nick() {
        let mut core = test_core();
        handle_001(&mut core, &msg(":srv 001 bob!b@host.example :hi"), true);
        assert_eq!(core.state.mynick, "bob");
    }

    #[test]
    fn nick_collision_walk() {
        let mut core = test_core();
        core.state.mynick = "bob".into();
        assert_eq!(
            handle_nick_unavailable(&mut core, &msg(":srv 433 * bob :in use"), true),
            Outcome::None
        );
        assert_eq!(core.state.mynick, "bob_");
        assert_eq!(core.outq.pop_front().as_deref(), Some("NICK bob_"));
    }

    #[test]
    fn nick_collision_gives_up_when_mutator_does() {
        let mut core = test_core();
        core.state.mynick = "bob".into();
        core.cb_mutnick = Box::new(|_| None);
        assert_eq!(
            handle_nick_unavailable(&mut core, &msg(":srv 433 * bob :in use"), true),
            Outcome::Failed(Fail::OutOfNicks)
        );
    }

    #[test]
    fn own_nick_change_tracked() {
        let mut core = test_core();
        core.state.mynick = "bob".into();
        handle_nick(&mut core, &msg(":BOB!b@h NICK :bob2"), false);
        assert_eq!(core.state.mynick, "bob2");
        handle_nick(&mut core, &msg(":alice!a@h NICK :alice2"), false);
        assert_eq!(core.state.mynick, "bob2");
    }

    #[test]
    fn server_origin_nick_is_ignored() {
        let mut core = test_core();
        core.state.mynick = "irc.example.org".into();
        handle_nick(&mut core, &msg(":irc.example.org NICK :oddity"), false);
        assert_eq!(core.state.mynick, "irc.example.org");
    }

    #[test]
    fn auth_and_ban_numerics() {
        let mut core = test_core();
        assert_eq!(
            handle_464(&mut core, &msg(":srv 464 bob :bad password"), true),
            Outcome::Failed(Fail::Auth)
        );
        handle_465(&mut core, &msg(":srv 465 bob :you are banned"), true);
        assert!(core.state.banned);
        assert_eq!(core.state.banmsg.as_deref(), Some("you are banned"));
        handle_484(&mut core, &msg(":srv 484 bob :restricted"), true);
        assert!(core.state.restricted);
    }

    #[test]
    fn isupport_parsed_and_tracker_armed() {
        let mut core = test_core();
        core.state.track = true;
        let m = msg(
            ":srv 005 bob CASEMAPPING=ascii PREFIX=(ov)@+ CHANMODES=b,k,l,psitnm CHANTYPES=# :are supported",
        );
        assert_eq!(handle_005(&mut core, &m, true), Outcome::None);
        assert_eq!(
            core.state.isupport.casemapping,
            sirc_proto::CaseMapping::Ascii
        );
        assert_eq!(core.state.isupport.prefix_modes(), "ov");
        assert_eq!(core.state.isupport.prefix_symbols(), "@+");
        assert_eq!(
            core.state
                .isupport
                .chanmodes(sirc_proto::ChanModeClass::D),
            "psitnm"
        );
        assert!(core.tracker.is_some());
        // The trailing text never lands in the attribute map.
        assert_eq!(core.state.isupport.attr("are"), None);
    }

    #[test]
    fn malformed_prefix_is_fatal() {
        let mut core = test_core();
        let m = msg(":srv 005 bob PREFIX=broken :are supported");
        assert_eq!(handle_005(&mut core, &m, true), Outcome::Failed(Fail::Proto));
    }
}
