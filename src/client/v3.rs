//! Built-in handlers for the IRCv3 subset: CAP negotiation, SASL, and
//! STARTTLS.
//!
//! The 670 handler cannot perform the TLS handshake itself (handlers are
//! synchronous); it returns [`Outcome::StartTls`] and the connect loop,
//! which owns the socket, performs the upgrade and then resumes the
//! negotiation via [`conclude_sasl_cap`].

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{error, warn};

use sirc_proto::response::*;
use sirc_proto::{CapUpdate, Message};

use super::dispatch::{Dispatcher, Fail, Origin, Outcome};
use super::Core;

type BuiltinFn = fn(&mut Core, &Message, bool) -> Outcome;

pub(crate) fn register_all(dispatcher: &mut Dispatcher) {
    let table: &[(&str, BuiltinFn)] = &[
        (RPL_STARTTLS, handle_670),
        (ERR_STARTTLS, handle_691),
        (RPL_SASLSUCCESS, handle_903),
        (ERR_NICKLOCKED, handle_saslerr),
        (ERR_SASLFAIL, handle_saslerr),
        (ERR_SASLTOOLONG, handle_saslerr),
        (RPL_SASLMECHS, handle_saslerr),
        ("CAP", handle_cap),
        ("AUTHENTICATE", handle_authenticate),
    ];
    for (cmd, f) in table {
        dispatcher.register_builtin(cmd, Origin::V3, Box::new(*f));
    }
}

/// Builds the SASL PLAIN payload: base64 of `authcid NUL authcid NUL
/// passwd`.
pub fn sasl_plain_blob(authcid: &str, passwd: &str) -> String {
    let raw = format!("{}\0{}\0{}", authcid, authcid, passwd);
    STANDARD.encode(raw.as_bytes())
}

fn handle_cap(core: &mut Core, msg: &Message, logon: bool) -> Outcome {
    let params: Vec<&str> = msg.params().collect();
    if params.len() < 2 {
        return Outcome::Failed(Fail::Proto);
    }

    match params[1] {
        "LS" => handle_cap_ls(core, &params, logon),
        "ACK" => handle_cap_ack(core, &params),
        "NAK" => {
            if params.len() < 3 {
                return Outcome::Failed(Fail::Proto);
            }
            error!(
                "server NAKed our caps '{}' ('{}')",
                core.state.capreq.as_deref().unwrap_or(""),
                params[2]
            );
            Outcome::Failed(Fail::Cap)
        }
        other => {
            warn!("unrecognized CAP subcommand '{}'", other);
            Outcome::None
        }
    }
}

fn handle_cap_ls(core: &mut Core, params: &[&str], logon: bool) -> Outcome {
    if !logon {
        return Outcome::None;
    }
    if params.len() < 3 {
        return Outcome::Failed(Fail::Proto);
    }

    // A `*` argument marks a continued multi-line listing.
    let (more, caps_line) = if params[2] == "*" {
        if params.len() < 4 {
            return Outcome::Failed(Fail::Proto);
        }
        (true, params[3])
    } else {
        (false, params[2])
    };

    core.caps.update_from_line(caps_line, CapUpdate::Offered);
    if more {
        return Outcome::MoreCaps;
    }

    if let Some(name) = core.caps.missing_must_have(CapUpdate::Offered) {
        error!("must-have capability '{}' not offered by server", name);
        return Outcome::Failed(Fail::Cap);
    }

    match core.caps.request_line() {
        Some(list) => {
            core.state.capreq = Some(list.clone());
            core.send(format!("CAP REQ :{}", list));
        }
        None => core.send("CAP END"),
    }

    Outcome::None
}

fn handle_cap_ack(core: &mut Core, params: &[&str]) -> Outcome {
    if params.len() < 3 {
        return Outcome::Failed(Fail::Proto);
    }

    // Some servers pad the ACK list with trailing spaces.
    let acked = params[2].trim_end_matches(' ');
    let requested = core.state.capreq.as_deref().unwrap_or("");
    if acked != requested {
        error!("wanted caps '{}' but server ACKed '{}'", requested, acked);
        return Outcome::Failed(Fail::Cap);
    }

    core.caps.update_from_line(acked, CapUpdate::Enabled);

    // An acked `tls` upgrades before anything else happens; SASL (or the
    // CAP END) follows once the TLS layer is up.
    if core.caps.enabled("tls") {
        core.send("STARTTLS");
        return Outcome::None;
    }

    conclude_sasl_cap(core);
    Outcome::None
}

/// Moves the negotiation past the optional SASL stage: start
/// authentication when `sasl` was acked, otherwise close the negotiation
/// with CAP END.
pub(crate) fn conclude_sasl_cap(core: &mut Core) {
    if core.caps.enabled("sasl") {
        if let Some(mech) = core.state.sasl_mech.clone() {
            core.send(format!("AUTHENTICATE {}", mech));
            return;
        }
    }
    core.send("CAP END");
}

fn handle_authenticate(core: &mut Core, msg: &Message, _logon: bool) -> Outcome {
    let blob = match (&core.state.sasl_mech, &core.state.sasl_blob) {
        (Some(_), Some(blob)) => blob.clone(),
        _ => return Outcome::None,
    };

    if msg.param(0) != Some("+") {
        warn!(
            "unexpected arg in AUTHENTICATE '{}'",
            msg.param(0).unwrap_or("")
        );
    }

    core.send(format!("AUTHENTICATE {}", blob));
    Outcome::None
}

/// SASL success.
fn handle_903(core: &mut Core, _msg: &Message, logon: bool) -> Outcome {
    if core.state.sasl_mech.is_none() {
        return Outcome::None;
    }
    if logon {
        core.send("CAP END");
    }
    Outcome::SaslOver
}

/// 902 (locked), 904 (auth failed), 905 (too long), 908 (bad mechanism).
fn handle_saslerr(core: &mut Core, msg: &Message, _logon: bool) -> Outcome {
    if core.state.sasl_mech.is_none() {
        return Outcome::None;
    }

    warn!("SASL auth failed ({})", msg.command());
    if core.state.sasl_must_have {
        return Outcome::Failed(Fail::Auth);
    }

    core.send("CAP END");
    Outcome::None
}

/// The server's go-ahead for STARTTLS.
fn handle_670(_core: &mut Core, _msg: &Message, _logon: bool) -> Outcome {
    Outcome::StartTls
}

/// STARTTLS failure.
fn handle_691(core: &mut Core, msg: &Message, _logon: bool) -> Outcome {
    error!("STARTTLS failed: '{}'", msg.param(1).unwrap_or(""));

    let must_have = core
        .caps
        .get("tls")
        .map(|c| c.must_have)
        .unwrap_or(false)
        || (core.state.starttls_first && core.state.starttls_must_have);
    if must_have {
        return Outcome::Failed(Fail::Tls);
    }

    warn!("continuing without TLS");
    if core.state.starttls_first {
        return Outcome::StarttlsFailed;
    }

    conclude_sasl_cap(core);
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
    fn plain_blob() {
        // base64("alice\0alice\0sesame")
        assert_eq!(sasl_plain_blob("alice", "sesame"), "YWxpY2UAYWxpY2UAc2VzYW1l");
    }

    #[test]
    fn ls_then_req() {
        let mut core = test_core();
        core.caps.want("sasl", true);
        core.caps.want("multi-prefix", false);

        let out = handle_cap(
            &mut core,
            &msg(":srv CAP * LS :multi-prefix sasl=PLAIN extras"),
            true,
        );
        assert_eq!(out, Outcome::None);
        assert_eq!(
            core.outq.pop_front().as_deref(),
            Some("CAP REQ :sasl multi-prefix")
        );
        assert_eq!(core.state.capreq.as_deref(), Some("sasl multi-prefix"));
    }

    #[test]
    fn multi_line_ls_accumulates() {
        let mut core = test_core();
        core.caps.want("sasl", false);
        core.caps.want("away-notify", false);

        let out = handle_cap(&mut core, &msg(":srv CAP * LS * :away-notify"), true);
        assert_eq!(out, Outcome::MoreCaps);
        assert!(core.outq.is_empty());

        let out = handle_cap(&mut core, &msg(":srv CAP * LS :sasl"), true);
        assert_eq!(out, Outcome::None);
        assert_eq!(
            core.outq.pop_front().as_deref(),
            Some("CAP REQ :sasl away-notify")
        );
    }

    #[test]
    fn missing_must_have_fails() {
        let mut core = test_core();
        core.caps.want("sasl", true);
        let out = handle_cap(&mut core, &msg(":srv CAP * LS :multi-prefix"), true);
        assert_eq!(out, Outcome::Failed(Fail::Cap));
    }

    #[test]
    fn nothing_offered_ends_negotiation() {
        let mut core = test_core();
        core.caps.want("away-notify", false);
        let out = handle_cap(&mut core, &msg(":srv CAP * LS :sasl"), true);
        assert_eq!(out, Outcome::None);
        assert_eq!(core.outq.pop_front().as_deref(), Some("CAP END"));
    }

    #[test]
    fn ack_mismatch_fails() {
        let mut core = test_core();
        core.caps.want("sasl", false);
        core.state.capreq = Some("sasl".to_owned());
        let out = handle_cap(&mut core, &msg(":srv CAP bob ACK :sasl extras"), true);
        assert_eq!(out, Outcome::Failed(Fail::Cap));
    }

    #[test]
    fn sasl_flow() {
        let mut core = test_core();
        core.state.sasl_mech = Some("PLAIN".to_owned());
        core.state.sasl_blob = Some(sasl_plain_blob("bob", "hunter2"));
        core.caps.want("sasl", true);
        core.state.capreq = Some("sasl".to_owned());
        core.caps.update_from_line("sasl", CapUpdate::Offered);

        let out = handle_cap(&mut core, &msg(":srv CAP bob ACK :sasl"), true);
        assert_eq!(out, Outcome::None);
        assert_eq!(core.outq.pop_front().as_deref(), Some("AUTHENTICATE PLAIN"));

        let out = handle_authenticate(&mut core, &msg("AUTHENTICATE +"), true);
        assert_eq!(out, Outcome::None);
        let sent = core.outq.pop_front().unwrap();
        assert_eq!(sent, format!("AUTHENTICATE {}", sasl_plain_blob("bob", "hunter2")));

        let out = handle_903(&mut core, &msg(":srv 903 bob :logged in"), true);
        assert_eq!(out, Outcome::SaslOver);
        assert_eq!(core.outq.pop_front().as_deref(), Some("CAP END"));
    }

    #[test]
    fn sasl_failure_respects_must_have() {
        let mut core = test_core();
        core.state.sasl_mech = Some("PLAIN".to_owned());
        core.state.sasl_blob = Some("blob".to_owned());

        core.state.sasl_must_have = false;
        let out = handle_saslerr(&mut core, &msg(":srv 904 bob :failed"), true);
        assert_eq!(out, Outcome::None);
        assert_eq!(core.outq.pop_front().as_deref(), Some("CAP END"));

        core.state.sasl_must_have = true;
        let out = handle_saslerr(&mut core, &msg(":srv 904 bob :failed"), true);
        assert_eq!(out, Outcome::Failed(Fail::Auth));
    }

    #[test]
    fn sasl_numerics_ignored_without_sasl() {
        let mut core = test_core();
        let out = handle_saslerr(&mut core, &msg(":srv 904 bob :failed"), true);
        assert_eq!(out, Outcome::None);
        assert!(core.outq.is_empty());
    }

    #[test]
    fn acked_tls_starts_the_upgrade() {
        let mut core = test_core();
        core.caps.want("tls", false);
        core.state.capreq = Some("tls".to_owned());
        core.caps.update_from_line("tls", CapUpdate::Offered);

        let out = handle_cap(&mut core, &msg(":srv CAP bob ACK :tls"), true);
        assert_eq!(out, Outcome::None);
        assert_eq!(core.outq.pop_front().as_deref(), Some("STARTTLS"));

        assert_eq!(
            handle_670(&mut core, &msg(":srv 670 bob :go ahead"), true),
            Outcome::StartTls
        );
    }

    #[test]
    fn starttls_failure_modes() {
        // Immediate mode, not must-have: resume in plaintext.
        let mut core = test_core();
        core.state.starttls_first = true;
        let out = handle_691(&mut core, &msg(":srv 691 bob :nope"), true);
        assert_eq!(out, Outcome::StarttlsFailed);

        // Immediate mode, must-have: fatal.
        core.state.starttls_must_have = true;
        let out = handle_691(&mut core, &msg(":srv 691 bob :nope"), true);
        assert_eq!(out, Outcome::Failed(Fail::Tls));

        // CAP mode, must-have tls: fatal.
        let mut core = test_core();
        core.caps.want("tls", true);
        let out = handle_691(&mut core, &msg(":srv 691 bob :nope"), true);
        assert_eq!(out, Outcome::Failed(Fail::Tls));

        // CAP mode, optional tls: conclude with CAP END.
        let mut core = test_core();
        core.caps.want("tls", false);
        let out = handle_691(&mut core, &msg(":srv 691 bob :nope"), true);
        assert_eq!(out, Outcome::None);
        assert_eq!(core.outq.pop_front().as_deref(), Some("CAP END"));
    }
}
