//! Parsing of channel MODE change strings against the 005 tables.

use crate::isupport::{ChanModeClass, Isupport};

/// One parsed mode change, e.g. `+o alice` or `-t`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeChange {
    /// true for `+`, false for `-`.
    pub set: bool,
    /// The mode letter.
    pub mode: char,
    /// The consumed argument, if this mode takes one. A missing argument
    /// is substituted with `"*"`.
    pub arg: Option<String>,
}

/// Splits a MODE parameter list (`+ov-b alice bob mask`) into individual
/// changes, consuming arguments according to the `CHANMODES` classes:
/// class A and B modes always take one, class C only when setting, class
/// D never, and member-prefix modes always do. Unknown mode letters are
/// skipped.
pub fn parse_mode_changes(isupport: &Isupport, modes: &str, args: &[&str]) -> Vec<ModeChange> {
    let mut out = Vec::new();
    let mut next_arg = 0;
    let mut set = true;

    let mut take_arg = |next: &mut usize| -> String {
        let arg = args.get(*next).copied().unwrap_or("*");
        *next += 1;
        arg.to_owned()
    };

    for c in modes.chars() {
        match c {
            '+' => set = true,
            '-' => set = false,
            _ => {
                let needs_arg = match isupport.classify_chanmode(c) {
                    Some(ChanModeClass::A) | Some(ChanModeClass::B) => true,
                    Some(ChanModeClass::C) => set,
                    Some(ChanModeClass::D) => false,
                    None => {
                        if !isupport.is_prefix_mode(c) {
                            continue;
                        }
                        true
                    }
                };
                out.push(ModeChange {
                    set,
                    mode: c,
                    arg: needs_arg.then(|| take_arg(&mut next_arg)),
                });
            }
        }
    }

    out
}

#[cfg(test)]
mod test {
    use super::*;

    fn isupport() -> Isupport {
        let mut i = Isupport::new();
        i.apply_token("PREFIX=(ov)@+").unwrap();
        i.apply_token("CHANMODES=b,k,l,psitnm").unwrap();
        i
    }

    #[test]
    fn prefix_modes_take_args() {
        let changes = parse_mode_changes(&isupport(), "+ov", &["alice", "bob"]);
        assert_eq!(
            changes,
            vec![
                ModeChange {
                    set: true,
                    mode: 'o',
                    arg: Some("alice".into())
                },
                ModeChange {
                    set: true,
                    mode: 'v',
                    arg: Some("bob".into())
                },
            ]
        );
    }

    #[test]
    fn class_rules() {
        let i = isupport();
        // +l takes an arg when set...
        let changes = parse_mode_changes(&i, "+l", &["42"]);
        assert_eq!(changes[0].arg.as_deref(), Some("42"));
        // ...but not when unset.
        let changes = parse_mode_changes(&i, "-l", &[]);
        assert_eq!(changes[0].arg, None);
        // Class D never takes one.
        let changes = parse_mode_changes(&i, "+nt", &["stray"]);
        assert!(changes.iter().all(|c| c.arg.is_none()));
        // Class A takes one even when unset.
        let changes = parse_mode_changes(&i, "-b", &["*!*@spam"]);
        assert_eq!(changes[0].arg.as_deref(), Some("*!*@spam"));
    }

    #[test]
    fn mixed_signs() {
        let changes = parse_mode_changes(&isupport(), "+o-v+t", &["alice", "bob"]);
        assert_eq!(changes.len(), 3);
        assert!(changes[0].set && changes[0].mode == 'o');
        assert!(!changes[1].set && changes[1].mode == 'v');
        assert_eq!(changes[1].arg.as_deref(), Some("bob"));
        assert!(changes[2].set && changes[2].mode == 't');
    }

    #[test]
    fn missing_args_become_stars() {
        let changes = parse_mode_changes(&isupport(), "+ko", &[]);
        assert_eq!(changes[0].arg.as_deref(), Some("*"));
        assert_eq!(changes[1].arg.as_deref(), Some("*"));
    }

    #[test]
    fn unknown_letters_skipped() {
        let changes = parse_mode_changes(&isupport(), "+Xt", &[]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].mode, 't');
    }
}
