//! IRCv3 capability negotiation state.

/// One capability the client wants, and what the server has said about
/// it so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    /// The capability name, e.g. `sasl` or `multi-prefix`.
    pub name: String,
    /// Whether negotiation must fail if the server does not provide it.
    pub must_have: bool,
    /// Whether the server listed it in CAP LS.
    pub offered: bool,
    /// Whether the server ACKed it.
    pub enabled: bool,
    /// Per-capability data from `name=data` in CAP LS (302).
    pub data: Option<String>,
}

/// Which half of the negotiation a caps line updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapUpdate {
    /// The line came from CAP LS.
    Offered,
    /// The line came from CAP ACK.
    Enabled,
}

/// The set of capabilities the client asks for, updated as the server's
/// CAP responses arrive.
#[derive(Debug, Clone, Default)]
pub struct CapSet {
    caps: Vec<Capability>,
}

impl CapSet {
    pub fn new() -> CapSet {
        CapSet::default()
    }

    /// Adds `name` to the wanted set (or updates its must-have flag).
    pub fn want(&mut self, name: &str, must_have: bool) {
        if let Some(cap) = self.caps.iter_mut().find(|c| c.name == name) {
            cap.must_have = must_have;
            return;
        }
        self.caps.push(Capability {
            name: name.to_owned(),
            must_have,
            offered: false,
            enabled: false,
            data: None,
        });
    }

    /// Removes `name` from the wanted set.
    pub fn clear(&mut self, name: &str) {
        self.caps.retain(|c| c.name != name);
    }

    /// Forgets everything the server said; the wanted set survives.
    /// Called at the start of every connect.
    pub fn reset_negotiation(&mut self) {
        for cap in self.caps.iter_mut() {
            cap.offered = false;
            cap.enabled = false;
            cap.data = None;
        }
    }

    /// Applies one space-separated caps line (from CAP LS or CAP ACK).
    /// Tokens have the form `name` or `name=data`; caps we never asked
    /// for are ignored.
    pub fn update_from_line(&mut self, line: &str, update: CapUpdate) {
        for token in line.split(' ').filter(|t| !t.is_empty()) {
            let (name, data) = match token.find('=') {
                Some(eq) => (&token[..eq], Some(&token[eq + 1..])),
                None => (token, None),
            };
            if let Some(cap) = self.caps.iter_mut().find(|c| c.name == name) {
                match update {
                    CapUpdate::Offered => cap.offered = true,
                    CapUpdate::Enabled => cap.enabled = true,
                }
                if let Some(data) = data {
                    cap.data = Some(data.to_owned());
                }
            }
        }
    }

    /// The first must-have capability the server failed to offer (or
    /// enable), if any.
    pub fn missing_must_have(&self, update: CapUpdate) -> Option<&str> {
        self.caps
            .iter()
            .find(|c| {
                c.must_have
                    && match update {
                        CapUpdate::Offered => !c.offered,
                        CapUpdate::Enabled => !c.enabled,
                    }
            })
            .map(|c| c.name.as_str())
    }

    /// The space-joined list of wanted-and-offered capability names for
    /// `CAP REQ`, or `None` when nothing was offered.
    pub fn request_line(&self) -> Option<String> {
        let list = self
            .caps
            .iter()
            .filter(|c| c.offered)
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        if list.is_empty() {
            None
        } else {
            Some(list)
        }
    }

    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.caps.iter().find(|c| c.name == name)
    }

    /// Whether the server ACKed `name`.
    pub fn enabled(&self, name: &str) -> bool {
        self.get(name).map(|c| c.enabled).unwrap_or(false)
    }

    /// Whether anything at all is wanted.
    pub fn is_empty(&self) -> bool {
        self.caps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.caps.iter()
    }
}
