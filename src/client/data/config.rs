//! Client configuration.
//!
//! Every field is optional; the accessor methods apply the defaults.
//! Nothing here takes effect on a live connection — settings are picked
//! up by the next `connect`.

use std::collections::HashMap;
#[cfg(feature = "toml_config")]
use std::fs::File;
#[cfg(feature = "toml_config")]
use std::io::prelude::*;
#[cfg(feature = "toml_config")]
use std::io::{Error, ErrorKind, Result};
#[cfg(feature = "toml_config")]
use std::path::Path;

use crate::client::proxy::Proxy;

/// When (if at all) to upgrade the connection with STARTTLS.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StarttlsMode {
    /// No STARTTLS.
    #[default]
    Off,
    /// Negotiate the `tls` capability and upgrade on CAP ACK.
    Cap,
    /// Send `STARTTLS` immediately after the transport is up.
    Immediate,
}

impl StarttlsMode {
    /// The wire-level constant (0, 1 or 2).
    pub fn from_index(index: u8) -> Option<StarttlsMode> {
        match index {
            0 => Some(StarttlsMode::Off),
            1 => Some(StarttlsMode::Cap),
            2 => Some(StarttlsMode::Immediate),
            _ => None,
        }
    }
}

/// Configuration data.
#[derive(Clone, Default, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// The client's nickname.
    pub nickname: Option<String>,
    /// The client's username (USER).
    pub username: Option<String>,
    /// The client's real name (USER trailing argument).
    pub realname: Option<String>,
    /// The password to connect to the server.
    pub password: Option<String>,
    /// The server to connect to.
    pub server: Option<String>,
    /// The port to connect on.
    pub port: Option<u16>,
    /// Whether or not to use TLS from the first byte.
    pub use_ssl: Option<bool>,
    /// The text encoding used for this connection.
    pub encoding: Option<String>,
    /// The USER message mode flags.
    pub user_flags: Option<u8>,
    /// An optional proxy to connect through.
    pub proxy: Option<Proxy>,
    /// A local address to bind before connecting.
    pub local_host: Option<String>,
    /// The local port to bind, with `local_host`.
    pub local_port: Option<u16>,
    /// Soft (per-candidate-address) connect timeout in microseconds.
    /// Zero means no timeout.
    pub soft_timeout_us: Option<u64>,
    /// Hard (overall) connect timeout in microseconds. Zero means no
    /// timeout.
    pub hard_timeout_us: Option<u64>,
    /// The STARTTLS mode.
    pub starttls: Option<StarttlsMode>,
    /// Whether a failed STARTTLS aborts the connect.
    pub starttls_must_have: Option<bool>,
    /// The SASL mechanism (e.g. `PLAIN`).
    pub sasl_mech: Option<String>,
    /// The prepared AUTHENTICATE payload (base64 for PLAIN).
    pub sasl_blob: Option<String>,
    /// Whether a failed SASL authentication aborts the connect.
    pub sasl_must_have: Option<bool>,
    /// Log on as a service (SERVICE) instead of a user (NICK/USER).
    pub service: Option<bool>,
    /// Service distribution mask.
    pub service_dist: Option<String>,
    /// Service type.
    pub service_type: Option<i64>,
    /// Service info string.
    pub service_info: Option<String>,
    /// Whether to track channels and users.
    pub tracking: Option<bool>,
    /// Dumb mode: no built-in handlers, no logon conversation, only
    /// framing.
    pub dumb: Option<bool>,
    /// Channels to join after logon (used by the front-ends, not by the
    /// library core).
    pub channels: Option<Vec<String>>,
    /// A map of additional options.
    pub options: Option<HashMap<String, String>>,
}

impl Config {
    /// Loads a TOML configuration from the given path.
    #[cfg(feature = "toml_config")]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
        let mut file = File::open(path)?;
        let mut data = String::new();
        file.read_to_string(&mut data)?;
        toml::from_str(&data)
            .map_err(|e| Error::new(ErrorKind::InvalidInput, format!("invalid config: {}", e)))
    }

    /// The nickname, defaulting to `sirc`.
    pub fn nickname(&self) -> &str {
        self.nickname.as_deref().unwrap_or("sirc")
    }

    /// The username, defaulting to the nickname.
    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or_else(|| self.nickname())
    }

    /// The real name, defaulting to the nickname.
    pub fn realname(&self) -> &str {
        self.realname.as_deref().unwrap_or_else(|| self.nickname())
    }

    /// The server password; empty means none.
    pub fn password(&self) -> &str {
        self.password.as_deref().unwrap_or("")
    }

    /// The server host, defaulting to `localhost`.
    pub fn server(&self) -> &str {
        self.server.as_deref().unwrap_or("localhost")
    }

    /// The port, defaulting to 6667 (or 6697 with TLS).
    pub fn port(&self) -> u16 {
        self.port
            .filter(|&p| p != 0)
            .unwrap_or(if self.use_ssl() { 6697 } else { 6667 })
    }

    /// Whether to use TLS from the start.
    pub fn use_ssl(&self) -> bool {
        self.use_ssl.unwrap_or(false)
    }

    /// The connection's text encoding, defaulting to UTF-8.
    pub fn encoding(&self) -> &str {
        self.encoding.as_deref().unwrap_or("UTF-8")
    }

    /// The USER flags, defaulting to 0.
    pub fn user_flags(&self) -> u8 {
        self.user_flags.unwrap_or(0)
    }

    /// The configured proxy, if any.
    pub fn proxy(&self) -> Option<&Proxy> {
        self.proxy.as_ref()
    }

    /// The local bind address, if configured.
    pub fn local_addr(&self) -> Option<(String, u16)> {
        self.local_host
            .as_ref()
            .map(|h| (h.clone(), self.local_port.unwrap_or(0)))
    }

    /// The soft connect timeout, defaulting to 15 seconds.
    pub fn soft_timeout_us(&self) -> u64 {
        self.soft_timeout_us.unwrap_or(15_000_000)
    }

    /// The hard connect timeout, defaulting to 120 seconds.
    pub fn hard_timeout_us(&self) -> u64 {
        self.hard_timeout_us.unwrap_or(120_000_000)
    }

    /// The STARTTLS mode, defaulting to off.
    pub fn starttls(&self) -> StarttlsMode {
        self.starttls.unwrap_or_default()
    }

    /// Whether STARTTLS failure is fatal.
    pub fn starttls_must_have(&self) -> bool {
        self.starttls_must_have.unwrap_or(false)
    }

    /// The SASL mechanism, if SASL is configured.
    pub fn sasl_mech(&self) -> Option<&str> {
        self.sasl_mech.as_deref()
    }

    /// The prepared SASL payload.
    pub fn sasl_blob(&self) -> Option<&str> {
        self.sasl_blob.as_deref()
    }

    /// Whether SASL failure is fatal.
    pub fn sasl_must_have(&self) -> bool {
        self.sasl_must_have.unwrap_or(false)
    }

    /// Whether to log on as a service.
    pub fn service_connect(&self) -> bool {
        self.service.unwrap_or(false)
    }

    /// The service distribution mask, defaulting to `*`.
    pub fn service_dist(&self) -> &str {
        self.service_dist.as_deref().unwrap_or("*")
    }

    /// The service type, defaulting to 0.
    pub fn service_type(&self) -> i64 {
        self.service_type.unwrap_or(0)
    }

    /// The service info string.
    pub fn service_info(&self) -> &str {
        self.service_info.as_deref().unwrap_or("sirc service")
    }

    /// Whether channel/user tracking is wanted.
    pub fn tracking(&self) -> bool {
        self.tracking.unwrap_or(false)
    }

    /// Whether dumb mode is on.
    pub fn dumb(&self) -> bool {
        self.dumb.unwrap_or(false)
    }

    /// The channels to join upon connection.
    pub fn channels(&self) -> Vec<&str> {
        self.channels
            .as_ref()
            .map(|v| v.iter().map(|s| &s[..]).collect())
            .unwrap_or_default()
    }

    /// Looks up a string in the options map.
    pub fn get_option(&self, option: &str) -> Option<&str> {
        self.options
            .as_ref()
            .and_then(|o| o.get(option))
            .map(|s| &s[..])
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.nickname(), "sirc");
        assert_eq!(cfg.username(), "sirc");
        assert_eq!(cfg.server(), "localhost");
        assert_eq!(cfg.port(), 6667);
        assert_eq!(cfg.encoding(), "UTF-8");
        assert_eq!(cfg.soft_timeout_us(), 15_000_000);
        assert_eq!(cfg.hard_timeout_us(), 120_000_000);
        assert!(!cfg.use_ssl());
        assert!(!cfg.tracking());
        assert!(!cfg.dumb());
        assert_eq!(cfg.starttls(), StarttlsMode::Off);
    }

    #[test]
    fn ssl_changes_default_port() {
        let cfg = Config {
            use_ssl: Some(true),
            ..Config::default()
        };
        assert_eq!(cfg.port(), 6697);

        let cfg = Config {
            use_ssl: Some(true),
            port: Some(7000),
            ..Config::default()
        };
        assert_eq!(cfg.port(), 7000);
    }

    #[test]
    fn port_zero_means_default() {
        let cfg = Config {
            port: Some(0),
            ..Config::default()
        };
        assert_eq!(cfg.port(), 6667);
    }

    #[test]
    fn username_falls_back_to_nickname() {
        let cfg = Config {
            nickname: Some("bob".to_owned()),
            ..Config::default()
        };
        assert_eq!(cfg.username(), "bob");
        assert_eq!(cfg.realname(), "bob");
    }
}
