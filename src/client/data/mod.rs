//! Data related to IRC client configuration.

pub use crate::client::data::config::{Config, StarttlsMode};

pub mod config;
