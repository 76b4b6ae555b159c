//! Port traits the domain calls out through.

pub mod config_port;
pub mod currency_port;
pub mod identifier_port;
