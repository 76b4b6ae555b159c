//! Concrete adapter implementations for ports.

pub mod file_config_adapter;
pub mod json_state_adapter;
pub mod static_identifier_adapter;
pub mod static_rate_adapter;
