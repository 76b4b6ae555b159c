//! Core domain types and reconciliation logic.

pub mod config_validation;
pub mod duplicate;
pub mod error;
pub mod format;
pub mod grouping;
pub mod import;
pub mod instrument;
pub mod parsers;
pub mod position_tracker;
pub mod trade;
pub mod transaction;
