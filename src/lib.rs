//! tradeimport: brokerage CSV importer and trade reconstruction.
//!
//! Hexagonal architecture: parsing and reconciliation in [`domain`], the
//! collaborator traits in [`ports`], concrete implementations in [`adapters`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod ports;
