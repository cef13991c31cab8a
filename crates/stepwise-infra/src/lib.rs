//! Infrastructure layer for Stepwise.
//!
//! Contains implementations of the ports defined in `stepwise-core`: the
//! SQLite checkpoint store, plus loading of `config.toml` from the data
//! directory.

pub mod config;
pub mod sqlite;
