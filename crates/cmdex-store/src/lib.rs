//! cmdex-store - SQLite session layer for the command executor
//!
//! Provides:
//! - SQLite schema with an embedded, checksummed migration runner
//! - [`SqliteRegistry`], a `SessionRegistry` whose units of work are SQLite
//!   transactions with revision-checked updates

pub mod db;
pub mod errors;
pub mod migrations;
pub mod registry;

mod rows;

pub use errors::Result;
pub use registry::SqliteRegistry;
