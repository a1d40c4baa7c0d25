//! Migration framework
//!
//! Embedded SQL migrations applied once each, in order, with their SHA-256
//! checksum recorded and verified on every later run.

mod checksums;
mod embedded;
mod runner;

pub use runner::apply_migrations;
