//! cmdex Core - command execution core
//!
//! This crate provides the machinery every state mutation runs through:
//! - Command trait and executor with a configurable interceptor chain
//!   (retry on conflict, context management, authorization, transaction)
//! - Command context with lazily opened sessions and an atomic pending batch
//! - Identity-link command family with mandatory audit records
//! - Password policy engine and the `SetUserPassword` credential command
//! - Session registry boundary plus an in-memory reference implementation
//! - Error facility, structured logging facility and TOML configuration

pub mod auth;
pub mod command;
pub mod commands;
pub mod config;
pub mod context;
pub mod errors;
pub mod executor;
pub mod interceptor;
pub mod logging_facility;
pub mod model;
pub mod pwpolicy;
pub mod session;

// Logging macros refer to schema constants through this path
pub use cmdex_core_types;

// Re-export commonly used types
pub use auth::{Authentication, AuthorizationCheck, Permission};
pub use command::Command;
pub use commands::{IdentityLinkCommand, LinkAction, LinkSpec, SetUserPassword};
pub use config::EngineConfig;
pub use context::CommandContext;
pub use errors::{EngineError, ExError, ExErrorKind, Result};
pub use executor::{CommandExecutor, CommandExecutorBuilder};
pub use interceptor::InterceptorKind;
pub use pwpolicy::{PasswordPolicy, PolicyReport, PolicyRule};
pub use session::{InMemoryRegistry, SessionKey, SessionRegistry};
