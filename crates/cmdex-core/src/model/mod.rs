//! Entities touched by the command families

pub mod audit;
pub mod identity_link;
pub mod task;
pub mod user;

pub use audit::{AuditEntry, AuditRecord, OperationType};
pub use identity_link::{Cardinality, IdentityLink, LinkType, Principal, PrincipalKind};
pub use task::Task;
pub use user::{Credential, User};
