//! Command families

pub mod credential;
pub mod identity_link;

pub use credential::SetUserPassword;
pub use identity_link::{audit_entry, IdentityLinkCommand, LinkAction, LinkChange, LinkSpec};
