//! Credential commands

use cmdex_core_types::Sensitive;

use crate::auth::{Permission, Resource};
use crate::command::Command;
use crate::context::CommandContext;
use crate::errors::{EngineError, Result};
use crate::model::{AuditEntry, Credential, OperationType, User};
use crate::session::Mutation;

/// Replace a user's password
///
/// When the executor has a password policy the candidate must comply before
/// anything is registered; otherwise the command fails with
/// `PolicyViolation` carrying the full report. The audit record names the
/// `password` property and never carries the value.
#[derive(Debug, Clone)]
pub struct SetUserPassword {
    user_id: String,
    password: Sensitive<String>,
}

impl SetUserPassword {
    pub const PROPERTY: &'static str = "password";

    pub fn new(user_id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            password: Sensitive::new(password.into()),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl Command for SetUserPassword {
    type Output = ();

    fn name(&self) -> &'static str {
        "SetUserPassword"
    }

    fn permission(&self) -> Option<Permission> {
        Some(Permission::update(Resource::User, self.user_id.clone()))
    }

    fn execute(&self, ctx: &mut CommandContext) -> Result<()> {
        if self.user_id.is_empty() {
            return Err(EngineError::validation("userId", "must not be empty"));
        }
        if let Some(policy) = ctx.password_policy() {
            let report = policy.evaluate(self.password.expose());
            if !report.compliant {
                return Err(EngineError::PolicyViolation { report });
            }
        }

        let mut user = ctx
            .user(&self.user_id)?
            .ok_or_else(|| EngineError::not_found(User::ENTITY_TYPE, self.user_id.as_str()))?;
        user.credential = Some(Credential::derive(&self.password)?);
        ctx.register(Mutation::UpdateUser(user));

        ctx.log_operation(AuditEntry {
            operation_type: OperationType::Update,
            entity_type: User::ENTITY_TYPE.to_string(),
            entity_id: self.user_id.clone(),
            property: Self::PROPERTY.to_string(),
            old_value: None,
            new_value: None,
        });
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let cmd = SetUserPassword::new("alice", "Str0ng!Passw0rd");
        let debug = format!("{cmd:?}");
        assert!(!debug.contains("Str0ng"));
        assert!(debug.contains(cmdex_core_types::REDACTED));
    }

    #[test]
    fn test_declares_user_update_permission() {
        let cmd = SetUserPassword::new("alice", "x");
        assert_eq!(
            cmd.permission(),
            Some(Permission::update(Resource::User, "alice"))
        );
    }
}
