//! Command trait

use crate::auth::Permission;
use crate::context::CommandContext;
use crate::errors::Result;

/// A unit of business logic executed inside a [`CommandContext`]
///
/// Inputs are fixed at construction and `execute` takes `&self`, so the retry
/// interceptor can run the same command again from scratch against a fresh
/// context. Commands never write to storage directly: they read through
/// context sessions and register mutations and audit entries, which the
/// context flushes atomically when the outermost invocation succeeds.
pub trait Command {
    type Output;

    /// Name used as the `op` field in logs and in `Conflict` errors
    fn name(&self) -> &'static str;

    /// Permission checked by the authorization interceptor; `None` skips the check
    fn permission(&self) -> Option<Permission> {
        None
    }

    /// # Errors
    ///
    /// Any error aborts the invocation tree; pending operations are discarded.
    fn execute(&self, ctx: &mut CommandContext) -> Result<Self::Output>;
}
