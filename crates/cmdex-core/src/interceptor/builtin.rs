//! Built-in interceptors

use std::sync::Arc;

use cmdex_core_types::schema::EVENT_RETRY;

use super::{interceptor, Interceptor, Invocation};
use crate::auth::AuthorizationCheck;
use crate::context::CommandContext;
use crate::errors::EngineError;

/// Re-run the rest of the chain on `ConcurrencyConflict`
///
/// Only outermost invocations are retried, and every attempt starts from a
/// fresh context, so commands re-read state. After `max_retries` retries the
/// last conflict is wrapped in `Conflict`.
pub fn retry_on_conflict(max_retries: u32) -> Interceptor {
    interceptor(move |inv, next| {
        if inv.nested {
            return next(inv);
        }
        let mut attempt: u32 = 1;
        loop {
            match next(&mut *inv) {
                Err(err) if err.is_concurrency_conflict() => {
                    if attempt > max_retries {
                        return Err(EngineError::Conflict {
                            command: inv.command.to_string(),
                            attempts: attempt,
                            cause: Box::new(err),
                        });
                    }
                    tracing::warn!(
                        component = module_path!(),
                        op = inv.command,
                        event = EVENT_RETRY,
                        request_id = %inv.request.request_id,
                        attempt,
                        max_retries,
                        error = %err,
                    );
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    })
}

/// Create the context for outermost invocations and reuse it for nested ones
///
/// A new context is closed when the rest of the chain returns: remaining
/// pending operations are flushed on success and discarded on failure. A
/// reused context has its depth raised for the nested call, and a nested
/// failure marks it rollback-only.
pub fn context_management() -> Interceptor {
    interceptor(|inv, next| {
        if inv.context.is_some() {
            inv.context_mut()?.enter();
            let outcome = next(&mut *inv);
            let ctx = inv.context_mut()?;
            ctx.exit();
            if let Err(err) = &outcome {
                ctx.mark_rollback_only(err.clone());
            }
            return outcome;
        }

        let mut ctx = CommandContext::new(
            inv.chain.clone(),
            inv.authentication.clone(),
            inv.request.clone(),
        );
        let outcome = {
            let mut scoped = Invocation {
                command: inv.command,
                nested: inv.nested,
                permission: inv.permission.clone(),
                authentication: inv.authentication,
                request: inv.request,
                chain: inv.chain,
                context: Some(&mut ctx),
            };
            next(&mut scoped)
        };
        ctx.close(outcome)
    })
}

/// Commit boundary of the outermost invocation
///
/// Flushes the pending batch as soon as the command returns successfully and
/// discards it on failure. Nested invocations pass straight through.
pub fn transaction() -> Interceptor {
    interceptor(|inv, next| {
        let outcome = next(&mut *inv);
        let ctx = inv.context_mut()?;
        if !ctx.is_outermost() {
            return outcome;
        }
        match outcome {
            Ok(()) => ctx.flush(),
            Err(err) => {
                ctx.discard();
                Err(err)
            }
        }
    })
}

/// Reject before execution when the caller lacks the command's permission
///
/// Commands without a declared permission and anonymous invocations are not
/// checked.
pub fn authorization(check: Arc<dyn AuthorizationCheck>) -> Interceptor {
    interceptor(move |inv, next| {
        if let (Some(permission), Some(user_id)) =
            (inv.permission.as_ref(), inv.authentication.user_id())
        {
            if !check.is_authorized(inv.authentication, permission) {
                tracing::warn!(
                    component = module_path!(),
                    op = inv.command,
                    request_id = %inv.request.request_id,
                    user_id,
                    permission = %permission,
                    "authorization denied"
                );
                return Err(EngineError::Unauthorized {
                    user_id: user_id.to_string(),
                    permission: permission.clone(),
                });
            }
        }
        next(inv)
    })
}
