//! Interceptor chain
//!
//! Interceptors are first-class closures wrapping the rest of the chain. The
//! chain is assembled once from an ordered [`InterceptorKind`] list, validated
//! at build time, and composed by recursion over the slice on every
//! invocation. The innermost step executes the command against the context
//! installed by the context-management interceptor.

pub mod builtin;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use cmdex_core_types::schema::EVENT_START;
use cmdex_core_types::RequestContext;
use serde::{Deserialize, Serialize};

use crate::auth::{AuthorizationCheck, Authentication, Permission};
use crate::command::Command;
use crate::context::CommandContext;
use crate::errors::{EngineError, Result};
use crate::pwpolicy::PasswordPolicy;
use crate::session::SessionRegistry;
use crate::{log_op_end, log_op_error, log_op_start};

pub use builtin::{authorization, context_management, retry_on_conflict, transaction};

/// Continuation handed to an interceptor: the rest of the chain
pub type Next<'n> = &'n mut dyn FnMut(&mut Invocation<'_>) -> Result<()>;

/// One step of the chain
///
/// An interceptor may run code before and after calling `next`, call it more
/// than once (retry) or not at all (rejection).
pub type Interceptor = Arc<dyn Fn(&mut Invocation<'_>, Next<'_>) -> Result<()> + Send + Sync>;

/// Wrap a closure as an [`Interceptor`]
pub fn interceptor<F>(f: F) -> Interceptor
where
    F: Fn(&mut Invocation<'_>, Next<'_>) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// What a single pass through the chain knows about the command
///
/// `context` is `None` until the context-management interceptor installs one,
/// and is `Some` from the start for nested invocations.
pub struct Invocation<'a> {
    command: &'static str,
    nested: bool,
    permission: Option<Permission>,
    authentication: &'a Authentication,
    request: &'a RequestContext,
    chain: &'a Arc<InterceptorChain>,
    context: Option<&'a mut CommandContext>,
}

impl Invocation<'_> {
    pub fn command(&self) -> &'static str {
        self.command
    }

    pub fn permission(&self) -> Option<&Permission> {
        self.permission.as_ref()
    }

    pub fn authentication(&self) -> &Authentication {
        self.authentication
    }

    pub fn request(&self) -> &RequestContext {
        self.request
    }

    /// Whether this invocation already runs inside an existing context
    pub fn is_nested(&self) -> bool {
        self.nested
    }

    pub fn context(&self) -> Option<&CommandContext> {
        self.context.as_deref()
    }

    /// # Errors
    ///
    /// `Internal` when no context-management interceptor ran before this point.
    pub fn context_mut(&mut self) -> Result<&mut CommandContext> {
        self.context
            .as_deref_mut()
            .ok_or_else(|| EngineError::internal("no command context installed"))
    }
}

/// Built-in interceptor kinds, as named in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterceptorKind {
    RetryOnConflict,
    ContextManagement,
    Authorization,
    Transaction,
}

impl InterceptorKind {
    pub const DEFAULT_ORDER: [InterceptorKind; 4] = [
        InterceptorKind::RetryOnConflict,
        InterceptorKind::ContextManagement,
        InterceptorKind::Authorization,
        InterceptorKind::Transaction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InterceptorKind::RetryOnConflict => "retry_on_conflict",
            InterceptorKind::ContextManagement => "context_management",
            InterceptorKind::Authorization => "authorization",
            InterceptorKind::Transaction => "transaction",
        }
    }
}

impl fmt::Display for InterceptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check an interceptor order before composing it
///
/// # Errors
///
/// `InvalidConfiguration` when context management is missing or repeated,
/// any kind appears twice, retry is placed inside the context, or the
/// transaction boundary is placed outside it.
pub fn validate_order(kinds: &[InterceptorKind]) -> Result<()> {
    let invalid = |reason: String| Err(EngineError::InvalidConfiguration { reason });
    let position = |kind: InterceptorKind| kinds.iter().position(|k| *k == kind);

    for (i, kind) in kinds.iter().enumerate() {
        if kinds[..i].contains(kind) {
            return invalid(format!("interceptor {kind} configured more than once"));
        }
    }
    let Some(context) = position(InterceptorKind::ContextManagement) else {
        return invalid("context_management interceptor is required".to_string());
    };
    if position(InterceptorKind::RetryOnConflict).is_some_and(|retry| retry > context) {
        return invalid("retry_on_conflict must come before context_management".to_string());
    }
    if position(InterceptorKind::Transaction).is_some_and(|tx| tx < context) {
        return invalid("transaction must come after context_management".to_string());
    }
    Ok(())
}

/// The composed chain shared by an executor and every context it creates
pub struct InterceptorChain {
    kinds: Vec<InterceptorKind>,
    interceptors: Vec<Interceptor>,
    registry: Arc<dyn SessionRegistry>,
    password_policy: Option<Arc<PasswordPolicy>>,
}

impl InterceptorChain {
    /// Compose the built-in interceptors in `kinds` order
    ///
    /// # Errors
    ///
    /// See [`validate_order`].
    pub fn build(
        kinds: &[InterceptorKind],
        max_retries: u32,
        authorization_check: Arc<dyn AuthorizationCheck>,
        registry: Arc<dyn SessionRegistry>,
        password_policy: Option<Arc<PasswordPolicy>>,
    ) -> Result<Self> {
        validate_order(kinds)?;
        let interceptors = kinds
            .iter()
            .map(|kind| match kind {
                InterceptorKind::RetryOnConflict => retry_on_conflict(max_retries),
                InterceptorKind::ContextManagement => context_management(),
                InterceptorKind::Authorization => authorization(authorization_check.clone()),
                InterceptorKind::Transaction => transaction(),
            })
            .collect();
        Ok(Self {
            kinds: kinds.to_vec(),
            interceptors,
            registry,
            password_policy,
        })
    }

    pub fn kinds(&self) -> &[InterceptorKind] {
        &self.kinds
    }

    pub(crate) fn registry(&self) -> &Arc<dyn SessionRegistry> {
        &self.registry
    }

    pub(crate) fn password_policy(&self) -> Option<Arc<PasswordPolicy>> {
        self.password_policy.clone()
    }

    /// Run `command` through the whole chain
    ///
    /// `context` is `None` for an outermost invocation and the caller's
    /// context for a nested one.
    pub(crate) fn invoke<C: Command>(
        self: &Arc<Self>,
        context: Option<&mut CommandContext>,
        authentication: &Authentication,
        request: &RequestContext,
        command: &C,
    ) -> Result<C::Output> {
        let name = command.name();
        let depth = context.as_ref().map_or(0, |ctx| ctx.depth() + 1);
        let outermost = context.is_none();
        let start = Instant::now();
        if outermost {
            log_op_start!(name, request_id = %request.request_id);
        } else {
            tracing::debug!(
                component = module_path!(),
                op = name,
                event = EVENT_START,
                request_id = %request.request_id,
                depth,
            );
        }

        let mut output: Option<C::Output> = None;
        let mut body = |ctx: &mut CommandContext| -> Result<()> {
            output = Some(command.execute(ctx)?);
            Ok(())
        };
        let mut invocation = Invocation {
            command: name,
            nested: !outermost,
            permission: command.permission(),
            authentication,
            request,
            chain: self,
            context,
        };
        let result = proceed(&self.interceptors, &mut invocation, &mut body)
            .and_then(|()| output.ok_or_else(|| EngineError::internal("command produced no output")));

        if outermost {
            let duration_ms = start.elapsed().as_millis() as u64;
            match &result {
                Ok(_) => {
                    log_op_end!(name, duration_ms = duration_ms, request_id = %request.request_id);
                }
                Err(err) => {
                    log_op_error!(
                        name,
                        err.clone(),
                        duration_ms = duration_ms,
                        request_id = %request.request_id
                    );
                }
            }
        }
        result
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("kinds", &self.kinds)
            .field("password_policy", &self.password_policy)
            .finish_non_exhaustive()
    }
}

fn proceed(
    interceptors: &[Interceptor],
    invocation: &mut Invocation<'_>,
    body: &mut dyn FnMut(&mut CommandContext) -> Result<()>,
) -> Result<()> {
    match interceptors.split_first() {
        Some((first, rest)) => first(invocation, &mut |inv: &mut Invocation<'_>| {
            proceed(rest, inv, &mut *body)
        }),
        None => body(invocation.context_mut()?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use InterceptorKind::*;

    #[test]
    fn test_default_order_is_valid() {
        assert!(validate_order(&InterceptorKind::DEFAULT_ORDER).is_ok());
        assert!(validate_order(&[ContextManagement]).is_ok());
    }

    #[test]
    fn test_context_management_is_required() {
        let err = validate_order(&[RetryOnConflict, Transaction]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_duplicates_are_rejected() {
        assert!(validate_order(&[ContextManagement, ContextManagement]).is_err());
        assert!(validate_order(&[ContextManagement, Authorization, Authorization]).is_err());
    }

    #[test]
    fn test_retry_inside_context_is_rejected() {
        assert!(validate_order(&[ContextManagement, RetryOnConflict]).is_err());
    }

    #[test]
    fn test_transaction_outside_context_is_rejected() {
        assert!(validate_order(&[Transaction, ContextManagement]).is_err());
    }

    #[test]
    fn test_kind_names_round_trip_through_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            interceptors: Vec<InterceptorKind>,
        }
        let w: Wrapper =
            toml::from_str(r#"interceptors = ["retry_on_conflict", "context_management"]"#)
                .unwrap();
        assert_eq!(w.interceptors, vec![RetryOnConflict, ContextManagement]);
        assert_eq!(Transaction.to_string(), "transaction");
    }
}
