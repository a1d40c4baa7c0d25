//! Command executor
//!
//! Entry point for callers outside any command. Owns the composed interceptor
//! chain; every `execute` call starts a new invocation tree.

use std::sync::Arc;

use cmdex_core_types::RequestContext;

use crate::auth::{AllowAllAuthorization, AuthorizationCheck, Authentication};
use crate::command::Command;
use crate::config::EngineConfig;
use crate::errors::Result;
use crate::interceptor::{InterceptorChain, InterceptorKind};
use crate::pwpolicy::PasswordPolicy;
use crate::session::SessionRegistry;

/// Default number of retries after a concurrency conflict
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct CommandExecutor {
    chain: Arc<InterceptorChain>,
}

impl CommandExecutor {
    pub fn builder(registry: Arc<dyn SessionRegistry>) -> CommandExecutorBuilder {
        CommandExecutorBuilder {
            registry,
            interceptors: InterceptorKind::DEFAULT_ORDER.to_vec(),
            max_retries: DEFAULT_MAX_RETRIES,
            authorization: Arc::new(AllowAllAuthorization),
            password_policy: None,
        }
    }

    /// Execute `command` as the outermost invocation of a new tree
    ///
    /// # Errors
    ///
    /// The command's error, or `Conflict` once retries are exhausted. On any
    /// error nothing the tree registered is persisted.
    pub fn execute<C: Command>(&self, authentication: &Authentication, command: &C) -> Result<C::Output> {
        self.execute_with_request(RequestContext::new(), authentication, command)
    }

    /// Like [`execute`](Self::execute), with caller-supplied correlation ids
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub fn execute_with_request<C: Command>(
        &self,
        request: RequestContext,
        authentication: &Authentication,
        command: &C,
    ) -> Result<C::Output> {
        self.chain.invoke(None, authentication, &request, command)
    }

    pub fn interceptors(&self) -> &[InterceptorKind] {
        self.chain.kinds()
    }

    pub fn password_policy(&self) -> Option<Arc<PasswordPolicy>> {
        self.chain.password_policy()
    }
}

pub struct CommandExecutorBuilder {
    registry: Arc<dyn SessionRegistry>,
    interceptors: Vec<InterceptorKind>,
    max_retries: u32,
    authorization: Arc<dyn AuthorizationCheck>,
    password_policy: Option<Arc<PasswordPolicy>>,
}

impl CommandExecutorBuilder {
    /// Take interceptor order, retry bound and password policy from `config`
    pub fn config(mut self, config: &EngineConfig) -> Self {
        self.interceptors = config.executor.interceptors.clone();
        self.max_retries = config.executor.max_retries;
        self.password_policy = config.password_policy.to_policy().map(Arc::new);
        self
    }

    pub fn interceptors(mut self, kinds: impl Into<Vec<InterceptorKind>>) -> Self {
        self.interceptors = kinds.into();
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn authorization(mut self, check: Arc<dyn AuthorizationCheck>) -> Self {
        self.authorization = check;
        self
    }

    pub fn password_policy(mut self, policy: PasswordPolicy) -> Self {
        self.password_policy = Some(Arc::new(policy));
        self
    }

    /// # Errors
    ///
    /// `InvalidConfiguration` for an invalid interceptor order.
    pub fn build(self) -> Result<CommandExecutor> {
        let chain = InterceptorChain::build(
            &self.interceptors,
            self.max_retries,
            self.authorization,
            self.registry,
            self.password_policy,
        )?;
        tracing::debug!(
            component = module_path!(),
            interceptors = ?chain.kinds(),
            max_retries = self.max_retries,
            "command executor built"
        );
        Ok(CommandExecutor {
            chain: Arc::new(chain),
        })
    }
}
