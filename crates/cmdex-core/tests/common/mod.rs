#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use cmdex_core::model::{Task, User};
use cmdex_core::{
    Command, CommandContext, CommandExecutor, CommandExecutorBuilder, EngineError,
    IdentityLinkCommand, InMemoryRegistry, Result,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub const TASK_ID: &str = "T1";
pub const USER_ID: &str = "alice";

/// Registry seeded with task `T1` and user `alice`
pub fn seeded_registry() -> InMemoryRegistry {
    let registry = InMemoryRegistry::new();
    registry.insert_task(Task::new(TASK_ID, "Review contract")).unwrap();
    registry.insert_user(User::new(USER_ID)).unwrap();
    registry
}

pub fn builder(registry: &InMemoryRegistry) -> CommandExecutorBuilder {
    CommandExecutor::builder(Arc::new(registry.clone()))
}

/// Executor with the default interceptor order
pub fn executor(registry: &InMemoryRegistry) -> CommandExecutor {
    builder(registry).build().unwrap()
}

/// Runs link commands as nested invocations of one tree
pub struct Batch {
    pub commands: Vec<IdentityLinkCommand>,
    /// Keep going after a nested failure instead of propagating it
    pub swallow_errors: bool,
}

impl Batch {
    pub fn of(commands: Vec<IdentityLinkCommand>) -> Self {
        Self {
            commands,
            swallow_errors: false,
        }
    }

    pub fn swallowing(commands: Vec<IdentityLinkCommand>) -> Self {
        Self {
            commands,
            swallow_errors: true,
        }
    }
}

impl Command for Batch {
    /// Number of nested commands that succeeded
    type Output = usize;

    fn name(&self) -> &'static str {
        "Batch"
    }

    fn execute(&self, ctx: &mut CommandContext) -> Result<usize> {
        let mut succeeded = 0;
        for cmd in &self.commands {
            match ctx.execute(cmd) {
                Ok(()) => succeeded += 1,
                Err(_) if self.swallow_errors => {}
                Err(err) => return Err(err),
            }
        }
        Ok(succeeded)
    }
}

/// Fails with a concurrency conflict on every attempt
pub struct AlwaysConflicting {
    pub attempts: Arc<AtomicU32>,
}

impl AlwaysConflicting {
    pub fn new() -> Self {
        Self {
            attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Command for AlwaysConflicting {
    type Output = ();

    fn name(&self) -> &'static str {
        "AlwaysConflicting"
    }

    fn execute(&self, _ctx: &mut CommandContext) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(EngineError::concurrency(Task::ENTITY_TYPE, TASK_ID))
    }
}
