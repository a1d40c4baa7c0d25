//! Retry-On-Conflict Tests
//!
//! ## Scenarios Covered
//!
//! 1. An always-conflicting command runs 1 + max_retries times, then Conflict
//! 2. A concurrent writer causes one retry with fresh reads, then success
//! 3. Non-conflict errors are never retried
//! 4. Without the retry interceptor a conflict surfaces directly

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use cmdex_core::model::Task;
use cmdex_core::session::Mutation;
use cmdex_core::{
    Authentication, Command, CommandContext, EngineError, InMemoryRegistry, InterceptorKind,
    Result,
};
use common::{builder, executor, seeded_registry, AlwaysConflicting, TASK_ID};
use std::sync::atomic::{AtomicU32, Ordering};

#[test]
fn test_always_conflicting_command_is_bounded() {
    // GIVEN an executor allowing 2 retries
    let registry = seeded_registry();
    let executor = builder(&registry).max_retries(2).build().unwrap();
    let cmd = AlwaysConflicting::new();

    // WHEN the command always conflicts
    let err = executor
        .execute(&Authentication::anonymous(), &cmd)
        .unwrap_err();

    // THEN it ran 3 times and failed with Conflict wrapping the last cause
    assert_eq!(cmd.attempts(), 3);
    match err {
        EngineError::Conflict {
            command,
            attempts,
            cause,
        } => {
            assert_eq!(command, "AlwaysConflicting");
            assert_eq!(attempts, 3);
            assert!(cause.is_concurrency_conflict());
        }
        other => panic!("expected Conflict, got {other:?}"),
    }
}

#[test]
fn test_zero_retries_runs_once() {
    // GIVEN an executor with retries disabled
    let registry = seeded_registry();
    let executor = builder(&registry).max_retries(0).build().unwrap();
    let cmd = AlwaysConflicting::new();

    // WHEN the command conflicts
    let err = executor
        .execute(&Authentication::anonymous(), &cmd)
        .unwrap_err();

    // THEN it ran exactly once
    assert_eq!(cmd.attempts(), 1);
    assert!(matches!(err, EngineError::Conflict { attempts: 1, .. }));
}

/// Touches T1 and, on the first attempt only, lets another writer bump it
/// between the read and the flush
struct RacingTouch {
    registry: InMemoryRegistry,
    attempts: AtomicU32,
}

impl Command for RacingTouch {
    type Output = u64;

    fn name(&self) -> &'static str {
        "RacingTouch"
    }

    fn execute(&self, ctx: &mut CommandContext) -> Result<u64> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let task = ctx
            .task(TASK_ID)?
            .ok_or_else(|| EngineError::not_found(Task::ENTITY_TYPE, TASK_ID))?;
        ctx.register(Mutation::TouchTask {
            task_id: task.id.clone(),
            revision: task.revision,
        });
        if attempt == 1 {
            let mut concurrent = task.clone();
            concurrent.revision += 1;
            self.registry.insert_task(concurrent)?;
        }
        Ok(task.revision)
    }
}

#[test]
fn test_concurrent_writer_triggers_retry_with_fresh_reads() {
    // GIVEN T1 at revision 1
    let registry = seeded_registry();
    let executor = executor(&registry);
    let cmd = RacingTouch {
        registry: registry.clone(),
        attempts: AtomicU32::new(0),
    };

    // WHEN another writer bumps T1 during the first attempt
    let read_revision = executor
        .execute(&Authentication::anonymous(), &cmd)
        .unwrap();

    // THEN the second attempt read revision 2 and committed revision 3
    assert_eq!(cmd.attempts.load(Ordering::SeqCst), 2);
    assert_eq!(read_revision, 2);
    assert_eq!(registry.task(TASK_ID).unwrap().unwrap().revision, 3);
}

struct CountingFailure {
    attempts: AtomicU32,
}

impl Command for CountingFailure {
    type Output = ();

    fn name(&self) -> &'static str {
        "CountingFailure"
    }

    fn execute(&self, _ctx: &mut CommandContext) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(EngineError::not_found("Task", "gone"))
    }
}

#[test]
fn test_non_conflict_errors_are_not_retried() {
    // GIVEN the default executor
    let registry = seeded_registry();
    let executor = executor(&registry);
    let cmd = CountingFailure {
        attempts: AtomicU32::new(0),
    };

    // WHEN the command fails with NotFound
    let err = executor
        .execute(&Authentication::anonymous(), &cmd)
        .unwrap_err();

    // THEN it ran once and the error is unchanged
    assert_eq!(cmd.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(err, EngineError::not_found("Task", "gone"));
}

#[test]
fn test_without_retry_interceptor_conflict_surfaces() {
    // GIVEN an executor without retry
    let registry = seeded_registry();
    let executor = builder(&registry)
        .interceptors(vec![
            InterceptorKind::ContextManagement,
            InterceptorKind::Transaction,
        ])
        .build()
        .unwrap();
    let cmd = AlwaysConflicting::new();

    // WHEN the command conflicts
    let err = executor
        .execute(&Authentication::anonymous(), &cmd)
        .unwrap_err();

    // THEN the raw ConcurrencyConflict is returned after one attempt
    assert_eq!(cmd.attempts(), 1);
    assert!(matches!(err, EngineError::ConcurrencyConflict { .. }));
}
