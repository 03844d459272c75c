//! Task execution
//!
//! [`TaskExecutor`] runs a [`SyncPlan`] as a list of [`Task`]s in two phases:
//!
//! 1. Transfers and skips.
//! 2. Deletions, started only once every phase-1 task reached `Completed`
//!    or `Failed`, so a failed upload can never be followed by the deletion
//!    that assumed it succeeded.
//!
//! Within a phase at most `concurrency` tasks are `Running`: a semaphore
//! permit is acquired before a task is dispatched and released when its
//! primitive returns. Each task calls its primitive exactly once; there are
//! no retries. Per-task failures are recorded and the batch continues.
//!
//! Cancellation stops dispatching. Tasks already running finish normally;
//! tasks never dispatched stay `Pending` and are reported as not dispatched.

use std::ops::Range;
use std::sync::Arc;

use bucketsync_core::domain::{
    EventOrigin, ProgressEvent, SyncEvent, SyncOperation, SyncResult, SyncTarget, Task,
    TaskState, TransferFailure,
};
use bucketsync_core::ports::{ILocalFileSystem, IObjectStore};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::events::EventBus;
use crate::planner::SyncPlan;
use crate::SyncError;

/// Default number of tasks running at once
pub const DEFAULT_CONCURRENCY: usize = 20;

/// Final state of every task of a batch
#[derive(Debug, Clone, Default)]
pub struct ExecutionOutcome {
    pub result: SyncResult,
    pub failures: Vec<TransferFailure>,
    pub tasks: Vec<Task>,
    /// Tasks left `Pending` because the batch was cancelled
    pub not_dispatched: usize,
}

/// Runs plans against one object store and the local filesystem
pub struct TaskExecutor {
    store: Arc<dyn IObjectStore>,
    fs: Arc<dyn ILocalFileSystem>,
    concurrency: usize,
}

impl TaskExecutor {
    pub fn new(
        store: Arc<dyn IObjectStore>,
        fs: Arc<dyn ILocalFileSystem>,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            fs,
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Execute every operation of `plan`, emitting progress on `events`
    #[instrument(skip_all, fields(origin = %origin, tasks = plan.len()))]
    pub async fn execute(
        &self,
        target: &SyncTarget,
        plan: &SyncPlan,
        origin: EventOrigin,
        events: &EventBus,
        cancel: &CancellationToken,
    ) -> ExecutionOutcome {
        let mut run = BatchRun::new(plan, origin, events);
        let target = Arc::new(target.clone());

        let phase_one = plan.transfers().len() + plan.skips().len();
        self.run_phase(&mut run, 0..phase_one, &target, cancel)
            .await;
        self.run_phase(&mut run, phase_one..plan.len(), &target, cancel)
            .await;

        let outcome = run.into_outcome();
        info!(
            uploaded = outcome.result.uploaded,
            downloaded = outcome.result.downloaded,
            deleted = outcome.result.deleted,
            skipped = outcome.result.skipped,
            failed = outcome.failures.len(),
            not_dispatched = outcome.not_dispatched,
            "Batch executed"
        );
        outcome
    }

    async fn run_phase(
        &self,
        run: &mut BatchRun<'_>,
        phase: Range<usize>,
        target: &Arc<SyncTarget>,
        cancel: &CancellationToken,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut in_flight: JoinSet<(usize, Result<(), SyncError>)> = JoinSet::new();
        let mut next = phase.start;
        let mut dispatching = true;

        loop {
            // Skips have no primitive to call and complete in place
            while dispatching && next < phase.end && run.is_skip(next) {
                if cancel.is_cancelled() {
                    dispatching = false;
                    break;
                }
                run.start(next);
                run.finish(next, Ok(()));
                next += 1;
            }

            let more = dispatching && next < phase.end;
            if !more && in_flight.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    match joined {
                        Ok((index, outcome)) => {
                            run.finish(index, outcome.map_err(failure_message));
                        }
                        Err(e) => error!(error = %e, "Task aborted before reporting"),
                    }
                }

                _ = cancel.cancelled(), if more => {
                    info!(remaining = phase.end - next, "Cancelled; no further tasks dispatched");
                    dispatching = false;
                }

                permit = Arc::clone(&semaphore).acquire_owned(), if more => {
                    let Ok(permit) = permit else {
                        warn!("Task semaphore closed");
                        dispatching = false;
                        continue;
                    };
                    let index = next;
                    next += 1;
                    run.start(index);

                    let operation = run.operation(index).clone();
                    let store = Arc::clone(&self.store);
                    let fs = Arc::clone(&self.fs);
                    let target = Arc::clone(target);
                    in_flight.spawn(async move {
                        let outcome = perform(store.as_ref(), fs.as_ref(), &target, &operation).await;
                        drop(permit);
                        (index, outcome)
                    });
                }
            }
        }

        // A task that panicked never reported back
        for index in phase {
            if run.is_running(index) {
                run.finish(index, Err("task aborted unexpectedly".to_string()));
            }
        }
    }
}

fn failure_message(error: SyncError) -> String {
    match error {
        SyncError::Transfer { message, .. } => message,
        other => other.to_string(),
    }
}

/// Calls the primitive behind one operation
#[instrument(skip_all, fields(operation = %operation))]
async fn perform(
    store: &dyn IObjectStore,
    fs: &dyn ILocalFileSystem,
    target: &SyncTarget,
    operation: &SyncOperation,
) -> Result<(), SyncError> {
    let path = operation.path();
    let transfer_error = |e: anyhow::Error| SyncError::Transfer {
        path: path.clone(),
        message: format!("{e:#}"),
    };

    match operation {
        SyncOperation::Upload(p) => {
            let data = fs
                .read_file(&target.local_root.join_relative(p))
                .await
                .map_err(transfer_error)?;
            store
                .put_object(&target.bucket, &target.prefix.key_for(p), data)
                .await
                .map_err(transfer_error)?;
        }
        SyncOperation::Download(p) => {
            let data = store
                .get_object(&target.bucket, &target.prefix.key_for(p))
                .await
                .map_err(transfer_error)?;
            fs.write_file(&target.local_root.join_relative(p), &data)
                .await
                .map_err(transfer_error)?;
        }
        SyncOperation::DeleteLocal(p) => {
            fs.delete_file(&target.local_root.join_relative(p))
                .await
                .map_err(transfer_error)?;
        }
        SyncOperation::DeleteRemote(p) => {
            store
                .delete_object(&target.bucket, &target.prefix.key_for(p))
                .await
                .map_err(transfer_error)?;
        }
        SyncOperation::Skip(_) => {}
    }

    debug!("Operation completed");
    Ok(())
}

/// Mutable bookkeeping of one batch
struct BatchRun<'a> {
    tasks: Vec<Task>,
    result: SyncResult,
    failures: Vec<TransferFailure>,
    finished: usize,
    origin: EventOrigin,
    events: &'a EventBus,
}

impl<'a> BatchRun<'a> {
    fn new(plan: &SyncPlan, origin: EventOrigin, events: &'a EventBus) -> Self {
        let tasks = plan
            .operations()
            .enumerate()
            .map(|(index, operation)| Task::new(index, operation.clone()))
            .collect();
        Self {
            tasks,
            result: SyncResult::default(),
            failures: Vec::new(),
            finished: 0,
            origin,
            events,
        }
    }

    fn operation(&self, index: usize) -> &SyncOperation {
        self.tasks[index].operation()
    }

    fn is_skip(&self, index: usize) -> bool {
        matches!(self.operation(index), SyncOperation::Skip(_))
    }

    fn is_running(&self, index: usize) -> bool {
        matches!(self.tasks[index].state(), TaskState::Running)
    }

    fn start(&mut self, index: usize) {
        if let Err(e) = self.tasks[index].start() {
            warn!(index, error = %e, "Unexpected task transition");
        }
        self.emit(index);
    }

    fn finish(&mut self, index: usize, outcome: Result<(), String>) {
        let transition = match outcome {
            Ok(()) => {
                self.result.record(self.tasks[index].operation());
                self.tasks[index].complete()
            }
            Err(message) => {
                let operation = self.tasks[index].operation();
                warn!(operation = %operation, error = %message, "Operation failed");
                self.failures.push(TransferFailure {
                    path: operation.path().clone(),
                    operation: operation.kind(),
                    message: message.clone(),
                });
                self.tasks[index].fail(message)
            }
        };
        if let Err(e) = transition {
            warn!(index, error = %e, "Unexpected task transition");
        }
        self.finished += 1;
        self.emit(index);
    }

    fn emit(&self, index: usize) {
        let task = &self.tasks[index];
        self.events.emit(SyncEvent::Progress(ProgressEvent {
            origin: self.origin,
            current_index: self.finished,
            total: self.tasks.len(),
            current_path: task.operation().path().clone(),
            operation: task.operation().kind(),
            task_state: task.state().clone(),
        }));
    }

    fn into_outcome(self) -> ExecutionOutcome {
        let not_dispatched = self
            .tasks
            .iter()
            .filter(|task| matches!(task.state(), TaskState::Pending))
            .count();
        ExecutionOutcome {
            result: self.result,
            failures: self.failures,
            tasks: self.tasks,
            not_dispatched,
        }
    }
}
