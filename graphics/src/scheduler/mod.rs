//! Ordered submission and completion.
//!
//! Every [`Device`](crate::Device) owns one [`SubmissionQueue`]. Submitting a
//! command list appends it to the queue under the queue lock and hands back a
//! [`Submission`] carrying the list's [`Fence`]. The enqueue order is the
//! total order of the device: submissions execute, retire and signal their
//! fences strictly in it.
//!
//! | Stage | Who | What happens |
//! |-------|-----|--------------|
//! | Enqueue | submitting thread | fence value assigned, resources marked in flight |
//! | Execute | queue worker or [`Device::process`](crate::Device::process) | backend replays the commands |
//! | Retire | same | references released, fence signaled |
//! | Reclaim | application | [`Device::reclaim`](crate::Device::reclaim) hands the list back |
//!
//! A backend failure is fatal: the failing submission and every submission
//! still pending resolve their fences as failed, and the queue refuses new
//! work.

mod sync;

pub use sync::{Fence, FenceStatus};

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use tessera_core::sync::{AtomicCounter, Mutex, Semaphore, Timeout, WaitResult};

use crate::backend::{BackendError, ExecutionReport, GpuBackend, SubmissionBatch};
use crate::command::{CommandList, CommandListId, CommandListPool, CommandListState};
use crate::error::{GraphicsError, SubmitError};

/// Retired lists kept for [`Device::reclaim`](crate::Device::reclaim) before
/// the oldest overflow into the pool.
const COMPLETED_CAPACITY: usize = 256;

/// Handle to a submitted command list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    list: CommandListId,
    fence: Fence,
}

impl Submission {
    /// Id the list had when it was submitted.
    pub fn list_id(&self) -> CommandListId {
        self.list
    }

    pub fn fence(&self) -> &Fence {
        &self.fence
    }

    /// Sequence value of the submission.
    pub fn value(&self) -> u64 {
        self.fence.value()
    }

    /// Wait for the submission to complete.
    pub fn wait(&self, timeout: impl Into<Timeout>) -> Result<WaitResult, GraphicsError> {
        self.fence.wait(timeout)
    }
}

/// Counters of a queue since its creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStatistics {
    pub submitted: u64,
    pub retired: u64,
    pub failed: u64,
    /// Work the backend reported for retired submissions.
    pub executed: ExecutionReport,
}

struct Pending {
    list: CommandList,
    fence: Fence,
    /// Lists recorded internally go straight back to the pool.
    transient: bool,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Pending>,
    completed: VecDeque<CommandList>,
    next_value: u64,
    newest: Option<Fence>,
    lost: Option<String>,
    stopping: bool,
}

/// The ordered submission queue of a device.
pub struct SubmissionQueue {
    state: Mutex<QueueState>,
    /// One permit per enqueued submission, plus one to stop the worker.
    work: Semaphore,
    /// Serializes pop + execute + retire so fences signal in order.
    execution: Mutex<()>,
    backend: Arc<dyn GpuBackend>,
    pool: Arc<CommandListPool>,
    outstanding: AtomicCounter,
    statistics: Mutex<QueueStatistics>,
}

impl SubmissionQueue {
    pub(crate) fn new(backend: Arc<dyn GpuBackend>, pool: Arc<CommandListPool>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                next_value: 1,
                ..QueueState::default()
            }),
            work: Semaphore::new(0),
            execution: Mutex::new(()),
            backend,
            pool,
            outstanding: AtomicCounter::new(0),
            statistics: Mutex::new(QueueStatistics::default()),
        }
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Append an executable list to the queue.
    ///
    /// Never blocks on execution. On rejection the list comes back unchanged
    /// inside the error.
    pub(crate) fn submit(&self, mut list: CommandList, transient: bool) -> Result<Submission, SubmitError> {
        if list.state() != CommandListState::Executable {
            let error = GraphicsError::InvalidState {
                operation: "submit",
                state: list.state(),
            };
            return Err(SubmitError { error, list });
        }

        let mut state = self.state.lock();
        if let Some(reason) = &state.lost {
            let error = GraphicsError::BackendFatal(reason.clone());
            drop(state);
            return Err(SubmitError { error, list });
        }

        let fence = Fence::new(state.next_value);
        if let Err(error) = list.mark_submitted(&fence) {
            drop(state);
            return Err(SubmitError { error, list });
        }
        state.next_value += 1;
        state.newest = Some(fence.clone());

        let submission = Submission {
            list: list.id(),
            fence: fence.clone(),
        };
        log::debug!(
            "Queue: submitted {} as {} ({} command(s))",
            submission.list,
            submission.value(),
            list.len()
        );
        state.pending.push_back(Pending {
            list,
            fence,
            transient,
        });
        self.outstanding.increment();
        drop(state);

        self.statistics.lock().submitted += 1;
        self.work.release(1);
        Ok(submission)
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Execute and retire the oldest pending submission.
    ///
    /// Returns `false` if nothing was pending.
    pub(crate) fn execute_next(&self) -> bool {
        let _execution = self.execution.lock();
        let Some(pending) = self.state.lock().pending.pop_front() else {
            return false;
        };

        let batch = SubmissionBatch {
            value: pending.fence.value(),
            list: pending.list.id(),
            label: pending.list.label(),
            commands: pending.list.commands(),
        };
        match self.backend.execute(&batch) {
            Ok(report) => self.retire(pending, report),
            Err(err) => self.fail(pending, err),
        }
        true
    }

    /// Execute up to `max` pending submissions. Returns how many ran.
    pub(crate) fn process(&self, max: usize) -> usize {
        let mut executed = 0;
        while executed < max && self.execute_next() {
            executed += 1;
        }
        executed
    }

    /// Body of the queue worker thread.
    pub(crate) fn run_worker(&self) {
        log::debug!("Queue: worker started");
        loop {
            self.work.acquire();
            if !self.execute_next() && self.state.lock().stopping {
                break;
            }
        }
        log::debug!("Queue: worker stopped");
    }

    /// Ask the worker to exit once the queue is empty.
    pub(crate) fn stop(&self) {
        self.state.lock().stopping = true;
        self.work.release(1);
    }

    fn retire(&self, mut pending: Pending, report: ExecutionReport) {
        pending.list.retire();
        {
            let mut statistics = self.statistics.lock();
            statistics.retired += 1;
            statistics.executed += report;
        }
        log::debug!(
            "Queue: retired {} ({} draw(s), {} dispatch(es))",
            pending.fence.value(),
            report.draws,
            report.dispatches
        );

        self.park(pending.list, pending.transient);
        self.outstanding.decrement();
        pending.fence.signal();
    }

    /// Device loss: fail this submission and everything behind it.
    fn fail(&self, pending: Pending, err: BackendError) {
        let reason = err.to_string();
        log::error!(
            "Queue: submission {} failed, device is lost: {reason}",
            pending.fence.value()
        );

        let mut failed = vec![pending];
        {
            let mut state = self.state.lock();
            state.lost.get_or_insert_with(|| reason.clone());
            failed.extend(state.pending.drain(..));
        }
        self.statistics.lock().failed += failed.len() as u64;

        for mut pending in failed {
            pending.list.retire();
            self.park(pending.list, pending.transient);
            self.outstanding.decrement();
            pending.fence.fail(reason.clone());
        }
    }

    /// Keep a retired list for reclaiming, or pool it.
    fn park(&self, list: CommandList, transient: bool) {
        if transient {
            self.pool.release(list);
            return;
        }
        let overflow = {
            let mut state = self.state.lock();
            state.completed.push_back(list);
            if state.completed.len() > COMPLETED_CAPACITY {
                state.completed.pop_front()
            } else {
                None
            }
        };
        if let Some(oldest) = overflow {
            self.pool.release(oldest);
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Wait for the newest submission, if there is one.
    pub(crate) fn wait_idle(&self, timeout: Timeout) -> Result<WaitResult, GraphicsError> {
        let newest = self.state.lock().newest.clone();
        match newest {
            Some(fence) => fence.wait(timeout),
            None => Ok(WaitResult::Signaled),
        }
    }

    /// Take every retired list that was not reclaimed yet.
    pub(crate) fn reclaim(&self) -> Vec<CommandList> {
        self.state.lock().completed.drain(..).collect()
    }

    /// Submissions not retired yet.
    pub(crate) fn outstanding(&self) -> u64 {
        self.outstanding.load()
    }

    /// Reason the device was lost, if it was.
    pub(crate) fn lost(&self) -> Option<String> {
        self.state.lock().lost.clone()
    }

    pub(crate) fn statistics(&self) -> QueueStatistics {
        *self.statistics.lock()
    }
}

impl fmt::Debug for SubmissionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SubmissionQueue")
            .field("backend", &self.backend.name())
            .field("pending", &state.pending.len())
            .field("completed", &state.completed.len())
            .field("next_value", &state.next_value)
            .field("lost", &state.lost)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ExplicitBackend;
    use crate::device::DeviceId;
    use crate::parameters::DeviceParameters;

    fn queue(parameters: &DeviceParameters) -> (SubmissionQueue, Arc<CommandListPool>) {
        let pool = Arc::new(CommandListPool::new(DeviceId::allocate()));
        let backend = Arc::new(ExplicitBackend::new(parameters));
        (SubmissionQueue::new(backend, Arc::clone(&pool)), pool)
    }

    fn executable(pool: &CommandListPool) -> CommandList {
        let mut list = pool.acquire();
        list.begin().unwrap();
        list.end().unwrap();
        list
    }

    #[test]
    fn test_rejects_non_executable_list() {
        let (queue, pool) = queue(&DeviceParameters::default());
        let err = queue.submit(pool.acquire(), false).unwrap_err();
        assert_eq!(
            err.error,
            GraphicsError::InvalidState {
                operation: "submit",
                state: CommandListState::Initial
            }
        );
        assert_eq!(err.list.state(), CommandListState::Initial);
        assert_eq!(queue.outstanding(), 0);
    }

    #[test]
    fn test_fences_signal_in_order() {
        let (queue, pool) = queue(&DeviceParameters::default());
        let first = queue.submit(executable(&pool), false).unwrap();
        let second = queue.submit(executable(&pool), false).unwrap();
        assert!(first.value() < second.value());
        assert_eq!(queue.outstanding(), 2);

        assert_eq!(queue.process(1), 1);
        assert!(first.fence().is_signaled());
        assert!(!second.fence().is_complete());

        assert_eq!(queue.process(usize::MAX), 1);
        assert!(second.fence().is_signaled());
        assert_eq!(queue.outstanding(), 0);
        assert_eq!(queue.reclaim().len(), 2);
    }

    #[test]
    fn test_loss_fails_every_pending_fence() {
        let (queue, pool) = queue(&DeviceParameters::default().with_device_loss_after(1));
        let ok = queue.submit(executable(&pool), false).unwrap();
        let lost = queue.submit(executable(&pool), false).unwrap();
        let behind = queue.submit(executable(&pool), false).unwrap();

        assert_eq!(queue.process(1), 1);
        assert!(ok.fence().is_signaled());
        assert_eq!(queue.process(1), 1);
        assert_eq!(lost.fence().status(), FenceStatus::Failed);
        assert_eq!(behind.fence().status(), FenceStatus::Failed);
        assert_eq!(queue.outstanding(), 0);
        assert!(queue.lost().is_some());

        let err = queue.submit(executable(&pool), false).unwrap_err();
        assert!(matches!(err.error, GraphicsError::BackendFatal(_)));
        assert_eq!(queue.statistics().failed, 2);
    }

    #[test]
    fn test_transient_lists_return_to_pool() {
        let (queue, pool) = queue(&DeviceParameters::default());
        queue.submit(executable(&pool), true).unwrap();
        queue.process(usize::MAX);
        assert!(queue.reclaim().is_empty());
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_wait_idle_without_submissions() {
        let (queue, _pool) = queue(&DeviceParameters::default());
        assert_eq!(queue.wait_idle(Timeout::ZERO), Ok(WaitResult::Signaled));
    }
}
