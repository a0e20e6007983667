//! CPU-GPU synchronization.
//!
//! A [`Fence`] marks the completion of one submission. Fences of a device
//! carry increasing sequence values and signal in that order.

use std::fmt;
use std::sync::Arc;

use tessera_core::sync::{Event, Mutex, Timeout, WaitResult};

use crate::error::GraphicsError;

/// Status of a fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// The submission has not completed yet.
    Unsignaled,
    /// The submission completed.
    Signaled,
    /// The device was lost before the submission completed.
    Failed,
}

#[derive(Debug)]
struct FenceState {
    status: FenceStatus,
    failure: Option<String>,
}

struct FenceInner {
    value: u64,
    state: Mutex<FenceState>,
    event: Event,
}

/// Completion marker of one submission.
///
/// Fences are cheap to clone. All clones observe the same signal.
///
/// # Example
///
/// ```
/// use tessera_graphics::{Device, DeviceParameters, Timeout, WaitResult};
///
/// let device = Device::new(DeviceParameters::default()).unwrap();
/// let mut list = device.command_list();
/// list.begin().unwrap();
/// list.end().unwrap();
///
/// let submission = device.submit(list).unwrap();
/// let fence = submission.fence();
/// assert_eq!(device.wait(fence, Timeout::Infinite), Ok(WaitResult::Signaled));
/// assert!(fence.is_signaled());
/// ```
#[derive(Clone)]
pub struct Fence {
    inner: Arc<FenceInner>,
}

impl Fence {
    /// Create an unsignaled fence for the submission with sequence `value`.
    pub(crate) fn new(value: u64) -> Self {
        Self {
            inner: Arc::new(FenceInner {
                value,
                state: Mutex::new(FenceState {
                    status: FenceStatus::Unsignaled,
                    failure: None,
                }),
                event: Event::new(false),
            }),
        }
    }

    /// Sequence value of the submission. Later submissions have larger values.
    pub fn value(&self) -> u64 {
        self.inner.value
    }

    /// Check the current status of the fence.
    pub fn status(&self) -> FenceStatus {
        self.inner.state.lock().status
    }

    /// Check if the fence is signaled (non-blocking).
    pub fn is_signaled(&self) -> bool {
        self.status() == FenceStatus::Signaled
    }

    /// Whether the fence resolved, successfully or not.
    pub fn is_complete(&self) -> bool {
        self.status() != FenceStatus::Unsignaled
    }

    /// Reason the submission failed, if it did.
    pub fn failure(&self) -> Option<String> {
        self.inner.state.lock().failure.clone()
    }

    /// Wait for the fence to resolve.
    ///
    /// Returns [`WaitResult::TimedOut`] if the timeout elapses first. A failed
    /// submission is reported as [`GraphicsError::BackendFatal`].
    pub fn wait(&self, timeout: impl Into<Timeout>) -> Result<WaitResult, GraphicsError> {
        if self.inner.event.wait_for(timeout) == WaitResult::TimedOut {
            return Ok(WaitResult::TimedOut);
        }
        let state = self.inner.state.lock();
        match state.status {
            FenceStatus::Failed => Err(GraphicsError::BackendFatal(
                state
                    .failure
                    .clone()
                    .unwrap_or_else(|| "submission failed".to_string()),
            )),
            _ => Ok(WaitResult::Signaled),
        }
    }

    /// Signal successful completion.
    pub(crate) fn signal(&self) {
        self.resolve(FenceStatus::Signaled, None);
    }

    /// Resolve the fence as failed.
    pub(crate) fn fail(&self, reason: impl Into<String>) {
        self.resolve(FenceStatus::Failed, Some(reason.into()));
    }

    fn resolve(&self, status: FenceStatus, failure: Option<String>) {
        {
            let mut state = self.inner.state.lock();
            if state.status != FenceStatus::Unsignaled {
                return;
            }
            state.status = status;
            state.failure = failure;
        }
        self.inner.event.signal();
    }
}

impl fmt::Debug for Fence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fence")
            .field("value", &self.inner.value)
            .field("status", &self.status())
            .finish()
    }
}

impl PartialEq for Fence {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Fence {}

static_assertions::assert_impl_all!(Fence: Send, Sync);
