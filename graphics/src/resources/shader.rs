//! Shader resource.

use std::fmt;
use std::sync::Arc;

use super::{ResourceId, ResourceTracker};
use crate::backend::BackendHandle;
use crate::types::{ShaderDescriptor, ShaderInterface, ShaderStage};

struct ShaderInner {
    tracker: Arc<ResourceTracker>,
    descriptor: ShaderDescriptor,
}

/// Program for one pipeline stage. Immutable once created.
#[derive(Clone)]
pub struct Shader {
    inner: Arc<ShaderInner>,
}

impl Shader {
    pub(crate) fn new(tracker: Arc<ResourceTracker>, descriptor: ShaderDescriptor) -> Self {
        Self {
            inner: Arc::new(ShaderInner {
                tracker,
                descriptor,
            }),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.inner.tracker.id()
    }

    pub fn stage(&self) -> ShaderStage {
        self.inner.descriptor.stage
    }

    pub fn interface(&self) -> &ShaderInterface {
        &self.inner.descriptor.interface
    }

    pub fn entry_point(&self) -> &str {
        &self.inner.descriptor.entry_point
    }

    pub fn descriptor(&self) -> &ShaderDescriptor {
        &self.inner.descriptor
    }

    pub fn label(&self) -> Option<&str> {
        self.inner.descriptor.label.as_deref()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.tracker.is_destroyed()
    }

    pub(crate) fn tracker(&self) -> &Arc<ResourceTracker> {
        &self.inner.tracker
    }

    pub(crate) fn handle(&self) -> BackendHandle {
        self.inner.tracker.handle()
    }
}

impl fmt::Debug for Shader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shader")
            .field("id", &self.id())
            .field("stage", &self.stage())
            .field("label", &self.label())
            .finish()
    }
}

impl PartialEq for Shader {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

static_assertions::assert_impl_all!(Shader: Send, Sync);
