//! Device configuration.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::backend::{BackendKind, DeviceCapabilities};

/// Environment variable selecting the backend (`explicit` | `state-machine`).
pub const BACKEND_ENV: &str = "TESSERA_BACKEND";
/// Environment variable selecting the completion mode (`background` | `manual`).
pub const COMPLETION_ENV: &str = "TESSERA_COMPLETION";

/// How submitted work reaches completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompletionMode {
    /// A queue worker thread executes submissions as they arrive.
    #[default]
    Background,
    /// Nothing executes until [`Device::process`](crate::Device::process)
    /// is called.
    Manual,
}

impl FromStr for CompletionMode {
    type Err = ParseParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "background" => Ok(Self::Background),
            "manual" => Ok(Self::Manual),
            _ => Err(ParseParameterError::new("completion mode", s)),
        }
    }
}

/// An unrecognized configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {parameter} `{value}`")]
pub struct ParseParameterError {
    pub parameter: &'static str,
    pub value: String,
}

impl ParseParameterError {
    pub(crate) fn new(parameter: &'static str, value: &str) -> Self {
        Self {
            parameter,
            value: value.to_string(),
        }
    }
}

/// Parameters for [`Device::new`](crate::Device::new).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tessera_graphics::{BackendKind, CompletionMode, DeviceParameters};
///
/// let params = DeviceParameters::new()
///     .with_backend(BackendKind::StateMachine)
///     .with_completion(CompletionMode::Manual)
///     .with_execution_latency(Duration::from_millis(2))
///     .with_label("tools");
/// assert_eq!(params.backend, BackendKind::StateMachine);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceParameters {
    pub label: Option<String>,
    pub backend: BackendKind,
    pub completion: CompletionMode,
    /// Time the backend spends on each submission.
    pub execution_latency: Duration,
    /// Replaces the backend's own capabilities.
    pub capabilities: Option<DeviceCapabilities>,
    /// Report device loss on the submission after this many have executed.
    pub device_loss_after: Option<u64>,
    /// Retired command lists kept for reuse.
    pub command_list_pool_capacity: usize,
}

impl Default for DeviceParameters {
    fn default() -> Self {
        Self {
            label: None,
            backend: BackendKind::default(),
            completion: CompletionMode::default(),
            execution_latency: Duration::ZERO,
            capabilities: None,
            device_loss_after: None,
            command_list_pool_capacity: 32,
        }
    }
}

impl DeviceParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `TESSERA_BACKEND` and `TESSERA_COMPLETION`.
    ///
    /// Unknown values are logged and ignored.
    pub fn from_env() -> Self {
        let mut params = Self::default();
        if let Ok(value) = std::env::var(BACKEND_ENV) {
            match value.parse() {
                Ok(backend) => params.backend = backend,
                Err(err) => log::warn!("{BACKEND_ENV}: {err}, using {}", params.backend),
            }
        }
        if let Ok(value) = std::env::var(COMPLETION_ENV) {
            match value.parse() {
                Ok(completion) => params.completion = completion,
                Err(err) => log::warn!("{COMPLETION_ENV}: {err}, using {:?}", params.completion),
            }
        }
        params
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_completion(mut self, completion: CompletionMode) -> Self {
        self.completion = completion;
        self
    }

    pub fn with_execution_latency(mut self, latency: Duration) -> Self {
        self.execution_latency = latency;
        self
    }

    pub fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    /// Let `submissions` execute, then lose the device on the next one.
    pub fn with_device_loss_after(mut self, submissions: u64) -> Self {
        self.device_loss_after = Some(submissions);
        self
    }

    pub fn with_command_list_pool_capacity(mut self, capacity: usize) -> Self {
        self.command_list_pool_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = DeviceParameters::default();
        assert_eq!(params.backend, BackendKind::Explicit);
        assert_eq!(params.completion, CompletionMode::Background);
        assert!(params.execution_latency.is_zero());
        assert_eq!(params.device_loss_after, None);
    }

    #[test]
    fn test_completion_mode_parses() {
        assert_eq!("Manual".parse::<CompletionMode>(), Ok(CompletionMode::Manual));
        assert_eq!(
            "sometimes".parse::<CompletionMode>(),
            Err(ParseParameterError::new("completion mode", "sometimes"))
        );
        assert_eq!(
            ParseParameterError::new("backend", "metal").to_string(),
            "unknown backend `metal`"
        );
    }

    #[test]
    fn test_builders() {
        let params = DeviceParameters::new()
            .with_device_loss_after(3)
            .with_capabilities(DeviceCapabilities::STATE_MACHINE)
            .with_command_list_pool_capacity(4);
        assert_eq!(params.device_loss_after, Some(3));
        assert_eq!(params.capabilities, Some(DeviceCapabilities::STATE_MACHINE));
        assert_eq!(params.command_list_pool_capacity, 4);
    }
}
