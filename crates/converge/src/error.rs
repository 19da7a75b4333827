//! Error types for convergence waits

use std::time::Duration;

use thiserror::Error;

use crate::refresh::BoxError;
use crate::state::{StateSet, StateToken};

/// Invalid wait policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A policy field failed validation.
    #[error("invalid wait policy: {message}")]
    Validation {
        /// What was wrong
        message: String,
    },
}

impl ConfigError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Result type for policy validation
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Discriminant of [`WaitError`], for callers that branch on the failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitErrorKind {
    /// Invalid policy, detected before polling.
    Config,
    /// The refresh capability reported a failure.
    Refresh,
    /// A state outside both the pending and target sets was observed.
    UnexpectedState,
    /// The timeout elapsed before convergence.
    Timeout,
    /// Too many consecutive refreshes returned no value.
    NotFound,
    /// The caller cancelled the wait.
    Cancelled,
}

/// Terminal failure of a wait.
///
/// Every variant is fatal; the engine never retries any of them.
#[derive(Error, Debug)]
pub enum WaitError {
    /// The policy was rejected before any refresh happened.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A refresh returned an error it did not classify as pending.
    #[error("refresh failed after {polls} poll(s): {source}")]
    Refresh {
        /// Refreshes attempted, including the failing one
        polls: u32,
        /// Error reported by the refresh capability
        #[source]
        source: BoxError,
    },

    /// The observed state is neither pending nor target.
    #[error("unexpected state '{state}', wanted {target} (pending: {pending})")]
    UnexpectedState {
        /// The state that was observed
        state: StateToken,
        /// Configured pending states
        pending: StateSet,
        /// Configured target states
        target: StateSet,
    },

    /// The overall deadline passed without convergence.
    #[error("{}", timeout_message(.elapsed, .timeout, .last_state, .polls))]
    Timeout {
        /// Time spent in the wait call
        elapsed: Duration,
        /// Configured timeout
        timeout: Duration,
        /// Last state observed, if any refresh completed
        last_state: Option<StateToken>,
        /// Debug rendering of the last observed value, if any
        last_value: Option<String>,
        /// Refreshes started, including one cut off by the deadline
        polls: u32,
    },

    /// More than the configured number of consecutive refreshes had no value.
    #[error("entity not found after {checks} consecutive check(s)")]
    NotFound {
        /// Consecutive empty observations seen
        checks: u32,
        /// Last state observed
        last_state: StateToken,
    },

    /// The wait was cancelled by the caller.
    #[error("wait cancelled after {elapsed:?}")]
    Cancelled {
        /// Time spent before cancellation
        elapsed: Duration,
    },
}

fn timeout_message(
    elapsed: &Duration,
    timeout: &Duration,
    last_state: &Option<StateToken>,
    polls: &u32,
) -> String {
    match last_state {
        Some(state) => format!(
            "timeout while waiting for state to converge (last state: '{state}', timeout: {timeout:?}, elapsed: {elapsed:?}, polls: {polls})"
        ),
        None => format!(
            "timeout while waiting for state to converge (no state observed, timeout: {timeout:?}, elapsed: {elapsed:?})"
        ),
    }
}

impl WaitError {
    /// The failure kind.
    #[must_use]
    pub fn kind(&self) -> WaitErrorKind {
        match self {
            Self::Config(_) => WaitErrorKind::Config,
            Self::Refresh { .. } => WaitErrorKind::Refresh,
            Self::UnexpectedState { .. } => WaitErrorKind::UnexpectedState,
            Self::Timeout { .. } => WaitErrorKind::Timeout,
            Self::NotFound { .. } => WaitErrorKind::NotFound,
            Self::Cancelled { .. } => WaitErrorKind::Cancelled,
        }
    }

    /// Whether this is a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether this is an unexpected-state failure.
    #[must_use]
    pub fn is_unexpected_state(&self) -> bool {
        matches!(self, Self::UnexpectedState { .. })
    }

    /// Whether the refresh capability failed.
    #[must_use]
    pub fn is_refresh(&self) -> bool {
        matches!(self, Self::Refresh { .. })
    }

    /// Last observed state, where the variant records one.
    #[must_use]
    pub fn last_state(&self) -> Option<&StateToken> {
        match self {
            Self::Timeout { last_state, .. } => last_state.as_ref(),
            Self::UnexpectedState { state, .. } => Some(state),
            Self::NotFound { last_state, .. } => Some(last_state),
            _ => None,
        }
    }

    /// Wall-clock time spent, for variants that record it.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            Self::Timeout { elapsed, .. } | Self::Cancelled { elapsed } => Some(*elapsed),
            _ => None,
        }
    }

    /// Create a refresh error
    pub fn refresh(polls: u32, source: impl Into<BoxError>) -> Self {
        Self::Refresh {
            polls,
            source: source.into(),
        }
    }
}

/// Result type for waits
pub type WaitResult<T> = Result<T, WaitError>;
