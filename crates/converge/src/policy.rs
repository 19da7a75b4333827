//! Wait policy: which states to wait through, which to wait for, and how long.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::state::{Classification, StateSet, StateToken};

/// Default overall timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

const fn default_occurrence() -> u32 {
    1
}

/// Immutable description of one wait.
///
/// Together with a [`Refresh`](crate::Refresh) instance this is everything
/// the [`Waiter`](crate::Waiter) needs. Policies are plain data and can be
/// loaded from configuration files:
///
/// ```rust
/// use converge::WaitPolicy;
/// use std::time::Duration;
///
/// let policy = WaitPolicy::builder()
///     .pending(["STARTING"])
///     .target(["RUNNING"])
///     .timeout(Duration::from_secs(60))
///     .min_interval(Duration::from_secs(1))
///     .build()
///     .unwrap();
///
/// assert_eq!(policy.classify("STARTING"), converge::Classification::Pending);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitPolicy {
    /// States meaning "still in progress". May contain [`StateToken::WILDCARD`].
    #[serde(default)]
    pub pending: StateSet,

    /// States meaning "converged".
    pub target: StateSet,

    /// Maximum wall-clock time for the whole wait.
    #[serde(default = "default_timeout")]
    #[cfg_attr(feature = "humantime", serde(with = "humantime_serde"))]
    pub timeout: Duration,

    /// Sleep before the first refresh.
    #[serde(default)]
    #[cfg_attr(feature = "humantime", serde(with = "humantime_serde"))]
    pub initial_delay: Duration,

    /// Floor on the spacing between refreshes.
    #[serde(default)]
    #[cfg_attr(feature = "humantime", serde(with = "humantime_serde"))]
    pub min_interval: Duration,

    /// Number of consecutive target observations required before success.
    #[serde(default = "default_occurrence")]
    pub continuous_target_occurrence: u32,

    /// Fail once more than this many consecutive refreshes carried no value.
    /// `None` waits on empty observations for as long as the timeout allows.
    #[serde(default)]
    pub not_found_checks: Option<u32>,
}

impl WaitPolicy {
    /// Start building a policy.
    #[must_use]
    pub fn builder() -> WaitPolicyBuilder {
        WaitPolicyBuilder::default()
    }

    /// Policy waiting for `target` through `pending` with defaults elsewhere.
    pub fn new(
        pending: impl Into<StateSet>,
        target: impl Into<StateSet>,
        timeout: Duration,
    ) -> Self {
        Self {
            pending: pending.into(),
            target: target.into(),
            timeout,
            initial_delay: Duration::ZERO,
            min_interval: Duration::ZERO,
            continuous_target_occurrence: 1,
            not_found_checks: None,
        }
    }

    /// Set the initial delay.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the minimum poll interval.
    #[must_use]
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Classify an observed token.
    #[must_use]
    pub fn classify(&self, token: &str) -> Classification {
        Classification::of(token, &self.pending, &self.target)
    }

    /// Check the policy before any polling happens.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.target.is_empty() {
            return Err(ConfigError::validation("target state set must not be empty"));
        }

        if self.target.has_wildcard() {
            return Err(ConfigError::validation(format!(
                "the wildcard token `{}` is only allowed in the pending set",
                StateToken::WILDCARD
            )));
        }

        if self.timeout.is_zero() {
            return Err(ConfigError::validation("timeout must be positive"));
        }

        if !self.pending.has_wildcard() {
            let overlap = self.pending.intersection(&self.target);
            if !overlap.is_empty() {
                let names: Vec<&str> = overlap.iter().map(StateToken::as_str).collect();
                return Err(ConfigError::validation(format!(
                    "states {names:?} are both pending and target"
                )));
            }
        }

        if self.continuous_target_occurrence == 0 {
            return Err(ConfigError::validation(
                "continuous_target_occurrence must be at least 1",
            ));
        }

        Ok(())
    }
}

/// Builder for [`WaitPolicy`].
#[derive(Debug, Clone)]
pub struct WaitPolicyBuilder {
    policy: WaitPolicy,
}

impl Default for WaitPolicyBuilder {
    fn default() -> Self {
        Self {
            policy: WaitPolicy::new(StateSet::new(), StateSet::new(), DEFAULT_TIMEOUT),
        }
    }
}

impl WaitPolicyBuilder {
    /// Add pending states.
    pub fn pending<I, T>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<StateToken>,
    {
        for state in states {
            self.policy.pending.insert(state);
        }
        self
    }

    /// Treat every non-target state as pending.
    pub fn any_pending(mut self) -> Self {
        self.policy.pending.insert(StateToken::wildcard());
        self
    }

    /// Add target states.
    pub fn target<I, T>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<StateToken>,
    {
        for state in states {
            self.policy.target.insert(state);
        }
        self
    }

    /// Overall timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.policy.timeout = timeout;
        self
    }

    /// Delay before the first refresh.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.policy.initial_delay = delay;
        self
    }

    /// Minimum spacing between refreshes.
    pub fn min_interval(mut self, interval: Duration) -> Self {
        self.policy.min_interval = interval;
        self
    }

    /// Require the target state on this many consecutive refreshes.
    pub fn continuous_target_occurrence(mut self, occurrences: u32) -> Self {
        self.policy.continuous_target_occurrence = occurrences;
        self
    }

    /// Fail after more than `checks` consecutive refreshes without a value.
    pub fn not_found_checks(mut self, checks: u32) -> Self {
        self.policy.not_found_checks = Some(checks);
        self
    }

    /// Validate and return the policy.
    pub fn build(self) -> ConfigResult<WaitPolicy> {
        self.policy.validate()?;
        Ok(self.policy)
    }
}
