//! The convergence engine.
//!
//! A [`Waiter`] drives one [`Refresh`] until the observed state lands in the
//! target set, the timeout passes, or something fatal happens. It is built
//! for a single operation, consumed by [`Waiter::wait`], and dropped.
//!
//! ```rust
//! use converge::{Observation, WaitPolicy, Waiter, refresh_fn};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), converge::WaitError> {
//! let policy = WaitPolicy::new(["STARTING"], ["RUNNING"], Duration::from_secs(30));
//! let refresh = refresh_fn(|| async { Ok(Observation::found("app-1", "RUNNING")) });
//!
//! let app = Waiter::new(policy, refresh).wait().await?;
//! assert_eq!(app, "app-1");
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep_until, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::backoff::PollSchedule;
use crate::error::{WaitError, WaitResult};
use crate::policy::WaitPolicy;
use crate::refresh::{Observation, Refresh};
use crate::state::{Classification, StateToken};

/// What a completed wait looked like.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaitStats {
    /// Refreshes performed.
    pub polls: u32,
    /// Time between the starts of consecutive refreshes.
    pub intervals: Vec<Duration>,
    /// Total time spent in the wait call.
    pub elapsed: Duration,
    /// State seen on the final refresh.
    pub last_state: Option<StateToken>,
}

/// Why a guarded future did not finish.
enum Interrupt {
    Deadline,
    Cancelled,
}

/// Convergence engine for one wait.
pub struct Waiter<R> {
    policy: WaitPolicy,
    refresh: R,
    cancellation: Option<CancellationToken>,
    label: Option<String>,
}

impl<R> fmt::Debug for Waiter<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waiter")
            .field("policy", &self.policy)
            .field("label", &self.label)
            .field("cancellable", &self.cancellation.is_some())
            .finish_non_exhaustive()
    }
}

impl<R> Waiter<R>
where
    R: Refresh,
    R::Output: fmt::Debug,
{
    /// Pair a policy with the refresh it drives.
    pub fn new(policy: WaitPolicy, refresh: R) -> Self {
        Self {
            policy,
            refresh,
            cancellation: None,
            label: None,
        }
    }

    /// Allow the caller to abort the wait early.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Name the watched entity in log output, e.g. `"application 7f3a"`.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The policy this waiter runs with.
    pub fn policy(&self) -> &WaitPolicy {
        &self.policy
    }

    /// Wait for convergence and return the converged value.
    pub async fn wait(self) -> WaitResult<R::Output> {
        self.wait_with_stats().await.map(|(value, _)| value)
    }

    /// Wait for convergence, also returning poll statistics.
    pub async fn wait_with_stats(self) -> WaitResult<(R::Output, WaitStats)> {
        self.policy.validate()?;

        let span = info_span!(
            "converge.wait",
            label = self.label.as_deref().unwrap_or("entity"),
            target_states = %self.policy.target,
            pending_states = %self.policy.pending,
            timeout = ?self.policy.timeout,
        );

        self.run().instrument(span).await
    }

    async fn run(self) -> WaitResult<(R::Output, WaitStats)> {
        let policy = &self.policy;
        let start = Instant::now();
        let deadline = deadline_after(start, policy.timeout);
        let mut schedule = PollSchedule::new(policy.min_interval, policy.timeout);
        let mut stats = WaitStats::default();
        let mut last_value: Option<String> = None;
        let mut last_poll: Option<Instant> = None;
        let mut target_seen = 0_u32;
        let mut empty_checks = 0_u32;

        if !policy.initial_delay.is_zero() {
            debug!(delay = ?policy.initial_delay, "waiting before first refresh");
            let wake = wake_at(start, policy.initial_delay, deadline);
            self.pause(wake, deadline, start).await?;
        }

        loop {
            let now = Instant::now();
            if now >= deadline {
                stats.elapsed = start.elapsed();
                return Err(self.timed_out(&stats, last_value));
            }

            if let Some(previous) = last_poll {
                stats.intervals.push(now - previous);
            }
            last_poll = Some(now);
            stats.polls += 1;

            let observed = match self.guard(deadline, self.refresh.refresh()).await {
                Ok(observed) => observed,
                Err(Interrupt::Deadline) => {
                    stats.elapsed = start.elapsed();
                    warn!(poll = stats.polls, "refresh still running at deadline");
                    return Err(self.timed_out(&stats, last_value));
                }
                Err(Interrupt::Cancelled) => return Err(cancelled(start)),
            };

            let Observation { value, state } = match observed {
                Ok(observation) => observation,
                Err(source) => {
                    warn!(poll = stats.polls, error = %source, "refresh failed");
                    return Err(WaitError::refresh(stats.polls, source));
                }
            };

            last_value = value.as_ref().map(|v| format!("{v:?}"));
            stats.last_state = Some(state.clone());
            if value.is_some() {
                empty_checks = 0;
            } else {
                empty_checks += 1;
            }

            let interval = match policy.classify(state.as_str()) {
                Classification::Target => {
                    let Some(value) = value else {
                        warn!(poll = stats.polls, %state, "target state reported without a value");
                        return Err(WaitError::refresh(
                            stats.polls,
                            format!("target state '{state}' observed without a value"),
                        ));
                    };

                    target_seen += 1;
                    if target_seen >= policy.continuous_target_occurrence {
                        stats.elapsed = start.elapsed();
                        info!(
                            polls = stats.polls,
                            elapsed = ?stats.elapsed,
                            %state,
                            "state converged"
                        );
                        return Ok((value, stats));
                    }

                    debug!(
                        poll = stats.polls,
                        %state,
                        seen = target_seen,
                        required = policy.continuous_target_occurrence,
                        "target observed, confirming"
                    );
                    schedule.steady_interval()
                }
                Classification::Pending => {
                    target_seen = 0;
                    if let Some(limit) = policy.not_found_checks
                        && empty_checks > limit
                    {
                        warn!(checks = empty_checks, %state, "entity never appeared");
                        return Err(WaitError::NotFound {
                            checks: empty_checks,
                            last_state: state,
                        });
                    }

                    let interval = schedule.next_interval();
                    debug!(poll = stats.polls, %state, next = ?interval, "still pending");
                    interval
                }
                Classification::Unexpected => {
                    warn!(poll = stats.polls, %state, "unexpected state");
                    return Err(WaitError::UnexpectedState {
                        state,
                        pending: policy.pending.clone(),
                        target: policy.target.clone(),
                    });
                }
            };

            let wake = wake_at(Instant::now(), interval, deadline);
            self.pause(wake, deadline, start).await?;
        }
    }

    /// Sleep until `wake`; only cancellation cuts it short with an error.
    async fn pause(&self, wake: Instant, deadline: Instant, start: Instant) -> WaitResult<()> {
        match self.guard(deadline, sleep_until(wake)).await {
            Ok(()) | Err(Interrupt::Deadline) => Ok(()),
            Err(Interrupt::Cancelled) => Err(cancelled(start)),
        }
    }

    /// Race `fut` against the deadline and the cancellation token.
    async fn guard<F: Future>(&self, deadline: Instant, fut: F) -> Result<F::Output, Interrupt> {
        let bounded = timeout_at(deadline, fut);
        match &self.cancellation {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => Err(Interrupt::Cancelled),
                res = bounded => res.map_err(|_| Interrupt::Deadline),
            },
            None => bounded.await.map_err(|_| Interrupt::Deadline),
        }
    }

    fn timed_out(&self, stats: &WaitStats, last_value: Option<String>) -> WaitError {
        warn!(
            polls = stats.polls,
            elapsed = ?stats.elapsed,
            last_state = ?stats.last_state,
            "timed out waiting for convergence"
        );
        WaitError::Timeout {
            elapsed: stats.elapsed,
            timeout: self.policy.timeout,
            last_state: stats.last_state.clone(),
            last_value,
            polls: stats.polls,
        }
    }
}

/// Stand-in deadline for timeouts too large to add to an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline_after(start: Instant, timeout: Duration) -> Instant {
    start
        .checked_add(timeout)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

/// `from + delay`, never past `deadline`.
fn wake_at(from: Instant, delay: Duration, deadline: Instant) -> Instant {
    from.checked_add(delay)
        .map_or(deadline, |wake| wake.min(deadline))
}

fn cancelled(start: Instant) -> WaitError {
    let elapsed = start.elapsed();
    info!(elapsed = ?elapsed, "wait cancelled");
    WaitError::Cancelled { elapsed }
}

/// One-shot form of [`Waiter::new`] followed by [`Waiter::wait`].
pub async fn wait_for_state<R>(policy: WaitPolicy, refresh: R) -> WaitResult<R::Output>
where
    R: Refresh,
    R::Output: fmt::Debug,
{
    Waiter::new(policy, refresh).wait().await
}
