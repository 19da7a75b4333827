//! # Converge
//!
//! Blocking-until-converged polling for asynchronous provisioning calls.
//!
//! Provisioning APIs hand back an identifier straight away while the real
//! resource keeps moving through intermediate states. This crate provides
//! the one primitive every such operation reuses: poll an observable state,
//! classify it against pending and target sets, and return once it
//! converges, times out, or fails.
//!
//! ## Pieces
//!
//! - [`StateToken`] / [`StateSet`] / [`Classification`]: what a state is and
//!   how one observation is judged
//! - [`Refresh`]: the per-poll observation a caller supplies
//! - [`WaitPolicy`]: pending/target sets, timeout, initial delay, interval floor
//! - [`Waiter`]: the poll loop itself
//! - [`WaitError`]: config, refresh, unexpected-state, timeout, not-found and
//!   cancellation failures, each distinguishable via [`WaitError::kind`]
//!
//! ## Quick Start
//!
//! ```rust
//! use converge::{Observation, WaitPolicy, refresh_fn, wait_for_state};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::time::Duration;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let polls = Arc::new(AtomicU32::new(0));
//!     let refresh = refresh_fn(move || {
//!         let n = polls.fetch_add(1, Ordering::SeqCst);
//!         async move {
//!             let state = if n < 2 { "STARTING" } else { "RUNNING" };
//!             Ok(Observation::found(n, state))
//!         }
//!     });
//!
//!     let policy = WaitPolicy::new(["STARTING"], ["RUNNING"], Duration::from_secs(10));
//!     let converged_on = wait_for_state(policy, refresh).await?;
//!     assert_eq!(converged_on, 2);
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod backoff;
pub mod error;
pub mod policy;
pub mod refresh;
pub mod state;
pub mod waiter;

pub use backoff::PollSchedule;
pub use error::{ConfigError, ConfigResult, WaitError, WaitErrorKind, WaitResult};
pub use policy::{DEFAULT_TIMEOUT, WaitPolicy, WaitPolicyBuilder};
pub use refresh::{BoxError, Observation, Refresh, RefreshFn, refresh_fn};
pub use state::{Classification, StateSet, StateToken};
pub use waiter::{WaitStats, Waiter, wait_for_state};

/// Common imports
pub mod prelude {
    pub use crate::{
        Observation, Refresh, StateToken, WaitError, WaitPolicy, Waiter, refresh_fn,
        wait_for_state,
    };
}
