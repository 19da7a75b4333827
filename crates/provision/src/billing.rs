//! Waiting for a service cancellation to go through.
//!
//! Cancelling a billing item fails while another transaction on it is still
//! running. That one failure is reported with a fixed message, which the
//! refresh maps to a pending state so the engine simply tries again; every
//! other failure is fatal.
//!
//! The match is on the complete message text, billing item id included. If
//! the provider rewords that message the wait stops retrying and fails on
//! the first busy response instead. `test_active_transaction_message_is_pinned`
//! fixes the expected text so such a change shows up as a test failure.
//!
//! Unlike the other refreshes this one is not purely observational: each
//! call re-issues the cancellation. The provider treats a repeated request
//! for an already-accepted cancellation as success.

use std::time::Duration;

use async_trait::async_trait;
use converge::{BoxError, Observation, Refresh, WaitPolicy, Waiter};
use tracing::{debug, warn};

use crate::error::{ApiError, ProvisionError, ProvisionResult};

/// Another transaction on the item is still running.
pub const STATE_IN_PROGRESS: &str = "IN_PROGRESS";

/// The cancellation was accepted.
pub const STATE_CANCELLED: &str = "CANCELLED";

/// Default time to keep retrying a cancellation.
pub const DEFAULT_CANCEL_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Spacing floor between cancellation attempts.
pub const CANCEL_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Exact error text returned while a transaction on `billing_item_id` is
/// still running.
#[must_use]
pub fn active_transaction_message(billing_item_id: u64) -> String {
    format!(
        "An active transaction is in progress for billing item {billing_item_id}. Please try again later."
    )
}

/// Billing operations.
#[async_trait]
pub trait BillingApi: Send + Sync {
    /// Request cancellation of a billing item. `Ok` means the request was
    /// accepted; the flag is the provider's own completion indicator.
    async fn cancel_service(&self, billing_item_id: u64) -> Result<bool, ApiError>;
}

/// Refresh retrying a cancellation until it is accepted.
#[derive(Debug)]
pub struct ServiceCancellation<'a, A: ?Sized> {
    api: &'a A,
    billing_item_id: u64,
    busy_message: String,
}

impl<'a, A: BillingApi + ?Sized> ServiceCancellation<'a, A> {
    /// Cancel `billing_item_id`.
    pub fn new(api: &'a A, billing_item_id: u64) -> Self {
        Self {
            api,
            billing_item_id,
            busy_message: active_transaction_message(billing_item_id),
        }
    }
}

#[async_trait]
impl<A: BillingApi + ?Sized> Refresh for ServiceCancellation<'_, A> {
    type Output = bool;

    async fn refresh(&self) -> Result<Observation<bool>, BoxError> {
        match self.api.cancel_service(self.billing_item_id).await {
            Ok(accepted) => Ok(Observation::found(accepted, STATE_CANCELLED)),
            Err(err) if err.message == self.busy_message => {
                debug!(billing_item_id = self.billing_item_id, "active transaction, will retry");
                Ok(Observation::absent(STATE_IN_PROGRESS))
            }
            Err(err) => {
                warn!(billing_item_id = self.billing_item_id, error = %err, "cancellation rejected");
                Err(err.into())
            }
        }
    }
}

/// `IN_PROGRESS` → `CANCELLED` policy.
#[must_use]
pub fn cancellation_policy(timeout: Duration) -> WaitPolicy {
    WaitPolicy::new([STATE_IN_PROGRESS], [STATE_CANCELLED], timeout)
        .with_min_interval(CANCEL_RETRY_INTERVAL)
}

/// Retry cancelling `billing_item_id` until the provider accepts it.
pub async fn wait_for_cancellation<A>(
    api: &A,
    billing_item_id: u64,
    timeout: Duration,
) -> ProvisionResult<bool>
where
    A: BillingApi + ?Sized,
{
    Waiter::new(
        cancellation_policy(timeout),
        ServiceCancellation::new(api, billing_item_id),
    )
    .with_label(format!("billing item {billing_item_id}"))
    .wait()
    .await
    .map_err(|source| ProvisionError::wait("billing item", billing_item_id, source))
}
