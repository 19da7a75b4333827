//! Waiting for a deployed application to start.
//!
//! The application record carries an explicit status field, which is used
//! as the state token directly.

use std::time::Duration;

use async_trait::async_trait;
use converge::{BoxError, Observation, Refresh, WaitPolicy, Waiter};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ApiError, ProvisionError, ProvisionResult};

/// Status of an application that is still booting.
pub const STATUS_STARTING: &str = "STARTING";

/// Status of an application that is up.
pub const STATUS_RUNNING: &str = "RUNNING";

/// Default time to wait for an application to start.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Spacing floor between status checks.
pub const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// A deployed application as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    /// Platform identifier
    pub guid: String,
    /// Display name
    pub name: String,
    /// Lifecycle status, e.g. `STARTING` or `RUNNING`
    pub state: String,
}

/// Read access to applications.
#[async_trait]
pub trait ApplicationApi: Send + Sync {
    /// Fetch one application by guid.
    async fn get_application(&self, guid: &str) -> Result<Application, ApiError>;
}

/// Refresh reporting an application's status field.
///
/// Any API failure is fatal.
#[derive(Debug)]
pub struct ApplicationStatus<'a, A: ?Sized> {
    api: &'a A,
    guid: String,
}

impl<'a, A: ApplicationApi + ?Sized> ApplicationStatus<'a, A> {
    /// Watch the application with this guid.
    pub fn new(api: &'a A, guid: impl Into<String>) -> Self {
        Self {
            api,
            guid: guid.into(),
        }
    }
}

#[async_trait]
impl<A: ApplicationApi + ?Sized> Refresh for ApplicationStatus<'_, A> {
    type Output = Application;

    async fn refresh(&self) -> Result<Observation<Application>, BoxError> {
        let app = self.api.get_application(&self.guid).await?;
        debug!(guid = %self.guid, state = %app.state, "application status");
        let state = app.state.clone();
        Ok(Observation::found(app, state))
    }
}

/// `STARTING` → `RUNNING` policy.
#[must_use]
pub fn running_policy(timeout: Duration) -> WaitPolicy {
    WaitPolicy::new([STATUS_STARTING], [STATUS_RUNNING], timeout)
        .with_min_interval(STATUS_POLL_INTERVAL)
}

/// Block until the application reports `RUNNING`.
pub async fn wait_for_application_running<A>(
    api: &A,
    guid: &str,
    timeout: Duration,
) -> ProvisionResult<Application>
where
    A: ApplicationApi + ?Sized,
{
    Waiter::new(running_policy(timeout), ApplicationStatus::new(api, guid))
        .with_label(format!("application {guid}"))
        .wait()
        .await
        .map_err(|source| ProvisionError::wait("application", guid, source))
}
