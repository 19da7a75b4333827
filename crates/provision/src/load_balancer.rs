//! Waiting for an ordered load balancer to appear.
//!
//! An order returns an order id, not a load balancer id; the load balancer
//! only becomes addressable once provisioning completes. The refresh
//! therefore searches by order id and derives the state from how many
//! load balancers matched: none is pending, exactly one is complete, and
//! more than one is an error.

use std::time::Duration;

use async_trait::async_trait;
use converge::{BoxError, Observation, Refresh, WaitPolicy, Waiter};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::{ApiError, ProvisionError, ProvisionResult};

/// No load balancer for the order yet.
pub const STATE_PENDING: &str = "PENDING";

/// Exactly one load balancer matched the order.
pub const STATE_COMPLETE: &str = "COMPLETE";

/// Default time to wait for an order to be fulfilled.
pub const DEFAULT_ORDER_TIMEOUT: Duration = Duration::from_secs(45 * 60);

/// Delay before the first search; a fresh order is never fulfilled instantly.
pub const ORDER_SETTLE_DELAY: Duration = Duration::from_secs(60);

/// Spacing floor between searches.
pub const SEARCH_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Catalogue identifiers used when searching for ordered load balancers.
///
/// Passed explicitly into each search instead of living in process-wide
/// constants, so tests and alternate catalogues can supply their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalancerSearchConfig {
    /// Product package the order was placed against
    pub package_key: String,
    /// Fields the search should return
    pub object_mask: String,
}

impl Default for LoadBalancerSearchConfig {
    fn default() -> Self {
        Self {
            package_key: "LOAD_BALANCER_AS_A_SERVICE".to_owned(),
            object_mask: "id,name,address,orderId".to_owned(),
        }
    }
}

/// Server-side filter for a search by order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFilter {
    /// Order that created the load balancer
    pub order_id: u64,
    /// Product package the order was placed against
    pub package_key: String,
    /// Fields the search should return
    pub object_mask: String,
}

impl OrderFilter {
    /// Filter for `order_id` under `config`.
    #[must_use]
    pub fn new(config: &LoadBalancerSearchConfig, order_id: u64) -> Self {
        Self {
            order_id,
            package_key: config.package_key.clone(),
            object_mask: config.object_mask.clone(),
        }
    }
}

/// A provisioned load balancer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancer {
    /// Load balancer id
    pub id: u64,
    /// Display name
    pub name: String,
    /// Public address
    pub address: String,
    /// Order that created it
    pub order_id: u64,
}

/// Search access to load balancers.
#[async_trait]
pub trait LoadBalancerApi: Send + Sync {
    /// All load balancers matching the filter.
    async fn find_by_order(&self, filter: &OrderFilter) -> Result<Vec<LoadBalancer>, ApiError>;
}

/// The search matched more than one load balancer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("expected exactly one load balancer for order {order_id}, found {count}")]
pub struct AmbiguousOrder {
    /// Order searched for
    pub order_id: u64,
    /// Number of matches
    pub count: usize,
}

/// Refresh classifying a search by result count.
#[derive(Debug)]
pub struct OrderSearch<'a, A: ?Sized> {
    api: &'a A,
    filter: OrderFilter,
}

impl<'a, A: LoadBalancerApi + ?Sized> OrderSearch<'a, A> {
    /// Search for the load balancer created by `order_id`.
    pub fn new(api: &'a A, config: &LoadBalancerSearchConfig, order_id: u64) -> Self {
        Self {
            api,
            filter: OrderFilter::new(config, order_id),
        }
    }
}

#[async_trait]
impl<A: LoadBalancerApi + ?Sized> Refresh for OrderSearch<'_, A> {
    type Output = LoadBalancer;

    async fn refresh(&self) -> Result<Observation<LoadBalancer>, BoxError> {
        let mut found = self.api.find_by_order(&self.filter).await?;
        debug!(order_id = self.filter.order_id, matches = found.len(), "load balancer search");

        match found.len() {
            0 => Ok(Observation::absent(STATE_PENDING)),
            1 => {
                let lb = found.remove(0);
                Ok(Observation::found(lb, STATE_COMPLETE))
            }
            count => Err(AmbiguousOrder {
                order_id: self.filter.order_id,
                count,
            }
            .into()),
        }
    }
}

/// `PENDING` → `COMPLETE` policy for order searches.
#[must_use]
pub fn order_policy(timeout: Duration) -> WaitPolicy {
    WaitPolicy::new([STATE_PENDING], [STATE_COMPLETE], timeout)
        .with_initial_delay(ORDER_SETTLE_DELAY)
        .with_min_interval(SEARCH_POLL_INTERVAL)
}

/// Block until the order has produced exactly one load balancer.
pub async fn wait_for_load_balancer<A>(
    api: &A,
    config: &LoadBalancerSearchConfig,
    order_id: u64,
    timeout: Duration,
) -> ProvisionResult<LoadBalancer>
where
    A: LoadBalancerApi + ?Sized,
{
    Waiter::new(order_policy(timeout), OrderSearch::new(api, config, order_id))
        .with_label(format!("load balancer order {order_id}"))
        .wait()
        .await
        .map_err(|source| ProvisionError::wait("load balancer order", order_id, source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    struct Matches(usize);

    #[async_trait]
    impl LoadBalancerApi for Matches {
        async fn find_by_order(
            &self,
            filter: &OrderFilter,
        ) -> Result<Vec<LoadBalancer>, ApiError> {
            Ok((0..self.0)
                .map(|i| LoadBalancer {
                    id: 100 + i as u64,
                    name: format!("lb-{i}"),
                    address: format!("10.0.0.{i}"),
                    order_id: filter.order_id,
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_no_match_is_pending() {
        let api = Matches(0);
        let search = OrderSearch::new(&api, &LoadBalancerSearchConfig::default(), 7);
        let observed = search.refresh().await.unwrap();
        assert_eq!(observed.state, STATE_PENDING);
        assert!(observed.value.is_none());
    }

    #[tokio::test]
    async fn test_single_match_is_complete() {
        let api = Matches(1);
        let search = OrderSearch::new(&api, &LoadBalancerSearchConfig::default(), 7);
        let observed = search.refresh().await.unwrap();
        assert_eq!(observed.state, STATE_COMPLETE);
        assert_eq!(observed.value.map(|lb| lb.id), Some(100));
    }

    #[rstest]
    #[case(2)]
    #[case(5)]
    #[tokio::test]
    async fn test_many_matches_cite_count(#[case] count: usize) {
        let api = Matches(count);
        let search = OrderSearch::new(&api, &LoadBalancerSearchConfig::default(), 7);
        let err = search.refresh().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("expected exactly one load balancer for order 7, found {count}")
        );
    }

    #[test]
    fn test_filter_uses_supplied_config() {
        let config = LoadBalancerSearchConfig {
            package_key: "TEST_PACKAGE".into(),
            object_mask: "id".into(),
        };
        let filter = OrderFilter::new(&config, 9);
        assert_eq!(filter.package_key, "TEST_PACKAGE");
        assert_eq!(filter.order_id, 9);
    }
}
