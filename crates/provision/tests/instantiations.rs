//! Provisioning waits against scripted fake clients
//!
//! Each fake replays a queue of responses and repeats the last one once the
//! queue drains. Tests run on a paused clock.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use converge::WaitErrorKind;
use converge_provision::{
    ApiError, Application, ApplicationApi, BillingApi, LoadBalancer, LoadBalancerApi,
    LoadBalancerSearchConfig, OrderFilter, active_transaction_message,
    wait_for_application_running, wait_for_cancellation, wait_for_load_balancer,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

/// Response queue shared by the fakes.
struct Replay<T> {
    responses: Mutex<VecDeque<T>>,
    calls: Mutex<u32>,
}

impl<T: Clone> Replay<T> {
    fn new(responses: impl IntoIterator<Item = T>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            calls: Mutex::new(0),
        }
    }

    fn next(&self) -> T {
        *self.calls.lock() += 1;
        let mut queue = self.responses.lock();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap()
        }
    }

    fn calls(&self) -> u32 {
        *self.calls.lock()
    }
}

struct FakeApps(Replay<Result<Application, ApiError>>);

#[async_trait]
impl ApplicationApi for FakeApps {
    async fn get_application(&self, _guid: &str) -> Result<Application, ApiError> {
        self.0.next()
    }
}

fn app(state: &str) -> Result<Application, ApiError> {
    Ok(Application {
        guid: "app-42".into(),
        name: "checkout".into(),
        state: state.into(),
    })
}

struct FakeLoadBalancers {
    counts: Replay<usize>,
    seen: Mutex<Vec<OrderFilter>>,
}

#[async_trait]
impl LoadBalancerApi for FakeLoadBalancers {
    async fn find_by_order(&self, filter: &OrderFilter) -> Result<Vec<LoadBalancer>, ApiError> {
        self.seen.lock().push(filter.clone());
        let count = self.counts.next();
        Ok((0..count)
            .map(|i| LoadBalancer {
                id: 900 + i as u64,
                name: format!("lb-{i}"),
                address: "203.0.113.10".into(),
                order_id: filter.order_id,
            })
            .collect())
    }
}

struct FakeBilling(Replay<Result<bool, ApiError>>);

#[async_trait]
impl BillingApi for FakeBilling {
    async fn cancel_service(&self, _billing_item_id: u64) -> Result<bool, ApiError> {
        self.0.next()
    }
}

#[tokio::test(start_paused = true)]
async fn application_reaches_running() {
    let api = FakeApps(Replay::new([app("STARTING"), app("STARTING"), app("RUNNING")]));

    let running = wait_for_application_running(&api, "app-42", Duration::from_secs(600))
        .await
        .unwrap();

    assert_eq!(running.state, "RUNNING");
    assert_eq!(running.name, "checkout");
    assert_eq!(api.0.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn crashed_application_is_unexpected() {
    let api = FakeApps(Replay::new([app("STARTING"), app("CRASHED"), app("RUNNING")]));

    let err = wait_for_application_running(&api, "app-42", Duration::from_secs(600))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), WaitErrorKind::UnexpectedState);
    assert!(err.to_string().starts_with("application app-42: unexpected state 'CRASHED'"));
    assert_eq!(api.0.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn application_timeout_names_resource_and_elapsed() {
    let api = FakeApps(Replay::new([app("STARTING")]));

    let err = wait_for_application_running(&api, "app-42", Duration::from_secs(60))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), WaitErrorKind::Timeout);
    let message = err.to_string();
    assert!(message.starts_with("application app-42: timeout"), "{message}");
    assert!(message.contains("elapsed: 60s"), "{message}");
    assert!(message.contains("last state: 'STARTING'"), "{message}");
}

#[tokio::test(start_paused = true)]
async fn application_lookup_failure_is_fatal() {
    let api = FakeApps(Replay::new([
        app("STARTING"),
        Err(ApiError::new(404, "application not found")),
    ]));

    let err = wait_for_application_running(&api, "app-42", Duration::from_secs(600))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), WaitErrorKind::Refresh);
    assert!(err.to_string().contains("API error 404: application not found"));
    assert_eq!(api.0.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn load_balancer_appears_after_searches() {
    let api = FakeLoadBalancers {
        counts: Replay::new([0, 0, 1]),
        seen: Mutex::new(Vec::new()),
    };
    let config = LoadBalancerSearchConfig {
        package_key: "TEST_LB_PACKAGE".into(),
        object_mask: "id,orderId".into(),
    };
    let started = tokio::time::Instant::now();

    let lb = wait_for_load_balancer(&api, &config, 5150, Duration::from_secs(45 * 60))
        .await
        .unwrap();

    assert_eq!(lb.id, 900);
    assert_eq!(lb.order_id, 5150);
    assert_eq!(api.counts.calls(), 3);
    // settle delay, then two 10s gaps
    assert_eq!(started.elapsed(), Duration::from_secs(80));

    let seen = api.seen.lock();
    assert!(seen.iter().all(|f| f.package_key == "TEST_LB_PACKAGE" && f.order_id == 5150));
}

#[tokio::test(start_paused = true)]
async fn ambiguous_order_is_fatal() {
    let api = FakeLoadBalancers {
        counts: Replay::new([0, 2, 1]),
        seen: Mutex::new(Vec::new()),
    };

    let err = wait_for_load_balancer(
        &api,
        &LoadBalancerSearchConfig::default(),
        77,
        Duration::from_secs(45 * 60),
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), WaitErrorKind::Refresh);
    assert!(err.to_string().contains("found 2"), "{err}");
    assert_eq!(api.counts.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn cancellation_retries_through_active_transaction() {
    let busy = Err(ApiError::new(500, active_transaction_message(314)));
    let api = FakeBilling(Replay::new([busy.clone(), busy, Ok(true)]));

    let done = wait_for_cancellation(&api, 314, Duration::from_secs(600))
        .await
        .unwrap();

    assert!(done);
    assert_eq!(api.0.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn cancellation_other_failure_stops_immediately() {
    let api = FakeBilling(Replay::new([
        Err(ApiError::new(500, "Billing item is not cancellable")),
        Ok(true),
    ]));

    let err = wait_for_cancellation(&api, 314, Duration::from_secs(600))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), WaitErrorKind::Refresh);
    assert!(err.to_string().contains("Billing item is not cancellable"));
    assert_eq!(api.0.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_blocked_until_timeout() {
    let api = FakeBilling(Replay::new([Err(ApiError::new(
        500,
        active_transaction_message(314),
    ))]));

    let err = wait_for_cancellation(&api, 314, Duration::from_secs(30))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), WaitErrorKind::Timeout);
    assert!(err.to_string().contains("last state: 'IN_PROGRESS'"), "{err}");
    assert!(api.0.calls() > 1);
}
