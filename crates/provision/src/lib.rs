//! # Converge Provision
//!
//! Provisioning waits built on [`converge`]. Each module pairs a narrow
//! client trait with a [`converge::Refresh`] implementation and a policy:
//!
//! - [`application`]: status-string polling, `STARTING` → `RUNNING`
//! - [`load_balancer`]: existence search by order id, classified by match count
//! - [`billing`]: cancellation retried while an active transaction blocks it
//!
//! Real REST clients implement the client traits; everything else is
//! provider-agnostic.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod application;
pub mod billing;
pub mod error;
pub mod load_balancer;

pub use application::{
    Application, ApplicationApi, ApplicationStatus, wait_for_application_running,
};
pub use billing::{
    BillingApi, ServiceCancellation, active_transaction_message, wait_for_cancellation,
};
pub use error::{ApiError, ProvisionError, ProvisionResult};
pub use load_balancer::{
    AmbiguousOrder, LoadBalancer, LoadBalancerApi, LoadBalancerSearchConfig, OrderFilter,
    OrderSearch, wait_for_load_balancer,
};
