//! Core domain models and shared primitives for skiff.
//!
//! Provides strongly-typed domain models, the closed monitoring event
//! union with its broadcast bus, error handling, clock abstraction, and
//! the PostgreSQL repository layer. All other crates depend on these
//! foundational types for type safety and consistency.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod models;
pub mod storage;
pub mod sync;
pub mod time;

pub use error::{CoreError, Result};
pub use events::{EventBus, MonitorEvent};
pub use models::{
    Delivery, DeliveryId, DeliveryStatus, EndpointId, KpiSnapshot, MetricKind, MetricSample,
    Webhook, WebhookId,
};
pub use sync::CycleGuard;
pub use time::{Clock, RealClock, TestClock};
