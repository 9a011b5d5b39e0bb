//! Webhook dispatch and delivery engine with persisted retry state.
//!
//! This crate implements the outbound notification pipeline: matching
//! monitoring events against webhook subscriptions, creating delivery
//! records, and driving each delivery through an HMAC-signed HTTP POST
//! with exponential-backoff retries.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────┐   ┌────────────┐   ┌───────────────┐   ┌─────────────┐
//! │ Event bus │──▶│ Dispatcher │──▶│ Dispatch pool │──▶│   Worker    │
//! └───────────┘   └────────────┘   └───────────────┘   └─────────────┘
//!                       │                                     │
//!                       ▼                                     ▼
//!                 ┌───────────┐    ┌─────────────┐     ┌─────────────┐
//!                 │ Deliveries │◀──│ Retry sweep │     │ Target URLs │
//!                 │  (storage) │   └─────────────┘     └─────────────┘
//!                 └───────────┘
//! ```
//!
//! The dispatcher never waits for deliveries and never surfaces failures
//! to the event producer; every outcome is captured in the persisted
//! delivery row. The sweeper independently re-submits deliveries whose
//! retry time has elapsed.

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod pool;
pub mod retry;
pub mod signature;
pub mod store;
pub mod sweeper;
pub mod worker;

pub use client::{ClientConfig, DeliveryClient};
pub use dispatcher::Dispatcher;
pub use error::{DeliveryError, Result};
pub use pool::DeliveryPool;
pub use sweeper::RetrySweeper;
pub use worker::{DeliveryStats, DeliveryWorker};

/// Hard timeout for one delivery HTTP attempt, in seconds.
pub const DELIVERY_TIMEOUT_SECONDS: u64 = 10;

/// Maximum response body characters persisted per attempt.
pub const RESPONSE_SNIPPET_CHARS: usize = 1000;

/// Deliveries re-submitted per retry sweep tick.
pub const SWEEP_BATCH_SIZE: i64 = 50;

/// Default number of concurrent dispatch pool workers.
pub const DEFAULT_POOL_WORKERS: usize = 4;

/// Default dispatch pool queue capacity.
pub const DEFAULT_POOL_QUEUE: usize = 512;
