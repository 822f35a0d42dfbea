//! Application layer coordinating purchases against the billing backend.
//!
//! [`orchestrator::PurchaseOrchestrator`] is the synchronous state machine;
//! [`service::PurchaseService`] runs it on its own tokio task in an
//! actor-like loop fed by channels, so callers and backend callbacks never
//! touch its state concurrently.

pub mod orchestrator;
pub mod service;
