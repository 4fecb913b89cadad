//! Service layer: business logic orchestration.
//!
//! [`OrderService`] checks session permissions, delegates lifecycle and
//! item rules to the [`super::ledger::OrderLedger`], and keeps the
//! caller's [`super::session::UserSession`] up to date.

pub mod order_service;

pub use order_service::OrderService;
