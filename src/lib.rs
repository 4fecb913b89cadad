//! # group-orders
//!
//! Coordination core for group food orders.
//!
//! One person announces an order at a restaurant, colleagues add the
//! items they want, and the coordinator drives the order through its
//! lifecycle until it is delivered or canceled:
//!
//! ```text
//! preparing ──▶ ordering ──▶ ordered ──▶ delivered
//!     │             │            │
//!     └─────────────┴────────────┴──────▶ canceled (reason required)
//! ```
//!
//! Items can only be added, changed or removed while the order is
//! preparing. Every state change is recorded in the order's history.
//!
//! ## Architecture
//!
//! ```text
//! Callers (any presentation layer)
//!     │
//!     ├── OrderService (service/)
//!     │       │
//!     │       ├── SessionStore (session/)
//!     │       └── OrderLedger (ledger/)
//!     │
//!     ├── Order, OrderItem, OrderState (domain/)
//!     │
//!     └── PostgreSQL or in-memory storage
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod ledger;
pub mod service;
pub mod session;
