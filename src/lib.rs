//! # PolloPollo client core
//!
//! Client-side core of the PolloPollo donation platform: producers list
//! products, receivers apply for them, donors fund accepted applications.
//! All persistence and business rules live in the platform's REST API; this
//! crate owns what the client itself has to get right:
//!
//! | Concern      | Module                                      |
//! |--------------|---------------------------------------------|
//! | Domain model | [`types`] — applications, statuses, roles   |
//! | API access   | [`api`] — one `reqwest` client per session  |
//! | Memoization  | [`cache`] — exact-key query cache           |
//! | Transitions  | [`workflow`] — lock/confirm/withdraw/delete |
//! | Pagination   | [`listing`] — cache-first paged listings    |
//!
//! The only concurrency-sensitive path is the donation lock:
//! [`workflow::begin_donation`] re-reads the application from the API before
//! issuing the
//! `Open -> Locked` transition so that a donor looking at a stale page is
//! routed to a locked notice instead of double-funding.

pub mod api;
pub mod cache;
pub mod config;
pub mod errors;
pub mod listing;
pub mod types;
pub mod workflow;

pub use api::{ApiClient, ApplicationSource};
pub use cache::{CacheKey, ListKind, PageQuery, QueryCache};
pub use config::Config;
pub use errors::{ClientError, Result};
pub use listing::{ListCoordinator, SortOrder};
pub use types::{Application, ApplicationStatus, Product, StatusUpdate, UserRole};
