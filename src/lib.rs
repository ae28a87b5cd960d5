//! Per-user match records with a recency index.
//!
//! Records live under `record:{user}:{match}` as field sets and each user has a
//! sorted index of match ids by last write. Both keys carry a rolling 42-day
//! expiration; index members left behind by expired records are removed when
//! they are next read.

pub mod app;
pub mod backend;
pub mod clock;
pub mod config;
pub mod errors;
pub mod logging;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
