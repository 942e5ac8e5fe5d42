//! Costboard query cache
//!
//! In-memory whole-response cache for dashboard queries:
//!
//! - **Query cache** ([`QueryCache`]): one entry per key with the last value,
//!   last error and the in-flight attempt. Concurrent requests for a key share
//!   one attempt; data younger than the stale window is served as is.
//! - **Observers** ([`QueryObserver`]): per-consumer projections of an entry
//!   with liveness-checked writes.
//! - **Keys** ([`compose_key`]): canonical identity of a logical request.
//!
//! ## Configuration
//!
//! The default stale window is read from `costboard.toml`:
//!
//! ```toml
//! [query]
//! default_stale_time_ms = 30000
//! ```

mod config;
mod error;
mod keys;
mod liveness;
mod observer;
mod store;

pub use config::QueryConfig;
pub use error::{FetchError, QueryError};
pub use keys::{
    INFO_SCOPE, METRICS_SCOPE, ParamValue, QueryKey, QueryParams, compose_key, compose_scoped_key,
};
pub use liveness::{Activation, ActivationToken};
pub use observer::{Fetcher, ObserveOptions, Query, QueryObserver, QueryState};
pub use store::{EntrySnapshot, FetchOptions, QueryCache};
