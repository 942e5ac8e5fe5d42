//! Resource call-sites and consumer-facing views over the query cache.

pub mod dashboard;
pub mod error;
pub mod info;
pub mod metrics;
pub mod pagination;
