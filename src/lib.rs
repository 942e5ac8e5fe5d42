//! Costboard: query cache and fetch orchestration for an infrastructure cost
//! dashboard.

pub mod application;
pub mod cache;
pub mod config;
pub mod infra;
pub mod util;
