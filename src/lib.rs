//! Redshift data source backend
//!
//! Translates visualization queries into asynchronous statements against the
//! Redshift Data API: submit, poll with bounded backoff, page through results
//! and materialize them into typed columnar frames. Many independent queries
//! run concurrently and share per-scope API clients.

pub mod api;
pub mod client;
pub mod config;
pub mod core;
pub mod result;
pub mod statement;
pub mod utils;
