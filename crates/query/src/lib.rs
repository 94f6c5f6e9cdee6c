#![warn(clippy::unwrap_used)]

pub mod client;
pub mod promql;
pub mod response;

pub use client::PrometheusClient;
