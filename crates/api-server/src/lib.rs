#![warn(clippy::unwrap_used)]

pub mod grpc;
pub mod rest;
pub mod server;

pub use rest::AppState;
pub use server::{router, ApiServer};
