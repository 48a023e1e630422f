#![warn(clippy::unwrap_used)]

pub mod auth;
pub mod rate_limit;
pub mod rest;
pub mod server;
pub mod swagger;
pub mod unsubscribe;
pub mod webhooks;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod testing;

pub use rest::AppState;
pub use server::{router, ApiServer};
pub use swagger::ApiDoc;
