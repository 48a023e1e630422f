#![warn(clippy::unwrap_used)]

//! Persistence seam for enrollments and sends.

pub mod memory;
pub mod store;

pub use memory::MemoryStore;
pub use store::{EngineStore, StoreError, StoreResult};
