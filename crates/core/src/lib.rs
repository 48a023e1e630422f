#![warn(clippy::unwrap_used)]

pub mod audit;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use catalog::{SequenceCatalog, SequenceDefinition, Step, Variant};
pub use config::AppConfig;
pub use error::{DripError, DripResult};
