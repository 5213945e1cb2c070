pub mod config;
pub mod crypto;
pub mod db;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod oauth;
pub mod provider;
pub mod providers;
pub mod types;
pub mod vault;

pub use engine::{Engine, StoreOutcome};
pub use error::PulseError;
pub use provider::Provider;
pub use types::{DateRange, Dimension};
