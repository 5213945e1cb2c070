//! Canonical metric schema plus the normalize / score / aggregate pipeline.

pub mod aggregate;
pub mod normalize;
pub mod record;
pub mod scoring;

pub use aggregate::{AggregateWindow, TrendDirection, aggregate};
pub use normalize::normalize;
pub use record::{Dimensions, MetricRecord};
pub use scoring::score;
