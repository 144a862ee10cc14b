// Gatewatch - metrics collection and aggregation for request-routing gateways

pub mod collector;
pub mod config;
pub mod constants;
pub mod error;
pub mod exporter;
pub mod handler;
pub mod logging;
pub mod metrics;
pub mod proxy;
pub mod registry;
pub mod resources;
pub mod router;
pub mod stats;

pub use collector::Metrics;
pub use error::MetricsError;
