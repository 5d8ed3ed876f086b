//! Kubernetes metrics collection library
//!
//! This crate provides the core functionality for:
//! - Periodic collection from nodes, pods and additional endpoints
//! - Conversion of exposition text and usage payloads into metric records
//! - Resource quantity parsing
//! - Cluster API transport and metric sinks
//! - Health checks and observability

pub mod collector;
pub mod converter;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod quantity;
pub mod sink;
pub mod transport;

pub use error::{CollectorError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{CollectorMetrics, StructuredLogger};
