//! Resilient outbound call layer.
//!
//! Wraps calls to downstream services in a circuit breaker and a retry
//! policy so a failing dependency cannot drag its callers down with it.

pub mod config;
pub mod downstream;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod transport;

pub use config::ClientConfig;
pub use downstream::DownstreamRegistry;
pub use lifecycle::Shutdown;
pub use resilience::{Pipeline, PolicyError};
pub use transport::{DownstreamResponse, RequestDescriptor, Transport, TransportFault};
