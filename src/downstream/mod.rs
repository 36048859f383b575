//! Downstream management.
//!
//! # Responsibilities
//! - Build one pipeline (transport + breaker + retry) per configured downstream
//! - Look pipelines up by name for callers
//! - Report breaker state for every downstream
//!
//! # Design Decisions
//! - Each downstream gets its own breaker instance; nothing is shared or global
//! - The registry is an owned object, not a static

pub mod registry;

pub use registry::{DownstreamRegistry, RegistryError};
