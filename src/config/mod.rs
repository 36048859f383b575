//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!     → downstream registry builds one pipeline per downstream
//! ```
//!
//! # Design Decisions
//! - Config is read once at construction; policies are immutable afterwards
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::ClientConfig;
pub use schema::CircuitBreakerConfig;
pub use schema::DownstreamConfig;
pub use schema::RetryConfig;
