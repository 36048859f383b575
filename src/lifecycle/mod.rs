//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGINT/Ctrl-C → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     Broadcast → every in-flight call observes `cancelled()`
//!     → pipeline drops the current attempt and skips pending retry delays
//! ```
//!
//! # Design Decisions
//! - Cancelled attempts are never recorded against breaker health
//! - One broadcast channel; each caller subscribes independently

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
