//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main):
//!     Load config → Validate → Bind listeners → Run server
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Sweeper exits → Drain in-flight
//! ```
//!
//! # Design Decisions
//! - In-flight requests drain on their own; their timeouts bound the drain
//! - SIGINT triggers the same broadcast as a programmatic trigger

pub mod shutdown;

pub use shutdown::Shutdown;
