//! Upstream fetch subsystem.
//!
//! # Data Flow
//! ```text
//! pipeline (cache miss)
//!     → fetcher.rs (one GET: connect/response deadlines, size cap)
//!     → On transport failure: retry.rs (linear backoff, bounded attempts)
//!     → FetchedResponse (status, headers, buffered body)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream call has a deadline
//! - Retries cover transport failures only; HTTP statuses are echoed as-is
//! - The body is fully buffered so the size cap is enforced before anything
//!   reaches the client or the cache

pub mod fetcher;
pub mod retry;

pub use fetcher::{FetchedResponse, Fetcher};
