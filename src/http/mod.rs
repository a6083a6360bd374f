//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (HTTP port)
//!     → pipeline.rs (admission, orchestration)
//!     → request.rs (bounded head read, absolute-form target parse)
//!     → [cache lookup] / [upstream fetch]
//!     → response.rs (framing, canonical error pages)
//!     → Send to client, close
//! ```

pub mod pipeline;
pub mod request;
pub mod response;

pub use request::{HeadError, RequestHead};
