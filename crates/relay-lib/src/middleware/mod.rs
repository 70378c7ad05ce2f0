// ============================
// relay-lib/src/middleware/mod.rs
// ============================
//! HTTP middleware.

pub mod rate_limit;

pub use rate_limit::{rate_limit, RateLimitEntry};
