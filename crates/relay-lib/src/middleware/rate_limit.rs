// ============================
// relay-lib/src/middleware/rate_limit.rs
// ============================
//! Fixed-window per-IP rate limiting for the HTTP management surface.

use crate::{error::RelayError, AppState};
use axum::{extract::Request, extract::State, middleware::Next, response::Response};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Request count within the current window for one client
#[derive(Debug)]
pub struct RateLimitEntry {
    requests: u32,
    window_start: Instant,
}

/// Rate limiter middleware
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, RelayError> {
    // Get client IP (set by the reverse proxy)
    let client_ip = request
        .headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let max_requests = state.settings.rate_limit.max_requests;
    let window = Duration::from_secs(state.settings.rate_limit.window_secs);

    let mut entry = state
        .rate_limits
        .entry(client_ip)
        .or_insert_with(|| RateLimitEntry {
            requests: 0,
            window_start: Instant::now(),
        });

    if entry.window_start.elapsed() > window {
        entry.requests = 0;
        entry.window_start = Instant::now();
    }

    if entry.requests >= max_requests {
        return Err(RelayError::RateLimitExceeded);
    }

    entry.requests += 1;
    drop(entry);

    Ok(next.run(request).await)
}
