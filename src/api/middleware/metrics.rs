use axum::{extract::Request, middleware::Next, response::Response};
use std::time::{Duration, Instant};
use tracing::{info, warn};

const SLOW_REQUEST: Duration = Duration::from_secs(5);

pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();

    let response = next.run(req).await;

    let latency = start.elapsed();
    let status = response.status();

    info!(
        target: "metrics",
        method = %method,
        uri = %uri,
        status = %status.as_u16(),
        latency_ms = %latency.as_millis(),
        "request_completed"
    );

    // Uploads stream the whole body inside the handler, so they are the usual suspects.
    if latency > SLOW_REQUEST {
        warn!(target: "metrics", method = %method, uri = %uri, "slow_request");
    }

    response
}
