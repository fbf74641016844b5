//! Liveness and readiness probes as a mountable component.
//!
//! | Probe | Path | Body |
//! |---|---|---|
//! | liveness | `/healthz` | `{"status": "ok"}` |
//! | readiness | `/readyz` | `{"status": "ready"}` |
//!
//! ```rust
//! use teeth_rest::{Application, health};
//!
//! let app = Application::new().mount("/", health::component()).unwrap();
//! ```
//!
//! Applications that must gate readiness on their dependencies mount their
//! own component in its place.

use serde_json::json;

use crate::component::Component;
use crate::request::Request;
use crate::response::Response;

/// A component named `health` serving both probes.
pub fn component() -> Component {
    Component::new("health")
        .get("/healthz", "liveness", liveness)
        .get("/readyz", "readiness", readiness)
}

/// Always `200`. If the process answers HTTP at all, it is alive.
pub async fn liveness(_req: Request) -> Response {
    Response::ok(json!({ "status": "ok" }))
}

/// Always `200`. Replace it to gate on warm-up or dependency health.
pub async fn readiness(_req: Request) -> Response {
    Response::ok(json!({ "status": "ready" }))
}
