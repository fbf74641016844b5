//! The application: mounted components, request dispatch, response binding.
//!
//! Every request ends in a well-formed response. Routing misses become
//! `404`/`405` error bodies, handler errors become their own status and body,
//! and anything unexpected (a panic, a response that cannot be bound) is
//! logged and masked as the generic `500`.

use std::time::Instant;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HOST, HeaderValue};
use http::{HeaderMap, StatusCode, Uri};
use http_body_util::Full;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::component::Component;
use crate::encoding::JsonEncoder;
use crate::error::Error;
use crate::request::Request;
use crate::response::{Binding, Response};
use crate::rest_error::RestError;
use crate::routing::{Lookup, Route, Router};

const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// A REST application: a set of components mounted under URL prefixes, and
/// the encoder every response body is rendered with.
///
/// ```rust
/// use teeth_rest::{Application, Component, Request, Response, health};
///
/// async fn version(_req: Request) -> Response {
///     Response::ok(serde_json::json!({ "version": "1.0" }))
/// }
///
/// # fn main() -> Result<(), teeth_rest::Error> {
/// let app = Application::new()
///     .mount("/", health::component())?
///     .mount("/v1", Component::new("meta").get("/version", "version", version))?;
/// assert_eq!(app.url_for("meta.version", Vec::<(String, String)>::new())?, "/v1/version");
/// # Ok(())
/// # }
/// ```
pub struct Application {
    router: Router,
    encoder: JsonEncoder,
    components: Vec<(String, String)>,
}

impl Application {
    /// An application with no routes and the default encoder (public view,
    /// four-space indent).
    pub fn new() -> Self {
        Self {
            router: Router::default(),
            encoder: JsonEncoder::default(),
            components: Vec::new(),
        }
    }

    pub fn with_encoder(mut self, encoder: JsonEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    /// Mounts `component` under `prefix`.
    ///
    /// # Errors
    ///
    /// Fails on an invalid pattern or prefix, a pattern conflicting with an
    /// already-mounted route, or an endpoint name already in use.
    pub fn mount(mut self, prefix: &str, component: Component) -> Result<Self, Error> {
        let name = component.name().to_owned();
        let routes = component.into_routes(prefix)?;
        let count = routes.len();
        for route in routes {
            debug!(
                endpoint = %route.endpoint,
                method = %route.method,
                pattern = %route.pattern,
                "route registered"
            );
            self.router.insert(route)?;
        }
        info!(prefix, component = %name, routes = count, "component mounted");
        self.components.push((prefix.to_owned(), name));
        Ok(self)
    }

    pub fn encoder(&self) -> &JsonEncoder { &self.encoder }

    /// `(prefix, component name)` for every mounted component, in mount order.
    pub fn components(&self) -> &[(String, String)] { &self.components }

    /// Builds the path of `endpoint`. Parameters the route does not use are
    /// appended as a query string.
    pub fn url_for<K, V>(
        &self,
        endpoint: &str,
        params: impl IntoIterator<Item = (K, V)>,
    ) -> Result<String, Error>
    where
        K: Into<String>,
        V: ToString,
    {
        let params: Vec<(String, String)> =
            params.into_iter().map(|(k, v)| (k.into(), v.to_string())).collect();
        self.router.url_for(endpoint, &params)
    }

    /// Serves one request end to end. Never fails: every outcome is an HTTP
    /// response.
    pub async fn handle(&self, req: http::Request<Bytes>) -> http::Response<Full<Bytes>> {
        let span = info_span!("request", method = %req.method(), path = %req.uri().path());
        self.dispatch(req).instrument(span).await
    }

    async fn dispatch(&self, req: http::Request<Bytes>) -> http::Response<Full<Bytes>> {
        let started = Instant::now();
        let (parts, body) = req.into_parts();
        info!("request received");

        let path = parts.uri.path().to_owned();
        let query = parts.uri.query().map(str::to_owned);
        let origin = origin(&parts.headers, &parts.uri);

        let response = match self.router.lookup(&parts.method, &path) {
            Lookup::NotFound => Response::error(RestError::not_found()),
            Lookup::MethodNotAllowed(allowed) => {
                Response::error(RestError::method_not_allowed(allowed))
            }
            Lookup::Found { route, params } => {
                let response = route.handler.serve(Request::new(parts, body, params)).await;
                log_failure(&route, &response);
                response
            }
        };

        let ctx = Binding {
            encoder: &self.encoder,
            router: &self.router,
            origin,
            path: &path,
            query: query.as_deref(),
        };
        let res = match response.bind(&ctx) {
            Ok(res) => res,
            Err(e) => {
                error!(error = %e, "error binding response");
                self.server_error()
            }
        };

        info!(
            status = res.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request completed"
        );
        res
    }

    /// Renders `err` outside any route, for failures that happen before
    /// dispatch.
    pub(crate) fn render_error(&self, err: RestError) -> http::Response<Full<Bytes>> {
        let ctx = Binding {
            encoder: &self.encoder,
            router: &self.router,
            origin: None,
            path: "/",
            query: None,
        };
        Response::error(err).bind(&ctx).unwrap_or_else(|_| self.server_error())
    }

    /// The masked `500`, built without anything that could fail again.
    fn server_error(&self) -> http::Response<Full<Bytes>> {
        let body = self
            .encoder
            .encode(&RestError::server_error())
            .unwrap_or_else(|_| br#"{"type":"RESTError","code":500}"#.to_vec());
        let mut res = http::Response::new(Full::new(Bytes::from(body)));
        *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        res.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        res
    }
}

impl Default for Application {
    fn default() -> Self { Self::new() }
}

fn log_failure(route: &Route, response: &Response) {
    let Some(err) = response.rest_error() else { return };
    if err.status().is_server_error() {
        error!(
            endpoint = %route.endpoint,
            kind = err.kind(),
            code = err.status().as_u16(),
            cause = err.cause().unwrap_or(err.details()),
            "error handling request"
        );
    } else {
        warn!(
            endpoint = %route.endpoint,
            kind = err.kind(),
            code = err.status().as_u16(),
            details = err.details(),
            "request rejected"
        );
    }
}

/// `scheme://host` of the request as the client saw it: the proxy's
/// `X-Forwarded-Proto` wins over the URI's own scheme.
fn origin(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.authority().map(|a| a.as_str()))?;
    let scheme = headers
        .get(X_FORWARDED_PROTO)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| uri.scheme_str())
        .unwrap_or("http");
    Some(format!("{scheme}://{host}"))
}
