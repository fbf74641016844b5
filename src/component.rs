//! Groups of related routes.
//!
//! A component is built once, then moved into an [`Application`] by
//! [`Application::mount`]. Because mounting consumes it, a component can
//! belong to one application only and can gain no routes afterwards.
//!
//! [`Application`]: crate::Application
//! [`Application::mount`]: crate::Application::mount

use http::Method;

use crate::error::Error;
use crate::handler::{Handler, SharedEndpoint};
use crate::routing::{Pattern, Route};

struct PendingRoute {
    method: Method,
    pattern: String,
    name: String,
    handler: SharedEndpoint,
}

/// A named set of routes, relative to wherever the component is mounted.
///
/// ```rust
/// use http::Method;
/// use teeth_rest::{Component, Request, Response, RestError};
///
/// async fn get_node(req: Request) -> Result<Response, RestError> {
///     let id = req.uuid("id").ok_or_else(RestError::not_found)?;
///     Ok(Response::ok(id))
/// }
///
/// let nodes = Component::new("nodes")
///     .route(Method::GET, "/<uuid:id>", "get", get_node);
/// ```
pub struct Component {
    name: String,
    routes: Vec<PendingRoute>,
}

impl Component {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), routes: Vec::new() }
    }

    /// Routes `method` + `pattern` to `handler`.
    ///
    /// The route's endpoint name, used to build URLs to it, is
    /// `<component>.<name>`. Pattern errors surface when the component is
    /// mounted.
    pub fn route(
        mut self,
        method: Method,
        pattern: &str,
        name: &str,
        handler: impl Handler,
    ) -> Self {
        self.routes.push(PendingRoute {
            method,
            pattern: pattern.to_owned(),
            name: name.to_owned(),
            handler: handler.into_endpoint(),
        });
        self
    }

    pub fn get(self, pattern: &str, name: &str, handler: impl Handler) -> Self {
        self.route(Method::GET, pattern, name, handler)
    }

    pub fn post(self, pattern: &str, name: &str, handler: impl Handler) -> Self {
        self.route(Method::POST, pattern, name, handler)
    }

    pub fn put(self, pattern: &str, name: &str, handler: impl Handler) -> Self {
        self.route(Method::PUT, pattern, name, handler)
    }

    pub fn delete(self, pattern: &str, name: &str, handler: impl Handler) -> Self {
        self.route(Method::DELETE, pattern, name, handler)
    }

    pub fn name(&self) -> &str { &self.name }

    /// Resolves every route against the mount `prefix`.
    pub(crate) fn into_routes(self, prefix: &str) -> Result<Vec<Route>, Error> {
        let component = self.name;
        self.routes
            .into_iter()
            .map(|r| {
                Ok(Route {
                    endpoint: format!("{component}.{}", r.name),
                    method: r.method,
                    pattern: Pattern::parse(&r.pattern)?.prefixed(prefix)?,
                    handler: r.handler,
                })
            })
            .collect()
    }
}
