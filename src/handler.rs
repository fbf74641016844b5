//! Route handlers.
//!
//! Any async function or closure taking a [`Request`] and returning something
//! [`IntoResponse`] can serve a route. The routing table keeps them behind one
//! object-safe trait, [`Endpoint`], whose `serve` never fails: the handler's
//! result becomes an unbound [`Response`], and a panicking handler becomes the
//! masked `500` with the panic message kept as its cause.

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;

use futures::FutureExt;

use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::rest_error::RestError;

pub(crate) type ResponseFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// A handler as the routing table stores it.
///
/// `#[doc(hidden)] pub` only because it names the return type of
/// [`Handler::into_endpoint`].
#[doc(hidden)]
pub trait Endpoint: Send + Sync + 'static {
    fn serve(&self, req: Request) -> ResponseFuture;
}

#[doc(hidden)]
pub type SharedEndpoint = Arc<dyn Endpoint>;

/// Implemented for every valid route handler.
///
/// Sealed, and satisfied by any function or closure of the shape
///
/// ```text
/// Fn(Request) -> impl Future<Output = impl IntoResponse>
/// ```
///
/// `Result<Response, RestError>` is the usual output, so handlers can use `?`
/// on anything that converts into a [`RestError`]. Handlers that need state
/// capture it, typically behind an `Arc`:
///
/// ```rust
/// use std::sync::Arc;
/// use teeth_rest::{Component, Request, Response};
///
/// let greeting = Arc::new(String::from("hello"));
/// let component = Component::new("greeter").get("/", "hello", move |_req: Request| {
///     let greeting = Arc::clone(&greeting);
///     async move { Response::text(greeting.as_str()) }
/// });
/// ```
pub trait Handler: sealed::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_endpoint(self) -> SharedEndpoint;
}

mod sealed {
    pub trait Sealed {}
}

impl<F, Fut, R> sealed::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_endpoint(self) -> SharedEndpoint {
        Arc::new(Guarded(self))
    }
}

/// A handler function with panics turned into the masked `500`.
struct Guarded<F>(F);

impl<F, Fut, R> Endpoint for Guarded<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn serve(&self, req: Request) -> ResponseFuture {
        // A handler can panic while building its future as well as while it runs.
        let fut = match panic::catch_unwind(AssertUnwindSafe(|| (self.0)(req))) {
            Ok(fut) => fut,
            Err(payload) => return Box::pin(futures::future::ready(panicked(payload))),
        };
        Box::pin(async move {
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(out) => out.into_response(),
                Err(payload) => panicked(payload),
            }
        })
    }
}

fn panicked(payload: Box<dyn Any + Send>) -> Response {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned());
    Response::error(RestError::server_error().with_cause(format!("handler panicked: {message}")))
}
