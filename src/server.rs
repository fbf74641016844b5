//! HTTP server and graceful shutdown.
//!
//! On SIGTERM or Ctrl-C the server stops accepting, closes idle keep-alive
//! connections, lets every in-flight request finish, then returns from
//! [`Server::serve`].

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Incoming};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

use crate::application::Application;
use crate::error::Error;
use crate::rest_error::RestError;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// ```rust
    /// use teeth_rest::Server;
    /// let server = Server::bind("0.0.0.0:3000").unwrap();
    /// assert!(Server::bind("not an address").is_err());
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        let addr = addr.parse::<SocketAddr>().map_err(|source| Error::InvalidAddress {
            addr: addr.to_owned(),
            source,
        })?;
        Ok(Self { addr })
    }

    pub fn addr(&self) -> SocketAddr { self.addr }

    /// Serves `app` until SIGTERM or Ctrl-C, then drains in-flight
    /// connections.
    pub async fn serve(self, app: Application) -> Result<(), Error> {
        self.serve_with_shutdown(app, shutdown_signal()).await
    }

    /// Serves `app` until `signal` resolves.
    pub async fn serve_with_shutdown(
        self,
        app: Application,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        Self::serve_on(listener, app, signal).await
    }

    /// Serves `app` on an already-bound listener until `signal` resolves.
    ///
    /// Once the signal fires no new connections are accepted. Idle keep-alive
    /// connections are closed, and connections with a request in flight get
    /// to send their response before closing.
    pub async fn serve_on(
        listener: TcpListener,
        app: Application,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let app = Arc::new(app);
        let graceful = GracefulShutdown::new();
        info!(addr = %listener.local_addr()?, "teeth-rest listening");

        tokio::pin!(signal);
        loop {
            tokio::select! {
                // Stop accepting as soon as the signal fires, queued
                // connections included.
                biased;

                () = &mut signal => break,

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        spawn_connection(&graceful, Arc::clone(&app), stream, peer);
                    }
                    Err(e) => error!("accept error: {e}"),
                },
            }
        }

        drop(listener);
        info!(
            open_connections = graceful.count(),
            "shutdown signal received, draining connections"
        );
        graceful.shutdown().await;
        info!("teeth-rest stopped");
        Ok(())
    }
}

/// Serves one client connection on its own task, HTTP/1.1 or HTTP/2 depending
/// on what the client speaks. The connection is closed gracefully once
/// `graceful` shuts down.
fn spawn_connection(
    graceful: &GracefulShutdown,
    app: Arc<Application>,
    stream: TcpStream,
    peer: SocketAddr,
) {
    let svc = service_fn(move |req: hyper::Request<Incoming>| {
        let app = Arc::clone(&app);
        async move { Ok::<_, Infallible>(serve_request(&app, req).await) }
    });
    let conn = ConnBuilder::new(TokioExecutor::new())
        .serve_connection(TokioIo::new(stream), svc)
        .into_owned();
    let conn = graceful.watch(conn);

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            warn!(peer = %peer, "connection error: {e}");
        }
    });
}

/// Collects the body, then hands the request to the application. A body that
/// cannot be read is answered with `InvalidContentError`.
async fn serve_request<B>(
    app: &Application,
    req: http::Request<B>,
) -> http::Response<Full<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: std::fmt::Display,
{
    let (parts, body) = req.into_parts();
    match body.collect().await {
        Ok(collected) => {
            app.handle(http::Request::from_parts(parts, collected.to_bytes())).await
        }
        Err(e) => {
            warn!(method = %parts.method, path = parts.uri.path(), "reading request body: {e}");
            app.render_error(RestError::invalid_content("The request body could not be read."))
        }
    }
}

/// Resolves on the first SIGTERM or Ctrl-C.
///
/// A signal whose handler cannot be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("installing Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("installing SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}
