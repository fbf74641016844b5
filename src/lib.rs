//! # teeth-rest
//!
//! A minimal REST scaffold for JSON APIs on hyper.
//!
//! - **Components** group related routes and mount under a URL prefix.
//! - **Routes** use typed placeholders (`/nodes/<uuid:id>`), matched through
//!   a per-method radix tree ([`matchit`]).
//! - **Errors** are [`RestError`] values, always rendered as
//!   `{"type", "code", "message", "details"}`. Anything unexpected is logged
//!   and masked as a generic `500`.
//! - **Responses** carry objects, not bytes. The [`Application`] renders them
//!   with its [`JsonEncoder`] and resolves `Location` headers and pagination
//!   links once it knows the request they answer.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::Method;
//! use teeth_rest::{
//!     Application, Component, Location, Request, Response, RestError, Server, health,
//! };
//!
//! #[derive(serde::Deserialize)]
//! struct NewNode { name: String }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), teeth_rest::Error> {
//!     let nodes = Component::new("nodes")
//!         .route(Method::GET, "/<uuid:id>", "get", get_node)
//!         .route(Method::POST, "/", "create", create_node);
//!
//!     let app = Application::new()
//!         .mount("/", health::component())?
//!         .mount("/v1/nodes", nodes)?;
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app).await
//! }
//!
//! async fn get_node(req: Request) -> Result<Response, RestError> {
//!     let id = req.uuid("id").ok_or_else(RestError::not_found)?;
//!     Ok(Response::ok(serde_json::json!({ "id": id.to_string() })))
//! }
//!
//! async fn create_node(req: Request) -> Result<Response, RestError> {
//!     let node: NewNode = req.parse_content()?;
//!     let id = uuid::Uuid::new_v4();
//!     # let _ = node.name;
//!     Ok(Response::created(Location::endpoint("nodes.get", [("id", id)])))
//! }
//! ```

mod application;
mod component;
mod encoding;
mod error;
mod handler;
mod request;
mod response;
mod rest_error;
mod routing;
mod server;

pub mod health;

pub use application::Application;
pub use component::Component;
pub use encoding::{Json, JsonEncoder, SerializationView, Serializable};
pub use error::Error;
pub use handler::Handler;
pub use request::Request;
pub use response::{ContentType, IntoResponse, Location, Response};
pub use rest_error::RestError;
pub use server::Server;
