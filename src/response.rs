//! Outgoing responses, deferred until bound to an application.
//!
//! Handlers return objects and intentions, not bytes: "200 with this node",
//! "201, the new thing lives at endpoint `nodes.get` with this id". Only the
//! application knows the encoder, the route table and the request's host, so
//! the final body and headers are produced when it binds the response.
//! Nothing but a bound response can be sent.

use bytes::Bytes;
use http::header::{ALLOW, CONTENT_TYPE, HeaderName, HeaderValue, LOCATION};
use http::StatusCode;
use http_body_util::Full;
use serde_json::{Value, json};
use thiserror::Error;

use crate::encoding::{Json, JsonEncoder, SerializationView, Serializable};
use crate::error::Error;
use crate::rest_error::RestError;
use crate::routing::Router;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Media types for raw (non-deferred) bodies.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    Html,
    Json,
    OctetStream,
    Text,
}

impl ContentType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
        }
    }
}

// ── Location ──────────────────────────────────────────────────────────────────

/// Where a created resource lives.
///
/// Resolved at bind time into an absolute URL using the request's `Host`
/// and `X-Forwarded-Proto`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Location {
    /// A named route plus the parameters to fill it with.
    Endpoint { name: String, params: Vec<(String, String)> },
    /// A path on this host. A missing leading `/` is added.
    Path(String),
}

impl Location {
    /// ```rust
    /// use teeth_rest::Location;
    /// let id = uuid::Uuid::new_v4();
    /// let location = Location::endpoint("nodes.get", [("id", id)]);
    /// ```
    pub fn endpoint<K, V>(name: impl Into<String>, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: ToString,
    {
        Self::Endpoint {
            name: name.into(),
            params: params.into_iter().map(|(k, v)| (k.into(), v.to_string())).collect(),
        }
    }

    pub fn path(path: impl Into<String>) -> Self {
        Self::Path(path.into())
    }
}

// ── Response ──────────────────────────────────────────────────────────────────

type Payload = Box<dyn Serializable + Send + Sync>;

enum Body {
    Empty,
    Raw { content_type: ContentType, bytes: Bytes },
    Deferred(Payload),
    Page { items: Payload, next_marker: Option<String> },
    Error(RestError),
}

/// An unbound HTTP response.
///
/// ```rust
/// use teeth_rest::{Json, Location, Response};
///
/// Response::ok(Json(vec!["a", "b"]));
/// Response::created(Location::path("/nodes/42"));
/// Response::paginated(vec![serde_json::json!({ "id": 1 })], Some("1".to_owned()));
/// Response::deleted();
/// ```
pub struct Response {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Body,
    location: Option<Location>,
}

impl Response {
    fn with_body(status: StatusCode, body: Body) -> Self {
        Self { status, headers: Vec::new(), body, location: None }
    }

    /// `obj` rendered by the application's encoder, with `status`.
    pub fn json(obj: impl Serializable + Send + Sync + 'static, status: StatusCode) -> Self {
        Self::with_body(status, Body::Deferred(Box::new(obj)))
    }

    /// `200 OK` with `obj` as the body.
    pub fn ok(obj: impl Serializable + Send + Sync + 'static) -> Self {
        Self::json(obj, StatusCode::OK)
    }

    /// A single resource. Same wire form as [`ok`](Self::ok).
    pub fn item(obj: impl Serializable + Send + Sync + 'static) -> Self {
        Self::ok(obj)
    }

    /// `201 Created`, empty body, `Location` resolved at bind time.
    pub fn created(location: Location) -> Self {
        let mut res = Self::with_body(StatusCode::CREATED, Body::Empty);
        res.location = Some(location);
        res
    }

    /// `201 Created` echoing the created resource.
    pub fn created_with(
        obj: impl Serializable + Send + Sync + 'static,
        location: Location,
    ) -> Self {
        let mut res = Self::json(obj, StatusCode::CREATED);
        res.location = Some(location);
        res
    }

    /// `200 OK` with a page of items:
    ///
    /// ```text
    /// { "items": [...], "links": [{ "rel": "next", "href": "<this url with ?marker=…>" }] }
    /// ```
    ///
    /// `links` is empty on the last page (`next_marker` is `None`).
    pub fn paginated<T>(items: Vec<T>, next_marker: Option<String>) -> Self
    where
        T: Serializable + Send + Sync + 'static,
    {
        Self::with_body(StatusCode::OK, Body::Page { items: Box::new(items), next_marker })
    }

    /// `204 No Content` after a successful delete.
    pub fn deleted() -> Self {
        Self::no_content()
    }

    pub fn no_content() -> Self {
        Self::with_body(StatusCode::NO_CONTENT, Body::Empty)
    }

    pub fn text(body: impl Into<String>) -> Self {
        let body: String = body.into();
        Self::bytes(ContentType::Text, body)
    }

    pub fn bytes(content_type: ContentType, body: impl Into<Bytes>) -> Self {
        Self::with_body(StatusCode::OK, Body::Raw { content_type, bytes: body.into() })
    }

    /// An error rendered in the standard error shape, with its own status.
    pub fn error(err: RestError) -> Self {
        let mut res = Self::with_body(err.status(), Body::Empty);
        if !err.allow().is_empty() {
            let allow = err.allow().iter().map(http::Method::as_str).collect::<Vec<_>>().join(", ");
            res.headers.push((ALLOW.as_str().to_owned(), allow));
        }
        res.body = Body::Error(err);
        res
    }

    /// Overrides the status.
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Adds a header. Invalid names or values fail the response at bind time.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn status_code(&self) -> StatusCode { self.status }

    /// The error this response renders, if it is an error response.
    pub fn rest_error(&self) -> Option<&RestError> {
        match &self.body {
            Body::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Resolves everything deferred: encodes the body, builds `Location` and
    /// pagination links.
    pub(crate) fn bind(self, ctx: &Binding<'_>) -> Result<http::Response<Full<Bytes>>, BindError> {
        let (content_type, body) = match self.body {
            Body::Empty => (None, Bytes::new()),
            Body::Raw { content_type, bytes } => (Some(content_type), bytes),
            Body::Deferred(obj) => (Some(ContentType::Json), ctx.encode(obj.as_ref())?),
            Body::Error(err) => (Some(ContentType::Json), ctx.encode(&err)?),
            Body::Page { items, next_marker } => {
                let page = Page {
                    items: items.try_serialize(ctx.encoder.view())?,
                    next: next_marker.map(|m| ctx.next_page_url(&m)),
                };
                (Some(ContentType::Json), ctx.encode(&page)?)
            }
        };

        let mut res = http::Response::new(Full::new(body));
        *res.status_mut() = self.status;
        let headers = res.headers_mut();

        if let Some(ct) = content_type {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(ct.as_str()));
        }
        if let Some(location) = &self.location {
            let url = ctx.resolve(location)?;
            let value = HeaderValue::from_str(&url).map_err(|_| BindError::Header(url))?;
            headers.insert(LOCATION, value);
        }
        for (name, value) in self.headers {
            let header = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| BindError::Header(name.clone()))?;
            let value = HeaderValue::from_str(&value).map_err(|_| BindError::Header(name))?;
            headers.append(header, value);
        }
        Ok(res)
    }
}

/// Why a response could not be bound. Always answered with a masked `500`.
#[derive(Debug, Error)]
pub(crate) enum BindError {
    #[error("encoding body: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("resolving location: {0}")]
    Location(#[from] Error),
    #[error("invalid header `{0}`")]
    Header(String),
}

struct Page {
    items: Value,
    next: Option<String>,
}

impl Serializable for Page {
    fn serialize(&self, _view: SerializationView) -> Value {
        let links: Vec<Value> = self
            .next
            .iter()
            .map(|href| json!({ "rel": "next", "href": href }))
            .collect();
        json!({ "items": self.items, "links": links })
    }
}

// ── Binding ───────────────────────────────────────────────────────────────────

/// What a response is bound against: the application's encoder and routes,
/// and the request that produced it.
pub(crate) struct Binding<'a> {
    pub(crate) encoder: &'a JsonEncoder,
    pub(crate) router: &'a Router,
    /// `scheme://host`, when the request named a host.
    pub(crate) origin: Option<String>,
    pub(crate) path: &'a str,
    pub(crate) query: Option<&'a str>,
}

impl Binding<'_> {
    fn encode(&self, obj: &dyn Serializable) -> Result<Bytes, serde_json::Error> {
        self.encoder.encode(obj).map(Bytes::from)
    }

    fn absolute(&self, path: &str) -> String {
        match &self.origin {
            Some(origin) => format!("{origin}{path}"),
            None => path.to_owned(),
        }
    }

    fn resolve(&self, location: &Location) -> Result<String, Error> {
        let path = match location {
            Location::Path(path) if path.starts_with('/') => path.clone(),
            Location::Path(path) => format!("/{path}"),
            Location::Endpoint { name, params } => self.router.url_for(name, params)?,
        };
        Ok(self.absolute(&path))
    }

    /// This request's URL with `marker` set to `marker`; other query
    /// parameters are kept in order.
    fn next_page_url(&self, marker: &str) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        if let Some(q) = self.query {
            for (k, v) in url::form_urlencoded::parse(q.as_bytes()) {
                if k != "marker" {
                    query.append_pair(&k, &v);
                }
            }
        }
        query.append_pair("marker", marker);
        self.absolute(&format!("{}?{}", self.path, query.finish()))
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an unbound [`Response`].
///
/// Implement it on your own types to return them straight from handlers.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response { Response::error(self) }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// Return a bare status from a handler: `return StatusCode::ACCEPTED`.
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::with_body(self, Body::Empty) }
}

impl<T: serde::Serialize + Send + Sync + 'static> IntoResponse for Json<T> {
    fn into_response(self) -> Response { Response::ok(self) }
}

impl<T: IntoResponse, E: IntoResponse> IntoResponse for Result<T, E> {
    fn into_response(self) -> Response {
        match self {
            Ok(v) => v.into_response(),
            Err(e) => e.into_response(),
        }
    }
}
