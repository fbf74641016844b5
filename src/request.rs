//! Incoming HTTP request type.

use std::collections::HashMap;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::rest_error::RestError;

const JSON: &str = "application/json";

/// An incoming request, with its body already collected and its path
/// parameters converted.
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    params: HashMap<String, String>,
}

impl Request {
    pub(crate) fn new(
        parts: http::request::Parts,
        body: Bytes,
        params: HashMap<String, String>,
    ) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            params,
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn query(&self) -> Option<&str> { self.uri.query() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup. Values that are not visible ASCII
    /// read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// First value of a query-string parameter, percent-decoded.
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    /// A converted path parameter, percent-decoded.
    ///
    /// For a route `/nodes/<uuid:id>`, `req.param("id")` is the UUID in
    /// hyphenated lowercase form whatever form the client sent.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// A `<uuid:…>` parameter as a [`Uuid`].
    pub fn uuid(&self, key: &str) -> Option<Uuid> {
        Uuid::parse_str(self.param(key)?).ok()
    }

    /// An `<int:…>` parameter.
    pub fn int(&self, key: &str) -> Option<u64> {
        self.param(key)?.parse().ok()
    }

    /// The media type of the body: `Content-Type` without its options,
    /// lowercased. A request without the header is taken to be JSON.
    pub fn content_type(&self) -> String {
        match self.headers.get(http::header::CONTENT_TYPE) {
            None => JSON.to_owned(),
            Some(value) => {
                let raw = String::from_utf8_lossy(value.as_bytes());
                let media = raw.split(';').next().unwrap_or_default();
                media.trim().to_ascii_lowercase()
            }
        }
    }

    /// Parses the body into `T` according to its `Content-Type`.
    ///
    /// Only `application/json` is supported.
    ///
    /// # Errors
    ///
    /// - [`RestError::unsupported_content_type`] for any other media type.
    /// - [`RestError::invalid_content`] when the body is not valid JSON or
    ///   does not have the shape of `T`.
    pub fn parse_content<T: DeserializeOwned>(&self) -> Result<T, RestError> {
        let content_type = self.content_type();
        if content_type != JSON {
            return Err(RestError::unsupported_content_type(&content_type));
        }
        serde_json::from_slice(&self.body).map_err(|e| RestError::invalid_content(e.to_string()))
    }

    /// [`parse_content`](Self::parse_content) into an untyped JSON value.
    pub fn parse_json_value(&self) -> Result<serde_json::Value, RestError> {
        self.parse_content()
    }
}
