//! Route patterns, path converters and the radix-tree router.
//!
//! Patterns are written with typed placeholders:
//!
//! ```text
//! /nodes/<uuid:node_id>/ports/<int:index>
//! /files/<path:rest>
//! /users/<name>
//! ```
//!
//! A placeholder occupies a whole path segment. Each one is compiled to a
//! matchit parameter (`{name}`, or `{*name}` for `path`); matchit finds the
//! candidate route on the raw path. Each captured value is percent-decoded
//! and the converter then decides whether it is acceptable. A value the
//! converter rejects means the route did not match.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use http::Method;
use matchit::Router as MatchitRouter;
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use uuid::Uuid;

use crate::error::Error;
use crate::handler::SharedEndpoint;

/// Bytes escaped when a parameter is written into a path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

// ── Converters ────────────────────────────────────────────────────────────────

/// How a placeholder's raw text is validated and canonicalised.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Converter {
    /// One non-empty segment without `/`.
    Default,
    /// A UUID in any form `Uuid::parse_str` accepts; stored hyphenated.
    Uuid,
    /// A non-negative decimal integer.
    Int,
    /// The rest of the path, slashes included. Only valid last.
    Path,
}

impl Converter {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "default" | "string" => Some(Self::Default),
            "uuid" => Some(Self::Uuid),
            "int" => Some(Self::Int),
            "path" => Some(Self::Path),
            _ => None,
        }
    }

    /// Decoded path text → canonical parameter value. `None` rejects the
    /// match.
    pub(crate) fn to_value(self, raw: &str) -> Option<String> {
        match self {
            Self::Default if raw.is_empty() || raw.contains('/') => None,
            Self::Default | Self::Path => Some(raw.to_owned()),
            Self::Uuid => Uuid::parse_str(raw).ok().map(|id| id.hyphenated().to_string()),
            Self::Int => {
                if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                raw.parse::<u64>().ok().map(|n| n.to_string())
            }
        }
    }

    /// Parameter value → percent-encoded URL text. `path` values keep their
    /// slashes.
    fn to_url(self, value: &str) -> Option<String> {
        let value = self.to_value(value)?;
        let encoded = match self {
            Self::Path => value
                .split('/')
                .map(|part| utf8_percent_encode(part, SEGMENT).to_string())
                .collect::<Vec<_>>()
                .join("/"),
            _ => utf8_percent_encode(&value, SEGMENT).to_string(),
        };
        Some(encoded)
    }
}

// ── Patterns ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Eq, PartialEq)]
enum Segment {
    Literal(String),
    Param { name: String, converter: Converter },
}

/// A parsed route pattern.
#[derive(Clone, Debug)]
pub(crate) struct Pattern {
    source: String,
    segments: Vec<Segment>,
    // Trailing slash is significant: `/nodes/` and `/nodes` are different routes.
    trailing_slash: bool,
}

impl Pattern {
    pub(crate) fn parse(source: &str) -> Result<Self, Error> {
        let invalid = |reason: &str| Error::InvalidPattern {
            pattern: source.to_owned(),
            reason: reason.to_owned(),
        };

        let Some(rest) = source.strip_prefix('/') else {
            return Err(invalid("patterns must start with `/`"));
        };

        let mut segments = Vec::new();
        let mut names: Vec<&str> = Vec::new();
        let parts: Vec<&str> = if rest.is_empty() { Vec::new() } else { rest.split('/').collect() };
        let trailing_slash = rest.ends_with('/');
        let last = parts.len().saturating_sub(usize::from(trailing_slash) + 1);

        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() {
                if i == parts.len() - 1 && trailing_slash {
                    break;
                }
                return Err(invalid("empty path segment"));
            }

            if let Some(inner) = part.strip_prefix('<') {
                let inner = inner
                    .strip_suffix('>')
                    .ok_or_else(|| invalid("placeholder must fill a whole segment"))?;
                let (conv_name, name) = inner.split_once(':').unwrap_or(("default", inner));
                let valid = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
                if name.is_empty() || !name.bytes().all(valid) {
                    return Err(invalid("placeholder names are [A-Za-z0-9_]+"));
                }
                let converter =
                    Converter::from_name(conv_name).ok_or_else(|| Error::UnknownConverter {
                        pattern: source.to_owned(),
                        converter: conv_name.to_owned(),
                    })?;
                if converter == Converter::Path && (i != last || trailing_slash) {
                    return Err(invalid("`path` placeholders must be last"));
                }
                if names.contains(&name) {
                    return Err(invalid("duplicate placeholder name"));
                }
                names.push(name);
                segments.push(Segment::Param { name: name.to_owned(), converter });
            } else {
                if part.contains(['<', '>', '{', '}', '*']) {
                    return Err(invalid("unexpected `<`, `>`, `{`, `}` or `*` in literal segment"));
                }
                segments.push(Segment::Literal((*part).to_owned()));
            }
        }

        Ok(Self { source: source.to_owned(), segments, trailing_slash })
    }

    /// `prefix` + `self`, as a component mount does.
    pub(crate) fn prefixed(&self, prefix: &str) -> Result<Self, Error> {
        let prefix = prefix.trim_end_matches('/');
        if !prefix.is_empty() && !prefix.starts_with('/') {
            return Err(Error::InvalidPattern {
                pattern: prefix.to_owned(),
                reason: "mount prefixes must start with `/`".to_owned(),
            });
        }
        Self::parse(&format!("{prefix}{}", self.source))
    }

    pub(crate) fn source(&self) -> &str { &self.source }

    /// The equivalent matchit route string.
    fn matchit_path(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            out.push('/');
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Param { name, converter: Converter::Path } => {
                    out.push_str(&format!("{{*{name}}}"));
                }
                Segment::Param { name, .. } => out.push_str(&format!("{{{name}}}")),
            }
        }
        if self.trailing_slash || out.is_empty() {
            out.push('/');
        }
        out
    }

    fn converter(&self, name: &str) -> Option<Converter> {
        self.segments.iter().find_map(|s| match s {
            Segment::Param { name: n, converter } if n == name => Some(*converter),
            _ => None,
        })
    }

    /// Decodes matchit's raw captures and runs the converters over them.
    /// Captures that are not valid UTF-8 once decoded do not match.
    fn convert(&self, raw: &matchit::Params<'_, '_>) -> Option<HashMap<String, String>> {
        raw.iter()
            .map(|(name, value)| {
                let converter = self.converter(name)?;
                let decoded = percent_decode_str(value).decode_utf8().ok()?;
                Some((name.to_owned(), converter.to_value(&decoded)?))
            })
            .collect()
    }

    /// Fills the placeholders from `params`. Leftover params become the
    /// query string.
    pub(crate) fn build(
        &self,
        endpoint: &str,
        params: &[(String, String)],
    ) -> Result<String, Error> {
        let fail = |reason: String| Error::UrlBuild { endpoint: endpoint.to_owned(), reason };

        let mut path = String::new();
        let mut used = Vec::new();
        for segment in &self.segments {
            path.push('/');
            match segment {
                Segment::Literal(text) => path.push_str(text),
                Segment::Param { name, converter } => {
                    let (_, value) = params
                        .iter()
                        .find(|(k, _)| k == name)
                        .ok_or_else(|| fail(format!("missing parameter `{name}`")))?;
                    let text = converter
                        .to_url(value)
                        .ok_or_else(|| fail(format!("`{value}` is not a valid `{name}`")))?;
                    path.push_str(&text);
                    used.push(name.as_str());
                }
            }
        }
        if self.trailing_slash || path.is_empty() {
            path.push('/');
        }

        let extra: Vec<_> = params.iter().filter(|(k, _)| !used.contains(&k.as_str())).collect();
        if !extra.is_empty() {
            let mut query = url::form_urlencoded::Serializer::new(String::new());
            for (k, v) in extra {
                query.append_pair(k, v);
            }
            path.push('?');
            path.push_str(&query.finish());
        }
        Ok(path)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

// ── Router ────────────────────────────────────────────────────────────────────

/// A registered route: where it lives, what it is called, who handles it.
pub(crate) struct Route {
    pub(crate) endpoint: String,
    pub(crate) method: Method,
    pub(crate) pattern: Pattern,
    pub(crate) handler: SharedEndpoint,
}

/// Outcome of matching a request against the table.
pub(crate) enum Lookup {
    Found {
        route: Arc<Route>,
        params: HashMap<String, String>,
    },
    /// The path exists, but only for these methods.
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

/// The routing table.
///
/// One radix tree per HTTP method, O(path-length) lookup. Built once while
/// components are mounted, then shared read-only by every request.
#[derive(Default)]
pub(crate) struct Router {
    trees: HashMap<Method, MatchitRouter<Arc<Route>>>,
    endpoints: HashMap<String, Arc<Route>>,
}

impl Router {
    pub(crate) fn insert(&mut self, route: Route) -> Result<(), Error> {
        if self.endpoints.contains_key(&route.endpoint) {
            return Err(Error::DuplicateEndpoint(route.endpoint));
        }

        let route = Arc::new(route);
        let path = route.pattern.matchit_path();
        self.trees
            .entry(route.method.clone())
            .or_default()
            .insert(path, Arc::clone(&route))
            .map_err(|source| Error::RouteConflict {
                pattern: route.pattern.source().to_owned(),
                source,
            })?;
        self.endpoints.insert(route.endpoint.clone(), route);
        Ok(())
    }

    pub(crate) fn lookup(&self, method: &Method, path: &str) -> Lookup {
        if let Some(found) = self.find(method, path) {
            return found;
        }
        // HEAD is served by the GET route when no HEAD route exists.
        if *method == Method::HEAD {
            if let Some(found) = self.find(&Method::GET, path) {
                return found;
            }
        }

        let mut allowed: Vec<Method> = self
            .trees
            .keys()
            .filter(|m| *m != method && self.find(m, path).is_some())
            .cloned()
            .collect();
        if allowed.is_empty() {
            return Lookup::NotFound;
        }
        if allowed.contains(&Method::GET) && !allowed.contains(&Method::HEAD) {
            allowed.push(Method::HEAD);
        }
        allowed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Lookup::MethodNotAllowed(allowed)
    }

    fn find(&self, method: &Method, path: &str) -> Option<Lookup> {
        let matched = self.trees.get(method)?.at(path).ok()?;
        let route = Arc::clone(matched.value);
        let params = route.pattern.convert(&matched.params)?;
        Some(Lookup::Found { route, params })
    }

    /// Reverse routing: endpoint name + parameters → path.
    pub(crate) fn url_for(
        &self,
        endpoint: &str,
        params: &[(String, String)],
    ) -> Result<String, Error> {
        let route = self.endpoints.get(endpoint).ok_or_else(|| Error::UrlBuild {
            endpoint: endpoint.to_owned(),
            reason: "no such endpoint".to_owned(),
        })?;
        route.pattern.build(endpoint, params)
    }
}
