//! HTTP/1.1 request and response types
//!
//! Requests are produced by the [`MessageFramer`](crate::framer::MessageFramer);
//! responses are serialized straight onto the wire by [`HttpResponse::to_bytes`].

use crate::{
    error::Result,
    protocol::{http_header, http_value},
};
use bytes::{BufMut, Bytes, BytesMut};
use http::{Method, StatusCode};
use std::net::SocketAddr;

/// Ordered header list with case-insensitive lookup
///
/// Names keep the casing they were inserted with so responses go out exactly
/// as written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Create an empty header list
    pub fn new() -> Self {
        Self::default()
    }

    /// First value of the named header
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Whether the named header is present
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Whether the named header's value contains `token`, ignoring ASCII case
    pub fn value_contains(&self, name: &str, token: &str) -> bool {
        self.get(name)
            .map(|value| {
                value
                    .to_ascii_lowercase()
                    .contains(&token.to_ascii_lowercase())
            })
            .unwrap_or(false)
    }

    /// Set a header, replacing any existing value with the same name
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Add a header without touching existing ones
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Remove every header with the given name
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
    }

    /// Iterate over `(name, value)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of header entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no headers
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A decoded HTTP/1.x request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Request method
    pub method: Method,
    /// Path component of the request target
    pub path: String,
    /// Query string, without the leading `?`
    pub query: Option<String>,
    /// Minor HTTP version (`1` for HTTP/1.1)
    pub version: u8,
    /// Request headers
    pub headers: Headers,
    /// Request body as delimited by `Content-Length`
    pub body: Bytes,
    /// Peer address, when the transport knows it
    pub remote_addr: Option<SocketAddr>,
}

impl HttpRequest {
    /// Create a bodiless HTTP/1.1 request
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = split_target(target);
        Self {
            method,
            path,
            query,
            version: 1,
            headers: Headers::new(),
            body: Bytes::new(),
            remote_addr: None,
        }
    }

    /// Add a header, builder style
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Look up a header value
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Whether the client asked to keep the connection open
    pub fn is_keep_alive(&self) -> bool {
        self.headers
            .value_contains(http_header::CONNECTION, http_value::KEEP_ALIVE)
    }

    /// Whether the client accepts a gzip encoded body
    pub fn accepts_gzip(&self) -> bool {
        self.headers
            .value_contains(http_header::ACCEPT_ENCODING, http_value::GZIP)
    }
}

/// Split a request target into path and query
pub(crate) fn split_target(target: &str) -> (String, Option<String>) {
    match target.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (target.to_string(), None),
    }
}

/// An HTTP/1.1 response under construction
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: StatusCode,
    headers: Headers,
    body: Bytes,
    compress: bool,
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}

impl HttpResponse {
    /// Create an empty response with the given status
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Bytes::new(),
            compress: false,
        }
    }

    /// `200 OK` with a plain text body
    pub fn text(body: impl Into<Bytes>) -> Self {
        let mut response = Self::new(StatusCode::OK);
        response
            .headers
            .insert(http_header::CONTENT_TYPE, http_value::TEXT_PLAIN);
        response.body = body.into();
        response
    }

    /// `404 Not Found`
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND)
    }

    /// `400 Bad Request` with a short explanation
    pub fn bad_request(reason: &str) -> Self {
        let mut response = Self::text(reason.to_string());
        response.status = StatusCode::BAD_REQUEST;
        response
    }

    /// Response status
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Replace the response status
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Response headers
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Mutable response headers
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Look up a header value
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Set a header, replacing any previous value
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// Response body
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Replace the response body
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    /// Mark the body as eligible for gzip encoding
    pub fn set_compress(&mut self, compress: bool) {
        self.compress = compress;
    }

    /// Whether the body will be gzip encoded on the wire
    pub fn is_compressible(&self) -> bool {
        self.compress
    }

    /// Serialize status line, headers and body
    ///
    /// `Content-Length` is computed here for every status except
    /// `101 Switching Protocols`, after any gzip encoding.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let (body, encoded) = self.encoded_body()?;

        let mut buf = BytesMut::with_capacity(128 + body.len());
        buf.put_slice(b"HTTP/1.1 ");
        buf.put_slice(self.status.as_str().as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.status.canonical_reason().unwrap_or("").as_bytes());
        buf.put_slice(b"\r\n");

        let upgrading = self.status == StatusCode::SWITCHING_PROTOCOLS;
        for (name, value) in self.headers.iter() {
            if name.eq_ignore_ascii_case(http_header::CONTENT_LENGTH)
                || (encoded && name.eq_ignore_ascii_case(http_header::CONTENT_ENCODING))
            {
                continue;
            }
            put_header(&mut buf, name, value);
        }

        if encoded {
            put_header(&mut buf, http_header::CONTENT_ENCODING, http_value::GZIP);
        }
        if !upgrading {
            put_header(&mut buf, http_header::CONTENT_LENGTH, &body.len().to_string());
        }

        buf.put_slice(b"\r\n");
        buf.put_slice(&body);
        Ok(buf.freeze())
    }

    #[cfg(feature = "compression")]
    fn encoded_body(&self) -> Result<(Bytes, bool)> {
        use flate2::{write::GzEncoder, Compression};
        use std::io::Write;

        if !self.compress || self.body.is_empty() {
            return Ok((self.body.clone(), false));
        }

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&self.body)?;
        Ok((Bytes::from(encoder.finish()?), true))
    }

    #[cfg(not(feature = "compression"))]
    fn encoded_body(&self) -> Result<(Bytes, bool)> {
        Ok((self.body.clone(), false))
    }
}

fn put_header(buf: &mut BytesMut, name: &str, value: &str) {
    buf.put_slice(name.as_bytes());
    buf.put_slice(b": ");
    buf.put_slice(value.as_bytes());
    buf.put_slice(b"\r\n");
}
