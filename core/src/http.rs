//! Plain-data request and response shapes exchanged with transports.
//!
//! # Design
//! `Request` (the builder) renders itself into an `HttpRequest`, a fully
//! resolved description of what goes on the wire: URI, header list, body
//! bytes and transport options. A `Transport` executes it and hands back a
//! `RawResponse`, which `Response::from_raw` turns into structured data. The
//! transports never see the builder, and the parser never sees the transport.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::RequestError;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol version written on the request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolVersion {
    #[default]
    Http10,
    Http11,
}

impl ProtocolVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            ProtocolVersion::Http10 => "HTTP/1.0",
            ProtocolVersion::Http11 => "HTTP/1.1",
        }
    }
}

/// How parameters and files are encoded into a POST body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyEncoding {
    #[default]
    UrlEncoded,
    Multipart,
}

impl BodyEncoding {
    pub fn mime_type(self) -> &'static str {
        match self {
            BodyEncoding::UrlEncoded => "application/x-www-form-urlencoded",
            BodyEncoding::Multipart => "multipart/form-data",
        }
    }
}

/// Structured body format. Only JSON is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFormat {
    Json,
}

impl BodyFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            BodyFormat::Json => "application/json",
        }
    }
}

impl FromStr for BodyFormat {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "application/json" => Ok(BodyFormat::Json),
            other => Err(RequestError::Configuration(format!(
                "body format is not supported: {other}"
            ))),
        }
    }
}

/// A fully resolved HTTP request described as plain data.
///
/// Built by `Request::send` and handed to a `Transport`. Automatic redirect
/// following is never requested: `max_redirect` is carried for logging only.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub uri: String,
    pub version: ProtocolVersion,
    /// Header list in send order, `Cookie` and `Content-Type` included.
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub timeout: Duration,
    /// Proxy URL in `http://host:port` form.
    pub proxy: Option<String>,
    pub max_redirect: u32,
}

impl HttpRequest {
    /// The headers that go on the wire, joined into one CRLF-delimited block.
    pub fn header_block(&self) -> String {
        self.sendable_headers()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect::<Vec<_>>()
            .join("\r\n")
    }

    /// Headers that should actually be written.
    ///
    /// An entry with an empty value suppresses the header instead of sending
    /// it blank (`Expect:` disables `100-continue`).
    pub fn sendable_headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Raw transport output: the status line followed by `Name: value` header
/// lines, plus the body bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse {
    pub header_lines: Vec<String>,
    pub body: Vec<u8>,
}
