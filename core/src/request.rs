//! Stateful HTTP request builder and sender.
//!
//! # Design
//! `Request` accumulates everything a browser form submission carries and is
//! reused across calls: headers and upload files persist until cleared,
//! while parameters are dropped after every `send`. `send` renders the
//! builder into an `HttpRequest`, hands it to the transport the caller
//! picked, and parses whatever came back. HTTP error statuses are returned
//! as responses; only a transport that produced nothing is an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;
use ureq::http::{HeaderName, HeaderValue};
use url::form_urlencoded;
use url::Url;

use crate::error::RequestError;
use crate::http::{BodyEncoding, BodyFormat, HttpMethod, HttpRequest, ProtocolVersion};
use crate::multipart::{self, Part};
use crate::response::Response;
use crate::transport::Transport;

pub const DEFAULT_USER_AGENT: &str = concat!("imail-core/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_MAX_REDIRECT: u32 = 2;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// A file input attached to a multipart request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    /// `None` sends an empty part, the way a form with no file selected does.
    pub path: Option<PathBuf>,
    /// Sniffed from the file content at send time when `None`.
    pub media_type: Option<String>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            media_type: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    fn to_part(&self) -> Result<Part, RequestError> {
        let Some(path) = &self.path else {
            return Ok(Part::File {
                name: self.name.clone(),
                filename: None,
                content_type: String::new(),
                content: Vec::new(),
            });
        };

        let content = std::fs::read(path).map_err(|source| RequestError::Upload {
            path: path.clone(),
            source,
        })?;
        let content_type = match &self.media_type {
            Some(media_type) => media_type.clone(),
            None => multipart::sniff_media_type(&content).to_string(),
        };

        Ok(Part::File {
            name: self.name.clone(),
            filename: Some(file_name(path)),
            content_type,
            content,
        })
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Reusable request builder.
#[derive(Debug, Clone)]
pub struct Request {
    base_uri: String,
    path: String,
    method: HttpMethod,
    version: ProtocolVersion,
    user_agent: String,
    headers: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
    raw_cookie: Option<String>,
    parameters: Vec<(String, Value)>,
    files: Vec<UploadFile>,
    encoding: BodyEncoding,
    format: Option<BodyFormat>,
    proxy: Option<String>,
    max_redirect: u32,
    read_timeout: Duration,
}

impl Default for Request {
    fn default() -> Self {
        Self::new("")
    }
}

impl Request {
    pub fn new(base_uri: impl Into<String>) -> Self {
        let mut request = Self {
            base_uri: base_uri.into(),
            path: String::new(),
            method: HttpMethod::Get,
            version: ProtocolVersion::default(),
            user_agent: String::new(),
            headers: Vec::new(),
            cookies: Vec::new(),
            raw_cookie: None,
            parameters: Vec::new(),
            files: Vec::new(),
            encoding: BodyEncoding::default(),
            format: None,
            proxy: None,
            max_redirect: DEFAULT_MAX_REDIRECT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        };
        request.set_user_agent(DEFAULT_USER_AGENT);
        request
    }

    // -----------------------------------------------------------------------
    // Target and transport options
    // -----------------------------------------------------------------------

    pub fn set_base_uri(&mut self, base_uri: impl Into<String>) -> &mut Self {
        self.base_uri = base_uri.into();
        self
    }

    pub fn set_path(&mut self, path: impl Into<String>) -> &mut Self {
        self.path = path.into();
        self
    }

    pub fn set_method(&mut self, method: HttpMethod) -> &mut Self {
        self.method = method;
        self
    }

    pub fn set_protocol_version(&mut self, version: ProtocolVersion) -> &mut Self {
        self.version = version;
        self
    }

    /// Proxy every request through `host:port`.
    pub fn set_proxy(&mut self, host: &str, port: u16) -> &mut Self {
        self.proxy = Some(format!("http://{host}:{port}"));
        self
    }

    /// Recorded on the rendered request only. Transports never follow
    /// redirects; callers read `Location` and reissue themselves.
    pub fn set_max_redirect(&mut self, max_redirect: u32) -> &mut Self {
        self.max_redirect = max_redirect;
        self
    }

    pub fn set_read_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.read_timeout = timeout;
        self
    }

    // -----------------------------------------------------------------------
    // Headers
    // -----------------------------------------------------------------------

    pub fn set_user_agent(&mut self, user_agent: impl Into<String>) -> &mut Self {
        self.user_agent = user_agent.into();
        let user_agent = self.user_agent.clone();
        self.add_header("User-Agent", user_agent)
    }

    pub fn set_accept(&mut self, value: impl Into<String>) -> &mut Self {
        self.add_header("Accept", value)
    }

    pub fn set_accept_charset(&mut self, value: impl Into<String>) -> &mut Self {
        self.add_header("Accept-Charset", value)
    }

    pub fn set_accept_encoding(&mut self, value: impl Into<String>) -> &mut Self {
        self.add_header("Accept-Encoding", value)
    }

    pub fn set_accept_language(&mut self, value: impl Into<String>) -> &mut Self {
        self.add_header("Accept-Language", value)
    }

    pub fn set_basic_authorization(&mut self, user: &str, password: &str) -> &mut Self {
        let credentials = STANDARD.encode(format!("{user}:{password}"));
        self.add_header("Authorization", format!("Basic {credentials}"))
    }

    /// Set header `name`, replacing any existing value (names compare
    /// case-insensitively). An empty value suppresses the header on the wire.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name, value)),
        }
        self
    }

    /// Remove header `name`, or every header when `None`. Clearing all
    /// headers restores the default user agent.
    pub fn clear_header(&mut self, name: Option<&str>) -> &mut Self {
        match name {
            Some(name) => self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name)),
            None => {
                self.headers.clear();
                self.set_user_agent(DEFAULT_USER_AGENT);
            }
        }
        self
    }

    // -----------------------------------------------------------------------
    // Cookies
    // -----------------------------------------------------------------------

    pub fn add_cookie(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        upsert(&mut self.cookies, name.into(), value.into());
        self
    }

    /// Send `value` verbatim as the `Cookie` header. Incremental cookies are
    /// ignored while a raw cookie is set.
    pub fn set_raw_cookie(&mut self, value: impl Into<String>) -> &mut Self {
        self.raw_cookie = Some(value.into());
        self
    }

    /// Remove cookie `name` from both representations, or every cookie when
    /// `None`.
    pub fn clear_cookie(&mut self, name: Option<&str>) -> &mut Self {
        match name {
            None => {
                self.cookies.clear();
                self.raw_cookie = None;
            }
            Some(name) => {
                self.cookies.retain(|(n, _)| n != name);
                if let Some(raw) = &self.raw_cookie {
                    let prefix = format!("{name}=");
                    let kept: Vec<&str> = raw
                        .split(';')
                        .map(str::trim)
                        .filter(|pair| !pair.is_empty() && !pair.starts_with(&prefix))
                        .collect();
                    self.raw_cookie = Some(kept.join("; "));
                }
            }
        }
        self
    }

    /// The `Cookie` header value that will be sent, if any.
    pub fn cookie_line(&self) -> Option<String> {
        if let Some(raw) = &self.raw_cookie {
            return Some(raw.clone());
        }
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    // -----------------------------------------------------------------------
    // Parameters and files
    // -----------------------------------------------------------------------

    /// Set parameter `name`. Scalars keep their JSON type in JSON bodies and
    /// are rendered as text everywhere else.
    pub fn add_parameter(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        upsert(&mut self.parameters, name.into(), value.into());
        self
    }

    pub fn add_parameters<I, K, V>(&mut self, parameters: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (name, value) in parameters {
            self.add_parameter(name, value);
        }
        self
    }

    pub fn clear_parameter(&mut self, name: Option<&str>) -> &mut Self {
        match name {
            Some(name) => self.parameters.retain(|(n, _)| n != name),
            None => self.parameters.clear(),
        }
        self
    }

    /// Attach a file input. Forces multipart encoding.
    pub fn add_upload_file(&mut self, file: UploadFile) -> &mut Self {
        self.encoding = BodyEncoding::Multipart;
        match self.files.iter_mut().find(|f| f.name == file.name) {
            Some(existing) => *existing = file,
            None => self.files.push(file),
        }
        self
    }

    pub fn clear_upload_file(&mut self, name: Option<&str>) -> &mut Self {
        match name {
            Some(name) => self.files.retain(|f| f.name != name),
            None => self.files.clear(),
        }
        self
    }

    pub fn set_body_encoding(&mut self, encoding: BodyEncoding) -> &mut Self {
        self.encoding = encoding;
        self
    }

    /// Select a structured body format by media type and set the matching
    /// `Content-Type`. Only `application/json` is accepted.
    pub fn set_body_format(&mut self, media_type: &str) -> Result<&mut Self, RequestError> {
        let format: BodyFormat = media_type.parse()?;
        self.format = Some(format);
        Ok(self.add_header("Content-Type", format.mime_type()))
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn encoding(&self) -> BodyEncoding {
        self.encoding
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn parameters(&self) -> &[(String, Value)] {
        &self.parameters
    }

    pub fn files(&self) -> &[UploadFile] {
        &self.files
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    // -----------------------------------------------------------------------
    // Rendering and sending
    // -----------------------------------------------------------------------

    /// Resolve the request URI.
    ///
    /// The base's trailing `/` is stripped and the path gets exactly one
    /// leading `/`. GET parameters are appended as a form-encoded query,
    /// joined with `&` when the path already carries a query and `?`
    /// otherwise.
    pub fn build_uri(&self) -> String {
        let mut uri = if self.path.is_empty() {
            self.base_uri.clone()
        } else {
            let base = self.base_uri.trim_end_matches('/');
            if self.path.starts_with('/') {
                format!("{base}{}", self.path)
            } else {
                format!("{base}/{}", self.path)
            }
        };

        if self.method == HttpMethod::Get && !self.parameters.is_empty() {
            let query = urlencode(&self.parameters);
            uri.push(if uri.contains('?') { '&' } else { '?' });
            uri.push_str(&query);
        }

        uri
    }

    /// Send through `transport` and parse the reply.
    ///
    /// Parameters are cleared afterwards whether or not the call succeeded.
    pub fn send(&mut self, transport: &dyn Transport) -> Result<Response, RequestError> {
        let result = self
            .render()
            .and_then(|request| dispatch(transport, &request));
        self.parameters.clear();
        result
    }

    /// Render the builder into the plain-data request a transport executes.
    pub fn render(&self) -> Result<HttpRequest, RequestError> {
        let uri = self.build_uri();
        let has_host = Url::parse(&uri)
            .ok()
            .is_some_and(|url| url.host_str().is_some_and(|host| !host.is_empty()));
        if !has_host {
            return Err(RequestError::Configuration(format!(
                "request URI is not set or has no host: {uri:?}"
            )));
        }
        if let Some(proxy) = &self.proxy {
            validate_proxy(proxy)?;
        }

        let (body, boundary) = self.build_body()?;

        let mut headers = self.headers.clone();
        if !headers.iter().any(|(n, _)| n.eq_ignore_ascii_case("Content-Type")) {
            headers.push(("Content-Type".to_string(), self.default_content_type(boundary.as_deref())));
        }
        headers.retain(|(n, _)| !n.eq_ignore_ascii_case("Cookie"));
        if let Some(cookie) = self.cookie_line() {
            headers.push(("Cookie".to_string(), cookie));
        }

        let request = HttpRequest {
            method: self.method,
            uri,
            version: self.version,
            headers,
            body,
            timeout: self.read_timeout,
            proxy: self.proxy.clone(),
            max_redirect: self.max_redirect,
        };
        for (name, value) in request.sendable_headers() {
            validate_header(name, value)?;
        }
        Ok(request)
    }

    fn default_content_type(&self, boundary: Option<&str>) -> String {
        match (boundary, self.format) {
            (Some(boundary), _) => {
                format!("{}; boundary={boundary}", BodyEncoding::Multipart.mime_type())
            }
            (None, Some(format)) if self.method != HttpMethod::Get => format.mime_type().to_string(),
            (None, _) if self.method == HttpMethod::Post => self.encoding.mime_type().to_string(),
            (None, _) => BodyEncoding::UrlEncoded.mime_type().to_string(),
        }
    }

    /// Body bytes and, for multipart bodies, the boundary used.
    fn build_body(&self) -> Result<(Option<Vec<u8>>, Option<String>), RequestError> {
        if self.parameters.is_empty() && self.files.is_empty() {
            return Ok((None, None));
        }

        match self.method {
            HttpMethod::Get => Ok((None, None)),
            HttpMethod::Post if self.encoding == BodyEncoding::Multipart => {
                let mut parts: Vec<Part> = self
                    .parameters
                    .iter()
                    .map(|(name, value)| Part::Field {
                        name: name.clone(),
                        value: form_value(value),
                    })
                    .collect();
                for file in &self.files {
                    parts.push(file.to_part()?);
                }
                let boundary = multipart::new_boundary();
                Ok((Some(multipart::encode(&parts, &boundary)), Some(boundary)))
            }
            _ => match self.format {
                Some(BodyFormat::Json) => Ok((Some(encode_json(&self.parameters)), None)),
                None => Ok((Some(urlencode(&self.parameters).into_bytes()), None)),
            },
        }
    }
}

fn validate_proxy(proxy: &str) -> Result<(), RequestError> {
    let has_host = Url::parse(proxy)
        .ok()
        .is_some_and(|url| url.host_str().is_some_and(|host| !host.is_empty()));
    if has_host {
        Ok(())
    } else {
        Err(RequestError::Configuration(format!("invalid proxy: {proxy:?}")))
    }
}

/// Reject header names and values that cannot be written to the wire
/// (CR/LF in a value, separators in a name).
fn validate_header(name: &str, value: &str) -> Result<(), RequestError> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| RequestError::Configuration(format!("invalid header name: {name:?}")))?;
    HeaderValue::from_bytes(value.as_bytes()).map_err(|_| {
        RequestError::Configuration(format!("invalid value for header {name}: {value:?}"))
    })?;
    Ok(())
}

fn dispatch(transport: &dyn Transport, request: &HttpRequest) -> Result<Response, RequestError> {
    tracing::debug!(
        method = %request.method,
        uri = %request.uri,
        body_len = request.body.as_ref().map_or(0, Vec::len),
        headers = ?request.header_block(),
        max_redirect = request.max_redirect,
        "sending request"
    );

    let raw = transport
        .execute(request)
        .map_err(|source| RequestError::Connect {
            uri: request.uri.clone(),
            source,
        })?;

    if raw.header_lines.is_empty() && raw.body.is_empty() {
        return Err(RequestError::Connect {
            uri: request.uri.clone(),
            source: "transport returned no data".into(),
        });
    }

    let response = Response::from_raw(raw);
    tracing::debug!(status = response.status(), uri = %request.uri, "received response");
    Ok(response)
}

fn upsert<V>(entries: &mut Vec<(String, V)>, name: String, value: V) {
    match entries.iter_mut().find(|(n, _)| *n == name) {
        Some(entry) => entry.1 = value,
        None => entries.push((name, value)),
    }
}

/// Text form of a parameter value: strings verbatim, `null` empty, anything
/// else as its JSON literal.
fn form_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// `key=value` pairs joined with `&`, form-encoded.
pub fn urlencode(parameters: &[(String, Value)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(parameters.iter().map(|(name, value)| (name, form_value(value))))
        .finish()
}

/// Parameters as one JSON object. serde_json never escapes `/`, so slashes
/// stay literal.
pub fn encode_json(parameters: &[(String, Value)]) -> Vec<u8> {
    let object: serde_json::Map<String, Value> = parameters.iter().cloned().collect();
    Value::Object(object).to_string().into_bytes()
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::io::Write;

    use serde_json::json;

    use super::*;
    use crate::http::RawResponse;

    /// Records every request and answers with a canned head and body.
    struct Recorder {
        sent: RefCell<Vec<HttpRequest>>,
        reply: Option<RawResponse>,
    }

    impl Recorder {
        fn replying(status_line: &str, body: &str) -> Self {
            Self {
                sent: RefCell::new(Vec::new()),
                reply: Some(RawResponse {
                    header_lines: vec![status_line.to_string()],
                    body: body.as_bytes().to_vec(),
                }),
            }
        }

        fn failing() -> Self {
            Self {
                sent: RefCell::new(Vec::new()),
                reply: None,
            }
        }

        fn last(&self) -> HttpRequest {
            self.sent.borrow().last().cloned().unwrap()
        }
    }

    impl Transport for Recorder {
        fn execute(&self, request: &HttpRequest) -> Result<RawResponse, crate::error::TransportError> {
            self.sent.borrow_mut().push(request.clone());
            self.reply.clone().ok_or_else(|| "connection refused".into())
        }
    }

    fn post(path: &str) -> Request {
        let mut request = Request::new("https://imode.net/");
        request.set_method(HttpMethod::Post).set_path(path);
        request
    }

    #[test]
    fn build_uri_normalizes_separators() {
        let mut request = Request::new("https://host/");
        request.set_method(HttpMethod::Post).set_path("a/b");
        assert_eq!(request.build_uri(), "https://host/a/b");
        request.set_path("/a/b");
        assert_eq!(request.build_uri(), "https://host/a/b");
    }

    #[test]
    fn build_uri_without_path_returns_base() {
        let request = Request::new("https://host/");
        assert_eq!(request.build_uri(), "https://host/");
    }

    #[test]
    fn get_parameters_fold_into_query() {
        let mut request = Request::new("https://host");
        request.set_path("/list").add_parameter("a", "1").add_parameter("b", 2);
        assert_eq!(request.build_uri(), "https://host/list?a=1&b=2");

        request.set_path("/list?x=0");
        assert_eq!(request.build_uri(), "https://host/list?x=0&a=1&b=2");
    }

    #[test]
    fn query_uses_form_encoding_without_entities() {
        let mut request = Request::new("https://host");
        request
            .set_path("/q")
            .add_parameter("path", "/imail/top")
            .add_parameter("t", "a b&c");
        assert_eq!(request.build_uri(), "https://host/q?path=%2Fimail%2Ftop&t=a+b%26c");
    }

    #[test]
    fn parameters_and_headers_overwrite_in_place() {
        let mut request = Request::new("https://host");
        request
            .add_parameter("a", "1")
            .add_parameter("b", "2")
            .add_parameter("a", "3")
            .add_header("Referer", "x")
            .add_header("referer", "y");
        assert_eq!(
            request.parameters(),
            &[("a".to_string(), json!("3")), ("b".to_string(), json!("2"))]
        );
        let referers: Vec<_> = request
            .headers()
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case("referer"))
            .collect();
        assert_eq!(referers.len(), 1);
        assert_eq!(referers[0].1, "y");
    }

    #[test]
    fn user_agent_sets_header() {
        let mut request = Request::new("https://host");
        assert_eq!(request.render().unwrap().header("User-Agent"), Some(DEFAULT_USER_AGENT));
        request.set_user_agent("Mozilla/4.0");
        assert_eq!(request.user_agent(), "Mozilla/4.0");
        assert_eq!(request.render().unwrap().header("user-agent"), Some("Mozilla/4.0"));
        request.clear_header(None);
        assert_eq!(request.headers(), &[("User-Agent".to_string(), DEFAULT_USER_AGENT.to_string())]);
    }

    #[test]
    fn raw_cookie_supersedes_incremental_cookies() {
        let mut request = Request::new("https://host");
        request.add_cookie("a", "1").add_cookie("b", "2");
        assert_eq!(request.cookie_line().as_deref(), Some("a=1; b=2"));

        request.set_raw_cookie("pwsp2=x; WM_IW_INFO=y");
        request.add_cookie("c", "3");
        assert_eq!(request.cookie_line().as_deref(), Some("pwsp2=x; WM_IW_INFO=y"));

        request.clear_cookie(Some("pwsp2"));
        assert_eq!(request.cookie_line().as_deref(), Some("WM_IW_INFO=y"));

        request.clear_cookie(None);
        assert_eq!(request.cookie_line(), None);
    }

    #[test]
    fn basic_authorization_header() {
        let mut request = Request::new("https://host");
        request.set_basic_authorization("user", "pass");
        let rendered = request.render().unwrap();
        assert_eq!(rendered.header("Authorization"), Some("Basic dXNlcjpwYXNz"));
    }

    #[test]
    fn missing_host_is_a_configuration_error() {
        let transport = Recorder::replying("HTTP/1.1 200 OK", "");
        let mut request = Request::default();
        request.set_path("/dcm/dfw").add_parameter("a", "1");
        let err = request.send(&transport).unwrap_err();
        assert!(matches!(err, RequestError::Configuration(_)));
        assert!(transport.sent.borrow().is_empty());
        assert!(request.parameters().is_empty());
    }

    #[test]
    fn post_urlencoded_body() {
        let transport = Recorder::replying("HTTP/1.1 200 OK", "ok");
        let mut request = post("/dcm/dfw");
        request.add_parameter("LOGIN", "WM_LOGIN").add_parameter("WM_KEY", 0);
        request.send(&transport).unwrap();

        let sent = transport.last();
        assert_eq!(sent.uri, "https://imode.net/dcm/dfw");
        assert_eq!(sent.body.as_deref(), Some(&b"LOGIN=WM_LOGIN&WM_KEY=0"[..]));
        assert_eq!(sent.header("Content-Type"), Some("application/x-www-form-urlencoded"));
    }

    #[test]
    fn multipart_body_and_boundary_header_agree() {
        let transport = Recorder::replying("HTTP/1.1 200 OK", "{}");
        let mut request = post("/imail/oexaf/acgi/mailsend");
        request
            .set_body_encoding(BodyEncoding::Multipart)
            .add_parameter("folder.id", 0)
            .add_parameter("folder.mail.subject", "hi");
        request.send(&transport).unwrap();

        let sent = transport.last();
        let content_type = sent.header("Content-Type").unwrap().to_string();
        let boundary = content_type
            .strip_prefix("multipart/form-data; boundary=")
            .unwrap();
        let body = String::from_utf8(sent.body.unwrap()).unwrap();
        assert_eq!(body.matches(&format!("--{boundary}\r\n")).count(), 2);
        assert_eq!(body.matches(&format!("--{boundary}--\r\n")).count(), 1);
        assert!(body.contains("name=\"folder.mail.subject\"\r\n\r\nhi\r\n"));
    }

    #[test]
    fn upload_file_forces_multipart_and_sniffs_type() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\x89PNG\r\n\x1a\n....").unwrap();

        let transport = Recorder::replying("HTTP/1.1 200 OK", "");
        let mut request = post("/upload");
        request
            .add_upload_file(UploadFile::new("photo").with_path(file.path()))
            .add_upload_file(UploadFile::new("none"))
            .add_upload_file(UploadFile::new("doc").with_path(file.path()).with_media_type("application/x-doc"));
        assert_eq!(request.encoding(), BodyEncoding::Multipart);
        request.send(&transport).unwrap();

        let body = String::from_utf8_lossy(transport.last().body.as_deref().unwrap()).into_owned();
        assert_eq!(body.matches("Content-Disposition: form-data;").count(), 3);
        assert!(body.contains("Content-Type: image/png\r\n"));
        assert!(body.contains("Content-Type: application/x-doc\r\n"));
        assert!(body.contains("name=\"none\"; filename=\"\"\r\n"));
        assert_eq!(request.files().len(), 3);
    }

    #[test]
    fn unreadable_upload_is_reported() {
        let transport = Recorder::replying("HTTP/1.1 200 OK", "");
        let mut request = post("/upload");
        request.add_upload_file(UploadFile::new("f").with_path("/nonexistent/imail/upload.bin"));
        let err = request.send(&transport).unwrap_err();
        assert!(matches!(err, RequestError::Upload { .. }));
    }

    #[test]
    fn put_json_keeps_slashes_literal() {
        let transport = Recorder::replying("HTTP/1.1 200 OK", "");
        let mut request = Request::new("https://host");
        request
            .set_method(HttpMethod::Put)
            .set_path("/items")
            .set_body_format("application/json")
            .unwrap()
            .add_parameter("url", "https://imode.net/imail/top")
            .add_parameter("name", "メール");
        request.send(&transport).unwrap();

        let sent = transport.last();
        let body = String::from_utf8(sent.body.clone().unwrap()).unwrap();
        assert!(body.contains("https://imode.net/imail/top"));
        assert!(!body.contains("\\/"));
        assert_eq!(sent.header("Content-Type"), Some("application/json"));

        let decoded: BTreeMap<String, String> = serde_json::from_str(&body).unwrap();
        let expected: BTreeMap<String, String> = [
            ("url".to_string(), "https://imode.net/imail/top".to_string()),
            ("name".to_string(), "メール".to_string()),
        ]
        .into_iter()
        .collect();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn json_body_keeps_scalar_types() {
        let transport = Recorder::replying("HTTP/1.1 200 OK", "");
        let mut request = post("/dcm/dfw");
        request
            .set_body_format("application/json")
            .unwrap()
            .add_parameter("LOGIN", "WM_LOGIN")
            .add_parameter("WM_KEY", 0)
            .add_parameter("remember", true);
        request.send(&transport).unwrap();

        let body = transport.last().body.unwrap();
        let decoded: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(decoded, json!({"LOGIN": "WM_LOGIN", "WM_KEY": 0, "remember": true}));
    }

    #[test]
    fn scalar_parameters_render_as_text_in_forms() {
        let mut request = post("/dcm/dfw");
        request
            .add_parameter("WM_KEY", 0)
            .add_parameter("remember", true)
            .add_parameter("note", Value::Null);
        let rendered = request.render().unwrap();
        assert_eq!(rendered.body.as_deref(), Some(&b"WM_KEY=0&remember=true&note="[..]));
    }

    #[test]
    fn unsupported_body_format_is_rejected() {
        let mut request = Request::new("https://host");
        assert!(matches!(
            request.set_body_format("application/xml"),
            Err(RequestError::Configuration(_))
        ));
    }

    #[test]
    fn get_sends_no_body() {
        let transport = Recorder::replying("HTTP/1.1 200 OK", "");
        let mut request = Request::new("https://host");
        request.set_path("/list").add_parameter("page", 1);
        request.send(&transport).unwrap();
        let sent = transport.last();
        assert!(sent.body.is_none());
        assert_eq!(sent.uri, "https://host/list?page=1");
    }

    #[test]
    fn transport_failure_is_connect_error_and_clears_parameters() {
        let transport = Recorder::failing();
        let mut request = post("/dcm/dfw");
        request.add_parameter("a", "1").add_header("X-PW-SERVICE", "PCMAIL/1.0");
        let err = request.send(&transport).unwrap_err();
        assert!(matches!(err, RequestError::Connect { .. }));
        assert!(request.parameters().is_empty());
        assert_eq!(request.headers().len(), 2);
    }

    #[test]
    fn empty_transport_output_is_connect_error() {
        let transport = Recorder {
            sent: RefCell::new(Vec::new()),
            reply: Some(RawResponse::default()),
        };
        let err = post("/x").send(&transport).unwrap_err();
        assert!(matches!(err, RequestError::Connect { .. }));
    }

    #[test]
    fn error_status_is_returned_not_raised() {
        let transport = Recorder::replying("HTTP/1.1 500 Internal Server Error", "boom");
        let response = post("/x").send(&transport).unwrap();
        assert_eq!(response.status(), 500);
        assert_eq!(response.text(), "boom");
    }

    #[test]
    fn invalid_proxy_is_a_configuration_error() {
        let transport = Recorder::replying("HTTP/1.1 200 OK", "");
        let mut request = post("/dcm/dfw");
        request.set_proxy("bad host", 8080).add_parameter("a", 1);

        let err = request.send(&transport).unwrap_err();

        assert!(matches!(err, RequestError::Configuration(_)));
        assert!(err.to_string().contains("invalid proxy"));
        assert!(transport.sent.borrow().is_empty());
        assert!(request.parameters().is_empty());
    }

    #[test]
    fn unwritable_headers_are_configuration_errors() {
        let transport = Recorder::replying("HTTP/1.1 200 OK", "");

        let mut request = post("/x");
        request.add_header("X-Trace", "a\r\nInjected: 1");
        assert!(matches!(
            request.send(&transport),
            Err(RequestError::Configuration(_))
        ));

        let mut request = post("/x");
        request.add_header("Bad Name", "v");
        assert!(matches!(
            request.send(&transport),
            Err(RequestError::Configuration(_))
        ));

        let mut request = post("/x");
        request.set_raw_cookie("pwsp2=a\nb");
        assert!(matches!(
            request.send(&transport),
            Err(RequestError::Configuration(_))
        ));

        assert!(transport.sent.borrow().is_empty());
    }

    #[test]
    fn suppressed_headers_pass_validation_and_leave_the_block() {
        let transport = Recorder::replying("HTTP/1.1 200 OK", "");
        let mut request = post("/x");
        request.add_header("Expect", "").add_header("X-PW-SERVICE", "PCMAIL/1.0");
        request.send(&transport).unwrap();

        let block = transport.last().header_block();
        assert!(block.contains("X-PW-SERVICE: PCMAIL/1.0\r\n"));
        assert!(!block.contains("Expect"));
    }

    #[test]
    fn rendered_request_carries_options_and_cookie() {
        let mut request = post("/x");
        request
            .set_protocol_version(ProtocolVersion::Http11)
            .set_max_redirect(0)
            .set_read_timeout(Duration::from_secs(3))
            .set_proxy("proxy.local", 8080)
            .set_raw_cookie("pwsp2=abc");
        let rendered = request.render().unwrap();
        assert_eq!(rendered.version, ProtocolVersion::Http11);
        assert_eq!(rendered.max_redirect, 0);
        assert_eq!(rendered.timeout, Duration::from_secs(3));
        assert_eq!(rendered.proxy.as_deref(), Some("http://proxy.local:8080"));
        assert_eq!(rendered.header("Cookie"), Some("pwsp2=abc"));
    }
}
