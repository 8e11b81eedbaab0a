use ureq::http;

use crate::error::TransportError;
use crate::http::{HttpRequest, ProtocolVersion, RawResponse};
use crate::transport::Transport;

/// Backend driving a ureq agent.
///
/// Every call builds one agent config block from the request's options:
/// timeout, proxy, no redirect following, and HTTP error statuses delivered
/// as data. The head comes back as a status line plus `Name: value` lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamTransport;

impl StreamTransport {
    pub fn new() -> Self {
        Self
    }

    fn agent(request: &HttpRequest) -> Result<ureq::Agent, TransportError> {
        let mut config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .max_redirects(0)
            .timeout_global(Some(request.timeout));
        if let Some(proxy) = &request.proxy {
            config = config.proxy(Some(ureq::Proxy::new(proxy)?));
        }
        Ok(config.build().new_agent())
    }
}

impl Transport for StreamTransport {
    fn execute(&self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
        let agent = Self::agent(request)?;

        let version = match request.version {
            ProtocolVersion::Http10 => http::Version::HTTP_10,
            ProtocolVersion::Http11 => http::Version::HTTP_11,
        };
        let mut builder = http::Request::builder()
            .method(request.method.as_str())
            .uri(request.uri.as_str())
            .version(version);
        for (name, value) in request.sendable_headers() {
            builder = builder.header(name, value);
        }

        let mut response = match &request.body {
            Some(body) => agent.run(builder.body(body.clone())?)?,
            None => agent.run(builder.body(())?)?,
        };

        let mut header_lines = Vec::with_capacity(response.headers().len() + 1);
        header_lines.push(format!("{:?} {}", response.version(), response.status()));
        for (name, value) in response.headers() {
            header_lines.push(format!("{name}: {}", String::from_utf8_lossy(value.as_bytes())));
        }
        let body = response.body_mut().read_to_vec()?;

        Ok(RawResponse { header_lines, body })
    }
}
