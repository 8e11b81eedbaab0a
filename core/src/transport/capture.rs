use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::redirect::Policy;
use reqwest::{Method, Proxy, Version};

use crate::error::TransportError;
use crate::http::{HttpRequest, ProtocolVersion, RawResponse};
use crate::response::split_raw_response;
use crate::transport::Transport;

/// Client options that vary per request.
type ClientKey = (Duration, Option<String>);

/// Backend driving a reqwest client the way the gateway's legacy PHP client
/// drove curl: certificate verification off, redirects off, and the whole
/// response captured as one byte stream before being split on the first
/// blank line.
///
/// A blocking client owns a runtime thread, so one client is built per
/// distinct timeout and proxy and reused for every later call with the same
/// options.
#[derive(Debug, Default)]
pub struct CaptureTransport {
    clients: Mutex<HashMap<ClientKey, Client>>,
}

impl CaptureTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&self, request: &HttpRequest) -> Result<Client, TransportError> {
        let key = (request.timeout, request.proxy.clone());
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        // The gateway still presents certificates that fail modern validation.
        let mut builder = Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(Policy::none())
            .timeout(request.timeout);
        if let Some(proxy) = &request.proxy {
            builder = builder.proxy(Proxy::all(proxy.as_str())?);
        }
        let client = builder.build()?;
        clients.insert(key, client.clone());
        Ok(client)
    }

    #[cfg(test)]
    fn cached_clients(&self) -> usize {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Transport for CaptureTransport {
    fn execute(&self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
        let client = self.client(request)?;

        let version = match request.version {
            ProtocolVersion::Http10 => Version::HTTP_10,
            ProtocolVersion::Http11 => Version::HTTP_11,
        };
        let method = Method::from_bytes(request.method.as_str().as_bytes())?;
        let mut call = client.request(method, request.uri.as_str()).version(version);
        for (name, value) in request.sendable_headers() {
            call = call.header(name, value);
        }
        if let Some(body) = &request.body {
            call = call.body(body.clone());
        }

        let raw = capture(call.send()?)?;
        Ok(split_raw_response(&raw))
    }
}

/// Serialize the response head and body back into one raw byte stream.
fn capture(response: Response) -> Result<Vec<u8>, reqwest::Error> {
    let mut raw = format!("{:?} {}\r\n", response.version(), response.status()).into_bytes();
    for (name, value) in response.headers() {
        raw.extend_from_slice(name.as_str().as_bytes());
        raw.extend_from_slice(b": ");
        raw.extend_from_slice(value.as_bytes());
        raw.extend_from_slice(b"\r\n");
    }
    raw.extend_from_slice(b"\r\n");
    raw.extend_from_slice(&response.bytes()?);
    Ok(raw)
}
