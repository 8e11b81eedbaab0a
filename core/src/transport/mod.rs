//! Interchangeable network backends.
//!
//! # Design
//! A `Transport` receives a fully rendered `HttpRequest` and returns the raw
//! head and body, or an error when no data came back at all. Backends never
//! follow redirects and never turn 4xx/5xx into errors; interpretation is
//! left to `Response` and its caller. The backend is chosen per call by
//! passing it to `Request::send`.
//!
//! - `StreamTransport` drives a ureq agent and reports the head as lines.
//! - `CaptureTransport` drives a reqwest client with certificate checks off,
//!   captures the whole response as one byte stream and splits it itself.

mod capture;
mod stream;

pub use capture::CaptureTransport;
pub use stream::StreamTransport;

use crate::error::TransportError;
use crate::http::{HttpRequest, RawResponse};

/// Performs one HTTP exchange.
pub trait Transport {
    fn execute(&self, request: &HttpRequest) -> Result<RawResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn execute(&self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
        (**self).execute(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn execute(&self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
        (**self).execute(request)
    }
}
