//! Browser-session emulation for a legacy webmail gateway.
//!
//! # Overview
//! The gateway only talks to something that looks like a 2012 desktop
//! browser: form posts with hand-assembled multipart bodies, raw `Cookie`
//! headers, no redirect following, and certificates that fail validation.
//! This crate provides the request engine that reproduces those wire
//! details and a `Session` that logs in and drives the mail endpoints.
//!
//! # Design
//! - `Request` is a reusable builder. `send` renders it into an
//!   `HttpRequest` and executes it on a caller-chosen `Transport`.
//! - Transports return raw head lines and body; `Response` parses them.
//!   `StreamTransport` (ureq) and `CaptureTransport` (reqwest, full raw
//!   capture) are interchangeable.
//! - Only transport failures are errors. HTTP error statuses, bad result
//!   codes and undecodable JSON come back as data.
//! - `Session` caches the composite login cookie on disk, one file per
//!   account, and drops it when listing mail reports an expired session.

pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod multipart;
pub mod request;
pub mod response;
pub mod session;
pub mod transport;

pub use config::{Endpoints, GatewayConfig};
pub use credentials::{PasswordCodec, PlainPassword};
pub use error::{ConfigError, RequestError, SessionError, TransportError};
pub use http::{BodyEncoding, BodyFormat, HttpMethod, HttpRequest, ProtocolVersion, RawResponse};
pub use request::{Request, UploadFile};
pub use response::{decode_json, split_raw_response, Response};
pub use session::{OutgoingMail, Session, SessionState, SUCCESS_RESULT};
pub use transport::{CaptureTransport, StreamTransport, Transport};
