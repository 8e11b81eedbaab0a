//! Error types for the request engine and the session manager.
//!
//! # Design
//! Only hard failures are errors here. A missing host, an unreadable upload or
//! a transport that produced no data abort the call. HTTP 4xx/5xx statuses, a
//! non-success result code or an undecodable JSON body are soft failures: the
//! caller receives a `Response` or an `Option` and branches on it.

use std::path::PathBuf;

/// Failure produced by a `Transport` when no response data could be obtained.
pub type TransportError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by `Request::send` and the request setters.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// The request cannot be sent as configured: no host, unsupported body
    /// format, invalid proxy or a header that cannot be written.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The transport returned no data at all: DNS failure, refused connection
    /// or timeout.
    #[error("could not connect to the specified host [{uri}]: {source}")]
    Connect {
        uri: String,
        #[source]
        source: TransportError,
    },

    /// An attached file could not be read from disk.
    #[error("failed to read upload file {path}: {source}")]
    Upload {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors returned by `Session` operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Request(#[from] RequestError),

    /// Reading, writing or removing the cookie cache failed.
    #[error("cookie cache error at {path}: {source}")]
    Cache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A handshake step completed without issuing the expected cookie.
    #[error("handshake step {step} did not return cookie {cookie}")]
    Handshake { step: u8, cookie: &'static str },

    /// An authenticated operation was attempted before `login`.
    #[error("session is not authenticated")]
    NotAuthenticated,

    /// The password codec rejected the encrypted secret.
    #[error("credential decode failed: {0}")]
    Credential(String),
}

/// Errors raised while loading a `GatewayConfig`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}
