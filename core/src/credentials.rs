//! Seam for the external password codec.
//!
//! Account passwords are stored encrypted by a component outside this crate.
//! A `PasswordCodec` turns the stored form into the plaintext the gateway
//! login form expects.

use secrecy::SecretString;

use crate::error::SessionError;

pub trait PasswordCodec {
    fn decrypt(&self, encrypted: &str) -> Result<SecretString, SessionError>;
}

/// Codec for secrets that are stored unencrypted.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainPassword;

impl PasswordCodec for PlainPassword {
    fn decrypt(&self, encrypted: &str) -> Result<SecretString, SessionError> {
        Ok(SecretString::from(encrypted.to_string()))
    }
}
