//! Authenticated webmail session on top of `Request`.
//!
//! # Design
//! A `Session` owns one `Request` for its whole life and reconfigures it per
//! call, the way a browser tab keeps its headers between page loads. Login
//! is a two-step cookie handshake whose result, the composite cookie, is
//! cached in `<cache_dir>/cookie_<account>` so later processes skip the
//! handshake entirely. The cache is written only after both steps produced
//! their cookies.
//!
//! Failure handling differs per operation. Only `mail_id_list` treats a
//! non-success result code as an expired session: it deletes the cache and
//! drops the cookie so the next `login` redoes the handshake. `send_mail`
//! and `mail_detail` hand the result back untouched.

use std::cmp::Ordering;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::config::GatewayConfig;
use crate::credentials::PasswordCodec;
use crate::error::SessionError;
use crate::http::{BodyEncoding, HttpMethod, ProtocolVersion};
use crate::request::Request;
use crate::response::Response;
use crate::transport::Transport;

/// Result code the gateway reports on success.
pub const SUCCESS_RESULT: &str = "PW1000";

const INTERMEDIATE_COOKIE: &str = "WM_IW_INFO_PA";
const SESSION_COOKIE: &str = "pwsp2";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated,
}

/// A mail to submit through `Session::send_mail`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub struct Session<T: Transport> {
    config: GatewayConfig,
    account_id: String,
    login_cookie_id: String,
    password: SecretString,
    cookie: Option<String>,
    state: SessionState,
    request: Request,
    transport: T,
}

impl<T: Transport> Session<T> {
    pub fn new(
        config: GatewayConfig,
        account_id: impl Into<String>,
        password: SecretString,
        transport: T,
    ) -> Self {
        let account_id = account_id.into();
        let request = Request::new(config.base_uri.clone());
        Self {
            config,
            login_cookie_id: account_id.clone(),
            account_id,
            password,
            cookie: None,
            state: SessionState::Unauthenticated,
            request,
            transport,
        }
    }

    /// Build a session from an encrypted password.
    pub fn from_encrypted(
        config: GatewayConfig,
        account_id: impl Into<String>,
        encrypted_password: &str,
        codec: &dyn PasswordCodec,
        transport: T,
    ) -> Result<Self, SessionError> {
        let password = codec.decrypt(encrypted_password)?;
        Ok(Self::new(config, account_id, password, transport))
    }

    /// Override the account id presented in the `MDCM_DCMID` login cookie.
    pub fn with_login_cookie_id(mut self, id: impl Into<String>) -> Self {
        self.login_cookie_id = id.into();
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// The composite cookie, once authenticated.
    pub fn cookie(&self) -> Option<&str> {
        self.cookie.as_deref()
    }

    pub fn cache_path(&self) -> PathBuf {
        self.config.cache_file(&self.account_id)
    }

    // -----------------------------------------------------------------------
    // Login
    // -----------------------------------------------------------------------

    /// Authenticate from the cookie cache, or run the two-step handshake.
    pub fn login(&mut self) -> Result<(), SessionError> {
        self.state = SessionState::Authenticating;
        match self.authenticate() {
            Ok(cookie) => {
                self.cookie = Some(cookie);
                self.state = SessionState::Authenticated;
                Ok(())
            }
            Err(err) => {
                self.cookie = None;
                self.state = SessionState::Unauthenticated;
                Err(err)
            }
        }
    }

    fn authenticate(&mut self) -> Result<String, SessionError> {
        self.prepare_login_request();

        let cache = self.cache_path();
        if let Some(cookie) = read_cache(&cache)? {
            tracing::info!(account = %self.account_id, path = %cache.display(), "using cached session cookie");
            self.request.clear_parameter(None);
            return Ok(cookie);
        }

        let cookie = self.handshake()?;
        if let Some(dir) = cache.parent() {
            fs::create_dir_all(dir).map_err(|source| SessionError::Cache {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        fs::write(&cache, &cookie).map_err(|source| SessionError::Cache {
            path: cache.clone(),
            source,
        })?;
        tracing::info!(account = %self.account_id, "handshake complete, session cookie cached");
        Ok(cookie)
    }

    fn prepare_login_request(&mut self) {
        let referer = self.config.url_for(&self.config.endpoints.login_referer);
        self.request
            .set_protocol_version(ProtocolVersion::Http11)
            .set_base_uri(self.config.base_uri.clone())
            .set_path(self.config.endpoints.gateway.clone())
            .set_max_redirect(0)
            .set_read_timeout(self.config.read_timeout)
            .set_method(HttpMethod::Post)
            .set_body_encoding(BodyEncoding::UrlEncoded)
            .clear_cookie(None)
            .add_parameter(
                "HIDEURL",
                "?WM_AK=https%3a%2f%2fimode.net%2fag&path=%2fimail%2ftop&query=",
            )
            .add_parameter("LOGIN", "WM_LOGIN")
            .add_parameter("WM_KEY", 0)
            .add_parameter("MDCM_UID", self.account_id.clone())
            .add_parameter("MDCM_PWD", self.password.expose_secret())
            .set_user_agent(self.config.user_agent.clone())
            .add_header("X-PW-SERVICE", self.config.service.clone())
            .add_header("Referer", referer);
    }

    fn handshake(&mut self) -> Result<String, SessionError> {
        let response = self.request.send(&self.transport)?;
        let intermediate = response
            .cookie(INTERMEDIATE_COOKIE)
            .ok_or(SessionError::Handshake {
                step: 1,
                cookie: INTERMEDIATE_COOKIE,
            })?
            .to_string();
        let login_cookie = format!(
            "MDCM_DCMID={}; {INTERMEDIATE_COOKIE}={intermediate}; WM_IW_INFO={intermediate}",
            self.login_cookie_id
        );

        let login_path = self.config.endpoints.login.clone();
        self.request
            .set_path(login_path)
            .set_raw_cookie(login_cookie.clone());
        let response = self.request.send(&self.transport)?;
        let session = response.cookie(SESSION_COOKIE).ok_or(SessionError::Handshake {
            step: 2,
            cookie: SESSION_COOKIE,
        })?;

        Ok(format!("{SESSION_COOKIE}={session}; {login_cookie}"))
    }

    /// Forget the session: delete the cache file and drop the cookie.
    pub fn logout(&mut self) -> Result<(), SessionError> {
        let cache = self.cache_path();
        self.cookie = None;
        self.state = SessionState::Unauthenticated;
        match fs::remove_file(&cache) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(SessionError::Cache {
                path: cache,
                source: err,
            }),
            _ => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Authenticated operations
    // -----------------------------------------------------------------------

    /// Submit a mail. Returns the gateway's result code, or `None` when the
    /// reply could not be decoded.
    pub fn send_mail(&mut self, mail: &OutgoingMail) -> Result<Option<String>, SessionError> {
        self.request.add_header("Expect", "");
        let response = self.call(
            self.config.endpoints.mail_send.clone(),
            BodyEncoding::Multipart,
            &[
                ("folder.id", "0"),
                ("folder.mail.id", "0000000000000000000"),
                ("folder.mail.type", "0"),
                ("folder.mail.addrinfo(0).mladdr", mail.to.as_str()),
                ("folder.mail.addrinfo(0).type", "1"),
                ("folder.mail.subject", mail.subject.as_str()),
                ("folder.mail.data", mail.body.as_str()),
                ("iemoji(0).id", ""),
                ("iemoji(1).id", ""),
                ("reqtype", "0"),
            ],
        )?;

        let code = response.json().as_ref().and_then(result_code);
        if code.as_deref() != Some(SUCCESS_RESULT) {
            tracing::warn!(account = %self.account_id, code = ?code, "mail send was not accepted");
        }
        Ok(code)
    }

    /// List mail ids in the inbox, sorted.
    ///
    /// A non-success result code or an undecodable reply invalidates the
    /// session. Whatever ids the reply did carry are still returned.
    pub fn mail_id_list(&mut self) -> Result<Vec<String>, SessionError> {
        let response = self.call(
            self.config.endpoints.mail_id_list.clone(),
            BodyEncoding::UrlEncoded,
            &[("folder(0).id", "0")],
        )?;

        let decoded = response.json();
        let code = decoded.as_ref().and_then(result_code);
        if code.as_deref() != Some(SUCCESS_RESULT) {
            tracing::warn!(account = %self.account_id, code = ?code, "mail id list failed, dropping cached session");
            self.invalidate();
        }

        let mut ids = decoded.as_ref().map(mail_ids).unwrap_or_default();
        ids.sort_by(|a, b| compare_mail_ids(a, b));
        Ok(ids)
    }

    /// Fetch one mail. `None` when the reply is not JSON.
    pub fn mail_detail(&mut self, mail_id: &str) -> Result<Option<Value>, SessionError> {
        let response = self.call(
            self.config.endpoints.mail_detail.clone(),
            BodyEncoding::UrlEncoded,
            &[("folder.id", "0"), ("folder.mail.id", mail_id)],
        )?;
        Ok(response.json())
    }

    fn call(
        &mut self,
        path: String,
        encoding: BodyEncoding,
        parameters: &[(&str, &str)],
    ) -> Result<Response, SessionError> {
        let cookie = match (&self.cookie, self.state) {
            (Some(cookie), SessionState::Authenticated) => cookie.clone(),
            _ => return Err(SessionError::NotAuthenticated),
        };

        let referer = self.config.url_for(&self.config.endpoints.mail_referer);
        self.request
            .set_method(HttpMethod::Post)
            .set_path(path)
            .set_body_encoding(encoding)
            .set_raw_cookie(cookie)
            .add_header("X-PW-SERVICE", self.config.service.clone())
            .add_header("Referer", referer)
            .add_parameters(parameters.iter().copied());

        let response = self.request.send(&self.transport)?;
        self.request.clear_parameter(None);
        Ok(response)
    }

    fn invalidate(&mut self) {
        let cache = self.cache_path();
        if let Err(err) = fs::remove_file(&cache) {
            if err.kind() != ErrorKind::NotFound {
                tracing::warn!(path = %cache.display(), error = %err, "failed to remove cookie cache");
            }
        }
        self.cookie = None;
        self.state = SessionState::Unauthenticated;
    }
}

/// Trimmed cache contents, or `None` when the file is missing or blank.
fn read_cache(path: &Path) -> Result<Option<String>, SessionError> {
    if !path.is_file() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|source| SessionError::Cache {
        path: path.to_path_buf(),
        source,
    })?;
    let cookie = content.trim();
    Ok((!cookie.is_empty()).then(|| cookie.to_string()))
}

/// `common.result` of a decoded reply.
pub fn result_code(value: &Value) -> Option<String> {
    value["common"]["result"].as_str().map(str::to_string)
}

/// Ids from `data.folderList[0].mailIdList`, strings or numbers.
pub fn mail_ids(value: &Value) -> Vec<String> {
    value["data"]["folderList"][0]["mailIdList"]
        .as_array()
        .map(|ids| {
            ids.iter()
                .filter_map(|id| match id {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Numeric order for digit-only ids, byte order otherwise.
fn compare_mail_ids(a: &str, b: &str) -> Ordering {
    let numeric = |s: &str| !s.is_empty() && s.bytes().all(|c| c.is_ascii_digit());
    if numeric(a) && numeric(b) {
        let (a, b) = (a.trim_start_matches('0'), b.trim_start_matches('0'));
        a.len().cmp(&b.len()).then_with(|| a.cmp(b))
    } else {
        a.cmp(b)
    }
}
