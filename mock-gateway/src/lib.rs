//! In-process stand-in for the webmail gateway.
//!
//! Implements the two-step cookie login and the three mail endpoints with
//! the same acceptance rules as the real service: every call needs the
//! `X-PW-SERVICE` and `Referer` headers, and mail calls need a live `pwsp2`
//! cookie. A few extra routes (`/echo`, `/redirect`, `/status/{code}`) let
//! transport tests inspect what actually went over the wire.
//!
//! State sits behind a `std::sync::Mutex` so synchronous tests can inspect it
//! from outside the server's runtime.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    body::Bytes,
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, Method, StatusCode, Uri, Version},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Form, Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use uuid::Uuid;

pub const SERVICE: &str = "PCMAIL/1.0";
pub const SUCCESS: &str = "PW1000";
pub const SESSION_EXPIRED: &str = "PW1409";

/// A mail accepted by `mailsend`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct StoredMail {
    pub id: String,
    pub subject: String,
    pub body: String,
}

/// One request as the gateway saw it.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub cookie: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Default)]
struct GatewayState {
    account_id: String,
    password: String,
    intermediate_tokens: HashSet<String>,
    sessions: HashSet<String>,
    inbox: Vec<StoredMail>,
    outbox: Vec<SentMail>,
    requests: Vec<RecordedRequest>,
}

/// Shared handle to the gateway's state.
#[derive(Clone, Debug, Default)]
pub struct Gateway {
    state: Arc<Mutex<GatewayState>>,
}

impl Gateway {
    pub fn new(account_id: &str, password: &str) -> Self {
        let gateway = Self::default();
        {
            let mut state = gateway.lock();
            state.account_id = account_id.to_string();
            state.password = password.to_string();
        }
        gateway
    }

    fn lock(&self) -> MutexGuard<'_, GatewayState> {
        // A panicking handler must not take the whole mock down with it.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_mail(&self, id: &str, subject: &str, body: &str) {
        self.lock().inbox.push(StoredMail {
            id: id.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
    }

    /// Invalidate every issued `pwsp2` cookie.
    pub fn expire_sessions(&self) {
        self.lock().sessions.clear();
    }

    pub fn outbox(&self) -> Vec<SentMail> {
        self.lock().outbox.clone()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn hits(&self) -> usize {
        self.lock().requests.len()
    }

    fn record(&self, method: &Method, uri: &Uri, headers: &HeaderMap) {
        let text = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        self.lock().requests.push(RecordedRequest {
            method: method.to_string(),
            path: uri.path().to_string(),
            cookie: text(header::COOKIE),
            content_type: text(header::CONTENT_TYPE),
        });
    }

    fn has_session(&self, headers: &HeaderMap) -> bool {
        cookies(headers)
            .get("pwsp2")
            .is_some_and(|token| self.lock().sessions.contains(token))
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/dcm/dfw", post(gateway_login))
            .route("/imail/oexaf/acgi/login", post(mail_login))
            .route("/imail/oexaf/acgi/mailidlist", post(mail_id_list))
            .route("/imail/oexaf/acgi/mailsend", post(mail_send))
            .route("/imail/oexaf/acgi/maildetail", post(mail_detail))
            .route("/echo", any(echo))
            .route("/redirect", any(redirect))
            .route("/status/{code}", get(status))
            .with_state(self.clone())
    }
}

pub fn app() -> Router {
    Gateway::default().router()
}

pub async fn run(listener: TcpListener, gateway: Gateway) -> Result<(), std::io::Error> {
    axum::serve(listener, gateway.router()).await
}

/// Parse the request's `Cookie` header into a map.
pub fn cookies(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|line| line.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

fn accepted(headers: &HeaderMap) -> bool {
    let service = headers.get("x-pw-service").and_then(|v| v.to_str().ok());
    service == Some(SERVICE) && headers.contains_key(header::REFERER)
}

fn rejected() -> Response {
    (StatusCode::FORBIDDEN, "missing service headers").into_response()
}

fn envelope(result: &str, data: serde_json::Value) -> Json<serde_json::Value> {
    Json(json!({ "common": { "result": result }, "data": data }))
}

async fn gateway_login(
    State(gw): State<Gateway>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    gw.record(&method, &uri, &headers);
    if !accepted(&headers) {
        return rejected();
    }

    let valid = {
        let state = gw.lock();
        form.get("LOGIN").map(String::as_str) == Some("WM_LOGIN")
            && form.get("MDCM_UID") == Some(&state.account_id)
            && form.get("MDCM_PWD") == Some(&state.password)
    };
    if !valid {
        return (StatusCode::OK, "<html>login failed</html>").into_response();
    }

    let token = Uuid::new_v4().simple().to_string();
    gw.lock().intermediate_tokens.insert(token.clone());
    (
        [(header::SET_COOKIE, format!("WM_IW_INFO_PA={token}; path=/; secure"))],
        "<html>ok</html>",
    )
        .into_response()
}

async fn mail_login(
    State(gw): State<Gateway>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    gw.record(&method, &uri, &headers);
    if !accepted(&headers) {
        return rejected();
    }

    let cookies = cookies(&headers);
    let valid = {
        let state = gw.lock();
        cookies.get("MDCM_DCMID").is_some()
            && cookies
                .get("WM_IW_INFO_PA")
                .is_some_and(|token| state.intermediate_tokens.contains(token))
            && cookies.get("WM_IW_INFO_PA") == cookies.get("WM_IW_INFO")
    };
    if !valid {
        return (StatusCode::FOUND, [(header::LOCATION, "/imail/error.html")]).into_response();
    }

    let token = Uuid::new_v4().simple().to_string();
    gw.lock().sessions.insert(token.clone());
    (
        [(header::SET_COOKIE, format!("pwsp2={token}; path=/imail"))],
        "",
    )
        .into_response()
}

async fn mail_id_list(
    State(gw): State<Gateway>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    gw.record(&method, &uri, &headers);
    if !accepted(&headers) {
        return rejected();
    }
    if !gw.has_session(&headers) {
        return envelope(SESSION_EXPIRED, json!({ "folderList": [] })).into_response();
    }

    let ids: Vec<String> = gw.lock().inbox.iter().map(|m| m.id.clone()).collect();
    envelope(SUCCESS, json!({ "folderList": [{ "id": 0, "mailIdList": ids }] })).into_response()
}

async fn mail_send(
    State(gw): State<Gateway>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    gw.record(&method, &uri, &headers);
    if !accepted(&headers) {
        return rejected();
    }

    let mut fields = HashMap::new();
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                let name = field.name().unwrap_or_default().to_string();
                let value = field.text().await.unwrap_or_default();
                fields.insert(name, value);
            }
            Ok(None) => break,
            Err(err) => return (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
        }
    }

    if !gw.has_session(&headers) {
        return envelope(SESSION_EXPIRED, json!({})).into_response();
    }

    let field = |name: &str| fields.get(name).cloned().unwrap_or_default();
    gw.lock().outbox.push(SentMail {
        to: field("folder.mail.addrinfo(0).mladdr"),
        subject: field("folder.mail.subject"),
        body: field("folder.mail.data"),
    });
    envelope(SUCCESS, json!({})).into_response()
}

async fn mail_detail(
    State(gw): State<Gateway>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    gw.record(&method, &uri, &headers);
    if !accepted(&headers) {
        return rejected();
    }
    if !gw.has_session(&headers) {
        return envelope(SESSION_EXPIRED, json!({})).into_response();
    }

    let id = form.get("folder.mail.id").cloned().unwrap_or_default();
    let mail = gw.lock().inbox.iter().find(|m| m.id == id).cloned();
    match mail {
        Some(mail) => envelope(SUCCESS, json!({ "previewInfo": mail })).into_response(),
        None => envelope("PW1404", json!({})).into_response(),
    }
}

/// Reflect the request back as JSON.
async fn echo(
    State(gw): State<Gateway>,
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
) -> Json<serde_json::Value> {
    gw.record(&method, &uri, &headers);
    let headers: HashMap<String, String> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    Json(json!({
        "method": method.as_str(),
        "uri": uri.to_string(),
        "version": format!("{version:?}"),
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
    }))
}

async fn redirect(State(gw): State<Gateway>, method: Method, uri: Uri, headers: HeaderMap) -> Response {
    gw.record(&method, &uri, &headers);
    (
        StatusCode::FOUND,
        [
            (header::LOCATION, "/echo".to_string()),
            (header::SET_COOKIE, "hop=1; path=/".to_string()),
        ],
        "moved",
    )
        .into_response()
}

async fn status(
    State(gw): State<Gateway>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path(code): Path<u16>,
) -> Response {
    gw.record(&method, &uri, &headers);
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST);
    (status, format!("status {code}")).into_response()
}
