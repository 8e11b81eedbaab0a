//! Raw response splitting and parsing.
//!
//! # Design
//! Parsing is two-phase. `split_raw_response` turns one captured byte stream
//! into header lines and body; `Response::from_raw` turns header lines into a
//! status code, a header list and a cookie map. Transports that already hand
//! back header lines skip the first phase. Neither phase fails: a response
//! without a status line has status `0`, and lines without a colon are
//! dropped.

use std::collections::HashMap;

use serde_json::Value;

use crate::http::RawResponse;

/// Split a complete raw response into header lines and body.
///
/// Lines up to the first blank line are headers (trailing whitespace
/// trimmed). Everything after that blank line is the body, right-trimmed.
/// Interim `1xx` heads are skipped so the final head wins.
pub fn split_raw_response(raw: &[u8]) -> RawResponse {
    let mut rest = raw;

    loop {
        let mut header_lines = Vec::new();
        let mut body_start = None;
        let mut offset = 0;

        while offset < rest.len() {
            let end = rest[offset..]
                .iter()
                .position(|&b| b == b'\n')
                .map_or(rest.len(), |p| offset + p);
            let line = String::from_utf8_lossy(&rest[offset..end]);
            let line = line.trim_end();
            offset = (end + 1).min(rest.len());

            if line.is_empty() {
                body_start = Some(offset);
                break;
            }
            header_lines.push(line.to_string());
        }

        let body = match body_start {
            Some(start) => &rest[start..],
            None => &rest[rest.len()..],
        };

        if is_interim(&header_lines) && body.starts_with(b"HTTP/") {
            rest = body;
            continue;
        }

        return RawResponse {
            header_lines,
            body: trim_end_bytes(body).to_vec(),
        };
    }
}

fn is_interim(header_lines: &[String]) -> bool {
    header_lines
        .first()
        .and_then(|line| parse_status_code(line))
        .is_some_and(|code| (100..200).contains(&code))
}

fn trim_end_bytes(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |p| p + 1);
    &bytes[..end]
}

fn parse_status_code(line: &str) -> Option<u16> {
    if !line.starts_with("HTTP/") {
        return None;
    }
    line.split_whitespace().nth(1)?.parse().ok()
}

/// A parsed HTTP response. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Response {
    status_line: String,
    status: u16,
    headers: Vec<(String, String)>,
    cookies: HashMap<String, String>,
    body: Vec<u8>,
}

impl Response {
    pub fn from_raw(raw: RawResponse) -> Self {
        let mut status_line = String::new();
        let mut status = 0;
        let mut headers = Vec::new();
        let mut cookies = HashMap::new();

        for line in &raw.header_lines {
            if let Some(code) = parse_status_code(line) {
                // A later status line starts a new head (redirect chains).
                status_line = line.clone();
                status = code;
                headers.clear();
                cookies.clear();
                continue;
            }

            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let (name, value) = (name.trim(), value.trim());

            if name.eq_ignore_ascii_case("set-cookie") {
                if let Some((cookie_name, cookie_value)) = parse_set_cookie(value) {
                    cookies.insert(cookie_name, cookie_value);
                }
            }
            headers.push((name.to_string(), value.to_string()));
        }

        Self {
            status_line,
            status,
            headers,
            cookies,
            body: raw.body,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn status_line(&self) -> &str {
        &self.status_line
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Last value of header `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Value of cookie `name` from the `Set-Cookie` headers.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn cookies(&self) -> &HashMap<String, String> {
        &self.cookies
    }

    /// Raw body bytes.
    pub fn contents(&self) -> &[u8] {
        &self.body
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> Option<Value> {
        decode_json(&self.body)
    }
}

fn parse_set_cookie(value: &str) -> Option<(String, String)> {
    let pair = value.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

/// Best-effort JSON decoding. Malformed input yields `None`.
pub fn decode_json(body: &[u8]) -> Option<Value> {
    serde_json::from_slice(body).ok()
}
