//! HTTP value types that flow through the pipeline.
//!
//! # Design
//! Requests and responses are plain owned data. The pipeline turns a caller's
//! `RequestDescriptor` into one `HttpRequest` per attempt and hands it to a
//! `Transport`; whatever comes back is an `HttpResponse`. Owned `String` /
//! `Vec` fields keep these values cheap to move through async interceptors.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::error::ApiError;
use crate::retry::Backoff;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Methods that change server state and therefore carry a CSRF token.
    pub fn is_mutating(self) -> bool {
        !matches!(self, HttpMethod::Get | HttpMethod::Head)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "HEAD" => Ok(HttpMethod::Head),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(format!("unsupported HTTP method: {other}")),
        }
    }
}

/// Per-call options. Every field is optional from the caller's point of view;
/// unset values fall back to the pipeline's `PipelineConfig`.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    /// Per-attempt timeout. Each retry gets the full window again.
    pub timeout: Option<Duration>,
    /// Additional attempts after the first one.
    pub retries: Option<u32>,
    /// When false, any response the transport returns counts as success.
    pub check_status: bool,
    pub backoff: Option<Backoff>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: HttpMethod::Get,
            headers: Vec::new(),
            body: None,
            timeout: None,
            retries: None,
            check_status: true,
            backoff: None,
        }
    }
}

impl RequestOptions {
    pub fn new(method: HttpMethod) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the request body and set `content-type`.
    pub fn with_json<T: serde::Serialize>(mut self, value: &T) -> Result<Self, ApiError> {
        let body =
            serde_json::to_string(value).map_err(|e| ApiError::Serialization(e.to_string()))?;
        self.body = Some(body);
        Ok(self.with_header("content-type", "application/json"))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn without_status_check(mut self) -> Self {
        self.check_status = false;
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// The unit request interceptors consume and produce.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub url: String,
    pub options: RequestOptions,
}

impl RequestDescriptor {
    pub fn new(url: impl Into<String>, options: RequestOptions) -> Self {
        Self {
            url: url.into(),
            options,
        }
    }
}

/// A single attempt, fully resolved, as handed to the transport.
///
/// `signal` is cancelled when the attempt's timeout fires. Transports that
/// do their own I/O should stop work once it is cancelled.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub signal: CancellationToken,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// True for 2xx.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body).map_err(|e| ApiError::Deserialization(e.to_string()))
    }
}

pub(crate) fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_get_and_head_are_safe() {
        assert!(!HttpMethod::Get.is_mutating());
        assert!(!HttpMethod::Head.is_mutating());
        for method in [HttpMethod::Post, HttpMethod::Put, HttpMethod::Patch, HttpMethod::Delete] {
            assert!(method.is_mutating(), "{method} should be mutating");
        }
    }

    #[test]
    fn method_parses_case_insensitively() {
        assert_eq!("patch".parse::<HttpMethod>().unwrap(), HttpMethod::Patch);
        assert_eq!("DELETE".parse::<HttpMethod>().unwrap(), HttpMethod::Delete);
        assert!("TRACE".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn default_options_are_get_with_status_check() {
        let options = RequestOptions::default();
        assert_eq!(options.method, HttpMethod::Get);
        assert!(options.headers.is_empty());
        assert!(options.timeout.is_none());
        assert!(options.retries.is_none());
        assert!(options.check_status);
    }

    #[test]
    fn header_lookup_ignores_case() {
        let options = RequestOptions::default().with_header("X-Trace", "abc");
        assert_eq!(options.header("x-trace"), Some("abc"));
        assert_eq!(options.header("x-other"), None);
    }

    #[test]
    fn with_json_sets_body_and_content_type() {
        let options = RequestOptions::new(HttpMethod::Post)
            .with_json(&serde_json::json!({ "title": "GST filing deadlines" }))
            .unwrap();
        assert_eq!(options.header("content-type"), Some("application/json"));
        let body: serde_json::Value = serde_json::from_str(options.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["title"], "GST filing deadlines");
    }

    #[test]
    fn response_ok_is_2xx_only() {
        assert!(HttpResponse::new(200).is_ok());
        assert!(HttpResponse::new(204).is_ok());
        assert!(!HttpResponse::new(304).is_ok());
        assert!(!HttpResponse::new(500).is_ok());
    }

    #[test]
    fn response_json_reports_bad_body() {
        let response = HttpResponse::new(200).with_body("not json");
        let err = response.json::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, ApiError::Deserialization(_)));
    }
}
