//! Anti-forgery token injection for mutating requests.

use async_trait::async_trait;

use crate::http::RequestOptions;

/// Header the token is sent under unless the config names another one.
pub const DEFAULT_CSRF_HEADER: &str = "X-CSRF-Token";

/// Supplies the current session's CSRF token.
#[async_trait]
pub trait CsrfSource: Send + Sync {
    async fn csrf_token(&self) -> String;
}

/// A token fixed at construction time.
#[derive(Debug, Clone)]
pub struct StaticCsrfToken(pub String);

#[async_trait]
impl CsrfSource for StaticCsrfToken {
    async fn csrf_token(&self) -> String {
        self.0.clone()
    }
}

#[async_trait]
impl<F> CsrfSource for F
where
    F: Fn() -> String + Send + Sync,
{
    async fn csrf_token(&self) -> String {
        self()
    }
}

/// Add the CSRF header to `options` when the method mutates state.
///
/// A header the caller already set under the same name (any case) is left
/// alone and the source is not consulted.
pub async fn inject_csrf(
    options: RequestOptions,
    header_name: &str,
    source: &dyn CsrfSource,
) -> RequestOptions {
    if !options.method.is_mutating() || options.header(header_name).is_some() {
        return options;
    }
    let token = source.csrf_token().await;
    options.with_header(header_name, token)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::http::HttpMethod;

    fn source() -> StaticCsrfToken {
        StaticCsrfToken("tok-123".to_string())
    }

    #[tokio::test]
    async fn adds_token_for_every_mutating_method() {
        for method in [HttpMethod::Post, HttpMethod::Put, HttpMethod::Patch, HttpMethod::Delete] {
            let options = inject_csrf(RequestOptions::new(method), DEFAULT_CSRF_HEADER, &source()).await;
            assert_eq!(options.header("x-csrf-token"), Some("tok-123"), "{method}");
        }
    }

    #[tokio::test]
    async fn leaves_safe_methods_alone() {
        for method in [HttpMethod::Get, HttpMethod::Head] {
            let options = inject_csrf(RequestOptions::new(method), DEFAULT_CSRF_HEADER, &source()).await;
            assert!(options.header(DEFAULT_CSRF_HEADER).is_none(), "{method}");
        }
    }

    #[tokio::test]
    async fn caller_supplied_header_wins() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let source = move || {
            counter.fetch_add(1, Ordering::SeqCst);
            "from-source".to_string()
        };

        let options = RequestOptions::new(HttpMethod::Post).with_header("x-csrf-token", "explicit");
        let options = inject_csrf(options, DEFAULT_CSRF_HEADER, &source).await;

        assert_eq!(options.header(DEFAULT_CSRF_HEADER), Some("explicit"));
        assert_eq!(options.headers.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn honours_custom_header_name() {
        let options = inject_csrf(RequestOptions::new(HttpMethod::Delete), "X-XSRF", &source()).await;
        assert_eq!(options.header("x-xsrf"), Some("tok-123"));
        assert!(options.header(DEFAULT_CSRF_HEADER).is_none());
    }
}
