//! Reverse proxy to the upstream virtual host.
//!
//! Every request that is not a live-reload endpoint is forwarded to the
//! upstream. HTML responses are rewritten on the way back:
//!
//! - links pointing at the upstream host are pointed at the proxy instead
//! - the live-reload client is injected before `</body>`

use super::{AppState, CLIENT_PATH};
use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use regex::Regex;

/// Largest request body forwarded upstream.
const MAX_REQUEST_BODY: usize = 32 * 1024 * 1024;

const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Error while forwarding a request.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("cannot read request body: {0}")]
    Body(#[from] axum::Error),
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

/// Upstream origin for a configured proxy host.
///
/// A host without a scheme is reached over plain HTTP.
pub fn upstream_origin(proxy: &str) -> String {
    let trimmed = proxy.trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

/// Host part (with port) of an origin.
pub fn origin_host(origin: &str) -> &str {
    origin.split_once("://").map_or(origin, |(_, rest)| rest)
}

/// Regex matching absolute and protocol-relative links to `host`.
pub fn link_pattern(host: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"(?:https?:)?//{}\b", regex::escape(host)))
}

/// Point links at the upstream host to `local_host` instead.
///
/// Links become protocol-relative so they work whatever scheme the browser
/// used to reach the proxy.
pub fn rewrite_links(html: &str, pattern: &Regex, local_host: &str) -> String {
    pattern.replace_all(html, format!("//{}", local_host).as_str()).into_owned()
}

/// Insert the live-reload client before the last `</body>`, or at the end
/// when there is none.
pub fn inject_client(html: &str) -> String {
    let tag = format!("<script async src=\"{}\"></script>", CLIENT_PATH);
    match html.to_ascii_lowercase().rfind("</body>") {
        Some(index) => format!("{}{}{}", &html[..index], tag, &html[index..]),
        None => format!("{}{}", html, tag),
    }
}

fn is_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().starts_with("text/html"))
}

fn forwardable(headers: &HeaderMap, skip: &[HeaderName]) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !HOP_BY_HOP.contains(name) && !skip.contains(name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// Fallback handler forwarding everything to the upstream.
pub async fn handle(State(state): State<AppState>, request: Request) -> Response {
    let path = request.uri().path().to_string();
    match forward(&state, request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(prefix = %state.options.log_prefix, %path, error = %e, "proxy error");
            let message = format!("[{}] Proxy error for {}: {}\n", state.options.log_prefix, path, e);
            (StatusCode::BAD_GATEWAY, message).into_response()
        }
    }
}

async fn forward(state: &AppState, request: Request) -> Result<Response, ProxyError> {
    let (parts, body) = request.into_parts();
    let local_host = parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| format!("localhost:{}", state.options.port));
    let path = parts.uri.path_and_query().map_or("/", |p| p.as_str());
    let url = format!("{}{}", state.upstream, path);

    let body = to_bytes(body, MAX_REQUEST_BODY).await?;
    // Upstream responses are rewritten, so ask for an uncompressed body
    let headers = forwardable(&parts.headers, &[header::HOST, header::ACCEPT_ENCODING, header::CONTENT_LENGTH]);
    let upstream = state.client.request(parts.method, &url).headers(headers).body(body).send().await?;

    let status = upstream.status();
    let html = is_html(upstream.headers());
    let mut headers = forwardable(upstream.headers(), &[header::CONTENT_LENGTH]);
    if let Some(location) = headers.get(header::LOCATION).and_then(|v| v.to_str().ok()) {
        let rewritten = rewrite_links(location, &state.link_pattern, &local_host);
        if let Ok(value) = HeaderValue::from_str(&rewritten) {
            headers.insert(header::LOCATION, value);
        }
    }

    let bytes = upstream.bytes().await?;
    let body = if html {
        let text = String::from_utf8_lossy(&bytes);
        Body::from(inject_client(&rewrite_links(&text, &state.link_pattern, &local_host)))
    } else {
        Body::from(bytes)
    };

    tracing::debug!(%status, %url, "proxied");
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_origin() {
        assert_eq!(upstream_origin("project.src"), "http://project.src");
        assert_eq!(upstream_origin("https://example.com/"), "https://example.com");
        assert_eq!(origin_host("http://127.0.0.1:8080"), "127.0.0.1:8080");
    }

    #[test]
    fn test_rewrite_links() {
        let pattern = link_pattern("project.src").unwrap();
        let html = concat!(
            "<a href=\"http://project.src/about\">a</a>",
            "<img src=\"https://project.src/logo.png\">",
            "<script src=\"//project.src/app.js\"></script>",
            "<a href=\"http://projectxsrc/\">b</a>",
            "<a href=\"http://project.srcset.io/\">c</a>",
        );
        let out = rewrite_links(html, &pattern, "localhost:5555");

        assert!(out.contains("href=\"//localhost:5555/about\""));
        assert!(out.contains("src=\"//localhost:5555/logo.png\""));
        assert!(out.contains("src=\"//localhost:5555/app.js\""));
        assert!(out.contains("http://projectxsrc/"));
        assert!(out.contains("http://project.srcset.io/"));
    }

    #[test]
    fn test_inject_client_before_body_end() {
        let out = inject_client("<html><BODY><p>x</p></BODY></html>");
        assert_eq!(
            out,
            "<html><BODY><p>x</p><script async src=\"/__assetflow/client.js\"></script></BODY></html>"
        );
        assert!(inject_client("<p>fragment</p>").ends_with("client.js\"></script>"));
    }

    #[test]
    fn test_forwardable_drops_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("10"));
        headers.insert(header::COOKIE, HeaderValue::from_static("a=b"));

        let out = forwardable(&headers, &[header::CONTENT_LENGTH]);
        assert_eq!(out.len(), 1);
        assert!(out.contains_key(header::COOKIE));
    }
}
