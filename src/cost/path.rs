//! Host and path normalisation shared by the cost estimators.

use std::borrow::Cow;

use axum::http::{header, Request};
use percent_encoding::percent_decode_str;

/// The percent-decoded path of a request.
///
/// Escapes that do not decode to UTF-8 are replaced rather than rejected.
pub fn request_path<B>(req: &Request<B>) -> Cow<'_, str> {
    percent_decode_str(req.uri().path()).decode_utf8_lossy()
}

/// Lexically clean a slash-separated path.
///
/// Repeated separators are collapsed, `.` segments removed and `..` segments
/// resolved against the preceding segment. A rooted path never climbs above
/// `/`. The empty path cleans to `.`.
pub fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }

    let rooted = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else if !rooted {
                    segments.push("..");
                }
            }
            _ => segments.push(segment),
        }
    }

    let joined = segments.join("/");
    if rooted {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Remove a trailing `:port` from a host.
///
/// A bracketed IPv6 literal keeps its brackets; only a port following the
/// closing `]` is removed.
pub fn strip_port(hostport: &str) -> &str {
    let Some(n) = hostport.rfind(':') else {
        return hostport;
    };
    if hostport.starts_with('[') && !hostport[..n].ends_with(']') {
        return hostport;
    }
    &hostport[..n]
}

/// The host a request is addressed to, without port, lowercased.
///
/// An absolute-form target (or HTTP/2 `:authority`) wins over the `Host`
/// header.
pub fn request_host<B>(req: &Request<B>) -> Option<String> {
    if let Some(authority) = req.uri().authority() {
        return Some(authority.host().to_ascii_lowercase());
    }
    req.headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(|h| strip_port(h).to_ascii_lowercase())
}
