//! Request inspection helpers.
//!
//! The core reads three things off an exchange: the Host header, the
//! request path (with matrix parameters stripped for route matching), and
//! the session id from a cookie or matrix path parameter.

use http::header::{COOKIE, HOST};
use http::HeaderMap;
use std::borrow::Cow;

/// The Host header value, if present and non-empty.
pub fn request_host(headers: &HeaderMap) -> Option<&str> {
    let host = headers.get(HOST)?.to_str().ok()?;
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// Value of the named cookie, across all `Cookie` headers.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

/// Value of a matrix path parameter (`/path;name=value`).
///
/// Parameters may sit on any path segment; the value runs to the next `;`
/// or `/`.
pub fn path_parameter<'a>(path: &'a str, name: &str) -> Option<&'a str> {
    let mut rest = path;
    while let Some(semi) = rest.find(';') {
        rest = &rest[semi + 1..];
        let end = rest
            .find(|c| c == ';' || c == '/')
            .unwrap_or(rest.len());
        let param = &rest[..end];
        if let Some((key, value)) = param.split_once('=') {
            if key == name {
                return Some(value);
            }
        }
        rest = &rest[end..];
    }
    None
}

/// The path with matrix parameters removed, for route matching.
pub fn strip_path_parameters(path: &str) -> Cow<'_, str> {
    if !path.contains(';') {
        return Cow::Borrowed(path);
    }
    let mut stripped = String::with_capacity(path.len());
    for (i, segment) in path.split('/').enumerate() {
        if i > 0 {
            stripped.push('/');
        }
        if let Some(params) = segment.find(';') {
            stripped.push_str(&segment[..params]);
        } else {
            stripped.push_str(segment);
        }
    }
    Cow::Owned(stripped)
}
