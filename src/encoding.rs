//! Stateless encoding helpers used for query strings and credentials.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Everything except the RFC 3986 unreserved characters.
const URL_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encodes a single URL component.
pub fn url_encode(input: &str) -> String {
    utf8_percent_encode(input, URL_COMPONENT).to_string()
}

/// Standard (padded) base64.
pub fn base64_encode(input: impl AsRef<[u8]>) -> String {
    STANDARD.encode(input)
}
