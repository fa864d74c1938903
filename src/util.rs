use std::sync::{Mutex, RwLock};

use http::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, LOCATION};
use http::{HeaderMap, StatusCode};

use crate::config::Method;
use crate::transport::Endpoint;

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub(crate) fn read_unpoisoned<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub(crate) fn write_unpoisoned<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub(crate) fn redact_uri_for_logs(uri_text: &str) -> String {
    let Ok(mut parsed) = url::Url::parse(uri_text) else {
        return uri_text.split('?').next().unwrap_or(uri_text).to_owned();
    };

    let _ = parsed.set_username("");
    let _ = parsed.set_password(None);
    parsed.set_query(None);
    parsed.set_fragment(None);
    parsed.to_string()
}

pub(crate) fn is_redirect_status(status: u16) -> bool {
    matches!(
        StatusCode::from_u16(status),
        Ok(StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT)
    )
}

pub(crate) fn redirect_method(method: Method, status: u16) -> Method {
    match status {
        303 => Method::Get,
        301 | 302 if method == Method::Post => Method::Get,
        _ => method,
    }
}

pub(crate) fn redirect_location(headers: &HeaderMap) -> Option<String> {
    headers
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(ToOwned::to_owned)
}

pub(crate) fn resolve_redirect_url(current_url: &str, location: &str) -> Option<String> {
    let base = url::Url::parse(current_url).ok()?;
    let joined = base.join(location).ok()?;
    Some(joined.to_string())
}

pub(crate) fn same_origin(left: &Endpoint, right: &Endpoint) -> bool {
    left.scheme == right.scheme && left.port == right.port && left.host.eq_ignore_ascii_case(&right.host)
}

pub(crate) fn sanitize_headers_for_redirect(
    headers: &mut HeaderMap,
    method_changed_to_get: bool,
    same_origin_redirect: bool,
) {
    if method_changed_to_get {
        headers.remove(CONTENT_LENGTH);
        headers.remove(CONTENT_TYPE);
    }
    if !same_origin_redirect {
        headers.remove(AUTHORIZATION);
        headers.remove(COOKIE);
    }
}
