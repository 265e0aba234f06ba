use axum::http::{header, HeaderMap};
use time::Duration;

pub const SESSION_COOKIE_NAME: &str = "jwt";
const LOGGED_OUT_VALUE: &str = "loggedout";

/// Reads one cookie value out of the `Cookie` request headers.
pub fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn build(value: &str, max_age: Duration, secure: bool) -> String {
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={value}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        max_age.whole_seconds()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn session_cookie(token: &str, max_age: Duration, secure: bool) -> String {
    build(token, max_age, secure)
}

/// Overwrites the session cookie with a dummy value that lapses in 10s.
pub fn logout_cookie(secure: bool) -> String {
    build(LOGGED_OUT_VALUE, Duration::seconds(10), secure)
}
