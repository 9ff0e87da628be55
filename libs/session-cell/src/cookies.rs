// libs/session-cell/src/cookies.rs
use std::time::Duration;

use axum::http::{header::SET_COOKIE, HeaderMap, HeaderValue};
use chrono::{DateTime, Utc};
use headers::{Cookie, HeaderMapExt};

use shared_models::auth::UserRole;
use shared_models::error::AppError;

use crate::models::{LAST_ACTIVITY_COOKIE, LOGGED_IN_COOKIE, SESSION_COOKIE, USER_ROLE_COOKIE};

/// `Set-Cookie` value with the attributes every session marker shares.
pub fn set_cookie(name: &str, value: &str, max_age: Duration, http_only: bool, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; SameSite=Lax; Max-Age={}",
        name,
        urlencoding::encode(value),
        max_age.as_secs()
    );
    if http_only {
        cookie.push_str("; HttpOnly");
    }
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Cookies issued when a session is established.
pub fn session_cookies(role: UserRole, now: DateTime<Utc>, max_age: Duration, secure: bool) -> Vec<String> {
    vec![
        set_cookie(SESSION_COOKIE, "1", max_age, true, secure),
        set_cookie(USER_ROLE_COOKIE, role.as_str(), max_age, false, secure),
        set_cookie(LAST_ACTIVITY_COOKIE, &now.timestamp_millis().to_string(), max_age, false, secure),
        set_cookie(LOGGED_IN_COOKIE, "1", max_age, false, secure),
    ]
}

/// Sliding renewal of the server-side session.
pub fn sliding_cookies(now: DateTime<Utc>, max_age: Duration, secure: bool) -> Vec<String> {
    vec![
        set_cookie(SESSION_COOKIE, "1", max_age, true, secure),
        set_cookie(LAST_ACTIVITY_COOKIE, &now.timestamp_millis().to_string(), max_age, false, secure),
    ]
}

pub fn expired_cookies(secure: bool) -> Vec<String> {
    vec![
        set_cookie(SESSION_COOKIE, "", Duration::ZERO, true, secure),
        set_cookie(USER_ROLE_COOKIE, "", Duration::ZERO, false, secure),
        set_cookie(LAST_ACTIVITY_COOKIE, "", Duration::ZERO, false, secure),
        set_cookie(LOGGED_IN_COOKIE, "", Duration::ZERO, false, secure),
    ]
}

pub fn append_set_cookies(headers: &mut HeaderMap, cookies: Vec<String>) -> Result<(), AppError> {
    for cookie in cookies {
        let value = HeaderValue::from_str(&cookie)
            .map_err(|e| AppError::Internal(format!("Invalid cookie header: {}", e)))?;
        headers.append(SET_COOKIE, value);
    }
    Ok(())
}

pub fn has_active_session(headers: &HeaderMap) -> bool {
    headers
        .typed_get::<Cookie>()
        .and_then(|cookie| cookie.get(SESSION_COOKIE).map(|value| value == "1"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_is_http_only_and_secure_in_production() {
        let cookies = session_cookies(UserRole::Doctor, Utc::now(), Duration::from_secs(1800), true);

        assert_eq!(cookies.len(), 4);
        assert_eq!(cookies[0], "session=1; Path=/; SameSite=Lax; Max-Age=1800; HttpOnly; Secure");
        assert!(cookies[1].starts_with("userRole=doctor;"));
        assert!(!cookies[1].contains("HttpOnly"));
        assert!(cookies.iter().all(|cookie| cookie.ends_with("; Secure")));
    }

    #[test]
    fn expired_cookies_have_zero_max_age() {
        let cookies = expired_cookies(false);
        assert!(cookies.iter().all(|cookie| cookie.contains("Max-Age=0")));
        assert!(cookies.iter().all(|cookie| !cookie.contains("Secure")));
    }

    #[test]
    fn session_marker_is_detected_in_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("loggedIn=1; session=1"));
        assert!(has_active_session(&headers));

        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("loggedIn=1"));
        assert!(!has_active_session(&headers));
        assert!(!has_active_session(&HeaderMap::new()));
    }
}
