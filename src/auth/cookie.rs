//! Session cookie helpers. The session token lives in an HTTP-only cookie so
//! browser scripts never see it.

use ::cookie::{time::Duration, Cookie, SameSite};
use axum::http::{header, HeaderMap};

/// Settings for the session cookie
#[derive(Debug, Clone)]
pub struct SessionCookie {
    pub name: String,
    pub secure: bool,
    pub max_age_secs: u64,
}

impl SessionCookie {
    pub fn new(name: impl Into<String>, secure: bool, max_age_secs: u64) -> Self {
        Self {
            name: name.into(),
            secure,
            max_age_secs,
        }
    }

    /// Session cookie carrying `token`.
    pub fn issue(&self, token: &str) -> Cookie<'static> {
        self.build(token.to_owned(), self.max_age_secs)
    }

    /// Removal cookie that expires the session immediately.
    pub fn clear(&self) -> Cookie<'static> {
        self.build(String::new(), 0)
    }

    fn build(&self, value: String, max_age_secs: u64) -> Cookie<'static> {
        let max_age = i64::try_from(max_age_secs).unwrap_or(i64::MAX);
        Cookie::build((self.name.clone(), value))
            .http_only(true)
            .same_site(SameSite::Strict)
            .path("/")
            .secure(self.secure)
            .max_age(Duration::seconds(max_age))
            .build()
    }

    /// Reads this cookie's value from the request `Cookie` headers.
    pub fn read(&self, headers: &HeaderMap) -> Option<String> {
        read_cookie(headers, &self.name)
    }
}

/// Finds a non-empty cookie named `name` across all `Cookie` headers.
/// Surrounding double quotes are stripped from the value.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name && !cookie.value_trimmed().is_empty())
        .map(|cookie| cookie.value_trimmed().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn issued_cookie_has_security_attributes() {
        let cookie = SessionCookie::new("storefront_session", true, 3600).issue("abc.def.ghi");
        assert_eq!(cookie.name(), "storefront_session");
        assert_eq!(cookie.value(), "abc.def.ghi");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.max_age(), Some(Duration::seconds(3600)));

        let rendered = cookie.to_string();
        assert!(rendered.starts_with("storefront_session=abc.def.ghi;"));
        assert!(rendered.contains("HttpOnly"));
        assert!(rendered.contains("SameSite=Strict"));
        assert!(rendered.contains("Max-Age=3600"));
        assert!(rendered.contains("Secure"));
    }

    #[test]
    fn cleared_cookie_expires_immediately() {
        let rendered = SessionCookie::new("storefront_session", false, 3600)
            .clear()
            .to_string();
        assert!(rendered.starts_with("storefront_session=;"));
        assert!(rendered.contains("Max-Age=0"));
        assert!(!rendered.contains("Secure"));
    }

    #[test]
    fn reads_named_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("theme=dark"));
        headers.append(
            header::COOKIE,
            HeaderValue::from_static("lang=en; storefront_session=tok123; x=y"),
        );
        assert_eq!(read_cookie(&headers, "storefront_session").as_deref(), Some("tok123"));
        assert_eq!(read_cookie(&headers, "theme").as_deref(), Some("dark"));
        assert_eq!(read_cookie(&headers, "missing"), None);
    }

    #[test]
    fn quoted_cookie_value_is_unquoted() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("storefront_session=\"abc.def.ghi\"; theme=dark"),
        );
        assert_eq!(
            read_cookie(&headers, "storefront_session").as_deref(),
            Some("abc.def.ghi")
        );
    }

    #[test]
    fn empty_cookie_value_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("storefront_session="));
        assert_eq!(read_cookie(&headers, "storefront_session"), None);
    }
}
