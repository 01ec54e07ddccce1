use axum::{
    http::{header, HeaderName, HeaderValue, StatusCode},
    Json,
};
use cookie::Cookie;
use serde::Serialize;

use crate::{errors::ServiceError, ApiResponse};

/// Standard success body
pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse::success(data))
}

/// 201 with the standard body
pub fn created<T: Serialize>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, ok(data))
}

/// `Set-Cookie` header pair for a session cookie.
pub fn set_cookie(cookie: &Cookie<'_>) -> Result<[(HeaderName, HeaderValue); 1], ServiceError> {
    let value = HeaderValue::from_str(&cookie.to_string())
        .map_err(|_| ServiceError::InternalError("invalid session cookie".to_string()))?;
    Ok([(header::SET_COOKIE, value)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_cookie_renders_the_session_cookie() {
        let cookie = Cookie::build(("storefront_session", "abc")).http_only(true).build();
        let [(name, value)] = set_cookie(&cookie).unwrap();
        assert_eq!(name, header::SET_COOKIE);
        assert_eq!(value, "storefront_session=abc; HttpOnly");
    }

    #[test]
    fn set_cookie_rejects_control_characters() {
        let cookie = Cookie::new("storefront_session", "bad\nvalue");
        assert!(set_cookie(&cookie).is_err());
    }
}
