use axum::{
    extract::{Json, State},
    response::IntoResponse,
};
use cookie::Cookie;
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    handlers::common::{created, ok, set_cookie},
    services::users::{Address, LoginInput, RegisterInput, UserProfile},
    ApiResponse, ApiResult, AppState,
};

/// Body returned after register/login. The same token is also set as the
/// session cookie; API clients may send it back as a Bearer token instead.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub user: UserProfile,
    pub token: String,
    pub token_type: String,
    pub expires_in: i64,
}

fn start_session(
    state: &AppState,
    user: crate::entities::user::Model,
) -> Result<(Cookie<'static>, SessionResponse), ServiceError> {
    let issued = state.auth.generate_token(&user)?;
    let cookie = state.auth.session_cookie().issue(&issued.token);
    Ok((
        cookie,
        SessionResponse {
            user: user.into(),
            token: issued.token,
            token_type: issued.token_type,
            expires_in: issued.expires_in,
        },
    ))
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    summary = "Register",
    request_body = RegisterInput,
    responses(
        (status = 201, description = "Account created; session cookie set", body = ApiResponse<SessionResponse>,
            headers(("Set-Cookie" = String, description = "HTTP-only session cookie"))
        ),
        (status = 400, description = "Invalid registration data", body = crate::errors::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::errors::ErrorResponse),
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let user = state.services.users.register(payload).await?;
    let (cookie, body) = start_session(&state, user)?;
    Ok((set_cookie(&cookie)?, created(body)))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    summary = "Log in",
    request_body = LoginInput,
    responses(
        (status = 200, description = "Logged in; session cookie set", body = ApiResponse<SessionResponse>,
            headers(("Set-Cookie" = String, description = "HTTP-only session cookie"))
        ),
        (status = 401, description = "Invalid email or password", body = crate::errors::ErrorResponse),
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let user = state.services.users.login(payload).await?;
    let (cookie, body) = start_session(&state, user)?;
    info!(user_id = %body.user.id, "user logged in");
    Ok((set_cookie(&cookie)?, ok(body)))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    summary = "Log out",
    responses(
        (status = 200, description = "Session revoked and cookie cleared"),
        (status = 401, description = "Not authenticated", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []), ("SessionCookie" = [])),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    state.auth.revoke(&user.token_id, user.expires_at).await;
    let cookie = state.auth.session_cookie().clear();
    info!(user_id = %user.user_id, "user logged out");
    Ok((set_cookie(&cookie)?, ok("Logged out")))
}

#[utoipa::path(
    get,
    path = "/api/auth/check",
    summary = "Current user",
    responses(
        (status = 200, description = "The authenticated user", body = ApiResponse<UserProfile>),
        (status = 401, description = "Not authenticated", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []), ("SessionCookie" = [])),
    tag = "auth"
)]
pub async fn check(State(state): State<AppState>, user: AuthUser) -> ApiResult<UserProfile> {
    let found = state.services.users.get_user(user.user_id).await?;
    Ok(ok(found.into()))
}

#[utoipa::path(
    put,
    path = "/api/auth/address",
    summary = "Save shipping address",
    request_body = Address,
    responses(
        (status = 200, description = "Address saved", body = ApiResponse<UserProfile>),
        (status = 400, description = "Invalid address", body = crate::errors::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []), ("SessionCookie" = [])),
    tag = "auth"
)]
pub async fn update_address(
    State(state): State<AppState>,
    user: AuthUser,
    Json(address): Json<Address>,
) -> ApiResult<UserProfile> {
    let updated = state
        .services
        .users
        .update_address(user.user_id, address)
        .await?;
    Ok(ok(updated.into()))
}
