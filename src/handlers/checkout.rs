use axum::extract::{Json, State};
use axum::response::IntoResponse;

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    handlers::common::{created, ok},
    services::{
        checkout::{CheckoutSummary, PlaceOrderInput},
        orders::OrderView,
    },
    ApiResponse, ApiResult, AppState,
};

#[utoipa::path(
    get,
    path = "/api/checkout/summary",
    summary = "Checkout summary",
    responses(
        (status = 200, description = "Price preview of the current cart", body = ApiResponse<CheckoutSummary>),
        (status = 401, description = "Not authenticated", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []), ("SessionCookie" = [])),
    tag = "checkout"
)]
pub async fn summary(State(state): State<AppState>, user: AuthUser) -> ApiResult<CheckoutSummary> {
    Ok(ok(state
        .services
        .checkout
        .checkout_summary(user.user_id)
        .await?))
}

#[utoipa::path(
    post,
    path = "/api/checkout/place",
    summary = "Place order from cart",
    request_body = PlaceOrderInput,
    responses(
        (status = 201, description = "Order created from the cart", body = ApiResponse<OrderView>),
        (status = 400, description = "Empty cart or missing address", body = crate::errors::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []), ("SessionCookie" = [])),
    tag = "checkout"
)]
pub async fn place_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<PlaceOrderInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .checkout
        .place_order(user.user_id, payload)
        .await?;
    Ok(created(order))
}
