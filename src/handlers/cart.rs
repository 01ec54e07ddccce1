use axum::extract::{Json, State};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthUser,
    handlers::common::ok,
    services::cart::CartView,
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 1000))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RemoveFromCartRequest {
    pub product_id: Uuid,
}

/// Sets a line to `quantity`; zero or less removes it.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateCartRequest {
    pub product_id: Uuid,
    #[validate(range(max = 1000))]
    pub quantity: i32,
}

#[utoipa::path(
    get,
    path = "/api/cart",
    summary = "Get cart",
    responses(
        (status = 200, description = "Cart with price preview", body = ApiResponse<CartView>),
        (status = 401, description = "Not authenticated", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []), ("SessionCookie" = [])),
    tag = "cart"
)]
pub async fn get_cart(State(state): State<AppState>, user: AuthUser) -> ApiResult<CartView> {
    Ok(ok(state.services.cart.get_cart(user.user_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/cart/add",
    summary = "Add to cart",
    request_body = AddToCartRequest,
    responses(
        (status = 200, description = "Updated cart", body = ApiResponse<CartView>),
        (status = 400, description = "Invalid quantity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []), ("SessionCookie" = [])),
    tag = "cart"
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<AddToCartRequest>,
) -> ApiResult<CartView> {
    payload.validate()?;
    let cart = state
        .services
        .cart
        .add_item(user.user_id, payload.product_id, payload.quantity)
        .await?;
    Ok(ok(cart))
}

#[utoipa::path(
    post,
    path = "/api/cart/remove",
    summary = "Remove from cart",
    request_body = RemoveFromCartRequest,
    responses(
        (status = 200, description = "Updated cart", body = ApiResponse<CartView>),
        (status = 404, description = "Product not in cart", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []), ("SessionCookie" = [])),
    tag = "cart"
)]
pub async fn remove_from_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<RemoveFromCartRequest>,
) -> ApiResult<CartView> {
    let cart = state
        .services
        .cart
        .remove_item(user.user_id, payload.product_id)
        .await?;
    Ok(ok(cart))
}

#[utoipa::path(
    put,
    path = "/api/cart/update",
    summary = "Set line quantity",
    request_body = UpdateCartRequest,
    responses(
        (status = 200, description = "Updated cart", body = ApiResponse<CartView>),
        (status = 400, description = "Quantity above the line limit", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not in cart", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []), ("SessionCookie" = [])),
    tag = "cart"
)]
pub async fn update_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<UpdateCartRequest>,
) -> ApiResult<CartView> {
    payload.validate()?;
    let cart = state
        .services
        .cart
        .update_quantity(user.user_id, payload.product_id, payload.quantity)
        .await?;
    Ok(ok(cart))
}

#[utoipa::path(
    post,
    path = "/api/cart/clear",
    summary = "Clear cart",
    responses((status = 200, description = "Empty cart", body = ApiResponse<CartView>)),
    security(("Bearer" = []), ("SessionCookie" = [])),
    tag = "cart"
)]
pub async fn clear_cart(State(state): State<AppState>, user: AuthUser) -> ApiResult<CartView> {
    Ok(ok(state.services.cart.clear_cart(user.user_id).await?))
}
