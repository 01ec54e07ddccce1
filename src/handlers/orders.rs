use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::OrderStatus,
    errors::ServiceError,
    handlers::common::{created, ok},
    services::orders::{CreateOrderInput, OrderView},
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    /// One of pending, processing, shipped, delivered, canceled (or cancelled)
    pub status: String,
}

#[utoipa::path(
    post,
    path = "/api/orders",
    summary = "Create order",
    description = "Creates an order from an explicit item list. Prices are computed server-side.",
    request_body = CreateOrderInput,
    responses(
        (status = 201, description = "Order created", body = ApiResponse<OrderView>),
        (status = 400, description = "Invalid order data", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []), ("SessionCookie" = [])),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateOrderInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .create_order(user.user_id, payload)
        .await?;
    Ok(created(order))
}

#[utoipa::path(
    get,
    path = "/api/orders/myorders",
    summary = "My orders",
    responses(
        (status = 200, description = "Own orders, newest first", body = ApiResponse<Vec<OrderView>>),
        (status = 401, description = "Not authenticated", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []), ("SessionCookie" = [])),
    tag = "orders"
)]
pub async fn my_orders(State(state): State<AppState>, user: AuthUser) -> ApiResult<Vec<OrderView>> {
    Ok(ok(state.services.orders.list_my_orders(user.user_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    summary = "Get order",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order detail", body = ApiResponse<OrderView>),
        (status = 403, description = "Not the owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []), ("SessionCookie" = [])),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderView> {
    let order = state
        .services
        .orders
        .get_order(id, user.user_id, user.is_admin())
        .await?;
    Ok(ok(order))
}

#[utoipa::path(
    post,
    path = "/api/orders/{id}/cancel",
    summary = "Cancel own order",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order canceled and stock restored", body = ApiResponse<OrderView>),
        (status = 400, description = "Order can no longer be canceled", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not the owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []), ("SessionCookie" = [])),
    tag = "orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderView> {
    Ok(ok(state.services.orders.cancel_order(id, user.user_id).await?))
}

#[utoipa::path(
    put,
    path = "/api/orders/{id}/status",
    summary = "Set order status",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<OrderView>),
        (status = 400, description = "Unknown status or illegal transition", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admin only", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []), ("SessionCookie" = [])),
    tag = "orders"
)]
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> ApiResult<OrderView> {
    let status: OrderStatus = payload.status.trim().parse().map_err(|_| {
        ServiceError::InvalidStatus(format!("unknown order status '{}'", payload.status))
    })?;
    Ok(ok(state.services.orders.set_status(id, status).await?))
}
