use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    handlers::common::{created, ok},
    services::{
        catalog::{CreateProductInput, ProductPage, ProductQuery, ProductView, UpdateProductInput},
        orders::{OrderListQuery, OrderPage},
    },
    ApiResponse, ApiResult, AppState,
};

#[utoipa::path(
    get,
    path = "/api/admin/orders",
    summary = "All orders",
    params(OrderListQuery),
    responses(
        (status = 200, description = "A page of orders, newest first", body = ApiResponse<OrderPage>),
        (status = 403, description = "Admin only", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []), ("SessionCookie" = [])),
    tag = "admin"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> ApiResult<OrderPage> {
    Ok(ok(state.services.orders.list_all_orders(query).await?))
}

#[utoipa::path(
    get,
    path = "/api/admin/products",
    summary = "All products",
    params(ProductQuery),
    responses(
        (status = 200, description = "A page of products, including sold out ones", body = ApiResponse<ProductPage>),
        (status = 403, description = "Admin only", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []), ("SessionCookie" = [])),
    tag = "admin"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> ApiResult<ProductPage> {
    Ok(ok(state.services.catalog.list_products(query).await?))
}

#[utoipa::path(
    post,
    path = "/api/admin/products",
    summary = "Create product",
    request_body = CreateProductInput,
    responses(
        (status = 201, description = "Product created", body = ApiResponse<ProductView>),
        (status = 400, description = "Invalid product data", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admin only", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []), ("SessionCookie" = [])),
    tag = "admin"
)]
pub async fn create_product(
    State(state): State<AppState>,
    admin: AuthUser,
    Json(payload): Json<CreateProductInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.catalog.create_product(payload).await?;
    info!(admin_id = %admin.user_id, product_id = %product.id, "admin created product");
    Ok(created(ProductView::from(product)))
}

#[utoipa::path(
    put,
    path = "/api/admin/products/{id}",
    summary = "Update product",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = UpdateProductInput,
    responses(
        (status = 200, description = "Product updated", body = ApiResponse<ProductView>),
        (status = 400, description = "Invalid product data", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []), ("SessionCookie" = [])),
    tag = "admin"
)]
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProductInput>,
) -> ApiResult<ProductView> {
    let product = state.services.catalog.update_product(id, payload).await?;
    Ok(ok(product.into()))
}

#[utoipa::path(
    delete,
    path = "/api/admin/products/{id}",
    summary = "Delete product",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product deleted"),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []), ("SessionCookie" = [])),
    tag = "admin"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    admin: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Uuid> {
    state.services.catalog.delete_product(id).await?;
    info!(admin_id = %admin.user_id, product_id = %id, "admin deleted product");
    Ok(ok(id))
}
