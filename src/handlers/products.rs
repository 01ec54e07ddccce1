use axum::extract::{Json, Path, Query, State};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthUser,
    handlers::common::ok,
    services::catalog::{ProductPage, ProductQuery, ProductView},
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RatingRequest {
    #[validate(range(min = 1, max = 5))]
    pub rating: i32,
}

#[utoipa::path(
    get,
    path = "/api/products",
    summary = "List products",
    params(ProductQuery),
    responses(
        (status = 200, description = "A page of products", body = ApiResponse<ProductPage>),
    ),
    tag = "products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> ApiResult<ProductPage> {
    Ok(ok(state.services.catalog.list_products(query).await?))
}

#[utoipa::path(
    get,
    path = "/api/products/categories",
    summary = "List categories",
    responses((status = 200, description = "Distinct product categories", body = ApiResponse<Vec<String>>)),
    tag = "products"
)]
pub async fn list_categories(State(state): State<AppState>) -> ApiResult<Vec<String>> {
    Ok(ok(state.services.catalog.list_categories().await?))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}",
    summary = "Get product",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product detail", body = ApiResponse<ProductView>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    tag = "products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ProductView> {
    let product = state.services.catalog.get_product(id).await?;
    Ok(ok(product.into()))
}

#[utoipa::path(
    post,
    path = "/api/products/{id}/rating",
    summary = "Rate product",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = RatingRequest,
    responses(
        (status = 200, description = "Updated product rating", body = ApiResponse<ProductView>),
        (status = 400, description = "Rating out of range", body = crate::errors::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []), ("SessionCookie" = [])),
    tag = "products"
)]
pub async fn rate_product(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<RatingRequest>,
) -> ApiResult<ProductView> {
    payload.validate()?;
    let product = state
        .services
        .catalog
        .rate_product(id, payload.rating)
        .await?;
    Ok(ok(product.into()))
}
