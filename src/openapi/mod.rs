use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "0.1.0",
        description = r#"
# Storefront API

Backend for a small online shop: product catalog, per-user carts that hold
stock, checkout, order tracking and an admin surface.

## Authentication

Login and registration set an HTTP-only session cookie and also return the
token in the body. Either send the cookie or an Authorization header:

```
Authorization: Bearer <token>
```

## Stock

Adding an item to the cart takes the units out of stock immediately.
Removing it, lowering its quantity, clearing the cart or canceling an order
puts them back. Checkout does not take stock a second time.

## Error Handling

Failures share one body:

```json
{
  "error": "Unprocessable Entity",
  "message": "Insufficient stock: only 2 left of 'Desk Lamp'",
  "request_id": "5a1c7e0e-3c8e-4d0b-9a52-6c0f6d7f2b11",
  "timestamp": "2026-03-09T10:30:00Z"
}
```

## Pagination

List endpoints take `page` (1-based) and `limit` (default 20, max 100).
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "auth", description = "Registration, login and session"),
        (name = "products", description = "Public catalog"),
        (name = "cart", description = "Cart with stock holds"),
        (name = "checkout", description = "Turning the cart into an order"),
        (name = "orders", description = "Order tracking and status"),
        (name = "admin", description = "Catalog and order administration")
    ),
    paths(
        // Auth
        crate::handlers::auth::register,
        crate::handlers::auth::login,
        crate::handlers::auth::logout,
        crate::handlers::auth::check,
        crate::handlers::auth::update_address,

        // Catalog
        crate::handlers::products::list_products,
        crate::handlers::products::list_categories,
        crate::handlers::products::get_product,
        crate::handlers::products::rate_product,

        // Cart
        crate::handlers::cart::get_cart,
        crate::handlers::cart::add_to_cart,
        crate::handlers::cart::remove_from_cart,
        crate::handlers::cart::update_cart,
        crate::handlers::cart::clear_cart,

        // Checkout
        crate::handlers::checkout::summary,
        crate::handlers::checkout::place_order,

        // Orders
        crate::handlers::orders::create_order,
        crate::handlers::orders::my_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::cancel_order,
        crate::handlers::orders::update_status,

        // Admin
        crate::handlers::admin::list_orders,
        crate::handlers::admin::list_products,
        crate::handlers::admin::create_product,
        crate::handlers::admin::update_product,
        crate::handlers::admin::delete_product,
    ),
    components(
        schemas(
            crate::ResponseMeta,
            crate::entities::OrderStatus,
            crate::entities::UserRole,

            // Users
            crate::services::users::Address,
            crate::services::users::RegisterInput,
            crate::services::users::LoginInput,
            crate::services::users::UserProfile,
            crate::handlers::auth::SessionResponse,

            // Catalog
            crate::services::catalog::ProductSort,
            crate::services::catalog::ProductView,
            crate::services::catalog::ProductPage,
            crate::services::catalog::CreateProductInput,
            crate::services::catalog::UpdateProductInput,
            crate::handlers::products::RatingRequest,

            // Cart & checkout
            crate::services::pricing::PriceBreakdown,
            crate::services::cart::CartLineView,
            crate::services::cart::CartView,
            crate::handlers::cart::AddToCartRequest,
            crate::handlers::cart::RemoveFromCartRequest,
            crate::handlers::cart::UpdateCartRequest,
            crate::services::checkout::PlaceOrderInput,
            crate::services::checkout::CheckoutSummary,

            // Orders
            crate::services::orders::OrderItemInput,
            crate::services::orders::CreateOrderInput,
            crate::services::orders::OrderItemView,
            crate::services::orders::OrderView,
            crate::services::orders::OrderPage,
            crate::handlers::orders::UpdateStatusRequest,

            // Error types
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecuritySchemes)
)]
pub struct ApiDoc;

struct SecuritySchemes;

impl Modify for SecuritySchemes {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "Bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
        components.add_security_scheme(
            "SessionCookie",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("storefront_session"))),
        );
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
