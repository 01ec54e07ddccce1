#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{header, Method, Request},
    response::Response,
    Router,
};
use rust_decimal::Decimal;
use sea_orm::EntityTrait;
use serde_json::{json, Value};
use storefront_api::{
    build_router,
    config::AppConfig,
    db::{self, DbConfig},
    entities::product,
    events,
    services::{catalog::CreateProductInput, users::RegisterInput},
    AppState,
};
use tower::ServiceExt;
use uuid::Uuid;

pub const PASSWORD: &str = "correct-horse-battery";
const SECRET: &str = "k7Qw9zR2mX4vB8nT1pL6sD3fH5jG0cYeUaIoWqErTyUiOpAsDfGhJkLzXcVbNm";

/// A signed-in test user
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: Uuid,
    pub token: String,
    /// `name=value` pair ready for a `Cookie` header
    pub cookie: String,
}

/// Helper harness for spinning up the full router backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Same as [`TestApp::new`] with a hook to tweak the config first.
    pub async fn with_config(tweak: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            SECRET.to_string(),
            3600,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        tweak(&mut cfg);

        let pool = db::establish_connection_with_config(&DbConfig::in_memory_sqlite())
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_sender, event_rx) = events::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::new(Arc::new(pool), cfg, event_sender);
        let router = build_router(state.clone()).expect("router builds");

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut headers = Vec::new();
        let bearer;
        if let Some(tok) = token {
            bearer = format!("Bearer {}", tok);
            headers.push(("authorization", bearer.as_str()));
        }
        self.request_with_headers(method, uri, body, &headers).await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Registers through the API and returns the new session.
    pub async fn register(&self, name: &str, email: &str) -> Session {
        let response = self
            .request(
                Method::POST,
                "/api/auth/register",
                Some(json!({ "name": name, "email": email, "password": PASSWORD })),
                None,
            )
            .await;
        assert_eq!(response.status(), 201, "registration should succeed");
        session_from(response).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Response {
        self.request(
            Method::POST,
            "/api/auth/login",
            Some(json!({ "email": email, "password": password })),
            None,
        )
        .await
    }

    /// Creates an admin directly through the services and signs in.
    pub async fn admin(&self) -> Session {
        let email = format!("admin-{}@example.com", Uuid::new_v4().simple());
        let user = self
            .state
            .services
            .users
            .register(RegisterInput {
                name: "Admin".to_string(),
                email: email.clone(),
                password: PASSWORD.to_string(),
            })
            .await
            .expect("register admin");
        self.state
            .services
            .users
            .promote_to_admin(user.id)
            .await
            .expect("promote admin");

        let response = self.login(&email, PASSWORD).await;
        assert_eq!(response.status(), 200, "admin login should succeed");
        session_from(response).await
    }

    /// Registers a customer with a unique email.
    pub async fn customer(&self) -> Session {
        let email = format!("shopper-{}@example.com", Uuid::new_v4().simple());
        self.register("Shopper", &email).await
    }

    pub async fn seed_product(&self, title: &str, price: Decimal, stocks_left: i32) -> product::Model {
        self.state
            .services
            .catalog
            .create_product(CreateProductInput {
                title: title.to_string(),
                description: format!("{} seeded for integration tests", title),
                category: "test".to_string(),
                original_price: price,
                discounted_price: Some(price),
                image_url: None,
                stocks_left,
            })
            .await
            .expect("seed product for tests")
    }

    pub async fn stock_of(&self, product_id: Uuid) -> i32 {
        product::Entity::find_by_id(product_id)
            .one(&*self.state.db)
            .await
            .expect("load product")
            .expect("product exists")
            .stocks_left
    }

    pub async fn add_to_cart(&self, session: &Session, product_id: Uuid, quantity: i32) -> Response {
        self.request(
            Method::POST,
            "/api/cart/add",
            Some(json!({ "product_id": product_id, "quantity": quantity })),
            Some(&session.token),
        )
        .await
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Reads the session token from the body and the cookie from `Set-Cookie`.
pub async fn session_from(response: Response) -> Session {
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .expect("session cookie set")
        .to_string();
    let body = response_json(response).await;
    let data = &body["data"];
    Session {
        user_id: data["user"]["id"]
            .as_str()
            .and_then(|id| Uuid::parse_str(id).ok())
            .expect("user id in session response"),
        token: data["token"].as_str().expect("token in body").to_string(),
        cookie,
    }
}

pub fn sample_address() -> Value {
    json!({
        "street": "1 Market St",
        "city": "Springfield",
        "state": "IL",
        "postal_code": "62701",
        "country": "US"
    })
}
