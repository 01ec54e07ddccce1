pub mod admin;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod common;
pub mod orders;
pub mod products;

use std::sync::Arc;

use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    CartService, CatalogService, CheckoutService, OrderService, PageLimits, PricingPolicy,
    UserService,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub users: Arc<UserService>,
    pub catalog: Arc<CatalogService>,
    pub cart: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        pricing: PricingPolicy,
        page_limits: PageLimits,
    ) -> Self {
        Self {
            users: Arc::new(UserService::new(db_pool.clone(), event_sender.clone())),
            catalog: Arc::new(CatalogService::new(
                db_pool.clone(),
                event_sender.clone(),
                page_limits,
            )),
            cart: Arc::new(CartService::new(
                db_pool.clone(),
                event_sender.clone(),
                pricing.clone(),
            )),
            checkout: Arc::new(CheckoutService::new(
                db_pool.clone(),
                event_sender.clone(),
                pricing.clone(),
            )),
            orders: Arc::new(OrderService::new(
                db_pool,
                event_sender,
                pricing,
                page_limits,
            )),
        }
    }
}
