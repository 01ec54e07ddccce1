use metrics::counter;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{cart_item, user},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        cart::{get_or_create_cart, load_lines},
        orders::{persist_order, OrderView, SnapshotLine},
        pricing::{PriceBreakdown, PricingPolicy},
        users::Address,
    },
};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct PlaceOrderInput {
    /// Falls back to the address saved on the profile
    pub shipping_address: Option<Address>,
    #[validate(length(min = 1, max = 50))]
    #[schema(example = "Cash On Delivery")]
    pub payment_method: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CheckoutSummary {
    pub item_count: i32,
    pub line_count: usize,
    pub summary: PriceBreakdown,
}

/// Turns a cart into an order. Cart lines already hold their stock, so the
/// snapshot moves no stock and the lines are dropped without restocking.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    pricing: PricingPolicy,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        pricing: PricingPolicy,
    ) -> Self {
        Self {
            db,
            event_sender,
            pricing,
        }
    }

    #[instrument(skip(self))]
    pub async fn checkout_summary(&self, user_id: Uuid) -> Result<CheckoutSummary, ServiceError> {
        let cart = get_or_create_cart(&*self.db, user_id).await?;
        let lines = load_lines(&*self.db, cart.id).await?;

        Ok(CheckoutSummary {
            item_count: lines.iter().map(|(line, _)| line.quantity).sum(),
            line_count: lines.len(),
            summary: self
                .pricing
                .quote(lines.iter().map(|(line, p)| (p.discounted_price, line.quantity))),
        })
    }

    #[instrument(skip(self, input))]
    pub async fn place_order(
        &self,
        user_id: Uuid,
        input: PlaceOrderInput,
    ) -> Result<OrderView, ServiceError> {
        input.validate()?;
        if let Some(address) = &input.shipping_address {
            address.validate()?;
        }

        let txn = self.db.begin().await?;
        let shipping_address = match input.shipping_address {
            Some(address) => address,
            None => user::Entity::find_by_id(user_id)
                .one(&txn)
                .await?
                .and_then(|u| u.address)
                .and_then(|value| serde_json::from_value::<Address>(value).ok())
                .ok_or_else(|| {
                    ServiceError::ValidationError(
                        "shipping_address is required when no address is saved".to_string(),
                    )
                })?,
        };

        let cart = get_or_create_cart(&txn, user_id).await?;
        let lines = load_lines(&txn, cart.id).await?;
        if lines.is_empty() {
            return Err(ServiceError::InvalidOperation("Cart is empty".to_string()));
        }

        let snapshot: Vec<SnapshotLine> = lines
            .into_iter()
            .map(|(line, product)| SnapshotLine {
                product,
                quantity: line.quantity,
            })
            .collect();

        let (order, items) = persist_order(
            &txn,
            &self.pricing,
            user_id,
            snapshot,
            &shipping_address,
            &input.payment_method,
        )
        .await?;

        cart_item::Entity::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        counter!("storefront.checkout.completed", 1);
        self.event_sender.send_or_log(Event::OrderCreated {
            order_id: order.id,
            user_id,
        });
        info!(order_id = %order.id, %user_id, lines = items.len(), "cart checked out");
        Ok(OrderView::new(order, items))
    }
}
