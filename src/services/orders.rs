use chrono::{DateTime, Utc};
use metrics::counter;
use rand::{distributions::Alphanumeric, Rng};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{order, order_item, product, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        order_status::{plan_transition, Transition},
        pricing::{round_money, PricingPolicy},
        stock,
        users::Address,
        PageLimits,
    },
};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct OrderItemInput {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 1000))]
    pub quantity: i32,
}

/// Direct order creation from an explicit item list
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateOrderInput {
    pub items: Vec<OrderItemInput>,
    #[validate]
    pub shipping_address: Address,
    #[validate(length(min = 1, max = 50))]
    #[schema(example = "Cash On Delivery")]
    pub payment_method: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderItemView {
    pub product_id: Uuid,
    pub title: String,
    #[schema(value_type = String)]
    pub price: Decimal,
    pub quantity: i32,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderView {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    #[schema(value_type = Object)]
    pub shipping_address: serde_json::Value,
    pub payment_method: String,
    pub items: Vec<OrderItemView>,
    #[schema(value_type = String)]
    pub items_price: Decimal,
    #[schema(value_type = String)]
    pub shipping_price: Decimal,
    #[schema(value_type = String)]
    pub tax_price: Decimal,
    #[schema(value_type = String)]
    pub total_price: Decimal,
    pub status: OrderStatus,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderView {
    pub fn new(order: order::Model, items: Vec<order_item::Model>) -> Self {
        Self {
            id: order.id,
            order_number: order.order_number,
            user_id: order.user_id,
            shipping_address: order.shipping_address,
            payment_method: order.payment_method,
            items: items
                .into_iter()
                .map(|item| OrderItemView {
                    product_id: item.product_id,
                    title: item.title,
                    price: round_money(item.price),
                    quantity: item.quantity,
                    image_url: item.image_url,
                })
                .collect(),
            items_price: round_money(order.items_price),
            shipping_price: round_money(order.shipping_price),
            tax_price: round_money(order.tax_price),
            total_price: round_money(order.total_price),
            status: order.status,
            is_paid: order.is_paid,
            paid_at: order.paid_at,
            delivered_at: order.delivered_at,
            canceled_at: order.canceled_at,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderListQuery {
    pub status: Option<OrderStatus>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderPage {
    pub items: Vec<OrderView>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

/// A product and quantity about to be frozen into an order
pub(crate) struct SnapshotLine {
    pub product: product::Model,
    pub quantity: i32,
}

/// `"Cash On Delivery"` in any casing, or `"cod"`.
pub fn is_cash_on_delivery(payment_method: &str) -> bool {
    let method = payment_method.trim();
    method.eq_ignore_ascii_case("cash on delivery") || method.eq_ignore_ascii_case("cod")
}

fn generate_order_number() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("ORD-{}", suffix.to_uppercase())
}

/// Folds repeated product ids into one line, keeping first-seen order.
fn merge_items(items: &[OrderItemInput]) -> Vec<(Uuid, i32)> {
    let mut merged: Vec<(Uuid, i32)> = Vec::with_capacity(items.len());
    for item in items {
        match merged.iter_mut().find(|(id, _)| *id == item.product_id) {
            Some((_, quantity)) => *quantity = quantity.saturating_add(item.quantity),
            None => merged.push((item.product_id, item.quantity)),
        }
    }
    merged
}

/// Writes an order and its item snapshots. Prices come from `pricing` only.
pub(crate) async fn persist_order<C>(
    conn: &C,
    pricing: &PricingPolicy,
    user_id: Uuid,
    lines: Vec<SnapshotLine>,
    shipping_address: &Address,
    payment_method: &str,
) -> Result<(order::Model, Vec<order_item::Model>), ServiceError>
where
    C: ConnectionTrait,
{
    let quote = pricing.quote(
        lines
            .iter()
            .map(|line| (line.product.discounted_price, line.quantity)),
    );

    let now = Utc::now();
    let cash_on_delivery = is_cash_on_delivery(payment_method);
    let (status, is_paid, paid_at) = if cash_on_delivery {
        (OrderStatus::Pending, false, None)
    } else {
        (OrderStatus::Processing, true, Some(now))
    };

    let order_id = Uuid::new_v4();
    let order = order::ActiveModel {
        id: Set(order_id),
        order_number: Set(generate_order_number()),
        user_id: Set(user_id),
        shipping_address: Set(serde_json::to_value(shipping_address)?),
        payment_method: Set(payment_method.trim().to_string()),
        items_price: Set(quote.items_price),
        shipping_price: Set(quote.shipping_price),
        tax_price: Set(quote.tax_price),
        total_price: Set(quote.total_price),
        status: Set(status),
        is_paid: Set(is_paid),
        paid_at: Set(paid_at),
        delivered_at: Set(None),
        canceled_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await?;

    let mut items = Vec::with_capacity(lines.len());
    for (position, line) in (0i32..).zip(lines) {
        let item = order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            position: Set(position),
            product_id: Set(line.product.id),
            title: Set(line.product.title),
            price: Set(round_money(line.product.discounted_price)),
            quantity: Set(line.quantity),
            image_url: Set(line.product.image_url),
        }
        .insert(conn)
        .await?;
        items.push(item);
    }

    let payment = if cash_on_delivery { "cod" } else { "prepaid" };
    counter!("storefront.orders.created", 1, "payment" => payment);
    Ok((order, items))
}

async fn items_for<C>(conn: &C, order_id: Uuid) -> Result<Vec<order_item::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    Ok(order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .order_by_asc(order_item::Column::Position)
        .all(conn)
        .await?)
}

/// Orders: direct creation, reads, and the status lifecycle
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    pricing: PricingPolicy,
    page_limits: PageLimits,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        pricing: PricingPolicy,
        page_limits: PageLimits,
    ) -> Self {
        Self {
            db,
            event_sender,
            pricing,
            page_limits,
        }
    }

    /// Creates an order straight from `input.items`, taking stock for each
    /// line. Either every line is taken and the order exists, or nothing is.
    #[instrument(skip(self, input))]
    pub async fn create_order(
        &self,
        user_id: Uuid,
        input: CreateOrderInput,
    ) -> Result<OrderView, ServiceError> {
        input.validate()?;
        if input.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "order must contain at least one item".to_string(),
            ));
        }
        for item in &input.items {
            item.validate()?;
        }

        let txn = self.db.begin().await?;
        let mut lines = Vec::new();
        for (product_id, quantity) in merge_items(&input.items) {
            stock::reserve(&txn, product_id, quantity).await?;
            let product = product::Entity::find_by_id(product_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", product_id))
                })?;
            lines.push(SnapshotLine { product, quantity });
        }

        let (order, items) = persist_order(
            &txn,
            &self.pricing,
            user_id,
            lines,
            &input.shipping_address,
            &input.payment_method,
        )
        .await?;
        txn.commit().await?;

        self.event_sender.send_or_log(Event::OrderCreated {
            order_id: order.id,
            user_id,
        });
        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total_price,
            "order created"
        );
        Ok(OrderView::new(order, items))
    }

    /// Fetches an order visible to the requester: its owner or an admin.
    #[instrument(skip(self))]
    pub async fn get_order(
        &self,
        order_id: Uuid,
        requester_id: Uuid,
        requester_is_admin: bool,
    ) -> Result<OrderView, ServiceError> {
        let order = self.find_order(&*self.db, order_id).await?;
        if order.user_id != requester_id && !requester_is_admin {
            return Err(ServiceError::Forbidden(
                "You do not have access to this order".to_string(),
            ));
        }
        let items = items_for(&*self.db, order.id).await?;
        Ok(OrderView::new(order, items))
    }

    /// The user's orders, newest first.
    #[instrument(skip(self))]
    pub async fn list_my_orders(&self, user_id: Uuid) -> Result<Vec<OrderView>, ServiceError> {
        let orders = order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .order_by_desc(order::Column::Id)
            .all(&*self.db)
            .await?;
        self.with_items(orders).await
    }

    #[instrument(skip(self))]
    pub async fn list_all_orders(&self, query: OrderListQuery) -> Result<OrderPage, ServiceError> {
        let (page, limit) = self.page_limits.resolve(query.page, query.limit);

        let mut select = order::Entity::find();
        if let Some(status) = query.status {
            select = select.filter(order::Column::Status.eq(status));
        }
        let paginator = select
            .order_by_desc(order::Column::CreatedAt)
            .order_by_desc(order::Column::Id)
            .paginate(&*self.db, limit);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;

        Ok(OrderPage {
            items: self.with_items(orders).await?,
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
        })
    }

    /// Admin status change, checked against the transition table.
    #[instrument(skip(self))]
    pub async fn set_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<OrderView, ServiceError> {
        self.change_status(order_id, new_status, None).await
    }

    /// Owner-initiated cancellation; same rules as the admin transition.
    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<OrderView, ServiceError> {
        self.change_status(order_id, OrderStatus::Canceled, Some(user_id))
            .await
    }

    async fn change_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        owner: Option<Uuid>,
    ) -> Result<OrderView, ServiceError> {
        let txn = self.db.begin().await?;
        let order = self.find_order(&txn, order_id).await?;
        if let Some(owner) = owner {
            if order.user_id != owner {
                return Err(ServiceError::Forbidden(
                    "You can only cancel your own orders".to_string(),
                ));
            }
        }

        let items = items_for(&txn, order.id).await?;
        let (from, to) = match plan_transition(order.status, new_status)? {
            Transition::Unchanged => {
                txn.commit().await?;
                return Ok(OrderView::new(order, items));
            }
            Transition::Apply { from, to } => (from, to),
        };

        let now = Utc::now();
        let mut active: order::ActiveModel = order.clone().into();
        active.status = Set(to);
        active.updated_at = Set(now);
        match to {
            OrderStatus::Delivered => {
                if order.delivered_at.is_none() {
                    active.delivered_at = Set(Some(now));
                }
                if !order.is_paid {
                    active.is_paid = Set(true);
                    active.paid_at = Set(Some(now));
                }
            }
            OrderStatus::Canceled => {
                if order.canceled_at.is_none() {
                    active.canceled_at = Set(Some(now));
                }
                for item in &items {
                    if !stock::release(&txn, item.product_id, item.quantity).await? {
                        warn!(
                            order_id = %order.id,
                            product_id = %item.product_id,
                            "canceled order references a deleted product; stock not restored"
                        );
                    }
                }
            }
            OrderStatus::Pending | OrderStatus::Processing | OrderStatus::Shipped => {}
        }

        let updated = active.update(&txn).await?;
        txn.commit().await?;

        counter!("storefront.orders.status_changed", 1, "to" => to.to_string());
        self.event_sender.send_or_log(Event::OrderStatusChanged {
            order_id,
            old_status: from,
            new_status: to,
        });
        info!(%order_id, %from, %to, "order status changed");
        Ok(OrderView::new(updated, items))
    }

    async fn find_order<C>(&self, conn: &C, order_id: Uuid) -> Result<order::Model, ServiceError>
    where
        C: ConnectionTrait,
    {
        order::Entity::find_by_id(order_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    async fn with_items(&self, orders: Vec<order::Model>) -> Result<Vec<OrderView>, ServiceError> {
        if orders.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let mut grouped: HashMap<Uuid, Vec<order_item::Model>> = HashMap::new();
        for item in order_item::Entity::find()
            .filter(order_item::Column::OrderId.is_in(ids))
            .order_by_asc(order_item::Column::Position)
            .all(&*self.db)
            .await?
        {
            grouped.entry(item.order_id).or_default().push(item);
        }

        Ok(orders
            .into_iter()
            .map(|order| {
                let items = grouped.remove(&order.id).unwrap_or_default();
                OrderView::new(order, items)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Cash On Delivery", true)]
    #[case("cash on delivery", true)]
    #[case("  COD ", true)]
    #[case("PayPal", false)]
    #[case("card", false)]
    fn recognizes_cash_on_delivery(#[case] method: &str, #[case] expected: bool) {
        assert_eq!(is_cash_on_delivery(method), expected);
    }

    #[test]
    fn order_numbers_have_expected_shape() {
        let number = generate_order_number();
        assert_eq!(number.len(), 12);
        assert!(number.starts_with("ORD-"));
        assert!(number[4..]
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn duplicate_items_are_merged() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let merged = merge_items(&[
            OrderItemInput { product_id: a, quantity: 1 },
            OrderItemInput { product_id: b, quantity: 2 },
            OrderItemInput { product_id: a, quantity: 3 },
        ]);
        assert_eq!(merged, vec![(a, 4), (b, 2)]);
    }
}
