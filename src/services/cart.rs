use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{cart, cart_item, product},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        pricing::{round_money, PriceBreakdown, PricingPolicy},
        stock,
    },
};

/// One cart line joined with the current product data
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartLineView {
    pub product_id: Uuid,
    pub title: String,
    pub image_url: Option<String>,
    #[schema(value_type = String, example = "25.00")]
    pub price: Decimal,
    pub quantity: i32,
    #[schema(value_type = String, example = "75.00")]
    pub line_total: Decimal,
    pub stocks_left: i32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartView {
    pub cart_id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<CartLineView>,
    pub item_count: i32,
    pub summary: PriceBreakdown,
}

/// Returns the user's cart, creating it if it went missing.
pub(crate) async fn get_or_create_cart<C>(conn: &C, user_id: Uuid) -> Result<cart::Model, ServiceError>
where
    C: ConnectionTrait,
{
    if let Some(existing) = cart::Entity::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(conn)
        .await?
    {
        return Ok(existing);
    }

    let now = Utc::now();
    let created = cart::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await?;
    info!(%user_id, cart_id = %created.id, "cart created");
    Ok(created)
}

/// Cart lines with their products, oldest line first.
pub(crate) async fn load_lines<C>(
    conn: &C,
    cart_id: Uuid,
) -> Result<Vec<(cart_item::Model, product::Model)>, ServiceError>
where
    C: ConnectionTrait,
{
    let rows = cart_item::Entity::find()
        .filter(cart_item::Column::CartId.eq(cart_id))
        .order_by_asc(cart_item::Column::CreatedAt)
        .order_by_asc(cart_item::Column::Id)
        .find_also_related(product::Entity)
        .all(conn)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(line, product)| product.map(|p| (line, p)))
        .collect())
}

async fn find_line<C>(
    conn: &C,
    cart_id: Uuid,
    product_id: Uuid,
) -> Result<Option<cart_item::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    Ok(cart_item::Entity::find()
        .filter(cart_item::Column::CartId.eq(cart_id))
        .filter(cart_item::Column::ProductId.eq(product_id))
        .one(conn)
        .await?)
}

/// Largest quantity a single cart line may hold.
pub const MAX_LINE_QUANTITY: i32 = 1000;

fn line_too_large() -> ServiceError {
    ServiceError::ValidationError(format!(
        "a cart line holds at most {} units",
        MAX_LINE_QUANTITY
    ))
}

fn line_not_found(product_id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("Product {} is not in the cart", product_id))
}

/// Cart mutations. A line's quantity is always stock already taken from the
/// product, so every write here moves stock in the same transaction.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    pricing: PricingPolicy,
}

impl CartService {
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
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let cart = get_or_create_cart(&*self.db, user_id).await?;
        let lines = load_lines(&*self.db, cart.id).await?;

        let summary = self
            .pricing
            .quote(lines.iter().map(|(line, p)| (p.discounted_price, line.quantity)));
        let items: Vec<CartLineView> = lines
            .into_iter()
            .map(|(line, p)| CartLineView {
                product_id: p.id,
                title: p.title,
                image_url: p.image_url,
                price: round_money(p.discounted_price),
                quantity: line.quantity,
                line_total: round_money(p.discounted_price * Decimal::from(line.quantity)),
                stocks_left: p.stocks_left,
            })
            .collect();

        Ok(CartView {
            cart_id: cart.id,
            user_id,
            item_count: items.iter().map(|i| i.quantity).sum(),
            items,
            summary,
        })
    }

    /// Holds `quantity` more units of `product_id` in the user's cart.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "quantity must be at least 1".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let cart = get_or_create_cart(&txn, user_id).await?;
        let existing = find_line(&txn, cart.id, product_id).await?;
        let held = existing.as_ref().map_or(0, |line| line.quantity);
        let new_quantity = held
            .checked_add(quantity)
            .filter(|total| *total <= MAX_LINE_QUANTITY)
            .ok_or_else(line_too_large)?;
        stock::reserve(&txn, product_id, quantity).await?;

        let now = Utc::now();
        match existing {
            Some(line) => {
                let mut active: cart_item::ActiveModel = line.into();
                active.quantity = Set(new_quantity);
                active.updated_at = Set(now);
                active.update(&txn).await?;
            }
            None => {
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(product_id),
                    quantity: Set(new_quantity),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await?;
            }
        }
        txn.commit().await?;

        counter!("storefront.cart.items_added", 1);
        self.event_sender.send_or_log(Event::CartItemAdded {
            user_id,
            product_id,
            quantity,
        });
        info!(%user_id, %product_id, quantity, "item added to cart");

        self.get_cart(user_id).await
    }

    /// Drops a line and returns its held quantity to stock.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = get_or_create_cart(&txn, user_id).await?;
        let line = find_line(&txn, cart.id, product_id)
            .await?
            .ok_or_else(|| line_not_found(product_id))?;

        let quantity = line.quantity;
        stock::release(&txn, product_id, quantity).await?;
        line.delete(&txn).await?;
        txn.commit().await?;

        counter!("storefront.cart.items_removed", 1);
        self.event_sender.send_or_log(Event::CartItemRemoved {
            user_id,
            product_id,
            quantity,
        });
        info!(%user_id, %product_id, quantity, "item removed from cart");

        self.get_cart(user_id).await
    }

    /// Sets a line to `quantity`, moving only the difference in stock.
    /// A quantity of zero or less removes the line.
    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        if quantity <= 0 {
            return self.remove_item(user_id, product_id).await;
        }
        if quantity > MAX_LINE_QUANTITY {
            return Err(line_too_large());
        }

        let txn = self.db.begin().await?;
        let cart = get_or_create_cart(&txn, user_id).await?;
        let line = find_line(&txn, cart.id, product_id)
            .await?
            .ok_or_else(|| line_not_found(product_id))?;

        let delta = quantity - line.quantity;
        if delta > 0 {
            stock::reserve(&txn, product_id, delta).await?;
        } else if delta < 0 {
            stock::release(&txn, product_id, -delta).await?;
        }

        if delta != 0 {
            let mut active: cart_item::ActiveModel = line.into();
            active.quantity = Set(quantity);
            active.updated_at = Set(Utc::now());
            active.update(&txn).await?;
        }
        txn.commit().await?;

        if delta != 0 {
            self.event_sender.send_or_log(Event::StockAdjusted {
                product_id,
                delta: -delta,
            });
        }

        self.get_cart(user_id).await
    }

    /// Empties the cart, returning every held unit to stock.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = get_or_create_cart(&txn, user_id).await?;
        let lines = cart_item::Entity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .all(&txn)
            .await?;

        for line in &lines {
            stock::release(&txn, line.product_id, line.quantity).await?;
        }
        cart_item::Entity::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        counter!("storefront.cart.cleared", 1);
        self.event_sender.send_or_log(Event::CartCleared {
            user_id,
            lines: lines.len(),
        });
        info!(%user_id, lines = lines.len(), "cart cleared");

        self.get_cart(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{establish_connection_with_config, run_migrations, DbConfig};
    use crate::entities::{user, UserRole};
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    struct Fixture {
        svc: CartService,
        db: Arc<DatabaseConnection>,
        user_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let db = establish_connection_with_config(&DbConfig::in_memory_sqlite())
            .await
            .unwrap();
        run_migrations(&db).await.unwrap();
        let db = Arc::new(db);
        let now = Utc::now();
        let user_id = Uuid::new_v4();
        user::ActiveModel {
            id: Set(user_id),
            name: Set("Ada".into()),
            email: Set("ada@example.com".into()),
            password_hash: Set("x".into()),
            role: Set(UserRole::User),
            address: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*db)
        .await
        .unwrap();
        let (sender, _rx) = crate::events::channel(64);
        Fixture {
            svc: CartService::new(db.clone(), Arc::new(sender), PricingPolicy::default()),
            db,
            user_id,
        }
    }

    async fn product_with_stock(db: &DatabaseConnection, price: Decimal, stock: i32) -> Uuid {
        let now = Utc::now();
        let id = Uuid::new_v4();
        product::ActiveModel {
            id: Set(id),
            title: Set(format!("Product {}", id)),
            description: Set(String::new()),
            category: Set("misc".into()),
            original_price: Set(price),
            discounted_price: Set(price),
            image_url: Set(None),
            rating_average: Set(Decimal::ZERO),
            rating_count: Set(0),
            stocks_left: Set(stock),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .unwrap();
        id
    }

    async fn stock_of(db: &DatabaseConnection, id: Uuid) -> i32 {
        product::Entity::find_by_id(id)
            .one(db)
            .await
            .unwrap()
            .unwrap()
            .stocks_left
    }

    #[tokio::test]
    async fn add_beyond_stock_leaves_everything_unchanged() {
        let f = fixture().await;
        let p = product_with_stock(&f.db, dec!(10), 5).await;

        let cart = f.svc.add_item(f.user_id, p, 3).await.unwrap();
        assert_eq!(cart.items[0].quantity, 3);
        assert_eq!(stock_of(&f.db, p).await, 2);

        assert_matches!(
            f.svc.add_item(f.user_id, p, 3).await,
            Err(ServiceError::InsufficientStock(_))
        );
        assert_eq!(stock_of(&f.db, p).await, 2);
        assert_eq!(f.svc.get_cart(f.user_id).await.unwrap().items[0].quantity, 3);
    }

    #[tokio::test]
    async fn adding_same_product_merges_lines() {
        let f = fixture().await;
        let p = product_with_stock(&f.db, dec!(10), 5).await;
        f.svc.add_item(f.user_id, p, 1).await.unwrap();
        let cart = f.svc.add_item(f.user_id, p, 2).await.unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.item_count, 3);
    }

    #[tokio::test]
    async fn non_positive_quantity_is_rejected() {
        let f = fixture().await;
        let p = product_with_stock(&f.db, dec!(10), 5).await;
        assert_matches!(
            f.svc.add_item(f.user_id, p, 0).await,
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            f.svc.add_item(f.user_id, Uuid::new_v4(), 1).await,
            Err(ServiceError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn line_quantity_is_capped_without_touching_stock() {
        let f = fixture().await;
        let p = product_with_stock(&f.db, dec!(1), i32::MAX).await;

        f.svc.add_item(f.user_id, p, MAX_LINE_QUANTITY).await.unwrap();
        assert_eq!(stock_of(&f.db, p).await, i32::MAX - MAX_LINE_QUANTITY);

        assert_matches!(
            f.svc.add_item(f.user_id, p, 1).await,
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            f.svc.add_item(f.user_id, p, i32::MAX).await,
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            f.svc.update_quantity(f.user_id, p, MAX_LINE_QUANTITY + 1).await,
            Err(ServiceError::ValidationError(_))
        );

        assert_eq!(stock_of(&f.db, p).await, i32::MAX - MAX_LINE_QUANTITY);
        let cart = f.svc.get_cart(f.user_id).await.unwrap();
        assert_eq!(cart.items[0].quantity, MAX_LINE_QUANTITY);
    }

    #[tokio::test]
    async fn remove_restores_held_quantity() {
        let f = fixture().await;
        let p = product_with_stock(&f.db, dec!(10), 5).await;
        f.svc.add_item(f.user_id, p, 4).await.unwrap();
        let cart = f.svc.remove_item(f.user_id, p).await.unwrap();
        assert!(cart.items.is_empty());
        assert_eq!(stock_of(&f.db, p).await, 5);

        assert_matches!(
            f.svc.remove_item(f.user_id, p).await,
            Err(ServiceError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn update_quantity_moves_only_the_difference() {
        let f = fixture().await;
        let p = product_with_stock(&f.db, dec!(10), 5).await;
        f.svc.add_item(f.user_id, p, 2).await.unwrap();

        f.svc.update_quantity(f.user_id, p, 5).await.unwrap();
        assert_eq!(stock_of(&f.db, p).await, 0);

        f.svc.update_quantity(f.user_id, p, 1).await.unwrap();
        assert_eq!(stock_of(&f.db, p).await, 4);

        assert_matches!(
            f.svc.update_quantity(f.user_id, p, 6).await,
            Err(ServiceError::InsufficientStock(_))
        );

        let cart = f.svc.update_quantity(f.user_id, p, 0).await.unwrap();
        assert!(cart.items.is_empty());
        assert_eq!(stock_of(&f.db, p).await, 5);
    }

    #[tokio::test]
    async fn clear_restores_all_lines_and_previews_zero() {
        let f = fixture().await;
        let a = product_with_stock(&f.db, dec!(10), 5).await;
        let b = product_with_stock(&f.db, dec!(3.50), 2).await;
        f.svc.add_item(f.user_id, a, 2).await.unwrap();
        let cart = f.svc.add_item(f.user_id, b, 2).await.unwrap();
        assert_eq!(cart.summary.items_price, dec!(27.00));

        let cleared = f.svc.clear_cart(f.user_id).await.unwrap();
        assert!(cleared.items.is_empty());
        assert_eq!(cleared.summary, PriceBreakdown::zero());
        assert_eq!(stock_of(&f.db, a).await, 5);
        assert_eq!(stock_of(&f.db, b).await, 2);
    }
}
