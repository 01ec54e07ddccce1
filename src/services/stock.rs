//! Stock counter movements.
//!
//! Every change to `products.stocks_left` goes through here as a single
//! conditional `UPDATE`, so it composes with whatever transaction the caller
//! holds and never drives stock below zero.

use metrics::counter;
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::entities::product;
use crate::errors::ServiceError;

/// Takes `quantity` units out of stock.
///
/// Fails with `NotFound` when the product is gone and `InsufficientStock`
/// when fewer than `quantity` units are left; nothing is written in either case.
pub async fn reserve<C>(conn: &C, product_id: Uuid, quantity: i32) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(
            "quantity must be at least 1".to_string(),
        ));
    }

    let result = product::Entity::update_many()
        .col_expr(
            product::Column::StocksLeft,
            Expr::col(product::Column::StocksLeft).sub(quantity),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(chrono::Utc::now()))
        .filter(product::Column::Id.eq(product_id))
        .filter(product::Column::StocksLeft.gte(quantity))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        counter!("storefront.stock.reserve_rejected", 1);
        let product = product::Entity::find_by_id(product_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;
        return Err(ServiceError::InsufficientStock(format!(
            "only {} left of '{}'",
            product.stocks_left, product.title
        )));
    }

    counter!("storefront.stock.reserved", quantity as u64);
    debug!(%product_id, quantity, "stock reserved");
    Ok(())
}

/// Puts `quantity` units back. Returns `false` if the product no longer exists.
pub async fn release<C>(conn: &C, product_id: Uuid, quantity: i32) -> Result<bool, ServiceError>
where
    C: ConnectionTrait,
{
    if quantity <= 0 {
        return Ok(true);
    }

    let result = product::Entity::update_many()
        .col_expr(
            product::Column::StocksLeft,
            Expr::col(product::Column::StocksLeft).add(quantity),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(chrono::Utc::now()))
        .filter(product::Column::Id.eq(product_id))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        warn!(%product_id, quantity, "stock release skipped: product no longer exists");
        return Ok(false);
    }

    counter!("storefront.stock.released", quantity as u64);
    debug!(%product_id, quantity, "stock released");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{establish_connection_with_config, run_migrations, DbConfig};
    use assert_matches::assert_matches;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

    async fn setup(stock: i32) -> (DatabaseConnection, Uuid) {
        let db = establish_connection_with_config(&DbConfig::in_memory_sqlite())
            .await
            .unwrap();
        run_migrations(&db).await.unwrap();
        let id = Uuid::new_v4();
        product::ActiveModel {
            id: Set(id),
            title: Set("Desk Lamp".into()),
            description: Set("Warm light".into()),
            category: Set("home".into()),
            original_price: Set(dec!(30.00)),
            discounted_price: Set(dec!(25.00)),
            image_url: Set(None),
            rating_average: Set(dec!(0)),
            rating_count: Set(0),
            stocks_left: Set(stock),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(&db)
        .await
        .unwrap();
        (db, id)
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
    async fn reserve_decrements_only_when_enough_is_left() {
        let (db, id) = setup(5).await;

        reserve(&db, id, 3).await.unwrap();
        assert_eq!(stock_of(&db, id).await, 2);

        assert_matches!(
            reserve(&db, id, 3).await,
            Err(ServiceError::InsufficientStock(msg)) if msg.contains("only 2 left")
        );
        assert_eq!(stock_of(&db, id).await, 2);
    }

    #[tokio::test]
    async fn reserve_unknown_product_is_not_found() {
        let (db, _) = setup(5).await;
        assert_matches!(
            reserve(&db, Uuid::new_v4(), 1).await,
            Err(ServiceError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn release_restores_and_tolerates_missing_products() {
        let (db, id) = setup(1).await;
        assert!(release(&db, id, 4).await.unwrap());
        assert_eq!(stock_of(&db, id).await, 5);
        assert!(!release(&db, Uuid::new_v4(), 4).await.unwrap());
    }
}
