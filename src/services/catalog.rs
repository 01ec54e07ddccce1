use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::{Display, EnumString};
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{cart_item, product},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{pricing::round_money, PageLimits},
};

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Rating,
}

/// Filters for the public product listing
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProductQuery {
    pub category: Option<String>,
    /// Case-insensitive title search
    pub search: Option<String>,
    #[param(value_type = Option<String>)]
    pub min_price: Option<Decimal>,
    #[param(value_type = Option<String>)]
    pub max_price: Option<Decimal>,
    pub in_stock: Option<bool>,
    pub sort: Option<ProductSort>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProductPage {
    pub items: Vec<ProductView>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

/// Product as returned by the API
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProductView {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    #[schema(value_type = String)]
    pub original_price: Decimal,
    #[schema(value_type = String)]
    pub discounted_price: Decimal,
    pub image_url: Option<String>,
    #[schema(value_type = String)]
    pub rating_average: Decimal,
    pub rating_count: i32,
    pub stocks_left: i32,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
}

impl From<product::Model> for ProductView {
    fn from(m: product::Model) -> Self {
        Self {
            id: m.id,
            title: m.title,
            description: m.description,
            category: m.category,
            original_price: round_money(m.original_price),
            discounted_price: round_money(m.discounted_price),
            image_url: m.image_url,
            rating_average: round_money(m.rating_average),
            rating_count: m.rating_count,
            stocks_left: m.stocks_left,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 5000))]
    pub description: String,
    #[validate(length(min = 1, max = 100))]
    pub category: String,
    #[schema(value_type = String, example = "30.00")]
    pub original_price: Decimal,
    /// Defaults to `original_price`
    #[schema(value_type = Option<String>, example = "25.00")]
    pub discounted_price: Option<Decimal>,
    #[validate(url)]
    pub image_url: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub stocks_left: i32,
}

/// Partial product update; absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateProductInput {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub category: Option<String>,
    #[schema(value_type = Option<String>)]
    pub original_price: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub discounted_price: Option<Decimal>,
    #[validate(url)]
    pub image_url: Option<String>,
    #[validate(range(min = 0))]
    pub stocks_left: Option<i32>,
}

fn check_prices(original: Decimal, discounted: Decimal) -> Result<(), ServiceError> {
    if original < Decimal::ZERO || discounted < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "prices must not be negative".to_string(),
        ));
    }
    if discounted > original {
        return Err(ServiceError::ValidationError(
            "discounted_price must not exceed original_price".to_string(),
        ));
    }
    Ok(())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Next running average after adding `score` to `count` existing ratings.
pub fn next_rating_average(average: Decimal, count: i32, score: i32) -> Decimal {
    let count = Decimal::from(count.max(0));
    round_money((average * count + Decimal::from(score)) / (count + Decimal::ONE))
}

/// Product catalog reads and admin maintenance
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    page_limits: PageLimits,
}

impl CatalogService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        page_limits: PageLimits,
    ) -> Self {
        Self {
            db,
            event_sender,
            page_limits,
        }
    }

    #[instrument(skip(self))]
    pub async fn list_products(&self, query: ProductQuery) -> Result<ProductPage, ServiceError> {
        let (page, limit) = self.page_limits.resolve(query.page, query.limit);

        let mut condition = Condition::all();
        if let Some(category) = non_blank(query.category.as_deref()) {
            condition = condition.add(product::Column::Category.eq(category));
        }
        if let Some(search) = non_blank(query.search.as_deref()) {
            let pattern = format!("%{}%", search.to_lowercase());
            condition = condition
                .add(Expr::expr(Func::lower(Expr::col(product::Column::Title))).like(pattern));
        }
        if let Some(min) = query.min_price {
            condition = condition.add(product::Column::DiscountedPrice.gte(min));
        }
        if let Some(max) = query.max_price {
            condition = condition.add(product::Column::DiscountedPrice.lte(max));
        }
        if query.in_stock.unwrap_or(false) {
            condition = condition.add(product::Column::StocksLeft.gt(0));
        }

        let select = product::Entity::find().filter(condition);
        let select = match query.sort.unwrap_or_default() {
            ProductSort::Newest => select.order_by_desc(product::Column::CreatedAt),
            ProductSort::PriceAsc => select.order_by_asc(product::Column::DiscountedPrice),
            ProductSort::PriceDesc => select.order_by_desc(product::Column::DiscountedPrice),
            ProductSort::Rating => select
                .order_by_desc(product::Column::RatingAverage)
                .order_by_desc(product::Column::RatingCount),
        }
        .order_by_asc(product::Column::Id);

        let paginator = select.paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page - 1).await?;

        Ok(ProductPage {
            items: items.into_iter().map(ProductView::from).collect(),
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
        })
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    #[instrument(skip(self))]
    pub async fn list_categories(&self) -> Result<Vec<String>, ServiceError> {
        let categories = product::Entity::find()
            .select_only()
            .column(product::Column::Category)
            .distinct()
            .order_by_asc(product::Column::Category)
            .into_tuple::<String>()
            .all(&*self.db)
            .await?;
        Ok(categories)
    }

    #[instrument(skip(self, input), fields(title = %input.title))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<product::Model, ServiceError> {
        input.validate()?;
        let original = round_money(input.original_price);
        let discounted = round_money(input.discounted_price.unwrap_or(original));
        check_prices(original, discounted)?;

        let now = Utc::now();
        let created = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(input.title.trim().to_string()),
            description: Set(input.description),
            category: Set(input.category.trim().to_string()),
            original_price: Set(original),
            discounted_price: Set(discounted),
            image_url: Set(input.image_url),
            rating_average: Set(Decimal::ZERO),
            rating_count: Set(0),
            stocks_left: Set(input.stocks_left),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        counter!("storefront.products.created", 1);
        self.event_sender.send_or_log(Event::ProductCreated(created.id));
        info!(product_id = %created.id, "product created");
        Ok(created)
    }

    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> Result<product::Model, ServiceError> {
        input.validate()?;

        let txn = self.db.begin().await?;
        let current = product::Entity::find_by_id(product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let original = input
            .original_price
            .map(round_money)
            .unwrap_or(current.original_price);
        let discounted = input
            .discounted_price
            .map(round_money)
            .unwrap_or(current.discounted_price);
        check_prices(original, discounted)?;

        let stock_delta = input
            .stocks_left
            .map(|stock| stock - current.stocks_left)
            .unwrap_or(0);

        let mut active: product::ActiveModel = current.into();
        if let Some(title) = input.title {
            active.title = Set(title.trim().to_string());
        }
        if let Some(description) = input.description {
            active.description = Set(description);
        }
        if let Some(category) = input.category {
            active.category = Set(category.trim().to_string());
        }
        if input.image_url.is_some() {
            active.image_url = Set(input.image_url);
        }
        if let Some(stock) = input.stocks_left {
            active.stocks_left = Set(stock);
        }
        active.original_price = Set(original);
        active.discounted_price = Set(discounted);
        active.updated_at = Set(Utc::now());

        let updated = active.update(&txn).await?;
        txn.commit().await?;

        self.event_sender.send_or_log(Event::ProductUpdated(product_id));
        if stock_delta != 0 {
            self.event_sender.send_or_log(Event::StockAdjusted {
                product_id,
                delta: stock_delta,
            });
        }
        Ok(updated)
    }

    /// Deletes a product and any cart lines holding it. Order snapshots stay.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, product_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        let removed_lines = cart_item::Entity::delete_many()
            .filter(cart_item::Column::ProductId.eq(product_id))
            .exec(&txn)
            .await?
            .rows_affected;

        let result = product::Entity::delete_by_id(product_id).exec(&txn).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Product {} not found",
                product_id
            )));
        }
        txn.commit().await?;

        counter!("storefront.products.deleted", 1);
        self.event_sender.send_or_log(Event::ProductDeleted(product_id));
        info!(%product_id, removed_lines, "product deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn rate_product(
        &self,
        product_id: Uuid,
        score: i32,
    ) -> Result<product::Model, ServiceError> {
        if !(1..=5).contains(&score) {
            return Err(ServiceError::ValidationError(
                "rating must be between 1 and 5".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let current = product::Entity::find_by_id(product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let average = next_rating_average(current.rating_average, current.rating_count, score);
        let count = current.rating_count + 1;

        let mut active: product::ActiveModel = current.into();
        active.rating_average = Set(average);
        active.rating_count = Set(count);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;
        txn.commit().await?;

        Ok(updated)
    }
}
