use chrono::Utc;
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
    SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::password::{hash_password, verify_password},
    entities::{cart, user, UserRole},
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Postal address stored on the user profile and copied onto orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
pub struct Address {
    #[validate(length(min = 1, max = 200))]
    pub street: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 100))]
    pub state: String,
    #[validate(length(min = 1, max = 20))]
    pub postal_code: String,
    #[validate(length(min = 2, max = 100))]
    pub country: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RegisterInput {
    #[validate(length(min = 1, max = 100, message = "name is required"))]
    pub name: String,
    #[validate(email(message = "email is invalid"))]
    pub email: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    #[schema(min_length = 8)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct LoginInput {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

/// Public view of a user
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub address: Option<Address>,
}

impl From<user::Model> for UserProfile {
    fn from(model: user::Model) -> Self {
        let address = model
            .address
            .and_then(|value| serde_json::from_value(value).ok());
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
            role: model.role,
            address,
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn invalid_credentials() -> ServiceError {
    ServiceError::Unauthorized("Invalid email or password".to_string())
}

/// Accounts, credentials and saved addresses
#[derive(Clone)]
pub struct UserService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl UserService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Creates a user together with their empty cart.
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register(&self, input: RegisterInput) -> Result<user::Model, ServiceError> {
        input.validate()?;
        let email = normalize_email(&input.email);

        let existing = user::Entity::find()
            .filter(user::Column::Email.eq(email.as_str()))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(
                "An account with this email already exists".to_string(),
            ));
        }

        let password_hash = hash_password(&input.password)?;
        let now = Utc::now();
        let user_id = Uuid::new_v4();

        let txn = self.db.begin().await?;
        let created = user::ActiveModel {
            id: Set(user_id),
            name: Set(input.name.trim().to_string()),
            email: Set(email),
            password_hash: Set(password_hash),
            role: Set(UserRole::User),
            address: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(map_unique_violation)?;

        cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        counter!("storefront.users.registered", 1);
        self.event_sender.send_or_log(Event::UserRegistered(user_id));
        info!(%user_id, "user registered");
        Ok(created)
    }

    /// Checks credentials. Unknown email and wrong password fail the same way.
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn login(&self, input: LoginInput) -> Result<user::Model, ServiceError> {
        input.validate().map_err(|_| invalid_credentials())?;

        let found = user::Entity::find()
            .filter(user::Column::Email.eq(normalize_email(&input.email)))
            .one(&*self.db)
            .await?;

        match found {
            Some(user) if verify_password(&input.password, &user.password_hash) => {
                counter!("storefront.auth.logins", 1, "outcome" => "success");
                Ok(user)
            }
            _ => {
                counter!("storefront.auth.logins", 1, "outcome" => "failure");
                warn!("login rejected");
                Err(invalid_credentials())
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn get_user(&self, user_id: Uuid) -> Result<user::Model, ServiceError> {
        user::Entity::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", user_id)))
    }

    #[instrument(skip(self, address))]
    pub async fn update_address(
        &self,
        user_id: Uuid,
        address: Address,
    ) -> Result<user::Model, ServiceError> {
        address.validate()?;
        let user = self.get_user(user_id).await?;

        let mut active: user::ActiveModel = user.into();
        active.address = Set(Some(serde_json::to_value(&address)?));
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        info!(%user_id, "address updated");
        Ok(updated)
    }

    /// Grants the admin role. Used by the seed tool; there is no HTTP route for it.
    #[instrument(skip(self))]
    pub async fn promote_to_admin(&self, user_id: Uuid) -> Result<user::Model, ServiceError> {
        let user = self.get_user(user_id).await?;
        if user.is_admin() {
            return Ok(user);
        }
        let mut active: user::ActiveModel = user.into();
        active.role = Set(UserRole::Admin);
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    /// Looks a user up by email, ignoring case.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<user::Model>, ServiceError> {
        Ok(user::Entity::find()
            .filter(user::Column::Email.eq(normalize_email(email)))
            .one(&*self.db)
            .await?)
    }
}

fn map_unique_violation(err: DbErr) -> ServiceError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            ServiceError::Conflict("An account with this email already exists".to_string())
        }
        _ => ServiceError::DatabaseError(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{establish_connection_with_config, run_migrations, DbConfig};
    use assert_matches::assert_matches;
    use sea_orm::PaginatorTrait;

    async fn service() -> UserService {
        let db = establish_connection_with_config(&DbConfig::in_memory_sqlite())
            .await
            .unwrap();
        run_migrations(&db).await.unwrap();
        let (sender, _rx) = crate::events::channel(16);
        UserService::new(Arc::new(db), Arc::new(sender))
    }

    fn register_input(email: &str) -> RegisterInput {
        RegisterInput {
            name: "Ada".into(),
            email: email.into(),
            password: "correct horse".into(),
        }
    }

    #[tokio::test]
    async fn register_creates_user_and_cart() {
        let svc = service().await;
        let user = svc.register(register_input("Ada@Example.com")).await.unwrap();
        assert_eq!(user.email, "ada@example.com");
        assert_eq!(user.role, UserRole::User);

        let carts = cart::Entity::find()
            .filter(cart::Column::UserId.eq(user.id))
            .count(&*svc.db)
            .await
            .unwrap();
        assert_eq!(carts, 1);
    }

    #[tokio::test]
    async fn duplicate_email_conflicts_regardless_of_case() {
        let svc = service().await;
        svc.register(register_input("ada@example.com")).await.unwrap();
        assert_matches!(
            svc.register(register_input("ADA@example.com")).await,
            Err(ServiceError::Conflict(_))
        );
    }

    #[tokio::test]
    async fn short_password_is_rejected() {
        let svc = service().await;
        let mut input = register_input("ada@example.com");
        input.password = "short".into();
        assert_matches!(svc.register(input).await, Err(ServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let svc = service().await;
        svc.register(register_input("ada@example.com")).await.unwrap();

        let wrong_password = svc
            .login(LoginInput {
                email: "ada@example.com".into(),
                password: "wrong password".into(),
            })
            .await
            .unwrap_err();
        let unknown_email = svc
            .login(LoginInput {
                email: "bob@example.com".into(),
                password: "correct horse".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(wrong_password.to_string(), unknown_email.to_string());

        let ok = svc
            .login(LoginInput {
                email: "ADA@example.com".into(),
                password: "correct horse".into(),
            })
            .await
            .unwrap();
        assert_eq!(ok.email, "ada@example.com");
    }

    #[tokio::test]
    async fn address_round_trips_through_profile() {
        let svc = service().await;
        let user = svc.register(register_input("ada@example.com")).await.unwrap();
        let address = Address {
            street: "1 Main St".into(),
            city: "Springfield".into(),
            state: "IL".into(),
            postal_code: "62701".into(),
            country: "US".into(),
        };
        let updated = svc.update_address(user.id, address.clone()).await.unwrap();
        assert_eq!(UserProfile::from(updated).address, Some(address));
    }
}
