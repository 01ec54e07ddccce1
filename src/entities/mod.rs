//! Sea-ORM entities backing the storefront schema.

pub mod cart;
pub mod cart_item;
pub mod order;
pub mod order_item;
pub mod product;
pub mod user;

pub use order::OrderStatus;
pub use user::UserRole;
