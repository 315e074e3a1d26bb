// Postgres storage layer for the work-queue facade, built on sqlx.

pub mod models;
pub mod repositories;

pub use models::*;
pub use repositories::*;
