//! ZapCast Storage - Database abstraction
//!
//! This crate provides the PostgreSQL storage layer for ZapCast:
//! connection pooling, models, and one repository per aggregate.

pub mod db;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use models::*;
pub use repository::*;
