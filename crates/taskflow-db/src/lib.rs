//! TaskFlow DB - Record store abstractions
//!
//! The hosted relational store is consulted through async repository traits.
//! PostgreSQL implementations use SQLx; an in-memory implementation backs
//! tests and local runs (feature `memory`).
//!
//! # Example
//!
//! ```rust,ignore
//! use taskflow_db::{create_pool, Repositories};
//!
//! let pool = create_pool("postgres://localhost/taskflow").await?;
//! taskflow_db::run_migrations(&pool).await?;
//! let repos = Repositories::postgres(pool);
//!
//! let sub = repos.subscriptions.find_active_by_user_id(user_id).await?;
//! ```

pub mod error;
#[cfg(feature = "memory")]
pub mod memory;
pub mod models;
pub mod pg;
pub mod pool;
pub mod repo;

pub use error::{DbError, DbResult};
pub use models::*;
pub use pg::Repositories;
pub use pool::{create_pool, run_migrations, DbPool};
pub use repo::*;
