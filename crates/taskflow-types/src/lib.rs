//! TaskFlow Types - Shared domain types
//!
//! This crate contains domain types used across TaskFlow services:
//! - User identity
//! - Subscription tiers, plans, limits and feature flags
//! - Usage counters for the current billing period
//! - Payment transactions and saved payment methods

pub mod api;
pub mod error;
pub mod payment;
pub mod plan;
pub mod subscription;
pub mod tier;
pub mod usage;
pub mod user;

pub use api::*;
pub use error::*;
pub use payment::*;
pub use plan::*;
pub use subscription::*;
pub use tier::*;
pub use usage::*;
pub use user::*;
