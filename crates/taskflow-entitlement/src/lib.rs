//! TaskFlow Entitlement - Quota accounting and feature gating
//!
//! Three cooperating pieces:
//!
//! - [`PlanCatalog`]: cached, read-only plan definitions
//! - [`UsageLedger`]: per-user monthly counters
//! - [`EntitlementChecker`]: the allow/deny gate consulted before every
//!   metered action
//!
//! # Example
//!
//! ```rust,ignore
//! use taskflow_entitlement::{EntitlementChecker, PlanCatalog, UsageLedger};
//!
//! let catalog = PlanCatalog::new(repos.plans.clone());
//! let ledger = UsageLedger::new(repos.usage.clone());
//! let checker = EntitlementChecker::new(catalog, ledger, repos.subscriptions.clone());
//!
//! if checker.check_resource_limit(&user_id, ResourceType::Tasks).await {
//!     // create the task, then track usage
//! }
//! ```

pub mod catalog;
pub mod checker;
pub mod error;
pub mod ledger;

pub use catalog::PlanCatalog;
pub use checker::{EntitlementChecker, LimitDecision};
pub use error::EntitlementError;
pub use ledger::{Consumption, UsageLedger};
