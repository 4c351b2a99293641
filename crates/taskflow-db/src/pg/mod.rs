//! PostgreSQL repository implementations

mod payment_method;
mod plan;
mod subscription;
mod task;
mod transaction;
mod usage;

pub use payment_method::PgPaymentMethodRepository;
pub use plan::PgPlanRepository;
pub use subscription::PgSubscriptionRepository;
pub use task::PgTaskRepository;
pub use transaction::PgTransactionRepository;
pub use usage::PgUsageRepository;

use std::sync::Arc;

use crate::repo::*;
use crate::DbPool;

/// All repositories bundled together
#[derive(Clone)]
pub struct Repositories {
    pub plans: Arc<dyn PlanRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub usage: Arc<dyn UsageRepository>,
    pub transactions: Arc<dyn TransactionRepository>,
    pub payment_methods: Arc<dyn PaymentMethodRepository>,
    pub tasks: Arc<dyn TaskRepository>,
}

impl Repositories {
    /// Create all repositories from a database pool
    pub fn postgres(pool: DbPool) -> Self {
        Self {
            plans: Arc::new(PgPlanRepository::new(pool.clone())),
            subscriptions: Arc::new(PgSubscriptionRepository::new(pool.clone())),
            usage: Arc::new(PgUsageRepository::new(pool.clone())),
            transactions: Arc::new(PgTransactionRepository::new(pool.clone())),
            payment_methods: Arc::new(PgPaymentMethodRepository::new(pool.clone())),
            tasks: Arc::new(PgTaskRepository::new(pool)),
        }
    }

    /// Back every repository with one shared in-memory store
    #[cfg(feature = "memory")]
    pub fn memory(store: crate::memory::MemoryStore) -> Self {
        Self {
            plans: Arc::new(store.clone()),
            subscriptions: Arc::new(store.clone()),
            usage: Arc::new(store.clone()),
            transactions: Arc::new(store.clone()),
            payment_methods: Arc::new(store.clone()),
            tasks: Arc::new(store),
        }
    }
}
