//! Entitlement checking
//!
//! Lookup failures are asymmetric. An unresolvable subscription or plan
//! degrades the user to the built-in free plan, which denies every paid
//! feature. An unreadable usage counter allows the action, so a store hiccup
//! does not lock users out of their free quota.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use taskflow_db::SubscriptionRepository;
use taskflow_types::{
    Feature, Limit, Plan, ResourceStatus, ResourceType, SubscriptionStatus, Tier, UserId,
    BYTES_PER_MB,
};

use crate::{EntitlementError, PlanCatalog, UsageLedger};

/// Result of checking one resource against the user's plan
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimitDecision {
    pub allowed: bool,
    pub tier: Tier,
    pub used: f64,
    pub limit: Limit,
}

/// Entitlement checker with tier caching
#[derive(Clone)]
pub struct EntitlementChecker {
    catalog: PlanCatalog,
    ledger: UsageLedger,
    subscriptions: Arc<dyn SubscriptionRepository>,
    /// Cache of user_id -> resolved tier
    tier_cache: Cache<UserId, Tier>,
}

impl EntitlementChecker {
    /// Create a new entitlement checker
    pub fn new(
        catalog: PlanCatalog,
        ledger: UsageLedger,
        subscriptions: Arc<dyn SubscriptionRepository>,
    ) -> Self {
        Self::with_cache_duration(catalog, ledger, subscriptions, Duration::from_secs(60))
    }

    /// Create with custom cache duration
    pub fn with_cache_duration(
        catalog: PlanCatalog,
        ledger: UsageLedger,
        subscriptions: Arc<dyn SubscriptionRepository>,
        cache_duration: Duration,
    ) -> Self {
        Self {
            catalog,
            ledger,
            subscriptions,
            tier_cache: Cache::builder()
                .time_to_live(cache_duration)
                .max_capacity(10_000)
                .build(),
        }
    }

    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    /// Tier of the user's active subscription, `free` otherwise
    pub async fn resolve_tier(&self, user_id: &UserId) -> Tier {
        if let Some(tier) = self.tier_cache.get(user_id).await {
            return tier;
        }

        match self.lookup_tier(user_id).await {
            Ok(tier) => {
                self.tier_cache.insert(*user_id, tier).await;
                tier
            }
            Err(e) => {
                // Not cached, so the next request retries the lookup.
                tracing::warn!(user_id = %user_id, error = %e, "Tier lookup failed, treating as free");
                Tier::Free
            }
        }
    }

    async fn lookup_tier(&self, user_id: &UserId) -> Result<Tier, EntitlementError> {
        let Some(row) = self.subscriptions.find_active_by_user_id(user_id.0).await? else {
            return Ok(Tier::Free);
        };
        let sub = row.into_subscription().map_err(EntitlementError::from)?;
        Ok(if sub.status == SubscriptionStatus::Active {
            sub.tier
        } else {
            Tier::Free
        })
    }

    /// The plan governing the user right now
    pub async fn effective_plan(&self, user_id: &UserId) -> Plan {
        let tier = self.resolve_tier(user_id).await;
        match self.catalog.get_plan(tier).await {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    tier = %tier,
                    error = %e,
                    "Plan lookup failed, using built-in free plan"
                );
                Plan::builtin(Tier::Free)
            }
        }
    }

    /// True iff the user's plan has the feature flag set
    pub async fn can_use_feature(&self, user_id: &UserId, feature: Feature) -> bool {
        self.effective_plan(user_id).await.has_feature(feature)
    }

    /// True iff the resource is unlimited or `used < limit`
    pub async fn check_resource_limit(&self, user_id: &UserId, resource: ResourceType) -> bool {
        self.evaluate(user_id, resource).await.allowed
    }

    /// Full decision for a resource, including the figures for a denial payload
    #[tracing::instrument(skip(self, user_id), fields(user_id = %user_id))]
    pub async fn evaluate(&self, user_id: &UserId, resource: ResourceType) -> LimitDecision {
        let plan = self.effective_plan(user_id).await;
        let limit = plan.limit(resource);

        let used = match self.ledger.get_usage(user_id).await {
            Ok(record) => record.used(resource),
            Err(e) => {
                tracing::warn!(error = %e, "Usage lookup failed, allowing");
                return LimitDecision {
                    allowed: true,
                    tier: plan.tier,
                    used: 0.0,
                    limit,
                };
            }
        };

        LimitDecision {
            allowed: limit.has_room(used),
            tier: plan.tier,
            used,
            limit,
        }
    }

    /// True if storing `file_size_bytes` more stays within the storage limit
    pub async fn check_storage_limit(&self, user_id: &UserId, file_size_bytes: u64) -> bool {
        let plan = self.effective_plan(user_id).await;
        let limit = plan.limit(ResourceType::Storage);
        if limit.is_unlimited() {
            return true;
        }

        match self.ledger.get_usage(user_id).await {
            Ok(record) => limit.fits(
                record.storage_used_mb,
                file_size_bytes as f64 / BYTES_PER_MB,
            ),
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Usage lookup failed, allowing upload");
                true
            }
        }
    }

    /// Percentage of the plan limit consumed this period
    pub async fn usage_percentage(
        &self,
        user_id: &UserId,
        resource: ResourceType,
    ) -> Result<u32, EntitlementError> {
        let plan = self.effective_plan(user_id).await;
        self.ledger
            .usage_percentage(user_id, resource, plan.limit(resource))
            .await
    }

    /// Per-resource usage against the plan.
    ///
    /// `None` when the user has never had a subscription row.
    pub async fn usage_status(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Vec<(ResourceType, ResourceStatus)>>, EntitlementError> {
        if self
            .subscriptions
            .find_latest_by_user_id(user_id.0)
            .await?
            .is_none()
        {
            return Ok(None);
        }

        let plan = self.effective_plan(user_id).await;
        let record = self.ledger.get_usage(user_id).await?;
        Ok(Some(
            ResourceType::ALL
                .into_iter()
                .map(|r| (r, ResourceStatus::new(record.used(r), plan.limit(r))))
                .collect(),
        ))
    }

    /// Forget the cached tier after a subscription change
    pub async fn invalidate_user(&self, user_id: &UserId) {
        self.tier_cache.invalidate(user_id).await;
    }
}

impl std::fmt::Debug for EntitlementChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitlementChecker").finish()
    }
}
