//! Plan catalog with process-wide caching

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use taskflow_db::PlanRepository;
use taskflow_types::{Plan, Tier};

use crate::EntitlementError;

/// Plans only change through administrative edits.
const DEFAULT_PLAN_TTL: Duration = Duration::from_secs(15 * 60);

/// Read-only view of the plan table
#[derive(Clone)]
pub struct PlanCatalog {
    repo: Arc<dyn PlanRepository>,
    cache: Cache<Tier, Plan>,
}

impl PlanCatalog {
    pub fn new(repo: Arc<dyn PlanRepository>) -> Self {
        Self::with_cache_duration(repo, DEFAULT_PLAN_TTL)
    }

    pub fn with_cache_duration(repo: Arc<dyn PlanRepository>, ttl: Duration) -> Self {
        Self {
            repo,
            cache: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(Tier::ALL.len() as u64)
                .build(),
        }
    }

    /// Plan definition for a tier
    #[tracing::instrument(skip(self))]
    pub async fn get_plan(&self, tier: Tier) -> Result<Plan, EntitlementError> {
        if let Some(plan) = self.cache.get(&tier).await {
            return Ok(plan);
        }

        let plan = self
            .repo
            .find_by_tier(tier.as_str())
            .await?
            .ok_or(EntitlementError::PlanNotFound(tier))?
            .into_plan()?;

        self.cache.insert(tier, plan.clone()).await;
        Ok(plan)
    }

    /// Every plan, in display order (free, pro, enterprise)
    pub async fn list_plans(&self) -> Result<Vec<Plan>, EntitlementError> {
        let mut plans = Vec::with_capacity(Tier::ALL.len());
        for row in self.repo.list_plans().await? {
            let plan = row.into_plan()?;
            self.cache.insert(plan.tier, plan.clone()).await;
            plans.push(plan);
        }
        plans.sort_by_key(|p| p.tier);
        Ok(plans)
    }

    /// Drop cached plans after an administrative edit
    pub fn invalidate(&self) {
        self.cache.invalidate_all();
    }
}

impl std::fmt::Debug for PlanCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanCatalog").finish()
    }
}
