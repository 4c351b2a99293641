//! Per-tier request throttling using the governor crate.
//!
//! Token buckets keyed by user (or client address for anonymous callers)
//! protect the service from bursts. This is separate from the monthly
//! quotas: a throttled request is answered with 429 and `Retry-After`
//! and never touches the usage ledger.
//!
//! A user's bucket remembers the tier it was built for. When billing changes
//! the tier (confirmation, webhook or cancellation), the next request gets a
//! fresh bucket with the new quota. Idle buckets expire.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::clock::{Clock, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use moka::future::Cache;

use taskflow_entitlement::EntitlementChecker;
use taskflow_types::{Tier, UserId};

use crate::error::AuthError;
use crate::extractors::AuthContextExt;

/// Key for throttling (user ID or client address).
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum ThrottleKey {
    /// Authenticated caller.
    User(UserId),
    /// Anonymous caller with a known address.
    Ip(IpAddr),
    /// Anonymous caller with no address information.
    Anonymous,
}

/// Rate limiter state for a single key.
type KeyLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Bucket plus the tier whose quota it enforces (`None` for anonymous).
struct Bucket {
    tier: Option<Tier>,
    limiter: KeyLimiter,
}

const BUCKET_IDLE: Duration = Duration::from_secs(10 * 60);

fn per_minute(n: u32) -> Quota {
    Quota::per_minute(NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN))
}

/// Per-caller request throttle with tier quotas.
pub struct RequestThrottle {
    buckets: Cache<ThrottleKey, Arc<Bucket>>,
    tier_quotas: HashMap<Tier, Quota>,
    anonymous_quota: Quota,
    checker: EntitlementChecker,
}

impl RequestThrottle {
    /// Free 30, pro 120, enterprise 600, anonymous 10 requests per minute.
    #[must_use]
    pub fn new(checker: EntitlementChecker) -> Self {
        let tier_quotas = HashMap::from([
            (Tier::Free, per_minute(30)),
            (Tier::Pro, per_minute(120)),
            (Tier::Enterprise, per_minute(600)),
        ]);

        Self {
            buckets: Cache::builder()
                .time_to_idle(BUCKET_IDLE)
                .max_capacity(100_000)
                .build(),
            tier_quotas,
            anonymous_quota: per_minute(10),
            checker,
        }
    }

    /// Set a custom quota for a tier.
    #[must_use]
    pub fn with_tier_quota(mut self, tier: Tier, quota: Quota) -> Self {
        self.tier_quotas.insert(tier, quota);
        self
    }

    /// Set the anonymous request quota.
    #[must_use]
    pub fn with_anonymous_quota(mut self, quota: Quota) -> Self {
        self.anonymous_quota = quota;
        self
    }

    fn quota_for_tier(&self, tier: Tier) -> Quota {
        self.tier_quotas
            .get(&tier)
            .copied()
            .unwrap_or(self.anonymous_quota)
    }

    /// Check an authenticated request, resolving the user's tier.
    pub async fn check_user(&self, user_id: UserId) -> Result<(), AuthError> {
        let tier = self.checker.resolve_tier(&user_id).await;
        self.check_key(ThrottleKey::User(user_id), Some(tier), self.quota_for_tier(tier))
            .await
    }

    /// Check an anonymous request.
    pub async fn check_anonymous(&self, ip: Option<IpAddr>) -> Result<(), AuthError> {
        let key = ip.map_or(ThrottleKey::Anonymous, ThrottleKey::Ip);
        self.check_key(key, None, self.anonymous_quota).await
    }

    async fn check_key(
        &self,
        key: ThrottleKey,
        tier: Option<Tier>,
        quota: Quota,
    ) -> Result<(), AuthError> {
        let new_bucket = || {
            Arc::new(Bucket {
                tier,
                limiter: RateLimiter::direct(quota),
            })
        };

        let mut bucket = self.buckets.get_with(key, async { new_bucket() }).await;
        if bucket.tier != tier {
            tracing::debug!(?key, ?tier, "Tier changed, replacing request bucket");
            bucket = new_bucket();
            self.buckets.insert(key, bucket.clone()).await;
        }

        bucket.limiter.check().map_err(|not_until| {
            let wait = not_until.wait_time_from(DefaultClock::default().now());
            metrics::counter!("taskflow_throttled_requests_total").increment(1);
            AuthError::rate_limited(wait.as_secs())
        })
    }

    /// Number of live buckets.
    pub async fn limiter_count(&self) -> u64 {
        self.buckets.run_pending_tasks().await;
        self.buckets.entry_count()
    }
}

/// Axum middleware applying [`RequestThrottle`] to every request.
pub async fn throttle_requests(
    State(throttle): State<Arc<RequestThrottle>>,
    request: Request,
    next: Next,
) -> Response {
    let auth = request.extensions().get::<AuthContextExt>().map(|ext| ext.0.user_id);
    let result = match auth {
        Some(user_id) => throttle.check_user(user_id).await,
        None => {
            let ip = request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip());
            throttle.check_anonymous(ip).await
        }
    };

    match result {
        Ok(()) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use taskflow_db::memory::MemoryStore;
    use taskflow_db::{CreateSubscription, Repositories};
    use uuid::Uuid;
    use taskflow_entitlement::{PlanCatalog, UsageLedger};

    fn checker() -> EntitlementChecker {
        checker_with(&Repositories::memory(MemoryStore::seeded()))
    }

    fn checker_with(repos: &Repositories) -> EntitlementChecker {
        EntitlementChecker::new(
            PlanCatalog::new(repos.plans.clone()),
            UsageLedger::new(repos.usage.clone()),
            repos.subscriptions.clone(),
        )
    }

    #[tokio::test]
    async fn test_throttle_allows_within_quota() {
        let throttle = RequestThrottle::new(checker());
        let user = UserId::new();

        for _ in 0..20 {
            assert!(throttle.check_user(user).await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_throttle_rejects_over_quota() {
        // Users without a subscription resolve to the free tier.
        let throttle = RequestThrottle::new(checker()).with_tier_quota(Tier::Free, per_minute(2));
        let user = UserId::new();

        assert!(throttle.check_user(user).await.is_ok());
        assert!(throttle.check_user(user).await.is_ok());

        let result = throttle.check_user(user).await;
        assert!(matches!(result, Err(AuthError::RateLimitExceeded { .. })));
    }

    #[tokio::test]
    async fn test_anonymous_buckets_by_address() {
        let throttle = RequestThrottle::new(checker()).with_anonymous_quota(per_minute(1));
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(throttle.check_anonymous(Some(a)).await.is_ok());
        assert!(throttle.check_anonymous(Some(a)).await.is_err());
        assert!(throttle.check_anonymous(Some(b)).await.is_ok());
    }

    #[tokio::test]
    async fn test_one_bucket_per_caller() {
        let throttle = RequestThrottle::new(checker());
        let user = UserId::new();

        assert!(throttle.check_user(user).await.is_ok());
        assert!(throttle.check_user(user).await.is_ok());
        assert!(throttle.check_anonymous(None).await.is_ok());
        assert_eq!(throttle.limiter_count().await, 2);
    }

    #[tokio::test]
    async fn test_upgrade_replaces_exhausted_bucket() {
        let repos = Repositories::memory(MemoryStore::seeded());
        let checker = checker_with(&repos);
        let throttle = RequestThrottle::new(checker.clone())
            .with_tier_quota(Tier::Free, per_minute(1))
            .with_tier_quota(Tier::Pro, per_minute(5));
        let user = UserId::new();

        assert!(throttle.check_user(user).await.is_ok());
        assert!(throttle.check_user(user).await.is_err());

        // Activated out of band, e.g. by a provider callback.
        let now = Utc::now();
        repos
            .subscriptions
            .create(CreateSubscription {
                id: Uuid::new_v4(),
                user_id: user.0,
                tier: "pro".to_string(),
                status: "active".to_string(),
                billing_cycle: "monthly".to_string(),
                provider: Some("sandbox".to_string()),
                current_period_start: now,
                current_period_end: now + chrono::Duration::days(30),
            })
            .await
            .unwrap();
        checker.invalidate_user(&user).await;

        assert!(throttle.check_user(user).await.is_ok());
        assert_eq!(throttle.limiter_count().await, 1);
    }
}
