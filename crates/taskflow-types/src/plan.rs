//! Plan catalog types: limits, feature flags and pricing per tier

use serde::{Deserialize, Serialize};

use crate::{BillingCycle, Tier, TypeError};

/// Bytes per megabyte used for storage accounting
pub const BYTES_PER_MB: f64 = 1_048_576.0;

/// Raw value that marks a limit as uncapped
pub const UNLIMITED: i64 = -1;

/// A numeric plan limit.
///
/// Serialises as the raw integer, `-1` meaning unlimited, so wire payloads
/// match the stored column values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Limit {
    Unlimited,
    Capped(u64),
}

impl Limit {
    /// Build a limit from its stored representation
    pub fn from_raw(raw: i64) -> Result<Self, TypeError> {
        match raw {
            UNLIMITED => Ok(Self::Unlimited),
            n if n >= 0 => Ok(Self::Capped(n as u64)),
            n => Err(TypeError::InvalidLimit(n)),
        }
    }

    /// Stored representation
    pub fn raw(&self) -> i64 {
        match self {
            Self::Unlimited => UNLIMITED,
            Self::Capped(n) => i64::try_from(*n).unwrap_or(i64::MAX),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, Self::Unlimited)
    }

    /// True while another unit may be consumed: `used < limit`.
    ///
    /// The action that brings `used` up to the limit is the last one allowed.
    pub fn has_room(&self, used: f64) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Capped(limit) => used < *limit as f64,
        }
    }

    /// True if `used + amount` stays within the limit
    pub fn fits(&self, used: f64, amount: f64) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Capped(limit) => used + amount <= *limit as f64,
        }
    }

    /// `round(used / limit * 100)`, capped at 100. Zero when unlimited.
    pub fn percentage(&self, used: f64) -> u32 {
        match self {
            Self::Unlimited => 0,
            Self::Capped(0) => {
                if used > 0.0 {
                    100
                } else {
                    0
                }
            }
            Self::Capped(limit) => {
                let pct = (used / *limit as f64 * 100.0).round();
                pct.clamp(0.0, 100.0) as u32
            }
        }
    }
}

impl Default for Limit {
    /// Missing limits gate the resource completely rather than leaving it open.
    fn default() -> Self {
        Self::Capped(0)
    }
}

impl TryFrom<i64> for Limit {
    type Error = TypeError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        Self::from_raw(raw)
    }
}

impl From<Limit> for i64 {
    fn from(limit: Limit) -> Self {
        limit.raw()
    }
}

impl std::fmt::Display for Limit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unlimited => f.write_str("unlimited"),
            Self::Capped(n) => write!(f, "{n}"),
        }
    }
}

/// Metered resources tracked in the usage ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Tasks,
    AiRequests,
    Notes,
    MeetingSummaries,
    /// Tracked in megabytes; quantities handed to the ledger are bytes
    Storage,
}

impl ResourceType {
    pub const ALL: [ResourceType; 5] = [
        ResourceType::Tasks,
        ResourceType::AiRequests,
        ResourceType::Notes,
        ResourceType::MeetingSummaries,
        ResourceType::Storage,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tasks => "tasks",
            Self::AiRequests => "ai_requests",
            Self::Notes => "notes",
            Self::MeetingSummaries => "meeting_summaries",
            Self::Storage => "storage",
        }
    }

    /// Name of the plan limit field for this resource
    pub const fn limit_key(&self) -> &'static str {
        match self {
            Self::Tasks => "max_tasks_per_month",
            Self::AiRequests => "max_ai_requests_per_month",
            Self::Notes => "max_notes_per_month",
            Self::MeetingSummaries => "max_meeting_summaries_per_month",
            Self::Storage => "max_storage_mb",
        }
    }

    /// Name of the usage counter for this resource
    pub const fn usage_key(&self) -> &'static str {
        match self {
            Self::Tasks => "tasks_used",
            Self::AiRequests => "ai_requests_used",
            Self::Notes => "notes_used",
            Self::MeetingSummaries => "meeting_summaries_used",
            Self::Storage => "storage_used_mb",
        }
    }

    /// Whether the counter is fractional (megabytes) rather than a count
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage)
    }

    /// Convert a raw quantity into the unit the counter is kept in.
    ///
    /// Storage quantities are bytes and become megabytes; counts pass through.
    pub fn to_ledger_units(&self, quantity: u64) -> f64 {
        if self.is_storage() {
            quantity as f64 / BYTES_PER_MB
        } else {
            quantity as f64
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task" | "tasks" => Ok(Self::Tasks),
            "ai_request" | "ai_requests" => Ok(Self::AiRequests),
            "note" | "notes" => Ok(Self::Notes),
            "meeting_summary" | "meeting_summaries" => Ok(Self::MeetingSummaries),
            "storage" => Ok(Self::Storage),
            other => Err(TypeError::InvalidResource(other.to_string())),
        }
    }
}

/// Boolean feature flags carried by a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    AiTaskDecomposition,
    MeetingSummarization,
    AdvancedAnalytics,
    TeamCollaboration,
    PrioritySupport,
    CustomIntegrations,
}

impl Feature {
    pub const ALL: [Feature; 6] = [
        Feature::AiTaskDecomposition,
        Feature::MeetingSummarization,
        Feature::AdvancedAnalytics,
        Feature::TeamCollaboration,
        Feature::PrioritySupport,
        Feature::CustomIntegrations,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AiTaskDecomposition => "ai_task_decomposition",
            Self::MeetingSummarization => "meeting_summarization",
            Self::AdvancedAnalytics => "advanced_analytics",
            Self::TeamCollaboration => "team_collaboration",
            Self::PrioritySupport => "priority_support",
            Self::CustomIntegrations => "custom_integrations",
        }
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Feature {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| TypeError::InvalidFeature(s.to_string()))
    }
}

/// Numeric limits for every metered resource.
///
/// Every resource has an explicit field; a field missing from a stored
/// document defaults to `Capped(0)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanLimits {
    pub max_tasks_per_month: Limit,
    pub max_ai_requests_per_month: Limit,
    pub max_notes_per_month: Limit,
    pub max_meeting_summaries_per_month: Limit,
    pub max_storage_mb: Limit,
}

impl PlanLimits {
    /// Limit for a resource
    pub fn get(&self, resource: ResourceType) -> Limit {
        match resource {
            ResourceType::Tasks => self.max_tasks_per_month,
            ResourceType::AiRequests => self.max_ai_requests_per_month,
            ResourceType::Notes => self.max_notes_per_month,
            ResourceType::MeetingSummaries => self.max_meeting_summaries_per_month,
            ResourceType::Storage => self.max_storage_mb,
        }
    }
}

/// Feature flags of a plan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanFeatures {
    pub ai_task_decomposition: bool,
    pub meeting_summarization: bool,
    pub advanced_analytics: bool,
    pub team_collaboration: bool,
    pub priority_support: bool,
    pub custom_integrations: bool,
}

impl PlanFeatures {
    pub fn has(&self, feature: Feature) -> bool {
        match feature {
            Feature::AiTaskDecomposition => self.ai_task_decomposition,
            Feature::MeetingSummarization => self.meeting_summarization,
            Feature::AdvancedAnalytics => self.advanced_analytics,
            Feature::TeamCollaboration => self.team_collaboration,
            Feature::PrioritySupport => self.priority_support,
            Feature::CustomIntegrations => self.custom_integrations,
        }
    }
}

/// A subscription tier definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub tier: Tier,
    pub name: String,
    /// Price per month in cents when billed monthly
    pub price_monthly_cents: i64,
    /// Price per year in cents when billed yearly
    pub price_yearly_cents: i64,
    pub currency: String,
    pub limits: PlanLimits,
    pub features: PlanFeatures,
}

impl Plan {
    /// Amount charged for one period of the given cycle
    pub fn price_cents(&self, cycle: BillingCycle) -> i64 {
        match cycle {
            BillingCycle::Monthly => self.price_monthly_cents,
            BillingCycle::Yearly => self.price_yearly_cents,
        }
    }

    pub fn limit(&self, resource: ResourceType) -> Limit {
        self.limits.get(resource)
    }

    pub fn has_feature(&self, feature: Feature) -> bool {
        self.features.has(feature)
    }

    /// The plan definition seeded at setup time for a tier.
    ///
    /// The migration seeds the same values; this copy backs the free-tier
    /// fallback when the store is unreachable.
    pub fn builtin(tier: Tier) -> Self {
        match tier {
            Tier::Free => Self {
                tier,
                name: "Free".to_string(),
                price_monthly_cents: 0,
                price_yearly_cents: 0,
                currency: "usd".to_string(),
                limits: PlanLimits {
                    max_tasks_per_month: Limit::Capped(50),
                    max_ai_requests_per_month: Limit::Capped(10),
                    max_notes_per_month: Limit::Capped(25),
                    max_meeting_summaries_per_month: Limit::Capped(0),
                    max_storage_mb: Limit::Capped(100),
                },
                features: PlanFeatures::default(),
            },
            Tier::Pro => Self {
                tier,
                name: "Pro".to_string(),
                price_monthly_cents: 1_200,
                price_yearly_cents: 12_000,
                currency: "usd".to_string(),
                limits: PlanLimits {
                    max_tasks_per_month: Limit::Unlimited,
                    max_ai_requests_per_month: Limit::Capped(500),
                    max_notes_per_month: Limit::Unlimited,
                    max_meeting_summaries_per_month: Limit::Capped(50),
                    max_storage_mb: Limit::Capped(10_240),
                },
                features: PlanFeatures {
                    ai_task_decomposition: true,
                    meeting_summarization: true,
                    advanced_analytics: true,
                    team_collaboration: false,
                    priority_support: true,
                    custom_integrations: false,
                },
            },
            Tier::Enterprise => Self {
                tier,
                name: "Enterprise".to_string(),
                price_monthly_cents: 4_900,
                price_yearly_cents: 49_000,
                currency: "usd".to_string(),
                limits: PlanLimits {
                    max_tasks_per_month: Limit::Unlimited,
                    max_ai_requests_per_month: Limit::Unlimited,
                    max_notes_per_month: Limit::Unlimited,
                    max_meeting_summaries_per_month: Limit::Unlimited,
                    max_storage_mb: Limit::Unlimited,
                },
                features: PlanFeatures {
                    ai_task_decomposition: true,
                    meeting_summarization: true,
                    advanced_analytics: true,
                    team_collaboration: true,
                    priority_support: true,
                    custom_integrations: true,
                },
            },
        }
    }
}
