//! Configuration for the TaskFlow API service.

use std::time::Duration;

use taskflow_billing_core::{BillingConfig, ProviderKind};

/// Value of `DATABASE_URL` that selects the in-memory store
pub const MEMORY_DATABASE_URL: &str = "memory://";

/// Hosted auth/database provider settings
#[derive(Clone)]
pub struct SupabaseConfig {
    pub url: Option<String>,
    pub anon_key: Option<String>,
    pub service_role_key: Option<String>,
    /// HS256 secret that signs session tokens
    pub jwt_secret: String,
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("anon_key", &self.anon_key.as_ref().map(|_| "[REDACTED]"))
            .field(
                "service_role_key",
                &self.service_role_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("jwt_secret", &"[REDACTED]")
            .finish()
    }
}

/// AI provider settings (OpenAI-compatible chat completions)
#[derive(Clone)]
pub struct AiConfig {
    pub api_key: Option<String>,
    pub api_url: String,
    pub model: String,
}

impl std::fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .finish()
    }
}

/// TaskFlow API configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub http_port: u16,
    /// Database URL, or `memory://`
    pub database_url: String,
    pub supabase: SupabaseConfig,
    pub ai: AiConfig,
    /// Billing core configuration
    pub billing: BillingConfig,
    /// Request timeout
    pub request_timeout: Duration,
    /// Metrics enabled
    pub metrics_enabled: bool,
    /// How long a resolved tier is cached per user
    pub entitlement_cache: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &'static str| var(key).ok_or(ConfigError::Missing(key));

        // Database
        let database_url = required("DATABASE_URL")?;

        // Server
        let http_port = var("HTTP_PORT")
            .unwrap_or_else(|| "8080".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("HTTP_PORT"))?;

        let request_timeout_secs: u64 = var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|| "30".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("REQUEST_TIMEOUT_SECS"))?;

        let entitlement_cache_secs: u64 = var("ENTITLEMENT_CACHE_SECS")
            .unwrap_or_else(|| "60".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("ENTITLEMENT_CACHE_SECS"))?;

        // Metrics
        let metrics_enabled = var("METRICS_ENABLED")
            .unwrap_or_else(|| "true".to_string())
            .parse()
            .unwrap_or(true);

        // Auth
        let supabase = SupabaseConfig {
            url: var("SUPABASE_URL"),
            anon_key: var("SUPABASE_ANON_KEY"),
            service_role_key: var("SUPABASE_SERVICE_ROLE_KEY"),
            jwt_secret: required("SUPABASE_JWT_SECRET")?,
        };

        // AI
        let ai = AiConfig {
            api_key: var("AI_API_KEY"),
            api_url: var("AI_API_URL").unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: var("AI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
        };

        // Payments
        let provider: ProviderKind = var("PAYMENT_PROVIDER")
            .unwrap_or_else(|| "stripe".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("PAYMENT_PROVIDER"))?;

        let billing = match provider {
            ProviderKind::Stripe => BillingConfig::new(
                provider,
                required("STRIPE_SECRET_KEY")?,
                required("STRIPE_WEBHOOK_SECRET")?,
            ),
            ProviderKind::Sandbox => {
                BillingConfig::new(provider, "", required("SANDBOX_WEBHOOK_SECRET")?)
            }
        };

        Ok(Self {
            http_port,
            database_url,
            supabase,
            ai,
            billing,
            request_timeout: Duration::from_secs(request_timeout_secs),
            metrics_enabled,
            entitlement_cache: Duration::from_secs(entitlement_cache_secs),
        })
    }

    /// Whether the in-memory store was requested
    pub fn uses_memory_store(&self) -> bool {
        self.database_url == MEMORY_DATABASE_URL
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
