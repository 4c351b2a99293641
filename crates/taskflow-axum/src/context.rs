//! Authentication context types.
//!
//! The [`AuthContext`] struct carries the authenticated caller's identity
//! to request handlers.

use taskflow_types::UserId;

/// Identity of an authenticated caller.
///
/// Populated by [`crate::AuthLayer`] from a validated session token. Plan and
/// quota data are not carried here; they are resolved per request by the
/// entitlement checker so that a subscription change applies immediately.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthContext {
    /// The authenticated user's ID.
    pub user_id: UserId,
    /// Email claim, when the provider includes one.
    pub email: Option<String>,
    /// Provider role claim (`authenticated`, `service_role`, ...).
    pub role: Option<String>,
}

impl AuthContext {
    /// Create a context for a user with no optional claims.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            email: None,
            role: None,
        }
    }

    /// Set the email claim.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Set the role claim.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_context_builder() {
        let user_id = UserId::new();
        let ctx = AuthContext::new(user_id)
            .with_email("ada@example.com")
            .with_role("authenticated");

        assert_eq!(ctx.user_id, user_id);
        assert_eq!(ctx.email.as_deref(), Some("ada@example.com"));
        assert_eq!(ctx.role.as_deref(), Some("authenticated"));
    }
}
