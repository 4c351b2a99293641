//! Billing service
//!
//! The only place subscription and transaction statuses change. Payment
//! confirmation and webhooks share one transition path, so re-delivered
//! events are no-ops: transactions dedupe on the provider payment-intent ID
//! and re-activating an active subscription changes nothing.
//!
//! Activation records the provider's subscription ID when the provider reports
//! one, so later provider-side events and cancellations can find the row.

use std::sync::Arc;

use chrono::{DateTime, Duration, Months, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use taskflow_db::{
    CreatePaymentMethod, CreateSubscription, CreateTransaction, Repositories, TransactionRow,
};
use taskflow_entitlement::EntitlementChecker;
use taskflow_types::{
    period_bounds, BillingCycle, PaymentIntent, PaymentMethod, PaymentMethodId, Subscription,
    SubscriptionStatus, Tier, TransactionStatus, UserId,
};

use crate::provider::{IntentRequest, PaymentProvider};
use crate::webhook::{
    InvoiceData, SubscriptionRef, WebhookEventData, WebhookEventType, WebhookHandler,
};
use crate::BillingError;

/// A new inactive subscription and the intent that will pay for it
#[derive(Debug, Clone)]
pub struct CreatedSubscription {
    pub subscription: Subscription,
    pub payment_intent: PaymentIntent,
}

/// Result of applying a payment outcome
#[derive(Debug, Clone)]
pub struct ConfirmOutcome {
    pub transaction_status: TransactionStatus,
    pub subscription: Option<Subscription>,
}

/// Result of a plan change request
#[derive(Debug, Clone)]
pub enum PlanChange {
    /// Moved to the free plan immediately
    Downgraded(Subscription),
    /// A paid plan awaits payment
    PaymentRequired(CreatedSubscription),
}

/// Add payment method input
#[derive(Debug, Clone)]
pub struct AddPaymentMethod {
    /// Provider token for the tokenized instrument
    pub token: String,
    pub set_default: bool,
}

/// Billing service
#[derive(Clone)]
pub struct BillingService {
    repos: Repositories,
    provider: Arc<dyn PaymentProvider>,
    webhooks: WebhookHandler,
    entitlements: EntitlementChecker,
}

impl BillingService {
    /// Create a new billing service
    pub fn new(
        repos: Repositories,
        provider: Arc<dyn PaymentProvider>,
        webhooks: WebhookHandler,
        entitlements: EntitlementChecker,
    ) -> Self {
        Self {
            repos,
            provider,
            webhooks,
            entitlements,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Most recent subscription for a user, whatever its status
    pub async fn get_subscription(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, BillingError> {
        self.repos
            .subscriptions
            .find_latest_by_user_id(user_id.0)
            .await?
            .map(|row| row.into_subscription())
            .transpose()
            .map_err(Into::into)
    }

    /// The active subscription, creating a free one if there is none
    #[instrument(skip(self, user_id), fields(user_id = %user_id))]
    pub async fn ensure_default_subscription(
        &self,
        user_id: &UserId,
    ) -> Result<Subscription, BillingError> {
        if let Some(row) = self
            .repos
            .subscriptions
            .find_active_by_user_id(user_id.0)
            .await?
        {
            return Ok(row.into_subscription()?);
        }

        let (period_start, period_end) = period_bounds(Utc::now());
        let row = self
            .repos
            .subscriptions
            .create(CreateSubscription {
                id: Uuid::new_v4(),
                user_id: user_id.0,
                tier: Tier::Free.as_str().to_string(),
                status: SubscriptionStatus::Active.as_str().to_string(),
                billing_cycle: BillingCycle::Monthly.as_str().to_string(),
                provider: None,
                current_period_start: period_start,
                current_period_end: period_end,
            })
            .await?;

        self.entitlements.invalidate_user(user_id).await;
        info!("Default free subscription created");
        Ok(row.into_subscription()?)
    }

    /// Start a paid subscription: inactive row, provider intent, pending transaction
    #[instrument(skip(self, user_id), fields(user_id = %user_id))]
    pub async fn create_subscription(
        &self,
        user_id: &UserId,
        tier: Tier,
        billing_cycle: BillingCycle,
    ) -> Result<CreatedSubscription, BillingError> {
        if !tier.is_paid() {
            return Err(BillingError::InvalidTier(format!(
                "{tier} does not require payment"
            )));
        }

        let plan = self.entitlements.catalog().get_plan(tier).await?;
        let amount_cents = plan.price_cents(billing_cycle);
        let now = Utc::now();

        let row = self
            .repos
            .subscriptions
            .create(CreateSubscription {
                id: Uuid::new_v4(),
                user_id: user_id.0,
                tier: tier.as_str().to_string(),
                status: SubscriptionStatus::Inactive.as_str().to_string(),
                billing_cycle: billing_cycle.as_str().to_string(),
                provider: Some(self.provider.name().to_string()),
                current_period_start: now,
                current_period_end: period_end(now, billing_cycle),
            })
            .await?;
        let subscription = row.into_subscription()?;

        let payment_intent = self
            .provider
            .create_payment_intent(&IntentRequest {
                amount_cents,
                currency: plan.currency.clone(),
                user_id: *user_id,
                subscription_id: subscription.id,
                tier,
            })
            .await?;

        self.repos
            .transactions
            .create(CreateTransaction {
                id: Uuid::new_v4(),
                user_id: user_id.0,
                subscription_id: Some(subscription.id.0),
                amount_cents,
                currency: plan.currency,
                provider: self.provider.name().to_string(),
                provider_payment_intent_id: payment_intent.id.clone(),
                status: TransactionStatus::Pending.as_str().to_string(),
            })
            .await?;

        info!(
            subscription_id = %subscription.id,
            intent_id = %payment_intent.id,
            amount_cents,
            "Subscription created, awaiting payment"
        );

        Ok(CreatedSubscription {
            subscription,
            payment_intent,
        })
    }

    /// Ask the provider how a payment went and apply the outcome
    #[instrument(skip(self, user_id), fields(user_id = %user_id))]
    pub async fn confirm_payment(
        &self,
        user_id: &UserId,
        intent_id: &str,
    ) -> Result<ConfirmOutcome, BillingError> {
        let tx = self
            .find_transaction(intent_id)
            .await?
            .filter(|tx| tx.user_id == user_id.0)
            .ok_or(BillingError::TransactionNotFound)?;

        let intent = self.provider.retrieve_payment_intent(intent_id).await?;
        debug!(status = ?intent.status, "Payment intent retrieved");

        self.apply_payment_outcome(
            tx,
            intent.status.is_success(),
            intent.provider_subscription_id.as_deref(),
        )
        .await
    }

    /// Cancel the user's active subscription; they fall back to free
    #[instrument(skip(self, user_id), fields(user_id = %user_id))]
    pub async fn cancel_subscription(
        &self,
        user_id: &UserId,
    ) -> Result<Subscription, BillingError> {
        let sub = self
            .repos
            .subscriptions
            .find_active_by_user_id(user_id.0)
            .await?
            .ok_or(BillingError::SubscriptionNotFound)?
            .into_subscription()?;

        if let Some(provider_id) = &sub.provider_subscription_id {
            self.provider.cancel_subscription(provider_id).await?;
        }

        let canceled = self.transition(&sub, SubscriptionStatus::Canceled).await?;
        info!(subscription_id = %sub.id, "Subscription canceled");
        Ok(canceled)
    }

    /// Move to another tier: free applies at once, paid tiers need payment
    pub async fn change_plan(
        &self,
        user_id: &UserId,
        tier: Tier,
        billing_cycle: BillingCycle,
    ) -> Result<PlanChange, BillingError> {
        if tier.is_paid() {
            let created = self.create_subscription(user_id, tier, billing_cycle).await?;
            return Ok(PlanChange::PaymentRequired(created));
        }

        if let Some(row) = self
            .repos
            .subscriptions
            .find_active_by_user_id(user_id.0)
            .await?
        {
            if row.into_subscription()?.tier.is_paid() {
                self.cancel_subscription(user_id).await?;
            }
        }

        Ok(PlanChange::Downgraded(
            self.ensure_default_subscription(user_id).await?,
        ))
    }

    // ========================================================================
    // Webhooks
    // ========================================================================

    /// Verify a provider callback and apply it.
    ///
    /// Nothing is read or written before the signature checks out. Events that
    /// cannot be matched to our records, or that would make an illegal
    /// transition, are logged and acknowledged.
    #[instrument(skip(self, payload, signature))]
    pub async fn process_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookEventType, BillingError> {
        let event = self.webhooks.verify_and_parse(payload, signature)?;
        info!(
            event_id = %event.id,
            event_type = event.event_type.label(),
            created = event.created,
            "Processing webhook"
        );

        let result = match event.data {
            WebhookEventData::PaymentIntent(data) => {
                let succeeded = event.event_type == WebhookEventType::PaymentIntentSucceeded;
                let tx = match self.find_transaction(&data.intent_id).await? {
                    Some(tx) => Some(tx),
                    None => match data.user_id {
                        Some(user_id) => Some(
                            self.repos
                                .transactions
                                .create(CreateTransaction {
                                    id: Uuid::new_v4(),
                                    user_id,
                                    subscription_id: data.subscription_id,
                                    amount_cents: data.amount_cents,
                                    currency: data.currency,
                                    provider: self.provider.name().to_string(),
                                    provider_payment_intent_id: data.intent_id.clone(),
                                    status: TransactionStatus::Pending.as_str().to_string(),
                                })
                                .await?,
                        ),
                        None => None,
                    },
                };
                match tx {
                    Some(tx) => {
                        let link = match data.provider_subscription_id {
                            Some(id) => Some(id),
                            None if succeeded => self.provider_link(&data.intent_id).await,
                            None => None,
                        };
                        self.apply_payment_outcome(tx, succeeded, link.as_deref())
                            .await
                            .map(drop)
                    }
                    None => {
                        warn!(intent_id = %data.intent_id, "Payment intent matches no transaction");
                        Ok(())
                    }
                }
            }
            WebhookEventData::Invoice(invoice) => {
                match self.resolve_subscription(&invoice.subscription).await? {
                    Some(sub) if event.event_type == WebhookEventType::InvoicePaid => {
                        self.renew(sub, &invoice).await
                    }
                    Some(sub) if sub.status == SubscriptionStatus::Active => self
                        .transition(&sub, SubscriptionStatus::PastDue)
                        .await
                        .map(drop),
                    Some(sub) => {
                        debug!(status = %sub.status, "Invoice event leaves subscription unchanged");
                        Ok(())
                    }
                    None => {
                        warn!(
                            object_id = %invoice.subscription.object_id,
                            "Invoice matches no subscription"
                        );
                        Ok(())
                    }
                }
            }
            WebhookEventData::Subscription(reference) => {
                match self.resolve_subscription(&reference).await? {
                    Some(sub) => self
                        .transition(&sub, SubscriptionStatus::Canceled)
                        .await
                        .map(drop),
                    None => {
                        warn!(object_id = %reference.object_id, "Deleted subscription is unknown");
                        Ok(())
                    }
                }
            }
            WebhookEventData::Charge(charge) => {
                let next = if event.event_type == WebhookEventType::ChargeRefunded {
                    TransactionStatus::Refunded
                } else {
                    TransactionStatus::Disputed
                };
                let tx = match &charge.payment_intent_id {
                    Some(intent_id) => self.find_transaction(intent_id).await?,
                    None => None,
                };
                match tx {
                    Some(tx) => self.move_transaction(&tx, next).await.map(drop),
                    None => {
                        warn!(object_id = %charge.object_id, "Charge matches no transaction");
                        Ok(())
                    }
                }
            }
            WebhookEventData::Raw(_) => Ok(()),
        };

        match result {
            Ok(()) => Ok(event.event_type),
            Err(BillingError::InvalidTransition { from, to }) => {
                warn!(%from, %to, event_id = %event.id, "Ignoring webhook with illegal transition");
                Ok(event.event_type)
            }
            Err(e) => Err(e),
        }
    }

    // ========================================================================
    // Payment methods
    // ========================================================================

    /// Save a tokenized method; the first one becomes the default
    #[instrument(skip(self, user_id, request), fields(user_id = %user_id))]
    pub async fn add_payment_method(
        &self,
        user_id: &UserId,
        request: AddPaymentMethod,
    ) -> Result<PaymentMethod, BillingError> {
        let card = self.provider.describe_payment_method(&request.token).await?;
        let existing = self.repos.payment_methods.list_by_user(user_id.0).await?;
        let is_default = existing.is_empty() || request.set_default;

        let row = self
            .repos
            .payment_methods
            .create(CreatePaymentMethod {
                id: Uuid::new_v4(),
                user_id: user_id.0,
                provider: self.provider.name().to_string(),
                provider_token: request.token,
                provider_customer_id: card.customer_id,
                last_four: card.last_four,
                brand: card.brand,
                exp_month: card.exp_month.and_then(|m| i32::try_from(m).ok()),
                exp_year: card.exp_year.and_then(|y| i32::try_from(y).ok()),
                is_default,
            })
            .await?;

        if is_default && !existing.is_empty() {
            self.repos
                .payment_methods
                .set_default(user_id.0, row.id)
                .await?;
        }

        Ok(row.into_method())
    }

    /// The user's saved methods, default first
    pub async fn list_payment_methods(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<PaymentMethod>, BillingError> {
        Ok(self
            .repos
            .payment_methods
            .list_by_user(user_id.0)
            .await?
            .into_iter()
            .map(|row| row.into_method())
            .collect())
    }

    /// Delete a method; removing the default promotes the newest remaining one
    #[instrument(skip(self, user_id), fields(user_id = %user_id))]
    pub async fn remove_payment_method(
        &self,
        user_id: &UserId,
        method_id: PaymentMethodId,
    ) -> Result<(), BillingError> {
        let row = self
            .repos
            .payment_methods
            .find_by_id(method_id.0)
            .await?
            .filter(|m| m.user_id == user_id.0)
            .ok_or(BillingError::PaymentMethodNotFound)?;

        self.repos.payment_methods.delete(row.id).await?;

        if row.is_default {
            let remaining = self.repos.payment_methods.list_by_user(user_id.0).await?;
            if let Some(next) = remaining.into_iter().max_by_key(|m| m.created_at) {
                self.repos
                    .payment_methods
                    .set_default(user_id.0, next.id)
                    .await?;
            }
        }

        Ok(())
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    async fn find_transaction(
        &self,
        intent_id: &str,
    ) -> Result<Option<TransactionRow>, BillingError> {
        Ok(self
            .repos
            .transactions
            .find_by_intent_id(self.provider.name(), intent_id)
            .await?)
    }

    async fn load_subscription(&self, id: Uuid) -> Result<Subscription, BillingError> {
        self.repos
            .subscriptions
            .find_by_id(id)
            .await?
            .ok_or(BillingError::SubscriptionNotFound)?
            .into_subscription()
            .map_err(Into::into)
    }

    async fn resolve_subscription(
        &self,
        reference: &SubscriptionRef,
    ) -> Result<Option<Subscription>, BillingError> {
        let row = match (&reference.provider_subscription_id, reference.subscription_id) {
            (Some(provider_id), _) => {
                let by_provider = self
                    .repos
                    .subscriptions
                    .find_by_provider_id(provider_id)
                    .await?;
                match (by_provider, reference.subscription_id) {
                    (Some(row), _) => Some(row),
                    (None, Some(id)) => self.repos.subscriptions.find_by_id(id).await?,
                    (None, None) => None,
                }
            }
            (None, Some(id)) => self.repos.subscriptions.find_by_id(id).await?,
            (None, None) => None,
        };
        row.map(|r| r.into_subscription())
            .transpose()
            .map_err(Into::into)
    }

    /// Move a transaction forward; illegal moves are logged and skipped
    async fn move_transaction(
        &self,
        tx: &TransactionRow,
        next: TransactionStatus,
    ) -> Result<TransactionStatus, BillingError> {
        let current: TransactionStatus = tx.status.parse()?;
        if current == next {
            return Ok(current);
        }
        if !current.can_transition_to(next) {
            warn!(transaction_id = %tx.id, %current, %next, "Ignoring transaction status change");
            return Ok(current);
        }
        if !self
            .repos
            .transactions
            .transition_status(tx.id, current.as_str(), next.as_str())
            .await?
        {
            debug!(transaction_id = %tx.id, "Transaction already moved by a concurrent delivery");
        }
        Ok(next)
    }

    /// Provider subscription behind an intent, asked of the provider directly.
    /// Best effort: activation goes ahead unlinked if the lookup fails.
    async fn provider_link(&self, intent_id: &str) -> Option<String> {
        match self.provider.retrieve_payment_intent(intent_id).await {
            Ok(intent) => intent.provider_subscription_id,
            Err(e) => {
                warn!(intent_id, error = %e, "Could not look up provider subscription");
                None
            }
        }
    }

    /// A paid invoice: recover from past-due and move onto the invoiced period
    async fn renew(&self, sub: Subscription, invoice: &InvoiceData) -> Result<(), BillingError> {
        let sub = match sub.status {
            SubscriptionStatus::PastDue => {
                self.transition(&sub, SubscriptionStatus::Active).await?
            }
            SubscriptionStatus::Active => sub,
            status => {
                debug!(%status, "Paid invoice leaves subscription unchanged");
                return Ok(());
            }
        };

        let (start, end) = match invoice.period {
            Some(period) => period,
            // Without line periods, roll forward once the current period is over.
            None if sub.current_period_end <= Utc::now() => (
                sub.current_period_end,
                period_end(sub.current_period_end, sub.billing_cycle),
            ),
            None => return Ok(()),
        };

        if end > sub.current_period_end {
            self.repos
                .subscriptions
                .update_period(sub.id.0, start, end)
                .await?;
            info!(subscription_id = %sub.id, period_end = %end, "Subscription renewed");
        }
        Ok(())
    }

    async fn apply_payment_outcome(
        &self,
        tx: TransactionRow,
        succeeded: bool,
        provider_subscription_id: Option<&str>,
    ) -> Result<ConfirmOutcome, BillingError> {
        let target = if succeeded {
            TransactionStatus::Completed
        } else {
            TransactionStatus::Failed
        };
        let transaction_status = self.move_transaction(&tx, target).await?;

        let subscription = match tx.subscription_id {
            Some(id) => {
                let mut sub = self.load_subscription(id).await?;
                if transaction_status == TransactionStatus::Completed {
                    if let Some(link) = provider_subscription_id {
                        if sub.provider_subscription_id.as_deref() != Some(link) {
                            self.repos
                                .subscriptions
                                .set_provider_subscription_id(id, self.provider.name(), link)
                                .await?;
                            debug!(
                                subscription_id = %sub.id,
                                provider_subscription_id = link,
                                "Subscription linked"
                            );
                            sub = self.load_subscription(id).await?;
                        }
                    }
                    Some(self.transition(&sub, SubscriptionStatus::Active).await?)
                } else {
                    Some(sub)
                }
            }
            None => None,
        };

        Ok(ConfirmOutcome {
            transaction_status,
            subscription,
        })
    }

    /// Apply a subscription status change and refresh cached entitlements
    async fn transition(
        &self,
        sub: &Subscription,
        next: SubscriptionStatus,
    ) -> Result<Subscription, BillingError> {
        if sub.status == next {
            return Ok(sub.clone());
        }
        if !sub.status.can_transition_to(next) {
            return Err(BillingError::InvalidTransition {
                from: sub.status,
                to: next,
            });
        }

        let subs = &self.repos.subscriptions;
        match next {
            SubscriptionStatus::Active => {
                // One active subscription per user.
                let replaced = subs.cancel_active_except(sub.user_id.0, sub.id.0).await?;
                subs.update_status(sub.id.0, next.as_str()).await?;
                info!(subscription_id = %sub.id, tier = %sub.tier, replaced, "Subscription activated");
            }
            SubscriptionStatus::Canceled => subs.cancel(sub.id.0).await?,
            _ => subs.update_status(sub.id.0, next.as_str()).await?,
        }

        self.entitlements.invalidate_user(&sub.user_id).await;
        self.load_subscription(sub.id.0).await
    }
}

impl std::fmt::Debug for BillingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BillingService")
            .field("provider", &self.provider.name())
            .finish_non_exhaustive()
    }
}

fn period_end(start: DateTime<Utc>, cycle: BillingCycle) -> DateTime<Utc> {
    start
        .checked_add_months(Months::new(cycle.months()))
        .unwrap_or_else(|| start + Duration::days(30 * i64::from(cycle.months())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskflow_db::memory::MemoryStore;
    use taskflow_entitlement::{PlanCatalog, UsageLedger};
    use taskflow_types::IntentStatus;

    use crate::SandboxProvider;

    fn service(store: &MemoryStore, provider: SandboxProvider) -> BillingService {
        let repos = Repositories::memory(store.clone());
        let checker = EntitlementChecker::new(
            PlanCatalog::new(repos.plans.clone()),
            UsageLedger::new(repos.usage.clone()),
            repos.subscriptions.clone(),
        );
        BillingService::new(
            repos,
            Arc::new(provider),
            WebhookHandler::new("whsec_test"),
            checker,
        )
    }

    #[test]
    fn yearly_period_spans_twelve_months() {
        let start = "2026-01-31T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let end = period_end(start, BillingCycle::Yearly);
        assert_eq!(end, "2027-01-31T00:00:00Z".parse::<DateTime<Utc>>().unwrap());
    }

    #[tokio::test]
    async fn create_subscription_charges_plan_price() {
        let store = MemoryStore::seeded();
        let billing = service(&store, SandboxProvider::new());
        let user = UserId::new();

        let created = billing
            .create_subscription(&user, Tier::Pro, BillingCycle::Yearly)
            .await
            .unwrap();
        assert_eq!(created.payment_intent.amount_cents, 12_000);
        assert_eq!(created.subscription.status, SubscriptionStatus::Inactive);
        assert_eq!(store.transaction_count(), 1);
    }

    #[tokio::test]
    async fn free_tier_cannot_be_purchased() {
        let store = MemoryStore::seeded();
        let billing = service(&store, SandboxProvider::new());
        let err = billing
            .create_subscription(&UserId::new(), Tier::Free, BillingCycle::Monthly)
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::InvalidTier(_)));
    }

    #[tokio::test]
    async fn confirm_activates_and_replaces_free_plan() {
        let store = MemoryStore::seeded();
        let billing = service(&store, SandboxProvider::new());
        let user = UserId::new();
        let free = billing.ensure_default_subscription(&user).await.unwrap();

        let created = billing
            .create_subscription(&user, Tier::Pro, BillingCycle::Monthly)
            .await
            .unwrap();
        let outcome = billing
            .confirm_payment(&user, &created.payment_intent.id)
            .await
            .unwrap();

        assert_eq!(outcome.transaction_status, TransactionStatus::Completed);
        assert_eq!(
            outcome.subscription.unwrap().status,
            SubscriptionStatus::Active
        );

        let subs = store.subscriptions_for(user.0);
        let active: Vec<_> = subs.iter().filter(|s| s.status == "active").collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].tier, "pro");
        assert!(subs.iter().any(|s| s.id == free.id.0 && s.status == "canceled"));
    }

    #[tokio::test]
    async fn unsuccessful_intent_marks_failed() {
        let store = MemoryStore::seeded();
        let provider = SandboxProvider::with_initial_status(IntentStatus::RequiresPaymentMethod);
        let billing = service(&store, provider);
        let user = UserId::new();

        let created = billing
            .create_subscription(&user, Tier::Enterprise, BillingCycle::Monthly)
            .await
            .unwrap();
        let outcome = billing
            .confirm_payment(&user, &created.payment_intent.id)
            .await
            .unwrap();

        assert_eq!(outcome.transaction_status, TransactionStatus::Failed);
        assert_eq!(
            outcome.subscription.unwrap().status,
            SubscriptionStatus::Inactive
        );
    }

    #[tokio::test]
    async fn confirm_links_and_cancel_reaches_provider() {
        let store = MemoryStore::seeded();
        let provider = SandboxProvider::new();
        let billing = service(&store, provider.clone());
        let user = UserId::new();

        let created = billing
            .create_subscription(&user, Tier::Pro, BillingCycle::Monthly)
            .await
            .unwrap();
        let outcome = billing
            .confirm_payment(&user, &created.payment_intent.id)
            .await
            .unwrap();
        let link = outcome.subscription.unwrap().provider_subscription_id.unwrap();
        assert_eq!(
            created.payment_intent.provider_subscription_id.as_deref(),
            Some(link.as_str())
        );

        let canceled = billing.cancel_subscription(&user).await.unwrap();
        assert_eq!(canceled.status, SubscriptionStatus::Canceled);
        assert!(provider.is_canceled(&link));
    }

    #[tokio::test]
    async fn confirm_is_scoped_to_owner() {
        let store = MemoryStore::seeded();
        let billing = service(&store, SandboxProvider::new());
        let created = billing
            .create_subscription(&UserId::new(), Tier::Pro, BillingCycle::Monthly)
            .await
            .unwrap();

        let err = billing
            .confirm_payment(&UserId::new(), &created.payment_intent.id)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn downgrade_cancels_paid_plan() {
        let store = MemoryStore::seeded();
        let billing = service(&store, SandboxProvider::new());
        let user = UserId::new();
        let created = billing
            .create_subscription(&user, Tier::Pro, BillingCycle::Monthly)
            .await
            .unwrap();
        billing
            .confirm_payment(&user, &created.payment_intent.id)
            .await
            .unwrap();

        let change = billing
            .change_plan(&user, Tier::Free, BillingCycle::Monthly)
            .await
            .unwrap();
        match change {
            PlanChange::Downgraded(sub) => {
                assert_eq!(sub.tier, Tier::Free);
                assert_eq!(sub.status, SubscriptionStatus::Active);
            }
            other => panic!("unexpected change: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancel_without_active_subscription_is_not_found() {
        let store = MemoryStore::seeded();
        let billing = service(&store, SandboxProvider::new());
        let err = billing
            .cancel_subscription(&UserId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::SubscriptionNotFound));
    }

    #[tokio::test]
    async fn payment_method_defaults() {
        let store = MemoryStore::seeded();
        let billing = service(&store, SandboxProvider::new());
        let user = UserId::new();

        let first = billing
            .add_payment_method(
                &user,
                AddPaymentMethod {
                    token: "pm_card_visa".into(),
                    set_default: false,
                },
            )
            .await
            .unwrap();
        assert!(first.is_default);
        assert_eq!(first.last_four.as_deref(), Some("4242"));

        let second = billing
            .add_payment_method(
                &user,
                AddPaymentMethod {
                    token: "pm_card_mastercard".into(),
                    set_default: true,
                },
            )
            .await
            .unwrap();

        let methods = billing.list_payment_methods(&user).await.unwrap();
        assert_eq!(methods.len(), 2);
        assert_eq!(methods[0].id, second.id);
        assert!(methods[0].is_default);
        assert!(!methods[1].is_default);

        billing.remove_payment_method(&user, second.id).await.unwrap();
        let methods = billing.list_payment_methods(&user).await.unwrap();
        assert_eq!(methods.len(), 1);
        assert!(methods[0].is_default);
    }

    #[tokio::test]
    async fn cannot_remove_someone_elses_method() {
        let store = MemoryStore::seeded();
        let billing = service(&store, SandboxProvider::new());
        let owner = UserId::new();
        let method = billing
            .add_payment_method(
                &owner,
                AddPaymentMethod {
                    token: "pm_card_amex".into(),
                    set_default: false,
                },
            )
            .await
            .unwrap();

        let err = billing
            .remove_payment_method(&UserId::new(), method.id)
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::PaymentMethodNotFound));
        assert_eq!(billing.list_payment_methods(&owner).await.unwrap().len(), 1);
    }
}
