//! Subscription lifecycle

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use suite_common::TenantId;

use crate::plans::{BillingCycle, Plan, PlanCatalog};
use crate::proration::{ProrationEngine, ProrationResult, ProrationStrategy};
use crate::BillingError;

/// A tenant's subscription to a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    /// Subscription id
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Subscribed plan
    pub plan_id: String,
    /// Lifecycle status
    pub status: SubscriptionStatus,
    /// Billing cycle, copied from the plan at creation
    pub cycle: BillingCycle,
    /// Start of the current billing period
    pub current_period_start: DateTime<Utc>,
    /// End of the current billing period
    pub current_period_end: DateTime<Utc>,
    /// Trial end, when trialing
    pub trial_end: Option<DateTime<Utc>>,
    /// Cancel when the current period ends instead of immediately
    pub cancel_at_period_end: bool,
    /// When the subscription was cancelled
    pub canceled_at: Option<DateTime<Utc>>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Subscription status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Paid and current
    Active,
    /// In a trial period
    Trialing,
    /// Payment failed
    PastDue,
    /// Cancelled
    Cancelled,
}

/// Outcome of a plan change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanChange {
    /// Subscription that changed
    pub subscription_id: Uuid,
    /// Previous plan id
    pub old_plan: String,
    /// New plan id
    pub new_plan: String,
    /// Proration settlement for the change
    pub proration: ProrationResult,
    /// When the new plan takes effect
    pub effective_at: DateTime<Utc>,
}

/// Subscription manager
///
/// At most one subscription is current per tenant: creating a new one
/// cancels the previous current subscription in the same call.
pub struct SubscriptionManager {
    subscriptions: Arc<RwLock<HashMap<Uuid, Subscription>>>,
    proration: ProrationEngine,
}

impl SubscriptionManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self {
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            proration: ProrationEngine::new(),
        }
    }

    /// Subscribe a tenant to a plan, replacing any current subscription.
    pub fn create(&self, tenant_id: TenantId, plan: &Plan) -> Subscription {
        let now = Utc::now();
        let subscription = Subscription {
            id: Uuid::new_v4(),
            tenant_id,
            plan_id: plan.id.clone(),
            status: SubscriptionStatus::Active,
            cycle: plan.cycle,
            current_period_start: now,
            current_period_end: now + Duration::days(plan.cycle.days_in_cycle()),
            trial_end: None,
            cancel_at_period_end: false,
            canceled_at: None,
            created_at: now,
        };

        let mut subs = self.subscriptions.write();
        Self::cancel_current_locked(&mut subs, tenant_id, now);
        subs.insert(subscription.id, subscription.clone());
        subscription
    }

    /// Start a trial on a plan, replacing any current subscription.
    pub fn start_trial(&self, tenant_id: TenantId, plan: &Plan, days: u32) -> Subscription {
        let now = Utc::now();
        let trial_end = now + Duration::days(i64::from(days));
        let subscription = Subscription {
            id: Uuid::new_v4(),
            tenant_id,
            plan_id: plan.id.clone(),
            status: SubscriptionStatus::Trialing,
            cycle: plan.cycle,
            current_period_start: now,
            current_period_end: trial_end,
            trial_end: Some(trial_end),
            cancel_at_period_end: false,
            canceled_at: None,
            created_at: now,
        };

        let mut subs = self.subscriptions.write();
        Self::cancel_current_locked(&mut subs, tenant_id, now);
        subs.insert(subscription.id, subscription.clone());
        subscription
    }

    fn cancel_current_locked(
        subs: &mut HashMap<Uuid, Subscription>,
        tenant_id: TenantId,
        now: DateTime<Utc>,
    ) {
        for sub in subs.values_mut() {
            if sub.tenant_id == tenant_id && sub.status != SubscriptionStatus::Cancelled {
                sub.status = SubscriptionStatus::Cancelled;
                sub.canceled_at = Some(now);
            }
        }
    }

    /// Get a subscription by id.
    pub fn get(&self, id: Uuid) -> Option<Subscription> {
        self.subscriptions.read().get(&id).cloned()
    }

    /// The tenant's current (non-cancelled) subscription.
    pub fn current_for(&self, tenant_id: TenantId) -> Option<Subscription> {
        self.subscriptions
            .read()
            .values()
            .find(|s| s.tenant_id == tenant_id && s.status != SubscriptionStatus::Cancelled)
            .cloned()
    }

    /// Switch a subscription to a new plan and settle the current period.
    ///
    /// For every strategy except `EndOfPeriod` the plan switches
    /// immediately; `EndOfPeriod` leaves the plan in place and reports the
    /// scheduled date in the proration result.
    pub fn change_plan(
        &self,
        id: Uuid,
        new_plan_id: &str,
        catalog: &PlanCatalog,
        strategy: ProrationStrategy,
        change_date: chrono::NaiveDate,
    ) -> Result<PlanChange, BillingError> {
        let mut subs = self.subscriptions.write();
        let sub = subs
            .get_mut(&id)
            .ok_or(BillingError::SubscriptionNotFound(id))?;

        let current_plan = catalog
            .get(&sub.plan_id)
            .ok_or_else(|| BillingError::PlanNotFound(sub.plan_id.clone()))?;
        let new_plan = catalog
            .get(new_plan_id)
            .ok_or_else(|| BillingError::PlanNotFound(new_plan_id.to_string()))?;

        let proration = self.proration.calculate_plan_change(
            current_plan,
            new_plan,
            change_date,
            sub.current_period_start.date_naive(),
            sub.current_period_end.date_naive(),
            strategy,
        )?;

        let old_plan = sub.plan_id.clone();
        let effective_at = if proration.scheduled_for.is_some() {
            sub.current_period_end
        } else {
            sub.plan_id = new_plan_id.to_string();
            sub.cycle = new_plan.cycle;
            Utc::now()
        };

        tracing::info!(
            subscription = %id,
            %old_plan,
            new_plan = new_plan_id,
            net_charge = %proration.net_charge,
            "plan change"
        );

        Ok(PlanChange {
            subscription_id: id,
            old_plan,
            new_plan: new_plan_id.to_string(),
            proration,
            effective_at,
        })
    }

    /// Cancel a subscription, immediately or at period end.
    pub fn cancel(
        &self,
        id: Uuid,
        at_period_end: bool,
        reason: Option<&str>,
    ) -> Result<Subscription, BillingError> {
        let mut subs = self.subscriptions.write();
        let sub = subs
            .get_mut(&id)
            .ok_or(BillingError::SubscriptionNotFound(id))?;

        if at_period_end {
            sub.cancel_at_period_end = true;
        } else {
            sub.status = SubscriptionStatus::Cancelled;
            sub.canceled_at = Some(Utc::now());
        }
        tracing::info!(subscription = %id, at_period_end, reason = reason.unwrap_or("-"), "cancel");

        Ok(sub.clone())
    }

    /// Reactivate a cancelled or cancelling subscription.
    pub fn reactivate(&self, id: Uuid) -> Result<Subscription, BillingError> {
        let mut subs = self.subscriptions.write();
        let sub = subs
            .get_mut(&id)
            .ok_or(BillingError::SubscriptionNotFound(id))?;

        if sub.status != SubscriptionStatus::Cancelled && !sub.cancel_at_period_end {
            return Err(BillingError::AlreadyActive);
        }

        sub.status = SubscriptionStatus::Active;
        sub.cancel_at_period_end = false;
        sub.canceled_at = None;

        Ok(sub.clone())
    }

    /// Flag a subscription whose renewal payment failed.
    pub fn mark_past_due(&self, id: Uuid) -> Result<Subscription, BillingError> {
        let mut subs = self.subscriptions.write();
        let sub = subs
            .get_mut(&id)
            .ok_or(BillingError::SubscriptionNotFound(id))?;
        sub.status = SubscriptionStatus::PastDue;
        Ok(sub.clone())
    }

    /// Monthly recurring revenue: active subscription prices normalized to
    /// one month by each plan's cycle length.
    pub fn monthly_recurring_revenue(&self, catalog: &PlanCatalog) -> Decimal {
        let subs = self.subscriptions.read();
        subs.values()
            .filter(|s| s.status == SubscriptionStatus::Active)
            .filter_map(|s| catalog.get(&s.plan_id))
            .map(|plan| plan.price / Decimal::from(plan.cycle.months_in_cycle()))
            .sum()
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}
