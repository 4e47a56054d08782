//! OpenSuite Revenue Platform
//!
//! Proration, invoicing and credit bookkeeping for the multi-tenant suite.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                       REVENUE PLATFORM                              │
//! │                                                                     │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐              │
//! │  │    Plan      │  │  Proration   │  │ Subscription │              │
//! │  │   Catalog    │  │   Engine     │  │  Management  │              │
//! │  └──────────────┘  └──────────────┘  └──────────────┘              │
//! │                                                                     │
//! │  ┌─────────────────────────────────────────────────────────────┐   │
//! │  │                     INVOICE LEDGER                          │   │
//! │  │  Per-tenant accounts: invoices (append-only) + credit       │   │
//! │  │  ledger, every mutation under the tenant's lock             │   │
//! │  └─────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![allow(dead_code)]

pub mod credits;
pub mod invoicing;
pub mod plans;
pub mod proration;
pub mod subscriptions;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use suite_common::TenantId;

pub use credits::{CreditEntry, CreditEntryType, CreditLedger, CreditReason};
pub use invoicing::{
    Addon, Invoice, InvoiceLedger, InvoiceStatus, ItemType, LedgerConfig, LineItem,
};
pub use plans::{BillingCycle, Plan, PlanCatalog};
pub use proration::{
    AddonAction, AddonChange, AddonChangeResult, AddonProration, BillingAction, ProrationEngine,
    ProrationResult, ProrationStrategy, SeatChangeResult,
};
pub use subscriptions::{PlanChange, Subscription, SubscriptionManager, SubscriptionStatus};

/// Billing error types
///
/// These signal caller misuse or invariant violations. Business outcomes
/// (a proration that nets to a credit, an invoice left pending) are values,
/// not errors.
#[derive(Debug, Error)]
pub enum BillingError {
    /// Plan id not present in the catalog
    #[error("plan not found: {0}")]
    PlanNotFound(String),

    /// Subscription id unknown
    #[error("subscription not found: {0}")]
    SubscriptionNotFound(Uuid),

    /// Tenant has no current subscription
    #[error("no active subscription for tenant {0}")]
    NoActiveSubscription(TenantId),

    /// Subscription is not in a state the operation applies to
    #[error("subscription already active")]
    AlreadyActive,

    /// Tenant was never registered with the ledger
    #[error("unknown tenant: {0}")]
    UnknownTenant(TenantId),

    /// Invoice number unknown for this tenant
    #[error("invoice not found: {0}")]
    InvoiceNotFound(String),

    /// The requested status change is not in the invoice state machine
    #[error("invalid invoice transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current status
        from: InvoiceStatus,
        /// Requested status
        to: InvoiceStatus,
    },

    /// Paid invoices are refunded, never cancelled
    #[error("cannot cancel paid invoice {0}")]
    CannotCancelPaid(String),

    /// Cumulative refunds may not exceed the amount paid
    #[error("refund of {requested} exceeds refundable amount {refundable}")]
    RefundExceedsPaid {
        /// Requested refund amount
        requested: Decimal,
        /// What is still refundable
        refundable: Decimal,
    },

    /// Change date outside the billing period
    #[error("change date {change_date} outside period {period_start} to {period_end}")]
    InvalidPeriod {
        /// The out-of-range date
        change_date: NaiveDate,
        /// Period start
        period_start: NaiveDate,
        /// Period end
        period_end: NaiveDate,
    },

    /// Debit larger than the available credit balance
    #[error("insufficient credit: requested {requested}, available {available}")]
    InsufficientCredit {
        /// Requested debit
        requested: Decimal,
        /// Available balance
        available: Decimal,
    },

    /// Amounts must be strictly positive
    #[error("amount must be positive")]
    NonPositiveAmount,
}

/// Revenue platform
///
/// Wires the plan catalog, subscription manager, proration engine and
/// invoice ledger together for callers that want the composed flow.
pub struct BillingPlatform {
    /// Plan catalog
    pub plans: Arc<PlanCatalog>,
    /// Subscription manager
    pub subscriptions: Arc<SubscriptionManager>,
    /// Proration engine
    pub proration: ProrationEngine,
    /// Invoice ledger
    pub ledger: Arc<InvoiceLedger>,
}

impl BillingPlatform {
    /// Create a platform with the standard plan catalog and default ledger
    /// configuration.
    pub fn new() -> Self {
        Self::with_config(PlanCatalog::standard(), LedgerConfig::default())
    }

    /// Create a platform with an explicit catalog and ledger configuration.
    pub fn with_config(catalog: PlanCatalog, config: LedgerConfig) -> Self {
        Self {
            plans: Arc::new(catalog),
            subscriptions: Arc::new(SubscriptionManager::new()),
            proration: ProrationEngine::new(),
            ledger: Arc::new(InvoiceLedger::with_config(config)),
        }
    }

    /// Generate the subscription invoice for a tenant's billing period.
    pub fn generate_invoice(
        &self,
        tenant_id: TenantId,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<Invoice, BillingError> {
        let subscription = self
            .subscriptions
            .current_for(tenant_id)
            .ok_or(BillingError::NoActiveSubscription(tenant_id))?;
        let plan = self
            .plans
            .get(&subscription.plan_id)
            .ok_or_else(|| BillingError::PlanNotFound(subscription.plan_id.clone()))?;
        self.ledger
            .generate_subscription_invoice(tenant_id, plan, period_start, period_end)
    }

    /// Change a subscription's plan and settle the current period.
    pub fn change_plan(
        &self,
        subscription_id: Uuid,
        new_plan_id: &str,
        strategy: ProrationStrategy,
        change_date: NaiveDate,
    ) -> Result<PlanChange, BillingError> {
        self.subscriptions
            .change_plan(subscription_id, new_plan_id, &self.plans, strategy, change_date)
    }

    /// Monthly recurring revenue over active subscriptions.
    pub fn monthly_recurring_revenue(&self) -> Decimal {
        self.subscriptions.monthly_recurring_revenue(&self.plans)
    }
}

impl Default for BillingPlatform {
    fn default() -> Self {
        Self::new()
    }
}
