//! Invoice generation and lifecycle
//!
//! Invoices and the credit balance live in per-tenant accounts. Every
//! read-modify-write (invoice numbering, credit application, status
//! transitions) runs under that tenant's mutex, so two concurrent
//! generations for the same tenant can neither collide on a number nor
//! double-apply the same credit. Invoices are append-only: they are status-
//! transitioned, never deleted.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use suite_common::TenantId;

use crate::credits::{CreditEntry, CreditLedger, CreditReason};
use crate::plans::Plan;
use crate::BillingError;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Prefix for subscription invoices
    pub invoice_prefix: String,
    /// Prefix for refund credit notes
    pub credit_note_prefix: String,
    /// Tax rate in percent applied to the subtotal
    pub tax_rate_percent: Decimal,
    /// Days until a pending invoice is due
    pub payment_terms_days: i64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            invoice_prefix: "INV".into(),
            credit_note_prefix: "CN".into(),
            tax_rate_percent: dec!(0),
            payment_terms_days: 30,
        }
    }
}

/// A recurring add-on billed alongside the base subscription
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Addon {
    /// Add-on identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Price per billing cycle
    pub price: Decimal,
}

/// Invoice lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    /// Generated, not yet issued
    Draft,
    /// Issued and awaiting payment
    Pending,
    /// Settled
    Paid,
    /// Past its due date
    Overdue,
    /// Cancelled before payment
    Cancelled,
    /// Fully refunded
    Refunded,
}

/// What a line item bills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    /// Base plan charge
    Subscription,
    /// Recurring add-on
    Addon,
    /// Refund credit note line
    Refund,
}

/// One invoice line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    /// What is billed
    pub description: String,
    /// Quantity billed
    pub quantity: f64,
    /// Price per unit
    pub unit_price: Decimal,
    /// `quantity x unit_price`
    pub amount: Decimal,
    /// Line classification
    pub item_type: ItemType,
}

/// An invoice
///
/// `total == subtotal + tax_amount` and `amount_due == total -
/// credits_applied` hold at creation and after every transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    /// Internal id
    pub id: Uuid,
    /// Unique per-tenant number, `PREFIX-YYYYMM-TENANTCODE-NNNN`
    pub invoice_number: String,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Lifecycle status
    pub status: InvoiceStatus,
    /// Billed lines
    pub line_items: Vec<LineItem>,
    /// Sum of line amounts
    pub subtotal: Decimal,
    /// Tax rate in percent
    pub tax_rate: Decimal,
    /// Rounded tax on the subtotal
    pub tax_amount: Decimal,
    /// Credit balance applied at generation
    pub credits_applied: Decimal,
    /// `subtotal + tax_amount`
    pub total: Decimal,
    /// `total - credits_applied`
    pub amount_due: Decimal,
    /// Billing period start
    pub period_start: NaiveDate,
    /// Billing period end
    pub period_end: NaiveDate,
    /// Generation date
    pub issue_date: NaiveDate,
    /// Payment deadline
    pub due_date: NaiveDate,
    /// Settlement time
    pub paid_at: Option<DateTime<Utc>>,
    /// How it was paid
    pub payment_method: Option<String>,
    /// External payment reference
    pub payment_reference: Option<String>,
    /// Amount actually paid
    pub amount_paid: Decimal,
    /// Cumulative refunds, capped at `amount_paid`
    pub refunded_amount: Decimal,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    /// True when the arithmetic invariants hold.
    pub fn is_consistent(&self) -> bool {
        self.total == self.subtotal + self.tax_amount
            && self.amount_due == self.total - self.credits_applied
    }
}

struct TenantAccount {
    tenant_code: String,
    sequence: u64,
    invoices: BTreeMap<String, Invoice>,
    addons: Vec<Addon>,
    credits: CreditLedger,
}

impl TenantAccount {
    fn next_number(&mut self, prefix: &str, date: NaiveDate) -> String {
        self.sequence += 1;
        format!(
            "{}-{}{:02}-{}-{:04}",
            prefix,
            date.year(),
            date.month(),
            self.tenant_code,
            self.sequence
        )
    }
}

/// Per-tenant invoice and credit bookkeeping
pub struct InvoiceLedger {
    accounts: DashMap<TenantId, Arc<Mutex<TenantAccount>>>,
    config: LedgerConfig,
}

fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

impl InvoiceLedger {
    /// Create a ledger with default configuration.
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::default())
    }

    /// Create a ledger with explicit configuration.
    pub fn with_config(config: LedgerConfig) -> Self {
        Self {
            accounts: DashMap::new(),
            config,
        }
    }

    /// Register a tenant with the short code used in its invoice numbers.
    /// Registering an already-known tenant is a no-op.
    pub fn register_tenant(&self, tenant_id: TenantId, code: &str) {
        self.accounts.entry(tenant_id).or_insert_with(|| {
            Arc::new(Mutex::new(TenantAccount {
                tenant_code: code.to_uppercase(),
                sequence: 0,
                invoices: BTreeMap::new(),
                addons: Vec::new(),
                credits: CreditLedger::new(),
            }))
        });
    }

    fn account(&self, tenant_id: TenantId) -> Result<Arc<Mutex<TenantAccount>>, BillingError> {
        self.accounts
            .get(&tenant_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(BillingError::UnknownTenant(tenant_id))
    }

    /// Attach a recurring add-on to the tenant.
    pub fn add_addon(&self, tenant_id: TenantId, addon: Addon) -> Result<(), BillingError> {
        let account = self.account(tenant_id)?;
        let mut account = account.lock();
        account.addons.retain(|a| a.id != addon.id);
        account.addons.push(addon);
        Ok(())
    }

    /// Remove a recurring add-on from the tenant.
    pub fn remove_addon(&self, tenant_id: TenantId, addon_id: &str) -> Result<(), BillingError> {
        let account = self.account(tenant_id)?;
        account.lock().addons.retain(|a| a.id != addon_id);
        Ok(())
    }

    /// The tenant's active add-ons.
    pub fn active_addons(&self, tenant_id: TenantId) -> Result<Vec<Addon>, BillingError> {
        Ok(self.account(tenant_id)?.lock().addons.clone())
    }

    /// Generate the subscription invoice for a billing period.
    ///
    /// Line items are the base plan plus active add-ons. Available credit up
    /// to the invoice total is applied and debited from the credit ledger in
    /// the same critical section that records the invoice, so a failure can
    /// never leave one without the other.
    pub fn generate_subscription_invoice(
        &self,
        tenant_id: TenantId,
        plan: &Plan,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<Invoice, BillingError> {
        if period_end < period_start {
            return Err(BillingError::InvalidPeriod {
                change_date: period_start,
                period_start,
                period_end,
            });
        }
        let account = self.account(tenant_id)?;
        let mut account = account.lock();

        let mut line_items = vec![LineItem {
            description: format!("{} plan ({period_start} to {period_end})", plan.name),
            quantity: 1.0,
            unit_price: plan.price,
            amount: plan.price,
            item_type: ItemType::Subscription,
        }];
        for addon in &account.addons {
            line_items.push(LineItem {
                description: addon.name.clone(),
                quantity: 1.0,
                unit_price: addon.price,
                amount: addon.price,
                item_type: ItemType::Addon,
            });
        }

        let subtotal: Decimal = line_items.iter().map(|item| item.amount).sum();
        let tax_amount = round_money(subtotal * self.config.tax_rate_percent / dec!(100));
        let total = subtotal + tax_amount;
        let credits_applied = account.credits.balance().min(total).max(Decimal::ZERO);
        let amount_due = total - credits_applied;

        let issue_date = Utc::now().date_naive();
        let invoice_number = account.next_number(&self.config.invoice_prefix, issue_date);

        if credits_applied > Decimal::ZERO {
            account.credits.debit(
                credits_applied,
                CreditReason::InvoicePayment,
                &invoice_number,
            )?;
        }

        let invoice = Invoice {
            id: Uuid::new_v4(),
            invoice_number: invoice_number.clone(),
            tenant_id,
            status: InvoiceStatus::Draft,
            line_items,
            subtotal,
            tax_rate: self.config.tax_rate_percent,
            tax_amount,
            credits_applied,
            total,
            amount_due,
            period_start,
            period_end,
            issue_date,
            due_date: issue_date + chrono::Duration::days(self.config.payment_terms_days),
            paid_at: None,
            payment_method: None,
            payment_reference: None,
            amount_paid: Decimal::ZERO,
            refunded_amount: Decimal::ZERO,
            created_at: Utc::now(),
        };

        tracing::debug!(%tenant_id, number = %invoice_number, %total, "invoice generated");
        account.invoices.insert(invoice_number, invoice.clone());
        Ok(invoice)
    }

    /// Issue a draft invoice: Draft -> Pending.
    pub fn issue(&self, tenant_id: TenantId, number: &str) -> Result<Invoice, BillingError> {
        self.transition(tenant_id, number, |invoice| {
            if invoice.status != InvoiceStatus::Draft {
                return Err(BillingError::InvalidTransition {
                    from: invoice.status,
                    to: InvoiceStatus::Pending,
                });
            }
            invoice.status = InvoiceStatus::Pending;
            Ok(())
        })
    }

    /// Settle an invoice: Pending/Overdue -> Paid.
    pub fn mark_as_paid(
        &self,
        tenant_id: TenantId,
        number: &str,
        payment_method: &str,
        payment_reference: &str,
    ) -> Result<Invoice, BillingError> {
        self.transition(tenant_id, number, |invoice| {
            if !matches!(invoice.status, InvoiceStatus::Pending | InvoiceStatus::Overdue) {
                return Err(BillingError::InvalidTransition {
                    from: invoice.status,
                    to: InvoiceStatus::Paid,
                });
            }
            invoice.status = InvoiceStatus::Paid;
            invoice.paid_at = Some(Utc::now());
            invoice.payment_method = Some(payment_method.to_string());
            invoice.payment_reference = Some(payment_reference.to_string());
            invoice.amount_paid = invoice.amount_due;
            Ok(())
        })
    }

    /// Cancel an unpaid invoice, restoring any applied credit.
    ///
    /// A paid invoice cannot be cancelled; refunds are the only way back.
    pub fn cancel_invoice(
        &self,
        tenant_id: TenantId,
        number: &str,
    ) -> Result<Invoice, BillingError> {
        let account = self.account(tenant_id)?;
        let mut account = account.lock();
        let invoice = account
            .invoices
            .get(number)
            .ok_or_else(|| BillingError::InvoiceNotFound(number.to_string()))?
            .clone();

        match invoice.status {
            InvoiceStatus::Paid | InvoiceStatus::Refunded => {
                return Err(BillingError::CannotCancelPaid(number.to_string()))
            }
            InvoiceStatus::Cancelled => {
                return Err(BillingError::InvalidTransition {
                    from: invoice.status,
                    to: InvoiceStatus::Cancelled,
                })
            }
            _ => {}
        }

        if invoice.credits_applied > Decimal::ZERO {
            account
                .credits
                .credit(invoice.credits_applied, CreditReason::InvoiceCancelled, number)?;
        }
        let invoice = account
            .invoices
            .get_mut(number)
            .expect("invoice checked above");
        invoice.status = InvoiceStatus::Cancelled;
        invoice.credits_applied = Decimal::ZERO;
        invoice.amount_due = invoice.total;
        Ok(invoice.clone())
    }

    /// Refund part or all of a paid invoice.
    ///
    /// Appends a negative-total credit note, returns the refunded amount to
    /// the tenant's credit balance, and accumulates `refunded_amount` on the
    /// original. When cumulative refunds reach `amount_paid` the original
    /// transitions to Refunded. Returns the credit note.
    pub fn issue_refund(
        &self,
        tenant_id: TenantId,
        number: &str,
        amount: Decimal,
        reason: &str,
    ) -> Result<Invoice, BillingError> {
        if amount <= Decimal::ZERO {
            return Err(BillingError::NonPositiveAmount);
        }
        let account = self.account(tenant_id)?;
        let mut account = account.lock();

        let (refundable, period_start, period_end) = {
            let original = account
                .invoices
                .get(number)
                .ok_or_else(|| BillingError::InvoiceNotFound(number.to_string()))?;
            (
                original.amount_paid - original.refunded_amount,
                original.period_start,
                original.period_end,
            )
        };
        if amount > refundable {
            return Err(BillingError::RefundExceedsPaid {
                requested: amount,
                refundable,
            });
        }

        let now = Utc::now();
        let issue_date = now.date_naive();
        let note_number = account.next_number(&self.config.credit_note_prefix, issue_date);

        let credit_note = Invoice {
            id: Uuid::new_v4(),
            invoice_number: note_number.clone(),
            tenant_id,
            status: InvoiceStatus::Paid,
            line_items: vec![LineItem {
                description: format!("Refund: {reason}"),
                quantity: 1.0,
                unit_price: -amount,
                amount: -amount,
                item_type: ItemType::Refund,
            }],
            subtotal: -amount,
            tax_rate: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            credits_applied: Decimal::ZERO,
            total: -amount,
            amount_due: -amount,
            period_start,
            period_end,
            issue_date,
            due_date: issue_date,
            paid_at: Some(now),
            payment_method: None,
            payment_reference: Some(number.to_string()),
            amount_paid: Decimal::ZERO,
            refunded_amount: Decimal::ZERO,
            created_at: now,
        };

        account
            .credits
            .credit(amount, CreditReason::Refund, &note_number)?;
        account.invoices.insert(note_number, credit_note.clone());

        let original = account
            .invoices
            .get_mut(number)
            .expect("existence checked above");
        original.refunded_amount += amount;
        if original.refunded_amount >= original.amount_paid {
            original.status = InvoiceStatus::Refunded;
        }
        tracing::debug!(%tenant_id, number, %amount, "refund issued");

        Ok(credit_note)
    }

    /// Flip every pending invoice past its due date to Overdue.
    ///
    /// Idempotent: a second run with no state change transitions nothing.
    pub fn process_overdue_invoices(&self, today: NaiveDate) -> Vec<(TenantId, String)> {
        let mut transitioned = Vec::new();
        for entry in self.accounts.iter() {
            let mut account = entry.value().lock();
            for invoice in account.invoices.values_mut() {
                if invoice.status == InvoiceStatus::Pending && invoice.due_date < today {
                    invoice.status = InvoiceStatus::Overdue;
                    transitioned.push((*entry.key(), invoice.invoice_number.clone()));
                }
            }
        }
        if !transitioned.is_empty() {
            tracing::info!(count = transitioned.len(), "invoices marked overdue");
        }
        transitioned
    }

    /// Fetch one invoice.
    pub fn get_invoice(&self, tenant_id: TenantId, number: &str) -> Result<Invoice, BillingError> {
        self.account(tenant_id)?
            .lock()
            .invoices
            .get(number)
            .cloned()
            .ok_or_else(|| BillingError::InvoiceNotFound(number.to_string()))
    }

    /// All of a tenant's invoices, ordered by number.
    pub fn invoices_for(&self, tenant_id: TenantId) -> Result<Vec<Invoice>, BillingError> {
        Ok(self
            .account(tenant_id)?
            .lock()
            .invoices
            .values()
            .cloned()
            .collect())
    }

    /// Export one invoice as pretty JSON.
    pub fn export_json(&self, tenant_id: TenantId, number: &str) -> Result<String, BillingError> {
        let invoice = self.get_invoice(tenant_id, number)?;
        Ok(serde_json::to_string_pretty(&invoice).unwrap_or_default())
    }

    /// Grant credit to a tenant. Returns the new balance.
    pub fn add_credit(
        &self,
        tenant_id: TenantId,
        amount: Decimal,
        reason: CreditReason,
        reference: &str,
    ) -> Result<Decimal, BillingError> {
        self.account(tenant_id)?
            .lock()
            .credits
            .credit(amount, reason, reference)
    }

    /// The tenant's current credit balance.
    pub fn available_credit(&self, tenant_id: TenantId) -> Result<Decimal, BillingError> {
        Ok(self.account(tenant_id)?.lock().credits.balance())
    }

    /// The tenant's full credit history.
    pub fn credit_history(&self, tenant_id: TenantId) -> Result<Vec<CreditEntry>, BillingError> {
        Ok(self.account(tenant_id)?.lock().credits.entries().to_vec())
    }

    /// Tenants whose stored balance has drifted from their summed history.
    /// Always empty unless a bookkeeping bug slipped in.
    pub fn audit_credit_balances(&self) -> Vec<TenantId> {
        self.accounts
            .iter()
            .filter(|entry| {
                let account = entry.value().lock();
                account.credits.balance() != account.credits.recomputed_balance()
            })
            .map(|entry| *entry.key())
            .collect()
    }

    fn transition(
        &self,
        tenant_id: TenantId,
        number: &str,
        apply: impl FnOnce(&mut Invoice) -> Result<(), BillingError>,
    ) -> Result<Invoice, BillingError> {
        let account = self.account(tenant_id)?;
        let mut account = account.lock();
        let invoice = account
            .invoices
            .get_mut(number)
            .ok_or_else(|| BillingError::InvoiceNotFound(number.to_string()))?;
        apply(invoice)?;
        Ok(invoice.clone())
    }
}

impl Default for InvoiceLedger {
    fn default() -> Self {
        Self::new()
    }
}
