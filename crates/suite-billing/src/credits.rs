//! Per-tenant credit ledger
//!
//! Running balance plus an append-only entry history. The balance must always
//! equal the signed sum of the history; `recomputed_balance` exists so tests
//! (and audits) can detect drift between the two.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::BillingError;

/// Direction of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditEntryType {
    /// Adds to the balance
    Credit,
    /// Subtracts from the balance
    Debit,
}

/// Why a ledger entry was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditReason {
    /// Credit applied against a generated invoice
    InvoicePayment,
    /// Credit restored when an invoice was cancelled
    InvoiceCancelled,
    /// Refund issued against a paid invoice
    Refund,
    /// Promotional credit
    Promotion,
    /// Operator adjustment
    ManualAdjustment,
}

/// One append-only ledger entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditEntry {
    /// Credit or debit
    pub entry_type: CreditEntryType,
    /// Non-negative magnitude
    pub amount: Decimal,
    /// Why the entry exists
    pub reason: CreditReason,
    /// What the entry refers to (invoice number, promo id, ...)
    pub reference: String,
    /// When the entry was recorded
    pub recorded_at: DateTime<Utc>,
}

/// Running balance with full history
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreditLedger {
    balance: Decimal,
    entries: Vec<CreditEntry>,
}

impl CreditLedger {
    /// An empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current balance.
    pub fn balance(&self) -> Decimal {
        self.balance
    }

    /// Add to the balance. Returns the new balance.
    pub fn credit(
        &mut self,
        amount: Decimal,
        reason: CreditReason,
        reference: &str,
    ) -> Result<Decimal, BillingError> {
        if amount <= Decimal::ZERO {
            return Err(BillingError::NonPositiveAmount);
        }
        self.entries.push(CreditEntry {
            entry_type: CreditEntryType::Credit,
            amount,
            reason,
            reference: reference.to_string(),
            recorded_at: Utc::now(),
        });
        self.balance += amount;
        Ok(self.balance)
    }

    /// Subtract from the balance. Overdraw is rejected before anything is
    /// recorded. Returns the new balance.
    pub fn debit(
        &mut self,
        amount: Decimal,
        reason: CreditReason,
        reference: &str,
    ) -> Result<Decimal, BillingError> {
        if amount <= Decimal::ZERO {
            return Err(BillingError::NonPositiveAmount);
        }
        if amount > self.balance {
            return Err(BillingError::InsufficientCredit {
                requested: amount,
                available: self.balance,
            });
        }
        self.entries.push(CreditEntry {
            entry_type: CreditEntryType::Debit,
            amount,
            reason,
            reference: reference.to_string(),
            recorded_at: Utc::now(),
        });
        self.balance -= amount;
        Ok(self.balance)
    }

    /// Full entry history, oldest first.
    pub fn entries(&self) -> &[CreditEntry] {
        &self.entries
    }

    /// Balance recomputed from the history alone. Must always equal
    /// [`CreditLedger::balance`].
    pub fn recomputed_balance(&self) -> Decimal {
        self.entries.iter().fold(Decimal::ZERO, |acc, e| {
            match e.entry_type {
                CreditEntryType::Credit => acc + e.amount,
                CreditEntryType::Debit => acc - e.amount,
            }
        })
    }
}
