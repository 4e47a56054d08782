//! Mid-cycle billing adjustments
//!
//! Daily rates are derived from the fixed cycle lengths in
//! [`BillingCycle::days_in_cycle`] and kept at full decimal precision
//! internally; every monetary output field is rounded to 2 decimal places
//! exactly once, at the end. `net_charge` is computed from the rounded
//! fields so `net_charge == new_plan_charge - credit_amount` holds exactly.

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::plans::{BillingCycle, Plan};
use crate::BillingError;

/// How a mid-cycle plan change is settled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProrationStrategy {
    /// Credit and charge both scaled by the unused fraction of the period.
    FullCredit,
    /// Credit the unused portion of what was paid; charge the new plan's
    /// daily rate for the remaining days.
    #[default]
    ProratedCredit,
    /// No credit for the old plan; charge the new plan for the remaining days.
    NoCredit,
    /// Nothing now; the change takes effect at the period end at full price.
    EndOfPeriod,
}

/// Whether a proration results in a charge, a credit, or neither
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingAction {
    /// Invoice the tenant for `net_charge`
    Charge,
    /// Credit the tenant `-net_charge`
    Credit,
    /// Nothing to settle
    NoChange,
}

/// Outcome of a plan-change proration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProrationResult {
    /// Strategy that produced this result
    pub method: ProrationStrategy,
    /// Credit for the unused portion of the current plan
    pub credit_amount: Decimal,
    /// Charge for the new plan over the remaining days
    pub new_plan_charge: Decimal,
    /// `new_plan_charge - credit_amount`; sign classifies the action
    pub net_charge: Decimal,
    /// Days of the period already consumed
    pub days_used: i64,
    /// Days left in the period
    pub days_remaining: i64,
    /// Fixed cycle length the rates were derived from
    pub total_days: i64,
    /// Set only by [`ProrationStrategy::EndOfPeriod`]
    pub scheduled_for: Option<NaiveDate>,
}

impl ProrationResult {
    /// Classify the settlement by the sign of `net_charge`.
    pub fn billing_action(&self) -> BillingAction {
        if self.net_charge > Decimal::ZERO {
            BillingAction::Charge
        } else if self.net_charge < Decimal::ZERO {
            BillingAction::Credit
        } else {
            BillingAction::NoChange
        }
    }
}

/// Outcome of a seat-count change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatChangeResult {
    /// Seats added, as a non-negative magnitude
    pub seats_added: u32,
    /// Seats removed, as a non-negative magnitude
    pub seats_removed: u32,
    /// Signed amount: positive charges, negative credits
    pub proration_amount: Decimal,
    /// Days left in the period
    pub days_remaining: i64,
    /// Fixed cycle length the rate was derived from
    pub total_days: i64,
}

/// Whether an add-on is being attached or removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddonAction {
    /// Attach the add-on; prorated charge
    Add,
    /// Remove the add-on; prorated credit
    Remove,
}

/// One requested add-on change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddonChange {
    /// Add-on identifier
    pub addon_id: String,
    /// Attach or remove
    pub action: AddonAction,
    /// Add-on price per cycle
    pub price: Decimal,
}

/// Per-item proration of an add-on change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddonProration {
    /// Add-on identifier
    pub addon_id: String,
    /// Attach or remove
    pub action: AddonAction,
    /// Prorated magnitude for this item, always non-negative
    pub amount: Decimal,
}

/// Aggregate outcome of an add-on change batch
///
/// Charges and credits are accumulated separately per item and netted only
/// here, in the aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddonChangeResult {
    /// Per-item breakdown
    pub items: Vec<AddonProration>,
    /// Sum of prorated additions
    pub total_charge: Decimal,
    /// Sum of prorated removals
    pub total_credit: Decimal,
    /// `total_charge - total_credit`
    pub net_charge: Decimal,
    /// Days left in the period
    pub days_remaining: i64,
}

/// Proration calculator
#[derive(Debug, Clone, Copy, Default)]
pub struct ProrationEngine;

fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

struct PeriodSplit {
    days_used: i64,
    days_remaining: i64,
    total_days: i64,
}

fn split_period(
    change_date: NaiveDate,
    period_start: NaiveDate,
    period_end: NaiveDate,
    cycle: BillingCycle,
) -> Result<PeriodSplit, BillingError> {
    if change_date < period_start || change_date > period_end {
        return Err(BillingError::InvalidPeriod {
            change_date,
            period_start,
            period_end,
        });
    }
    let total_days = cycle.days_in_cycle();
    let days_used = (change_date - period_start).num_days().clamp(0, total_days);
    Ok(PeriodSplit {
        days_used,
        days_remaining: total_days - days_used,
        total_days,
    })
}

impl ProrationEngine {
    /// Create an engine.
    pub fn new() -> Self {
        Self
    }

    /// Compute the monetary delta of switching plans mid-cycle.
    ///
    /// The period being split belongs to the current plan, so its cycle
    /// drives the day math.
    pub fn calculate_plan_change(
        &self,
        current: &Plan,
        new_plan: &Plan,
        change_date: NaiveDate,
        period_start: NaiveDate,
        period_end: NaiveDate,
        strategy: ProrationStrategy,
    ) -> Result<ProrationResult, BillingError> {
        let split = split_period(change_date, period_start, period_end, current.cycle)?;
        let total = Decimal::from(split.total_days);
        let used = Decimal::from(split.days_used);
        let remaining = Decimal::from(split.days_remaining);

        let (credit, charge, scheduled_for) = match strategy {
            ProrationStrategy::FullCredit => {
                let ratio = remaining / total;
                (
                    round_money(current.price * ratio),
                    round_money(new_plan.price * ratio),
                    None,
                )
            }
            ProrationStrategy::ProratedCredit => {
                let current_daily = current.price / total;
                let new_daily = new_plan.price / Decimal::from(new_plan.cycle.days_in_cycle());
                let amount_used = current_daily * used;
                (
                    round_money(current.price - amount_used),
                    round_money(new_daily * remaining),
                    None,
                )
            }
            ProrationStrategy::NoCredit => {
                let new_daily = new_plan.price / Decimal::from(new_plan.cycle.days_in_cycle());
                (Decimal::ZERO, round_money(new_daily * remaining), None)
            }
            ProrationStrategy::EndOfPeriod => (Decimal::ZERO, Decimal::ZERO, Some(period_end)),
        };

        Ok(ProrationResult {
            method: strategy,
            credit_amount: credit,
            new_plan_charge: charge,
            net_charge: charge - credit,
            days_used: split.days_used,
            days_remaining: split.days_remaining,
            total_days: split.total_days,
            scheduled_for,
        })
    }

    /// Compute the signed adjustment for a seat-count change.
    pub fn calculate_seat_change(
        &self,
        current_seats: u32,
        new_seats: u32,
        price_per_seat: Decimal,
        change_date: NaiveDate,
        period_start: NaiveDate,
        period_end: NaiveDate,
        cycle: BillingCycle,
    ) -> Result<SeatChangeResult, BillingError> {
        let split = split_period(change_date, period_start, period_end, cycle)?;
        let delta = i64::from(new_seats) - i64::from(current_seats);
        let daily_rate_per_seat = price_per_seat / Decimal::from(split.total_days);
        let amount =
            round_money(Decimal::from(delta) * daily_rate_per_seat * Decimal::from(split.days_remaining));

        Ok(SeatChangeResult {
            seats_added: delta.max(0) as u32,
            seats_removed: (-delta).max(0) as u32,
            proration_amount: amount,
            days_remaining: split.days_remaining,
            total_days: split.total_days,
        })
    }

    /// Prorate a batch of add-on changes, each item individually.
    pub fn calculate_addon_change(
        &self,
        changes: &[AddonChange],
        change_date: NaiveDate,
        period_start: NaiveDate,
        period_end: NaiveDate,
        cycle: BillingCycle,
    ) -> Result<AddonChangeResult, BillingError> {
        let split = split_period(change_date, period_start, period_end, cycle)?;
        let remaining = Decimal::from(split.days_remaining);
        let total = Decimal::from(split.total_days);

        let mut items = Vec::with_capacity(changes.len());
        let mut total_charge = Decimal::ZERO;
        let mut total_credit = Decimal::ZERO;

        for change in changes {
            let amount = round_money(change.price / total * remaining);
            match change.action {
                AddonAction::Add => total_charge += amount,
                AddonAction::Remove => total_credit += amount,
            }
            items.push(AddonProration {
                addon_id: change.addon_id.clone(),
                action: change.action,
                amount,
            });
        }

        Ok(AddonChangeResult {
            items,
            total_charge,
            total_credit,
            net_charge: total_charge - total_credit,
            days_remaining: split.days_remaining,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plans::PlanCatalog;
    use rust_decimal_macros::dec;

    fn plan(id: &str, price: Decimal) -> Plan {
        Plan {
            id: id.into(),
            name: id.into(),
            price,
            cycle: BillingCycle::Monthly,
            modules: vec![],
            price_per_seat: None,
        }
    }

    fn period() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
        )
    }

    #[test]
    fn test_prorated_credit_upgrade_on_day_ten() {
        // $29/mo -> $99/mo on day 10 of a 30-day period.
        let engine = ProrationEngine::new();
        let (start, end) = period();
        let change = NaiveDate::from_ymd_opt(2025, 3, 11).unwrap();

        let result = engine
            .calculate_plan_change(
                &plan("starter", dec!(29)),
                &plan("business", dec!(99)),
                change,
                start,
                end,
                ProrationStrategy::ProratedCredit,
            )
            .unwrap();

        assert_eq!(result.days_used, 10);
        assert_eq!(result.days_remaining, 20);
        assert_eq!(result.total_days, 30);
        assert_eq!(result.credit_amount, dec!(19.33));
        assert_eq!(result.new_plan_charge, dec!(66.00));
        assert_eq!(result.net_charge, dec!(46.67));
        assert_eq!(result.billing_action(), BillingAction::Charge);
    }

    #[test]
    fn test_full_credit_strategy() {
        let engine = ProrationEngine::new();
        let (start, end) = period();
        let change = NaiveDate::from_ymd_opt(2025, 3, 11).unwrap();

        let result = engine
            .calculate_plan_change(
                &plan("starter", dec!(29)),
                &plan("business", dec!(99)),
                change,
                start,
                end,
                ProrationStrategy::FullCredit,
            )
            .unwrap();

        // 20/30 of each price.
        assert_eq!(result.credit_amount, dec!(19.33));
        assert_eq!(result.new_plan_charge, dec!(66.00));
        assert_eq!(result.net_charge, dec!(46.67));
    }

    #[test]
    fn test_no_credit_strategy() {
        let engine = ProrationEngine::new();
        let (start, end) = period();
        let change = NaiveDate::from_ymd_opt(2025, 3, 11).unwrap();

        let result = engine
            .calculate_plan_change(
                &plan("starter", dec!(29)),
                &plan("business", dec!(99)),
                change,
                start,
                end,
                ProrationStrategy::NoCredit,
            )
            .unwrap();

        assert_eq!(result.credit_amount, dec!(0));
        assert_eq!(result.new_plan_charge, dec!(66.00));
        assert_eq!(result.net_charge, dec!(66.00));
    }

    #[test]
    fn test_end_of_period_strategy() {
        let engine = ProrationEngine::new();
        let (start, end) = period();
        let change = NaiveDate::from_ymd_opt(2025, 3, 11).unwrap();

        let result = engine
            .calculate_plan_change(
                &plan("starter", dec!(29)),
                &plan("business", dec!(99)),
                change,
                start,
                end,
                ProrationStrategy::EndOfPeriod,
            )
            .unwrap();

        assert_eq!(result.credit_amount, dec!(0));
        assert_eq!(result.new_plan_charge, dec!(0));
        assert_eq!(result.net_charge, dec!(0));
        assert_eq!(result.scheduled_for, Some(end));
        assert_eq!(result.billing_action(), BillingAction::NoChange);
    }

    #[test]
    fn test_net_charge_identity_for_all_strategies() {
        let engine = ProrationEngine::new();
        let (start, end) = period();
        let change = NaiveDate::from_ymd_opt(2025, 3, 18).unwrap();

        for strategy in [
            ProrationStrategy::FullCredit,
            ProrationStrategy::ProratedCredit,
            ProrationStrategy::NoCredit,
            ProrationStrategy::EndOfPeriod,
        ] {
            let result = engine
                .calculate_plan_change(
                    &plan("a", dec!(47.50)),
                    &plan("b", dec!(123.45)),
                    change,
                    start,
                    end,
                    strategy,
                )
                .unwrap();
            assert_eq!(
                result.net_charge,
                result.new_plan_charge - result.credit_amount,
                "identity broken for {strategy:?}"
            );
        }
    }

    #[test]
    fn test_downgrade_produces_credit() {
        let engine = ProrationEngine::new();
        let (start, end) = period();
        let change = NaiveDate::from_ymd_opt(2025, 3, 11).unwrap();

        let result = engine
            .calculate_plan_change(
                &plan("business", dec!(99)),
                &plan("starter", dec!(29)),
                change,
                start,
                end,
                ProrationStrategy::ProratedCredit,
            )
            .unwrap();

        assert!(result.net_charge < Decimal::ZERO);
        assert_eq!(result.billing_action(), BillingAction::Credit);
    }

    #[test]
    fn test_change_on_period_start_and_end() {
        let engine = ProrationEngine::new();
        let (start, end) = period();
        let current = plan("starter", dec!(29));
        let new_plan = plan("business", dec!(99));

        let at_start = engine
            .calculate_plan_change(
                &current,
                &new_plan,
                start,
                start,
                end,
                ProrationStrategy::ProratedCredit,
            )
            .unwrap();
        assert_eq!(at_start.days_used, 0);
        assert_eq!(at_start.credit_amount, dec!(29.00));
        assert_eq!(at_start.new_plan_charge, dec!(99.00));

        let at_end = engine
            .calculate_plan_change(
                &current,
                &new_plan,
                end,
                start,
                end,
                ProrationStrategy::ProratedCredit,
            )
            .unwrap();
        assert_eq!(at_end.days_remaining, 0);
        assert_eq!(at_end.new_plan_charge, dec!(0.00));
    }

    #[test]
    fn test_change_outside_period_rejected() {
        let engine = ProrationEngine::new();
        let (start, end) = period();
        let result = engine.calculate_plan_change(
            &plan("a", dec!(29)),
            &plan("b", dec!(99)),
            NaiveDate::from_ymd_opt(2025, 4, 2).unwrap(),
            start,
            end,
            ProrationStrategy::ProratedCredit,
        );
        assert!(matches!(result, Err(BillingError::InvalidPeriod { .. })));
    }

    #[test]
    fn test_seat_reduction_credits() {
        // 10 -> 7 seats at $5/seat, monthly cycle, 15 days remaining.
        let engine = ProrationEngine::new();
        let (start, end) = period();
        let change = NaiveDate::from_ymd_opt(2025, 3, 16).unwrap();

        let result = engine
            .calculate_seat_change(10, 7, dec!(5), change, start, end, BillingCycle::Monthly)
            .unwrap();

        assert_eq!(result.seats_added, 0);
        assert_eq!(result.seats_removed, 3);
        assert_eq!(result.days_remaining, 15);
        assert_eq!(result.proration_amount, dec!(-7.50));
    }

    #[test]
    fn test_seat_addition_charges() {
        let engine = ProrationEngine::new();
        let (start, end) = period();
        let change = NaiveDate::from_ymd_opt(2025, 3, 16).unwrap();

        let result = engine
            .calculate_seat_change(5, 8, dec!(5), change, start, end, BillingCycle::Monthly)
            .unwrap();

        assert_eq!(result.seats_added, 3);
        assert_eq!(result.seats_removed, 0);
        assert_eq!(result.proration_amount, dec!(7.50));
    }

    #[test]
    fn test_addon_batch_accumulates_sides_separately() {
        let engine = ProrationEngine::new();
        let (start, end) = period();
        let change = NaiveDate::from_ymd_opt(2025, 3, 16).unwrap();

        let changes = vec![
            AddonChange {
                addon_id: "payroll-plus".into(),
                action: AddonAction::Add,
                price: dec!(12),
            },
            AddonChange {
                addon_id: "extra-storage".into(),
                action: AddonAction::Add,
                price: dec!(6),
            },
            AddonChange {
                addon_id: "sms-pack".into(),
                action: AddonAction::Remove,
                price: dec!(9),
            },
        ];

        let result = engine
            .calculate_addon_change(&changes, change, start, end, BillingCycle::Monthly)
            .unwrap();

        // 15 of 30 days remaining: half of each price.
        assert_eq!(result.total_charge, dec!(9.00));
        assert_eq!(result.total_credit, dec!(4.50));
        assert_eq!(result.net_charge, dec!(4.50));
        assert_eq!(result.items.len(), 3);
        assert!(result.items.iter().all(|i| i.amount >= Decimal::ZERO));
    }

    #[test]
    fn test_default_catalog_carries_seat_pricing() {
        let catalog = PlanCatalog::standard();
        assert_eq!(catalog.get("starter").unwrap().price_per_seat, Some(dec!(5)));
    }
}
