//! Plans and billing cycles

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Billing cycle of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    /// 30-day cycle
    Monthly,
    /// 90-day cycle
    Quarterly,
    /// 365-day cycle
    Yearly,
}

impl BillingCycle {
    /// Days in one cycle for daily-rate math.
    ///
    /// Fixed 30/90/365 mapping, not calendar days. Changing this to true
    /// calendar lengths changes every proration amount and needs explicit
    /// sign-off; it is not a bug fix.
    pub fn days_in_cycle(&self) -> i64 {
        match self {
            Self::Monthly => 30,
            Self::Quarterly => 90,
            Self::Yearly => 365,
        }
    }

    /// Months in one cycle, for normalizing prices to monthly revenue.
    pub fn months_in_cycle(&self) -> u32 {
        match self {
            Self::Monthly => 1,
            Self::Quarterly => 3,
            Self::Yearly => 12,
        }
    }
}

/// A priced bundle entitling a tenant to a set of modules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Plan identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Price per billing cycle
    pub price: Decimal,
    /// Billing cycle
    pub cycle: BillingCycle,
    /// Module codes the plan entitles
    pub modules: Vec<String>,
    /// Optional per-seat price for seat-based billing
    pub price_per_seat: Option<Decimal>,
}

/// Catalog of available plans
///
/// Built once and read-only thereafter; plan changes go through explicit
/// subscription operations, never by mutating a referenced plan.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: HashMap<String, Plan>,
}

impl PlanCatalog {
    /// Build a catalog from plan definitions.
    pub fn from_plans(plans: Vec<Plan>) -> Self {
        Self {
            plans: plans.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    /// Get a plan by id.
    pub fn get(&self, plan_id: &str) -> Option<&Plan> {
        self.plans.get(plan_id)
    }

    /// All plans, unordered.
    pub fn all(&self) -> Vec<&Plan> {
        self.plans.values().collect()
    }

    /// The default plan set shipped with the suite.
    pub fn standard() -> Self {
        Self::from_plans(vec![
            Plan {
                id: "starter".into(),
                name: "Starter".into(),
                price: dec!(29),
                cycle: BillingCycle::Monthly,
                modules: vec!["hrm".into(), "crm".into()],
                price_per_seat: Some(dec!(5)),
            },
            Plan {
                id: "business".into(),
                name: "Business".into(),
                price: dec!(99),
                cycle: BillingCycle::Monthly,
                modules: vec![
                    "hrm".into(),
                    "crm".into(),
                    "inventory".into(),
                    "accounting".into(),
                ],
                price_per_seat: Some(dec!(8)),
            },
            Plan {
                id: "enterprise".into(),
                name: "Enterprise".into(),
                price: dec!(999),
                cycle: BillingCycle::Yearly,
                modules: vec![
                    "hrm".into(),
                    "crm".into(),
                    "inventory".into(),
                    "accounting".into(),
                    "settings".into(),
                ],
                price_per_seat: None,
            },
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_day_mapping_is_fixed() {
        assert_eq!(BillingCycle::Monthly.days_in_cycle(), 30);
        assert_eq!(BillingCycle::Quarterly.days_in_cycle(), 90);
        assert_eq!(BillingCycle::Yearly.days_in_cycle(), 365);
    }

    #[test]
    fn test_standard_catalog() {
        let catalog = PlanCatalog::standard();
        let starter = catalog.get("starter").unwrap();
        assert_eq!(starter.price, dec!(29));
        assert!(starter.modules.contains(&"hrm".to_string()));
        assert!(catalog.get("platinum").is_none());
    }
}
