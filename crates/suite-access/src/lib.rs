//! OpenSuite Access Control
//!
//! Hybrid subscription + capability resolution for module access.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        ACCESS RESOLUTION                            │
//! │                                                                     │
//! │   ModulePath ──► Catalog lookup ──► Subscription gate ──► Capability│
//! │   (1-4 levels)    (404 on miss)     (skipped standalone)    gate    │
//! │                                          │                    │     │
//! │                                    ┌─────▼─────┐        ┌────▼────┐│
//! │                                    │ TTL cache │        │ exact   ││
//! │                                    │ per tenant│        │ depth   ││
//! │                                    └───────────┘        └─────────┘│
//! │                                                                     │
//! │   Every evaluation returns an AccessDecision (reason + status);     │
//! │   denial is a value, not an error. Collaborator failure denies.     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![allow(dead_code)]

pub mod cache;
pub mod catalog;
pub mod decision;
pub mod path;
pub mod resolver;

use thiserror::Error;

pub use cache::{SubscriptionCache, DEFAULT_SUBSCRIPTION_TTL};
pub use catalog::{ComponentDef, ModuleCatalog, ModuleDef, SubModuleDef};
pub use decision::{AccessDecision, AccessReason};
pub use path::{ModulePath, PathDepth};
pub use resolver::{
    AccessResolver, CapabilityStore, LookupError, Principal, SubscriptionLookup,
    SubscriptionState, SubscriptionStatus,
};

/// Malformed path input
///
/// The only condition under which resolution errors instead of deciding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// The module segment is empty
    #[error("module path is empty")]
    EmptyPath,

    /// A deeper segment was supplied without its parent
    #[error("module path skips a level: {0}")]
    DiscontinuousPath(String),

    /// More than four levels were supplied
    #[error("module path has more than four levels: {0}")]
    TooDeep(String),
}
