//! Billing availability. The billing backend is not wired in yet.

use serde::Serialize;

pub const BILLING_UNAVAILABLE_REASON: &str =
    "Currently depends on CIRIS billing backend and unavailable in standalone mode.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BillingStatus {
    Available,
    Unavailable { reason: String },
}

impl BillingStatus {
    // TODO: query the billing backend once it exposes a status route.
    pub fn current() -> Self {
        Self::Unavailable {
            reason: BILLING_UNAVAILABLE_REASON.to_string(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }
}
