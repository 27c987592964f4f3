use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Provider-agnostic event taxonomy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BillingEventType {
    #[serde(rename = "subscription.created")]
    SubscriptionCreated,
    #[serde(rename = "subscription.updated")]
    SubscriptionUpdated,
    #[serde(rename = "subscription.deleted")]
    SubscriptionDeleted,
    #[serde(rename = "payment.succeeded")]
    PaymentSucceeded,
    #[serde(rename = "payment.failed")]
    PaymentFailed,
}

impl BillingEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingEventType::SubscriptionCreated => "subscription.created",
            BillingEventType::SubscriptionUpdated => "subscription.updated",
            BillingEventType::SubscriptionDeleted => "subscription.deleted",
            BillingEventType::PaymentSucceeded => "payment.succeeded",
            BillingEventType::PaymentFailed => "payment.failed",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "subscription.created" => Some(BillingEventType::SubscriptionCreated),
            "subscription.updated" => Some(BillingEventType::SubscriptionUpdated),
            "subscription.deleted" => Some(BillingEventType::SubscriptionDeleted),
            "payment.succeeded" => Some(BillingEventType::PaymentSucceeded),
            "payment.failed" => Some(BillingEventType::PaymentFailed),
            _ => None,
        }
    }
}

impl Display for BillingEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
