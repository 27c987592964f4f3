use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    SubscriptionCreated,
    TrialToPaidUpgrade,
    PaymentFailed,
    PaymentRecovered,
    PeriodRenewed,
    SubscriptionCanceled,
    SubscriptionReactivated,
    SubscriptionExpired,
    PlanUpgraded,
    PlanDowngraded,
    ChangeScheduled,
    ChangeFailed,
    CancelAtPeriodEndUpdated,
    SeatsAdded,
    SeatsRemoved,
    SeatLimitChanged,
    BillingSettingsUpdated,
    MemberActivated,
    MemberRoleChanged,
    MemberRemoved,
    BillingPortalOpened,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::SubscriptionCreated => "subscription_created",
            AuditAction::TrialToPaidUpgrade => "trial_to_paid_upgrade",
            AuditAction::PaymentFailed => "payment_failed",
            AuditAction::PaymentRecovered => "payment_recovered",
            AuditAction::PeriodRenewed => "period_renewed",
            AuditAction::SubscriptionCanceled => "subscription_canceled",
            AuditAction::SubscriptionReactivated => "subscription_reactivated",
            AuditAction::SubscriptionExpired => "subscription_expired",
            AuditAction::PlanUpgraded => "plan_upgraded",
            AuditAction::PlanDowngraded => "plan_downgraded",
            AuditAction::ChangeScheduled => "change_scheduled",
            AuditAction::ChangeFailed => "change_failed",
            AuditAction::CancelAtPeriodEndUpdated => "cancel_at_period_end_updated",
            AuditAction::SeatsAdded => "seats_added",
            AuditAction::SeatsRemoved => "seats_removed",
            AuditAction::SeatLimitChanged => "seat_limit_changed",
            AuditAction::BillingSettingsUpdated => "billing_settings_updated",
            AuditAction::MemberActivated => "member_activated",
            AuditAction::MemberRoleChanged => "member_role_changed",
            AuditAction::MemberRemoved => "member_removed",
            AuditAction::BillingPortalOpened => "billing_portal_opened",
        }
    }
}

impl Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
