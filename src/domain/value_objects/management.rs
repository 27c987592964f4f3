use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::{
    enums::{
        change_actions::{ChangeAction, ChangeStatus},
        organization_roles::OrganizationRole,
    },
    permission_sets::PermissionSet,
    subscription_owners::SubscriptionOwner,
};

/// Authenticated caller, scoped to one request. The role claim comes from the
/// identity provider and is informational; authorization always reads the
/// stored membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub organization_id: Option<Uuid>,
    pub role_claim: Option<OrganizationRole>,
}

impl Principal {
    pub fn user(user_id: Uuid) -> Self {
        Self {
            user_id,
            organization_id: None,
            role_claim: None,
        }
    }

    pub fn in_organization(user_id: Uuid, organization_id: Uuid) -> Self {
        Self {
            user_id,
            organization_id: Some(organization_id),
            role_claim: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManageSubscriptionRequest {
    pub action: ChangeAction,
    pub from_tier: String,
    pub to_tier: String,
    pub subscription_id: Uuid,
    #[serde(default)]
    pub effective_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub organization_id: Option<Uuid>,
    /// Requested seat limit to apply together with the plan change.
    #[serde(default)]
    pub seat_change: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ManageSubscriptionResponse {
    pub success: bool,
    pub change_id: Uuid,
    pub status: ChangeStatus,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    #[serde(default)]
    pub organization_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum OrganizationSubscriptionAction {
    AddSeats {
        seats: i32,
        #[serde(default)]
        approved_limit: Option<i32>,
    },
    RemoveSeats {
        seats: i32,
    },
    ChangePlan {
        plan: String,
        #[serde(default)]
        effective_date: Option<DateTime<Utc>>,
        #[serde(default)]
        seat_limit: Option<i32>,
    },
    UpdateBilling {
        #[serde(default)]
        auto_add_seats: Option<bool>,
        #[serde(default)]
        cancel_at_period_end: Option<bool>,
        #[serde(default)]
        seat_limit: Option<i32>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionRequest {
    pub owner: SubscriptionOwner,
    pub plan: String,
    #[serde(default)]
    pub seat_limit: Option<i32>,
    #[serde(default)]
    pub auto_add_seats: bool,
    #[serde(default)]
    pub external_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateMemberRequest {
    pub user_id: Uuid,
    pub role: OrganizationRole,
    #[serde(default)]
    pub custom_permissions: PermissionSet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeMemberRoleRequest {
    #[serde(default)]
    pub role: Option<OrganizationRole>,
    #[serde(default)]
    pub custom_permissions: Option<PermissionSet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenBillingPortalRequest {
    pub return_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BillingPortalSession {
    pub url: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn organization_actions_are_tagged_by_action() {
        let action: OrganizationSubscriptionAction =
            serde_json::from_value(json!({ "action": "add_seats", "seats": 3, "approvedLimit": 12 })).unwrap();
        assert_eq!(
            action,
            OrganizationSubscriptionAction::AddSeats {
                seats: 3,
                approved_limit: Some(12),
            }
        );

        let action: OrganizationSubscriptionAction =
            serde_json::from_value(json!({ "action": "update_billing", "autoAddSeats": true })).unwrap();
        assert_eq!(
            action,
            OrganizationSubscriptionAction::UpdateBilling {
                auto_add_seats: Some(true),
                cancel_at_period_end: None,
                seat_limit: None,
            }
        );
    }

    #[test]
    fn unknown_organization_action_is_rejected() {
        let parsed = serde_json::from_value::<OrganizationSubscriptionAction>(json!({ "action": "delete_everything" }));
        assert!(parsed.is_err());
    }

    #[test]
    fn manage_request_uses_camel_case() {
        let subscription_id = Uuid::new_v4();
        let request: ManageSubscriptionRequest = serde_json::from_value(json!({
            "action": "downgrade",
            "fromTier": "pro",
            "toTier": "basic",
            "subscriptionId": subscription_id,
        }))
        .unwrap();
        assert_eq!(request.action, ChangeAction::Downgrade);
        assert_eq!(request.subscription_id, subscription_id);
        assert!(request.effective_date.is_none());
    }
}
