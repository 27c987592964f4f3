use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::enums::owner_types::OwnerType;

/// Owner of a subscription. Exactly one of user or organization, so the
/// "both or neither" state cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "OwnerRef", into = "OwnerRef")]
pub enum SubscriptionOwner {
    User(Uuid),
    Organization(Uuid),
}

impl SubscriptionOwner {
    pub fn owner_type(&self) -> OwnerType {
        match self {
            SubscriptionOwner::User(_) => OwnerType::Individual,
            SubscriptionOwner::Organization(_) => OwnerType::Organization,
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            SubscriptionOwner::User(id) => Some(*id),
            SubscriptionOwner::Organization(_) => None,
        }
    }

    pub fn organization_id(&self) -> Option<Uuid> {
        match self {
            SubscriptionOwner::User(_) => None,
            SubscriptionOwner::Organization(id) => Some(*id),
        }
    }

    /// Rebuilds an owner from the two nullable columns of a stored row.
    pub fn from_columns(user_id: Option<Uuid>, organization_id: Option<Uuid>) -> Result<Self, String> {
        match (user_id, organization_id) {
            (Some(user_id), None) => Ok(SubscriptionOwner::User(user_id)),
            (None, Some(organization_id)) => Ok(SubscriptionOwner::Organization(organization_id)),
            (Some(_), Some(_)) => Err("subscription owner has both user_id and organization_id".to_string()),
            (None, None) => Err("subscription owner has neither user_id nor organization_id".to_string()),
        }
    }
}

/// Wire shape of an owner: `{"userId": ..}` or `{"organizationId": ..}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<Uuid>,
}

impl TryFrom<OwnerRef> for SubscriptionOwner {
    type Error = String;

    fn try_from(value: OwnerRef) -> Result<Self, Self::Error> {
        SubscriptionOwner::from_columns(value.user_id, value.organization_id)
    }
}

impl From<SubscriptionOwner> for OwnerRef {
    fn from(value: SubscriptionOwner) -> Self {
        Self {
            user_id: value.user_id(),
            organization_id: value.organization_id(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_one_owner_column_is_accepted() {
        let id = Uuid::new_v4();
        assert_eq!(
            SubscriptionOwner::from_columns(Some(id), None).unwrap(),
            SubscriptionOwner::User(id)
        );
        assert_eq!(
            SubscriptionOwner::from_columns(None, Some(id)).unwrap(),
            SubscriptionOwner::Organization(id)
        );
        assert!(SubscriptionOwner::from_columns(Some(id), Some(id)).is_err());
        assert!(SubscriptionOwner::from_columns(None, None).is_err());
    }

    #[test]
    fn wire_shape_rejects_both_owners() {
        let id = Uuid::new_v4();
        let both = format!(r#"{{"userId":"{id}","organizationId":"{id}"}}"#);
        assert!(serde_json::from_str::<SubscriptionOwner>(&both).is_err());
        assert!(serde_json::from_str::<SubscriptionOwner>("{}").is_err());

        let org = format!(r#"{{"organizationId":"{id}"}}"#);
        let owner: SubscriptionOwner = serde_json::from_str(&org).unwrap();
        assert_eq!(owner.owner_type(), OwnerType::Organization);
    }
}
