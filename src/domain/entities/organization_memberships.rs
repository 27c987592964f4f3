use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    domain::{
        errors::StoreError,
        value_objects::{
            enums::organization_roles::OrganizationRole, permission_sets::PermissionSet,
        },
    },
    infrastructure::postgres::schema::organization_memberships,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationMembershipEntity {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub role: OrganizationRole,
    /// Additive overlay on top of the role-derived permissions.
    pub custom_permissions: PermissionSet,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deactivated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Identifiable, Selectable, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = organization_memberships, treat_none_as_null = true)]
pub struct OrganizationMembershipRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub custom_permissions: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrganizationMembershipRow> for OrganizationMembershipEntity {
    type Error = StoreError;

    fn try_from(value: OrganizationMembershipRow) -> Result<Self, Self::Error> {
        let role = OrganizationRole::from_str(&value.role).ok_or_else(|| {
            StoreError::Corrupt(format!("membership {} has unknown role {}", value.id, value.role))
        })?;
        let custom_permissions = PermissionSet::from_names(&value.custom_permissions)
            .map_err(|reason| StoreError::Corrupt(format!("membership {}: {reason}", value.id)))?;

        Ok(Self {
            id: value.id,
            organization_id: value.organization_id,
            user_id: value.user_id,
            role,
            custom_permissions,
            is_active: value.is_active,
            created_at: value.created_at,
            updated_at: value.updated_at,
            deactivated_at: value.deactivated_at,
        })
    }
}

impl From<&OrganizationMembershipEntity> for OrganizationMembershipRow {
    fn from(value: &OrganizationMembershipEntity) -> Self {
        Self {
            id: value.id,
            organization_id: value.organization_id,
            user_id: value.user_id,
            role: value.role.as_str().to_string(),
            custom_permissions: value.custom_permissions.to_names(),
            is_active: value.is_active,
            created_at: value.created_at,
            updated_at: value.updated_at,
            deactivated_at: value.deactivated_at,
        }
    }
}
