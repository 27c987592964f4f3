use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Fixed permission vocabulary. Discriminants are bit positions in
/// `PermissionSet`, so existing values must never be renumbered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewSubscription = 0,
    ViewProjects = 1,
    EditProjects = 2,
    ManageProjects = 3,
    ViewBilling = 4,
    ManagePlan = 5,
    ManageSeats = 6,
    ManageBilling = 7,
    AccessBillingPortal = 8,
    ManageMembers = 9,
    ManageRoles = 10,
    DeleteOrganization = 11,
    TransferOwnership = 12,
}

impl Permission {
    pub const ALL: [Permission; 13] = [
        Permission::ViewSubscription,
        Permission::ViewProjects,
        Permission::EditProjects,
        Permission::ManageProjects,
        Permission::ViewBilling,
        Permission::ManagePlan,
        Permission::ManageSeats,
        Permission::ManageBilling,
        Permission::AccessBillingPortal,
        Permission::ManageMembers,
        Permission::ManageRoles,
        Permission::DeleteOrganization,
        Permission::TransferOwnership,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ViewSubscription => "view_subscription",
            Permission::ViewProjects => "view_projects",
            Permission::EditProjects => "edit_projects",
            Permission::ManageProjects => "manage_projects",
            Permission::ViewBilling => "view_billing",
            Permission::ManagePlan => "manage_plan",
            Permission::ManageSeats => "manage_seats",
            Permission::ManageBilling => "manage_billing",
            Permission::AccessBillingPortal => "access_billing_portal",
            Permission::ManageMembers => "manage_members",
            Permission::ManageRoles => "manage_roles",
            Permission::DeleteOrganization => "delete_organization",
            Permission::TransferOwnership => "transfer_ownership",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        Permission::ALL.into_iter().find(|p| p.as_str() == value)
    }

    pub(crate) fn bit(&self) -> u32 {
        1 << (*self as u32)
    }
}

impl Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
