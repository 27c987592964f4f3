//! Role and permission resolution for organization memberships.

use uuid::Uuid;

use crate::domain::{
    entities::{organization_memberships::OrganizationMembershipEntity, subscriptions::SubscriptionEntity},
    errors::{BillingError, BillingResult},
    value_objects::{
        enums::{organization_roles::OrganizationRole, permissions::Permission},
        permission_sets::PermissionSet,
        subscription_owners::SubscriptionOwner,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Role(OrganizationRole),
    Permission(Permission),
}

impl Requirement {
    fn describe(&self) -> String {
        match self {
            Requirement::Role(role) => format!("role {role}"),
            Requirement::Permission(permission) => format!("permission {}", permission.as_str()),
        }
    }
}

/// Permissions a role adds on top of the role directly below it.
fn granted_by(role: OrganizationRole) -> &'static [Permission] {
    match role {
        OrganizationRole::Viewer => &[Permission::ViewSubscription, Permission::ViewProjects],
        OrganizationRole::Developer => &[Permission::EditProjects],
        OrganizationRole::ProjectManager => &[Permission::ManageProjects],
        OrganizationRole::BillingManager => &[
            Permission::ViewBilling,
            Permission::ManagePlan,
            Permission::ManageSeats,
            Permission::ManageBilling,
            Permission::AccessBillingPortal,
        ],
        OrganizationRole::Admin => &[Permission::ManageMembers, Permission::ManageRoles],
        OrganizationRole::Owner => &[Permission::DeleteOrganization, Permission::TransferOwnership],
    }
}

/// Cumulative permissions of `role`: every role holds what the roles below it hold.
pub fn role_permissions(role: OrganizationRole) -> PermissionSet {
    OrganizationRole::ALL
        .iter()
        .filter(|candidate| role.includes(**candidate))
        .flat_map(|candidate| granted_by(*candidate).iter().copied())
        .collect()
}

pub fn resolve(membership: &OrganizationMembershipEntity) -> PermissionSet {
    if !membership.is_active {
        return PermissionSet::empty();
    }
    role_permissions(membership.role).union(membership.custom_permissions)
}

pub fn authorize(membership: Option<&OrganizationMembershipEntity>, requirement: Requirement) -> bool {
    let Some(membership) = membership.filter(|membership| membership.is_active) else {
        return false;
    };
    match requirement {
        Requirement::Role(role) => membership.role.includes(role),
        Requirement::Permission(permission) => resolve(membership).contains(permission),
    }
}

pub fn require(
    user_id: Uuid,
    membership: Option<&OrganizationMembershipEntity>,
    requirement: Requirement,
) -> BillingResult<()> {
    if authorize(membership, requirement) {
        Ok(())
    } else {
        Err(BillingError::PermissionDenied {
            user_id,
            required: requirement.describe(),
        })
    }
}

/// Individual subscriptions authorize only their owner; organization
/// subscriptions go through the caller's membership in that organization.
pub fn require_for_subscription(
    user_id: Uuid,
    subscription: &SubscriptionEntity,
    membership: Option<&OrganizationMembershipEntity>,
    permission: Permission,
) -> BillingResult<()> {
    match subscription.owner {
        SubscriptionOwner::User(owner_id) if owner_id == user_id => Ok(()),
        SubscriptionOwner::User(_) => Err(BillingError::PermissionDenied {
            user_id,
            required: "subscription owner".to_string(),
        }),
        SubscriptionOwner::Organization(organization_id) => {
            let membership = membership.filter(|membership| membership.organization_id == organization_id);
            require(user_id, membership, Requirement::Permission(permission))
        }
    }
}

/// Checks that `actor` may give `target` the role `role` with the custom
/// overlay `custom`. Nobody can grant above their own rank, touch a member
/// ranked above them, or hand out permissions they do not hold.
pub fn ensure_can_assign(
    actor: &OrganizationMembershipEntity,
    target: Option<&OrganizationMembershipEntity>,
    role: OrganizationRole,
    custom: PermissionSet,
) -> BillingResult<()> {
    let denied = |required: String| BillingError::PermissionDenied {
        user_id: actor.user_id,
        required,
    };

    if !actor.role.includes(role) {
        return Err(denied(format!("role {} or higher to grant {role}", role)));
    }
    if let Some(target) = target {
        if !actor.role.includes(target.role) {
            return Err(denied(format!("role {} or higher to modify this member", target.role)));
        }
    }
    if !resolve(actor).is_superset_of(&custom) {
        return Err(denied("every custom permission being granted".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn membership(role: OrganizationRole) -> OrganizationMembershipEntity {
        OrganizationMembershipEntity {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            role,
            custom_permissions: PermissionSet::empty(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deactivated_at: None,
        }
    }

    #[test]
    fn higher_roles_hold_every_permission_of_lower_roles() {
        for pair in OrganizationRole::ALL.windows(2) {
            let lower = role_permissions(pair[0]);
            let higher = role_permissions(pair[1]);
            assert!(higher.is_superset_of(&lower), "{} should include {}", pair[1], pair[0]);
            assert_ne!(higher, lower);
        }
    }

    #[test]
    fn viewer_cannot_change_plan_but_admin_can() {
        let viewer = membership(OrganizationRole::Viewer);
        let admin = membership(OrganizationRole::Admin);
        assert!(!authorize(Some(&viewer), Requirement::Permission(Permission::ManagePlan)));
        assert!(authorize(Some(&admin), Requirement::Permission(Permission::ManagePlan)));
        assert!(authorize(Some(&viewer), Requirement::Permission(Permission::ViewSubscription)));
    }

    #[test]
    fn custom_permissions_only_add() {
        let mut developer = membership(OrganizationRole::Developer);
        developer.custom_permissions = PermissionSet::of(&[Permission::AccessBillingPortal]);

        let resolved = resolve(&developer);
        assert!(resolved.contains(Permission::AccessBillingPortal));
        assert!(resolved.is_superset_of(&role_permissions(OrganizationRole::Developer)));
        assert!(!resolved.contains(Permission::ManagePlan));
    }

    #[test]
    fn inactive_membership_authorizes_nothing() {
        let mut owner = membership(OrganizationRole::Owner);
        owner.is_active = false;
        assert!(resolve(&owner).is_empty());
        assert!(!authorize(Some(&owner), Requirement::Role(OrganizationRole::Viewer)));
        assert!(!authorize(None, Requirement::Permission(Permission::ViewSubscription)));
    }

    #[test]
    fn role_requirement_uses_hierarchy() {
        let billing_manager = membership(OrganizationRole::BillingManager);
        assert!(authorize(Some(&billing_manager), Requirement::Role(OrganizationRole::Developer)));
        assert!(!authorize(Some(&billing_manager), Requirement::Role(OrganizationRole::Admin)));
    }

    #[test]
    fn cannot_grant_above_own_rank() {
        let admin = membership(OrganizationRole::Admin);
        let target = membership(OrganizationRole::Developer);

        assert!(ensure_can_assign(&admin, Some(&target), OrganizationRole::Admin, PermissionSet::empty()).is_ok());
        assert!(matches!(
            ensure_can_assign(&admin, Some(&target), OrganizationRole::Owner, PermissionSet::empty()),
            Err(BillingError::PermissionDenied { .. })
        ));
    }

    #[test]
    fn cannot_modify_higher_ranked_member_or_overgrant() {
        let billing_manager = membership(OrganizationRole::BillingManager);
        let owner = membership(OrganizationRole::Owner);
        assert!(ensure_can_assign(&billing_manager, Some(&owner), OrganizationRole::Viewer, PermissionSet::empty()).is_err());

        let overlay = PermissionSet::of(&[Permission::ManageRoles]);
        assert!(ensure_can_assign(&billing_manager, None, OrganizationRole::Viewer, overlay).is_err());
    }

    #[test]
    fn individual_subscription_authorizes_only_owner() {
        let owner_id = Uuid::new_v4();
        let now = Utc::now();
        let subscription = SubscriptionEntity {
            id: Uuid::new_v4(),
            external_ref: None,
            owner: SubscriptionOwner::User(owner_id),
            status: Default::default(),
            plan_id: "basic-v1".to_string(),
            seat_limit: 1,
            used_seats: 1,
            auto_add_seats: false,
            trial_ends_at: None,
            current_period_start: now,
            current_period_end: now,
            cancel_at_period_end: false,
            canceled_at: None,
            expires_at: None,
            is_active: true,
            deleted_at: None,
            last_event_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        let someone_else = membership(OrganizationRole::Owner);

        assert!(require_for_subscription(owner_id, &subscription, None, Permission::ManagePlan).is_ok());
        assert!(require_for_subscription(someone_else.user_id, &subscription, Some(&someone_else), Permission::ManagePlan).is_err());
    }
}
