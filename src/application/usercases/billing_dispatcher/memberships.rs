use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::{BillingDispatcher, subscription_write};
use crate::{
    application::usercases::{
        audit_emission::AuditContext,
        rbac::{self, Requirement},
        seat_allocator,
        subscription_state_machine::Settlement,
    },
    domain::{
        entities::{
            organization_memberships::OrganizationMembershipEntity, subscriptions::SubscriptionEntity,
        },
        errors::{BillingError, BillingResult},
        repositories::{
            audit_sink::AuditSink,
            billing_portal::BillingPortalGateway,
            billing_store::{BillingCommit, BillingStore},
        },
        value_objects::{
            enums::{
                audit_actions::AuditAction, organization_roles::OrganizationRole,
                permissions::Permission,
            },
            management::{ActivateMemberRequest, ChangeMemberRoleRequest, Principal},
            subscription_owners::SubscriptionOwner,
            subscriptions::{MembershipChangeResult, MembershipDto},
            transitions::{Transition, TransitionEffect},
        },
    },
};

impl<S, A, P> BillingDispatcher<S, A, P>
where
    S: BillingStore + Send + Sync + 'static,
    A: AuditSink + Send + Sync + 'static,
    P: BillingPortalGateway + Send + Sync + 'static,
{
    /// Activates (or re-activates) a member. Each active member holds one seat.
    pub async fn activate_member(
        &self,
        principal: &Principal,
        organization_id: Uuid,
        request: ActivateMemberRequest,
    ) -> BillingResult<MembershipChangeResult> {
        info!(
            user_id = %principal.user_id,
            %organization_id,
            member_id = %request.user_id,
            role = %request.role,
            "billing_dispatcher: member activation requested"
        );

        let actor = self
            .require_member(
                principal,
                organization_id,
                Requirement::Permission(Permission::ManageMembers),
            )
            .await?;
        let found = self
            .active_subscription_for(SubscriptionOwner::Organization(organization_id))
            .await?;

        let guard = self.locks.acquire(&found.id.to_string()).await?;
        let now = self.clock.now();
        let original = self.load_subscription(found.id).await?;
        let existing = self.store.find_membership(organization_id, request.user_id).await?;
        if existing.as_ref().is_some_and(|membership| membership.is_active) {
            return Err(BillingError::conflict(
                Some(original.id),
                "activate member",
                "active",
                format!("user {} is already an active member", request.user_id),
            ));
        }
        rbac::ensure_can_assign(&actor, None, request.role, request.custom_permissions)?;

        let settlement = self.load_settled(&original, now).await?;
        let current = settlement.subscription.clone();
        let plan = self.catalog.get(&current.plan_id)?;
        seat_allocator::ensure_can_activate_member(&current)?;
        let seats = seat_allocator::add_seats(&current, &plan, 1, None)?;

        let membership = match existing {
            Some(mut membership) => {
                membership.role = request.role;
                membership.custom_permissions = request.custom_permissions;
                membership.is_active = true;
                membership.deactivated_at = None;
                membership.updated_at = now;
                membership
            }
            None => OrganizationMembershipEntity {
                id: Uuid::new_v4(),
                organization_id,
                user_id: request.user_id,
                role: request.role,
                custom_permissions: request.custom_permissions,
                is_active: true,
                created_at: now,
                updated_at: now,
                deactivated_at: None,
            },
        };
        let effect = TransitionEffect::new(
            AuditAction::MemberActivated,
            json!({ "userId": membership.user_id, "role": membership.role }),
        );

        let update = MembershipUpdate {
            original,
            settlement,
            seats,
            effect,
            membership,
        };
        let result = self.commit_membership(principal, update, now).await;
        drop(guard);
        result
    }

    pub async fn change_member_role(
        &self,
        principal: &Principal,
        organization_id: Uuid,
        member_id: Uuid,
        request: ChangeMemberRoleRequest,
    ) -> BillingResult<MembershipChangeResult> {
        if request.role.is_none() && request.custom_permissions.is_none() {
            return Err(BillingError::Validation(
                "role or customPermissions is required".to_string(),
            ));
        }
        if member_id == principal.user_id {
            return Err(BillingError::Validation(
                "members cannot change their own role".to_string(),
            ));
        }

        let actor = self
            .require_member(
                principal,
                organization_id,
                Requirement::Permission(Permission::ManageRoles),
            )
            .await?;

        let found = self
            .store
            .find_active_subscription_for_owner(SubscriptionOwner::Organization(organization_id))
            .await?;
        let guard = match &found {
            Some(subscription) => Some(self.locks.acquire(&subscription.id.to_string()).await?),
            None => None,
        };
        let target = self.active_member(organization_id, member_id).await?;

        let role = request.role.unwrap_or(target.role);
        let custom_permissions = request.custom_permissions.unwrap_or(target.custom_permissions);
        rbac::ensure_can_assign(&actor, Some(&target), role, custom_permissions)?;

        let now = self.clock.now();
        let mut membership = target.clone();
        membership.role = role;
        membership.custom_permissions = custom_permissions;
        membership.updated_at = now;

        self.commit(BillingCommit {
            memberships: vec![membership.clone()],
            ..Default::default()
        })
        .await?;
        drop(guard);

        let subscription = found;
        if let Some(subscription) = &subscription {
            let context = AuditContext {
                actor_user_id: Some(principal.user_id),
                ..Default::default()
            };
            let effect = TransitionEffect::new(
                AuditAction::MemberRoleChanged,
                json!({
                    "userId": member_id,
                    "from": target.role,
                    "to": role,
                    "customPermissions": custom_permissions,
                }),
            );
            self.audit
                .emit(self.records(subscription, &[effect], &context, now))
                .await;
        }

        info!(
            %organization_id,
            %member_id,
            from = %target.role,
            to = %role,
            "billing_dispatcher: member role changed"
        );
        Ok(MembershipChangeResult {
            membership: MembershipDto::new(&membership, rbac::resolve(&membership)),
            seats: subscription.as_ref().map(seat_allocator::compute_availability),
        })
    }

    /// Deactivates a member and frees their seat. Members may always remove
    /// themselves, except the owner.
    pub async fn remove_member(
        &self,
        principal: &Principal,
        organization_id: Uuid,
        member_id: Uuid,
    ) -> BillingResult<MembershipChangeResult> {
        let actor = if member_id != principal.user_id {
            Some(
                self.require_member(
                    principal,
                    organization_id,
                    Requirement::Permission(Permission::ManageMembers),
                )
                .await?,
            )
        } else {
            None
        };

        let found = self
            .active_subscription_for(SubscriptionOwner::Organization(organization_id))
            .await?;
        let guard = self.locks.acquire(&found.id.to_string()).await?;
        let target = self.active_member(organization_id, member_id).await?;
        if let Some(actor) = actor {
            if !actor.role.includes(target.role) {
                return Err(BillingError::PermissionDenied {
                    user_id: principal.user_id,
                    required: format!("role {} or higher to remove this member", target.role),
                });
            }
        }
        if target.role == OrganizationRole::Owner {
            return Err(BillingError::conflict(
                None,
                "remove member",
                "owner",
                "the organization owner cannot be removed",
            ));
        }

        let now = self.clock.now();
        let original = self.load_subscription(found.id).await?;
        let settlement = self.load_settled(&original, now).await?;
        let seats = seat_allocator::release_member_seat(&settlement.subscription)?;

        let mut membership = target;
        membership.is_active = false;
        membership.deactivated_at = Some(now);
        membership.updated_at = now;
        let effect = TransitionEffect::new(
            AuditAction::MemberRemoved,
            json!({ "userId": member_id, "role": membership.role }),
        );

        let update = MembershipUpdate {
            original,
            settlement,
            seats,
            effect,
            membership,
        };
        let result = self.commit_membership(principal, update, now).await;
        drop(guard);
        result
    }

    /// Reads the member while the caller holds the subscription lock, so a
    /// removal that committed first is seen here.
    async fn active_member(
        &self,
        organization_id: Uuid,
        member_id: Uuid,
    ) -> BillingResult<OrganizationMembershipEntity> {
        self.store
            .find_membership(organization_id, member_id)
            .await?
            .filter(|membership| membership.is_active)
            .ok_or_else(|| BillingError::NotFound(format!("active member {member_id}")))
    }

    /// Commits the membership together with its seat change. Audit records
    /// are emitted before the caller releases the subscription lock.
    async fn commit_membership(
        &self,
        principal: &Principal,
        update: MembershipUpdate,
        now: DateTime<Utc>,
    ) -> BillingResult<MembershipChangeResult> {
        let MembershipUpdate {
            original,
            settlement,
            seats,
            effect,
            membership,
        } = update;
        let next = seats.next;
        self.commit(BillingCommit {
            subscription: subscription_write(&original, next.clone(), now),
            changes: settlement.change_writes,
            memberships: vec![membership.clone()],
            processed_event: None,
        })
        .await?;

        let mut records = self.records(&next, &settlement.effects, &AuditContext::default(), now);
        let mut effects = seats.effects;
        effects.push(effect);
        records.extend(self.records(
            &next,
            &effects,
            &AuditContext {
                actor_user_id: Some(principal.user_id),
                ..Default::default()
            },
            now,
        ));
        self.audit.emit(records).await;

        info!(
            organization_id = %membership.organization_id,
            member_id = %membership.user_id,
            is_active = membership.is_active,
            used_seats = next.used_seats,
            seat_limit = next.seat_limit,
            "billing_dispatcher: membership updated"
        );
        Ok(MembershipChangeResult {
            membership: MembershipDto::new(&membership, rbac::resolve(&membership)),
            seats: Some(seat_allocator::compute_availability(&next)),
        })
    }
}

struct MembershipUpdate {
    original: SubscriptionEntity,
    settlement: Settlement,
    seats: Transition,
    effect: TransitionEffect,
    membership: OrganizationMembershipEntity,
}
