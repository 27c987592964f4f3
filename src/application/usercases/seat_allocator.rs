use serde_json::json;

use crate::domain::{
    entities::{plans::PlanEntity, subscriptions::SubscriptionEntity},
    errors::{BillingError, BillingResult},
    value_objects::{
        enums::{audit_actions::AuditAction, owner_types::OwnerType, seat_utilization::SeatUtilization},
        subscriptions::SeatAvailability,
        transitions::{Transition, TransitionEffect},
    },
};

fn ensure_seat_managed(subscription: &SubscriptionEntity, attempted: &str) -> BillingResult<()> {
    if subscription.owner.owner_type() == OwnerType::Individual {
        return Err(BillingError::Validation(
            "seats can only be managed on organization subscriptions".to_string(),
        ));
    }
    if !subscription.status.is_live() {
        return Err(BillingError::conflict(
            Some(subscription.id),
            attempted,
            subscription.status.as_str(),
            "subscription is not live",
        ));
    }
    Ok(())
}

fn ensure_positive(seats: i32) -> BillingResult<()> {
    if seats <= 0 {
        return Err(BillingError::Validation(format!(
            "seat count must be positive, got {seats}"
        )));
    }
    Ok(())
}

fn ensure_within_plan(subscription: &SubscriptionEntity, plan: &PlanEntity, limit: i32, attempted: &str) -> BillingResult<()> {
    match plan.max_seats {
        Some(max_seats) if limit > max_seats => Err(BillingError::conflict(
            Some(subscription.id),
            attempted,
            subscription.status.as_str(),
            format!("plan {} allows at most {max_seats} seats", plan.id),
        )),
        _ => Ok(()),
    }
}

pub fn compute_availability(subscription: &SubscriptionEntity) -> SeatAvailability {
    let utilization = SeatUtilization::from_counts(subscription.used_seats, subscription.seat_limit);
    SeatAvailability {
        seat_limit: subscription.seat_limit,
        used_seats: subscription.used_seats,
        available: (subscription.seat_limit - subscription.used_seats).max(0),
        utilization,
        auto_add_seats: subscription.auto_add_seats,
        can_activate_member: subscription.status.is_live()
            && (subscription.auto_add_seats || utilization != SeatUtilization::AtLimit),
    }
}

/// Consumes `seats` seats. Going past the limit grows it when seats are added
/// automatically, or when `approved_limit` covers the new total.
pub fn add_seats(
    subscription: &SubscriptionEntity,
    plan: &PlanEntity,
    seats: i32,
    approved_limit: Option<i32>,
) -> BillingResult<Transition> {
    let attempted = format!("add {seats} seats");
    ensure_seat_managed(subscription, &attempted)?;
    ensure_positive(seats)?;

    let used_seats = subscription.used_seats + seats;
    let seat_limit = if used_seats <= subscription.seat_limit {
        subscription.seat_limit
    } else if subscription.auto_add_seats {
        used_seats
    } else {
        match approved_limit {
            Some(limit) if limit >= used_seats => limit,
            _ => {
                return Err(BillingError::conflict(
                    Some(subscription.id),
                    attempted,
                    subscription.status.as_str(),
                    format!(
                        "{used_seats} seats would exceed the limit of {}",
                        subscription.seat_limit
                    ),
                ));
            }
        }
    };
    ensure_within_plan(subscription, plan, seat_limit, &attempted)?;

    let mut next = subscription.clone();
    next.used_seats = used_seats;
    next.seat_limit = seat_limit;

    let mut effects = vec![TransitionEffect::new(
        AuditAction::SeatsAdded,
        json!({ "seats": seats, "usedSeats": used_seats, "seatLimit": seat_limit }),
    )];
    if seat_limit != subscription.seat_limit {
        effects.push(TransitionEffect::new(
            AuditAction::SeatLimitChanged,
            json!({ "from": subscription.seat_limit, "to": seat_limit }),
        ));
    }

    Ok(Transition { next, effects })
}

/// Frees `seats` seats. Used seats never drop below one.
pub fn remove_seats(subscription: &SubscriptionEntity, seats: i32) -> BillingResult<Transition> {
    ensure_seat_managed(subscription, &format!("remove {seats} seats"))?;
    ensure_positive(seats)?;
    Ok(release(subscription, seats))
}

/// Frees the seat held by a departing member. Applies in every status so a
/// later reactivation starts from the real member count.
pub fn release_member_seat(subscription: &SubscriptionEntity) -> BillingResult<Transition> {
    if subscription.owner.owner_type() == OwnerType::Individual {
        return Err(BillingError::Validation(
            "seats can only be managed on organization subscriptions".to_string(),
        ));
    }
    Ok(release(subscription, 1))
}

fn release(subscription: &SubscriptionEntity, seats: i32) -> Transition {
    let used_seats = (subscription.used_seats - seats).max(1);
    let mut next = subscription.clone();
    next.used_seats = used_seats;

    Transition {
        next,
        effects: vec![TransitionEffect::new(
            AuditAction::SeatsRemoved,
            json!({ "seats": seats, "usedSeats": used_seats, "seatLimit": subscription.seat_limit }),
        )],
    }
}

pub fn resize_limit(subscription: &SubscriptionEntity, plan: &PlanEntity, seat_limit: i32) -> BillingResult<Transition> {
    let attempted = format!("set seat limit to {seat_limit}");
    ensure_seat_managed(subscription, &attempted)?;
    if seat_limit < plan.min_seats.max(1) {
        return Err(BillingError::Validation(format!(
            "plan {} requires at least {} seats",
            plan.id, plan.min_seats
        )));
    }
    ensure_within_plan(subscription, plan, seat_limit, &attempted)?;
    if seat_limit < subscription.used_seats && !subscription.auto_add_seats {
        return Err(BillingError::conflict(
            Some(subscription.id),
            attempted,
            subscription.status.as_str(),
            format!("{} seats are in use", subscription.used_seats),
        ));
    }
    if seat_limit == subscription.seat_limit {
        return Ok(Transition::unchanged(subscription));
    }

    let mut next = subscription.clone();
    next.seat_limit = seat_limit;

    Ok(Transition {
        next,
        effects: vec![TransitionEffect::new(
            AuditAction::SeatLimitChanged,
            json!({ "from": subscription.seat_limit, "to": seat_limit }),
        )],
    })
}

/// A member can be activated while a seat is free, or at the limit when
/// seats are added automatically.
pub fn ensure_can_activate_member(subscription: &SubscriptionEntity) -> BillingResult<()> {
    ensure_seat_managed(subscription, "activate member")?;
    if compute_availability(subscription).can_activate_member {
        Ok(())
    } else {
        Err(BillingError::conflict(
            Some(subscription.id),
            "activate member",
            subscription.status.as_str(),
            format!("all {} seats are in use", subscription.seat_limit),
        ))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::{
        application::usercases::plan_catalog::PlanCatalog,
        domain::value_objects::{
            enums::subscription_statuses::SubscriptionStatus, subscription_owners::SubscriptionOwner,
        },
    };

    fn organization_subscription(seat_limit: i32, used_seats: i32, auto_add_seats: bool) -> SubscriptionEntity {
        let now = Utc::now();
        SubscriptionEntity {
            id: Uuid::new_v4(),
            external_ref: None,
            owner: SubscriptionOwner::Organization(Uuid::new_v4()),
            status: SubscriptionStatus::Active,
            plan_id: "team-v1".to_string(),
            seat_limit,
            used_seats,
            auto_add_seats,
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
        }
    }

    fn team() -> PlanEntity {
        PlanCatalog::builtin().resolve("team").unwrap()
    }

    #[test]
    fn add_seat_at_limit_without_auto_add_conflicts() {
        let subscription = organization_subscription(5, 5, false);
        let err = add_seats(&subscription, &team(), 1, None).unwrap_err();
        assert!(matches!(err, BillingError::Conflict { .. }));
    }

    #[test]
    fn add_seat_with_auto_add_grows_limit() {
        let subscription = organization_subscription(5, 5, true);
        let transition = add_seats(&subscription, &team(), 2, None).unwrap();
        assert_eq!(transition.next.used_seats, 7);
        assert_eq!(transition.next.seat_limit, 7);
        assert_eq!(transition.effects.len(), 2);
    }

    #[test]
    fn approved_limit_must_cover_new_total() {
        let subscription = organization_subscription(5, 5, false);
        assert!(add_seats(&subscription, &team(), 3, Some(7)).is_err());

        let transition = add_seats(&subscription, &team(), 3, Some(10)).unwrap();
        assert_eq!(transition.next.used_seats, 8);
        assert_eq!(transition.next.seat_limit, 10);
    }

    #[test]
    fn plan_maximum_is_never_exceeded() {
        let subscription = organization_subscription(100, 100, true);
        assert!(matches!(
            add_seats(&subscription, &team(), 1, None),
            Err(BillingError::Conflict { .. })
        ));
    }

    #[test]
    fn remove_seats_floors_at_one() {
        let subscription = organization_subscription(5, 3, false);
        let transition = remove_seats(&subscription, 10).unwrap();
        assert_eq!(transition.next.used_seats, 1);
        assert_eq!(transition.next.seat_limit, 5);
    }

    #[test]
    fn seat_invariant_holds_across_operations() {
        let plan = team();
        let mut subscription = organization_subscription(4, 1, false);
        for step in 0..20 {
            let result = if step % 3 == 2 {
                remove_seats(&subscription, 1)
            } else {
                add_seats(&subscription, &plan, 1, None)
            };
            if let Ok(transition) = result {
                subscription = transition.next;
            }
            assert!(subscription.used_seats <= subscription.seat_limit);
            assert!(subscription.used_seats >= 1);
        }
    }

    #[test]
    fn individual_subscription_rejects_seat_operations() {
        let mut subscription = organization_subscription(1, 1, false);
        subscription.owner = SubscriptionOwner::User(Uuid::new_v4());
        assert!(matches!(
            add_seats(&subscription, &team(), 1, None),
            Err(BillingError::Validation(_))
        ));
        assert!(matches!(remove_seats(&subscription, 1), Err(BillingError::Validation(_))));
    }

    #[test]
    fn canceled_subscription_rejects_seat_operations() {
        let mut subscription = organization_subscription(5, 2, false);
        subscription.status = SubscriptionStatus::Canceled;
        assert!(matches!(
            add_seats(&subscription, &team(), 1, None),
            Err(BillingError::Conflict { .. })
        ));
    }

    #[test]
    fn departing_member_frees_a_seat_on_a_canceled_subscription() {
        let mut subscription = organization_subscription(5, 3, false);
        subscription.status = SubscriptionStatus::Canceled;
        assert!(matches!(remove_seats(&subscription, 1), Err(BillingError::Conflict { .. })));

        let transition = release_member_seat(&subscription).unwrap();
        assert_eq!(transition.next.used_seats, 2);
        assert_eq!(transition.next.status, SubscriptionStatus::Canceled);
        assert_eq!(transition.effects[0].action, AuditAction::SeatsRemoved);
    }

    #[test]
    fn shrinking_below_used_seats_conflicts() {
        let subscription = organization_subscription(10, 6, false);
        assert!(resize_limit(&subscription, &team(), 5).is_err());
        assert_eq!(resize_limit(&subscription, &team(), 8).unwrap().next.seat_limit, 8);
        assert!(matches!(resize_limit(&subscription, &team(), 1), Err(BillingError::Validation(_))));
    }

    #[test]
    fn availability_bands() {
        let near = compute_availability(&organization_subscription(10, 8, false));
        assert_eq!(near.utilization, SeatUtilization::NearLimit);
        assert!(near.can_activate_member);
        assert_eq!(near.available, 2);

        let full = organization_subscription(10, 10, false);
        assert!(!compute_availability(&full).can_activate_member);
        assert!(ensure_can_activate_member(&full).is_err());

        let auto = organization_subscription(10, 10, true);
        assert!(ensure_can_activate_member(&auto).is_ok());
    }
}
