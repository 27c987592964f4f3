use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{PoisonError, RwLock},
};

use serde::Deserialize;
use tracing::info;

use crate::domain::{
    entities::plans::PlanEntity,
    errors::{BillingError, BillingResult},
    repositories::plans::PlanRepository,
    value_objects::enums::owner_types::{OwnerType, PlanApplicability},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanComparison {
    Upgrade,
    Downgrade,
    SameTier,
}

/// Attributes of a plan version that is about to be published.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanDraft {
    pub name: String,
    pub rank: i32,
    pub applicability: PlanApplicability,
    pub per_seat: bool,
    pub min_seats: i32,
    pub max_seats: Option<i32>,
    pub trial_days: i32,
    pub price_minor: i32,
    pub features: BTreeSet<String>,
}

/// In-process view of the `subscriptions_plans` table, keyed by versioned id.
#[derive(Debug, Default)]
pub struct PlanCatalog {
    plans: RwLock<BTreeMap<String, PlanEntity>>,
}

impl PlanCatalog {
    pub fn new(plans: Vec<PlanEntity>) -> Self {
        let plans = plans
            .into_iter()
            .map(|plan| (plan.id.clone(), plan))
            .collect();
        Self {
            plans: RwLock::new(plans),
        }
    }

    pub async fn load<R>(repository: &R) -> BillingResult<Self>
    where
        R: PlanRepository + Send + Sync,
    {
        let plans = repository.list_plans().await?;
        info!(plan_count = plans.len(), "plan_catalog: plans loaded");
        Ok(Self::new(plans))
    }

    /// Default tiers used by the in-memory backend.
    pub fn builtin() -> Self {
        let plan = |tier: &str,
                    name: &str,
                    rank: i32,
                    applicability: PlanApplicability,
                    seats: (i32, Option<i32>),
                    trial_days: i32,
                    price_minor: i32,
                    features: &[&str]| PlanEntity {
            id: format!("{tier}-v1"),
            tier: tier.to_string(),
            version: 1,
            name: name.to_string(),
            rank,
            applicability,
            per_seat: seats.1 != Some(1),
            min_seats: seats.0,
            max_seats: seats.1,
            trial_days,
            price_minor,
            features: features.iter().map(|feature| feature.to_string()).collect(),
            is_offered: true,
        };

        Self::new(vec![
            plan("free", "Free", 0, PlanApplicability::Individual, (1, Some(1)), 0, 0, &["projects"]),
            plan("basic", "Basic", 1, PlanApplicability::Individual, (1, Some(1)), 14, 900, &[
                "projects",
                "exports",
            ]),
            plan("pro", "Pro", 2, PlanApplicability::Both, (1, Some(25)), 14, 2900, &[
                "projects",
                "exports",
                "integrations",
            ]),
            plan("team", "Team", 3, PlanApplicability::Organization, (2, Some(100)), 14, 4900, &[
                "projects",
                "exports",
                "integrations",
                "roles",
            ]),
            plan(
                "enterprise",
                "Enterprise",
                4,
                PlanApplicability::Organization,
                (10, None),
                0,
                9900,
                &["projects", "exports", "integrations", "roles", "sso", "audit_log"],
            ),
        ])
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, PlanEntity>> {
        self.plans.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, plan_id: &str) -> BillingResult<PlanEntity> {
        self.read()
            .get(plan_id)
            .cloned()
            .ok_or_else(|| BillingError::NotFound(format!("plan {plan_id}")))
    }

    /// Highest offered version of a tier.
    pub fn current_for_tier(&self, tier: &str) -> BillingResult<PlanEntity> {
        self.read()
            .values()
            .filter(|plan| plan.tier == tier && plan.is_offered)
            .max_by_key(|plan| plan.version)
            .cloned()
            .ok_or_else(|| BillingError::NotFound(format!("plan tier {tier}")))
    }

    /// Accepts a versioned plan id (`pro-v2`) or a bare tier (`pro`).
    pub fn resolve(&self, plan_or_tier: &str) -> BillingResult<PlanEntity> {
        self.get(plan_or_tier)
            .or_else(|_| self.current_for_tier(plan_or_tier))
    }

    /// Current offered version of every tier, cheapest first.
    pub fn list(&self, owner_type: Option<OwnerType>) -> Vec<PlanEntity> {
        let plans = self.read();
        let mut current: BTreeMap<&str, &PlanEntity> = BTreeMap::new();
        for plan in plans.values().filter(|plan| plan.is_offered) {
            let replace = current
                .get(plan.tier.as_str())
                .is_none_or(|existing| existing.version < plan.version);
            if replace {
                current.insert(plan.tier.as_str(), plan);
            }
        }

        let mut listed: Vec<PlanEntity> = current
            .into_values()
            .filter(|plan| owner_type.is_none_or(|owner_type| plan.applicability.allows(owner_type)))
            .cloned()
            .collect();
        listed.sort_by_key(|plan| plan.rank);
        listed
    }

    pub fn compare(&self, from: &PlanEntity, to: &PlanEntity) -> PlanComparison {
        if from.tier == to.tier {
            return PlanComparison::SameTier;
        }
        if to.rank > from.rank {
            PlanComparison::Upgrade
        } else {
            PlanComparison::Downgrade
        }
    }

    pub fn ensure_applicable(&self, plan: &PlanEntity, owner_type: OwnerType) -> BillingResult<()> {
        if plan.applicability.allows(owner_type) {
            Ok(())
        } else {
            Err(BillingError::Validation(format!(
                "plan {} is not available to {owner_type} subscriptions",
                plan.id
            )))
        }
    }

    pub fn ensure_seat_range(&self, plan: &PlanEntity, seats: i32) -> BillingResult<()> {
        if seats < plan.min_seats {
            return Err(BillingError::Validation(format!(
                "plan {} requires at least {} seats",
                plan.id, plan.min_seats
            )));
        }
        if let Some(max_seats) = plan.max_seats {
            if seats > max_seats {
                return Err(BillingError::Validation(format!(
                    "plan {} allows at most {max_seats} seats",
                    plan.id
                )));
            }
        }
        Ok(())
    }

    /// Publishes the next version of `tier`. Existing versions are never
    /// modified, so subscriptions keep pointing at the terms they bought.
    pub async fn publish_version<R>(
        &self,
        repository: &R,
        tier: &str,
        draft: PlanDraft,
    ) -> BillingResult<PlanEntity>
    where
        R: PlanRepository + Send + Sync,
    {
        if tier.trim().is_empty() || tier.contains(char::is_whitespace) {
            return Err(BillingError::Validation(format!("invalid tier name {tier:?}")));
        }
        if draft.min_seats < 1 || draft.max_seats.is_some_and(|max| max < draft.min_seats) {
            return Err(BillingError::Validation(
                "seat range must satisfy 1 <= minSeats <= maxSeats".to_string(),
            ));
        }

        let version = self
            .read()
            .values()
            .filter(|plan| plan.tier == tier)
            .map(|plan| plan.version)
            .max()
            .unwrap_or(0)
            + 1;

        let plan = PlanEntity {
            id: format!("{tier}-v{version}"),
            tier: tier.to_string(),
            version,
            name: draft.name,
            rank: draft.rank,
            applicability: draft.applicability,
            per_seat: draft.per_seat,
            min_seats: draft.min_seats,
            max_seats: draft.max_seats,
            trial_days: draft.trial_days,
            price_minor: draft.price_minor,
            features: draft.features,
            is_offered: true,
        };

        repository.insert_plan(plan.clone()).await?;
        self.plans
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(plan.id.clone(), plan.clone());

        info!(plan_id = %plan.id, %tier, version, "plan_catalog: plan version published");
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repositories::plans::MockPlanRepository;

    fn draft(price_minor: i32) -> PlanDraft {
        PlanDraft {
            name: "Pro".to_string(),
            rank: 2,
            applicability: PlanApplicability::Both,
            per_seat: true,
            min_seats: 1,
            max_seats: Some(50),
            trial_days: 14,
            price_minor,
            features: BTreeSet::from(["projects".to_string()]),
        }
    }

    #[test]
    fn resolve_accepts_tier_or_versioned_id() {
        let catalog = PlanCatalog::builtin();
        assert_eq!(catalog.resolve("pro").unwrap().id, "pro-v1");
        assert_eq!(catalog.resolve("team-v1").unwrap().tier, "team");
        assert!(matches!(catalog.resolve("platinum"), Err(BillingError::NotFound(_))));
    }

    #[test]
    fn compare_uses_rank() {
        let catalog = PlanCatalog::builtin();
        let basic = catalog.resolve("basic").unwrap();
        let pro = catalog.resolve("pro").unwrap();
        assert_eq!(catalog.compare(&basic, &pro), PlanComparison::Upgrade);
        assert_eq!(catalog.compare(&pro, &basic), PlanComparison::Downgrade);
        assert_eq!(catalog.compare(&pro, &pro), PlanComparison::SameTier);
    }

    #[test]
    fn list_filters_by_owner_type() {
        let catalog = PlanCatalog::builtin();
        let tiers: Vec<String> = catalog
            .list(Some(OwnerType::Organization))
            .into_iter()
            .map(|plan| plan.tier)
            .collect();
        assert_eq!(tiers, vec!["pro", "team", "enterprise"]);
        assert_eq!(catalog.list(None).len(), 5);
    }

    #[test]
    fn seat_range_and_applicability_are_enforced() {
        let catalog = PlanCatalog::builtin();
        let team = catalog.resolve("team").unwrap();
        assert!(catalog.ensure_seat_range(&team, 1).is_err());
        assert!(catalog.ensure_seat_range(&team, 100).is_ok());
        assert!(catalog.ensure_seat_range(&team, 101).is_err());
        assert!(catalog.ensure_applicable(&team, OwnerType::Individual).is_err());

        let enterprise = catalog.resolve("enterprise").unwrap();
        assert!(catalog.ensure_seat_range(&enterprise, 5_000).is_ok());
    }

    #[tokio::test]
    async fn publish_creates_next_version_without_touching_old_one() {
        let catalog = PlanCatalog::builtin();
        let mut repository = MockPlanRepository::new();
        repository
            .expect_insert_plan()
            .withf(|plan| plan.id == "pro-v2" && plan.version == 2)
            .times(1)
            .returning(|_| Ok(()));

        let published = catalog
            .publish_version(&repository, "pro", draft(3900))
            .await
            .unwrap();

        assert_eq!(published.id, "pro-v2");
        assert_eq!(catalog.get("pro-v1").unwrap().price_minor, 2900);
        assert_eq!(catalog.current_for_tier("pro").unwrap().price_minor, 3900);
        assert_eq!(catalog.list(None).iter().filter(|plan| plan.tier == "pro").count(), 1);
    }

    #[tokio::test]
    async fn publish_rejects_inverted_seat_range() {
        let catalog = PlanCatalog::builtin();
        let repository = MockPlanRepository::new();
        let mut bad = draft(100);
        bad.min_seats = 10;
        bad.max_seats = Some(5);

        let err = catalog.publish_version(&repository, "pro", bad).await.unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));
    }
}
