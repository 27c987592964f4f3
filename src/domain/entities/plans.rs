use std::collections::BTreeSet;

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    domain::{errors::StoreError, value_objects::enums::owner_types::PlanApplicability},
    infrastructure::postgres::schema::subscriptions_plans,
};

/// A versioned plan definition. Never mutated once a subscription points at
/// it; changes to a tier are published as a new version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntity {
    pub id: String,
    pub tier: String,
    pub version: i32,
    pub name: String,
    pub rank: i32,
    pub applicability: PlanApplicability,
    pub per_seat: bool,
    pub min_seats: i32,
    pub max_seats: Option<i32>,
    pub trial_days: i32,
    pub price_minor: i32,
    pub features: BTreeSet<String>,
    pub is_offered: bool,
}

impl PlanEntity {
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }
}

/// Raw row used for Diesel queries. Features stay as JSON and are parsed into a set.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable, Insertable)]
#[diesel(table_name = subscriptions_plans)]
pub struct PlanRow {
    pub id: String,
    pub tier: String,
    pub version: i32,
    pub name: String,
    pub rank: i32,
    pub applicability: String,
    pub per_seat: bool,
    pub min_seats: i32,
    pub max_seats: Option<i32>,
    pub trial_days: i32,
    pub price_minor: i32,
    pub features: serde_json::Value,
    pub is_offered: bool,
}

impl TryFrom<PlanRow> for PlanEntity {
    type Error = StoreError;

    fn try_from(value: PlanRow) -> Result<Self, Self::Error> {
        let applicability = PlanApplicability::from_str(&value.applicability).ok_or_else(|| {
            StoreError::Corrupt(format!(
                "plan {} has unknown applicability {}",
                value.id, value.applicability
            ))
        })?;
        let features = serde_json::from_value(value.features).map_err(|err| {
            StoreError::Corrupt(format!("plan {} has invalid features: {err}", value.id))
        })?;

        Ok(Self {
            id: value.id,
            tier: value.tier,
            version: value.version,
            name: value.name,
            rank: value.rank,
            applicability,
            per_seat: value.per_seat,
            min_seats: value.min_seats,
            max_seats: value.max_seats,
            trial_days: value.trial_days,
            price_minor: value.price_minor,
            features,
            is_offered: value.is_offered,
        })
    }
}

impl From<&PlanEntity> for PlanRow {
    fn from(value: &PlanEntity) -> Self {
        Self {
            id: value.id.clone(),
            tier: value.tier.clone(),
            version: value.version,
            name: value.name.clone(),
            rank: value.rank,
            applicability: value.applicability.as_str().to_string(),
            per_seat: value.per_seat,
            min_seats: value.min_seats,
            max_seats: value.max_seats,
            trial_days: value.trial_days,
            price_minor: value.price_minor,
            features: serde_json::json!(value.features),
            is_offered: value.is_offered,
        }
    }
}
