use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OwnerType {
    Individual,
    Organization,
}

impl OwnerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerType::Individual => "individual",
            OwnerType::Organization => "organization",
        }
    }
}

impl Display for OwnerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which owner types a plan may be sold to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PlanApplicability {
    Individual,
    Organization,
    Both,
}

impl PlanApplicability {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanApplicability::Individual => "individual",
            PlanApplicability::Organization => "organization",
            PlanApplicability::Both => "both",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "individual" => Some(PlanApplicability::Individual),
            "organization" => Some(PlanApplicability::Organization),
            "both" => Some(PlanApplicability::Both),
            _ => None,
        }
    }

    pub fn allows(&self, owner_type: OwnerType) -> bool {
        match self {
            PlanApplicability::Both => true,
            PlanApplicability::Individual => owner_type == OwnerType::Individual,
            PlanApplicability::Organization => owner_type == OwnerType::Organization,
        }
    }
}

impl Display for PlanApplicability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
