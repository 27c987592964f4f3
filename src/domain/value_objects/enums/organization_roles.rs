use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Organization role. Variant order is the hierarchy: a later variant
/// outranks every earlier one, so `Ord` is the rank comparison.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrganizationRole {
    Viewer,
    Developer,
    ProjectManager,
    BillingManager,
    Admin,
    Owner,
}

impl OrganizationRole {
    pub const ALL: [OrganizationRole; 6] = [
        OrganizationRole::Viewer,
        OrganizationRole::Developer,
        OrganizationRole::ProjectManager,
        OrganizationRole::BillingManager,
        OrganizationRole::Admin,
        OrganizationRole::Owner,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrganizationRole::Viewer => "viewer",
            OrganizationRole::Developer => "developer",
            OrganizationRole::ProjectManager => "project_manager",
            OrganizationRole::BillingManager => "billing_manager",
            OrganizationRole::Admin => "admin",
            OrganizationRole::Owner => "owner",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "viewer" => Some(OrganizationRole::Viewer),
            "developer" => Some(OrganizationRole::Developer),
            "project_manager" => Some(OrganizationRole::ProjectManager),
            "billing_manager" => Some(OrganizationRole::BillingManager),
            "admin" => Some(OrganizationRole::Admin),
            "owner" => Some(OrganizationRole::Owner),
            _ => None,
        }
    }

    pub fn rank(&self) -> u8 {
        *self as u8
    }

    /// True when this role carries at least the authority of `other`.
    pub fn includes(&self, other: OrganizationRole) -> bool {
        *self >= other
    }
}

impl Display for OrganizationRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchy_is_totally_ordered() {
        for pair in OrganizationRole::ALL.windows(2) {
            assert!(pair[0] < pair[1], "{} should rank below {}", pair[0], pair[1]);
            assert!(pair[1].includes(pair[0]));
            assert!(!pair[0].includes(pair[1]));
        }
    }

    #[test]
    fn parse_is_case_sensitive() {
        assert_eq!(
            OrganizationRole::from_str("billing_manager"),
            Some(OrganizationRole::BillingManager)
        );
        assert_eq!(OrganizationRole::from_str("Admin"), None);
        assert_eq!(OrganizationRole::from_str(""), None);
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&OrganizationRole::ProjectManager).unwrap();
        assert_eq!(json, "\"project_manager\"");
        let role: OrganizationRole = serde_json::from_str("\"owner\"").unwrap();
        assert_eq!(role, OrganizationRole::Owner);
    }
}
