use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Upgrade,
    Downgrade,
    Cancellation,
    Reactivation,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Upgrade => "upgrade",
            ChangeAction::Downgrade => "downgrade",
            ChangeAction::Cancellation => "cancellation",
            ChangeAction::Reactivation => "reactivation",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "upgrade" => Some(ChangeAction::Upgrade),
            "downgrade" => Some(ChangeAction::Downgrade),
            "cancellation" => Some(ChangeAction::Cancellation),
            "reactivation" => Some(ChangeAction::Reactivation),
            _ => None,
        }
    }

    pub fn is_plan_change(&self) -> bool {
        matches!(self, ChangeAction::Upgrade | ChangeAction::Downgrade)
    }
}

impl Display for ChangeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Pending,
    Scheduled,
    Applied,
    Failed,
}

impl ChangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeStatus::Pending => "pending",
            ChangeStatus::Scheduled => "scheduled",
            ChangeStatus::Applied => "applied",
            ChangeStatus::Failed => "failed",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ChangeStatus::Pending),
            "scheduled" => Some(ChangeStatus::Scheduled),
            "applied" => Some(ChangeStatus::Applied),
            "failed" => Some(ChangeStatus::Failed),
            _ => None,
        }
    }
}

impl Display for ChangeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
