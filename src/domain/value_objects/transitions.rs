use serde_json::Value;

use crate::domain::{
    entities::subscriptions::SubscriptionEntity,
    value_objects::enums::audit_actions::AuditAction,
};

/// One observable effect of a transition, later turned into an audit record.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionEffect {
    pub action: AuditAction,
    pub detail: Value,
}

impl TransitionEffect {
    pub fn new(action: AuditAction, detail: Value) -> Self {
        Self { action, detail }
    }
}

/// Candidate next state of a subscription plus what changed. Nothing is
/// persisted until the dispatcher commits `next`.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub next: SubscriptionEntity,
    pub effects: Vec<TransitionEffect>,
}

impl Transition {
    pub fn unchanged(subscription: &SubscriptionEntity) -> Self {
        Self {
            next: subscription.clone(),
            effects: Vec::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn then(mut self, other: Transition) -> Self {
        self.next = other.next;
        self.effects.extend(other.effects);
        self
    }
}
