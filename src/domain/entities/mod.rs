pub mod audit_logs;
pub mod organization_memberships;
pub mod plans;
pub mod processed_events;
pub mod subscription_changes;
pub mod subscriptions;
