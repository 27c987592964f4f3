pub mod audit_actions;
pub mod change_actions;
pub mod event_types;
pub mod organization_roles;
pub mod owner_types;
pub mod permissions;
pub mod seat_utilization;
pub mod subscription_statuses;
