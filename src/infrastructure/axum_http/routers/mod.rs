pub mod billing_events;
pub mod organizations;
pub mod plans;
pub mod subscriptions;
