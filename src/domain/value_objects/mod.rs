pub mod billing_events;
pub mod enums;
pub mod management;
pub mod permission_sets;
pub mod subscription_owners;
pub mod subscriptions;
pub mod transitions;
