pub mod audit_emission;
pub mod billing_dispatcher;
pub mod clock;
pub mod plan_catalog;
pub mod rbac;
pub mod seat_allocator;
pub mod subscription_locks;
pub mod subscription_state_machine;
