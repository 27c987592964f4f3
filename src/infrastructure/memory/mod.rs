//! Process-local adapters. Used by the dispatcher tests and by
//! `STORE_BACKEND=memory` for local runs without PostgreSQL.

pub mod audit_sink;
pub mod billing_store;
