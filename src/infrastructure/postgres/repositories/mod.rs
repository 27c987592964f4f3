pub mod audit_logs;
pub mod billing_store;
pub mod plans;

use diesel::{
    r2d2::PoolError,
    result::{DatabaseErrorKind, Error as DieselError},
};

use crate::domain::errors::StoreError;

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => StoreError::NotFound,
            DieselError::DatabaseError(
                DatabaseErrorKind::UniqueViolation
                | DatabaseErrorKind::CheckViolation
                | DatabaseErrorKind::ForeignKeyViolation,
                info,
            ) => StoreError::Conflict(info.message().to_string()),
            DieselError::DeserializationError(err) => StoreError::Corrupt(err.to_string()),
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

impl From<PoolError> for StoreError {
    fn from(err: PoolError) -> Self {
        StoreError::Unavailable(format!("connection pool: {err}"))
    }
}

#[cfg(test)]
mod tests {
    const CREATE_BILLING_TABLES: &str =
        include_str!("../../../../migrations/2026-03-01-000000_create_billing_tables/up.sql");

    #[test]
    fn seat_limit_check_allows_overage_with_auto_add() {
        let constraint = CREATE_BILLING_TABLES
            .split("CONSTRAINT subscriptions_seats_within_limit")
            .nth(1)
            .and_then(|rest| rest.split("CONSTRAINT").next())
            .unwrap();

        assert!(constraint.contains("used_seats <= seat_limit OR auto_add_seats"));
        assert!(constraint.contains("used_seats >= 0"));
    }
}
