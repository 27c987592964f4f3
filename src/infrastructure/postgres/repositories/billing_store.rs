use std::{collections::BTreeSet, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{PgConnection, RunQueryDsl, insert_into, prelude::*, sql_query, update};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    domain::{
        entities::{
            organization_memberships::{OrganizationMembershipEntity, OrganizationMembershipRow},
            processed_events::{ProcessedEventEntity, ProcessedEventRow},
            subscription_changes::{SubscriptionChangeEntity, SubscriptionChangeRow},
            subscriptions::{SubscriptionEntity, SubscriptionRow},
        },
        errors::{StoreError, StoreResult},
        repositories::billing_store::{BillingCommit, BillingStore, ChangeWrite, SubscriptionWrite},
        value_objects::{
            enums::{change_actions::ChangeStatus, subscription_statuses::SubscriptionStatus},
            subscription_owners::SubscriptionOwner,
        },
    },
    infrastructure::postgres::{
        postgres_connection::PgPoolSquad,
        schema::{organization_memberships, processed_events, subscription_changes, subscriptions},
    },
};

pub struct BillingStorePostgres {
    db_pool: Arc<PgPoolSquad>,
    lock_timeout: Duration,
}

impl BillingStorePostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>, lock_timeout: Duration) -> Self {
        Self { db_pool, lock_timeout }
    }
}

fn write_subscription(conn: &mut PgConnection, write: &SubscriptionWrite) -> StoreResult<()> {
    match write {
        SubscriptionWrite::Insert(subscription) => {
            insert_into(subscriptions::table)
                .values(SubscriptionRow::from(subscription))
                .execute(conn)
                .map_err(|err| match StoreError::from(err) {
                    StoreError::Conflict(reason) => StoreError::Conflict(format!(
                        "subscription for this owner or reference already exists ({reason})"
                    )),
                    other => other,
                })?;
        }
        SubscriptionWrite::Update { expected_version, next } => {
            let stored_version = subscriptions::table
                .find(next.id)
                .select(subscriptions::version)
                .for_update()
                .first::<i64>(conn)
                .optional()?
                .ok_or(StoreError::NotFound)?;
            if stored_version != *expected_version {
                return Err(StoreError::VersionMismatch(next.id));
            }

            let updated = update(
                subscriptions::table
                    .filter(subscriptions::id.eq(next.id))
                    .filter(subscriptions::version.eq(*expected_version)),
            )
            .set(SubscriptionRow::from(next))
            .execute(conn)?;
            if updated == 0 {
                return Err(StoreError::VersionMismatch(next.id));
            }
        }
    }
    Ok(())
}

fn write_change(conn: &mut PgConnection, write: &ChangeWrite) -> StoreResult<()> {
    match write {
        ChangeWrite::Insert(change) => {
            insert_into(subscription_changes::table)
                .values(SubscriptionChangeRow::from(change))
                .execute(conn)?;
        }
        ChangeWrite::UpdateStatus {
            change_id,
            status,
            failure_reason,
            updated_at,
        } => {
            let updated = update(subscription_changes::table.find(*change_id))
                .set((
                    subscription_changes::status.eq(status.as_str()),
                    subscription_changes::failure_reason.eq(failure_reason),
                    subscription_changes::updated_at.eq(*updated_at),
                ))
                .execute(conn)?;
            if updated == 0 {
                return Err(StoreError::NotFound);
            }
        }
    }
    Ok(())
}

fn upsert_membership(conn: &mut PgConnection, membership: &OrganizationMembershipEntity) -> StoreResult<()> {
    let row = OrganizationMembershipRow::from(membership);
    insert_into(organization_memberships::table)
        .values(&row)
        .on_conflict((organization_memberships::organization_id, organization_memberships::user_id))
        .do_update()
        .set((
            organization_memberships::role.eq(&row.role),
            organization_memberships::custom_permissions.eq(&row.custom_permissions),
            organization_memberships::is_active.eq(row.is_active),
            organization_memberships::updated_at.eq(row.updated_at),
            organization_memberships::deactivated_at.eq(row.deactivated_at),
        ))
        .execute(conn)?;
    Ok(())
}

#[async_trait]
impl BillingStore for BillingStorePostgres {
    async fn find_processed_event(&self, external_event_id: &str) -> StoreResult<Option<ProcessedEventEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        processed_events::table
            .find(external_event_id)
            .select(ProcessedEventRow::as_select())
            .first::<ProcessedEventRow>(&mut conn)
            .optional()?
            .map(ProcessedEventEntity::try_from)
            .transpose()
    }

    async fn find_subscription(&self, subscription_id: Uuid) -> StoreResult<Option<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        subscriptions::table
            .find(subscription_id)
            .select(SubscriptionRow::as_select())
            .first::<SubscriptionRow>(&mut conn)
            .optional()?
            .map(SubscriptionEntity::try_from)
            .transpose()
    }

    async fn find_subscription_by_external_ref(
        &self,
        external_ref: &str,
    ) -> StoreResult<Option<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        subscriptions::table
            .filter(subscriptions::external_ref.eq(external_ref))
            .select(SubscriptionRow::as_select())
            .first::<SubscriptionRow>(&mut conn)
            .optional()?
            .map(SubscriptionEntity::try_from)
            .transpose()
    }

    async fn find_active_subscription_for_owner(
        &self,
        owner: SubscriptionOwner,
    ) -> StoreResult<Option<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let mut query = subscriptions::table
            .filter(subscriptions::is_active.eq(true))
            .filter(subscriptions::deleted_at.is_null())
            .select(SubscriptionRow::as_select())
            .into_boxed();
        query = match owner {
            SubscriptionOwner::User(user_id) => query.filter(subscriptions::user_id.eq(user_id)),
            SubscriptionOwner::Organization(organization_id) => {
                query.filter(subscriptions::organization_id.eq(organization_id))
            }
        };

        query
            .first::<SubscriptionRow>(&mut conn)
            .optional()?
            .map(SubscriptionEntity::try_from)
            .transpose()
    }

    async fn list_subscription_changes(
        &self,
        subscription_id: Uuid,
    ) -> StoreResult<Vec<SubscriptionChangeEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        subscription_changes::table
            .filter(subscription_changes::subscription_id.eq(subscription_id))
            .order(subscription_changes::created_at.asc())
            .select(SubscriptionChangeRow::as_select())
            .load::<SubscriptionChangeRow>(&mut conn)?
            .into_iter()
            .map(SubscriptionChangeEntity::try_from)
            .collect()
    }

    async fn find_membership(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<OrganizationMembershipEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        organization_memberships::table
            .filter(organization_memberships::organization_id.eq(organization_id))
            .filter(organization_memberships::user_id.eq(user_id))
            .select(OrganizationMembershipRow::as_select())
            .first::<OrganizationMembershipRow>(&mut conn)
            .optional()?
            .map(OrganizationMembershipEntity::try_from)
            .transpose()
    }

    async fn list_subscriptions_due(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<Uuid>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;
        let live = vec![
            SubscriptionStatus::Trialing.as_str(),
            SubscriptionStatus::Active.as_str(),
            SubscriptionStatus::PastDue.as_str(),
        ];

        let lifecycle_due = subscriptions::table
            .filter(subscriptions::is_active.eq(true))
            .filter(subscriptions::deleted_at.is_null())
            .filter(
                subscriptions::cancel_at_period_end
                    .eq(true)
                    .and(subscriptions::status.eq_any(live))
                    .and(subscriptions::current_period_end.le(now))
                    .or(subscriptions::status
                        .eq(SubscriptionStatus::Canceled.as_str())
                        .and(subscriptions::expires_at.le(now))),
            )
            .order(subscriptions::updated_at.asc())
            .limit(limit)
            .select(subscriptions::id)
            .load::<Uuid>(&mut conn)?;

        let changes_due = subscription_changes::table
            .filter(subscription_changes::status.eq(ChangeStatus::Scheduled.as_str()))
            .filter(subscription_changes::effective_date.le(now))
            .order(subscription_changes::effective_date.asc())
            .limit(limit)
            .select(subscription_changes::subscription_id)
            .load::<Uuid>(&mut conn)?;

        let mut seen = BTreeSet::new();
        Ok(lifecycle_due
            .into_iter()
            .chain(changes_due)
            .filter(|id| seen.insert(*id))
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn commit(&self, commit: BillingCommit) -> StoreResult<()> {
        if commit.is_empty() {
            return Ok(());
        }
        let mut conn = Arc::clone(&self.db_pool).get()?;
        let lock_timeout_ms = self.lock_timeout.as_millis();

        conn.transaction::<_, StoreError, _>(|conn| {
            sql_query(format!("SET LOCAL lock_timeout = '{lock_timeout_ms}ms'")).execute(conn)?;

            if let Some(processed) = &commit.processed_event {
                let inserted = insert_into(processed_events::table)
                    .values(ProcessedEventRow::try_from(processed)?)
                    .on_conflict(processed_events::external_event_id)
                    .do_nothing()
                    .execute(conn)?;
                if inserted == 0 {
                    debug!(
                        external_event_id = %processed.external_event_id,
                        "billing_store: event already in ledger"
                    );
                    return Err(StoreError::DuplicateEvent(processed.external_event_id.clone()));
                }
            }
            if let Some(write) = &commit.subscription {
                write_subscription(conn, write)?;
            }
            for write in &commit.changes {
                write_change(conn, write)?;
            }
            for membership in &commit.memberships {
                upsert_membership(conn, membership)?;
            }
            Ok(())
        })
        .inspect_err(|err| {
            if !matches!(err, StoreError::DuplicateEvent(_)) {
                warn!(db_error = ?err, "billing_store: commit rolled back");
            }
        })
    }
}
