use std::sync::Arc;

use async_trait::async_trait;
use diesel::{RunQueryDsl, insert_into, prelude::*};

use crate::{
    domain::{
        entities::plans::{PlanEntity, PlanRow},
        errors::{StoreError, StoreResult},
        repositories::plans::PlanRepository,
    },
    infrastructure::postgres::{postgres_connection::PgPoolSquad, schema::subscriptions_plans},
};

pub struct PlanPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl PlanPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl PlanRepository for PlanPostgres {
    async fn list_plans(&self) -> StoreResult<Vec<PlanEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let rows = subscriptions_plans::table
            .order((subscriptions_plans::rank.asc(), subscriptions_plans::version.asc()))
            .select(PlanRow::as_select())
            .load::<PlanRow>(&mut conn)?;

        rows.into_iter().map(PlanEntity::try_from).collect()
    }

    async fn insert_plan(&self, plan: PlanEntity) -> StoreResult<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        insert_into(subscriptions_plans::table)
            .values(PlanRow::from(&plan))
            .execute(&mut conn)
            .map_err(|err| match StoreError::from(err) {
                StoreError::Conflict(_) => StoreError::Conflict(format!("plan {} already exists", plan.id)),
                other => other,
            })?;

        Ok(())
    }
}
