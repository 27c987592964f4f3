use async_trait::async_trait;
use mockall::automock;

use crate::domain::{entities::plans::PlanEntity, errors::StoreResult};

#[automock]
#[async_trait]
pub trait PlanRepository {
    async fn list_plans(&self) -> StoreResult<Vec<PlanEntity>>;
    async fn insert_plan(&self, plan: PlanEntity) -> StoreResult<()>;
}
