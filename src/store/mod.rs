//! The Store trait (§3 ownership, §4.4 Step 7) and the plan type the
//! Dispatcher hands it for atomic commit. `sqlx_store` is the only
//! production implementation; tests use `MockStore`.

pub mod sqlx_store;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Batch, Courier, CourierStatus, DemandPattern, Order, OrderStatus, Tenant};

/// One courier-assigned batch produced by the Dispatcher, fully resolved
/// (stop orders final, orphans already folded in) before it ever reaches
/// the Store. Committing a `DispatchPlan` is the single atomic write of
/// §4.4 Step 7.
#[derive(Clone, Debug)]
pub struct DispatchPlan {
    pub new_batches: Vec<NewBatch>,
}

#[derive(Clone, Debug)]
pub struct NewBatch {
    pub batch_id: Uuid,
    pub courier_id: Uuid,
    /// `(order_id, stop_order)`, stop orders a permutation of `1..=len`.
    pub stops: Vec<(Uuid, u32)>,
    /// Overview polyline for the batch's final stop order, if the Routing
    /// Client produced one (§4.3).
    pub route_polyline: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct DispatchCommitOutcome {
    pub batches_created: usize,
    pub orders_assigned: usize,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_tenant(&self, tenant_id: Uuid) -> anyhow::Result<Option<Tenant>>;

    async fn create_order(&self, order: &Order) -> anyhow::Result<()>;
    async fn get_order(&self, tenant_id: Uuid, order_id: Uuid) -> anyhow::Result<Option<Order>>;
    async fn get_order_by_tracking_code(&self, code: &str) -> anyhow::Result<Option<Order>>;
    async fn list_orders(
        &self,
        tenant_id: Uuid,
        status: Option<OrderStatus>,
        limit: usize,
    ) -> anyhow::Result<Vec<Order>>;
    /// Orders in `ready` with `batch_id = null`, the Dispatcher's input set.
    async fn list_ready_unbatched_orders(&self, tenant_id: Uuid) -> anyhow::Result<Vec<Order>>;
    /// Orders created at or after `since_ms`, for Metrics/Predictor windows.
    async fn orders_since(&self, tenant_id: Uuid, since_ms: i64) -> anyhow::Result<Vec<Order>>;
    async fn update_order(&self, order: &Order) -> anyhow::Result<()>;
    async fn tracking_code_exists(&self, code: &str) -> anyhow::Result<bool>;
    async fn next_short_id(&self, tenant_id: Uuid) -> anyhow::Result<i64>;

    async fn create_courier(&self, courier: &Courier) -> anyhow::Result<()>;
    async fn get_courier(&self, tenant_id: Uuid, courier_id: Uuid) -> anyhow::Result<Option<Courier>>;
    async fn list_couriers(
        &self,
        tenant_id: Uuid,
        status: Option<CourierStatus>,
    ) -> anyhow::Result<Vec<Courier>>;
    /// Available couriers ordered by `available_since` ascending, the
    /// FIFO order §4.4 Step 4 assigns from.
    async fn list_available_couriers_fifo(&self, tenant_id: Uuid) -> anyhow::Result<Vec<Courier>>;
    async fn update_courier(&self, courier: &Courier) -> anyhow::Result<()>;

    async fn get_batch(&self, tenant_id: Uuid, batch_id: Uuid) -> anyhow::Result<Option<Batch>>;
    async fn list_active_batches(&self, tenant_id: Uuid) -> anyhow::Result<Vec<Batch>>;
    async fn list_orders_in_batch(&self, batch_id: Uuid) -> anyhow::Result<Vec<Order>>;
    async fn update_batch(&self, batch: &Batch) -> anyhow::Result<()>;

    /// Atomically applies a fully-resolved dispatch plan: creates the
    /// batches, reassigns the contained orders, and flips their couriers
    /// to busy. All-or-nothing per §4.4 Step 7.
    async fn commit_dispatch_plan(
        &self,
        tenant_id: Uuid,
        plan: &DispatchPlan,
        now_ms: i64,
    ) -> anyhow::Result<DispatchCommitOutcome>;

    async fn upsert_demand_pattern(&self, pattern: &DemandPattern) -> anyhow::Result<()>;
    async fn get_demand_pattern(
        &self,
        tenant_id: Uuid,
        weekday: u8,
        hour: u8,
    ) -> anyhow::Result<Option<DemandPattern>>;
    async fn list_demand_patterns(&self, tenant_id: Uuid) -> anyhow::Result<Vec<DemandPattern>>;

    async fn list_tenant_ids(&self) -> anyhow::Result<Vec<Uuid>>;
}
