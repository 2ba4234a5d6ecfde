//! Dispatcher orchestration (§4.4): fetches from the Store, runs the pure
//! clustering algorithm, and commits the result. Per-tenant dispatch runs
//! are serialized through `TenantLockRouter`.

pub mod algorithm;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::domain::Point;
use crate::error::DispatchError;
use crate::routing::RoutingClient;
use crate::store::{NewBatch, DispatchPlan, Store};

use self::algorithm::ClusteringParams;

/// Hands out one lock per tenant, created lazily on first use. The outer
/// map lock is only ever held for the lookup/insert, never across a
/// dispatch run, so unrelated tenants never contend on it.
#[derive(Default)]
pub struct TenantLockRouter {
    locks: parking_lot::Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl TenantLockRouter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, tenant_id: Uuid) -> Arc<AsyncMutex<()>> {
        self.locks
            .lock()
            .entry(tenant_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

#[derive(Clone, Debug, Default)]
pub struct DispatchSummary {
    pub batches_created: usize,
    pub orders_assigned: usize,
    pub orphans_left: usize,
    pub message: String,
}

pub struct Dispatcher {
    store: Arc<dyn Store>,
    routing: Arc<dyn RoutingClient>,
    locks: TenantLockRouter,
    default_base_point: Point,
    clustering: ClusteringParams,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn Store>, routing: Arc<dyn RoutingClient>, cfg: &DispatchConfig) -> Self {
        Self {
            store,
            routing,
            locks: TenantLockRouter::new(),
            default_base_point: cfg.default_base_point,
            clustering: ClusteringParams {
                same_address_km: cfg.same_address_km,
                cluster_radius_km: cfg.cluster_radius_km,
                preferred_per_courier: cfg.preferred_per_courier,
                max_per_batch: cfg.max_per_batch,
            },
        }
    }

    /// Runs one dispatch pass for `tenant_id`. Holds that tenant's lock
    /// for the whole call, including the Routing Client calls inside the
    /// clustering algorithm, which happen outside any Store transaction.
    #[tracing::instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn run(&self, tenant_id: Uuid) -> Result<DispatchSummary, DispatchError> {
        let lock = self.locks.lock_for(tenant_id);
        let _guard = lock.lock().await;

        let tenant = self
            .store
            .get_tenant(tenant_id)
            .await
            .map_err(crate::error::to_internal)?
            .ok_or(DispatchError::NotFound { entity: "tenant" })?;

        if tenant.should_be_blocked(crate::time::now_ms()) {
            return Err(DispatchError::TrialExpired);
        }

        let ready_orders = self
            .store
            .list_ready_unbatched_orders(tenant_id)
            .await
            .map_err(crate::error::to_internal)?;
        let available_couriers = self
            .store
            .list_available_couriers_fifo(tenant_id)
            .await
            .map_err(crate::error::to_internal)?;

        if ready_orders.is_empty() || available_couriers.is_empty() {
            return Ok(DispatchSummary {
                message: "nothing to dispatch".to_string(),
                ..Default::default()
            });
        }

        let base_point = tenant.base_point.unwrap_or(self.default_base_point);

        let plan = algorithm::plan_dispatch(
            &ready_orders,
            &available_couriers,
            base_point,
            self.routing.as_ref(),
            &self.clustering,
        )
        .await;

        let new_batches: Vec<NewBatch> = plan
            .assignments
            .into_iter()
            .map(|a| {
                if let Some(route) = &a.route_polyline {
                    tracing::debug!(
                        courier_id = %a.courier_id,
                        total_route_m = route.legs.iter().sum::<f64>(),
                        leg_count = route.legs.len(),
                        "route polyline computed for batch"
                    );
                }
                NewBatch {
                    batch_id: Uuid::new_v4(),
                    courier_id: a.courier_id,
                    route_polyline: a.route_polyline.map(|r| r.polyline),
                    stops: a
                        .stops
                        .into_iter()
                        .enumerate()
                        .map(|(idx, order_id)| (order_id, idx as u32 + 1))
                        .collect(),
                }
            })
            .collect();

        if new_batches.is_empty() {
            return Ok(DispatchSummary {
                orphans_left: plan.orphaned_order_ids.len(),
                message: "no couriers available, all orders remain queued".to_string(),
                ..Default::default()
            });
        }

        let outcome = self
            .store
            .commit_dispatch_plan(tenant_id, &DispatchPlan { new_batches }, crate::time::now_ms())
            .await
            .map_err(crate::error::to_internal)?;

        let message = if plan.orphaned_order_ids.is_empty() {
            format!(
                "{} batch(es) created, {} order(s) assigned",
                outcome.batches_created, outcome.orders_assigned
            )
        } else {
            format!(
                "{} batch(es) created, {} order(s) assigned, {} orphan(s) left unassigned",
                outcome.batches_created,
                outcome.orders_assigned,
                plan.orphaned_order_ids.len()
            )
        };

        Ok(DispatchSummary {
            batches_created: outcome.batches_created,
            orders_assigned: outcome.orders_assigned,
            orphans_left: plan.orphaned_order_ids.len(),
            message,
        })
    }
}
