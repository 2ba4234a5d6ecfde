//! Hybrid demand forecasting (§4.7): a training pass over delivered
//! history feeds `demand_patterns`, and a live forecast blends that
//! history with the current flow balance.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::domain::{DemandPattern, OrderStatus};
use crate::error::DispatchError;
use crate::metrics;
use crate::store::Store;

const SAFETY: f64 = 1.2;
const DEFAULT_CYCLE_MINUTES: f64 = 30.0;
const MIN_SAMPLES_FOR_HISTORICAL: u32 = 3;
const TRAINING_WINDOW_DAYS: i64 = 28;

fn recommended_couriers_from(orders_per_hour: f64, cycle_minutes: f64) -> u32 {
    let service_rate_per_courier = 60.0 / cycle_minutes;
    ((orders_per_hour / service_rate_per_courier) * SAFETY).ceil().max(1.0) as u32
}

/// Training pass: buckets delivered orders of the last four weeks by
/// `(weekday, hour)` of `created_at` and upserts one `DemandPattern` row
/// per non-empty bucket.
#[tracing::instrument(skip(store), fields(tenant_id = %tenant_id))]
pub async fn refresh_patterns(store: &dyn Store, tenant_id: Uuid) -> anyhow::Result<usize> {
    let since_ms = crate::time::now_ms() - Duration::days(TRAINING_WINDOW_DAYS).num_milliseconds();
    let orders = store.orders_since(tenant_id, since_ms).await?;
    let delivered: Vec<_> = orders
        .iter()
        .filter(|o| o.status == OrderStatus::Delivered)
        .collect();

    // (weekday, hour) -> per-day order counts, plus raw samples for the
    // prep/route averages (those already enforce their own windows).
    let mut day_counts: HashMap<(u8, u8), HashMap<chrono::NaiveDate, u32>> = HashMap::new();
    let mut bucketed_orders: HashMap<(u8, u8), Vec<crate::domain::Order>> = HashMap::new();

    for order in &delivered {
        let Some(ts) = DateTime::<Utc>::from_timestamp_millis(order.created_at) else {
            continue;
        };
        let key = (crate::time::weekday_index(ts), crate::time::hour_of_day(ts));
        *day_counts.entry(key).or_default().entry(ts.date_naive()).or_insert(0) += 1;
        bucketed_orders.entry(key).or_default().push((*order).clone());
    }

    let mut written = 0;
    for (key, days) in &day_counts {
        let (weekday, hour) = *key;
        let avg_orders_per_hour = days.values().sum::<u32>() as f64 / days.len() as f64;
        let bucket_orders = bucketed_orders.get(key).cloned().unwrap_or_default();
        let avg_prep_min = metrics::avg_prep_min(&bucket_orders);
        let avg_route_min = metrics::avg_route_min(&bucket_orders);
        let cycle_minutes = avg_route_min.unwrap_or(DEFAULT_CYCLE_MINUTES);

        let pattern = DemandPattern {
            tenant_id,
            weekday,
            hour,
            avg_orders_per_hour,
            avg_prep_min,
            avg_route_min,
            recommended_couriers: recommended_couriers_from(avg_orders_per_hour, cycle_minutes),
            samples: days.len() as u32,
        };
        store.upsert_demand_pattern(&pattern).await?;
        written += 1;
    }

    Ok(written)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForecastStatus {
    Adequado,
    Atencao,
    Critico,
}

#[derive(Clone, Debug)]
pub struct HybridForecast {
    pub historical_available: bool,
    pub orders_last_hour: usize,
    pub live_avg_prep_min: Option<f64>,
    pub live_avg_route_min: Option<f64>,
    pub available_couriers: usize,
    pub busy_couriers: usize,
    pub queue_depth: usize,
    pub in_route_count: usize,
    pub demand_variation_pct: Option<f64>,
    pub queue_growth_minutes: Option<f64>,
    pub recommended_couriers: Option<u32>,
    pub status: ForecastStatus,
}

/// Live forecast blending the stored historical pattern (if it has
/// enough samples) with the tenant's current flow.
#[tracing::instrument(skip(store), fields(tenant_id = %tenant_id))]
pub async fn forecast(store: &dyn Store, tenant_id: Uuid) -> Result<HybridForecast, DispatchError> {
    let now = Utc::now();
    let now_ms = crate::time::now_ms();

    let historical = store
        .get_demand_pattern(tenant_id, crate::time::weekday_index(now), crate::time::hour_of_day(now))
        .await
        .map_err(crate::error::to_internal)?
        .filter(|p| p.samples >= MIN_SAMPLES_FOR_HISTORICAL);

    let recent_orders = store
        .orders_since(tenant_id, now_ms - 24 * 60 * 60 * 1000)
        .await
        .map_err(crate::error::to_internal)?;
    let couriers = store
        .list_couriers(tenant_id, None)
        .await
        .map_err(crate::error::to_internal)?;

    let live_orders_last_hour = metrics::orders_last_hour(&recent_orders, now_ms);
    let live_avg_prep_min = metrics::avg_prep_min(&recent_orders);
    let live_avg_route_min = metrics::avg_route_min(&recent_orders);
    let counts = metrics::courier_counts(&couriers);

    let queue_depth = recent_orders
        .iter()
        .filter(|o| o.status == OrderStatus::Ready && o.batch_id.is_none())
        .count();
    let in_route_count = recent_orders
        .iter()
        .filter(|o| matches!(o.status, OrderStatus::Assigned | OrderStatus::PickedUp))
        .count();

    let cycle_minutes = live_avg_route_min
        .or(historical.as_ref().and_then(|p| p.avg_route_min))
        .unwrap_or(DEFAULT_CYCLE_MINUTES);

    let lambda = live_orders_last_hour as f64;
    let mu = counts.available as f64 * (60.0 / cycle_minutes);
    let balance = mu - lambda;
    let queue_growth_minutes = if balance < 0.0 {
        Some(60.0 / balance.abs())
    } else {
        None
    };

    let demand_variation_pct = historical.as_ref().and_then(|p| {
        if p.avg_orders_per_hour > 0.0 {
            Some(((lambda - p.avg_orders_per_hour) / p.avg_orders_per_hour) * 100.0)
        } else {
            None
        }
    });

    let base_recommendation = if lambda > 0.0 || historical.is_some() {
        Some(recommended_couriers_from(lambda.max(0.0), cycle_minutes))
    } else {
        None
    };

    let mut recommended_couriers = match (&historical, demand_variation_pct) {
        (Some(pattern), Some(variation)) if variation >= 30.0 => {
            let scale = 1.0 + (variation / 100.0);
            Some(((pattern.recommended_couriers as f64) * scale).ceil().max(1.0) as u32)
        }
        (Some(pattern), Some(variation)) if variation <= -30.0 => {
            let scale = 1.0 + (variation / 100.0);
            Some((((pattern.recommended_couriers as f64) * scale).ceil().max(1.0)) as u32)
        }
        (Some(pattern), _) => Some(pattern.recommended_couriers),
        (None, _) => base_recommendation,
    };

    let mut status = ForecastStatus::Adequado;
    if let Some(var) = demand_variation_pct {
        if var.abs() >= 30.0 {
            status = ForecastStatus::Atencao;
        }
    }

    if queue_depth > 0 && counts.available == 0 {
        status = if queue_depth >= 3 {
            ForecastStatus::Critico
        } else {
            ForecastStatus::Atencao
        };
        let floor = (queue_depth as f64 / 2.0).ceil() as u32 + 1;
        recommended_couriers = Some(recommended_couriers.unwrap_or(1).max(floor));
    }

    Ok(HybridForecast {
        historical_available: historical.is_some(),
        orders_last_hour: live_orders_last_hour,
        live_avg_prep_min,
        live_avg_route_min,
        available_couriers: counts.available,
        busy_couriers: counts.busy,
        queue_depth,
        in_route_count,
        demand_variation_pct,
        queue_growth_minutes,
        recommended_couriers,
        status,
    })
}

/// Background sweep: refreshes patterns for every tenant on a fixed
/// interval. A per-tenant failure is logged and does not abort the sweep
/// for the remaining tenants.
#[tracing::instrument(skip(store))]
pub async fn run_background_refresh(store: Arc<dyn Store>, interval_ms: u64) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
    loop {
        ticker.tick().await;
        let tenant_ids = match store.list_tenant_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list tenants for pattern refresh sweep");
                continue;
            }
        };
        for tenant_id in tenant_ids {
            if let Err(e) = refresh_patterns(store.as_ref(), tenant_id).await {
                tracing::warn!(%tenant_id, error = %e, "pattern refresh failed for tenant");
            }
        }
    }
}


#[cfg(test)]
mod time_tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use uuid::Uuid;

    use super::*;
    use crate::domain::{Batch, Courier, CourierStatus, DemandPattern, Order, OrderStatus, Tenant};
    use crate::store::{DispatchCommitOutcome, DispatchPlan, Store};

    /// Only `list_tenant_ids` is exercised by the background sweep; every
    /// other method is unreachable from this test and left unimplemented.
    struct TickCountingStore {
        sweeps: AtomicUsize,
    }

    #[async_trait]
    impl Store for TickCountingStore {
        async fn get_tenant(&self, _tenant_id: Uuid) -> anyhow::Result<Option<Tenant>> {
            unimplemented!()
        }
        async fn create_order(&self, _order: &Order) -> anyhow::Result<()> {
            unimplemented!()
        }
        async fn get_order(&self, _tenant_id: Uuid, _order_id: Uuid) -> anyhow::Result<Option<Order>> {
            unimplemented!()
        }
        async fn get_order_by_tracking_code(&self, _code: &str) -> anyhow::Result<Option<Order>> {
            unimplemented!()
        }
        async fn list_orders(
            &self,
            _tenant_id: Uuid,
            _status: Option<OrderStatus>,
            _limit: usize,
        ) -> anyhow::Result<Vec<Order>> {
            unimplemented!()
        }
        async fn list_ready_unbatched_orders(&self, _tenant_id: Uuid) -> anyhow::Result<Vec<Order>> {
            unimplemented!()
        }
        async fn orders_since(&self, _tenant_id: Uuid, _since_ms: i64) -> anyhow::Result<Vec<Order>> {
            Ok(vec![])
        }
        async fn update_order(&self, _order: &Order) -> anyhow::Result<()> {
            unimplemented!()
        }
        async fn tracking_code_exists(&self, _code: &str) -> anyhow::Result<bool> {
            unimplemented!()
        }
        async fn next_short_id(&self, _tenant_id: Uuid) -> anyhow::Result<i64> {
            unimplemented!()
        }
        async fn create_courier(&self, _courier: &Courier) -> anyhow::Result<()> {
            unimplemented!()
        }
        async fn get_courier(&self, _tenant_id: Uuid, _courier_id: Uuid) -> anyhow::Result<Option<Courier>> {
            unimplemented!()
        }
        async fn list_couriers(
            &self,
            _tenant_id: Uuid,
            _status: Option<CourierStatus>,
        ) -> anyhow::Result<Vec<Courier>> {
            unimplemented!()
        }
        async fn list_available_couriers_fifo(&self, _tenant_id: Uuid) -> anyhow::Result<Vec<Courier>> {
            unimplemented!()
        }
        async fn update_courier(&self, _courier: &Courier) -> anyhow::Result<()> {
            unimplemented!()
        }
        async fn get_batch(&self, _tenant_id: Uuid, _batch_id: Uuid) -> anyhow::Result<Option<Batch>> {
            unimplemented!()
        }
        async fn list_active_batches(&self, _tenant_id: Uuid) -> anyhow::Result<Vec<Batch>> {
            unimplemented!()
        }
        async fn list_orders_in_batch(&self, _batch_id: Uuid) -> anyhow::Result<Vec<Order>> {
            unimplemented!()
        }
        async fn update_batch(&self, _batch: &Batch) -> anyhow::Result<()> {
            unimplemented!()
        }
        async fn commit_dispatch_plan(
            &self,
            _tenant_id: Uuid,
            _plan: &DispatchPlan,
            _now_ms: i64,
        ) -> anyhow::Result<DispatchCommitOutcome> {
            unimplemented!()
        }
        async fn upsert_demand_pattern(&self, _pattern: &DemandPattern) -> anyhow::Result<()> {
            unimplemented!()
        }
        async fn get_demand_pattern(
            &self,
            _tenant_id: Uuid,
            _weekday: u8,
            _hour: u8,
        ) -> anyhow::Result<Option<DemandPattern>> {
            unimplemented!()
        }
        async fn list_demand_patterns(&self, _tenant_id: Uuid) -> anyhow::Result<Vec<DemandPattern>> {
            unimplemented!()
        }
        async fn list_tenant_ids(&self) -> anyhow::Result<Vec<Uuid>> {
            self.sweeps.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn background_refresh_sweeps_on_each_interval_tick() {
        let store = Arc::new(TickCountingStore { sweeps: AtomicUsize::new(0) });
        let handle = tokio::spawn(run_background_refresh(store.clone(), 1_000));

        tokio::time::advance(std::time::Duration::from_millis(1_000)).await;
        tokio::task::yield_now().await;
        assert_eq!(store.sweeps.load(Ordering::SeqCst), 1);

        tokio::time::advance(std::time::Duration::from_millis(1_000)).await;
        tokio::task::yield_now().await;
        assert_eq!(store.sweeps.load(Ordering::SeqCst), 2);

        handle.abort();
    }
}
