//! `sqlx::AnyPool`-backed implementation of `Store`, raw SQL throughout —
//! no ORM, mirroring this codebase's existing repository layer. Enums are
//! stored as their Rust `Debug`-free lowercase tag; timestamps as epoch
//! milliseconds; ids as their hyphenated string form so the same schema
//! works unmodified against SQLite (tests) and Postgres (production).

use std::time::Duration;

use async_trait::async_trait;
use sqlx::any::AnyRow;
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use crate::domain::{
    Batch, BatchStatus, Courier, CourierStatus, DemandPattern, Order, OrderStatus, Plan, Point,
    PrepType, Tenant,
};
use crate::logger::warn_if_slow;
use crate::store::{DispatchCommitOutcome, DispatchPlan, Store};

/// Anything over this is logged as slow but never fails the call (§2.1).
const SLOW_CALL_BUDGET: Duration = Duration::from_millis(250);

pub struct SqlxStore {
    pool: AnyPool,
}

impl SqlxStore {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

fn parse_uuid(s: &str, field: &'static str) -> anyhow::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| anyhow::anyhow!("malformed {field} uuid {s:?}: {e}"))
}

fn order_status_tag(s: OrderStatus) -> &'static str {
    match s {
        OrderStatus::Created => "created",
        OrderStatus::Preparing => "preparing",
        OrderStatus::Ready => "ready",
        OrderStatus::Assigned => "assigned",
        OrderStatus::PickedUp => "picked_up",
        OrderStatus::Delivered => "delivered",
        OrderStatus::Cancelled => "cancelled",
    }
}

fn parse_order_status(tag: &str) -> anyhow::Result<OrderStatus> {
    Ok(match tag {
        "created" => OrderStatus::Created,
        "preparing" => OrderStatus::Preparing,
        "ready" => OrderStatus::Ready,
        "assigned" => OrderStatus::Assigned,
        "picked_up" => OrderStatus::PickedUp,
        "delivered" => OrderStatus::Delivered,
        "cancelled" => OrderStatus::Cancelled,
        other => anyhow::bail!("unknown order status tag {other:?}"),
    })
}

fn prep_type_tag(p: PrepType) -> &'static str {
    match p {
        PrepType::Short => "short",
        PrepType::Long => "long",
    }
}

fn parse_prep_type(tag: &str) -> anyhow::Result<PrepType> {
    Ok(match tag {
        "short" => PrepType::Short,
        "long" => PrepType::Long,
        other => anyhow::bail!("unknown prep type tag {other:?}"),
    })
}

fn courier_status_tag(s: CourierStatus) -> &'static str {
    match s {
        CourierStatus::Offline => "offline",
        CourierStatus::Available => "available",
        CourierStatus::Busy => "busy",
    }
}

fn parse_courier_status(tag: &str) -> anyhow::Result<CourierStatus> {
    Ok(match tag {
        "offline" => CourierStatus::Offline,
        "available" => CourierStatus::Available,
        "busy" => CourierStatus::Busy,
        other => anyhow::bail!("unknown courier status tag {other:?}"),
    })
}

fn batch_status_tag(s: BatchStatus) -> &'static str {
    match s {
        BatchStatus::Assigned => "assigned",
        BatchStatus::InProgress => "in_progress",
        BatchStatus::Done => "done",
    }
}

fn parse_batch_status(tag: &str) -> anyhow::Result<BatchStatus> {
    Ok(match tag {
        "assigned" => BatchStatus::Assigned,
        "in_progress" => BatchStatus::InProgress,
        "done" => BatchStatus::Done,
        other => anyhow::bail!("unknown batch status tag {other:?}"),
    })
}

fn plan_tag(p: Plan) -> &'static str {
    match p {
        Plan::Trial => "trial",
        Plan::Basic => "basic",
        Plan::Pro => "pro",
    }
}

fn parse_plan(tag: &str) -> anyhow::Result<Plan> {
    Ok(match tag {
        "trial" => Plan::Trial,
        "basic" => Plan::Basic,
        "pro" => Plan::Pro,
        other => anyhow::bail!("unknown plan tag {other:?}"),
    })
}

fn row_to_order(row: &AnyRow) -> anyhow::Result<Order> {
    Ok(Order {
        id: parse_uuid(row.try_get::<String, _>("id")?.as_str(), "order.id")?,
        tenant_id: parse_uuid(row.try_get::<String, _>("tenant_id")?.as_str(), "order.tenant_id")?,
        short_id: row.try_get("short_id")?,
        tracking_code: row.try_get("tracking_code")?,
        customer_name: row.try_get("customer_name")?,
        address: row.try_get("address")?,
        point: Point {
            lat: row.try_get("lat")?,
            lng: row.try_get("lng")?,
        },
        prep_type: parse_prep_type(row.try_get::<String, _>("prep_type")?.as_str())?,
        status: parse_order_status(row.try_get::<String, _>("status")?.as_str())?,
        created_at: row.try_get("created_at")?,
        ready_at: row.try_get("ready_at")?,
        delivered_at: row.try_get("delivered_at")?,
        cancelled_at: row.try_get("cancelled_at")?,
        batch_id: row
            .try_get::<Option<String>, _>("batch_id")?
            .map(|s| parse_uuid(&s, "order.batch_id"))
            .transpose()?,
        stop_order: row
            .try_get::<Option<i64>, _>("stop_order")?
            .map(|n| n as u32),
    })
}

fn row_to_courier(row: &AnyRow) -> anyhow::Result<Courier> {
    Ok(Courier {
        id: parse_uuid(row.try_get::<String, _>("id")?.as_str(), "courier.id")?,
        tenant_id: parse_uuid(row.try_get::<String, _>("tenant_id")?.as_str(), "courier.tenant_id")?,
        name: row.try_get("name")?,
        phone: row.try_get("phone")?,
        status: parse_courier_status(row.try_get::<String, _>("status")?.as_str())?,
        last_point: match (
            row.try_get::<Option<f64>, _>("last_lat")?,
            row.try_get::<Option<f64>, _>("last_lng")?,
        ) {
            (Some(lat), Some(lng)) => Some(Point { lat, lng }),
            _ => None,
        },
        available_since: row.try_get("available_since")?,
    })
}

fn row_to_batch(row: &AnyRow) -> anyhow::Result<Batch> {
    Ok(Batch {
        id: parse_uuid(row.try_get::<String, _>("id")?.as_str(), "batch.id")?,
        tenant_id: parse_uuid(row.try_get::<String, _>("tenant_id")?.as_str(), "batch.tenant_id")?,
        courier_id: parse_uuid(row.try_get::<String, _>("courier_id")?.as_str(), "batch.courier_id")?,
        status: parse_batch_status(row.try_get::<String, _>("status")?.as_str())?,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
        route_polyline: row.try_get("route_polyline")?,
    })
}

fn row_to_tenant(row: &AnyRow) -> anyhow::Result<Tenant> {
    let base_lat: Option<f64> = row.try_get("base_lat")?;
    let base_lng: Option<f64> = row.try_get("base_lng")?;
    Ok(Tenant {
        id: parse_uuid(row.try_get::<String, _>("id")?.as_str(), "tenant.id")?,
        slug: row.try_get("slug")?,
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        base_point: match (base_lat, base_lng) {
            (Some(lat), Some(lng)) => Some(Point { lat, lng }),
            _ => None,
        },
        plan: parse_plan(row.try_get::<String, _>("plan")?.as_str())?,
        trial_ends_at: row.try_get("trial_ends_at")?,
        blocked: row.try_get::<i64, _>("blocked")? != 0,
    })
}

fn row_to_pattern(row: &AnyRow) -> anyhow::Result<DemandPattern> {
    Ok(DemandPattern {
        tenant_id: parse_uuid(row.try_get::<String, _>("tenant_id")?.as_str(), "pattern.tenant_id")?,
        weekday: row.try_get::<i64, _>("weekday")? as u8,
        hour: row.try_get::<i64, _>("hour")? as u8,
        avg_orders_per_hour: row.try_get("avg_orders_per_hour")?,
        avg_prep_min: row.try_get("avg_prep_min")?,
        avg_route_min: row.try_get("avg_route_min")?,
        recommended_couriers: row.try_get::<i64, _>("recommended_couriers")? as u32,
        samples: row.try_get::<i64, _>("samples")? as u32,
    })
}

#[async_trait]
impl Store for SqlxStore {
    #[tracing::instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn get_tenant(&self, tenant_id: Uuid) -> anyhow::Result<Option<Tenant>> {
        warn_if_slow("store::get_tenant", SLOW_CALL_BUDGET, async {
            let row = sqlx::query("SELECT * FROM tenants WHERE id = ?")
                .bind(tenant_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
            row.as_ref().map(row_to_tenant).transpose()
        })
        .await
    }

    #[tracing::instrument(skip(self, order), fields(tenant_id = %order.tenant_id))]
    async fn create_order(&self, order: &Order) -> anyhow::Result<()> {
        warn_if_slow("store::create_order", SLOW_CALL_BUDGET, async {
            sqlx::query(
                r#"INSERT INTO orders
                   (id, tenant_id, short_id, tracking_code, customer_name, address, lat, lng,
                    prep_type, status, created_at, ready_at, delivered_at, cancelled_at, batch_id, stop_order)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(order.id.to_string())
            .bind(order.tenant_id.to_string())
            .bind(order.short_id)
            .bind(&order.tracking_code)
            .bind(&order.customer_name)
            .bind(&order.address)
            .bind(order.point.lat)
            .bind(order.point.lng)
            .bind(prep_type_tag(order.prep_type))
            .bind(order_status_tag(order.status))
            .bind(order.created_at)
            .bind(order.ready_at)
            .bind(order.delivered_at)
            .bind(order.cancelled_at)
            .bind(order.batch_id.map(|b| b.to_string()))
            .bind(order.stop_order.map(|n| n as i64))
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn get_order(&self, tenant_id: Uuid, order_id: Uuid) -> anyhow::Result<Option<Order>> {
        warn_if_slow("store::get_order", SLOW_CALL_BUDGET, async {
            let row = sqlx::query("SELECT * FROM orders WHERE id = ? AND tenant_id = ?")
                .bind(order_id.to_string())
                .bind(tenant_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
            row.as_ref().map(row_to_order).transpose()
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn get_order_by_tracking_code(&self, code: &str) -> anyhow::Result<Option<Order>> {
        warn_if_slow("store::get_order_by_tracking_code", SLOW_CALL_BUDGET, async {
            let row = sqlx::query("SELECT * FROM orders WHERE tracking_code = ?")
                .bind(code)
                .fetch_optional(&self.pool)
                .await?;
            row.as_ref().map(row_to_order).transpose()
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn list_orders(
        &self,
        tenant_id: Uuid,
        status: Option<OrderStatus>,
        limit: usize,
    ) -> anyhow::Result<Vec<Order>> {
        warn_if_slow("store::list_orders", SLOW_CALL_BUDGET, async {
            let rows = match status {
                Some(s) => {
                    sqlx::query(
                        "SELECT * FROM orders WHERE tenant_id = ? AND status = ? ORDER BY created_at DESC LIMIT ?",
                    )
                    .bind(tenant_id.to_string())
                    .bind(order_status_tag(s))
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await?
                }
                None => {
                    sqlx::query("SELECT * FROM orders WHERE tenant_id = ? ORDER BY created_at DESC LIMIT ?")
                        .bind(tenant_id.to_string())
                        .bind(limit as i64)
                        .fetch_all(&self.pool)
                        .await?
                }
            };

            let mut out = Vec::with_capacity(rows.len());
            for row in &rows {
                match row_to_order(row) {
                    Ok(o) => out.push(o),
                    Err(e) => tracing::warn!(error = %e, "skipping malformed order row"),
                }
            }
            Ok(out)
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn list_ready_unbatched_orders(&self, tenant_id: Uuid) -> anyhow::Result<Vec<Order>> {
        warn_if_slow("store::list_ready_unbatched_orders", SLOW_CALL_BUDGET, async {
            let rows = sqlx::query(
                "SELECT * FROM orders WHERE tenant_id = ? AND status = 'ready' AND batch_id IS NULL",
            )
            .bind(tenant_id.to_string())
            .fetch_all(&self.pool)
            .await?;

            let mut out = Vec::with_capacity(rows.len());
            for row in &rows {
                out.push(row_to_order(row)?);
            }
            Ok(out)
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn orders_since(&self, tenant_id: Uuid, since_ms: i64) -> anyhow::Result<Vec<Order>> {
        warn_if_slow("store::orders_since", SLOW_CALL_BUDGET, async {
            let rows = sqlx::query("SELECT * FROM orders WHERE tenant_id = ? AND created_at >= ?")
                .bind(tenant_id.to_string())
                .bind(since_ms)
                .fetch_all(&self.pool)
                .await?;

            let mut out = Vec::with_capacity(rows.len());
            for row in &rows {
                match row_to_order(row) {
                    Ok(o) => out.push(o),
                    Err(e) => tracing::warn!(error = %e, "skipping malformed order row"),
                }
            }
            Ok(out)
        })
        .await
    }

    #[tracing::instrument(skip(self, order), fields(tenant_id = %order.tenant_id))]
    async fn update_order(&self, order: &Order) -> anyhow::Result<()> {
        warn_if_slow("store::update_order", SLOW_CALL_BUDGET, async {
            sqlx::query(
                r#"UPDATE orders SET status = ?, ready_at = ?, delivered_at = ?, cancelled_at = ?,
                   batch_id = ?, stop_order = ? WHERE id = ? AND tenant_id = ?"#,
            )
            .bind(order_status_tag(order.status))
            .bind(order.ready_at)
            .bind(order.delivered_at)
            .bind(order.cancelled_at)
            .bind(order.batch_id.map(|b| b.to_string()))
            .bind(order.stop_order.map(|n| n as i64))
            .bind(order.id.to_string())
            .bind(order.tenant_id.to_string())
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn tracking_code_exists(&self, code: &str) -> anyhow::Result<bool> {
        warn_if_slow("store::tracking_code_exists", SLOW_CALL_BUDGET, async {
            let row = sqlx::query("SELECT 1 as present FROM orders WHERE tracking_code = ?")
                .bind(code)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row.is_some())
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn next_short_id(&self, tenant_id: Uuid) -> anyhow::Result<i64> {
        warn_if_slow("store::next_short_id", SLOW_CALL_BUDGET, async {
            let row = sqlx::query("SELECT MAX(short_id) as max_id FROM orders WHERE tenant_id = ?")
                .bind(tenant_id.to_string())
                .fetch_one(&self.pool)
                .await?;
            let max_id: Option<i64> = row.try_get("max_id")?;
            Ok(max_id.map(|n| n + 1).unwrap_or(1001))
        })
        .await
    }

    #[tracing::instrument(skip(self, courier), fields(tenant_id = %courier.tenant_id))]
    async fn create_courier(&self, courier: &Courier) -> anyhow::Result<()> {
        warn_if_slow("store::create_courier", SLOW_CALL_BUDGET, async {
            sqlx::query(
                r#"INSERT INTO couriers (id, tenant_id, name, phone, status, last_lat, last_lng, available_since)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(courier.id.to_string())
            .bind(courier.tenant_id.to_string())
            .bind(&courier.name)
            .bind(&courier.phone)
            .bind(courier_status_tag(courier.status))
            .bind(courier.last_point.map(|p| p.lat))
            .bind(courier.last_point.map(|p| p.lng))
            .bind(courier.available_since)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn get_courier(&self, tenant_id: Uuid, courier_id: Uuid) -> anyhow::Result<Option<Courier>> {
        warn_if_slow("store::get_courier", SLOW_CALL_BUDGET, async {
            let row = sqlx::query("SELECT * FROM couriers WHERE id = ? AND tenant_id = ?")
                .bind(courier_id.to_string())
                .bind(tenant_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
            row.as_ref().map(row_to_courier).transpose()
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn list_couriers(
        &self,
        tenant_id: Uuid,
        status: Option<CourierStatus>,
    ) -> anyhow::Result<Vec<Courier>> {
        warn_if_slow("store::list_couriers", SLOW_CALL_BUDGET, async {
            let rows = match status {
                Some(s) => {
                    sqlx::query("SELECT * FROM couriers WHERE tenant_id = ? AND status = ?")
                        .bind(tenant_id.to_string())
                        .bind(courier_status_tag(s))
                        .fetch_all(&self.pool)
                        .await?
                }
                None => {
                    sqlx::query("SELECT * FROM couriers WHERE tenant_id = ?")
                        .bind(tenant_id.to_string())
                        .fetch_all(&self.pool)
                        .await?
                }
            };
            let mut out = Vec::with_capacity(rows.len());
            for row in &rows {
                out.push(row_to_courier(row)?);
            }
            Ok(out)
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn list_available_couriers_fifo(&self, tenant_id: Uuid) -> anyhow::Result<Vec<Courier>> {
        warn_if_slow("store::list_available_couriers_fifo", SLOW_CALL_BUDGET, async {
            let rows = sqlx::query(
                "SELECT * FROM couriers WHERE tenant_id = ? AND status = 'available' ORDER BY available_since ASC",
            )
            .bind(tenant_id.to_string())
            .fetch_all(&self.pool)
            .await?;
            let mut out = Vec::with_capacity(rows.len());
            for row in &rows {
                out.push(row_to_courier(row)?);
            }
            Ok(out)
        })
        .await
    }

    #[tracing::instrument(skip(self, courier), fields(tenant_id = %courier.tenant_id))]
    async fn update_courier(&self, courier: &Courier) -> anyhow::Result<()> {
        warn_if_slow("store::update_courier", SLOW_CALL_BUDGET, async {
            sqlx::query(
                r#"UPDATE couriers SET status = ?, last_lat = ?, last_lng = ?, available_since = ?
                   WHERE id = ? AND tenant_id = ?"#,
            )
            .bind(courier_status_tag(courier.status))
            .bind(courier.last_point.map(|p| p.lat))
            .bind(courier.last_point.map(|p| p.lng))
            .bind(courier.available_since)
            .bind(courier.id.to_string())
            .bind(courier.tenant_id.to_string())
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn get_batch(&self, tenant_id: Uuid, batch_id: Uuid) -> anyhow::Result<Option<Batch>> {
        warn_if_slow("store::get_batch", SLOW_CALL_BUDGET, async {
            let row = sqlx::query("SELECT * FROM batches WHERE id = ? AND tenant_id = ?")
                .bind(batch_id.to_string())
                .bind(tenant_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
            row.as_ref().map(row_to_batch).transpose()
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn list_active_batches(&self, tenant_id: Uuid) -> anyhow::Result<Vec<Batch>> {
        warn_if_slow("store::list_active_batches", SLOW_CALL_BUDGET, async {
            let rows = sqlx::query(
                "SELECT * FROM batches WHERE tenant_id = ? AND status IN ('assigned', 'in_progress')",
            )
            .bind(tenant_id.to_string())
            .fetch_all(&self.pool)
            .await?;
            let mut out = Vec::with_capacity(rows.len());
            for row in &rows {
                out.push(row_to_batch(row)?);
            }
            Ok(out)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn list_orders_in_batch(&self, batch_id: Uuid) -> anyhow::Result<Vec<Order>> {
        warn_if_slow("store::list_orders_in_batch", SLOW_CALL_BUDGET, async {
            let rows = sqlx::query("SELECT * FROM orders WHERE batch_id = ? ORDER BY stop_order ASC")
                .bind(batch_id.to_string())
                .fetch_all(&self.pool)
                .await?;
            let mut out = Vec::with_capacity(rows.len());
            for row in &rows {
                out.push(row_to_order(row)?);
            }
            Ok(out)
        })
        .await
    }

    #[tracing::instrument(skip(self, batch), fields(tenant_id = %batch.tenant_id))]
    async fn update_batch(&self, batch: &Batch) -> anyhow::Result<()> {
        warn_if_slow("store::update_batch", SLOW_CALL_BUDGET, async {
            sqlx::query("UPDATE batches SET status = ?, completed_at = ? WHERE id = ? AND tenant_id = ?")
                .bind(batch_status_tag(batch.status))
                .bind(batch.completed_at)
                .bind(batch.id.to_string())
                .bind(batch.tenant_id.to_string())
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    #[tracing::instrument(skip(self, plan), fields(tenant_id = %tenant_id, batch_count = plan.new_batches.len()))]
    async fn commit_dispatch_plan(
        &self,
        tenant_id: Uuid,
        plan: &DispatchPlan,
        now_ms: i64,
    ) -> anyhow::Result<DispatchCommitOutcome> {
        warn_if_slow("store::commit_dispatch_plan", SLOW_CALL_BUDGET, async {
            let mut txn = self.pool.begin().await?;
            let mut orders_assigned = 0usize;

            for batch in &plan.new_batches {
                sqlx::query(
                    "INSERT INTO batches (id, tenant_id, courier_id, status, created_at, completed_at, route_polyline)
                     VALUES (?, ?, ?, 'assigned', ?, NULL, ?)",
                )
                .bind(batch.batch_id.to_string())
                .bind(tenant_id.to_string())
                .bind(batch.courier_id.to_string())
                .bind(now_ms)
                .bind(&batch.route_polyline)
                .execute(&mut *txn)
                .await?;

                for (order_id, stop_order) in &batch.stops {
                    // Re-check the claim at commit time: only move an order that
                    // is still `ready` and unbatched. A mismatch here means the
                    // per-tenant serialization was bypassed (e.g. a second
                    // process without the in-memory lock); abort rather than
                    // double-assign.
                    let result = sqlx::query(
                        "UPDATE orders SET status = 'assigned', batch_id = ?, stop_order = ?
                         WHERE id = ? AND tenant_id = ? AND status = 'ready' AND batch_id IS NULL",
                    )
                    .bind(batch.batch_id.to_string())
                    .bind(*stop_order as i64)
                    .bind(order_id.to_string())
                    .bind(tenant_id.to_string())
                    .execute(&mut *txn)
                    .await?;

                    if result.rows_affected() != 1 {
                        anyhow::bail!(
                            "order {order_id} was no longer ready/unbatched at commit time; aborting dispatch run"
                        );
                    }
                    orders_assigned += 1;
                }

                let result = sqlx::query(
                    "UPDATE couriers SET status = 'busy' WHERE id = ? AND tenant_id = ? AND status = 'available'",
                )
                .bind(batch.courier_id.to_string())
                .bind(tenant_id.to_string())
                .execute(&mut *txn)
                .await?;

                if result.rows_affected() != 1 {
                    anyhow::bail!(
                        "courier {} was no longer available at commit time; aborting dispatch run",
                        batch.courier_id
                    );
                }
            }

            txn.commit().await?;

            Ok(DispatchCommitOutcome {
                batches_created: plan.new_batches.len(),
                orders_assigned,
            })
        })
        .await
    }

    #[tracing::instrument(skip(self, pattern), fields(tenant_id = %pattern.tenant_id))]
    async fn upsert_demand_pattern(&self, pattern: &DemandPattern) -> anyhow::Result<()> {
        warn_if_slow("store::upsert_demand_pattern", SLOW_CALL_BUDGET, async {
            sqlx::query(
                r#"DELETE FROM demand_patterns WHERE tenant_id = ? AND weekday = ? AND hour = ?"#,
            )
            .bind(pattern.tenant_id.to_string())
            .bind(pattern.weekday as i64)
            .bind(pattern.hour as i64)
            .execute(&self.pool)
            .await?;

            sqlx::query(
                r#"INSERT INTO demand_patterns
                   (tenant_id, weekday, hour, avg_orders_per_hour, avg_prep_min, avg_route_min, recommended_couriers, samples)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(pattern.tenant_id.to_string())
            .bind(pattern.weekday as i64)
            .bind(pattern.hour as i64)
            .bind(pattern.avg_orders_per_hour)
            .bind(pattern.avg_prep_min)
            .bind(pattern.avg_route_min)
            .bind(pattern.recommended_couriers as i64)
            .bind(pattern.samples as i64)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn get_demand_pattern(
        &self,
        tenant_id: Uuid,
        weekday: u8,
        hour: u8,
    ) -> anyhow::Result<Option<DemandPattern>> {
        warn_if_slow("store::get_demand_pattern", SLOW_CALL_BUDGET, async {
            let row = sqlx::query("SELECT * FROM demand_patterns WHERE tenant_id = ? AND weekday = ? AND hour = ?")
                .bind(tenant_id.to_string())
                .bind(weekday as i64)
                .bind(hour as i64)
                .fetch_optional(&self.pool)
                .await?;
            row.as_ref().map(row_to_pattern).transpose()
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn list_demand_patterns(&self, tenant_id: Uuid) -> anyhow::Result<Vec<DemandPattern>> {
        warn_if_slow("store::list_demand_patterns", SLOW_CALL_BUDGET, async {
            let rows = sqlx::query("SELECT * FROM demand_patterns WHERE tenant_id = ?")
                .bind(tenant_id.to_string())
                .fetch_all(&self.pool)
                .await?;
            let mut out = Vec::with_capacity(rows.len());
            for row in &rows {
                out.push(row_to_pattern(row)?);
            }
            Ok(out)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn list_tenant_ids(&self) -> anyhow::Result<Vec<Uuid>> {
        warn_if_slow("store::list_tenant_ids", SLOW_CALL_BUDGET, async {
            let rows = sqlx::query("SELECT id FROM tenants").fetch_all(&self.pool).await?;
            rows.iter()
                .map(|r| parse_uuid(r.try_get::<String, _>("id")?.as_str(), "tenant.id"))
                .collect()
        })
        .await
    }
}
