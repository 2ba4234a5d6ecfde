use sqlx::AnyPool;

pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS tenants (
  id TEXT PRIMARY KEY,
  slug TEXT NOT NULL,
  name TEXT NOT NULL,
  address TEXT NOT NULL,
  base_lat DOUBLE PRECISION,
  base_lng DOUBLE PRECISION,
  plan TEXT NOT NULL,
  trial_ends_at BIGINT,
  blocked BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS orders (
  id TEXT PRIMARY KEY,
  tenant_id TEXT NOT NULL,
  short_id BIGINT NOT NULL,
  tracking_code TEXT NOT NULL,
  customer_name TEXT,
  address TEXT NOT NULL,
  lat DOUBLE PRECISION NOT NULL,
  lng DOUBLE PRECISION NOT NULL,
  prep_type TEXT NOT NULL,
  status TEXT NOT NULL,
  created_at BIGINT NOT NULL,
  ready_at BIGINT,
  delivered_at BIGINT,
  cancelled_at BIGINT,
  batch_id TEXT,
  stop_order BIGINT
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS couriers (
  id TEXT PRIMARY KEY,
  tenant_id TEXT NOT NULL,
  name TEXT NOT NULL,
  phone TEXT NOT NULL,
  status TEXT NOT NULL,
  last_lat DOUBLE PRECISION,
  last_lng DOUBLE PRECISION,
  available_since BIGINT
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS batches (
  id TEXT PRIMARY KEY,
  tenant_id TEXT NOT NULL,
  courier_id TEXT NOT NULL,
  status TEXT NOT NULL,
  created_at BIGINT NOT NULL,
  completed_at BIGINT,
  route_polyline TEXT
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS demand_patterns (
  tenant_id TEXT NOT NULL,
  weekday BIGINT NOT NULL,
  hour BIGINT NOT NULL,
  avg_orders_per_hour DOUBLE PRECISION NOT NULL,
  avg_prep_min DOUBLE PRECISION,
  avg_route_min DOUBLE PRECISION,
  recommended_couriers BIGINT NOT NULL,
  samples BIGINT NOT NULL,
  PRIMARY KEY (tenant_id, weekday, hour)
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_orders_tenant ON orders(tenant_id);"#)
        .execute(pool)
        .await?;
    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_orders_tracking_code ON orders(tracking_code);"#)
        .execute(pool)
        .await?;
    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_orders_batch ON orders(batch_id);"#)
        .execute(pool)
        .await?;
    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_couriers_tenant ON couriers(tenant_id);"#)
        .execute(pool)
        .await?;
    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_batches_tenant ON batches(tenant_id);"#)
        .execute(pool)
        .await?;

    Ok(())
}
