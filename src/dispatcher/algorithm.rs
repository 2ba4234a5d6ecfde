//! The pure clustering algorithm (§4.4 steps 1-6). Operates on in-memory
//! orders/couriers and a `RoutingClient`; no Store access, so it can be
//! exercised directly against scenario fixtures without a database.

use uuid::Uuid;

use crate::domain::{Courier, Order, Point};
use crate::geo::{centroid, haversine, nearest_distance};
use crate::routing::{RoutePolyline, RoutingClient};

pub const SAME_ADDRESS_KM: f64 = 0.05;
pub const CLUSTER_RADIUS_KM: f64 = 3.0;
pub const PREFERRED_PER_COURIER: usize = 4;
pub const MAX_ABS: usize = 6;

/// Tunable clustering thresholds, sourced from `DispatchConfig` so a
/// deployment can adjust density targets without a recompile. Defaults
/// match the constants above.
#[derive(Clone, Copy, Debug)]
pub struct ClusteringParams {
    pub same_address_km: f64,
    pub cluster_radius_km: f64,
    pub preferred_per_courier: usize,
    pub max_per_batch: usize,
}

impl Default for ClusteringParams {
    fn default() -> Self {
        Self {
            same_address_km: SAME_ADDRESS_KM,
            cluster_radius_km: CLUSTER_RADIUS_KM,
            preferred_per_courier: PREFERRED_PER_COURIER,
            max_per_batch: MAX_ABS,
        }
    }
}

/// One courier-bound group of orders, in final stop order, before it is
/// turned into a `NewBatch` for the Store.
#[derive(Clone, Debug)]
pub struct Assignment {
    pub courier_id: Uuid,
    /// Order ids in final stop order; index + 1 is the stop number.
    pub stops: Vec<Uuid>,
    /// Routing Client overview polyline through the final stop order,
    /// fetched once stops are settled (after Step 6 orphan absorption).
    pub route_polyline: Option<RoutePolyline>,
}

#[derive(Clone, Debug, Default)]
pub struct PlanResult {
    pub assignments: Vec<Assignment>,
    pub orphaned_order_ids: Vec<Uuid>,
}

#[derive(Clone, Debug)]
struct Group {
    order_ids: Vec<Uuid>,
    seed_ready_at: i64,
}

fn group_centroid(group: &Group, orders_by_id: &std::collections::HashMap<Uuid, &Order>) -> Point {
    let points: Vec<Point> = group
        .order_ids
        .iter()
        .map(|id| orders_by_id[id].point)
        .collect();
    centroid(&points)
}

/// Step 1: partition orders so any two within `SAME_ADDRESS_KM` land in
/// the same group. Greedy: each unassigned order seeds a group that
/// absorbs every other unassigned order within the threshold of the seed.
fn group_same_address(orders: &[Order], params: &ClusteringParams) -> Vec<Group> {
    let mut remaining: Vec<&Order> = orders.iter().collect();
    let mut groups = Vec::new();

    while let Some(seed) = remaining.first().copied() {
        let mut members = vec![seed.id];
        remaining.remove(0);
        remaining.retain(|o| {
            if haversine(seed.point, o.point) <= params.same_address_km {
                members.push(o.id);
                false
            } else {
                true
            }
        });
        groups.push(Group {
            order_ids: members,
            seed_ready_at: seed.ready_at.unwrap_or(seed.created_at),
        });
    }

    groups
}

/// Step 2: merge groups whose centroids are within `CLUSTER_RADIUS_KM`
/// and whose combined size stays within `PREFERRED_PER_COURIER`. Tie-break
/// by earliest seed `ready_at` when multiple merge candidates exist, by
/// always scanning groups in ready_at order first.
fn merge_nearby_groups(
    mut groups: Vec<Group>,
    orders_by_id: &std::collections::HashMap<Uuid, &Order>,
    params: &ClusteringParams,
) -> Vec<Group> {
    groups.sort_by_key(|g| g.seed_ready_at);

    let mut merged: Vec<Group> = Vec::new();
    'outer: for group in groups {
        for existing in merged.iter_mut() {
            let combined_size = existing.order_ids.len() + group.order_ids.len();
            if combined_size > params.preferred_per_courier {
                continue;
            }
            let d = haversine(
                group_centroid(existing, orders_by_id),
                group_centroid(&group, orders_by_id),
            );
            if d <= params.cluster_radius_km {
                existing.order_ids.extend(group.order_ids);
                existing.seed_ready_at = existing.seed_ready_at.min(group.seed_ready_at);
                continue 'outer;
            }
        }
        merged.push(group);
    }
    merged
}

/// Step 3: split any group over `PREFERRED_PER_COURIER`, sorting members
/// by proximity to the group centroid before chunking.
fn split_oversize_groups(
    groups: Vec<Group>,
    orders_by_id: &std::collections::HashMap<Uuid, &Order>,
    params: &ClusteringParams,
) -> Vec<Group> {
    let mut out = Vec::new();
    for group in groups {
        if group.order_ids.len() <= params.preferred_per_courier {
            out.push(group);
            continue;
        }
        let centroid_pt = group_centroid(&group, orders_by_id);
        let mut sorted = group.order_ids.clone();
        sorted.sort_by(|a, b| {
            let da = haversine(centroid_pt, orders_by_id[a].point);
            let db = haversine(centroid_pt, orders_by_id[b].point);
            da.partial_cmp(&db).unwrap()
        });
        for chunk in sorted.chunks(params.preferred_per_courier) {
            out.push(Group {
                order_ids: chunk.to_vec(),
                seed_ready_at: group.seed_ready_at,
            });
        }
    }
    out
}

/// Step 5: order a group's orders by road distance from `base`, ties
/// broken by order id for determinism when the Routing Client returns
/// equal distances (always true on the fallback path for colocated stops).
async fn order_stops_by_road_distance(
    base: Point,
    order_ids: &[Uuid],
    orders_by_id: &std::collections::HashMap<Uuid, &Order>,
    routing: &dyn RoutingClient,
) -> Vec<Uuid> {
    let mut with_distance = Vec::with_capacity(order_ids.len());
    for &id in order_ids {
        let d = routing.driving_distance_m(base, orders_by_id[&id].point).await;
        with_distance.push((id, d.meters));
    }
    with_distance.sort_by(|a, b| match a.1.partial_cmp(&b.1).unwrap() {
        std::cmp::Ordering::Equal => a.0.cmp(&b.0),
        other => other,
    });
    with_distance.into_iter().map(|(id, _)| id).collect()
}

/// Runs steps 1-6 of the clustering algorithm. `base_point` is the
/// tenant's restaurant coordinate (or the configured default).
pub async fn plan_dispatch(
    ready_orders: &[Order],
    available_couriers: &[Courier],
    base_point: Point,
    routing: &dyn RoutingClient,
    params: &ClusteringParams,
) -> PlanResult {
    if ready_orders.is_empty() || available_couriers.is_empty() {
        return PlanResult {
            assignments: Vec::new(),
            orphaned_order_ids: ready_orders.iter().map(|o| o.id).collect(),
        };
    }

    let orders_by_id: std::collections::HashMap<Uuid, &Order> =
        ready_orders.iter().map(|o| (o.id, o)).collect();

    let groups = group_same_address(ready_orders, params);
    let groups = merge_nearby_groups(groups, &orders_by_id, params);
    let mut groups = split_oversize_groups(groups, &orders_by_id, params);

    // Step 4: FIFO courier assignment. Couriers already ordered by the
    // Store (`list_available_couriers_fifo`); sort defensively anyway so
    // this function's output doesn't depend on caller discipline.
    let mut couriers: Vec<&Courier> = available_couriers.iter().collect();
    couriers.sort_by_key(|c| c.available_since.unwrap_or(i64::MAX));

    let assigned_count = groups.len().min(couriers.len());
    let orphan_groups: Vec<Group> = groups.split_off(assigned_count);

    let mut assignments = Vec::with_capacity(assigned_count);
    for (group, courier) in groups.into_iter().zip(couriers.iter()) {
        let stops = order_stops_by_road_distance(base_point, &group.order_ids, &orders_by_id, routing).await;
        assignments.push(Assignment {
            courier_id: courier.id,
            stops,
            route_polyline: None,
        });
    }

    // Step 6: fold leftover groups' orders back into the orphan pool and
    // try to absorb each orphan into the just-created batch with the
    // nearest route and spare capacity.
    let mut orphaned_order_ids: Vec<Uuid> = orphan_groups.into_iter().flat_map(|g| g.order_ids).collect();
    orphaned_order_ids.sort();

    let mut still_orphaned = Vec::new();
    for orphan_id in orphaned_order_ids {
        let orphan_point = orders_by_id[&orphan_id].point;

        let best = assignments
            .iter_mut()
            .filter(|a| a.stops.len() < params.max_per_batch)
            .min_by(|a, b| {
                let da = nearest_distance(
                    orphan_point,
                    &a.stops.iter().map(|id| orders_by_id[id].point).collect::<Vec<_>>(),
                );
                let db = nearest_distance(
                    orphan_point,
                    &b.stops.iter().map(|id| orders_by_id[id].point).collect::<Vec<_>>(),
                );
                da.partial_cmp(&db).unwrap()
            });

        match best {
            Some(batch) => {
                let insert_at = best_insertion_index(orphan_point, &batch.stops, &orders_by_id);
                batch.stops.insert(insert_at, orphan_id);
            }
            None => still_orphaned.push(orphan_id),
        }
    }

    // Stops are now final (orphan absorption may have renumbered them);
    // fetch one overview polyline per batch before it ever reaches the
    // Store. §4.3: absence is acceptable, so a fallback/failure here
    // never blocks the run.
    for assignment in assignments.iter_mut() {
        let points: Vec<Point> = assignment.stops.iter().map(|id| orders_by_id[id].point).collect();
        assignment.route_polyline = routing.route_polyline(base_point, &points).await;
    }

    PlanResult {
        assignments,
        orphaned_order_ids: still_orphaned,
    }
}

/// Finds the position in `stops` whose neighboring gap grows least (by
/// straight-line distance) when `new_point` is inserted there.
fn best_insertion_index(
    new_point: Point,
    stops: &[Uuid],
    orders_by_id: &std::collections::HashMap<Uuid, &Order>,
) -> usize {
    if stops.is_empty() {
        return 0;
    }

    let mut best_index = stops.len();
    let mut best_cost = f64::INFINITY;

    for idx in 0..=stops.len() {
        let cost = if idx == 0 {
            haversine(new_point, orders_by_id[&stops[0]].point)
        } else if idx == stops.len() {
            haversine(orders_by_id[&stops[stops.len() - 1]].point, new_point)
        } else {
            let prev = orders_by_id[&stops[idx - 1]].point;
            let next = orders_by_id[&stops[idx]].point;
            haversine(prev, new_point) + haversine(new_point, next) - haversine(prev, next)
        };

        if cost < best_cost {
            best_cost = cost;
            best_index = idx;
        }
    }

    best_index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CourierStatus, OrderStatus, PrepType};
    use async_trait::async_trait;
    use crate::routing::{Distance, DistanceSource};

    struct FallbackOnlyRouting;

    #[async_trait]
    impl RoutingClient for FallbackOnlyRouting {
        async fn driving_distance_m(&self, from: Point, to: Point) -> Distance {
            crate::routing::fallback_distance(from, to)
        }
        async fn route_polyline(&self, _start: Point, _stops: &[Point]) -> Option<RoutePolyline> {
            None
        }
    }

    fn mk_order(lat: f64, lng: f64, ready_at: i64) -> Order {
        Order {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            short_id: 1001,
            tracking_code: "MF-ABCDEF".into(),
            customer_name: None,
            address: "x".into(),
            point: Point { lat, lng },
            prep_type: PrepType::Short,
            status: OrderStatus::Ready,
            created_at: ready_at,
            ready_at: Some(ready_at),
            delivered_at: None,
            cancelled_at: None,
            batch_id: None,
            stop_order: None,
        }
    }

    fn mk_courier(available_since: i64) -> Courier {
        Courier {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "x".into(),
            phone: "555".into(),
            status: CourierStatus::Available,
            last_point: None,
            available_since: Some(available_since),
        }
    }

    #[tokio::test]
    async fn no_couriers_orphans_every_order() {
        let orders = vec![mk_order(0.0, 0.0, 1)];
        let result = plan_dispatch(&orders, &[], Point { lat: 0.0, lng: 0.0 }, &FallbackOnlyRouting, &ClusteringParams::default()).await;
        assert!(result.assignments.is_empty());
        assert_eq!(result.orphaned_order_ids, vec![orders[0].id]);
    }

    #[tokio::test]
    async fn same_address_orders_land_in_one_batch() {
        let orders = vec![mk_order(0.0, 0.0, 1), mk_order(0.0001, 0.0001, 2)];
        let couriers = vec![mk_courier(0)];
        let result = plan_dispatch(&orders, &couriers, Point { lat: 0.0, lng: 0.0 }, &FallbackOnlyRouting, &ClusteringParams::default()).await;
        assert_eq!(result.assignments.len(), 1);
        assert_eq!(result.assignments[0].stops.len(), 2);
    }

    #[tokio::test]
    async fn fifo_courier_order_is_respected() {
        let orders = vec![mk_order(0.0, 0.0, 1), mk_order(1.0, 1.0, 2)];
        let early = mk_courier(100);
        let late = mk_courier(50);
        let couriers = vec![early.clone(), late.clone()];
        let result = plan_dispatch(&orders, &couriers, Point { lat: 0.0, lng: 0.0 }, &FallbackOnlyRouting, &ClusteringParams::default()).await;
        assert_eq!(result.assignments[0].courier_id, late.id);
    }

    #[tokio::test]
    async fn excess_groups_become_orphans_then_absorbed_if_capacity_allows() {
        // Two well-separated orders, one courier: one group is dispatched,
        // the other order orphans and then gets folded into the live batch
        // since it's under MAX_ABS capacity.
        let orders = vec![mk_order(0.0, 0.0, 1), mk_order(10.0, 10.0, 2)];
        let couriers = vec![mk_courier(0)];
        let result = plan_dispatch(&orders, &couriers, Point { lat: 0.0, lng: 0.0 }, &FallbackOnlyRouting, &ClusteringParams::default()).await;
        assert_eq!(result.assignments.len(), 1);
        assert_eq!(result.assignments[0].stops.len(), 2);
        assert!(result.orphaned_order_ids.is_empty());
    }

    #[tokio::test]
    async fn orphan_left_unassigned_once_every_batch_is_at_max_abs() {
        let mut orders: Vec<Order> = (0..6).map(|i| mk_order(i as f64 * 10.0, 0.0, i)).collect();
        orders.push(mk_order(999.0, 999.0, 99));
        let couriers = vec![mk_courier(0)];
        let result = plan_dispatch(&orders, &couriers, Point { lat: 0.0, lng: 0.0 }, &FallbackOnlyRouting, &ClusteringParams::default()).await;
        assert_eq!(result.assignments.len(), 1);
        assert_eq!(result.assignments[0].stops.len(), MAX_ABS);
        assert_eq!(result.orphaned_order_ids.len(), 1);
    }
}
