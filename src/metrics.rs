//! Pure tenant-scoped read computations (§4.6) over order/courier windows
//! the caller has already fetched from the Store.

use crate::domain::{CourierStatus, Order, OrderStatus};

const PREP_WINDOW_MIN: (f64, f64) = (0.0, 120.0);
const ROUTE_WINDOW_MIN: (f64, f64) = (0.0, 180.0);
const ROUTE_RETURN_LEG_MULTIPLIER: f64 = 1.5;
const MIN_SAMPLES: usize = 2;

fn minutes_between(start_ms: i64, end_ms: i64) -> f64 {
    (end_ms - start_ms) as f64 / 60_000.0
}

/// Mean `(ready_at - created_at)` in minutes, orders bounded to
/// `PREP_WINDOW_MIN`. `None` below `MIN_SAMPLES`.
pub fn avg_prep_min(orders: &[Order]) -> Option<f64> {
    let samples: Vec<f64> = orders
        .iter()
        .filter_map(|o| o.ready_at.map(|ready| minutes_between(o.created_at, ready)))
        .filter(|m| *m > PREP_WINDOW_MIN.0 && *m < PREP_WINDOW_MIN.1)
        .collect();

    if samples.len() < MIN_SAMPLES {
        return None;
    }
    Some(samples.iter().sum::<f64>() / samples.len() as f64)
}

/// Mean `1.5 * (delivered_at - ready_at)` in minutes for delivered
/// orders, bounded to `ROUTE_WINDOW_MIN`. `None` below `MIN_SAMPLES`.
pub fn avg_route_min(orders: &[Order]) -> Option<f64> {
    let samples: Vec<f64> = orders
        .iter()
        .filter(|o| o.status == OrderStatus::Delivered)
        .filter_map(|o| {
            let ready = o.ready_at?;
            let delivered = o.delivered_at?;
            Some(ROUTE_RETURN_LEG_MULTIPLIER * minutes_between(ready, delivered))
        })
        .filter(|m| *m > ROUTE_WINDOW_MIN.0 && *m < ROUTE_WINDOW_MIN.1)
        .collect();

    if samples.len() < MIN_SAMPLES {
        return None;
    }
    Some(samples.iter().sum::<f64>() / samples.len() as f64)
}

pub fn orders_last_hour(orders: &[Order], now_ms: i64) -> usize {
    let one_hour_ago = now_ms - 60 * 60 * 1000;
    orders.iter().filter(|o| o.created_at >= one_hour_ago).count()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CourierCounts {
    pub available: usize,
    pub busy: usize,
}

pub fn courier_counts(couriers: &[crate::domain::Courier]) -> CourierCounts {
    let mut counts = CourierCounts::default();
    for c in couriers {
        match c.status {
            CourierStatus::Available => counts.available += 1,
            CourierStatus::Busy => counts.busy += 1,
            CourierStatus::Offline => {}
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Courier, Point, PrepType};
    use uuid::Uuid;

    fn mk_order(created_at: i64, ready_at: Option<i64>, delivered_at: Option<i64>, status: OrderStatus) -> Order {
        Order {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            short_id: 1001,
            tracking_code: "MF-ABCDEF".into(),
            customer_name: None,
            address: "x".into(),
            point: Point { lat: 0.0, lng: 0.0 },
            prep_type: PrepType::Short,
            status,
            created_at,
            ready_at,
            delivered_at,
            cancelled_at: None,
            batch_id: None,
            stop_order: None,
        }
    }

    #[test]
    fn avg_prep_needs_two_samples() {
        let orders = vec![mk_order(0, Some(600_000), None, OrderStatus::Ready)];
        assert_eq!(avg_prep_min(&orders), None);
    }

    #[test]
    fn avg_prep_averages_in_window() {
        let orders = vec![
            mk_order(0, Some(600_000), None, OrderStatus::Ready),
            mk_order(0, Some(1_200_000), None, OrderStatus::Ready),
        ];
        let avg = avg_prep_min(&orders).unwrap();
        assert!((avg - 15.0).abs() < 1e-9);
    }

    #[test]
    fn avg_prep_excludes_out_of_window_samples() {
        let orders = vec![
            mk_order(0, Some(600_000), None, OrderStatus::Ready),
            mk_order(0, Some(1_200_000), None, OrderStatus::Ready),
            mk_order(0, Some(3 * 60 * 60 * 1000), None, OrderStatus::Ready),
        ];
        let avg = avg_prep_min(&orders).unwrap();
        assert!((avg - 15.0).abs() < 1e-9);
    }

    #[test]
    fn avg_route_applies_return_leg_multiplier() {
        let orders = vec![
            mk_order(0, Some(0), Some(600_000), OrderStatus::Delivered),
            mk_order(0, Some(0), Some(1_200_000), OrderStatus::Delivered),
        ];
        let avg = avg_route_min(&orders).unwrap();
        assert!((avg - 15.0 * 1.5).abs() < 1e-9);
    }

    #[test]
    fn orders_last_hour_filters_by_window() {
        let now = 10 * 60 * 60 * 1000;
        let orders = vec![
            mk_order(now - 30 * 60 * 1000, None, None, OrderStatus::Created),
            mk_order(now - 2 * 60 * 60 * 1000, None, None, OrderStatus::Created),
        ];
        assert_eq!(orders_last_hour(&orders, now), 1);
    }

    #[test]
    fn courier_counts_splits_by_status() {
        let mk = |status| Courier {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "x".into(),
            phone: "1".into(),
            status,
            last_point: None,
            available_since: None,
        };
        let couriers = vec![
            mk(CourierStatus::Available),
            mk(CourierStatus::Available),
            mk(CourierStatus::Busy),
            mk(CourierStatus::Offline),
        ];
        let counts = courier_counts(&couriers);
        assert_eq!(counts, CourierCounts { available: 2, busy: 1 });
    }
}
