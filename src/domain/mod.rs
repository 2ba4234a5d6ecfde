//! Entities and value types of the dispatch core (§3 of the spec).
//!
//! These types carry no persistence or I/O; `crate::store` is the only
//! thing that reads or writes them durably. Invariant-checking helpers
//! live on the types themselves so the state-machine layer and the
//! dispatcher can call them without duplicating the rules.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Decimal-degree coordinate. `lat` in `[-90, 90]`, `lng` in `[-180, 180]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lng: f64,
}

impl Point {
    pub fn in_range(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Plan {
    Trial,
    Basic,
    Pro,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub address: String,
    pub base_point: Option<Point>,
    pub plan: Plan,
    pub trial_ends_at: Option<i64>,
    pub blocked: bool,
}

impl Tenant {
    /// A trial tenant whose `trial_ends_at` has passed is blocked even if
    /// the `blocked` flag on the persisted row hasn't been flipped yet;
    /// the Store is responsible for flipping it on the next read/write,
    /// this is the pure predicate it uses to decide that.
    pub fn should_be_blocked(&self, now_ms: i64) -> bool {
        self.plan == Plan::Trial
            && self
                .trial_ends_at
                .is_some_and(|deadline| now_ms >= deadline)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrepType {
    Short,
    Long,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Created,
    Preparing,
    Ready,
    Assigned,
    PickedUp,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub short_id: i64,
    pub tracking_code: String,
    pub customer_name: Option<String>,
    pub address: String,
    pub point: Point,
    pub prep_type: PrepType,
    pub status: OrderStatus,
    pub created_at: i64,
    pub ready_at: Option<i64>,
    pub delivered_at: Option<i64>,
    pub cancelled_at: Option<i64>,
    pub batch_id: Option<Uuid>,
    pub stop_order: Option<u32>,
}

impl Order {
    /// Invariant 2: `batch_id` set iff status is in the assigned family
    /// and `stop_order >= 1` accompanies it.
    pub fn batch_coupling_holds(&self) -> bool {
        let in_assigned_family = matches!(
            self.status,
            OrderStatus::Assigned | OrderStatus::PickedUp | OrderStatus::Delivered
        );
        match self.batch_id {
            Some(_) => in_assigned_family && self.stop_order.is_some_and(|n| n >= 1),
            None => !in_assigned_family || self.status == OrderStatus::Cancelled,
        }
    }

    /// Invariant 7: timestamps are non-decreasing whenever set.
    pub fn timestamps_ordered(&self) -> bool {
        if let (Some(ready), Some(delivered)) = (self.ready_at, self.delivered_at) {
            if ready > delivered {
                return false;
            }
        }
        if let Some(ready) = self.ready_at {
            if self.created_at > ready {
                return false;
            }
        }
        true
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CourierStatus {
    Offline,
    Available,
    Busy,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Courier {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub phone: String,
    pub status: CourierStatus,
    pub last_point: Option<Point>,
    pub available_since: Option<i64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStatus {
    Assigned,
    InProgress,
    Done,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Batch {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub courier_id: Uuid,
    pub status: BatchStatus,
    pub created_at: i64,
    pub completed_at: Option<i64>,
    /// Overview polyline through the batch's stops, fetched from the
    /// Routing Client at dispatch time. Optional overlay; `None` when the
    /// provider was unavailable or disabled.
    pub route_polyline: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DemandPattern {
    pub tenant_id: Uuid,
    pub weekday: u8,
    pub hour: u8,
    pub avg_orders_per_hour: f64,
    pub avg_prep_min: Option<f64>,
    pub avg_route_min: Option<f64>,
    pub recommended_couriers: u32,
    pub samples: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_order(status: OrderStatus, batch_id: Option<Uuid>, stop_order: Option<u32>) -> Order {
        Order {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            short_id: 1001,
            tracking_code: "MF-ABC123".to_string(),
            customer_name: None,
            address: "x".to_string(),
            point: Point { lat: 0.0, lng: 0.0 },
            prep_type: PrepType::Short,
            status,
            created_at: 0,
            ready_at: None,
            delivered_at: None,
            cancelled_at: None,
            batch_id,
            stop_order,
        }
    }

    #[test]
    fn batch_coupling_holds_when_assigned_with_stop_order() {
        let o = base_order(OrderStatus::Assigned, Some(Uuid::new_v4()), Some(1));
        assert!(o.batch_coupling_holds());
    }

    #[test]
    fn batch_coupling_violated_when_assigned_without_stop_order() {
        let o = base_order(OrderStatus::Assigned, Some(Uuid::new_v4()), None);
        assert!(!o.batch_coupling_holds());
    }

    #[test]
    fn batch_coupling_holds_for_ready_without_batch() {
        let o = base_order(OrderStatus::Ready, None, None);
        assert!(o.batch_coupling_holds());
    }

    #[test]
    fn batch_coupling_violated_when_ready_but_batch_set() {
        let o = base_order(OrderStatus::Ready, Some(Uuid::new_v4()), Some(1));
        assert!(!o.batch_coupling_holds());
    }

    #[test]
    fn timestamps_ordered_rejects_ready_after_delivered() {
        let mut o = base_order(OrderStatus::Delivered, None, None);
        o.ready_at = Some(100);
        o.delivered_at = Some(50);
        assert!(!o.timestamps_ordered());
    }

    #[test]
    fn point_in_range_boundaries() {
        assert!(Point { lat: 90.0, lng: 180.0 }.in_range());
        assert!(Point { lat: -90.0, lng: -180.0 }.in_range());
        assert!(!Point { lat: 90.1, lng: 0.0 }.in_range());
    }

    #[test]
    fn trial_tenant_blocked_once_deadline_passes() {
        let t = Tenant {
            id: Uuid::new_v4(),
            slug: "acme".into(),
            name: "Acme".into(),
            address: "somewhere".into(),
            base_point: None,
            plan: Plan::Trial,
            trial_ends_at: Some(1_000),
            blocked: false,
        };
        assert!(!t.should_be_blocked(999));
        assert!(t.should_be_blocked(1_000));
    }
}
