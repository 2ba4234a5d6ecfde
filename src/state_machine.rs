//! Pure state-transition functions (§4.5). No Store access: callers
//! (the Dispatcher, and the out-of-scope API Facade) persist whatever
//! effect comes back. A rejected transition never mutates its input.

use crate::domain::{Batch, BatchStatus, Courier, CourierStatus, Order, OrderStatus};
use crate::error::DispatchError;

fn invalid(from: impl std::fmt::Debug, trigger: &str, to: impl std::fmt::Debug) -> DispatchError {
    DispatchError::InvalidTransition(format!("{from:?} -> {trigger} -> {to:?} is not allowed"))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderTrigger {
    StartPrep,
    ScanQr,
    Dispatch,
    Pickup,
    Deliver,
    Cancel,
}

/// Applies `trigger` to `order`, mutating it in place on success.
/// `now_ms` stamps the effect's timestamp; unused by triggers that don't
/// set one.
pub fn apply_order_transition(
    order: &mut Order,
    trigger: OrderTrigger,
    now_ms: i64,
) -> Result<(), DispatchError> {
    use OrderStatus::*;
    use OrderTrigger::*;

    match (order.status, trigger) {
        (Created, StartPrep) => {
            order.status = Preparing;
        }
        (Created, ScanQr) | (Preparing, ScanQr) => {
            order.status = Ready;
            order.ready_at = Some(now_ms);
        }
        (Ready, Dispatch) => {
            // batch_id/stop_order are set by the caller (the Dispatcher)
            // before/with this call; this transition only flips status.
            order.status = Assigned;
        }
        (Assigned, Pickup) => {
            order.status = PickedUp;
        }
        (Assigned, Deliver) | (PickedUp, Deliver) => {
            order.status = Delivered;
            order.delivered_at = Some(now_ms);
        }
        (status, Cancel) if !status.is_terminal() => {
            order.status = Cancelled;
            order.cancelled_at = Some(now_ms);
        }
        (from, trig) => return Err(invalid(from, &format!("{trig:?}"), "?")),
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CourierTrigger {
    GoAvailable,
    GoOffline,
    Dispatch,
    CompleteBatch,
}

pub fn apply_courier_transition(
    courier: &mut Courier,
    trigger: CourierTrigger,
    has_active_batch: bool,
    now_ms: i64,
) -> Result<(), DispatchError> {
    use CourierStatus::*;
    use CourierTrigger::*;

    match (courier.status, trigger) {
        (Offline, GoAvailable) => {
            courier.status = Available;
            courier.available_since = Some(now_ms);
        }
        (Available, GoOffline) if !has_active_batch => {
            courier.status = Offline;
            courier.available_since = None;
        }
        (Available, Dispatch) => {
            courier.status = Busy;
        }
        (Busy, CompleteBatch) => {
            courier.status = Available;
            courier.available_since = Some(now_ms);
        }
        (from, trig) => return Err(invalid(from, &format!("{trig:?}"), "?")),
    }
    Ok(())
}

/// Batch status follows its orders; the Dispatcher/API layer calls this
/// whenever an order inside the batch moves, rather than the batch
/// exposing its own independent trigger set.
pub fn derive_batch_status(batch_status: BatchStatus, order_statuses: &[OrderStatus]) -> BatchStatus {
    if order_statuses.iter().all(|s| *s == OrderStatus::Delivered) {
        return BatchStatus::Done;
    }
    if batch_status == BatchStatus::Assigned
        && order_statuses
            .iter()
            .any(|s| matches!(s, OrderStatus::PickedUp | OrderStatus::Delivered))
    {
        return BatchStatus::InProgress;
    }
    batch_status
}

pub fn complete_batch(batch: &mut Batch, order_statuses: &[OrderStatus], now_ms: i64) -> Result<(), DispatchError> {
    if !order_statuses.iter().all(|s| *s == OrderStatus::Delivered) {
        return Err(DispatchError::InvalidTransition(
            "cannot complete a batch with undelivered orders".to_string(),
        ));
    }
    batch.status = BatchStatus::Done;
    batch.completed_at = Some(now_ms);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Plan, PrepType, Point};
    use uuid::Uuid;

    fn mk_order(status: OrderStatus) -> Order {
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
            created_at: 0,
            ready_at: None,
            delivered_at: None,
            cancelled_at: None,
            batch_id: None,
            stop_order: None,
        }
    }

    fn mk_courier(status: CourierStatus) -> Courier {
        Courier {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "x".into(),
            phone: "555".into(),
            status,
            last_point: None,
            available_since: None,
        }
    }

    #[test]
    fn scan_from_created_sets_ready_at() {
        let mut o = mk_order(OrderStatus::Created);
        apply_order_transition(&mut o, OrderTrigger::ScanQr, 500).unwrap();
        assert_eq!(o.status, OrderStatus::Ready);
        assert_eq!(o.ready_at, Some(500));
    }

    #[test]
    fn scan_from_preparing_also_sets_ready() {
        let mut o = mk_order(OrderStatus::Preparing);
        apply_order_transition(&mut o, OrderTrigger::ScanQr, 10).unwrap();
        assert_eq!(o.status, OrderStatus::Ready);
    }

    #[test]
    fn pickup_requires_assigned_s5() {
        // Spec scenario S5: order in `ready`, pickup requested.
        let mut o = mk_order(OrderStatus::Ready);
        let before = o.status;
        let err = apply_order_transition(&mut o, OrderTrigger::Pickup, 0).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidTransition(_)));
        assert_eq!(o.status, before, "rejected transition must not mutate");
    }

    #[test]
    fn deliver_skips_pickup_from_assigned() {
        let mut o = mk_order(OrderStatus::Assigned);
        apply_order_transition(&mut o, OrderTrigger::Deliver, 99).unwrap();
        assert_eq!(o.status, OrderStatus::Delivered);
        assert_eq!(o.delivered_at, Some(99));
    }

    #[test]
    fn cancel_allowed_from_any_nonterminal_state() {
        for status in [
            OrderStatus::Created,
            OrderStatus::Preparing,
            OrderStatus::Ready,
            OrderStatus::Assigned,
            OrderStatus::PickedUp,
        ] {
            let mut o = mk_order(status);
            apply_order_transition(&mut o, OrderTrigger::Cancel, 7).unwrap();
            assert_eq!(o.status, OrderStatus::Cancelled);
        }
    }

    #[test]
    fn cancel_rejected_once_terminal() {
        let mut o = mk_order(OrderStatus::Delivered);
        assert!(apply_order_transition(&mut o, OrderTrigger::Cancel, 0).is_err());
    }

    #[test]
    fn courier_offline_to_available_stamps_available_since() {
        let mut c = mk_courier(CourierStatus::Offline);
        apply_courier_transition(&mut c, CourierTrigger::GoAvailable, false, 42).unwrap();
        assert_eq!(c.status, CourierStatus::Available);
        assert_eq!(c.available_since, Some(42));
    }

    #[test]
    fn courier_cannot_go_offline_with_active_batch() {
        let mut c = mk_courier(CourierStatus::Available);
        let err = apply_courier_transition(&mut c, CourierTrigger::GoOffline, true, 0).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidTransition(_)));
        assert_eq!(c.status, CourierStatus::Available);
    }

    #[test]
    fn batch_status_flips_to_in_progress_on_first_pickup() {
        let next = derive_batch_status(
            BatchStatus::Assigned,
            &[OrderStatus::PickedUp, OrderStatus::Assigned],
        );
        assert_eq!(next, BatchStatus::InProgress);
    }

    #[test]
    fn batch_status_done_requires_all_delivered() {
        let next = derive_batch_status(
            BatchStatus::InProgress,
            &[OrderStatus::Delivered, OrderStatus::PickedUp],
        );
        assert_eq!(next, BatchStatus::InProgress);

        let done = derive_batch_status(BatchStatus::InProgress, &[OrderStatus::Delivered]);
        assert_eq!(done, BatchStatus::Done);
    }
}
