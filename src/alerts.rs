//! Operator alerts (§4.8): a small ordered decision tree over queue depth
//! and courier availability, evaluated fresh on every call.

use uuid::Uuid;

use crate::domain::OrderStatus;
use crate::error::DispatchError;
use crate::metrics;
use crate::store::Store;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverallStatus {
    Success,
    Info,
    Atencao,
    Critico,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertKind {
    NoCouriersForQueue,
    SufficientCouriers,
    InsufficientCouriers,
    AllCouriersBusy,
    OperationFlowing,
    Normal,
}

#[derive(Clone, Debug)]
pub struct Alert {
    pub kind: AlertKind,
    pub title: String,
    pub message: String,
    pub suggested_action: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AlertsResult {
    pub status: OverallStatus,
    pub recommended_couriers: u32,
    pub alerts: Vec<Alert>,
}

#[tracing::instrument(skip(store), fields(tenant_id = %tenant_id))]
pub async fn evaluate(store: &dyn Store, tenant_id: Uuid) -> Result<AlertsResult, DispatchError> {
    let orders = store
        .list_orders(tenant_id, None, usize::MAX)
        .await
        .map_err(crate::error::to_internal)?;
    let couriers = store
        .list_couriers(tenant_id, None)
        .await
        .map_err(crate::error::to_internal)?;

    let queue = orders
        .iter()
        .filter(|o| o.status == OrderStatus::Ready && o.batch_id.is_none())
        .count();
    let in_route = orders
        .iter()
        .filter(|o| matches!(o.status, OrderStatus::Assigned | OrderStatus::PickedUp))
        .count();
    let counts = metrics::courier_counts(&couriers);
    let total_active = counts.available + counts.busy;

    let (status, recommended_couriers, alert) = if queue > 0 && total_active == 0 {
        (
            OverallStatus::Critico,
            (queue as f64 / 2.0).ceil() as u32 + 1,
            Alert {
                kind: AlertKind::NoCouriersForQueue,
                title: "No couriers available".to_string(),
                message: format!("{queue} order(s) waiting and no couriers online"),
                suggested_action: Some("bring a courier online".to_string()),
            },
        )
    } else if queue > 0 && counts.available >= queue {
        (
            OverallStatus::Info,
            0,
            Alert {
                kind: AlertKind::SufficientCouriers,
                title: "Ready to dispatch".to_string(),
                message: format!("{queue} order(s) ready and enough couriers available"),
                suggested_action: Some("run dispatch".to_string()),
            },
        )
    } else if queue > 0 && counts.available > 0 {
        let shortfall = (queue - counts.available) as u32;
        (
            OverallStatus::Atencao,
            shortfall,
            Alert {
                kind: AlertKind::InsufficientCouriers,
                title: "Not enough couriers".to_string(),
                message: format!("{queue} order(s) waiting, only {} courier(s) available", counts.available),
                suggested_action: Some(format!("bring {shortfall} more courier(s) online")),
            },
        )
    } else if queue > 0 && counts.available == 0 && counts.busy > 0 {
        (
            OverallStatus::Atencao,
            1,
            Alert {
                kind: AlertKind::AllCouriersBusy,
                title: "All couriers busy".to_string(),
                message: format!("{queue} order(s) waiting, all couriers are out on deliveries"),
                suggested_action: Some("wait for returns or activate more couriers".to_string()),
            },
        )
    } else if queue == 0 && in_route > 0 {
        (
            OverallStatus::Success,
            0,
            Alert {
                kind: AlertKind::OperationFlowing,
                title: "Operation flowing".to_string(),
                message: format!("{in_route} order(s) currently in route, no backlog"),
                suggested_action: None,
            },
        )
    } else {
        (
            OverallStatus::Success,
            0,
            Alert {
                kind: AlertKind::Normal,
                title: "All clear".to_string(),
                message: "no orders waiting or in route".to_string(),
                suggested_action: None,
            },
        )
    };

    Ok(AlertsResult {
        status,
        recommended_couriers,
        alerts: vec![alert],
    })
}
