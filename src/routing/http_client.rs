//! `reqwest`-backed production `RoutingClient`. Any failure - timeout,
//! non-2xx, malformed body - is normalized to the deterministic fallback
//! rather than surfaced as an error, per §4.3: a routing provider outage
//! must never block a dispatch run.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::Point;
use crate::logger::warn_if_slow;
use crate::routing::{Distance, DistanceSource, RoutePolyline, RoutingClient, fallback_distance};

const SLOW_CALL_BUDGET: Duration = Duration::from_millis(250);

pub struct HttpRoutingClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpRoutingClient {
    pub fn new(base_url: String, api_key: String, timeout_ms: u64) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }
}

#[derive(Deserialize)]
struct DistanceResponse {
    meters: f64,
}

#[derive(Deserialize)]
struct PolylineResponse {
    polyline: String,
    legs: Vec<f64>,
}

#[async_trait]
impl RoutingClient for HttpRoutingClient {
    async fn driving_distance_m(&self, from: Point, to: Point) -> Distance {
        if self.api_key.is_empty() {
            return fallback_distance(from, to);
        }

        let result: anyhow::Result<f64> = warn_if_slow("routing::driving_distance_m", SLOW_CALL_BUDGET, async {
            let resp = self
                .http
                .get(format!("{}/distance", self.base_url))
                .query(&[
                    ("from_lat", from.lat),
                    ("from_lng", from.lng),
                    ("to_lat", to.lat),
                    ("to_lng", to.lng),
                ])
                .bearer_auth(&self.api_key)
                .send()
                .await?
                .error_for_status()?
                .json::<DistanceResponse>()
                .await?;
            Ok(resp.meters)
        })
        .await;

        match result {
            Ok(meters) => Distance {
                meters,
                source: DistanceSource::Live,
            },
            Err(e) => {
                tracing::warn!(error = %e, "routing provider call failed, using fallback distance");
                fallback_distance(from, to)
            }
        }
    }

    async fn route_polyline(&self, start: Point, stops: &[Point]) -> Option<RoutePolyline> {
        if self.api_key.is_empty() || stops.is_empty() {
            return None;
        }

        let mut waypoints: Vec<String> = vec![format!("{},{}", start.lat, start.lng)];
        waypoints.extend(stops.iter().map(|p| format!("{},{}", p.lat, p.lng)));

        let result: anyhow::Result<RoutePolyline> = warn_if_slow("routing::route_polyline", SLOW_CALL_BUDGET, async {
            let resp = self
                .http
                .get(format!("{}/route", self.base_url))
                .query(&[("waypoints", waypoints.join("|")), ("optimize", "false".to_string())])
                .bearer_auth(&self.api_key)
                .send()
                .await?
                .error_for_status()?
                .json::<PolylineResponse>()
                .await?;
            Ok(RoutePolyline {
                polyline: resp.polyline,
                legs: resp.legs,
            })
        })
        .await;

        match result {
            Ok(route) => Some(route),
            Err(e) => {
                tracing::warn!(error = %e, "routing provider polyline call failed, omitting polyline");
                None
            }
        }
    }
}
