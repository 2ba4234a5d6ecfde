//! Road-distance lookups for stop ordering (§4.3). `RoutingClient` is the
//! only I/O seam the Dispatcher touches outside the Store; it must be
//! called outside any Store transaction so a slow or failing provider
//! never holds a database lock open.

pub mod http_client;

use async_trait::async_trait;

use crate::domain::Point;

pub const FALLBACK_SPEED_FACTOR: f64 = 1.4;
pub const FALLBACK_METERS_PER_KM: f64 = 1000.0;

/// A resolved driving distance, tagged with whether it came from the live
/// provider or its deterministic fallback. The Dispatcher logs this but
/// never branches on it: fallback distances are valid inputs, not errors.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DistanceSource {
    Live,
    Fallback,
}

#[derive(Clone, Copy, Debug)]
pub struct Distance {
    pub meters: f64,
    pub source: DistanceSource,
}

/// An overview polyline through a sequence of stops, plus the per-leg
/// distances (start→stop[0], stop[0]→stop[1], ...) the provider measured
/// along it. Optional overlay: its absence never blocks a dispatch run.
#[derive(Clone, Debug)]
pub struct RoutePolyline {
    pub polyline: String,
    pub legs: Vec<f64>,
}

#[async_trait]
pub trait RoutingClient: Send + Sync {
    async fn driving_distance_m(&self, from: Point, to: Point) -> Distance;
    /// Requests driving directions from `start` through `stops`, in the
    /// order given — the provider is never asked to re-order them, since
    /// the dispatcher has already chosen that order (§4.4 Step 5).
    async fn route_polyline(&self, start: Point, stops: &[Point]) -> Option<RoutePolyline>;
}

/// Straight-line distance scaled up to approximate road travel, used
/// whenever the live provider times out, errors, or is disabled. Always
/// succeeds; this is what makes the Dispatcher availability-independent
/// of the external provider.
pub fn fallback_distance(from: Point, to: Point) -> Distance {
    let km = crate::geo::haversine(from, to);
    Distance {
        meters: km * FALLBACK_METERS_PER_KM * FALLBACK_SPEED_FACTOR,
        source: DistanceSource::Fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_scales_straight_line_by_speed_factor() {
        let a = Point { lat: 0.0, lng: 0.0 };
        let b = Point { lat: 0.01, lng: 0.0 };
        let straight_km = crate::geo::haversine(a, b);
        let d = fallback_distance(a, b);
        assert_eq!(d.source, DistanceSource::Fallback);
        assert!((d.meters - straight_km * 1000.0 * 1.4).abs() < 1e-6);
    }
}
