//! Device-location seam for the position publisher.

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

/// One raw device fix, as the platform location service reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationFix {
    pub lat: f64,
    pub lng: f64,
    /// km/h
    pub speed: f64,
}

/// The platform location service.
///
/// Implementations deliver raw fixes at the device's own rate; the publisher
/// applies the cadence and displacement policy on top.
#[async_trait]
pub trait LocationSource: Send + Sync {
    /// Foreground location permission. Must be granted before sampling.
    async fn request_permission(&self) -> bool;

    /// Next raw fix; `None` when the source shuts down.
    async fn next_fix(&self) -> Option<LocationFix>;
}

/// Channel-fed source for tests and the simulator.
pub struct ScriptedLocationSource {
    permission: bool,
    tx: mpsc::UnboundedSender<LocationFix>,
    rx: Mutex<mpsc::UnboundedReceiver<LocationFix>>,
}

impl ScriptedLocationSource {
    pub fn new(permission: bool) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            permission,
            tx,
            rx: Mutex::new(rx),
        }
    }

    pub fn push(&self, fix: LocationFix) {
        // Receiver lives as long as self; send cannot fail.
        let _ = self.tx.send(fix);
    }
}

#[async_trait]
impl LocationSource for ScriptedLocationSource {
    async fn request_permission(&self) -> bool {
        self.permission
    }

    async fn next_fix(&self) -> Option<LocationFix> {
        self.rx.lock().await.recv().await
    }
}

/// Ground distance between two fixes in meters.
///
/// Equirectangular approximation; at sampling displacements (tens of meters)
/// the error versus great-circle distance is negligible.
pub fn displacement_m(a: &LocationFix, b: &LocationFix) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let mean_lat = ((a.lat + b.lat) / 2.0).to_radians();
    let x = d_lng * mean_lat.cos();
    (x * x + d_lat * d_lat).sqrt() * EARTH_RADIUS_M
}
