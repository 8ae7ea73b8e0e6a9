//! Position Publisher: while sharing is active, samples device location on a
//! fixed cadence or a minimum displacement, whichever triggers first, and
//! overwrites the vehicle's live node wholesale.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::error::{Result, TrackingError};
use crate::models::{now_ms, LivePosition, VehiclePresence};
use crate::publisher::location::{displacement_m, LocationFix, LocationSource};
use crate::store::LiveSession;

pub struct PositionPublisher {
    session: Arc<LiveSession>,
    source: Arc<dyn LocationSource>,
    vehicle_id: String,
    driver_uid: String,
    sample_interval: Duration,
    min_displacement_m: f64,
    sampler: Mutex<Option<JoinHandle<()>>>,
}

impl PositionPublisher {
    pub fn new(
        session: Arc<LiveSession>,
        source: Arc<dyn LocationSource>,
        vehicle_id: impl Into<String>,
        driver_uid: impl Into<String>,
        sample_interval: Duration,
        min_displacement_m: f64,
    ) -> Self {
        Self {
            session,
            source,
            vehicle_id: vehicle_id.into(),
            driver_uid: driver_uid.into(),
            sample_interval,
            min_displacement_m,
            sampler: Mutex::new(None),
        }
    }

    /// Starts sharing. No-op while a sampler is already running.
    ///
    /// The disconnect-triggered cleanup (live node removal + presence
    /// offline) is registered before the first sample, so a crash between
    /// start and first sample still self-heals.
    pub async fn start_sharing(&self, route_id: Option<&str>) -> Result<()> {
        let route_id = route_id
            .ok_or(TrackingError::NoRouteAssigned)?
            .to_string();

        let mut sampler = self.sampler.lock().await;
        if sampler.as_ref().is_some_and(|h| !h.is_finished()) {
            return Ok(());
        }

        if !self.source.request_permission().await {
            return Err(TrackingError::PermissionDenied);
        }

        let now = now_ms();
        self.session.on_disconnect_remove_live(&self.vehicle_id).await?;
        self.session
            .on_disconnect_set_vehicle_presence(
                &self.vehicle_id,
                VehiclePresence {
                    online: false,
                    last_seen: now,
                    driver_uid: self.driver_uid.clone(),
                },
            )
            .await?;

        info!("sharing started for vehicle {}", self.vehicle_id);
        *sampler = Some(tokio::spawn(run_sampler(
            self.session.clone(),
            self.source.clone(),
            self.vehicle_id.clone(),
            self.driver_uid.clone(),
            route_id,
            self.sample_interval,
            self.min_displacement_m,
        )));
        Ok(())
    }

    /// Stops sharing: cancels the sampler and removes the live node right
    /// away instead of waiting for the disconnect hook, which only fires on
    /// connection loss. Presence stays online — the driver is still in the
    /// app.
    pub async fn stop_sharing(&self) {
        if let Some(handle) = self.sampler.lock().await.take() {
            handle.abort();
        }

        if let Err(e) = self.session.remove_live(&self.vehicle_id).await {
            warn!("live node removal failed for {}: {}", self.vehicle_id, e);
        }
        let presence = VehiclePresence {
            online: true,
            last_seen: now_ms(),
            driver_uid: self.driver_uid.clone(),
        };
        if let Err(e) = self
            .session
            .set_vehicle_presence(&self.vehicle_id, presence)
            .await
        {
            warn!("presence downgrade failed for {}: {}", self.vehicle_id, e);
        }
        info!("sharing stopped for vehicle {}", self.vehicle_id);
    }

    pub async fn is_sharing(&self) -> bool {
        self.sampler
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

async fn run_sampler(
    session: Arc<LiveSession>,
    source: Arc<dyn LocationSource>,
    vehicle_id: String,
    driver_uid: String,
    route_id: String,
    sample_interval: Duration,
    min_displacement_m: f64,
) {
    let mut ticker = tokio::time::interval(sample_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // interval fires immediately once; there is nothing to publish yet
    ticker.tick().await;

    let mut latest: Option<LocationFix> = None;
    let mut last_published: Option<LocationFix> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(fix) = latest.clone() {
                    publish_sample(&session, &vehicle_id, &driver_uid, &route_id, &fix).await;
                    last_published = Some(fix);
                }
            }
            fix = source.next_fix() => {
                let Some(fix) = fix else { break };
                let moved = match &last_published {
                    Some(prev) => displacement_m(prev, &fix) >= min_displacement_m,
                    None => true,
                };
                latest = Some(fix.clone());
                if moved {
                    publish_sample(&session, &vehicle_id, &driver_uid, &route_id, &fix).await;
                    last_published = Some(fix);
                    ticker.reset();
                }
            }
        }
    }
}

/// One sample: wholesale overwrite of the live node plus a presence
/// heartbeat. Write failures are logged and swallowed — a transient failure
/// must not break the sampling loop.
async fn publish_sample(
    session: &LiveSession,
    vehicle_id: &str,
    driver_uid: &str,
    route_id: &str,
    fix: &LocationFix,
) {
    let now = now_ms();
    let position = LivePosition {
        lat: fix.lat,
        lng: fix.lng,
        speed: fix.speed,
        updated_at: now,
        driver_uid: driver_uid.to_string(),
        route_id: route_id.to_string(),
    };
    if let Err(e) = session.set_live(vehicle_id, position).await {
        warn!("live write failed for {}: {}", vehicle_id, e);
    }

    let heartbeat = VehiclePresence {
        online: true,
        last_seen: now,
        driver_uid: driver_uid.to_string(),
    };
    if let Err(e) = session.set_vehicle_presence(vehicle_id, heartbeat).await {
        warn!("presence heartbeat failed for {}: {}", vehicle_id, e);
    }
}
