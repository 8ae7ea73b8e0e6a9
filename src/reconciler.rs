//! Live Status Reconciler: derives a per-vehicle LIVE / ONLINE / OFFLINE
//! display status from the catalog and the two live-tree presence streams.
//!
//! The derivation is a pure function of independently-arriving snapshots and
//! is recomputed on every update to any input; a coarse tick drives the
//! LIVE-to-stale decay when no input event arrives.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::models::{now_ms, LivePosition, UserPresence, Vehicle, VehiclePresence};
use crate::store::{Catalog, LiveStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleStatus {
    Live,
    Online,
    Offline,
}

/// Priority order, first match wins.
///
/// LIVE strictly dominates ONLINE: a vehicle with a fresh position is LIVE
/// even if its presence flag is momentarily false — write ordering across
/// the two sub-trees is not guaranteed and the race is tolerated.
pub fn derive_status(
    position: Option<&LivePosition>,
    presence: Option<&VehiclePresence>,
    now_ms: i64,
    live_window_ms: i64,
) -> VehicleStatus {
    if let Some(pos) = position {
        if now_ms - pos.updated_at < live_window_ms {
            return VehicleStatus::Live;
        }
    }
    if presence.is_some_and(|p| p.online) {
        return VehicleStatus::Online;
    }
    VehicleStatus::Offline
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusRow {
    pub vehicle: Vehicle,
    pub status: VehicleStatus,
    /// Raw presence flag, kept separate from `status` for ordering: a LIVE
    /// vehicle whose presence already flipped still sorts below a LIVE one
    /// that is also online.
    pub online: bool,
    pub position: Option<LivePosition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FleetSummary {
    pub vehicles: usize,
    pub live: usize,
    pub online: usize,
    pub users_online: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FleetView {
    pub rows: Vec<StatusRow>,
    pub summary: FleetSummary,
}

/// "Live now" ordering: LIVE before not-LIVE, then online before offline,
/// then newest vehicle first.
pub fn order_rows(rows: &mut [StatusRow]) {
    rows.sort_by(|a, b| {
        let a_live = a.status == VehicleStatus::Live;
        let b_live = b.status == VehicleStatus::Live;
        b_live
            .cmp(&a_live)
            .then(b.online.cmp(&a.online))
            .then(b.vehicle.created_at.cmp(&a.vehicle.created_at))
    });
}

/// Builds the full fleet view from one consistent set of snapshots.
///
/// Only vehicles present in the catalog produce rows: a live or presence
/// node left behind by a deleted vehicle is ignored.
pub fn build_view(
    vehicles: &[Vehicle],
    live: &BTreeMap<String, LivePosition>,
    vehicle_presence: &BTreeMap<String, VehiclePresence>,
    user_presence: &BTreeMap<String, UserPresence>,
    now_ms: i64,
    live_window_ms: i64,
) -> FleetView {
    let mut rows: Vec<StatusRow> = vehicles
        .iter()
        .map(|vehicle| {
            let position = live.get(&vehicle.id).cloned();
            let presence = vehicle_presence.get(&vehicle.id);
            let status = derive_status(position.as_ref(), presence, now_ms, live_window_ms);
            StatusRow {
                vehicle: vehicle.clone(),
                status,
                online: presence.is_some_and(|p| p.online),
                position,
            }
        })
        .collect();
    order_rows(&mut rows);

    let summary = FleetSummary {
        vehicles: rows.len(),
        live: rows
            .iter()
            .filter(|r| r.status == VehicleStatus::Live)
            .count(),
        online: rows.iter().filter(|r| r.online).count(),
        users_online: user_presence.values().filter(|p| p.online).count(),
    };

    FleetView { rows, summary }
}

pub struct Reconciler;

impl Reconciler {
    /// Subscribes to the catalog and live tree and keeps a fleet view
    /// current for the life of the stores. Drop the returned receiver and
    /// abort the task to tear the subscription down.
    pub fn spawn(
        catalog: &Catalog,
        store: &LiveStore,
        live_window_ms: i64,
        tick: Duration,
    ) -> (watch::Receiver<FleetView>, JoinHandle<()>) {
        let mut vehicles = catalog.watch_vehicles();
        let mut live = store.watch_live();
        let mut vehicle_presence = store.watch_vehicle_presence();
        let mut user_presence = store.watch_user_presence();
        let (out, rx) = watch::channel(FleetView::default());

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                let view = build_view(
                    &vehicles.borrow_and_update(),
                    &live.borrow_and_update(),
                    &vehicle_presence.borrow_and_update(),
                    &user_presence.borrow_and_update(),
                    now_ms(),
                    live_window_ms,
                );
                out.send_replace(view);

                tokio::select! {
                    _ = ticker.tick() => {}
                    res = vehicles.changed() => { if res.is_err() { break } }
                    res = live.changed() => { if res.is_err() { break } }
                    res = vehicle_presence.changed() => { if res.is_err() { break } }
                    res = user_presence.changed() => { if res.is_err() { break } }
                }
            }
            // Consumers keep the last published view.
            debug!("fleet inputs closed; reconciler stopping");
        });

        (rx, handle)
    }
}
