use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use tea_tracking::admin::{Admin, InMemoryIdentity, NewLorry};
use tea_tracking::config::AppConfig;
use tea_tracking::models::{now_ms, AlertKind, AlertStatus, Message, Route};
use tea_tracking::publisher::{
    LocationFix, PositionPublisher, ScriptedLocationSource, VehiclePresencePublisher,
};
use tea_tracking::reconciler::{Reconciler, VehicleStatus};
use tea_tracking::relay::{self, spawn_inbox};
use tea_tracking::store::{Catalog, LiveStore, MessageFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load config
    let config = AppConfig::load()?;

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .init();

    info!("Starting Tea Tracking core (embedded stores)...");

    // Stores at the backend boundary
    let catalog = Catalog::new();
    let live = LiveStore::new();
    let identity = Arc::new(InMemoryIdentity::new());
    let admin = Admin::new(catalog.clone(), live.clone(), identity.clone());

    // Smoke-run every protocol path against the embedded stores.
    catalog
        .upsert_route(Route {
            id: "R1".to_string(),
            name: "Hill country".to_string(),
            description: "Kandy - Nuwara Eliya".to_string(),
            active_vehicle_id: None,
        })
        .await;

    let vehicle = admin
        .create_lorry_account(NewLorry {
            vehicle_id: "V1".to_string(),
            nickname: "Hill lorry".to_string(),
            route_id: "R1".to_string(),
            description: "Morning run".to_string(),
            driver_email: "driver1@tea.lk".to_string(),
            driver_password: "secret9".to_string(),
        })
        .await?;

    // Admin view: reconciled fleet status
    let (mut fleet, reconciler_task) = Reconciler::spawn(
        &catalog,
        &live,
        config.live_window_ms,
        Duration::from_millis(config.reconcile_tick_ms.min(500)),
    );

    // Driver session: presence + position publishing
    let session = Arc::new(live.connect());
    let presence_task = VehiclePresencePublisher::new(
        session.clone(),
        vehicle.id.clone(),
        vehicle.driver_uid.clone(),
    )
    .spawn();

    let source = Arc::new(ScriptedLocationSource::new(true));
    let publisher = PositionPublisher::new(
        session.clone(),
        source.clone(),
        vehicle.id.clone(),
        vehicle.driver_uid.clone(),
        Duration::from_millis(config.sample_interval_ms),
        config.min_displacement_m,
    );
    publisher.start_sharing(vehicle.route_id.as_deref()).await?;

    // Drive a few fixes along the A5; each step clears the displacement gate.
    for step in 0..4 {
        source.push(LocationFix {
            lat: 7.2906 + f64::from(step) * 0.0005,
            lng: 80.6337,
            speed: 38.0,
        });
        tokio::time::sleep(Duration::from_millis(150)).await;
    }

    wait_for_status(&mut fleet, &vehicle.id, VehicleStatus::Live).await;
    info!("admin sees {} LIVE", vehicle.id);

    // Messaging: broadcast + vehicle-scoped fan-out into the driver inbox
    let (inbox, inbox_task) = spawn_inbox(
        &catalog,
        MessageFilter::Vehicle(vehicle.id.clone()),
        config.message_window,
    )
    .await;

    catalog
        .send_message(Message::broadcast(
            Some("Depot notice".to_string()),
            "Weighbridge closed until 10am",
            now_ms(),
        ))
        .await;
    let direct = catalog
        .send_message(Message::to_vehicle(
            vehicle.id.clone(),
            None,
            "Pick up the Galaha crates first",
            now_ms(),
        ))
        .await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    let snapshot = inbox.borrow().clone();
    info!(
        "driver inbox: {} messages, {} unread",
        snapshot.len(),
        relay::unread_count(&snapshot, &vehicle.driver_uid)
    );
    catalog.mark_read(&direct.id, &vehicle.driver_uid).await?;

    // Alerts: driver reports, admin triages
    let driver = catalog
        .get_user(&vehicle.driver_uid)
        .await
        .ok_or_else(|| anyhow::anyhow!("driver doc missing"))?;
    let alert = relay::send_quick_alert(
        &catalog,
        &driver,
        AlertKind::Delay,
        "Landslide cleanup near Pussellawa",
    )
    .await?;
    info!("alert filed: {}", serde_json::to_string(&alert)?);
    catalog.set_alert_status(&alert.id, AlertStatus::Seen).await?;
    catalog
        .set_alert_status(&alert.id, AlertStatus::Resolved)
        .await?;

    // Voluntary stop: live node goes away now, presence stays online
    publisher.stop_sharing().await;
    wait_for_status(&mut fleet, &vehicle.id, VehicleStatus::Online).await;
    info!("admin sees {} ONLINE after stop", vehicle.id);

    // Connection loss: the disconnect hooks converge the vehicle to offline
    session.disconnect();
    wait_for_status(&mut fleet, &vehicle.id, VehicleStatus::Offline).await;
    info!("admin sees {} OFFLINE after disconnect", vehicle.id);

    inbox_task.abort();
    presence_task.abort();
    reconciler_task.abort();
    info!("done");
    Ok(())
}

async fn wait_for_status(
    fleet: &mut tokio::sync::watch::Receiver<tea_tracking::reconciler::FleetView>,
    vehicle_id: &str,
    want: VehicleStatus,
) {
    loop {
        {
            let view = fleet.borrow_and_update();
            if view
                .rows
                .iter()
                .any(|r| r.vehicle.id == vehicle_id && r.status == want)
            {
                return;
            }
        }
        if fleet.changed().await.is_err() {
            return;
        }
    }
}
