//! Embedded document store: vehicles, routes, users, messages and alerts,
//! with filtered, ordered, bounded subscriptions.
//!
//! Subscriptions deliver whole-result snapshots on every commit. Message
//! queries mirror the two the clients run: "broadcast" and "my scope",
//! each ordered by descending client timestamp and bounded by a window.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use uuid::Uuid;

use crate::error::{Result, TrackingError};
use crate::models::{
    now_ms, AlertDoc, AlertStatus, Message, Route, TargetType, UserDoc, Vehicle,
};
use crate::store::lock_unpoisoned;

/// One side of the scoped fan-out union a consumer subscribes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageFilter {
    Broadcast,
    Vehicle(String),
    Route(String),
    User(String),
}

impl MessageFilter {
    fn matches(&self, msg: &Message) -> bool {
        match self {
            MessageFilter::Broadcast => msg.target_type == TargetType::All,
            MessageFilter::Vehicle(id) => {
                msg.target_type == TargetType::Vehicle && msg.vehicle_id.as_deref() == Some(id)
            }
            MessageFilter::Route(id) => {
                msg.target_type == TargetType::Route && msg.route_id.as_deref() == Some(id)
            }
            MessageFilter::User(uid) => {
                msg.target_type == TargetType::User && msg.user_id.as_deref() == Some(uid)
            }
        }
    }
}

struct MessageQuery {
    filter: MessageFilter,
    limit: usize,
    tx: watch::Sender<Vec<Message>>,
}

#[derive(Default)]
struct CatalogState {
    vehicles: BTreeMap<String, Vehicle>,
    routes: BTreeMap<String, Route>,
    users: BTreeMap<String, UserDoc>,
    messages: BTreeMap<String, Message>,
    alerts: BTreeMap<String, AlertDoc>,
    message_queries: Vec<MessageQuery>,
}

struct Shared {
    state: Mutex<CatalogState>,
    vehicles_tx: watch::Sender<Vec<Vehicle>>,
    alerts_tx: watch::Sender<Vec<AlertDoc>>,
}

#[derive(Clone)]
pub struct Catalog {
    shared: Arc<Shared>,
}

impl Catalog {
    pub fn new() -> Self {
        let (vehicles_tx, _) = watch::channel(Vec::new());
        let (alerts_tx, _) = watch::channel(Vec::new());
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(CatalogState::default()),
                vehicles_tx,
                alerts_tx,
            }),
        }
    }

    // ---- vehicles ----

    pub async fn create_vehicle(&self, vehicle: Vehicle) -> Result<()> {
        let mut state = lock_unpoisoned(&self.shared.state);
        if state.vehicles.contains_key(&vehicle.id) {
            return Err(TrackingError::VehicleExists(vehicle.id));
        }
        state.vehicles.insert(vehicle.id.clone(), vehicle);
        self.notify_vehicles(&state);
        Ok(())
    }

    pub async fn upsert_vehicle(&self, vehicle: Vehicle) {
        let mut state = lock_unpoisoned(&self.shared.state);
        state.vehicles.insert(vehicle.id.clone(), vehicle);
        self.notify_vehicles(&state);
    }

    pub async fn get_vehicle(&self, id: &str) -> Option<Vehicle> {
        lock_unpoisoned(&self.shared.state).vehicles.get(id).cloned()
    }

    pub async fn remove_vehicle(&self, id: &str) -> Result<()> {
        let mut state = lock_unpoisoned(&self.shared.state);
        if state.vehicles.remove(id).is_none() {
            return Err(TrackingError::NotFound("vehicle"));
        }
        self.notify_vehicles(&state);
        Ok(())
    }

    /// Merge-update on route selection: the vehicle follows the driver's
    /// chosen route and is marked active.
    pub async fn set_vehicle_route(&self, id: &str, route_id: &str) -> Result<()> {
        let mut state = lock_unpoisoned(&self.shared.state);
        let vehicle = state
            .vehicles
            .get_mut(id)
            .ok_or(TrackingError::NotFound("vehicle"))?;
        vehicle.route_id = Some(route_id.to_string());
        vehicle.active = true;
        self.notify_vehicles(&state);
        Ok(())
    }

    /// Snapshot stream of all vehicles, newest first.
    pub fn watch_vehicles(&self) -> watch::Receiver<Vec<Vehicle>> {
        self.shared.vehicles_tx.subscribe()
    }

    // ---- routes ----

    pub async fn upsert_route(&self, route: Route) {
        let mut state = lock_unpoisoned(&self.shared.state);
        state.routes.insert(route.id.clone(), route);
    }

    pub async fn get_route(&self, id: &str) -> Option<Route> {
        lock_unpoisoned(&self.shared.state).routes.get(id).cloned()
    }

    pub async fn list_routes(&self) -> Vec<Route> {
        lock_unpoisoned(&self.shared.state)
            .routes
            .values()
            .cloned()
            .collect()
    }

    pub async fn set_route_active_vehicle(&self, route_id: &str, vehicle_id: &str) -> Result<()> {
        let mut state = lock_unpoisoned(&self.shared.state);
        let route = state
            .routes
            .get_mut(route_id)
            .ok_or(TrackingError::NotFound("route"))?;
        route.active_vehicle_id = Some(vehicle_id.to_string());
        Ok(())
    }

    // ---- users ----

    pub async fn upsert_user(&self, user: UserDoc) {
        let mut state = lock_unpoisoned(&self.shared.state);
        state.users.insert(user.uid.clone(), user);
    }

    pub async fn get_user(&self, uid: &str) -> Option<UserDoc> {
        lock_unpoisoned(&self.shared.state).users.get(uid).cloned()
    }

    pub async fn set_user_assignment(
        &self,
        uid: &str,
        vehicle_id: Option<String>,
        route_id: Option<String>,
    ) -> Result<()> {
        let mut state = lock_unpoisoned(&self.shared.state);
        let user = state
            .users
            .get_mut(uid)
            .ok_or(TrackingError::NotFound("user"))?;
        if vehicle_id.is_some() {
            user.vehicle_id = vehicle_id;
        }
        if route_id.is_some() {
            user.route_id = route_id;
        }
        Ok(())
    }

    // ---- messages ----

    /// Commits a message draft: assigns the document id and the
    /// server-resolved `created_at`, then fans out to matching queries.
    pub async fn send_message(&self, mut draft: Message) -> Message {
        draft.id = Uuid::new_v4().to_string();
        draft.created_at = Some(now_ms());
        let mut state = lock_unpoisoned(&self.shared.state);
        state.messages.insert(draft.id.clone(), draft.clone());
        notify_message_queries(&mut state);
        draft
    }

    /// Set-union add of `uid` into the message's read-by set. Re-applying is
    /// a no-op.
    pub async fn mark_read(&self, message_id: &str, uid: &str) -> Result<()> {
        let mut state = lock_unpoisoned(&self.shared.state);
        let msg = state
            .messages
            .get_mut(message_id)
            .ok_or(TrackingError::NotFound("message"))?;
        if !msg.is_read_by(uid) {
            msg.read_by.push(uid.to_string());
            notify_message_queries(&mut state);
        }
        Ok(())
    }

    pub async fn query_messages(&self, filter: &MessageFilter, limit: usize) -> Vec<Message> {
        let state = lock_unpoisoned(&self.shared.state);
        run_message_query(&state, filter, limit)
    }

    pub async fn subscribe_messages(
        &self,
        filter: MessageFilter,
        limit: usize,
    ) -> watch::Receiver<Vec<Message>> {
        let mut state = lock_unpoisoned(&self.shared.state);
        let snapshot = run_message_query(&state, &filter, limit);
        let (tx, rx) = watch::channel(snapshot);
        state.message_queries.push(MessageQuery { filter, limit, tx });
        rx
    }

    // ---- alerts ----

    pub async fn report_alert(&self, mut draft: AlertDoc) -> AlertDoc {
        draft.id = Uuid::new_v4().to_string();
        let mut state = lock_unpoisoned(&self.shared.state);
        state.alerts.insert(draft.id.clone(), draft.clone());
        self.notify_alerts(&state);
        draft
    }

    /// Forward-only status escalation; a backward transition is ignored.
    pub async fn set_alert_status(&self, id: &str, status: AlertStatus) -> Result<()> {
        let mut state = lock_unpoisoned(&self.shared.state);
        let alert = state
            .alerts
            .get_mut(id)
            .ok_or(TrackingError::NotFound("alert"))?;
        if status.rank() <= alert.status.rank() {
            return Ok(());
        }
        alert.status = status;
        if status == AlertStatus::Resolved {
            alert.resolved_at_ms = Some(now_ms());
        }
        self.notify_alerts(&state);
        Ok(())
    }

    /// Snapshot stream of all alerts, newest first.
    pub fn watch_alerts(&self) -> watch::Receiver<Vec<AlertDoc>> {
        self.shared.alerts_tx.subscribe()
    }

    fn notify_vehicles(&self, state: &CatalogState) {
        let mut list: Vec<Vehicle> = state.vehicles.values().cloned().collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.shared.vehicles_tx.send_replace(list);
    }

    fn notify_alerts(&self, state: &CatalogState) {
        let mut list: Vec<AlertDoc> = state.alerts.values().cloned().collect();
        list.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
        self.shared.alerts_tx.send_replace(list);
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

fn notify_message_queries(state: &mut CatalogState) {
    state.message_queries.retain(|q| !q.tx.is_closed());
    let shapes: Vec<(MessageFilter, usize)> = state
        .message_queries
        .iter()
        .map(|q| (q.filter.clone(), q.limit))
        .collect();
    let snapshots: Vec<Vec<Message>> = shapes
        .iter()
        .map(|(filter, limit)| run_message_query(state, filter, *limit))
        .collect();
    for (query, snapshot) in state.message_queries.iter().zip(snapshots) {
        query.tx.send_replace(snapshot);
    }
}

fn run_message_query(state: &CatalogState, filter: &MessageFilter, limit: usize) -> Vec<Message> {
    let mut list: Vec<Message> = state
        .messages
        .values()
        .filter(|m| filter.matches(m))
        .cloned()
        .collect();
    list.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms).then(a.id.cmp(&b.id)));
    list.truncate(limit);
    list
}
