//! Embedded realtime tree: ephemeral per-vehicle position and presence nodes
//! with whole-subtree subscriptions and disconnect-triggered writes.
//!
//! Paths mirror the backend layout: `live/{vehicleId}`,
//! `presence/vehicles/{vehicleId}`, `presence/users/{userId}`. Writes are
//! unconditional overwrites, last-write-wins; subscriptions deliver the latest
//! subtree snapshot in applied order.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::error::{Result, TrackingError};
use crate::models::{LivePosition, UserPresence, VehiclePresence};
use crate::store::lock_unpoisoned;

/// A write the store applies on the owner's disconnect, with no further
/// client action required.
#[derive(Debug, Clone)]
pub enum DisconnectWrite {
    RemoveLive(String),
    SetVehiclePresence(String, VehiclePresence),
    SetUserPresence(String, UserPresence),
}

impl DisconnectWrite {
    /// One pending write per node: re-registering replaces the previous one.
    fn node_key(&self) -> (u8, &str) {
        match self {
            DisconnectWrite::RemoveLive(id) => (0, id),
            DisconnectWrite::SetVehiclePresence(id, _) => (1, id),
            DisconnectWrite::SetUserPresence(uid, _) => (2, uid),
        }
    }
}

#[derive(Default)]
struct TreeState {
    live: BTreeMap<String, LivePosition>,
    vehicle_presence: BTreeMap<String, VehiclePresence>,
    user_presence: BTreeMap<String, UserPresence>,
}

struct Shared {
    state: Mutex<TreeState>,
    live_tx: watch::Sender<BTreeMap<String, LivePosition>>,
    vehicle_presence_tx: watch::Sender<BTreeMap<String, VehiclePresence>>,
    user_presence_tx: watch::Sender<BTreeMap<String, UserPresence>>,
}

#[derive(Clone)]
pub struct LiveStore {
    shared: Arc<Shared>,
}

impl LiveStore {
    pub fn new() -> Self {
        let (live_tx, _) = watch::channel(BTreeMap::new());
        let (vehicle_presence_tx, _) = watch::channel(BTreeMap::new());
        let (user_presence_tx, _) = watch::channel(BTreeMap::new());
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(TreeState::default()),
                live_tx,
                vehicle_presence_tx,
                user_presence_tx,
            }),
        }
    }

    /// Open a connection epoch. Hooks registered on the returned session fire
    /// when it disconnects, including an ungraceful drop.
    pub fn connect(&self) -> LiveSession {
        let (connected, _) = watch::channel(true);
        LiveSession {
            store: self.clone(),
            connected,
            hooks: Mutex::new(Vec::new()),
        }
    }

    pub fn watch_live(&self) -> watch::Receiver<BTreeMap<String, LivePosition>> {
        self.shared.live_tx.subscribe()
    }

    pub fn watch_vehicle_presence(&self) -> watch::Receiver<BTreeMap<String, VehiclePresence>> {
        self.shared.vehicle_presence_tx.subscribe()
    }

    pub fn watch_user_presence(&self) -> watch::Receiver<BTreeMap<String, UserPresence>> {
        self.shared.user_presence_tx.subscribe()
    }

    /// Removes a vehicle's live and presence nodes. Catalog deletion calls
    /// this so a removed vehicle cannot keep a ghost status.
    pub fn clear_vehicle(&self, vehicle_id: &str) {
        let mut state = lock_unpoisoned(&self.shared.state);
        state.live.remove(vehicle_id);
        state.vehicle_presence.remove(vehicle_id);
        self.shared.live_tx.send_replace(state.live.clone());
        self.shared
            .vehicle_presence_tx
            .send_replace(state.vehicle_presence.clone());
    }

    fn set_live_node(&self, vehicle_id: &str, value: Option<LivePosition>) {
        let mut state = lock_unpoisoned(&self.shared.state);
        match value {
            Some(position) => {
                state.live.insert(vehicle_id.to_string(), position);
            }
            None => {
                state.live.remove(vehicle_id);
            }
        }
        self.shared.live_tx.send_replace(state.live.clone());
    }

    fn set_vehicle_presence_node(&self, vehicle_id: &str, value: VehiclePresence) {
        let mut state = lock_unpoisoned(&self.shared.state);
        state.vehicle_presence.insert(vehicle_id.to_string(), value);
        self.shared
            .vehicle_presence_tx
            .send_replace(state.vehicle_presence.clone());
    }

    fn set_user_presence_node(&self, uid: &str, value: UserPresence) {
        let mut state = lock_unpoisoned(&self.shared.state);
        state.user_presence.insert(uid.to_string(), value);
        self.shared
            .user_presence_tx
            .send_replace(state.user_presence.clone());
    }

    fn apply(&self, write: DisconnectWrite) {
        match write {
            DisconnectWrite::RemoveLive(id) => self.set_live_node(&id, None),
            DisconnectWrite::SetVehiclePresence(id, presence) => {
                self.set_vehicle_presence_node(&id, presence)
            }
            DisconnectWrite::SetUserPresence(uid, presence) => {
                self.set_user_presence_node(&uid, presence)
            }
        }
    }
}

impl Default for LiveStore {
    fn default() -> Self {
        Self::new()
    }
}

/// One client connection to the live tree.
///
/// All writes go through a session so the store knows which connection owns
/// which disconnect hooks. Writes fail while disconnected; hooks do not
/// survive into the next connection epoch and must be re-armed on reconnect.
pub struct LiveSession {
    store: LiveStore,
    connected: watch::Sender<bool>,
    hooks: Mutex<Vec<DisconnectWrite>>,
}

impl LiveSession {
    fn ensure_connected(&self) -> Result<()> {
        if *self.connected.borrow() {
            Ok(())
        } else {
            Err(TrackingError::Store("session disconnected".to_string()))
        }
    }

    pub async fn set_live(&self, vehicle_id: &str, position: LivePosition) -> Result<()> {
        self.ensure_connected()?;
        self.store.set_live_node(vehicle_id, Some(position));
        Ok(())
    }

    pub async fn remove_live(&self, vehicle_id: &str) -> Result<()> {
        self.ensure_connected()?;
        self.store.set_live_node(vehicle_id, None);
        Ok(())
    }

    pub async fn set_vehicle_presence(
        &self,
        vehicle_id: &str,
        presence: VehiclePresence,
    ) -> Result<()> {
        self.ensure_connected()?;
        self.store.set_vehicle_presence_node(vehicle_id, presence);
        Ok(())
    }

    pub async fn set_user_presence(&self, uid: &str, presence: UserPresence) -> Result<()> {
        self.ensure_connected()?;
        self.store.set_user_presence_node(uid, presence);
        Ok(())
    }

    pub async fn on_disconnect_remove_live(&self, vehicle_id: &str) -> Result<()> {
        self.register(DisconnectWrite::RemoveLive(vehicle_id.to_string()))
    }

    pub async fn on_disconnect_set_vehicle_presence(
        &self,
        vehicle_id: &str,
        presence: VehiclePresence,
    ) -> Result<()> {
        self.register(DisconnectWrite::SetVehiclePresence(
            vehicle_id.to_string(),
            presence,
        ))
    }

    pub async fn on_disconnect_set_user_presence(
        &self,
        uid: &str,
        presence: UserPresence,
    ) -> Result<()> {
        self.register(DisconnectWrite::SetUserPresence(uid.to_string(), presence))
    }

    fn register(&self, write: DisconnectWrite) -> Result<()> {
        self.ensure_connected()?;
        let (kind, id) = write.node_key();
        let key = (kind, id.to_string());
        let mut hooks = lock_unpoisoned(&self.hooks);
        hooks.retain(|h| h.node_key() != (key.0, key.1.as_str()));
        hooks.push(write);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Connection-state signal, the `.info/connected` equivalent.
    pub fn watch_connected(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    /// Connection loss: the store applies every registered hook exactly once,
    /// then the session reports disconnected.
    pub fn disconnect(&self) {
        let was_connected = self.connected.send_replace(false);
        if !was_connected {
            return;
        }
        let writes: Vec<DisconnectWrite> = lock_unpoisoned(&self.hooks).drain(..).collect();
        for write in writes {
            self.store.apply(write);
        }
    }

    /// Starts a new connection epoch with no registered hooks.
    pub fn reconnect(&self) {
        self.connected.send_replace(true);
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        let connected = *self.connected.borrow();
        if connected {
            self.disconnect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(updated_at: i64) -> LivePosition {
        LivePosition {
            lat: 6.9271,
            lng: 79.8612,
            speed: 32.0,
            updated_at,
            driver_uid: "d1".to_string(),
            route_id: "R1".to_string(),
        }
    }

    fn presence(online: bool, last_seen: i64) -> VehiclePresence {
        VehiclePresence {
            online,
            last_seen,
            driver_uid: "d1".to_string(),
        }
    }

    #[tokio::test]
    async fn disconnect_applies_registered_hooks() {
        let store = LiveStore::new();
        let session = store.connect();

        session.set_live("V1", position(1_000)).await.unwrap();
        session
            .set_vehicle_presence("V1", presence(true, 1_000))
            .await
            .unwrap();
        session.on_disconnect_remove_live("V1").await.unwrap();
        session
            .on_disconnect_set_vehicle_presence("V1", presence(false, 1_000))
            .await
            .unwrap();

        session.disconnect();

        assert!(store.watch_live().borrow().get("V1").is_none());
        let vp = store.watch_vehicle_presence().borrow().get("V1").cloned();
        assert_eq!(vp.map(|p| p.online), Some(false));
    }

    #[tokio::test]
    async fn rearming_a_hook_replaces_the_previous_one() {
        let store = LiveStore::new();
        let session = store.connect();

        session
            .on_disconnect_set_vehicle_presence("V1", presence(false, 1_000))
            .await
            .unwrap();
        session
            .on_disconnect_set_vehicle_presence("V1", presence(false, 2_000))
            .await
            .unwrap();

        session.disconnect();

        let vp = store.watch_vehicle_presence().borrow().get("V1").cloned();
        assert_eq!(vp.map(|p| p.last_seen), Some(2_000));
    }

    #[tokio::test]
    async fn hooks_do_not_survive_reconnect() {
        let store = LiveStore::new();
        let session = store.connect();

        session
            .on_disconnect_set_vehicle_presence("V1", presence(false, 1_000))
            .await
            .unwrap();
        session.disconnect();
        session.reconnect();

        session
            .set_vehicle_presence("V1", presence(true, 2_000))
            .await
            .unwrap();
        session.disconnect();

        // Nothing was re-armed in the second epoch, so the online write stands.
        let vp = store.watch_vehicle_presence().borrow().get("V1").cloned();
        assert_eq!(vp.map(|p| p.online), Some(true));
    }

    #[tokio::test]
    async fn writes_fail_while_disconnected() {
        let store = LiveStore::new();
        let session = store.connect();
        session.disconnect();

        let err = session.set_live("V1", position(1_000)).await.unwrap_err();
        assert!(matches!(err, TrackingError::Store(_)));
        assert!(store.watch_live().borrow().is_empty());
    }

    #[tokio::test]
    async fn dropping_a_connected_session_fires_hooks() {
        let store = LiveStore::new();
        {
            let session = store.connect();
            session.set_live("V1", position(1_000)).await.unwrap();
            session.on_disconnect_remove_live("V1").await.unwrap();
        }
        assert!(store.watch_live().borrow().is_empty());
    }

    #[tokio::test]
    async fn clear_vehicle_removes_both_nodes() {
        let store = LiveStore::new();
        let session = store.connect();
        session.set_live("V1", position(1_000)).await.unwrap();
        session
            .set_vehicle_presence("V1", presence(true, 1_000))
            .await
            .unwrap();

        store.clear_vehicle("V1");

        assert!(store.watch_live().borrow().is_empty());
        assert!(store.watch_vehicle_presence().borrow().is_empty());
    }
}
