//! Presence Publisher: keeps the online/offline flag accurate across
//! connection epochs, resilient to ungraceful disconnects.
//!
//! On every transition to connected the publisher writes `online: true` and
//! then registers the offline write as a disconnect hook. Hooks do not
//! persist across a reconnect, so the whole sequence re-runs each epoch.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::Result;
use crate::models::{now_ms, UserPresence, VehiclePresence};
use crate::store::LiveSession;

/// Maintains `presence/vehicles/{vehicleId}` for a driver session.
pub struct VehiclePresencePublisher {
    session: Arc<LiveSession>,
    vehicle_id: String,
    driver_uid: String,
}

impl VehiclePresencePublisher {
    pub fn new(
        session: Arc<LiveSession>,
        vehicle_id: impl Into<String>,
        driver_uid: impl Into<String>,
    ) -> Self {
        Self {
            session,
            vehicle_id: vehicle_id.into(),
            driver_uid: driver_uid.into(),
        }
    }

    /// Announces online state and arms the disconnect-triggered offline
    /// write. The hook is applied by the store itself, independent of any
    /// further client code.
    pub async fn go_online(&self) -> Result<()> {
        let now = now_ms();
        self.session
            .set_vehicle_presence(
                &self.vehicle_id,
                VehiclePresence {
                    online: true,
                    last_seen: now,
                    driver_uid: self.driver_uid.clone(),
                },
            )
            .await?;
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
        Ok(())
    }

    /// Refreshes `last_seen` and reasserts online. Foreground/background
    /// transitions call this — only connection loss flips the flag, via the
    /// hook.
    pub async fn heartbeat(&self) -> Result<()> {
        self.session
            .set_vehicle_presence(
                &self.vehicle_id,
                VehiclePresence {
                    online: true,
                    last_seen: now_ms(),
                    driver_uid: self.driver_uid.clone(),
                },
            )
            .await
    }

    /// Follows the connection signal for the life of the session,
    /// re-announcing on every connected transition.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut connected = self.session.watch_connected();
            loop {
                let is_connected = *connected.borrow_and_update();
                if is_connected {
                    if let Err(e) = self.go_online().await {
                        warn!("presence announce failed for {}: {}", self.vehicle_id, e);
                    }
                }
                if connected.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}

/// Maintains `presence/users/{userId}` for an end-user session.
///
/// Unlike vehicles, the user app flips itself offline when backgrounded and
/// back online when foregrounded; the disconnect hook covers abrupt exits.
pub struct UserPresencePublisher {
    session: Arc<LiveSession>,
    uid: String,
}

impl UserPresencePublisher {
    pub fn new(session: Arc<LiveSession>, uid: impl Into<String>) -> Self {
        Self {
            session,
            uid: uid.into(),
        }
    }

    pub async fn go_online(&self) -> Result<()> {
        let now = now_ms();
        self.session
            .set_user_presence(
                &self.uid,
                UserPresence {
                    online: true,
                    last_seen: now,
                },
            )
            .await?;
        self.session
            .on_disconnect_set_user_presence(
                &self.uid,
                UserPresence {
                    online: false,
                    last_seen: now,
                },
            )
            .await?;
        Ok(())
    }

    pub async fn note_foreground(&self) -> Result<()> {
        self.go_online().await
    }

    pub async fn note_background(&self) -> Result<()> {
        self.session
            .set_user_presence(
                &self.uid,
                UserPresence {
                    online: false,
                    last_seen: now_ms(),
                },
            )
            .await
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut connected = self.session.watch_connected();
            loop {
                let is_connected = *connected.borrow_and_update();
                if is_connected {
                    if let Err(e) = self.go_online().await {
                        warn!("presence announce failed for user {}: {}", self.uid, e);
                    }
                }
                if connected.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}
