use serde::{Deserialize, Serialize};

/// Live-tree node `live/{vehicleId}`.
///
/// Presence of this node means a driver client believes it is actively
/// sharing; absence means not sharing (which is not the same as offline).
/// Overwritten wholesale on every sample, removed on stop or disconnect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LivePosition {
    pub lat: f64,
    pub lng: f64,
    /// Instantaneous speed, km/h.
    pub speed: f64,
    /// Client clock, ms since epoch.
    pub updated_at: i64,
    pub driver_uid: String,
    pub route_id: String,
}

/// Live-tree node `presence/vehicles/{vehicleId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehiclePresence {
    pub online: bool,
    /// Client clock, ms since epoch.
    pub last_seen: i64,
    pub driver_uid: String,
}

/// Live-tree node `presence/users/{userId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPresence {
    pub online: bool,
    pub last_seen: i64,
}
