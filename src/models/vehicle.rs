use serde::{Deserialize, Serialize};

/// Catalog document `vehicles/{id}`.
///
/// The id is human-assigned (e.g. "V2") and doubles as the live-tree key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub id: String,
    pub nickname: String,
    pub route_id: Option<String>,
    pub description: String,
    pub active: bool,
    /// Client clock, ms since epoch.
    pub created_at: i64,
    pub driver_uid: String,
    pub driver_email: String,
}

/// Catalog document `routes/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub id: String,
    pub name: String,
    pub description: String,
    pub active_vehicle_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Driver,
    User,
}

/// Catalog document `users/{uid}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDoc {
    pub uid: String,
    pub role: Role,
    pub name: Option<String>,
    pub email: String,
    pub vehicle_id: Option<String>,
    pub route_id: Option<String>,
    pub photo_url: Option<String>,
    pub created_at: i64,
}
