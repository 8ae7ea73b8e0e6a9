use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Breakdown,
    Delay,
    Emergency,
    Note,
}

/// Forward-only lifecycle: new -> seen -> resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    New,
    Seen,
    Resolved,
}

impl AlertStatus {
    pub fn rank(self) -> u8 {
        match self {
            AlertStatus::New => 0,
            AlertStatus::Seen => 1,
            AlertStatus::Resolved => 2,
        }
    }
}

/// Catalog document `alerts/{id}`. Created by a driver, transitioned by admin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertDoc {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub message: String,
    pub created_at_ms: i64,
    pub driver_uid: String,
    pub vehicle_id: String,
    pub route_id: Option<String>,
    pub status: AlertStatus,
    pub resolved_at_ms: Option<i64>,
}
