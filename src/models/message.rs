use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    All,
    Vehicle,
    Route,
    User,
}

/// Catalog document `messages/{id}`.
///
/// Immutable except for `read_by`, which only grows (set-union semantics).
/// `created_at` is server-assigned and resolves asynchronously; ordering
/// always uses the client-assigned `created_at_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default)]
    pub id: String,
    pub target_type: TargetType,
    pub vehicle_id: Option<String>,
    pub route_id: Option<String>,
    pub user_id: Option<String>,
    pub title: Option<String>,
    pub body: String,
    /// Server clock, ms since epoch. None until the write commits.
    pub created_at: Option<i64>,
    /// Client clock, ms since epoch.
    pub created_at_ms: i64,
    #[serde(default)]
    pub read_by: Vec<String>,
}

impl Message {
    fn draft(target_type: TargetType, title: Option<String>, body: String, now_ms: i64) -> Self {
        Self {
            id: String::new(),
            target_type,
            vehicle_id: None,
            route_id: None,
            user_id: None,
            title,
            body,
            created_at: None,
            created_at_ms: now_ms,
            read_by: Vec::new(),
        }
    }

    pub fn broadcast(title: Option<String>, body: impl Into<String>, now_ms: i64) -> Self {
        Self::draft(TargetType::All, title, body.into(), now_ms)
    }

    pub fn to_vehicle(
        vehicle_id: impl Into<String>,
        title: Option<String>,
        body: impl Into<String>,
        now_ms: i64,
    ) -> Self {
        let mut msg = Self::draft(TargetType::Vehicle, title, body.into(), now_ms);
        msg.vehicle_id = Some(vehicle_id.into());
        msg
    }

    pub fn to_route(
        route_id: impl Into<String>,
        title: Option<String>,
        body: impl Into<String>,
        now_ms: i64,
    ) -> Self {
        let mut msg = Self::draft(TargetType::Route, title, body.into(), now_ms);
        msg.route_id = Some(route_id.into());
        msg
    }

    pub fn to_user(
        user_id: impl Into<String>,
        title: Option<String>,
        body: impl Into<String>,
        now_ms: i64,
    ) -> Self {
        let mut msg = Self::draft(TargetType::User, title, body.into(), now_ms);
        msg.user_id = Some(user_id.into());
        msg
    }

    pub fn is_read_by(&self, uid: &str) -> bool {
        self.read_by.iter().any(|u| u == uid)
    }
}
