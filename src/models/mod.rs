pub mod alert;
pub mod live;
pub mod message;
pub mod vehicle;

pub use alert::{AlertDoc, AlertKind, AlertStatus};
pub use live::{LivePosition, UserPresence, VehiclePresence};
pub use message::{Message, TargetType};
pub use vehicle::{Role, Route, UserDoc, Vehicle};

/// Client clock, ms since epoch. All live-tree timestamps use this.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
