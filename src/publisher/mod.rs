pub mod location;
pub mod position;
pub mod presence;

pub use location::{displacement_m, LocationFix, LocationSource, ScriptedLocationSource};
pub use position::PositionPublisher;
pub use presence::{UserPresencePublisher, VehiclePresencePublisher};
