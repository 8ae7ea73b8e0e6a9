use thiserror::Error;

/// Errors surfaced by the tracking core.
///
/// Precondition failures abort the operation with no partial state change.
/// Transient write failures during sampling never reach the caller; they are
/// logged and retried on the next cycle.
#[derive(Debug, Error)]
pub enum TrackingError {
    /// Sharing was requested before a route was assigned to the driver.
    #[error("no route assigned")]
    NoRouteAssigned,

    /// The device refused the location permission request.
    #[error("location permission denied")]
    PermissionDenied,

    /// A required field was empty after trimming.
    #[error("{0} is required")]
    EmptyField(&'static str),

    /// Driver passwords must be at least 6 characters.
    #[error("password must be at least 6 characters")]
    PasswordTooShort,

    /// Provisioning a vehicle id that is already in the catalog.
    #[error("vehicle {0} already exists")]
    VehicleExists(String),

    /// A referenced document does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The identity provider rejected an account operation.
    #[error("identity provider error: {0}")]
    Identity(String),

    /// A live-tree or catalog write failed (e.g. the session is disconnected).
    #[error("store write failed: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, TrackingError>;
