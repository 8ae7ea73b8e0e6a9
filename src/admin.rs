//! Provisioning and assignment flows over the catalog: creating a driver
//! identity together with its lorry, driver route selection, and vehicle
//! removal.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Result, TrackingError};
use crate::models::{now_ms, Role, UserDoc, Vehicle};
use crate::store::{lock_unpoisoned, Catalog, LiveStore};

/// Identity-provider seam. Only account creation and deletion are needed;
/// sign-in itself stays with the provider.
#[async_trait]
pub trait Identity: Send + Sync {
    /// Returns the new account's uid.
    async fn create_user(&self, email: &str, password: &str) -> Result<String>;
    async fn delete_user(&self, uid: &str) -> Result<()>;
}

/// In-memory provider for tests and the simulator.
#[derive(Default)]
pub struct InMemoryIdentity {
    accounts: Mutex<HashMap<String, String>>,
}

impl InMemoryIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account_count(&self) -> usize {
        lock_unpoisoned(&self.accounts).len()
    }
}

#[async_trait]
impl Identity for InMemoryIdentity {
    async fn create_user(&self, email: &str, _password: &str) -> Result<String> {
        let mut accounts = lock_unpoisoned(&self.accounts);
        if accounts.values().any(|e| e == email) {
            return Err(TrackingError::Identity(format!(
                "email {email} already in use"
            )));
        }
        let uid = Uuid::new_v4().to_string();
        accounts.insert(uid.clone(), email.to_string());
        Ok(uid)
    }

    async fn delete_user(&self, uid: &str) -> Result<()> {
        lock_unpoisoned(&self.accounts)
            .remove(uid)
            .map(|_| ())
            .ok_or_else(|| TrackingError::Identity(format!("unknown uid {uid}")))
    }
}

/// A new lorry plus its driver account, as entered in the create form.
#[derive(Debug, Clone)]
pub struct NewLorry {
    pub vehicle_id: String,
    pub nickname: String,
    pub route_id: String,
    pub description: String,
    pub driver_email: String,
    pub driver_password: String,
}

pub struct Admin {
    catalog: Catalog,
    live: LiveStore,
    identity: Arc<dyn Identity>,
}

impl Admin {
    pub fn new(catalog: Catalog, live: LiveStore, identity: Arc<dyn Identity>) -> Self {
        Self {
            catalog,
            live,
            identity,
        }
    }

    /// Creates the driver identity, then the vehicle and driver documents.
    ///
    /// A catalog failure after the identity exists triggers a best-effort
    /// rollback of the just-created identity; a rollback failure is
    /// swallowed — there is no further recovery action available.
    pub async fn create_lorry_account(&self, req: NewLorry) -> Result<Vehicle> {
        let vehicle_id = req.vehicle_id.trim().to_uppercase();
        let route_id = req.route_id.trim().to_uppercase();
        let email = req.driver_email.trim().to_lowercase();
        let password = req.driver_password.trim();

        if vehicle_id.is_empty() {
            return Err(TrackingError::EmptyField("vehicle id"));
        }
        if route_id.is_empty() {
            return Err(TrackingError::EmptyField("route id"));
        }
        if email.is_empty() {
            return Err(TrackingError::EmptyField("driver email"));
        }
        if password.len() < 6 {
            return Err(TrackingError::PasswordTooShort);
        }

        let driver_uid = self.identity.create_user(&email, password).await?;

        let nickname = match req.nickname.trim() {
            "" => vehicle_id.clone(),
            n => n.to_string(),
        };
        let now = now_ms();
        let vehicle = Vehicle {
            id: vehicle_id,
            nickname,
            route_id: Some(route_id.clone()),
            description: req.description.trim().to_string(),
            active: true,
            created_at: now,
            driver_uid: driver_uid.clone(),
            driver_email: email.clone(),
        };

        if let Err(e) = self
            .write_lorry_docs(&vehicle, &driver_uid, &email, &route_id, now)
            .await
        {
            if let Err(rollback) = self.identity.delete_user(&driver_uid).await {
                warn!("identity rollback failed for {}: {}", email, rollback);
            }
            return Err(e);
        }

        info!("provisioned lorry {} for driver {}", vehicle.id, email);
        Ok(vehicle)
    }

    async fn write_lorry_docs(
        &self,
        vehicle: &Vehicle,
        driver_uid: &str,
        email: &str,
        route_id: &str,
        now: i64,
    ) -> Result<()> {
        self.catalog.create_vehicle(vehicle.clone()).await?;
        self.catalog
            .upsert_user(UserDoc {
                uid: driver_uid.to_string(),
                role: Role::Driver,
                name: None,
                email: email.to_string(),
                vehicle_id: Some(vehicle.id.clone()),
                route_id: Some(route_id.to_string()),
                photo_url: None,
                created_at: now,
            })
            .await;
        Ok(())
    }

    /// Driver route selection: the driver's user doc, the vehicle and the
    /// route all follow the choice.
    pub async fn select_route(&self, driver_uid: &str, route_id: &str) -> Result<()> {
        let user = self
            .catalog
            .get_user(driver_uid)
            .await
            .ok_or(TrackingError::NotFound("user"))?;
        let vehicle_id = user.vehicle_id.ok_or(TrackingError::NotFound("vehicle"))?;
        self.catalog
            .get_route(route_id)
            .await
            .ok_or(TrackingError::NotFound("route"))?;

        self.catalog
            .set_user_assignment(
                driver_uid,
                Some(vehicle_id.clone()),
                Some(route_id.to_string()),
            )
            .await?;
        self.catalog.set_vehicle_route(&vehicle_id, route_id).await?;
        self.catalog
            .set_route_active_vehicle(route_id, &vehicle_id)
            .await?;
        Ok(())
    }

    /// Removes the vehicle from the catalog and clears its live-tree nodes,
    /// so a deleted vehicle cannot keep publishing a status.
    pub async fn remove_vehicle(&self, vehicle_id: &str) -> Result<()> {
        self.catalog.remove_vehicle(vehicle_id).await?;
        self.live.clear_vehicle(vehicle_id);
        info!("removed vehicle {}", vehicle_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LivePosition;

    fn new_lorry(vehicle_id: &str, email: &str) -> NewLorry {
        NewLorry {
            vehicle_id: vehicle_id.to_string(),
            nickname: String::new(),
            route_id: "r1".to_string(),
            description: "Hill route lorry".to_string(),
            driver_email: email.to_string(),
            driver_password: "secret9".to_string(),
        }
    }

    fn admin() -> (Admin, Catalog, LiveStore, Arc<InMemoryIdentity>) {
        let catalog = Catalog::new();
        let live = LiveStore::new();
        let identity = Arc::new(InMemoryIdentity::new());
        let admin = Admin::new(catalog.clone(), live.clone(), identity.clone());
        (admin, catalog, live, identity)
    }

    #[tokio::test]
    async fn provisioning_creates_vehicle_and_driver_doc() {
        let (admin, catalog, _live, identity) = admin();

        let vehicle = admin
            .create_lorry_account(new_lorry(" v2 ", "Driver@Tea.LK"))
            .await
            .unwrap();

        assert_eq!(vehicle.id, "V2");
        assert_eq!(vehicle.nickname, "V2");
        assert_eq!(vehicle.route_id.as_deref(), Some("R1"));
        assert_eq!(vehicle.driver_email, "driver@tea.lk");
        assert!(vehicle.active);

        let driver = catalog.get_user(&vehicle.driver_uid).await.unwrap();
        assert_eq!(driver.role, Role::Driver);
        assert_eq!(driver.vehicle_id.as_deref(), Some("V2"));
        assert_eq!(driver.route_id.as_deref(), Some("R1"));
        assert_eq!(identity.account_count(), 1);
    }

    #[tokio::test]
    async fn short_password_is_rejected_before_any_write() {
        let (admin, catalog, _live, identity) = admin();
        let mut req = new_lorry("V2", "d@tea.lk");
        req.driver_password = "abc".to_string();

        let err = admin.create_lorry_account(req).await.unwrap_err();
        assert!(matches!(err, TrackingError::PasswordTooShort));
        assert_eq!(identity.account_count(), 0);
        assert!(catalog.get_vehicle("V2").await.is_none());
    }

    #[tokio::test]
    async fn duplicate_vehicle_rolls_back_the_identity() {
        let (admin, _catalog, _live, identity) = admin();

        admin
            .create_lorry_account(new_lorry("V2", "first@tea.lk"))
            .await
            .unwrap();
        let err = admin
            .create_lorry_account(new_lorry("V2", "second@tea.lk"))
            .await
            .unwrap_err();

        assert!(matches!(err, TrackingError::VehicleExists(_)));
        // The second identity was deleted again.
        assert_eq!(identity.account_count(), 1);
    }

    #[tokio::test]
    async fn duplicate_email_fails_without_touching_the_catalog() {
        let (admin, catalog, _live, _identity) = admin();

        admin
            .create_lorry_account(new_lorry("V1", "same@tea.lk"))
            .await
            .unwrap();
        let err = admin
            .create_lorry_account(new_lorry("V2", "same@tea.lk"))
            .await
            .unwrap_err();

        assert!(matches!(err, TrackingError::Identity(_)));
        assert!(catalog.get_vehicle("V2").await.is_none());
    }

    #[tokio::test]
    async fn select_route_updates_user_vehicle_and_route() {
        let (admin, catalog, _live, _identity) = admin();
        catalog
            .upsert_route(crate::models::Route {
                id: "R2".to_string(),
                name: "Low country".to_string(),
                description: String::new(),
                active_vehicle_id: None,
            })
            .await;
        let vehicle = admin
            .create_lorry_account(new_lorry("V1", "d@tea.lk"))
            .await
            .unwrap();

        admin.select_route(&vehicle.driver_uid, "R2").await.unwrap();

        let user = catalog.get_user(&vehicle.driver_uid).await.unwrap();
        assert_eq!(user.route_id.as_deref(), Some("R2"));
        let stored = catalog.get_vehicle("V1").await.unwrap();
        assert_eq!(stored.route_id.as_deref(), Some("R2"));
        let route = catalog.get_route("R2").await.unwrap();
        assert_eq!(route.active_vehicle_id.as_deref(), Some("V1"));
    }

    #[tokio::test]
    async fn remove_vehicle_clears_live_nodes() {
        let (admin, _catalog, live, _identity) = admin();
        let vehicle = admin
            .create_lorry_account(new_lorry("V1", "d@tea.lk"))
            .await
            .unwrap();

        let session = live.connect();
        session
            .set_live(
                "V1",
                LivePosition {
                    lat: 6.9,
                    lng: 79.8,
                    speed: 10.0,
                    updated_at: now_ms(),
                    driver_uid: vehicle.driver_uid.clone(),
                    route_id: "R1".to_string(),
                },
            )
            .await
            .unwrap();

        admin.remove_vehicle("V1").await.unwrap();

        assert!(live.watch_live().borrow().is_empty());
    }
}
