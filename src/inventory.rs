//! AMP inventory collaborator.
//!
//! Reads appliance and package documents over HTTP and, when publication is
//! enabled, posts locked documents back. Consecutive requests are spaced by a
//! fixed delay because the inventory is rate sensitive.
use crate::error::{Collaborator, LockError};
use crate::model::{Appliance, ApplianceEntry, Package};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cell::Cell;
use std::thread;
use std::time::{Duration, Instant};

/// Status the inventory returns for a successful create.
pub const CREATED: u16 = 201;

/// Read side of the inventory.
pub trait Inventory {
    fn appliance(&self, reference: &str) -> Result<Appliance, LockError>;
    fn package(&self, reference: &str) -> Result<Package, LockError>;
    fn appliances(&self) -> Result<Vec<ApplianceEntry>, LockError>;
}

/// Write side of the inventory, used only when publication is enabled.
pub trait Publisher {
    fn publish_package(&self, package: &Package) -> Result<(), LockError>;
    fn publish_appliance(&self, appliance: &Appliance) -> Result<(), LockError>;
}

pub struct HttpInventory {
    base_url: String,
    agent: ureq::Agent,
    throttle: Duration,
    last_request: Cell<Option<Instant>>,
}

impl HttpInventory {
    pub fn new(base_url: &str, timeout: Duration, throttle: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: config.into(),
            throttle,
            last_request: Cell::new(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn pace(&self) {
        if let Some(last) = self.last_request.get() {
            let elapsed = last.elapsed();
            if elapsed < self.throttle {
                thread::sleep(self.throttle - elapsed);
            }
        }
        self.last_request.set(Some(Instant::now()));
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, LockError> {
        let url = self.url(path);
        let call = format!("GET {url}");
        self.pace();
        tracing::debug!(%url, "inventory get");
        let mut response = self
            .agent
            .get(&url)
            .call()
            .map_err(|err| LockError::unreachable(Collaborator::Inventory, call.as_str(), err))?;
        let status = response.status().as_u16();
        if status != 200 {
            return Err(LockError::UnexpectedStatus {
                call,
                status,
                expected: 200,
            });
        }
        response
            .body_mut()
            .read_json::<T>()
            .map_err(|err| LockError::contract("inventory document", err.to_string(), &call))
    }

    fn post_json<T: Serialize>(&self, path: &str, body: &T) -> Result<(), LockError> {
        let url = self.url(path);
        let call = format!("POST {url}");
        self.pace();
        let response = self
            .agent
            .post(&url)
            .send_json(body)
            .map_err(|err| LockError::unreachable(Collaborator::Inventory, call.as_str(), err))?;
        let status = response.status().as_u16();
        if status != CREATED {
            return Err(LockError::UnexpectedStatus {
                call,
                status,
                expected: CREATED,
            });
        }
        tracing::info!(%url, "published");
        Ok(())
    }
}

impl Inventory for HttpInventory {
    fn appliance(&self, reference: &str) -> Result<Appliance, LockError> {
        tracing::info!(appliance = reference, "querying inventory");
        self.get_json(&format!("appliances/{reference}"))
    }

    fn package(&self, reference: &str) -> Result<Package, LockError> {
        tracing::info!(package = reference, "querying inventory");
        self.get_json(&format!("packages/{reference}"))
    }

    fn appliances(&self) -> Result<Vec<ApplianceEntry>, LockError> {
        self.get_json("appliances")
    }
}

impl Publisher for HttpInventory {
    fn publish_package(&self, package: &Package) -> Result<(), LockError> {
        self.post_json("packages", package)
    }

    fn publish_appliance(&self, appliance: &Appliance) -> Result<(), LockError> {
        self.post_json("appliances", appliance)
    }
}
