//! In-memory collaborators for unit tests.
use crate::error::{Collaborator, LockError};
use crate::inventory::{Inventory, Publisher};
use crate::knife::Resolver;
use crate::model::{Appliance, ApplianceEntry, Environment, Package, Payload};
use crate::store::EnvironmentStore;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub fn package(name: &str, version: &str, command: &str) -> Package {
    Package {
        name: name.to_string(),
        version: version.to_string(),
        command: command.to_string(),
        os: "linux".to_string(),
        metadata: Payload::new(),
    }
}

#[derive(Default)]
pub struct FakeInventory {
    pub appliances: BTreeMap<String, Appliance>,
    pub packages: BTreeMap<String, Package>,
    pub listing: Vec<ApplianceEntry>,
    pub package_reads: RefCell<Vec<String>>,
    pub appliance_reads: RefCell<Vec<String>>,
}

impl FakeInventory {
    pub fn with_package(mut self, reference: &str, package: Package) -> Self {
        self.packages.insert(reference.to_string(), package);
        self
    }

    pub fn with_appliance(mut self, appliance: Appliance) -> Self {
        self.listing.push(ApplianceEntry {
            name: appliance.name.clone(),
            version: appliance.version.clone(),
            locator: format!("/appliances/{}", appliance.reference()),
        });
        self.appliances.insert(appliance.reference(), appliance);
        self
    }
}

fn not_found(call: String) -> LockError {
    LockError::unreachable(Collaborator::Inventory, call, "404 Not Found")
}

impl Inventory for FakeInventory {
    fn appliance(&self, reference: &str) -> Result<Appliance, LockError> {
        self.appliance_reads.borrow_mut().push(reference.to_string());
        self.appliances
            .get(reference)
            .cloned()
            .ok_or_else(|| not_found(format!("GET appliances/{reference}")))
    }

    fn package(&self, reference: &str) -> Result<Package, LockError> {
        self.package_reads.borrow_mut().push(reference.to_string());
        self.packages
            .get(reference)
            .cloned()
            .ok_or_else(|| not_found(format!("GET packages/{reference}")))
    }

    fn appliances(&self) -> Result<Vec<ApplianceEntry>, LockError> {
        Ok(self.listing.clone())
    }
}

/// Resolver answering from canned listings keyed by run-list.
#[derive(Default)]
pub struct FakeResolver {
    pub listings: BTreeMap<String, String>,
    pub environments: BTreeMap<String, Environment>,
    pub solves: RefCell<Vec<(String, Option<String>)>>,
}

impl FakeResolver {
    pub fn with_listing(mut self, run_list: &str, cookbooks: &[(&str, &str)]) -> Self {
        let mut listing = String::from("Solving run list...\n");
        for (name, version) in cookbooks {
            listing.push_str(&format!("{name} {version}\n"));
        }
        listing.push_str("Done.\n");
        self.listings.insert(run_list.to_string(), listing);
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environments
            .insert(environment.name.clone(), environment);
        self
    }
}

impl Resolver for FakeResolver {
    fn solve(&self, run_list: &str, environment: Option<&str>) -> Result<String, LockError> {
        self.solves
            .borrow_mut()
            .push((run_list.to_string(), environment.map(str::to_string)));
        self.listings.get(run_list).cloned().ok_or_else(|| {
            LockError::unreachable(
                Collaborator::Resolver,
                format!("knife solve {run_list}"),
                "no such role",
            )
        })
    }

    fn environment(&self, name: &str) -> Result<Environment, LockError> {
        self.environments.get(name).cloned().ok_or_else(|| {
            LockError::unreachable(
                Collaborator::Resolver,
                format!("knife environment show {name}"),
                "environment not found",
            )
        })
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub writes: Vec<Environment>,
}

impl EnvironmentStore for MemoryStore {
    fn write_environment(&mut self, environment: &Environment) -> Result<PathBuf, LockError> {
        self.writes.push(environment.clone());
        Ok(PathBuf::from(format!("{}.json", environment.name)))
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    pub published: RefCell<Vec<String>>,
}

impl Publisher for RecordingPublisher {
    fn publish_package(&self, package: &Package) -> Result<(), LockError> {
        self.published
            .borrow_mut()
            .push(format!("package:{}", package.reference()));
        Ok(())
    }

    fn publish_appliance(&self, appliance: &Appliance) -> Result<(), LockError> {
        self.published
            .borrow_mut()
            .push(format!("appliance:{}", appliance.reference()));
        Ok(())
    }
}
