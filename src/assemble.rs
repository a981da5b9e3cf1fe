//! Appliance assembly and the top-level run loop.
//!
//! Appliances are processed one at a time in listing order; within an
//! appliance, steps come before app-steps. A locked appliance is emitted only
//! when at least one step or app-step was rewritten.
use crate::error::LockError;
use crate::inventory::{Inventory, Publisher};
use crate::locker::PackageLocker;
use crate::model::{Appliance, Package, LOCKED_VERSION_SUFFIX};
use crate::store::LatestAllowlist;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplianceStatus {
    /// Not on the latest-version allowlist; nothing was fetched.
    Skipped,
    /// Every step passed through; no new version.
    Unchanged,
    Locked,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplianceReport {
    pub reference: String,
    pub status: ApplianceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_reference: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub locked_packages: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub environments: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_appliance: Option<Appliance>,
}

impl ApplianceReport {
    fn without_lock(reference: &str, status: ApplianceStatus) -> Self {
        Self {
            reference: reference.to_string(),
            status,
            locked_reference: None,
            locked_packages: Vec::new(),
            environments: Vec::new(),
            locked_appliance: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub appliances: Vec<ApplianceReport>,
    pub environments_written: usize,
    pub packages_locked: usize,
    pub cache_hits: usize,
}

pub struct Assembler<'a> {
    inventory: &'a dyn Inventory,
    locker: PackageLocker<'a>,
    allowlist: Option<LatestAllowlist>,
    publisher: Option<&'a dyn Publisher>,
}

impl<'a> Assembler<'a> {
    pub fn new(inventory: &'a dyn Inventory, locker: PackageLocker<'a>) -> Self {
        Self {
            inventory,
            locker,
            allowlist: None,
            publisher: None,
        }
    }

    /// Restrict locking to the listed appliance versions.
    pub fn with_allowlist(mut self, allowlist: LatestAllowlist) -> Self {
        self.allowlist = Some(allowlist);
        self
    }

    /// Publish locked packages and appliances back to the inventory.
    pub fn with_publisher(mut self, publisher: &'a dyn Publisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    fn is_eligible(&self, reference: &str) -> bool {
        match &self.allowlist {
            Some(allowlist) => allowlist.contains(reference),
            None => true,
        }
    }

    /// Lock every appliance the inventory lists, in listing order.
    pub fn lock_all(&mut self) -> Result<RunReport, LockError> {
        let entries = self.inventory.appliances()?;
        tracing::info!(appliances = entries.len(), "appliance listing fetched");
        let references: Vec<String> = entries.iter().map(|entry| entry.reference()).collect();
        self.lock_references(&references)
    }

    /// Lock the given appliances, in order, sharing one dedup cache.
    pub fn lock_references(&mut self, references: &[String]) -> Result<RunReport, LockError> {
        let mut report = RunReport::default();
        for reference in references {
            let appliance = self.lock_appliance(reference)?;
            report.environments_written += appliance.environments.len();
            report.appliances.push(appliance);
        }
        report.packages_locked = self.locker.cache().locked_count();
        report.cache_hits = self.locker.cache().hits();
        Ok(report)
    }

    /// Lock one appliance by `name-version` reference.
    pub fn lock_appliance(&mut self, reference: &str) -> Result<ApplianceReport, LockError> {
        if !self.is_eligible(reference) {
            tracing::info!(appliance = reference, "not on latest allowlist, skipping");
            return Ok(ApplianceReport::without_lock(
                reference,
                ApplianceStatus::Skipped,
            ));
        }

        let original = self.inventory.appliance(reference)?;
        let mut changed = false;
        let mut fresh_packages: Vec<Package> = Vec::new();
        let mut environments = Vec::new();

        let mut steps = Vec::with_capacity(original.steps.len());
        for step in &original.steps {
            let outcome = self.locker.lock_step(step)?;
            changed |= outcome.rewritten;
            if let Some(result) = outcome.fresh {
                environments.extend(result.locked_environment.map(|env| env.name));
                fresh_packages.push(result.locked);
            }
            steps.push(outcome.step);
        }

        let mut app_steps = Vec::with_capacity(original.app_steps.len());
        for app_step in &original.app_steps {
            let outcome = self.locker.lock_app_step(&original, app_step)?;
            changed |= outcome.rewritten;
            if let Some(result) = outcome.fresh {
                environments.extend(result.locked_environment.map(|env| env.name));
            }
            app_steps.push(outcome.step);
        }

        if !changed {
            tracing::info!(appliance = reference, "nothing to lock");
            return Ok(ApplianceReport::without_lock(
                reference,
                ApplianceStatus::Unchanged,
            ));
        }

        let locked = Appliance {
            version: format!("{}{LOCKED_VERSION_SUFFIX}", original.version),
            steps,
            app_steps,
            ..original
        };
        if let Some(publisher) = self.publisher {
            for package in &fresh_packages {
                publisher.publish_package(package)?;
            }
            publisher.publish_appliance(&locked)?;
        }
        tracing::info!(
            appliance = reference,
            locked = %locked.reference(),
            environments = environments.len(),
            "appliance locked"
        );

        Ok(ApplianceReport {
            reference: reference.to_string(),
            status: ApplianceStatus::Locked,
            locked_reference: Some(locked.reference()),
            locked_packages: fresh_packages.iter().map(Package::reference).collect(),
            environments,
            locked_appliance: Some(locked),
        })
    }
}
