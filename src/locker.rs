//! Per-step locking.
//!
//! A step goes through: cache lookup, pass-through check, resolve, lock,
//! record. App-steps skip the cache because each carries its own command.
//! The cache is keyed by the original package reference and lives for one
//! run, so every step naming the same package converges on one locked
//! package and one environment file.
use crate::classify::Classifier;
use crate::command::{is_automation_command, parse_command, rewrite_environment};
use crate::environment::{app_step_environment_name, lock_environment, package_environment_name};
use crate::error::LockError;
use crate::inventory::Inventory;
use crate::knife::Resolver;
use crate::model::{
    AppStep, Appliance, CookbookSet, Environment, LockResult, Package, Step, LOCK_PREFIX,
};
use crate::store::EnvironmentStore;
use std::collections::{HashMap, HashSet};

/// Package reference -> lock result, scoped to one run.
///
/// A result is recorded under the step's reference and under the fetched
/// package's canonical `name-version`, so `foo` and `foo-1.0` converge.
#[derive(Debug, Default)]
pub struct LockCache {
    entries: HashMap<String, LockResult<Package>>,
    hits: usize,
}

impl LockCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(&mut self, reference: &str) -> Option<&LockResult<Package>> {
        let hit = self.entries.get(reference);
        if hit.is_some() {
            self.hits += 1;
        }
        hit
    }

    #[cfg(test)]
    pub fn get(&self, reference: &str) -> Option<&LockResult<Package>> {
        self.entries.get(reference)
    }

    fn record(&mut self, references: &[&str], result: LockResult<Package>) {
        for reference in references {
            self.entries.insert(reference.to_string(), result.clone());
        }
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Number of distinct locked packages minted this run.
    pub fn locked_count(&self) -> usize {
        self.entries
            .values()
            .filter(|r| r.is_locked())
            .map(|r| r.locked.reference())
            .collect::<HashSet<_>>()
            .len()
    }
}

/// What happened to one step or app-step.
#[derive(Debug, Clone)]
pub struct StepOutcome<S, E> {
    /// The step as it goes into the locked appliance.
    pub step: S,
    /// True when the step now points at a locked artifact.
    pub rewritten: bool,
    /// Set only when this call minted a new lock (not on cache hits).
    pub fresh: Option<LockResult<E>>,
}

pub type PackageStepOutcome = StepOutcome<Step, Package>;
pub type AppStepOutcome = StepOutcome<AppStep, AppStep>;

/// Resolved and pinned form of one command.
struct CommandLock {
    cookbooks: CookbookSet,
    original_environment: Option<Environment>,
    locked_environment: Environment,
    command: String,
}

pub struct PackageLocker<'a> {
    inventory: &'a dyn Inventory,
    resolver: &'a dyn Resolver,
    store: &'a mut dyn EnvironmentStore,
    classifier: Classifier,
    automation_marker: String,
    cache: LockCache,
}

impl<'a> PackageLocker<'a> {
    pub fn new(
        inventory: &'a dyn Inventory,
        resolver: &'a dyn Resolver,
        store: &'a mut dyn EnvironmentStore,
        classifier: Classifier,
        automation_marker: &str,
    ) -> Self {
        Self {
            inventory,
            resolver,
            store,
            classifier,
            automation_marker: automation_marker.to_string(),
            cache: LockCache::new(),
        }
    }

    pub fn cache(&self) -> &LockCache {
        &self.cache
    }

    /// Lock the package behind a role step.
    pub fn lock_step(&mut self, step: &Step) -> Result<PackageStepOutcome, LockError> {
        if let Some(hit) = self.cache.lookup(&step.package) {
            tracing::debug!(package = %step.package, locked = hit.is_locked(), "cache hit");
            return Ok(cached_outcome(step, hit));
        }

        let package = self.inventory.package(&step.package)?;
        let canonical = package.reference();
        if canonical != step.package {
            if let Some(hit) = self.cache.lookup(&canonical).cloned() {
                tracing::debug!(
                    package = %step.package,
                    %canonical,
                    "cache hit by canonical reference"
                );
                let outcome = cached_outcome(step, &hit);
                self.cache.record(&[step.package.as_str()], hit);
                return Ok(outcome);
            }
        }
        let keys = [step.package.as_str(), canonical.as_str()];

        if let Some(reason) = self.pass_through_reason(&package) {
            tracing::info!(package = %step.package, reason, "passing step through");
            self.cache.record(&keys, LockResult::pass_through(package));
            return Ok(StepOutcome {
                step: step.clone(),
                rewritten: false,
                fresh: None,
            });
        }

        let environment = package_environment_name(&package);
        let lock = self.lock_command(&package.command, &environment, &canonical)?;
        let locked = Package {
            name: format!("{LOCK_PREFIX}{}", package.name),
            command: lock.command,
            ..package.clone()
        };
        let result = LockResult {
            original: package,
            locked,
            cookbooks: lock.cookbooks,
            original_environment: lock.original_environment,
            locked_environment: Some(lock.locked_environment),
        };
        let reference = result.locked.reference();
        tracing::info!(package = %step.package, locked = %reference, "package locked");
        self.cache.record(&keys, result.clone());
        Ok(StepOutcome {
            step: Step {
                role: step.role.clone(),
                package: reference,
            },
            rewritten: true,
            fresh: Some(result),
        })
    }

    /// Lock an app-step of `appliance`.
    pub fn lock_app_step(
        &mut self,
        appliance: &Appliance,
        app_step: &AppStep,
    ) -> Result<AppStepOutcome, LockError> {
        if !is_automation_command(&app_step.command, &self.automation_marker) {
            tracing::info!(app_step = %app_step.name, "no automation command, passing through");
            return Ok(pass_through_app_step(app_step));
        }
        let parsed = parse_command(&app_step.command)?;
        if parsed.environment.starts_with(LOCK_PREFIX) {
            tracing::info!(
                app_step = %app_step.name,
                environment = %parsed.environment,
                "already locked, passing through"
            );
            return Ok(pass_through_app_step(app_step));
        }

        let environment = app_step_environment_name(appliance, app_step);
        let origin = format!("{} / {}", appliance.reference(), app_step.name);
        let lock = self.lock_command(&app_step.command, &environment, &origin)?;
        let locked = AppStep {
            command: lock.command,
            ..app_step.clone()
        };
        tracing::info!(app_step = %app_step.name, %environment, "app-step locked");
        let result = LockResult {
            original: app_step.clone(),
            locked: locked.clone(),
            cookbooks: lock.cookbooks,
            original_environment: lock.original_environment,
            locked_environment: Some(lock.locked_environment),
        };
        Ok(StepOutcome {
            step: locked,
            rewritten: true,
            fresh: Some(result),
        })
    }

    fn pass_through_reason(&self, package: &Package) -> Option<&'static str> {
        if package.is_locked() {
            return Some("already locked");
        }
        if !is_automation_command(&package.command, &self.automation_marker) {
            return Some("no automation command");
        }
        None
    }

    fn lock_command(
        &mut self,
        command: &str,
        environment: &str,
        origin: &str,
    ) -> Result<CommandLock, LockError> {
        let parsed = parse_command(command)?;
        let listing = self
            .resolver
            .solve(&parsed.run_list, parsed.environment())?;
        let cookbooks = self.classifier.classify_listing(&listing)?;
        tracing::debug!(
            run_list = %parsed.run_list,
            first_party = cookbooks.first_party.len(),
            third_party = cookbooks.third_party.len(),
            "cookbooks resolved"
        );
        let original_environment = parsed
            .environment()
            .map(|name| self.resolver.environment(name))
            .transpose()?;
        let locked_environment = lock_environment(
            &mut *self.store,
            environment,
            origin,
            original_environment.as_ref(),
            &cookbooks,
        )?;
        let command = rewrite_environment(command, environment)?;
        Ok(CommandLock {
            cookbooks,
            original_environment,
            locked_environment,
            command,
        })
    }
}

/// Outcome for a step whose package was already handled this run.
fn cached_outcome(step: &Step, hit: &LockResult<Package>) -> PackageStepOutcome {
    let package = if hit.is_locked() {
        hit.locked.reference()
    } else {
        step.package.clone()
    };
    StepOutcome {
        step: Step {
            role: step.role.clone(),
            package,
        },
        rewritten: hit.is_locked(),
        fresh: None,
    }
}

fn pass_through_app_step(app_step: &AppStep) -> AppStepOutcome {
    StepOutcome {
        step: app_step.clone(),
        rewritten: false,
        fresh: None,
    }
}
