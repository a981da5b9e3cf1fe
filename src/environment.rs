//! Pinned environment construction.
//!
//! A locked environment is a pure function of its origin identity, the
//! original environment (if any) and the resolved cookbook set. Persisting
//! it is the only side effect.
use crate::error::LockError;
use crate::model::{
    Appliance, AppStep, CookbookSet, Environment, Package, Payload, ENVIRONMENT_CHEF_TYPE,
    ENVIRONMENT_JSON_CLASS, LOCK_PREFIX,
};
use crate::store::EnvironmentStore;
use crate::util::{dashed_label, dashed_version};
use std::collections::BTreeMap;

/// Locked environment name for a package: `l-<name>-<version>`.
pub fn package_environment_name(package: &Package) -> String {
    format!("{LOCK_PREFIX}{}-{}", package.name, package.version)
}

/// Locked environment name for an app-step:
/// `l-<appliance>-<dashed-version>-<dashed-step-name>`.
pub fn app_step_environment_name(appliance: &Appliance, app_step: &AppStep) -> String {
    format!(
        "{LOCK_PREFIX}{}-{}-{}",
        appliance.name,
        dashed_version(&appliance.version),
        dashed_label(&app_step.name)
    )
}

/// Exact `= <version>` constraint for every resolved cookbook.
pub fn pin_cookbooks(cookbooks: &CookbookSet) -> BTreeMap<String, String> {
    cookbooks
        .iter()
        .map(|cookbook| (cookbook.name.clone(), format!("= {}", cookbook.version)))
        .collect()
}

/// Build the locked environment without persisting it.
///
/// `origin` names the package or app-step in the description of a
/// synthesized environment.
pub fn build_locked_environment(
    name: &str,
    origin: &str,
    original: Option<&Environment>,
    cookbooks: &CookbookSet,
) -> Environment {
    let cookbook_versions = pin_cookbooks(cookbooks);
    match original {
        Some(original) => Environment {
            name: name.to_string(),
            cookbook_versions,
            ..original.clone()
        },
        None => Environment {
            name: name.to_string(),
            description: format!("Locked environment for {origin}"),
            cookbook_versions,
            json_class: ENVIRONMENT_JSON_CLASS.to_string(),
            chef_type: ENVIRONMENT_CHEF_TYPE.to_string(),
            default_attributes: Payload::new(),
            override_attributes: Payload::new(),
        },
    }
}

/// Build the locked environment and persist it through `store`.
pub fn lock_environment(
    store: &mut dyn EnvironmentStore,
    name: &str,
    origin: &str,
    original: Option<&Environment>,
    cookbooks: &CookbookSet,
) -> Result<Environment, LockError> {
    let locked = build_locked_environment(name, origin, original, cookbooks);
    let path = store.write_environment(&locked)?;
    tracing::info!(
        environment = %locked.name,
        origin,
        cookbooks = locked.cookbook_versions.len(),
        from = original.map(|env| env.name.as_str()).unwrap_or("<none>"),
        path = %path.display(),
        "environment locked"
    );
    Ok(locked)
}
