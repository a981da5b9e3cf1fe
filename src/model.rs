//! Inventory documents and the values the locker derives from them.
//!
//! Field names follow the AMP inventory and Chef environment JSON formats so
//! documents round-trip without translation. Free-form maps are kept as
//! order-preserving [`Payload`] values and never interpreted.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Opaque key/value payload passed through unchanged.
pub type Payload = Map<String, Value>;

/// Prefix carried by every locked package and environment name.
pub const LOCK_PREFIX: &str = "l-";

/// Suffix appended to an appliance version when it is locked.
pub const LOCKED_VERSION_SUFFIX: &str = "-locked";

pub const ENVIRONMENT_JSON_CLASS: &str = "Chef::Environment";
pub const ENVIRONMENT_CHEF_TYPE: &str = "environment";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appliance {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub roles: Payload,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub app_steps: Vec<AppStep>,
    #[serde(default)]
    pub options: Payload,
    #[serde(default)]
    pub metadata: Payload,
}

impl Appliance {
    /// `name-version` reference used by the inventory and the allowlist.
    pub fn reference(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub role: String,
    pub package: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppStep {
    pub name: String,
    #[serde(default)]
    pub command: String,
    #[serde(flatten)]
    pub extra: Payload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub metadata: Payload,
}

impl Package {
    pub fn reference(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    pub fn is_locked(&self) -> bool {
        self.name.starts_with(LOCK_PREFIX)
    }
}

/// One row of the inventory's appliance listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplianceEntry {
    pub name: String,
    pub version: String,
    #[serde(default, alias = "uri", alias = "url")]
    pub locator: String,
}

impl ApplianceEntry {
    pub fn reference(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookbook {
    pub name: String,
    pub version: String,
}

/// Resolved cookbooks split by ownership, each group in resolver order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookbookSet {
    pub first_party: Vec<Cookbook>,
    pub third_party: Vec<Cookbook>,
}

impl CookbookSet {
    /// Iterate first-party cookbooks, then third-party ones.
    pub fn iter(&self) -> impl Iterator<Item = &Cookbook> {
        self.first_party.iter().chain(self.third_party.iter())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.first_party.len() + self.third_party.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cookbook_versions: BTreeMap<String, String>,
    #[serde(default = "default_json_class")]
    pub json_class: String,
    #[serde(default = "default_chef_type")]
    pub chef_type: String,
    #[serde(default)]
    pub default_attributes: Payload,
    #[serde(default)]
    pub override_attributes: Payload,
}

fn default_json_class() -> String {
    ENVIRONMENT_JSON_CLASS.to_string()
}

fn default_chef_type() -> String {
    ENVIRONMENT_CHEF_TYPE.to_string()
}

/// The outcome of locking one package or app-step.
///
/// Pass-through results carry `locked == original`, an empty cookbook set and
/// no environments.
#[derive(Debug, Clone, PartialEq)]
pub struct LockResult<T> {
    pub original: T,
    pub locked: T,
    pub cookbooks: CookbookSet,
    pub original_environment: Option<Environment>,
    pub locked_environment: Option<Environment>,
}

impl<T: Clone> LockResult<T> {
    pub fn pass_through(entity: T) -> Self {
        Self {
            locked: entity.clone(),
            original: entity,
            cookbooks: CookbookSet::default(),
            original_environment: None,
            locked_environment: None,
        }
    }
}

impl<T> LockResult<T> {
    /// True when a pinned environment was minted for this entity.
    pub fn is_locked(&self) -> bool {
        self.locked_environment.is_some()
    }
}
