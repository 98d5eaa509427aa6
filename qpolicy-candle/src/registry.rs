//! Process-wide registry of policies selectable by name.
//!
//! The registry is expected to be populated at start-up, e.g., with
//! [`register_default_policies`], and only read afterwards. Registering a
//! name twice replaces the earlier entry.
use crate::dqn::{DqnPolicy, DqnPolicyConfig};
use anyhow::{anyhow, Result};
use log::{info, warn};
use once_cell::sync::Lazy;
use qpolicy_core::PolicyError;
use std::{collections::HashMap, sync::RwLock};

/// Constructor of a registered policy.
pub type PolicyBuilder = fn(DqnPolicyConfig) -> Result<DqnPolicy>;

static REGISTRY: Lazy<RwLock<HashMap<String, PolicyBuilder>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

fn registry() -> &'static RwLock<HashMap<String, PolicyBuilder>> {
    &REGISTRY
}

/// Registers `builder` under `name`, replacing any previous registration.
pub fn register_policy(name: impl Into<String>, builder: PolicyBuilder) -> Result<()> {
    let name = name.into();
    let mut map = registry()
        .write()
        .map_err(|_| anyhow!("policy registry lock is poisoned"))?;
    if map.insert(name.clone(), builder).is_some() {
        warn!("Policy {} is registered again, the previous one is replaced", name);
    } else {
        info!("Register policy {}", name);
    }

    Ok(())
}

/// Builds the policy registered under `name`.
pub fn make_policy(name: &str, config: DqnPolicyConfig) -> Result<DqnPolicy> {
    let builder = {
        let map = registry()
            .read()
            .map_err(|_| anyhow!("policy registry lock is poisoned"))?;
        *map
            .get(name)
            .ok_or_else(|| PolicyError::UnknownPolicy(name.to_string()))?
    };

    builder(config)
}

/// Names of the registered policies in ascending order.
pub fn registered_policies() -> Result<Vec<String>> {
    let map = registry()
        .read()
        .map_err(|_| anyhow!("policy registry lock is poisoned"))?;
    let mut names: Vec<_> = map.keys().cloned().collect();
    names.sort();

    Ok(names)
}

/// Registers the policies of this crate, `"MlpPolicy"`.
pub fn register_default_policies() -> Result<()> {
    register_policy("MlpPolicy", DqnPolicy::build)
}
