//! Where the hub finds the configured service hierarchy

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::model::{TenantConfiguration, same_name};

/// Source of environments, tenants and their service configurations.
///
/// Names are matched case-insensitively.
#[async_trait]
pub trait ServiceHierarchySource: Send + Sync {
    async fn environments(&self) -> Vec<String>;

    async fn tenants(&self, environment: &str) -> Vec<String>;

    async fn tenant(&self, environment: &str, tenant: &str) -> Option<TenantConfiguration>;
}

/// Hierarchy fixed at startup, read from the hub configuration file.
#[derive(Debug, Clone, Default)]
pub struct StaticHierarchy {
    environments: BTreeMap<String, BTreeMap<String, TenantConfiguration>>,
}

impl StaticHierarchy {
    pub fn new(environments: BTreeMap<String, BTreeMap<String, TenantConfiguration>>) -> Self {
        Self { environments }
    }

    fn environment(&self, name: &str) -> Option<&BTreeMap<String, TenantConfiguration>> {
        self.environments
            .iter()
            .find(|(key, _)| same_name(key, name))
            .map(|(_, tenants)| tenants)
    }
}

#[async_trait]
impl ServiceHierarchySource for StaticHierarchy {
    async fn environments(&self) -> Vec<String> {
        self.environments.keys().cloned().collect()
    }

    async fn tenants(&self, environment: &str) -> Vec<String> {
        self.environment(environment)
            .map(|tenants| tenants.keys().cloned().collect())
            .unwrap_or_default()
    }

    async fn tenant(&self, environment: &str, tenant: &str) -> Option<TenantConfiguration> {
        self.environment(environment)?
            .iter()
            .find(|(key, _)| same_name(key, tenant))
            .map(|(_, configuration)| configuration.clone())
    }
}
