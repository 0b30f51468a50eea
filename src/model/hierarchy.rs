//! Tenant service hierarchies
//!
//! Tenants are configured as a flat list of services that reference their
//! children by name. [`TenantConfiguration::build_tree`] materializes that
//! adjacency list into a tree of [`ServiceNode`]s once per cycle, so the
//! aggregator and the scheduler never walk the configuration itself.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::definition::HealthCheck;
use super::identifier::{fold_name, same_name};
use super::status::HealthStatus;

/// Service hierarchy of one tenant as served by the hub.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantConfiguration {
    #[serde(default)]
    pub services: Vec<ServiceConfiguration>,
    #[serde(default)]
    pub root_services: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfiguration {
    pub name: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub health_checks: Vec<HealthCheck>,
    #[serde(default)]
    pub children: Vec<String>,
}

/// A service in a materialized tree.
///
/// Checks are shared with scheduled work items through `Arc`, never copied.
#[derive(Debug, Clone)]
pub struct ServiceNode {
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub health_checks: Vec<Arc<HealthCheck>>,
    pub children: Vec<ServiceNode>,
}

impl ServiceNode {
    /// Visit this node and every descendant, parents before children.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a ServiceNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// Names of this service and all of its descendants.
    pub fn descendant_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.walk(&mut |node| names.push(node.name.clone()));
        names
    }

    /// Find a service by name (case-insensitive) in this subtree.
    pub fn find(&self, name: &str) -> Option<&ServiceNode> {
        if same_name(&self.name, name) {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(name))
    }
}

/// Problems found while materializing a tenant configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    DuplicateService(String),
    DuplicateHealthCheck { service: String, check: String },
    UnknownChild { service: String, child: String },
    UnknownRootService(String),
    Cycle(String),
    UnknownConditionStatus { service: String, check: String },
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::DuplicateService(name) => {
                write!(f, "service '{}' is defined more than once", name)
            }
            ConfigurationError::DuplicateHealthCheck { service, check } => {
                write!(f, "service '{}' defines health check '{}' more than once", service, check)
            }
            ConfigurationError::UnknownChild { service, child } => {
                write!(f, "service '{}' references unknown child '{}'", service, child)
            }
            ConfigurationError::UnknownRootService(name) => {
                write!(f, "root service '{}' is not defined", name)
            }
            ConfigurationError::Cycle(name) => {
                write!(f, "service '{}' is its own ancestor", name)
            }
            ConfigurationError::UnknownConditionStatus { service, check } => write!(
                f,
                "health check '{}' of service '{}' configures a condition with status Unknown",
                check, service
            ),
        }
    }
}

impl std::error::Error for ConfigurationError {}

impl TenantConfiguration {
    /// Validate the configuration and build one tree per root service.
    pub fn build_tree(&self) -> Result<Vec<ServiceNode>, ConfigurationError> {
        let mut by_name: HashMap<String, &ServiceConfiguration> = HashMap::new();

        for service in &self.services {
            if by_name
                .insert(fold_name(&service.name), service)
                .is_some()
            {
                return Err(ConfigurationError::DuplicateService(service.name.clone()));
            }
            validate_checks(service)?;
        }

        for service in &self.services {
            for child in &service.children {
                if !by_name.contains_key(&fold_name(child)) {
                    return Err(ConfigurationError::UnknownChild {
                        service: service.name.clone(),
                        child: child.clone(),
                    });
                }
            }
        }

        let mut ancestors = HashSet::new();
        self.root_services
            .iter()
            .map(|root| {
                let service = by_name
                    .get(&fold_name(root))
                    .ok_or_else(|| ConfigurationError::UnknownRootService(root.clone()))?;
                materialize(service, &by_name, &mut ancestors)
            })
            .collect()
    }
}

fn validate_checks(service: &ServiceConfiguration) -> Result<(), ConfigurationError> {
    let mut seen = HashSet::new();
    for check in &service.health_checks {
        if !seen.insert(fold_name(&check.name)) {
            return Err(ConfigurationError::DuplicateHealthCheck {
                service: service.name.clone(),
                check: check.name.clone(),
            });
        }
        if check
            .definition
            .condition_statuses()
            .contains(&HealthStatus::Unknown)
        {
            return Err(ConfigurationError::UnknownConditionStatus {
                service: service.name.clone(),
                check: check.name.clone(),
            });
        }
    }
    Ok(())
}

fn materialize(
    service: &ServiceConfiguration,
    by_name: &HashMap<String, &ServiceConfiguration>,
    ancestors: &mut HashSet<String>,
) -> Result<ServiceNode, ConfigurationError> {
    let key = fold_name(&service.name);
    if !ancestors.insert(key.clone()) {
        return Err(ConfigurationError::Cycle(service.name.clone()));
    }

    let mut children = Vec::with_capacity(service.children.len());
    for child in &service.children {
        // existence was checked before materializing
        if let Some(child) = by_name.get(&fold_name(child)) {
            children.push(materialize(child, by_name, ancestors)?);
        }
    }

    ancestors.remove(&key);

    Ok(ServiceNode {
        name: service.name.clone(),
        display_name: service.display_name.clone(),
        description: service.description.clone(),
        url: service.url.clone(),
        health_checks: service.health_checks.iter().cloned().map(Arc::new).collect(),
        children,
    })
}
