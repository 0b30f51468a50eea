//! Domain model shared by the agent and the hub

pub mod definition;
pub mod hierarchy;
pub mod identifier;
pub mod status;

pub use definition::{
    ComparisonOperator, HealthCheck, HealthCheckDefinition, HttpCheckDefinition, HttpCondition,
    MetricCheckDefinition, MetricCondition,
};
pub use hierarchy::{ConfigurationError, ServiceConfiguration, ServiceNode, TenantConfiguration};
pub use identifier::{CheckIdentifier, fold_name, same_name};
pub use status::{HealthStatus, ServiceHealthReport};
