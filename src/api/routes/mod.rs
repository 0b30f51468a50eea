pub mod error_reports;
pub mod health;
pub mod maintenance;
pub mod reports;
pub mod tenants;
