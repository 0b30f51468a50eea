pub mod agent;
pub mod aggregation;
pub mod api;
pub mod checks;
pub mod config;
pub mod hub;
pub mod maintenance;
pub mod model;
pub mod query;
pub mod queue;
pub mod scheduler;
pub mod smoothing;
pub mod storage;
pub mod timeseries;
pub mod util;
