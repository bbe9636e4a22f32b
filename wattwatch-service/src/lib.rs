pub mod api;
pub mod config;
pub mod espi;
pub mod grouping;
pub mod metrics_server;
pub mod navigator;
pub mod observability;
pub mod store;
pub mod timeutil;
