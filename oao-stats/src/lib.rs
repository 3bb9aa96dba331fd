// OAO Stats Backend
// Paginated subgraph fetch, preview join and metrics aggregation for the OAO dashboard

pub mod api;
pub mod cache;
pub mod config;
pub mod decoder;
pub mod error;
pub mod fetcher;
pub mod joiner;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod price;
pub mod report;
pub mod service;
pub mod source;
