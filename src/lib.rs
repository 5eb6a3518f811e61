pub mod alerts;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod feeds;
pub mod fetch;
pub mod location;
pub mod models;
pub mod output;
pub mod parser;
pub mod realtime;
pub mod snapshot;
pub mod stations;
pub mod stats;
pub mod wire;

#[cfg(test)]
mod test_utils;
