pub mod auth;
pub mod client;
pub mod config;
pub mod models;
pub mod routes;
pub mod session;
pub mod startup;
pub mod storage;
pub mod telemetry;
pub mod utils;
