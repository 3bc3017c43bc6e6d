// Connector Gateway - Library root for testing

pub mod auth;
pub mod config;
pub mod connectors;
pub mod error;
pub mod http_client;
pub mod middleware;
pub mod routes;
