pub mod auth;
pub mod configuration;
pub mod domain;
pub mod error;
pub mod logger;
pub mod middleware;
pub mod routes;
pub mod startup;
pub mod store;
pub mod telemetry;
pub mod users;
pub mod validators;
