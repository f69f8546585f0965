// Library exports for InstantCode
// Integration tests drive the router built here

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod notifications;
pub mod posts;
pub mod routes;
pub mod state;
pub mod users;
