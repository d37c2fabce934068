pub mod auth;
pub mod blob;
pub mod blocking;
pub mod channels;
pub mod config;
pub mod convert;
pub mod dashboard;
pub mod envelope;
pub mod error;
pub mod likes;
pub mod middleware;
pub mod projections;
pub mod relationships;
pub mod routes;
pub mod session;
pub mod state;
pub mod subscriptions;
pub mod tokens;
