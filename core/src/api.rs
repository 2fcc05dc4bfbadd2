pub mod configuration;
mod handlers;
pub mod routes;
pub mod server;
pub mod types;
