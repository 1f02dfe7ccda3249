pub mod app_context;
pub mod auth;
pub mod completion;
pub mod config;
pub mod data_connector;
pub mod middleware;
pub mod observability;
pub mod routers;
pub mod server;
pub mod store;
