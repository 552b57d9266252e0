//! HTTP gateway: Evolution API webhook, spreadsheet ingestion and health.

pub mod inbound;
pub mod routes;
pub mod server;

pub use {
    routes::build_router,
    server::{AppState, serve},
};
