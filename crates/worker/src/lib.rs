pub mod config;
pub mod router;
pub mod routes;
pub mod state;
