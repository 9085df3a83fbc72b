pub mod config;
pub mod routes;
pub mod server;
pub mod ws;

pub use config::ServerConfig;
pub use server::{AppState, build_state, router, serve};
