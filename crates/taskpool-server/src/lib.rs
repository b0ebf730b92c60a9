pub mod api;
pub mod config;
pub mod telemetry;

pub use api::create_router;
pub use config::ServerConfig;
