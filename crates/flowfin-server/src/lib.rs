pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod server;

pub use config::{AppConfig, DeploymentEnvironment, LoggingConfig, ServerConfig};
pub use error::ApiError;
pub use observability::init_tracing;
pub use server::{
    AppState, FlowfinServer, ServerBuilder, build_app, build_app_with_state, routes,
    spawn_token_sweeper, with_security_layers,
};
