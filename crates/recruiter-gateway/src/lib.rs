//! Recruiter Gateway - HTTP server, logging bootstrap and the `recruiter` binary

pub mod logging;
pub mod server;

pub use logging::init_logging;
pub use server::{
    build_app, build_state, provider_from_config, spawn_session_sweeper, start_gateway, ApiError,
    AppState,
};
