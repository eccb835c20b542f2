pub mod handlers;
pub mod seed;
pub mod server;
pub mod sse;

pub use server::{build_router, start, start_with_telemetry, AppState, ServerConfig, ServerHandle};
