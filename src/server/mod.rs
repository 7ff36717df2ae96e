pub mod config;
mod errors;
mod events;
mod http_layers;
mod queue_routes;
mod request_routes;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use errors::ErrorBody;
pub use http_layers::*;
pub use server::{make_app, run_server};
pub use state::ServerState;
