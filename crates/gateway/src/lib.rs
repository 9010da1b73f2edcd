pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{RouterConfig, build_router};
pub use state::AppState;
