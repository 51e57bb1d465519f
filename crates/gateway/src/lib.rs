//! HTTP front for the detection pipeline: uploads, annotated images, the
//! marine-life chat proxy and the static frontend.

pub mod chat;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod upload;

pub use chat::{ChatError, ChatReply, GeminiChat};
pub use config::GatewayConfig;
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
