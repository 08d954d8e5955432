//! passless-axum - axum bindings for the passless authentication core
//!
//! Wires the flow controllers into a mountable [`axum::Router`] with the
//! error contract and bearer-token extractor the API exposes.

mod error;
mod router;
mod session;
mod state;

pub use error::{ApiError, ErrorBody};
pub use router::auth_router;
pub use session::AuthUser;
pub use state::AuthState;
