// Re-export main modules for the trading game service library

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod market_maker;
pub mod matching;
pub mod session;
pub mod types;

pub use config::GameConfig;
pub use error::{AdmissionError, GameError, ProtocolError};
pub use types::*;

use crate::session::SessionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub config: GameConfig,
}
