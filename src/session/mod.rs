// Session layer: the per-session actor, its game state, and the registry
// that owns every running session.

pub mod actor;
pub mod game;
pub mod registry;

pub use actor::{Intent, IntentKind, SessionHandle};
pub use game::GameSession;
pub use registry::SessionRegistry;
