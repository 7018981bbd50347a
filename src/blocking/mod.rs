pub mod error;
pub mod gate;
pub mod state;
pub mod store;

pub use error::{EngineError, EngineResult};
pub use gate::{ProofOfPresence, RejectAllTags, StrictModeGate, TagVerifier};
pub use state::{is_essential_app, BlockingState, ESSENTIAL_APPS};
pub use store::{BlockingStateStore, BlockingTransition};
