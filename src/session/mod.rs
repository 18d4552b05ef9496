pub mod controller;
pub mod phase;
pub mod state;
pub mod store;

pub use controller::{
    Failure, FailureKind, SessionController, SessionSnapshot, Stage, Warning,
};
pub use phase::{Event, Phase, TransitionError};
pub use state::SessionState;
pub use store::SessionStore;
