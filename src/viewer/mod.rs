pub mod controller;
pub mod machine;
pub mod session;

pub use controller::{spawn_viewer, ViewerCommand, ViewerHandle};
pub use machine::{Effect, Signal, TimerKind, ViewerMachine};
pub use session::{SessionMeta, SessionStatus, ViewerSession};
